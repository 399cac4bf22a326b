use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use crate::types::Inject;

/// Append-only, deduplicating store of received injects.
///
/// Key invariants:
/// - An `id` is accepted at most once; re-applying it is a no-op, never an
///   update. This is what makes reconnect replay harmless.
/// - The ordered view is newest-arrival first. `scheduled_time` plays no
///   part, since the transport may delay or reorder delivery.
/// - Accepted injects are shared immutably (`Arc<Inject>`).
#[derive(Debug, Clone, Default)]
pub struct InjectStore {
    /// Newest first
    ordered: VecDeque<Arc<Inject>>,
    by_id: HashMap<String, Arc<Inject>>,
}

impl InjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an inject. Returns `true` if it was new.
    pub fn apply(&mut self, inject: Inject) -> bool {
        if self.by_id.contains_key(&inject.id) {
            return false;
        }
        let inject = Arc::new(inject);
        self.by_id.insert(inject.id.clone(), Arc::clone(&inject));
        self.ordered.push_front(inject);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Inject>> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Injects, most recently arrived first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Inject>> {
        self.ordered.iter()
    }

    /// Owned copy of the ordered view for snapshots. Cheap: clones `Arc`s.
    pub fn ordered(&self) -> Vec<Arc<Inject>> {
        self.ordered.iter().cloned().collect()
    }

    /// Most recently arrived inject.
    pub fn latest(&self) -> Option<&Arc<Inject>> {
        self.ordered.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InjectContent, InjectType};

    fn inject(id: &str, time: f64) -> Inject {
        Inject {
            id: id.to_string(),
            scheduled_time: time,
            delivered_at: None,
            inject_type: InjectType::News,
            content: Some(InjectContent::Text(format!("body of {id}"))),
            media: Vec::new(),
            action: None,
        }
    }

    fn ids(store: &InjectStore) -> Vec<&str> {
        store.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut store = InjectStore::new();
        assert!(store.apply(inject("a", 1.0)));
        let once = ids(&store).into_iter().map(String::from).collect::<Vec<_>>();

        assert!(!store.apply(inject("a", 1.0)));
        assert_eq!(store.len(), 1);
        assert_eq!(ids(&store), once);
    }

    #[test]
    fn test_duplicate_is_not_an_update() {
        let mut store = InjectStore::new();
        store.apply(inject("a", 1.0));

        let mut changed = inject("a", 99.0);
        changed.content = Some(InjectContent::Text("edited".to_string()));
        assert!(!store.apply(changed));

        let stored = store.get("a").unwrap();
        assert_eq!(stored.scheduled_time, 1.0);
        assert_eq!(
            stored.content,
            Some(InjectContent::Text("body of a".to_string()))
        );
    }

    #[test]
    fn test_newest_arrival_first_regardless_of_schedule() {
        let mut store = InjectStore::new();
        store.apply(inject("late", 300.0));
        store.apply(inject("early", 5.0));
        store.apply(inject("middle", 120.0));

        assert_eq!(ids(&store), vec!["middle", "early", "late"]);
        assert_eq!(store.latest().unwrap().id, "middle");
    }

    #[test]
    fn test_replay_of_last_three_leaves_size_unchanged() {
        let mut store = InjectStore::new();
        for i in 0..10 {
            store.apply(inject(&format!("i{i}"), i as f64));
        }
        let before = store.len();
        let order_before = store.ordered();

        for i in 7..10 {
            assert!(!store.apply(inject(&format!("i{i}"), i as f64)));
        }
        assert_eq!(store.len(), before);
        assert_eq!(store.ordered(), order_before);
    }
}
