use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    exercise::{fold::DerivedState, lifecycle::ExerciseState},
    types::Inject,
    ws::{
        message_types::{StatusMessage, TimerMessage},
        reconnection::ConnectionState,
    },
};

/// Immutable point-in-time view of everything a dashboard renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Bumped by one on every published change
    pub revision: u64,
    pub timer: Option<TimerMessage>,
    pub exercise_state: ExerciseState,
    pub status: Option<StatusMessage>,
    /// Most recently arrived first
    pub injects: Vec<Arc<Inject>>,
    pub derived: DerivedState,
    pub connection: ConnectionState,
}

impl Snapshot {
    pub fn new(exercise_state: ExerciseState) -> Self {
        Self {
            revision: 0,
            timer: None,
            exercise_state,
            status: None,
            injects: Vec::new(),
            derived: DerivedState::default(),
            connection: ConnectionState::default(),
        }
    }

    /// Timer text, or a placeholder before the first tick.
    pub fn timer_text(&self) -> &str {
        self.timer
            .as_ref()
            .map(|t| t.formatted.as_str())
            .unwrap_or("--:--:--")
    }

    pub fn elapsed(&self) -> f64 {
        self.timer.as_ref().map(|t| t.elapsed).unwrap_or(0.0)
    }

    /// Injects meant for display, without trigger commands.
    pub fn visible_injects(&self) -> impl Iterator<Item = &Arc<Inject>> {
        self.injects.iter().filter(|i| !i.is_trigger())
    }

    /// Equal apart from `revision`. Injects compare by identity since the
    /// store never edits them.
    fn same_content(&self, other: &Snapshot) -> bool {
        self.timer == other.timer
            && self.exercise_state == other.exercise_state
            && self.status == other.status
            && self.connection == other.connection
            && self.injects.len() == other.injects.len()
            && self
                .injects
                .iter()
                .zip(&other.injects)
                .all(|(a, b)| Arc::ptr_eq(a, b))
            && self.derived == other.derived
    }
}

/// Observable container for the latest [`Snapshot`].
///
/// One writer publishes, any number of readers hold a `watch` receiver.
/// Publishing content equal to the current snapshot does not notify.
#[derive(Debug, Clone)]
pub struct ReadModel {
    sender: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl ReadModel {
    pub fn new(initial: Snapshot) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.sender.subscribe()
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.sender.borrow())
    }

    /// Replace the snapshot if its content changed, assigning the next
    /// revision. Returns whether subscribers were notified.
    pub fn publish(&self, mut next: Snapshot) -> bool {
        self.sender.send_if_modified(|current| {
            if current.same_content(&next) {
                return false;
            }
            next.revision = current.revision + 1;
            *current = Arc::new(next);
            true
        })
    }
}
