use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::{
    exercise::{
        fold::{CommandParams, DerivedState, FoldEngine},
        inject_store::InjectStore,
        lifecycle::{ExerciseState, Lifecycle, LifecycleConfig},
        read_model::Snapshot,
    },
    logging::targets,
    types::Inject,
    ws::{
        classifier::{classify, Message},
        message_types::{StatusMessage, TimerMessage},
        reconnection::ConnectionState,
    },
};

/// Single writer for all dashboard state.
///
/// Every inbound payload goes through [`handle_raw`](Self::handle_raw).
/// Each handler returns whether the public [`Snapshot`] would differ, so the
/// caller publishes only real changes.
#[derive(Debug)]
pub struct ExerciseEngine {
    store: InjectStore,
    lifecycle: Lifecycle,
    derived: DerivedState,
    fold: FoldEngine,
    timer: Option<TimerMessage>,
    status: Option<StatusMessage>,
    connection: ConnectionState,
}

impl ExerciseEngine {
    pub fn new(fold: FoldEngine, lifecycle: &LifecycleConfig) -> Self {
        Self {
            store: InjectStore::new(),
            lifecycle: Lifecycle::new(lifecycle),
            derived: DerivedState::default(),
            fold,
            timer: None,
            status: None,
            connection: ConnectionState::default(),
        }
    }

    /// Decode and apply one raw payload received on `topic`.
    ///
    /// Malformed JSON is logged and dropped. Well-formed payloads that match
    /// no known shape are dropped silently.
    pub fn handle_raw(&mut self, topic: &str, text: &str) -> bool {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    target: targets::ENGINE,
                    %topic,
                    error = %err,
                    "Dropping malformed payload"
                );
                return false;
            }
        };
        match classify(&value) {
            Some(message) => {
                trace!(target: targets::ENGINE, %topic, kind = message.kind(), "Classified");
                self.handle_message(message)
            }
            None => false,
        }
    }

    pub fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Timer(timer) => replace_if_changed(&mut self.timer, timer),
            Message::Status(status) => replace_if_changed(&mut self.status, status),
            Message::Control(control) => {
                let before = self.lifecycle.state();
                let changed = self.lifecycle.apply(&control.command);
                if changed {
                    info!(
                        target: targets::ENGINE,
                        command = %control.command,
                        from = %before,
                        to = %self.lifecycle.state(),
                        "Exercise state changed"
                    );
                } else {
                    debug!(
                        target: targets::ENGINE,
                        command = %control.command,
                        state = %before,
                        "Control command ignored"
                    );
                }
                changed
            }
            Message::Inject(inject) => self.handle_inject(*inject),
        }
    }

    /// Store the inject and, if it is a new trigger, fold its command.
    /// Duplicates are ignored entirely, so replay never refolds.
    fn handle_inject(&mut self, inject: Inject) -> bool {
        let id = inject.id.clone();
        if !self.store.apply(inject) {
            debug!(target: targets::ENGINE, %id, "Duplicate inject ignored");
            return false;
        }
        let Some(stored) = self.store.latest().cloned() else {
            return true;
        };
        debug!(
            target: targets::ENGINE,
            %id,
            inject_type = %stored.inject_type,
            total = self.store.len(),
            "Inject accepted"
        );

        if let Some(command) = stored.command() {
            let params = CommandParams::from_command(&command);
            self.fold.apply(command.name, &params, &mut self.derived);
        } else if stored.is_trigger() {
            debug!(target: targets::ENGINE, %id, "Trigger inject without a command");
        }
        true
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) -> bool {
        if self.connection == state {
            return false;
        }
        self.connection = state;
        true
    }

    pub fn exercise_state(&self) -> ExerciseState {
        self.lifecycle.state()
    }

    pub fn injects(&self) -> &InjectStore {
        &self.store
    }

    pub fn derived(&self) -> &DerivedState {
        &self.derived
    }

    /// Build the current snapshot. The revision is assigned on publish.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: 0,
            timer: self.timer.clone(),
            exercise_state: self.lifecycle.state(),
            status: self.status.clone(),
            injects: self.store.ordered(),
            derived: self.derived.clone(),
            connection: self.connection,
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}
