//! Dashboard session: one bus connection driving one engine.
//!
//! ```text
//! ConnectionManager ──BusEvent (mpsc)──► engine task ──Snapshot (watch)──► readers
//!        ▲
//!        └──── publish_inject ◄──── control surfaces
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    consts::LOCAL_BUS_URL,
    exercise::{
        engine::ExerciseEngine,
        fold::{DashboardVariant, FoldEngine},
        lifecycle::LifecycleConfig,
        read_model::{ReadModel, Snapshot},
    },
    logging::targets,
    prelude::*,
    types::{Inject, InjectContent, InjectType},
    ws::{
        reconnection::{ConnectionState, ReconnectionConfig},
        topics::{DashboardRole, ExerciseIdentity, TopicSet},
        transport::{BusTransport, WsTransport},
        ws_manager::{BusEvent, ConnectionManager},
    },
};

/// Everything needed to open a [`DashboardSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub identity: ExerciseIdentity,
    pub role: DashboardRole,
    pub variant: DashboardVariant,
    /// Also follow the turn-based status topic
    pub include_status: bool,
    pub reconnect: ReconnectionConfig,
    pub lifecycle: LifecycleConfig,
}

impl SessionConfig {
    pub fn new(identity: ExerciseIdentity) -> Self {
        Self {
            url: LOCAL_BUS_URL.to_string(),
            identity,
            role: DashboardRole::default(),
            variant: DashboardVariant::default(),
            include_status: true,
            reconnect: ReconnectionConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }

    pub fn topics(&self) -> TopicSet {
        TopicSet::for_dashboard(&self.identity, self.role, self.include_status)
    }
}

/// Live dashboard session.
///
/// Readers observe state only through [`subscribe`](Self::subscribe) or
/// [`snapshot`](Self::snapshot). Closing (or dropping) the session stops
/// the connection manager, which in turn ends the engine task.
#[derive(Debug)]
pub struct DashboardSession {
    manager: ConnectionManager,
    read_model: ReadModel,
    engine: JoinHandle<()>,
    feed_topic: String,
}

impl DashboardSession {
    /// Open over the WebSocket bus transport.
    pub fn open(config: SessionConfig) -> Self {
        Self::open_with_transport(Arc::new(WsTransport), config)
    }

    /// Must be called within a tokio runtime.
    pub fn open_with_transport(transport: Arc<dyn BusTransport>, config: SessionConfig) -> Self {
        let topics = config.topics();
        let feed_topic = topics.feed_topic().to_string();
        let engine = ExerciseEngine::new(FoldEngine::for_variant(config.variant), &config.lifecycle);
        let read_model = ReadModel::new(engine.snapshot());

        info!(
            target: targets::SESSION,
            url = %config.url,
            exercise = %config.identity.exercise,
            team = %config.identity.team,
            variant = ?config.variant,
            topics = topics.len(),
            "Opening dashboard session"
        );

        let (events_tx, events_rx) = unbounded_channel();
        let engine = tokio::spawn(drive_engine(engine, events_rx, read_model.clone()));
        let manager = ConnectionManager::open(
            transport,
            config.url,
            topics,
            config.reconnect,
            events_tx,
        );

        Self {
            manager,
            read_model,
            engine,
            feed_topic,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.read_model.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.read_model.snapshot()
    }

    pub fn read_model(&self) -> &ReadModel {
        &self.read_model
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Topic operator-published injects go to.
    pub fn feed_topic(&self) -> &str {
        &self.feed_topic
    }

    /// Publish a payload onto the team feed.
    ///
    /// Fire-and-forget: the payload is not applied locally, it takes effect
    /// when the bus echoes it back. Delivery failures are logged by the
    /// engine task.
    pub fn publish_inject<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        debug!(target: targets::SESSION, topic = %self.feed_topic, "Publishing inject");
        self.manager.publish(self.feed_topic.as_str(), text)
    }

    /// Build a trigger inject for `command` stamped with the current
    /// exercise time, publish it, and return it.
    pub fn publish_command(&self, command: &str, parameters: Map<String, Value>) -> Result<Inject> {
        let inject = build_command_inject(command, parameters, self.snapshot().elapsed());
        self.publish_inject(&inject)?;
        Ok(inject)
    }

    /// Close the bus connection and wait for the engine to drain.
    pub async fn close(self) {
        self.manager.close().await;
        if let Err(err) = self.engine.await {
            warn!(target: targets::SESSION, error = %err, "Engine task ended abnormally");
        }
        info!(target: targets::SESSION, "Dashboard session closed");
    }
}

/// A trigger inject carrying `command`, with a fresh unique id.
pub fn build_command_inject(command: &str, parameters: Map<String, Value>, time: f64) -> Inject {
    Inject {
        id: uuid::Uuid::new_v4().to_string(),
        scheduled_time: time,
        delivered_at: None,
        inject_type: InjectType::Trigger,
        content: Some(InjectContent::Structured(json!({
            "command": command,
            "parameters": parameters,
        }))),
        media: Vec::new(),
        action: None,
    }
}

/// Apply bus events until the connection manager goes away.
async fn drive_engine(
    mut engine: ExerciseEngine,
    mut events: UnboundedReceiver<BusEvent>,
    read_model: ReadModel,
) {
    while let Some(event) = events.recv().await {
        let changed = match event {
            BusEvent::ConnectionState(state) => {
                debug!(target: targets::SESSION, %state, "Connection state");
                engine.set_connection_state(state)
            }
            BusEvent::Message { topic, payload } => engine.handle_raw(&topic, &payload),
            BusEvent::PublishFailed { topic, error } => {
                warn!(target: targets::SESSION, %topic, %error, "Publish failed");
                false
            }
        };
        if changed {
            read_model.publish(engine.snapshot());
        }
    }
    debug!(target: targets::SESSION, "Event channel closed, engine stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exercise::lifecycle::ExerciseState, ws::transport::memory::MemoryTransport};
    use std::time::Duration;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::new(ExerciseIdentity::new("ex1", "blue"));
        config.url = "mem://bus".to_string();
        config.reconnect = ReconnectionConfig {
            initial_delay: Duration::from_millis(100),
            jitter_factor: 0.0,
            ..Default::default()
        };
        config
    }

    async fn wait_for(
        rx: &mut watch::Receiver<Arc<Snapshot>>,
        predicate: impl Fn(&Snapshot) -> bool,
    ) -> Arc<Snapshot> {
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return Arc::clone(&current);
                }
            }
            rx.changed().await.expect("read model dropped");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_applies_bus_traffic() {
        let bus = MemoryTransport::new();
        let session = DashboardSession::open_with_transport(Arc::new(bus.clone()), config());
        let mut rx = session.subscribe();

        wait_for(&mut rx, |s| s.connection.is_connected()).await;
        assert!(bus.deliver("exercise/ex1/control", r#"{"command":"pause"}"#));
        assert!(bus.deliver(
            "exercise/ex1/team/blue/feed",
            r#"{"id":"i1","type":"news","content":{"headline":"X"},"time":10}"#
        ));
        assert!(bus.deliver("exercise/ex1/timer", r#"{"formatted":"00:00:12","elapsed":12}"#));

        let snapshot = wait_for(&mut rx, |s| s.timer.is_some()).await;
        assert_eq!(snapshot.exercise_state, ExerciseState::Paused);
        assert_eq!(snapshot.injects.len(), 1);
        assert_eq!(snapshot.injects[0].id, "i1");

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_command_applies_on_echo() {
        let bus = MemoryTransport::new();
        let session = DashboardSession::open_with_transport(Arc::new(bus.clone()), config());
        let mut rx = session.subscribe();
        wait_for(&mut rx, |s| s.connection.is_connected()).await;

        let mut parameters = Map::new();
        parameters.insert("satellite".to_string(), json!("SAT-1"));
        parameters.insert("signal_strength".to_string(), json!(42));
        let inject = session
            .publish_command("update_satellite_status", parameters)
            .unwrap();

        let snapshot = wait_for(&mut rx, |s| !s.derived.satellites.is_empty()).await;
        assert_eq!(snapshot.injects[0].id, inject.id);
        assert_eq!(
            snapshot.derived.satellite("SAT-1").unwrap().signal_strength,
            42.0
        );
        assert_eq!(bus.published()[0].topic, "exercise/ex1/team/blue/feed");

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replay_is_harmless() {
        let bus = MemoryTransport::new();
        let session = DashboardSession::open_with_transport(Arc::new(bus.clone()), config());
        let mut rx = session.subscribe();
        wait_for(&mut rx, |s| s.connection.is_connected()).await;

        let feed = "exercise/ex1/team/blue/feed";
        let inject = |id: &str| format!(r#"{{"id":"{id}","time":1}}"#);
        for id in ["a", "b", "c"] {
            bus.deliver(feed, inject(id));
        }
        let before = wait_for(&mut rx, |s| s.injects.len() == 3).await;

        assert!(bus.drop_connection());
        // Reconnecting then Connected again
        let reconnected = wait_for(&mut rx, |s| {
            s.connection.is_connected() && s.revision >= before.revision + 2
        })
        .await;
        assert_eq!(bus.connection_count(), 2);

        // Broker replays recent history on the new connection
        for id in ["b", "c"] {
            bus.deliver(feed, inject(id));
        }
        bus.deliver(feed, inject("d"));
        let snapshot = wait_for(&mut rx, |s| s.injects.len() == 4).await;
        let ids: Vec<_> = snapshot.injects.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "b", "a"]);
        assert!(snapshot.revision > reconnected.revision);

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reports_disconnected() {
        let bus = MemoryTransport::new();
        let session = DashboardSession::open_with_transport(Arc::new(bus.clone()), config());
        let mut rx = session.subscribe();
        wait_for(&mut rx, |s| s.connection.is_connected()).await;

        let model = session.read_model().clone();
        session.close().await;

        assert_eq!(model.snapshot().connection, ConnectionState::Disconnected);
        let attempts = bus.connect_attempts();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(bus.connect_attempts(), attempts);
    }

    #[test]
    fn test_build_command_inject() {
        let mut parameters = Map::new();
        parameters.insert("strength".to_string(), json!(10));
        let a = build_command_inject("record_signal_strength", parameters.clone(), 30.0);
        let b = build_command_inject("record_signal_strength", parameters, 30.0);

        assert_ne!(a.id, b.id);
        let command = a.command().unwrap();
        assert_eq!(command.name, "record_signal_strength");
        assert_eq!(command.time, 30.0);
        assert_eq!(command.parameters.unwrap()["strength"], json!(10));

        let wire = serde_json::to_value(&a).unwrap();
        assert_eq!(wire["type"], "trigger");
        assert_eq!(wire["time"], 30.0);
    }
}
