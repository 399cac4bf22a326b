use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    logging::targets,
    prelude::*,
    ws::{
        reconnection::{ConnectionState, ReconnectionConfig},
        topics::TopicSet,
        transport::{BusConnection, BusTransport},
    },
    Error,
};

/// Everything the connection manager reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Connection state transition. Consecutive duplicates are suppressed.
    ConnectionState(ConnectionState),
    /// A publication on one of the subscribed topics, payload undecoded.
    Message { topic: String, payload: String },
    /// A fire-and-forget publish did not reach the bus.
    PublishFailed { topic: String, error: String },
}

#[derive(Debug)]
enum ManagerCommand {
    Publish { topic: String, payload: String },
    Close,
}

/// Owns one bus connection for the lifetime of a dashboard session.
///
/// Connects, re-subscribes the whole [`TopicSet`] every time the connection
/// becomes ready, and reconnects with capped exponential backoff whenever it
/// is lost. It never gives up on its own: only [`close`](Self::close) or
/// dropping the handle stops it, and either one cancels any pending retry.
#[derive(Debug)]
pub struct ConnectionManager {
    commands: UnboundedSender<ManagerCommand>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start connecting. Must be called within a tokio runtime.
    pub fn open(
        transport: Arc<dyn BusTransport>,
        url: impl Into<String>,
        topics: TopicSet,
        config: ReconnectionConfig,
        events: UnboundedSender<BusEvent>,
    ) -> ConnectionManager {
        let (commands_tx, commands_rx) = unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let _ = events.send(BusEvent::ConnectionState(ConnectionState::Connecting));

        let task = ConnectionTask {
            transport,
            url: url.into(),
            topics,
            config,
            events,
            commands: commands_rx,
            state: state_tx,
        };
        let handle = tokio::spawn(task.run());

        ConnectionManager {
            commands: commands_tx,
            state: state_rx,
            task: Some(handle),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queue a publication.
    ///
    /// Fire-and-forget: a failure to deliver (including being mid-reconnect)
    /// is reported later as [`BusEvent::PublishFailed`]. Only a closed
    /// manager fails synchronously.
    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<String>) -> Result<()> {
        self.commands
            .send(ManagerCommand::Publish {
                topic: topic.into(),
                payload: payload.into(),
            })
            .map_err(|_| Error::SessionClosed)
    }

    /// Stop reconnecting, close the connection and wait for the task to end.
    ///
    /// Emits a final [`ConnectionState::Disconnected`].
    pub async fn close(mut self) {
        let _ = self.commands.send(ManagerCommand::Close);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(target: targets::BUS, error = %err, "Connection task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum PumpExit {
    Lost,
    Closed,
}

struct ConnectionTask {
    transport: Arc<dyn BusTransport>,
    url: String,
    topics: TopicSet,
    config: ReconnectionConfig,
    events: UnboundedSender<BusEvent>,
    commands: UnboundedReceiver<ManagerCommand>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            let Some(connected) = self.connect_or_close().await else {
                break;
            };

            match connected {
                Ok(mut connection) => {
                    if let Err(err) = self.resubscribe(&mut *connection).await {
                        error!(
                            target: targets::BUS,
                            url = %self.url,
                            error = %err,
                            "Could not subscribe topic set"
                        );
                        connection.close().await;
                    } else {
                        self.set_state(ConnectionState::Connected);
                        let connected_at = Instant::now();

                        match self.pump(&mut *connection).await {
                            PumpExit::Closed => {
                                connection.close().await;
                                break;
                            }
                            PumpExit::Lost => {
                                warn!(target: targets::BUS, url = %self.url, "Bus connection lost");
                            }
                        }

                        // A link that dies as soon as it is up keeps backing off
                        if connected_at.elapsed() >= self.config.initial_delay {
                            attempt = 0;
                        }
                    }
                }
                Err(err) => {
                    error!(
                        target: targets::BUS,
                        url = %self.url,
                        attempt = attempt + 1,
                        error = %err,
                        "Could not connect to bus"
                    );
                }
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.config.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            info!(
                target: targets::BUS,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting with backoff"
            );
            if self.backoff(delay).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!(target: targets::BUS, "Connection task stopped");
    }

    /// Attempt a connection, bailing out early if closed meanwhile.
    async fn connect_or_close(&mut self) -> Option<Result<Box<dyn BusConnection>>> {
        let connect = self.transport.connect(&self.url);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                command = self.commands.recv() => match command {
                    Some(ManagerCommand::Publish { topic, .. }) => {
                        reject_publish(&self.events, topic)
                    }
                    Some(ManagerCommand::Close) | None => return None,
                },
            }
        }
    }

    /// Subscribe the whole topic set. Any failure fails the connection.
    async fn resubscribe(&mut self, connection: &mut dyn BusConnection) -> Result<()> {
        for topic in self.topics.iter() {
            connection.subscribe(topic).await?;
        }
        debug!(target: targets::BUS, topics = self.topics.len(), "Subscribed to topic set");
        Ok(())
    }

    /// Forward frames and serve publishes until the connection dies or
    /// the manager is closed.
    async fn pump(&mut self, connection: &mut dyn BusConnection) -> PumpExit {
        // interval() panics on a zero period
        let ping_interval = self.config.ping_interval.max(Duration::from_millis(100));
        let mut ping = time::interval_at(Instant::now() + ping_interval, ping_interval);
        let mut last_frame = Instant::now();

        loop {
            let idle_deadline = self.config.idle_timeout.map(|timeout| last_frame + timeout);
            let idle = async move {
                match idle_deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                frame = connection.next_frame() => match frame {
                    Some(Ok(frame)) => {
                        last_frame = Instant::now();
                        let event = BusEvent::Message {
                            topic: frame.topic,
                            payload: frame.payload,
                        };
                        if self.events.send(event).is_err() {
                            // Nobody is listening any more
                            return PumpExit::Closed;
                        }
                    }
                    Some(Err(err)) => {
                        last_frame = Instant::now();
                        warn!(target: targets::BUS, error = %err, "Dropping malformed bus frame");
                    }
                    None => return PumpExit::Lost,
                },
                command = self.commands.recv() => match command {
                    Some(ManagerCommand::Publish { topic, payload }) => {
                        if let Err(err) = connection.publish(&topic, &payload).await {
                            error!(target: targets::BUS, %topic, error = %err, "Publish failed");
                            let _ = self.events.send(BusEvent::PublishFailed {
                                topic,
                                error: err.to_string(),
                            });
                        }
                    }
                    Some(ManagerCommand::Close) | None => return PumpExit::Closed,
                },
                _ = ping.tick() => {
                    if let Err(err) = connection.keepalive().await {
                        warn!(target: targets::BUS, error = %err, "Keepalive failed");
                        return PumpExit::Lost;
                    }
                }
                _ = idle => {
                    warn!(
                        target: targets::BUS,
                        idle_secs = last_frame.elapsed().as_secs_f64(),
                        "No bus traffic within idle timeout"
                    );
                    return PumpExit::Lost;
                }
            }
        }
    }

    /// Sleep out a backoff delay. Returns `true` if closed meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                command = self.commands.recv() => match command {
                    Some(ManagerCommand::Publish { topic, .. }) => {
                        reject_publish(&self.events, topic)
                    }
                    Some(ManagerCommand::Close) | None => return true,
                },
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(target: targets::BUS, from = %previous, to = %state, "Connection state changed");
            let _ = self.events.send(BusEvent::ConnectionState(state));
        }
    }
}

fn reject_publish(events: &UnboundedSender<BusEvent>, topic: String) {
    warn!(target: targets::BUS, %topic, "Publish while disconnected, dropping");
    let _ = events.send(BusEvent::PublishFailed {
        topic,
        error: Error::NotConnected.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::memory::MemoryTransport;

    fn fast_config() -> ReconnectionConfig {
        ReconnectionConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    async fn next_state(events: &mut UnboundedReceiver<BusEvent>) -> ConnectionState {
        loop {
            match events.recv().await.expect("event channel closed") {
                BusEvent::ConnectionState(state) => return state,
                _ => continue,
            }
        }
    }

    async fn next_message(events: &mut UnboundedReceiver<BusEvent>) -> (String, String) {
        loop {
            match events.recv().await.expect("event channel closed") {
                BusEvent::Message { topic, payload } => return (topic, payload),
                _ => continue,
            }
        }
    }

    fn open(bus: &MemoryTransport, topics: TopicSet) -> (ConnectionManager, UnboundedReceiver<BusEvent>) {
        let (tx, rx) = unbounded_channel();
        let manager = ConnectionManager::open(
            Arc::new(bus.clone()),
            "mem://bus",
            topics,
            fast_config(),
            tx,
        );
        (manager, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_subscribes_all_topics() {
        let bus = MemoryTransport::new();
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed", "timer", "control"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(bus.subscriptions(0), vec!["feed", "timer", "control"]);

        assert!(bus.deliver("timer", r#"{"formatted":"00:00:01","elapsed":1}"#));
        let (topic, payload) = next_message(&mut events).await;
        assert_eq!(topic, "timer");
        assert!(payload.contains("elapsed"));

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resubscribes() {
        let bus = MemoryTransport::new();
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed", "control"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        assert!(bus.drop_connection());
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        assert_eq!(bus.connection_count(), 2);
        assert_eq!(bus.subscriptions(1), vec!["feed", "control"]);

        // Traffic flows on the new connection
        assert!(bus.deliver("control", r#"{"command":"pause"}"#));
        let (topic, _) = next_message(&mut events).await;
        assert_eq!(topic, "control");

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_failures_retry_until_connected() {
        let bus = MemoryTransport::new();
        bus.fail_next_connects(3);
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        // Repeated failures report a single Reconnecting
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
        assert_eq!(bus.connect_attempts(), 4);

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_does_not_stop_reader() {
        let bus = MemoryTransport::new();
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed"]));
        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        assert!(bus.deliver_garbage("%%%"));
        assert!(bus.deliver("feed", r#"{"id":"i1"}"#));

        let (topic, payload) = next_message(&mut events).await;
        assert_eq!(topic, "feed");
        assert_eq!(payload, r#"{"id":"i1"}"#);
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_retrying() {
        let bus = MemoryTransport::new();
        bus.fail_next_connects(u32::MAX);
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);

        manager.close().await;
        assert_eq!(next_state(&mut events).await, ConnectionState::Disconnected);

        let attempts = bus.connect_attempts();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(bus.connect_attempts(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_round_trip_and_rejection() {
        let bus = MemoryTransport::new();
        bus.fail_next_connects(1);
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);

        // Mid-backoff: reported asynchronously, not an error here
        manager.publish("feed", "early").unwrap();
        loop {
            match events.recv().await.unwrap() {
                BusEvent::PublishFailed { topic, .. } => {
                    assert_eq!(topic, "feed");
                    break;
                }
                _ => continue,
            }
        }

        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
        manager.publish("feed", r#"{"id":"echo"}"#).unwrap();
        let (topic, payload) = next_message(&mut events).await;
        assert_eq!(topic, "feed");
        assert_eq!(payload, r#"{"id":"echo"}"#);
        assert_eq!(bus.published().len(), 1);

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_while_connections_drop_immediately() {
        let bus = MemoryTransport::new();
        bus.drop_next_connects(4);
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        for _ in 0..4 {
            assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
            assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        }
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
        assert_eq!(bus.connection_count(), 5);

        let connected_at = bus.connected_at();
        let gaps: Vec<Duration> = connected_at.windows(2).map(|w| w[1] - w[0]).collect();
        // 100ms, 200ms, 400ms, 800ms
        for (gap, expected_ms) in gaps.iter().zip([100u64, 200, 400, 800]) {
            assert!(*gap >= Duration::from_millis(expected_ms), "gaps: {gaps:?}");
            assert!(*gap < Duration::from_millis(expected_ms + 50), "gaps: {gaps:?}");
        }

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_connection_resets_backoff() {
        let bus = MemoryTransport::new();
        bus.drop_next_connects(3);
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        for _ in 0..3 {
            assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
            assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        }
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        // Stays up well past the initial delay before failing
        time::sleep(Duration::from_secs(5)).await;
        let dropped_at = Instant::now();
        assert!(bus.drop_connection());
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        let reconnected_at = *bus.connected_at().last().unwrap();
        assert!(reconnected_at - dropped_at < Duration::from_millis(150));

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_subscription_reconnects() {
        let bus = MemoryTransport::new();
        bus.fail_next_subscribes(1);
        let (manager, mut events) = open(&bus, TopicSet::from_topics(["feed", "timer", "control"]));

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        // Never reported connected with a partial topic set
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        assert_eq!(bus.connection_count(), 2);
        assert_eq!(bus.subscriptions(1), vec!["feed", "timer", "control"]);
        assert!(bus.deliver("feed", r#"{"id":"i1"}"#));
        let (topic, _) = next_message(&mut events).await;
        assert_eq!(topic, "feed");

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_forces_reconnect() {
        let bus = MemoryTransport::new();
        let (tx, mut events) = unbounded_channel();
        let config = ReconnectionConfig {
            idle_timeout: Some(Duration::from_secs(5)),
            ..fast_config()
        };
        let manager = ConnectionManager::open(
            Arc::new(bus.clone()),
            "mem://bus",
            TopicSet::from_topics(["feed"]),
            config,
            tx,
        );

        assert_eq!(next_state(&mut events).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
        // Silence past the idle timeout
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);
        assert_eq!(bus.connection_count(), 2);

        manager.close().await;
    }
}
