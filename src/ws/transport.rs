//! Bus transports.
//!
//! The connection manager only needs four things from a bus: connect,
//! subscribe, publish and a stream of inbound frames. [`WsTransport`] speaks
//! the exercise broker's JSON-over-WebSocket protocol; [`memory`] is an
//! in-process broker used by tests and local tooling.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::{
    logging::targets,
    prelude::*,
    ws::message_types::{WsFrame, WsRequest},
    Error,
};

/// One publication received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFrame {
    pub topic: String,
    /// Raw payload text as published. Not guaranteed to be JSON.
    pub payload: String,
}

impl BusFrame {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Factory for bus connections.
#[async_trait]
pub trait BusTransport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn BusConnection>>;
}

/// A single live bus session.
///
/// A fresh connection has no subscriptions; the connection manager
/// re-issues them after every connect.
#[async_trait]
pub trait BusConnection: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()>;

    /// Next inbound frame.
    ///
    /// `Some(Err(_))` is a single undecodable frame and is not fatal.
    /// `None` means the connection is gone.
    async fn next_frame(&mut self) -> Option<Result<BusFrame>>;

    /// Transport-level keepalive. An error means the connection is dead.
    async fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {}
}

/// JSON-over-WebSocket bus transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl BusTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn BusConnection>> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Websocket(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsConnection {
    async fn send_request(&mut self, request: &WsRequest<'_>) -> Result<()> {
        let payload = serde_json::to_string(request)?;
        self.stream
            .send(protocol::Message::Text(payload))
            .await
            .map_err(|e| Error::WsSend(e.to_string()))
    }
}

#[async_trait]
impl BusConnection for WsConnection {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.send_request(&WsRequest::Subscribe { topic }).await
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        self.send_request(&WsRequest::Publish { topic, payload })
            .await
    }

    async fn next_frame(&mut self) -> Option<Result<BusFrame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => {
                    debug!(target: targets::BUS, error = %err, "WebSocket read failed");
                    return None;
                }
            };
            let text = match message {
                protocol::Message::Text(text) => text,
                protocol::Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(err) => return Some(Err(Error::ReaderTextConversion(err.to_string()))),
                },
                protocol::Message::Close(frame) => {
                    debug!(target: targets::BUS, ?frame, "Bus sent close frame");
                    continue;
                }
                protocol::Message::Ping(_)
                | protocol::Message::Pong(_)
                | protocol::Message::Frame(_) => continue,
            };
            if let Some(frame) = decode_frame(&text) {
                return Some(frame);
            }
        }
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.stream
            .send(protocol::Message::Ping(Vec::new()))
            .await
            .map_err(|e| Error::WsSend(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(target: targets::BUS, error = %err, "Error closing bus connection");
        }
    }
}

/// Decode one bus text frame.
///
/// Returns `None` for well-formed JSON that is not a publication (acks,
/// pongs), which the caller skips.
fn decode_frame(text: &str) -> Option<Result<BusFrame>> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return Some(Err(Error::JsonParse(err.to_string()))),
    };
    if value.get("topic").is_none() {
        return None;
    }
    Some(
        serde_json::from_value::<WsFrame>(value)
            .map(|frame| BusFrame::new(frame.topic, frame.payload.into_text()))
            .map_err(Error::from),
    )
}

pub mod memory {
    //! In-process bus.
    //!
    //! Behaves like a single broker: a connection only receives frames for
    //! topics it has subscribed to, publications are echoed to subscribers,
    //! and the test side can fail connects or subscriptions, or cut the live
    //! connection.

    use std::sync::{Arc, Mutex, MutexGuard};

    use async_trait::async_trait;
    use tokio::{
        sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        time::Instant,
    };

    use super::{BusConnection, BusFrame, BusTransport};
    use crate::{prelude::*, Error};

    enum Inbound {
        Frame(BusFrame),
        Garbage(String),
        Drop,
    }

    struct Link {
        subscriptions: Vec<String>,
        sender: UnboundedSender<Inbound>,
    }

    #[derive(Default)]
    struct Broker {
        links: Vec<Link>,
        fail_connects: u32,
        drop_connects: u32,
        fail_subscribes: u32,
        connect_attempts: usize,
        connected_at: Vec<Instant>,
        published: Vec<BusFrame>,
    }

    impl Broker {
        fn live_link_mut(&mut self) -> Option<&mut Link> {
            self.links
                .iter_mut()
                .rev()
                .find(|link| !link.sender.is_closed())
        }

        fn route(&mut self, frame: BusFrame) -> bool {
            let mut delivered = false;
            for link in self.links.iter().filter(|l| !l.sender.is_closed()) {
                if link.subscriptions.iter().any(|t| *t == frame.topic)
                    && link.sender.send(Inbound::Frame(frame.clone())).is_ok()
                {
                    delivered = true;
                }
            }
            delivered
        }
    }

    /// Shared handle to an in-process broker. Clones share the broker.
    #[derive(Clone, Default)]
    pub struct MemoryTransport {
        broker: Arc<Mutex<Broker>>,
    }

    impl MemoryTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn broker(&self) -> MutexGuard<'_, Broker> {
            // A panicking test thread must not wedge every other assertion
            self.broker.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Make the next `n` connection attempts fail.
        pub fn fail_next_connects(&self, n: u32) {
            self.broker().fail_connects = n;
        }

        /// Accept the next `n` connections, then cut each one straight away.
        pub fn drop_next_connects(&self, n: u32) {
            self.broker().drop_connects = n;
        }

        /// Make the next `n` subscribe requests fail.
        pub fn fail_next_subscribes(&self, n: u32) {
            self.broker().fail_subscribes = n;
        }

        /// When each established connection was accepted.
        pub fn connected_at(&self) -> Vec<Instant> {
            self.broker().connected_at.clone()
        }

        /// Total connection attempts, failed ones included.
        pub fn connect_attempts(&self) -> usize {
            self.broker().connect_attempts
        }

        /// Number of connections that were established.
        pub fn connection_count(&self) -> usize {
            self.broker().links.len()
        }

        /// Topics subscribed on the `index`-th established connection.
        pub fn subscriptions(&self, index: usize) -> Vec<String> {
            self.broker()
                .links
                .get(index)
                .map(|link| link.subscriptions.clone())
                .unwrap_or_default()
        }

        /// Deliver a publication to every live subscriber of `topic`.
        ///
        /// Returns whether anyone received it.
        pub fn deliver(&self, topic: &str, payload: impl Into<String>) -> bool {
            self.broker().route(BusFrame::new(topic, payload))
        }

        /// Push an undecodable frame down the live connection.
        pub fn deliver_garbage(&self, text: impl Into<String>) -> bool {
            let mut broker = self.broker();
            match broker.live_link_mut() {
                Some(link) => link.sender.send(Inbound::Garbage(text.into())).is_ok(),
                None => false,
            }
        }

        /// Cut the live connection as a network failure would.
        pub fn drop_connection(&self) -> bool {
            let mut broker = self.broker();
            match broker.live_link_mut() {
                Some(link) => link.sender.send(Inbound::Drop).is_ok(),
                None => false,
            }
        }

        /// Everything published through this broker, in order.
        pub fn published(&self) -> Vec<BusFrame> {
            self.broker().published.clone()
        }
    }

    #[async_trait]
    impl BusTransport for MemoryTransport {
        async fn connect(&self, url: &str) -> Result<Box<dyn BusConnection>> {
            let mut broker = self.broker();
            broker.connect_attempts += 1;
            if broker.fail_connects > 0 {
                broker.fail_connects -= 1;
                return Err(Error::ws_connection(format!("{url}: connection refused")));
            }
            let (sender, receiver) = unbounded_channel();
            if broker.drop_connects > 0 {
                broker.drop_connects -= 1;
                let _ = sender.send(Inbound::Drop);
            }
            broker.connected_at.push(Instant::now());
            let index = broker.links.len();
            broker.links.push(Link {
                subscriptions: Vec::new(),
                sender,
            });
            Ok(Box::new(MemoryConnection {
                index,
                receiver,
                broker: Arc::clone(&self.broker),
            }))
        }
    }

    struct MemoryConnection {
        index: usize,
        receiver: UnboundedReceiver<Inbound>,
        broker: Arc<Mutex<Broker>>,
    }

    impl MemoryConnection {
        fn broker(&self) -> MutexGuard<'_, Broker> {
            self.broker.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    #[async_trait]
    impl BusConnection for MemoryConnection {
        async fn subscribe(&mut self, topic: &str) -> Result<()> {
            let mut broker = self.broker();
            if broker.fail_subscribes > 0 {
                broker.fail_subscribes -= 1;
                return Err(Error::WsSend(format!("subscribe {topic}: rejected")));
            }
            let link = broker
                .links
                .get_mut(self.index)
                .ok_or_else(|| Error::WsSend("link gone".to_string()))?;
            if !link.subscriptions.iter().any(|t| t == topic) {
                link.subscriptions.push(topic.to_string());
            }
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
            let frame = BusFrame::new(topic, payload);
            let mut broker = self.broker();
            broker.published.push(frame.clone());
            broker.route(frame);
            Ok(())
        }

        async fn next_frame(&mut self) -> Option<Result<BusFrame>> {
            match self.receiver.recv().await? {
                Inbound::Frame(frame) => Some(Ok(frame)),
                Inbound::Garbage(text) => Some(Err(Error::json_parse(format!(
                    "undecodable frame: {text}"
                )))),
                Inbound::Drop => {
                    self.receiver.close();
                    None
                }
            }
        }

        async fn close(&mut self) {
            self.receiver.close();
        }
    }
}
