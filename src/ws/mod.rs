pub(crate) mod classifier;
pub(crate) mod message_types;
pub(crate) mod reconnection;
pub(crate) mod topics;
pub mod transport;
pub(crate) mod ws_manager;

pub use classifier::{classify, Message};
pub use message_types::{ControlCommand, ControlMessage, StatusMessage, TimerMessage};
pub use reconnection::{calculate_backoff_delay, ConnectionState, ReconnectionConfig};
pub use topics::{DashboardRole, ExerciseIdentity, TopicSet};
pub use transport::{BusConnection, BusFrame, BusTransport, WsTransport};
pub use ws_manager::{BusEvent, ConnectionManager};
