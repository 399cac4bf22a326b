use thiserror::Error;

/// Main crate error type.
///
/// None of these ever terminate a live session: the connection manager and
/// the engine log them and carry on. They surface only from setup paths
/// (config loading, initial wiring) and from the publish boundary.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// WebSocket connection error
    #[error("Websocket error: {0}")]
    Websocket(String),

    /// WebSocket send error
    #[error("WS send error: {0}")]
    WsSend(String),

    /// Reader text conversion error
    #[error("Reader text conversion error: {0}")]
    ReaderTextConversion(String),

    /// JSON parse error
    #[error("Json parse error: {0}")]
    JsonParse(String),

    /// Publish attempted while the bus connection is down
    #[error("Not connected to bus")]
    NotConnected,

    /// The owning session or manager has already been closed
    #[error("Session closed")]
    SessionClosed,

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(String),
}

// Convenience constructors for common error patterns
impl Error {
    /// Create a JSON parse error
    pub fn json_parse(msg: impl Into<String>) -> Self {
        Error::JsonParse(msg.into())
    }

    /// Create a WebSocket connection error
    pub fn ws_connection(msg: impl Into<String>) -> Self {
        Error::Websocket(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::NotConnected.to_string(), "Not connected to bus");
        assert_eq!(
            Error::ws_connection("refused").to_string(),
            "Websocket error: refused"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::JsonParse(_)));
    }
}
