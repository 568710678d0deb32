//! Crate-wide error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong inside the bridge.
///
/// Nothing here is fatal to the hosting process; every variant is local and
/// recoverable via reconnect or retry by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeError {
    /// An inbound frame was not valid JSON, or not a JSON object.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Socket-level failure (connect refused, abrupt close, write error).
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation that requires an open socket was invoked while the
    /// bridge was disconnected.
    #[error("not connected to the gateway")]
    NotConnected,

    /// The bridge task has shut down and its command channel is gone.
    #[error("bridge task is no longer running")]
    ChannelClosed,

    /// A payload matched no expected shape during typed decoding.
    #[error("payload parse error: {0}")]
    Parsing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_detail() {
        let err = BridgeError::MalformedFrame("expected object".to_string());
        assert!(err.to_string().contains("malformed frame"));
        assert!(err.to_string().contains("expected object"));

        let err2 = BridgeError::Transport("connection refused".to_string());
        assert!(err2.to_string().contains("connection refused"));
    }

    #[test]
    fn error_serialization_roundtrip() {
        let err = BridgeError::NotConnected;
        let json = serde_json::to_string(&err).unwrap();
        let back: BridgeError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
