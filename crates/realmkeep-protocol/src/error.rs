//! Error types for the protocol layer.

/// Errors that can occur while turning requests and responses into bytes
/// and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, an unknown
    /// request `type`, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but violates protocol rules (e.g. an empty
    /// display name in a creation request).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
