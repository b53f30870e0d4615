use kernelmux_transport::TransportError;

/// Errors that can occur while setting up or running the relay.
///
/// The relay performs no local recovery: every variant is fatal and drives
/// the lifecycle controller into shutdown with a non-zero exit status.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed or incomplete startup parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An endpoint could not be opened or failed during operation.
    /// `channel` is one of the five channel names, or `issuer`.
    #[error("'{channel}' endpoint failed: {source}")]
    Connection {
        channel: String,
        #[source]
        source: TransportError,
    },

    /// A multiplexed message arrived with a tag outside the fixed channel
    /// set. Protocol violation; nothing is forwarded.
    #[error("unknown channel tag {tag:?} on multiplexed message")]
    UnknownChannel { tag: String },

    /// A multiplexed message carried a channel tag but no payload frames.
    #[error("multiplexed message has no payload frames after the channel tag")]
    MissingPayload,

    /// The kernel subprocess could not be started.
    #[error("kernel process error: {0}")]
    Subprocess(#[source] std::io::Error),

    /// Internal relay plumbing failed (task panic, queue closed early).
    #[error("internal relay error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Shorthand for a connection failure on a named channel.
    pub(crate) fn connection(channel: impl Into<String>, source: TransportError) -> Self {
        RelayError::Connection {
            channel: channel.into(),
            source,
        }
    }

    /// True for wire-protocol violations on the issuer connection.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RelayError::UnknownChannel { .. } | RelayError::MissingPayload
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
