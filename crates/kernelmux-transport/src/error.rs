use crate::endpoint::SocketPattern;

/// Errors that can occur on kernel-side or issuer-side endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: zeromq::ZmqError,
    },

    /// Connected, but the subscription handshake failed.
    #[error("failed to subscribe on {addr}: {source}")]
    Subscribe {
        addr: String,
        source: zeromq::ZmqError,
    },

    /// A receive on an established endpoint failed.
    #[error("receive failed: {0}")]
    Recv(zeromq::ZmqError),

    /// A send on an established endpoint failed.
    #[error("send failed: {0}")]
    Send(zeromq::ZmqError),

    /// The socket pattern does not support the attempted operation.
    #[error("{pattern} endpoints do not support {op}")]
    Unsupported {
        pattern: SocketPattern,
        op: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
