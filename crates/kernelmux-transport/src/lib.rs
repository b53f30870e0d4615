//! ZeroMQ endpoint abstraction for kernelmux.
//!
//! Provides a unified [`Endpoint`] handle over the heterogeneous socket
//! patterns a kernel tunnel needs:
//! - REQ for the request/reply channels (control, shell, stdin, heartbeat)
//! - SUB for the broadcast channel (iopub)
//! - DEALER for the outward issuer connection
//!
//! This is the lowest layer of kernelmux. Everything else builds on top of
//! the [`Endpoint`] type provided here.

pub mod endpoint;
pub mod error;

pub use endpoint::{Endpoint, SocketPattern};
pub use error::{Result, TransportError};
