//! Channel multiplexing engine for kernelmux.
//!
//! A Jupyter-style kernel exposes five independent ZeroMQ channels
//! (control, shell, stdin, heartbeat, iopub). This crate relays all five
//! through one outward DEALER connection to a command issuer: traffic from
//! the kernel is tagged with its channel identifier (frame 0) and
//! multiplexed outward; tagged issuer traffic is demultiplexed back to the
//! matching kernel-side endpoint. Messages are opaque frame sequences;
//! nothing here interprets kernel protocol semantics.
//!
//! The relay is fail-fast: any endpoint error, protocol violation, or
//! subprocess failure shuts the whole system down rather than masking a
//! broken channel.

pub mod channel;
pub mod connection;
pub mod demux;
pub mod error;
pub mod kernel;
pub mod lifecycle;
pub mod mux;
pub mod registry;

pub use channel::{tag_message, ChannelId};
pub use connection::ConnectionInfo;
pub use demux::{run_outward_relay, split_tagged, ISSUER};
pub use error::{RelayError, Result};
pub use kernel::{KernelCommand, KernelProcess};
pub use lifecycle::{
    run, LifecycleState, RelaySettings, DEFAULT_QUEUE_CAPACITY, DEFAULT_TERMINATE_GRACE,
};
pub use mux::{run_request_channel, run_subscribe_channel};
pub use registry::{ChannelInboxes, ChannelRegistry};
