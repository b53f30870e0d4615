//! Demultiplexing routing table.
//!
//! Built once during initialization and never mutated: one bounded queue
//! per channel, with the senders held here (the outbound relay's routing
//! table) and the receivers moved into the per-channel relay tasks.

use tokio::sync::mpsc;
use zeromq::ZmqMessage;

use crate::channel::ChannelId;

/// Per-channel senders used by the outbound relay to deliver demultiplexed
/// messages. Lookup is an exhaustive match: every valid [`ChannelId`] is
/// routable by construction.
#[derive(Debug)]
pub struct ChannelRegistry {
    control: mpsc::Sender<ZmqMessage>,
    shell: mpsc::Sender<ZmqMessage>,
    stdin: mpsc::Sender<ZmqMessage>,
    heartbeat: mpsc::Sender<ZmqMessage>,
    iopub: mpsc::Sender<ZmqMessage>,
}

/// Per-channel receivers, consumed by the channel relay tasks.
#[derive(Debug)]
pub struct ChannelInboxes {
    pub control: mpsc::Receiver<ZmqMessage>,
    pub shell: mpsc::Receiver<ZmqMessage>,
    pub stdin: mpsc::Receiver<ZmqMessage>,
    pub heartbeat: mpsc::Receiver<ZmqMessage>,
    pub iopub: mpsc::Receiver<ZmqMessage>,
}

impl ChannelRegistry {
    /// Create the routing table and the matching inboxes, with `capacity`
    /// queued messages per channel.
    pub fn new(capacity: usize) -> (Self, ChannelInboxes) {
        let (control_tx, control_rx) = mpsc::channel(capacity);
        let (shell_tx, shell_rx) = mpsc::channel(capacity);
        let (stdin_tx, stdin_rx) = mpsc::channel(capacity);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(capacity);
        let (iopub_tx, iopub_rx) = mpsc::channel(capacity);

        let registry = ChannelRegistry {
            control: control_tx,
            shell: shell_tx,
            stdin: stdin_tx,
            heartbeat: heartbeat_tx,
            iopub: iopub_tx,
        };
        let inboxes = ChannelInboxes {
            control: control_rx,
            shell: shell_rx,
            stdin: stdin_rx,
            heartbeat: heartbeat_rx,
            iopub: iopub_rx,
        };
        (registry, inboxes)
    }

    /// The delivery queue for a channel.
    pub fn sender(&self, id: ChannelId) -> &mpsc::Sender<ZmqMessage> {
        match id {
            ChannelId::Control => &self.control,
            ChannelId::Shell => &self.shell,
            ChannelId::Stdin => &self.stdin,
            ChannelId::Heartbeat => &self.heartbeat,
            ChannelId::Iopub => &self.iopub,
        }
    }

    /// All (identifier, sender) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &mpsc::Sender<ZmqMessage>)> {
        ChannelId::ALL.into_iter().map(|id| (id, self.sender(id)))
    }
}
