//! The five logical kernel channels.
//!
//! The channel set is closed: every routing decision is an exhaustive match
//! over [`ChannelId`], so an unrecognized wire tag can only surface at
//! [`ChannelId::from_tag`], where it is a detectable protocol violation
//! rather than a silent no-op.

use std::fmt;

use bytes::Bytes;
use kernelmux_transport::SocketPattern;
use zeromq::ZmqMessage;

/// Identifier of one logical kernel channel.
///
/// The variant's lowercase name doubles as the literal tag frame prepended
/// to every message crossing the outward issuer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Kernel control requests (interrupt, shutdown).
    Control,
    /// Execution requests and replies.
    Shell,
    /// Kernel-initiated input requests.
    Stdin,
    /// Liveness ping/pong.
    Heartbeat,
    /// Broadcast of outputs and status (receive-only on the kernel side).
    Iopub,
}

impl ChannelId {
    /// All five channels, in connection-file order.
    pub const ALL: [ChannelId; 5] = [
        ChannelId::Control,
        ChannelId::Shell,
        ChannelId::Stdin,
        ChannelId::Heartbeat,
        ChannelId::Iopub,
    ];

    /// The channel's tag string, used as frame 0 on the issuer connection.
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Control => "control",
            ChannelId::Shell => "shell",
            ChannelId::Stdin => "stdin",
            ChannelId::Heartbeat => "heartbeat",
            ChannelId::Iopub => "iopub",
        }
    }

    /// Parse a wire tag frame. Returns `None` for anything outside the
    /// fixed set of five.
    pub fn from_tag(tag: &[u8]) -> Option<ChannelId> {
        match tag {
            b"control" => Some(ChannelId::Control),
            b"shell" => Some(ChannelId::Shell),
            b"stdin" => Some(ChannelId::Stdin),
            b"heartbeat" => Some(ChannelId::Heartbeat),
            b"iopub" => Some(ChannelId::Iopub),
            _ => None,
        }
    }

    /// The socket pattern used to reach this channel on the kernel side.
    ///
    /// The kernel hosts ROUTER sockets for control/shell/stdin and a REP
    /// socket for heartbeat; all four are driven as request/reply
    /// initiators. iopub is a PUB socket we subscribe to.
    pub fn pattern(self) -> SocketPattern {
        match self {
            ChannelId::Control | ChannelId::Shell | ChannelId::Stdin | ChannelId::Heartbeat => {
                SocketPattern::Req
            }
            ChannelId::Iopub => SocketPattern::Sub,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prepend the channel's tag frame, preserving the order of the original
/// frames.
pub fn tag_message(id: ChannelId, mut message: ZmqMessage) -> ZmqMessage {
    message.push_front(Bytes::from_static(id.as_str().as_bytes()));
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_all_channels() {
        for id in ChannelId::ALL {
            assert_eq!(ChannelId::from_tag(id.as_str().as_bytes()), Some(id));
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert_eq!(ChannelId::from_tag(b"hb"), None);
        assert_eq!(ChannelId::from_tag(b""), None);
        assert_eq!(ChannelId::from_tag(b"SHELL"), None);
        assert_eq!(ChannelId::from_tag(b"iopub2"), None);
    }

    #[test]
    fn iopub_is_the_only_subscribe_channel() {
        for id in ChannelId::ALL {
            let expected = if id == ChannelId::Iopub {
                SocketPattern::Sub
            } else {
                SocketPattern::Req
            };
            assert_eq!(id.pattern(), expected);
        }
    }

    #[test]
    fn tag_message_prepends_without_reordering() {
        let mut message = ZmqMessage::from("exec_request");
        message.push_back(Bytes::from_static(b"1+1"));

        let tagged = tag_message(ChannelId::Control, message);
        let frames = tagged.into_vec();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref(), b"control");
        assert_eq!(frames[1].as_ref(), b"exec_request");
        assert_eq!(frames[2].as_ref(), b"1+1");
    }
}
