//! Outbound relay: the single task owning the issuer connection.
//!
//! The task serves both directions of the outward DEALER socket:
//! - tagged messages from the inbound relays are dequeued and sent, one
//!   atomic multipart send per message (single-writer discipline);
//! - messages from the issuer are split into tag + payload and delivered
//!   to the matching channel's queue, in arrival order.
//!
//! An unrecognized or missing channel tag is a fatal protocol violation:
//! nothing is partially forwarded and the whole relay shuts down.

use kernelmux_transport::Endpoint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use zeromq::ZmqMessage;

use crate::channel::ChannelId;
use crate::error::{RelayError, Result};
use crate::registry::ChannelRegistry;

/// Name used for the outward connection in diagnostics.
pub const ISSUER: &str = "issuer";

/// Split a multiplexed message into its channel identifier and the
/// untagged payload, preserving frame order.
pub fn split_tagged(message: ZmqMessage) -> Result<(ChannelId, ZmqMessage)> {
    let mut frames = message.into_vec().into_iter();

    let tag = match frames.next() {
        Some(tag) => tag,
        None => return Err(RelayError::MissingPayload),
    };
    let id = ChannelId::from_tag(&tag).ok_or_else(|| RelayError::UnknownChannel {
        tag: String::from_utf8_lossy(&tag).into_owned(),
    })?;

    let mut payload = match frames.next() {
        Some(frame) => ZmqMessage::from(frame),
        None => return Err(RelayError::MissingPayload),
    };
    for frame in frames {
        payload.push_back(frame);
    }
    Ok((id, payload))
}

/// Relay loop for the issuer connection.
///
/// Runs until cancellation, a fatal error, or until both the outward queue
/// and every channel inbox have been torn down.
pub async fn run_outward_relay(
    mut endpoint: Endpoint,
    registry: ChannelRegistry,
    mut outward: mpsc::Receiver<ZmqMessage>,
    token: CancellationToken,
) -> Result<()> {
    let result = relay_loop(&mut endpoint, &registry, &mut outward, &token).await;
    endpoint.close().await;
    result
}

async fn relay_loop(
    endpoint: &mut Endpoint,
    registry: &ChannelRegistry,
    outward: &mut mpsc::Receiver<ZmqMessage>,
    token: &CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            queued = outward.recv() => match queued {
                Some(message) => send_outward(endpoint, message).await?,
                None => return Ok(()), // all inbound relays gone
            },
            received = endpoint.recv() => {
                let message =
                    received.map_err(|source| RelayError::connection(ISSUER, source))?;
                let (id, payload) = match split_tagged(message) {
                    Ok(split) => split,
                    Err(err) => {
                        error!(error = %err, "protocol violation on issuer connection");
                        return Err(err);
                    }
                };
                debug!(channel = %id, frames = payload.len(), "delivering issuer message");
                if !deliver(endpoint, registry, outward, token, id, payload).await? {
                    return Ok(());
                }
            }
        }
    }
}

async fn send_outward(endpoint: &mut Endpoint, message: ZmqMessage) -> Result<()> {
    debug!(frames = message.len(), "forwarding tagged message to issuer");
    endpoint
        .send(message)
        .await
        .map_err(|source| RelayError::connection(ISSUER, source))
}

/// Deliver one demultiplexed message to its channel queue.
///
/// The wait for queue space races both cancellation and the outward queue,
/// so a backpressured channel never stops the issuer direction from
/// draining; a full channel inbox only pauses further issuer receives,
/// which keeps per-channel delivery order intact. Returns `Ok(false)` when
/// relaying should stop.
async fn deliver(
    endpoint: &mut Endpoint,
    registry: &ChannelRegistry,
    outward: &mut mpsc::Receiver<ZmqMessage>,
    token: &CancellationToken,
    id: ChannelId,
    payload: ZmqMessage,
) -> Result<bool> {
    let mut pending = Some(payload);
    while let Some(payload) = pending.take() {
        tokio::select! {
            _ = token.cancelled() => return Ok(false),
            permit = registry.sender(id).reserve() => match permit {
                Ok(permit) => permit.send(payload),
                // The channel task exited; its own result carries the
                // primary error, so just stop relaying.
                Err(_) => return Ok(false),
            },
            queued = outward.recv() => {
                pending = Some(payload);
                match queued {
                    Some(message) => send_outward(endpoint, message).await?,
                    None => return Ok(false),
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn multipart(frames: &[&[u8]]) -> ZmqMessage {
        let mut iter = frames.iter();
        let mut message = ZmqMessage::from(Bytes::copy_from_slice(
            iter.next().expect("at least one frame"),
        ));
        for frame in iter {
            message.push_back(Bytes::copy_from_slice(frame));
        }
        message
    }

    #[test]
    fn splits_tag_and_preserves_frame_order() {
        let message = multipart(&[b"shell", b"exec_request", b"1+1"]);
        let (id, payload) = split_tagged(message).expect("valid tag should split");
        assert_eq!(id, ChannelId::Shell);

        let frames = payload.into_vec();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), b"exec_request");
        assert_eq!(frames[1].as_ref(), b"1+1");
    }

    #[test]
    fn unknown_tag_is_a_protocol_violation() {
        let message = multipart(&[b"telemetry", b"x"]);
        let err = split_tagged(message).expect_err("unknown tag should fail");
        assert!(err.is_protocol_violation());
        assert!(matches!(err, RelayError::UnknownChannel { ref tag } if tag == "telemetry"));
    }

    #[test]
    fn tag_without_payload_is_a_protocol_violation() {
        let message = multipart(&[b"control"]);
        let err = split_tagged(message).expect_err("tag-only message should fail");
        assert!(err.is_protocol_violation());
        assert!(matches!(err, RelayError::MissingPayload));
    }
}
