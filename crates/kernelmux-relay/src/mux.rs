//! Inbound relays: one task per kernel channel.
//!
//! Each task owns its channel's kernel-side endpoint for the endpoint's
//! whole life. Traffic from the kernel is tagged with the channel
//! identifier and enqueued on the shared outward queue; the single task
//! owning the issuer socket performs the actual send, so concurrently
//! forwarded messages can never interleave frames (see `demux`).
//!
//! Any endpoint error is fatal for the whole relay: a broken kernel-side
//! channel means the kernel session is no longer usable, so the error
//! propagates to the lifecycle controller instead of being retried.

use kernelmux_transport::Endpoint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeromq::ZmqMessage;

use crate::channel::{tag_message, ChannelId};
use crate::error::{RelayError, Result};

/// Relay loop for a request/reply channel (control, shell, stdin,
/// heartbeat).
///
/// The kernel side of these channels only ever answers, so the loop is
/// issuer-driven: forward one demultiplexed request, relay the kernel's
/// reply back tagged, repeat. REQ send/receive alternation holds as long
/// as the issuer obeys request/reply per channel; a violation surfaces as
/// a fatal endpoint error.
pub async fn run_request_channel(
    id: ChannelId,
    mut endpoint: Endpoint,
    mut inbox: mpsc::Receiver<ZmqMessage>,
    outward: mpsc::Sender<ZmqMessage>,
    token: CancellationToken,
) -> Result<()> {
    loop {
        let request = tokio::select! {
            _ = token.cancelled() => break,
            queued = inbox.recv() => match queued {
                Some(message) => message,
                None => break, // demux task gone; shutdown under way
            },
        };

        endpoint
            .send(request)
            .await
            .map_err(|source| RelayError::connection(id.as_str(), source))?;

        let reply = tokio::select! {
            _ = token.cancelled() => break,
            received = endpoint.recv() => {
                received.map_err(|source| RelayError::connection(id.as_str(), source))?
            }
        };

        debug!(channel = %id, frames = reply.len(), "relaying kernel reply");
        let tagged = tag_message(id, reply);
        tokio::select! {
            _ = token.cancelled() => break,
            sent = outward.send(tagged) => {
                if sent.is_err() {
                    break; // outward writer gone; shutdown under way
                }
            }
        }
    }

    endpoint.close().await;
    Ok(())
}

/// Relay loop for the subscribe channel (iopub).
///
/// Broadcasts from the kernel are tagged and enqueued outward. A SUB
/// socket cannot send, so anything the issuer addresses to this channel is
/// dropped with a warning rather than treated as fatal.
pub async fn run_subscribe_channel(
    id: ChannelId,
    mut endpoint: Endpoint,
    mut inbox: mpsc::Receiver<ZmqMessage>,
    outward: mpsc::Sender<ZmqMessage>,
    token: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            queued = inbox.recv() => match queued {
                Some(_) => {
                    warn!(channel = %id, "dropping message addressed to a subscribe-only channel");
                }
                None => break,
            },
            received = endpoint.recv() => {
                let message =
                    received.map_err(|source| RelayError::connection(id.as_str(), source))?;
                debug!(channel = %id, frames = message.len(), "relaying kernel broadcast");
                let tagged = tag_message(id, message);
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = outward.send(tagged) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    endpoint.close().await;
    Ok(())
}
