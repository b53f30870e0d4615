//! Lifecycle controller.
//!
//! Ties the relay together: validates the settings, starts the kernel
//! subprocess, opens the issuer connection and the five kernel-side
//! endpoints, runs the relay tasks, and tears everything down on the
//! first fatal error or on external cancellation. Teardown runs on every
//! exit path, including initialization failures.

use std::collections::HashMap;
use std::time::Duration;

use kernelmux_transport::{Endpoint, SocketPattern};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelId;
use crate::connection::ConnectionInfo;
use crate::demux::{run_outward_relay, ISSUER};
use crate::error::{RelayError, Result};
use crate::kernel::{KernelCommand, KernelProcess};
use crate::mux::{run_request_channel, run_subscribe_channel};
use crate::registry::{ChannelInboxes, ChannelRegistry};

/// Messages queued per channel and on the outward queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default wait for graceful kernel shutdown before SIGKILL.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Pause between spawning the kernel and connecting to its endpoints, so
/// the kernel has bound its sockets.
const KERNEL_STARTUP_DELAY: Duration = Duration::from_millis(500);

/// How long to wait for relay tasks to stop before aborting them.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Everything the relay needs to run.
#[derive(Debug)]
pub struct RelaySettings {
    /// The kernel's endpoint addresses.
    pub connection: ConnectionInfo,
    /// Full issuer address, e.g. `tcp://gateway.example.org:9999`.
    pub issuer_addr: String,
    /// Kernel launch command, or `None` when an external supervisor
    /// already manages the kernel.
    pub kernel: Option<KernelCommand>,
    /// Grace period for kernel termination.
    pub terminate_grace: Duration,
    /// Bounded queue capacity for internal relay queues.
    pub queue_capacity: usize,
}

impl RelaySettings {
    pub fn new(connection: ConnectionInfo, issuer_addr: impl Into<String>) -> Self {
        RelaySettings {
            connection,
            issuer_addr: issuer_addr.into(),
            kernel: None,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.issuer_addr.contains("://") {
            return Err(RelayError::Config(format!(
                "issuer address {:?} has no transport scheme",
                self.issuer_addr
            )));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::Config("queue capacity must be non-zero".into()));
        }
        self.connection.validate()
    }
}

/// Lifecycle states, in order. Transitions are logged; there is no way
/// back from `ShuttingDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Run the relay until `shutdown` is cancelled or a fatal error occurs.
///
/// Returns `Ok(())` for an operator-requested shutdown and the first
/// fatal error otherwise. The kernel subprocess (if spawned here) is
/// terminated on every exit path.
pub async fn run(settings: RelaySettings, shutdown: CancellationToken) -> Result<()> {
    info!(state = %LifecycleState::Initializing, "relay starting");
    settings.validate()?;

    let kernel = match &settings.kernel {
        Some(command) => {
            let process = KernelProcess::spawn(command)?;
            tokio::time::sleep(KERNEL_STARTUP_DELAY).await;
            Some(process)
        }
        None => None,
    };

    let outcome = match connect_endpoints(&settings).await {
        Ok((issuer, channels)) => run_relays(&settings, issuer, channels, shutdown).await,
        Err(err) => Err(err),
    };

    if let Some(kernel) = kernel {
        kernel.terminate(settings.terminate_grace).await;
    }
    info!(state = %LifecycleState::Stopped, "relay stopped");
    outcome
}

/// Open the outward issuer connection and all five kernel-side endpoints.
/// On partial failure every endpoint opened so far is closed before the
/// error is returned.
async fn connect_endpoints(
    settings: &RelaySettings,
) -> Result<(Endpoint, Vec<(ChannelId, Endpoint)>)> {
    let issuer = Endpoint::connect(&settings.issuer_addr, SocketPattern::Dealer)
        .await
        .map_err(|source| RelayError::connection(ISSUER, source))?;
    info!(addr = %settings.issuer_addr, "connected to issuer");

    let mut channels: Vec<(ChannelId, Endpoint)> = Vec::with_capacity(ChannelId::ALL.len());
    for id in ChannelId::ALL {
        let addr = settings.connection.endpoint_addr(id);
        match Endpoint::connect(&addr, id.pattern()).await {
            Ok(endpoint) => {
                info!(channel = %id, %addr, "connected kernel endpoint");
                channels.push((id, endpoint));
            }
            Err(source) => {
                issuer.close().await;
                for (_, endpoint) in channels {
                    endpoint.close().await;
                }
                return Err(RelayError::connection(id.as_str(), source));
            }
        }
    }
    Ok((issuer, channels))
}

async fn run_relays(
    settings: &RelaySettings,
    issuer: Endpoint,
    channels: Vec<(ChannelId, Endpoint)>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (registry, inboxes) = ChannelRegistry::new(settings.queue_capacity);
    let (outward_tx, outward_rx) = mpsc::channel(settings.queue_capacity);

    let ChannelInboxes {
        control,
        shell,
        stdin,
        heartbeat,
        iopub,
    } = inboxes;
    let mut inboxes: HashMap<ChannelId, mpsc::Receiver<zeromq::ZmqMessage>> = [
        (ChannelId::Control, control),
        (ChannelId::Shell, shell),
        (ChannelId::Stdin, stdin),
        (ChannelId::Heartbeat, heartbeat),
        (ChannelId::Iopub, iopub),
    ]
    .into_iter()
    .collect();

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    for (id, endpoint) in channels {
        let inbox = match inboxes.remove(&id) {
            Some(inbox) => inbox,
            None => {
                endpoint.close().await;
                return Err(RelayError::Internal(format!("no inbox for '{id}' channel")));
            }
        };
        let outward = outward_tx.clone();
        let token = shutdown.clone();
        match id.pattern() {
            SocketPattern::Req => {
                tasks.spawn(run_request_channel(id, endpoint, inbox, outward, token));
            }
            SocketPattern::Sub => {
                tasks.spawn(run_subscribe_channel(id, endpoint, inbox, outward, token));
            }
            SocketPattern::Dealer => {
                endpoint.close().await;
                return Err(RelayError::Internal(format!(
                    "kernel channel '{id}' mapped to a dealer endpoint"
                )));
            }
        }
    }
    // The relay tasks hold the only senders now; the outward queue closes
    // when the last of them exits.
    drop(outward_tx);
    tasks.spawn(run_outward_relay(
        issuer,
        registry,
        outward_rx,
        shutdown.clone(),
    ));

    info!(state = %LifecycleState::Running, tasks = tasks.len(), "relay running");

    let mut failure: Option<RelayError> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                break;
            }
            joined = tasks.join_next() => match joined {
                None => break, // every task exited on its own
                Some(Ok(Ok(()))) => continue,
                Some(Ok(Err(err))) => {
                    error!(error = %err, "relay task failed");
                    failure = Some(err);
                    break;
                }
                Some(Err(join_err)) => {
                    failure = Some(RelayError::Internal(format!(
                        "relay task panicked: {join_err}"
                    )));
                    break;
                }
            }
        }
    }

    info!(state = %LifecycleState::ShuttingDown, "stopping relay tasks");
    shutdown.cancel();
    drain(&mut tasks, &mut failure).await;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Wait for every relay task to exit, aborting stragglers after the drain
/// window. First failure wins; later ones are only logged.
async fn drain(tasks: &mut JoinSet<Result<()>>, failure: &mut Option<RelayError>) {
    let drained = tokio::time::timeout(SHUTDOWN_DRAIN, async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if failure.is_none() {
                        *failure = Some(err);
                    } else {
                        debug!(error = %err, "secondary relay failure during shutdown");
                    }
                }
                Err(join_err) => {
                    if failure.is_none() {
                        *failure =
                            Some(RelayError::Internal(format!("relay task panicked: {join_err}")));
                    }
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!("relay tasks did not stop within the drain window, aborting");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_connection() -> ConnectionInfo {
        serde_json::from_str(
            r#"{
                "shell_port": 53001,
                "iopub_port": 53002,
                "stdin_port": 53003,
                "control_port": 53004,
                "hb_port": 53005,
                "ip": "127.0.0.1",
                "transport": "tcp"
            }"#,
        )
        .expect("sample should parse")
    }

    #[test]
    fn settings_default_to_no_kernel_and_sane_queues() {
        let settings = RelaySettings::new(sample_connection(), "tcp://127.0.0.1:9999");
        assert!(settings.kernel.is_none());
        assert_eq!(settings.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        settings.validate().expect("defaults should validate");
    }

    #[test]
    fn issuer_address_must_carry_a_scheme() {
        let settings = RelaySettings::new(sample_connection(), "127.0.0.1:9999");
        let err = settings.validate().expect_err("schemeless address should fail");
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let mut settings = RelaySettings::new(sample_connection(), "tcp://127.0.0.1:9999");
        settings.queue_capacity = 0;
        assert!(matches!(settings.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn lifecycle_states_render_for_logging() {
        let names: Vec<String> = [
            LifecycleState::Initializing,
            LifecycleState::Running,
            LifecycleState::ShuttingDown,
            LifecycleState::Stopped,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, ["initializing", "running", "shutting-down", "stopped"]);
    }
}
