//! Kernel subprocess supervision.
//!
//! The relay only interacts with the kernel process at two points: it must
//! be alive before the channel endpoints are connected, and it must be
//! terminated during shutdown. Everything in between goes over ZeroMQ.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{RelayError, Result};

/// How a kernel is launched: `<program> kernel -f <connection_file>`.
///
/// The default program is `ipython`, matching the stock IPython kernel
/// launcher; any program accepting the same argument shape works.
#[derive(Debug, Clone)]
pub struct KernelCommand {
    pub program: String,
    pub connection_file: PathBuf,
}

impl KernelCommand {
    pub fn new(program: impl Into<String>, connection_file: impl AsRef<Path>) -> Self {
        KernelCommand {
            program: program.into(),
            connection_file: connection_file.as_ref().to_path_buf(),
        }
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("kernel").arg("-f").arg(&self.connection_file);
        command
    }
}

/// A running kernel subprocess.
#[derive(Debug)]
pub struct KernelProcess {
    child: Child,
}

impl KernelProcess {
    /// Start the kernel. Failure here is fatal before the relay ever
    /// enters its running state.
    pub fn spawn(command: &KernelCommand) -> Result<Self> {
        let child = command
            .to_command()
            .kill_on_drop(true)
            .spawn()
            .map_err(RelayError::Subprocess)?;
        info!(
            pid = child.id(),
            program = %command.program,
            connection_file = %command.connection_file.display(),
            "started kernel subprocess"
        );
        Ok(KernelProcess { child })
    }

    /// OS process id, if the kernel has not already exited.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Terminate the kernel: SIGTERM, wait up to `grace`, then SIGKILL.
    pub async fn terminate(mut self, grace: Duration) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SIGTERM first so the kernel can flush state.
            let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if ret == 0 {
                match tokio::time::timeout(grace, self.child.wait()).await {
                    Ok(Ok(status)) => {
                        info!(%status, "kernel subprocess exited");
                        return;
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "failed to reap kernel subprocess");
                        return;
                    }
                    Err(_) => {
                        warn!(pid, "kernel did not exit within grace period, killing");
                    }
                }
            }
        }
        #[cfg(not(unix))]
        let _ = grace;

        if let Err(err) = self.child.kill().await {
            warn!(error = %err, "failed to kill kernel subprocess");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_failure_is_a_subprocess_error() {
        let command = KernelCommand::new("/nonexistent/kernel-binary", "/tmp/conn.json");
        let err = KernelProcess::spawn(&command).expect_err("missing binary should fail");
        assert!(matches!(err, RelayError::Subprocess(_)));
    }

    #[tokio::test]
    async fn terminate_reaps_a_live_process() {
        // `sleep` ignores nothing and dies promptly on SIGTERM, standing in
        // for a kernel that shuts down within the grace period.
        let mut command = Command::new("sleep");
        command.arg("30");
        let child = command
            .kill_on_drop(true)
            .spawn()
            .expect("sleep should spawn");
        let process = KernelProcess { child };
        assert!(process.id().is_some());

        process.terminate(Duration::from_secs(5)).await;
    }
}
