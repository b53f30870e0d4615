//! The kernel connection descriptor.
//!
//! A Jupyter-style connection file names the kernel's five channel ports,
//! bind address, and transport scheme. It is produced by whoever provisions
//! the kernel; the relay only reads it, once, before any endpoint is
//! opened.

use std::path::Path;

use serde::Deserialize;

use crate::channel::ChannelId;
use crate::error::{RelayError, Result};

/// Immutable record of the kernel's endpoint addresses.
///
/// Field names match the Jupyter connection-file keys; unrelated keys in
/// the file (`key`, `signature_scheme`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInfo {
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub hb_port: u16,
    pub control_port: u16,
    pub ip: String,
    pub transport: String,
}

impl ConnectionInfo {
    /// Read and parse a connection file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            RelayError::Config(format!(
                "cannot read connection file {}: {err}",
                path.display()
            ))
        })?;
        let info: ConnectionInfo = serde_json::from_slice(&data).map_err(|err| {
            RelayError::Config(format!(
                "cannot parse connection file {}: {err}",
                path.display()
            ))
        })?;
        info.validate()?;
        Ok(info)
    }

    /// Check the descriptor is complete enough to build endpoint addresses.
    pub fn validate(&self) -> Result<()> {
        if self.ip.is_empty() {
            return Err(RelayError::Config("connection file has empty ip".into()));
        }
        if self.transport.is_empty() {
            return Err(RelayError::Config(
                "connection file has empty transport".into(),
            ));
        }
        for id in ChannelId::ALL {
            if self.port(id) == 0 {
                return Err(RelayError::Config(format!(
                    "connection file has no port for the '{id}' channel"
                )));
            }
        }
        Ok(())
    }

    /// The port assigned to a channel.
    pub fn port(&self, id: ChannelId) -> u16 {
        match id {
            ChannelId::Control => self.control_port,
            ChannelId::Shell => self.shell_port,
            ChannelId::Stdin => self.stdin_port,
            ChannelId::Heartbeat => self.hb_port,
            ChannelId::Iopub => self.iopub_port,
        }
    }

    /// The full endpoint address for a channel, e.g. `tcp://127.0.0.1:5901`.
    pub fn endpoint_addr(&self, id: ChannelId) -> String {
        format!("{}://{}:{}", self.transport, self.ip, self.port(id))
    }
}
