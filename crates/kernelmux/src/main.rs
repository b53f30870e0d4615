mod exit;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kernelmux_relay::{ConnectionInfo, KernelCommand, RelayError, RelaySettings};

use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "kernelmux",
    version,
    about = "Tunnel a Jupyter kernel's five channels over one issuer connection"
)]
struct Cli {
    /// Path to the kernel connection file.
    #[arg(long, value_name = "FILE", env = "KERNELMUX_CONN_FILE")]
    conn_file: PathBuf,

    /// Address of the command issuer, e.g. gateway.example.org:9999.
    #[arg(long, value_name = "ADDR", env = "KERNELMUX_ISSUER_ADDR")]
    issuer_addr: String,

    /// Transport scheme for the issuer connection.
    #[arg(long, value_name = "SCHEME", default_value = "tcp", env = "KERNELMUX_TRANSPORT")]
    transport: String,

    /// Kernel launcher; invoked as `<BIN> kernel -f <FILE>`.
    #[arg(long, value_name = "BIN", default_value = "ipython", env = "KERNELMUX_KERNEL_BIN")]
    kernel_bin: String,

    /// Do not spawn a kernel; one is already serving the connection file.
    #[arg(long, env = "KERNELMUX_NO_SPAWN")]
    no_spawn: bool,

    /// Seconds to wait for graceful kernel shutdown before SIGKILL.
    #[arg(long, value_name = "SECONDS", default_value_t = 5, env = "KERNELMUX_TERMINATE_TIMEOUT")]
    terminate_timeout: u64,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let code = match run(cli).await {
        Ok(()) => exit::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            exit::code_for(&err)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> kernelmux_relay::Result<()> {
    // The scheme comes from --transport; a full URL here would otherwise
    // end up as "tcp://tcp://...".
    if cli.issuer_addr.contains("://") {
        return Err(RelayError::Config(format!(
            "--issuer-addr {:?} already includes a transport scheme; set --transport instead",
            cli.issuer_addr
        )));
    }

    let connection = ConnectionInfo::from_file(&cli.conn_file)?;

    let mut settings = RelaySettings::new(
        connection,
        format!("{}://{}", cli.transport, cli.issuer_addr),
    );
    if !cli.no_spawn {
        settings.kernel = Some(KernelCommand::new(&cli.kernel_bin, &cli.conn_file));
    }
    settings.terminate_grace = Duration::from_secs(cli.terminate_timeout);

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    kernelmux_relay::run(settings, shutdown).await
}

/// Cancel the shutdown token on SIGINT or SIGTERM.
fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(err) => {
                        warn!(error = %err, "cannot install SIGTERM handler");
                        let _ = tokio::signal::ctrl_c().await;
                        token.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received interrupt"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt");
        }
        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_arguments() {
        let cli = Cli::try_parse_from([
            "kernelmux",
            "--conn-file",
            "/tmp/kernel-1.json",
            "--issuer-addr",
            "127.0.0.1:9999",
        ])
        .expect("args should parse");

        assert_eq!(cli.conn_file, PathBuf::from("/tmp/kernel-1.json"));
        assert_eq!(cli.issuer_addr, "127.0.0.1:9999");
        assert_eq!(cli.transport, "tcp");
        assert_eq!(cli.kernel_bin, "ipython");
        assert!(!cli.no_spawn);
        assert_eq!(cli.terminate_timeout, 5);
    }

    #[test]
    fn rejects_a_missing_issuer_address() {
        let err = Cli::try_parse_from(["kernelmux", "--conn-file", "/tmp/kernel-1.json"])
            .expect_err("missing issuer address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[tokio::test]
    async fn rejects_an_issuer_address_with_an_embedded_scheme() {
        let cli = Cli::try_parse_from([
            "kernelmux",
            "--conn-file",
            "/nonexistent/kernel.json",
            "--issuer-addr",
            "tcp://127.0.0.1:9999",
        ])
        .expect("args should parse");

        let err = run(cli).await.expect_err("embedded scheme should fail");
        assert!(matches!(err, RelayError::Config(_)));
        assert!(err.to_string().contains("--transport"));
    }

    #[test]
    fn accepts_an_alternate_transport_and_kernel() {
        let cli = Cli::try_parse_from([
            "kernelmux",
            "--conn-file",
            "/tmp/kernel-1.json",
            "--issuer-addr",
            "broker.local:7000",
            "--transport",
            "ipc",
            "--kernel-bin",
            "python3",
            "--no-spawn",
        ])
        .expect("args should parse");

        assert_eq!(cli.transport, "ipc");
        assert_eq!(cli.kernel_bin, "python3");
        assert!(cli.no_spawn);
    }
}
