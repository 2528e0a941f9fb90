//! Daemon-context plumbing: tracing, the tokio runtime, signals, and the
//! forwarder set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use sqltunnel_core::DesiredConfiguration;

use crate::dialer::Dialer;
use crate::error::{io_err, DaemonError};
use crate::forwarder::Forwarder;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
/// Later calls are no-ops.
pub fn init_tracing() {
    use std::io::IsTerminal;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // The detached daemon writes into daemon.log.
    let ansi = std::io::stdout().is_terminal();
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .try_init();
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sqltunnel-daemon")
        .build()
        .map_err(DaemonError::Runtime)
}

/// Resolves on the first SIGTERM or SIGINT.
///
/// Handlers are installed before this returns, so a signal arriving between
/// setup and the first poll is not lost. Must be called inside a runtime.
pub(crate) fn shutdown_signal() -> Result<impl Future<Output = ()>, DaemonError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(|e| io_err("SIGINT handler", e))?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = interrupt.recv() => tracing::info!("received SIGINT, shutting down"),
        }
    })
}

/// Bind one forwarder per endpoint, in configuration order.
///
/// All or nothing: on the first bind failure every forwarder already started
/// is closed in reverse order before the error is returned.
pub(crate) async fn start_forwarders(
    config: &DesiredConfiguration,
    dialer: &Arc<dyn Dialer>,
    root: &CancellationToken,
    drain_timeout: Duration,
) -> Result<Vec<Forwarder>, DaemonError> {
    let mut started = Vec::with_capacity(config.len());
    for spec in config {
        let mut forwarder = Forwarder::new(spec.clone(), Arc::clone(dialer));
        match forwarder.start(root).await {
            Ok(addr) => {
                tracing::info!(instance = %spec.instance, %addr, "forwarder listening");
                started.push(forwarder);
            }
            Err(err) => {
                tracing::error!(
                    instance = %spec.instance,
                    port = spec.port,
                    error = %err,
                    "forwarder failed to bind; rolling back",
                );
                shutdown_forwarders(&mut started, drain_timeout).await;
                return Err(err);
            }
        }
    }
    Ok(started)
}

/// Close every forwarder in reverse start order, giving in-flight connections
/// `drain_timeout` to finish before they are aborted.
pub(crate) async fn shutdown_forwarders(forwarders: &mut [Forwarder], drain_timeout: Duration) {
    let drained = tokio::time::timeout(drain_timeout, async {
        for forwarder in forwarders.iter_mut().rev() {
            forwarder.close().await;
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(timeout = ?drain_timeout, "connections still open after drain timeout; aborting");
        for forwarder in forwarders.iter() {
            forwarder.abort_connections();
        }
        for forwarder in forwarders.iter_mut().rev() {
            forwarder.close().await;
        }
    }
}
