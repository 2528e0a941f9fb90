//! Per-endpoint TCP forwarder.
//!
//! Lifecycle: `Created → Bound → Accepting → Closing → Closed`.
//!
//! A forwarder owns one loopback listener and every connection accepted on
//! it. The accept loop and all connection tasks are spawned on a
//! [`TaskTracker`], which is the join barrier [`Forwarder::close`] waits on.
//!
//! Two cancellation scopes are involved:
//! - the *accept scope*, a child of the daemon's root token, stops accepting;
//! - the *connection scope* tears down in-flight connections. Closing does not
//!   trigger it, so connections accepted before `close` drain naturally; the
//!   supervisor calls [`Forwarder::abort_connections`] when its drain bound
//!   expires.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use sqltunnel_core::{EndpointSpec, InstanceName};

use crate::dialer::Dialer;
use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderState {
    Created,
    Bound,
    Accepting,
    Closing,
    Closed,
}

pub struct Forwarder {
    spec: EndpointSpec,
    dialer: Arc<dyn Dialer>,
    state: ForwarderState,
    local_addr: Option<SocketAddr>,
    accept_scope: CancellationToken,
    connection_scope: CancellationToken,
    tasks: TaskTracker,
}

/// Everything a connection task needs, shared by all connections of one forwarder.
struct ConnectionContext {
    instance: InstanceName,
    port: u16,
    dialer: Arc<dyn Dialer>,
    abort: CancellationToken,
}

impl Forwarder {
    pub fn new(spec: EndpointSpec, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            spec,
            dialer,
            state: ForwarderState::Created,
            local_addr: None,
            accept_scope: CancellationToken::new(),
            connection_scope: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn spec(&self) -> &EndpointSpec {
        &self.spec
    }

    pub fn state(&self) -> ForwarderState {
        self.state
    }

    /// Actual bound address; differs from the configured port only when that port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind `127.0.0.1:<port>` and start accepting under a child of `parent`.
    ///
    /// On bind failure the forwarder stays `Created` and nothing was spawned.
    pub async fn start(&mut self, parent: &CancellationToken) -> Result<SocketAddr, DaemonError> {
        let port = self.spec.port;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| DaemonError::Bind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| DaemonError::Bind { port, source })?;
        self.local_addr = Some(local_addr);
        self.state = ForwarderState::Bound;

        self.accept_scope = parent.child_token();
        let ctx = Arc::new(ConnectionContext {
            instance: self.spec.instance.clone(),
            port: local_addr.port(),
            dialer: Arc::clone(&self.dialer),
            abort: self.connection_scope.clone(),
        });
        self.tasks.spawn(accept_loop(
            listener,
            ctx,
            self.accept_scope.clone(),
            self.tasks.clone(),
        ));
        self.state = ForwarderState::Accepting;
        Ok(local_addr)
    }

    /// Stop accepting, drop the listener, and wait for the accept loop and
    /// every outstanding connection to finish.
    ///
    /// No timeout of its own. Safe to call again after an outer timeout
    /// dropped a previous call.
    pub async fn close(&mut self) {
        match self.state {
            ForwarderState::Closed => return,
            ForwarderState::Created => {
                self.state = ForwarderState::Closed;
                return;
            }
            _ => {}
        }

        self.state = ForwarderState::Closing;
        self.accept_scope.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.state = ForwarderState::Closed;
        tracing::info!(port = self.spec.port, instance = %self.spec.instance, "forwarder closed");
    }

    /// Tear down in-flight connections so a pending [`close`](Self::close) can finish.
    pub fn abort_connections(&self) {
        self.connection_scope.cancel();
    }

    /// Number of live tasks (accept loop included).
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }
}

/// Source of client connections for the accept loop.
#[async_trait]
trait Listener: Send + Sync + 'static {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

async fn accept_loop<L: Listener>(
    listener: L,
    ctx: Arc<ConnectionContext>,
    scope: CancellationToken,
    tasks: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((client, peer)) => {
                tracing::debug!(port = ctx.port, %peer, "accepted connection");
                tasks.spawn(handle_connection(client, Arc::clone(&ctx)));
            }
            Err(err) => {
                if scope.is_cancelled() {
                    break;
                }
                tracing::error!(
                    port = ctx.port,
                    error = %err,
                    "accept failed; forwarder stops accepting new connections",
                );
                break;
            }
        }
    }
    tracing::debug!(port = ctx.port, "accept loop exited");
}

async fn handle_connection(client: TcpStream, ctx: Arc<ConnectionContext>) {
    let dialed = tokio::select! {
        _ = ctx.abort.cancelled() => return,
        dialed = ctx.dialer.dial(&ctx.instance) => dialed,
    };
    let remote = match dialed {
        Ok(remote) => remote,
        Err(err) => {
            tracing::warn!(
                port = ctx.port,
                instance = %ctx.instance,
                error = %err,
                "dial failed; closing client connection",
            );
            return;
        }
    };

    if let Err(err) = client.set_nodelay(true) {
        tracing::debug!(port = ctx.port, error = %err, "could not disable Nagle on client socket");
    }

    let (upstream, downstream) = pump(client, remote, ctx.abort.child_token()).await;
    tracing::debug!(port = ctx.port, ?upstream, ?downstream, "connection closed");
}

/// Copy `client → remote` and `remote → client` concurrently.
///
/// The first direction to reach end-of-stream or an I/O error cancels
/// `teardown`, which stops the other direction. Returns once both directions
/// are done; dropping the halves then closes both sockets.
pub(crate) async fn pump<C, R>(
    client: C,
    remote: R,
    teardown: CancellationToken,
) -> (io::Result<u64>, io::Result<u64>)
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    R: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut client_rx, mut client_tx) = tokio::io::split(client);
    let (mut remote_rx, mut remote_tx) = tokio::io::split(remote);

    tokio::join!(
        copy_direction(&mut client_rx, &mut remote_tx, &teardown),
        copy_direction(&mut remote_rx, &mut client_tx, &teardown),
    )
}

async fn copy_direction<R, W>(
    reader: &mut R,
    writer: &mut W,
    teardown: &CancellationToken,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::select! {
        copied = tokio::io::copy(reader, writer) => copied,
        _ = teardown.cancelled() => {
            return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "connection torn down"));
        }
    };

    if copied.is_ok() {
        // Peer may already be gone.
        let _ = writer.shutdown().await;
    }
    teardown.cancel();
    copied
}
