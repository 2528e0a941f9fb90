//! Remote dialer seam.
//!
//! The daemon builds one [`Dialer`] for its whole lifetime and shares it across
//! every forwarder and connection, so implementations must be `Send + Sync` and
//! must not need `&mut self`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use sqltunnel_core::types::InstanceName;

use crate::error::{DaemonError, DialError};
use crate::paths::DIAL_TIMEOUT;

/// Byte stream to a remote endpoint.
pub trait RemoteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RemoteStream for T {}

pub type BoxedStream = Box<dyn RemoteStream>;

#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, instance: &InstanceName) -> Result<BoxedStream, DialError>;

    /// Release shared resources. Called once at daemon shutdown.
    async fn close(&self) -> Result<(), DialError> {
        Ok(())
    }
}

/// Builds the daemon's shared dialer after the identity file is written.
pub type DialerFactory = Arc<dyn Fn() -> Result<Arc<dyn Dialer>, DaemonError> + Send + Sync>;

/// Dials `host:port` identifiers directly over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn factory() -> DialerFactory {
        Arc::new(|| Ok(Arc::new(TcpDialer::default()) as Arc<dyn Dialer>))
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(DIAL_TIMEOUT)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, instance: &InstanceName) -> Result<BoxedStream, DialError> {
        if !is_host_port(instance.as_str()) {
            return Err(DialError::Unsupported {
                instance: instance.clone(),
            });
        }

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(instance.as_str()))
            .await
            .map_err(|_| DialError::Timeout {
                instance: instance.clone(),
                after: self.connect_timeout,
            })?
            .map_err(|source| DialError::Connect {
                instance: instance.clone(),
                source,
            })?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%instance, error = %err, "could not disable Nagle on remote socket");
        }
        Ok(Box::new(stream))
    }
}

fn is_host_port(identifier: &str) -> bool {
    match identifier.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}
