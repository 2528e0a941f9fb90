//! sqltunnel daemon: state directory, reconciliation, process supervision and
//! per-endpoint TCP forwarding.

pub mod dialer;
mod error;
pub mod forwarder;
pub mod launcher;
pub mod log_rotation;
pub mod paths;
pub mod process;
pub mod reconcile;
mod runtime;
pub mod state;
pub mod stop;
pub mod supervisor;

pub use dialer::{BoxedStream, Dialer, DialerFactory, RemoteStream, TcpDialer};
pub use error::{DaemonError, DialError, StateReadError};
pub use forwarder::{Forwarder, ForwarderState};
pub use launcher::{DetachedLauncher, ProcessLauncher};
pub use reconcile::{decide, decide_with, Decision, Reconciliation};
pub use runtime::init_tracing;
pub use stop::{stop_daemon_at, StopOutcome, StopPolicy};
pub use supervisor::{
    running_state, EndpointReadiness, StartOutcome, StartReport, Supervisor, Timings, DAEMON_ARGS,
};
