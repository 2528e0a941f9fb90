//! Process supervisor: the launcher context (`sqltunnel start`) and the
//! daemon context (`sqltunnel start --daemon`).
//!
//! Every collaborator is injected, so tests drive the full flow against a
//! temporary state directory with fake config, credentials, dialer and
//! launcher.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sqltunnel_core::{
    AdcCredentialChecker, ConfigProvider, CredentialChecker, DaemonState, EndpointSpec, YamlConfigProvider,
};

use crate::dialer::{Dialer, DialerFactory, TcpDialer};
use crate::error::{io_err, DaemonError};
use crate::launcher::{DetachedLauncher, ProcessLauncher};
use crate::log_rotation::rotate_daemon_log;
use crate::paths::{log_path, DRAIN_TIMEOUT, READINESS_TIMEOUT, STARTUP_GRACE};
use crate::reconcile::{decide, Decision};
use crate::runtime::{build_runtime, init_tracing, shutdown_signal, shutdown_forwarders, start_forwarders};
use crate::state::{clear_stale_at, remove_state_files_at, write_pid_at, write_state_at};
use crate::stop::{stop_daemon_at, StopOutcome, StopPolicy};

/// Arguments that select the daemon context when the binary re-executes itself.
pub const DAEMON_ARGS: [&str; 2] = ["start", "--daemon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub startup_grace: Duration,
    pub readiness_timeout: Duration,
    pub drain_timeout: Duration,
    pub stop: StopPolicy,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            startup_grace: STARTUP_GRACE,
            readiness_timeout: READINESS_TIMEOUT,
            drain_timeout: DRAIN_TIMEOUT,
            stop: StopPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live daemon already serves this configuration.
    AlreadyRunning { pid: u32 },
    /// A new daemon was spawned, replacing `replaced` if one was running.
    Started { pid: u32, replaced: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReadiness {
    pub spec: EndpointSpec,
    /// A TCP connect to the local port succeeded after the startup grace.
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub outcome: StartOutcome,
    /// Empty for [`StartOutcome::AlreadyRunning`].
    pub readiness: Vec<EndpointReadiness>,
}

pub struct Supervisor {
    state_dir: PathBuf,
    config_path: PathBuf,
    config: Arc<dyn ConfigProvider>,
    credentials: Arc<dyn CredentialChecker>,
    dialers: DialerFactory,
    launcher: Arc<dyn ProcessLauncher>,
    timings: Timings,
}

impl Supervisor {
    /// Production wiring: YAML config, ADC preflight, TCP dialer, detached launcher.
    pub fn new(state_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            config_path: config_path.into(),
            config: Arc::new(YamlConfigProvider),
            credentials: Arc::new(AdcCredentialChecker::from_env()),
            dialers: TcpDialer::factory(),
            launcher: Arc::new(DetachedLauncher),
            timings: Timings::default(),
        }
    }

    pub fn with_config_provider(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = config;
        self
    }

    pub fn with_credential_checker(mut self, credentials: Arc<dyn CredentialChecker>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_dialer_factory(mut self, dialers: DialerFactory) -> Self {
        self.dialers = dialers;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    // -----------------------------------------------------------------------
    // Launcher context
    // -----------------------------------------------------------------------

    /// Make sure a daemon serving the current configuration is running.
    ///
    /// `program` is re-executed with [`DAEMON_ARGS`] and `--config <path>`.
    pub fn start(&self, program: &Path) -> Result<StartReport, DaemonError> {
        self.credentials.check()?;
        let desired = self.config.load(&self.config_path)?;

        let reconciliation = decide(&desired, &self.state_dir);
        let replaced = match reconciliation.decision {
            Decision::Keep => {
                tracing::info!(pid = reconciliation.pid, "daemon already serves this configuration");
                return Ok(StartReport {
                    outcome: StartOutcome::AlreadyRunning {
                        pid: reconciliation.pid,
                    },
                    readiness: Vec::new(),
                });
            }
            Decision::Restart => {
                tracing::info!(pid = reconciliation.pid, "configuration changed, restarting daemon");
                stop_daemon_at(&self.state_dir, self.timings.stop);
                Some(reconciliation.pid)
            }
            Decision::Start => None,
        };

        clear_stale_at(&self.state_dir);
        fs::create_dir_all(&self.state_dir).map_err(|e| io_err(&self.state_dir, e))?;
        rotate_daemon_log(&self.state_dir);

        let log_file = log_path(&self.state_dir);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| io_err(&log_file, e))?;

        let pid = self.launcher.spawn_detached(program, &self.daemon_args(), log)?;
        tracing::info!(pid, "daemon spawned");

        std::thread::sleep(self.timings.startup_grace);
        let readiness = desired
            .iter()
            .map(|spec| EndpointReadiness {
                spec: spec.clone(),
                ready: probe_port(spec.port, self.timings.readiness_timeout),
            })
            .collect();

        Ok(StartReport {
            outcome: StartOutcome::Started { pid, replaced },
            readiness,
        })
    }

    /// Stop the daemon on record, if any.
    pub fn stop(&self) -> StopOutcome {
        stop_daemon_at(&self.state_dir, self.timings.stop)
    }

    fn daemon_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = DAEMON_ARGS.iter().map(OsString::from).collect();
        args.push("--config".into());
        args.push(self.config_path.clone().into_os_string());
        args
    }

    // -----------------------------------------------------------------------
    // Daemon context
    // -----------------------------------------------------------------------

    /// Entry point of the detached daemon: serve until SIGTERM or SIGINT.
    pub fn run_daemon(&self) -> Result<(), DaemonError> {
        init_tracing();
        let runtime = build_runtime()?;
        runtime.block_on(async {
            let shutdown = shutdown_signal()?;
            self.serve(shutdown).await
        })
    }

    /// Serve the configured endpoints until `shutdown` resolves.
    ///
    /// The identity file is written first and, together with the state file,
    /// removed on every exit path.
    pub async fn serve<F>(&self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let pid = std::process::id();
        write_pid_at(&self.state_dir, pid)?;
        tracing::info!(pid, state_dir = %self.state_dir.display(), "daemon starting");

        let result = self.serve_inner(pid, shutdown).await;
        remove_state_files_at(&self.state_dir);
        match &result {
            Ok(()) => tracing::info!(pid, "daemon stopped"),
            Err(err) => tracing::error!(pid, error = %err, "daemon exited with error"),
        }
        result
    }

    async fn serve_inner<F>(&self, pid: u32, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let config = self.config.load(&self.config_path)?;
        let dialer = (self.dialers)()?;
        let root = CancellationToken::new();

        let mut forwarders = match start_forwarders(&config, &dialer, &root, self.timings.drain_timeout).await {
            Ok(forwarders) => forwarders,
            Err(err) => {
                close_dialer(dialer.as_ref()).await;
                return Err(err);
            }
        };

        if let Err(err) = write_state_at(&self.state_dir, &DaemonState::new(pid, &config)) {
            root.cancel();
            shutdown_forwarders(&mut forwarders, self.timings.drain_timeout).await;
            close_dialer(dialer.as_ref()).await;
            return Err(err);
        }
        tracing::info!(endpoints = forwarders.len(), "all forwarders listening");

        shutdown.await;

        root.cancel();
        shutdown_forwarders(&mut forwarders, self.timings.drain_timeout).await;
        close_dialer(dialer.as_ref()).await;
        Ok(())
    }
}

async fn close_dialer(dialer: &dyn Dialer) {
    if let Err(err) = dialer.close().await {
        tracing::warn!(error = %err, "closing dialer failed");
    }
}

fn probe_port(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

/// The state snapshot of the daemon under `state_dir`, if that daemon is alive.
pub fn running_state(state_dir: &Path) -> Option<DaemonState> {
    let state = crate::state::read_state_at(state_dir).ok()?;
    crate::process::is_running(state.pid).then_some(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use sqltunnel_core::{ConfigError, CredentialError, DesiredConfiguration, InstanceName};

    use crate::dialer::BoxedStream;
    use crate::error::DialError;
    use crate::paths::{pid_path, state_path};
    use crate::state::{read_pid_at, read_state_at};

    struct StaticConfig(DesiredConfiguration);

    impl ConfigProvider for StaticConfig {
        fn load(&self, _path: &Path) -> Result<DesiredConfiguration, ConfigError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenConfig;

    impl ConfigProvider for BrokenConfig {
        fn load(&self, _path: &Path) -> Result<DesiredConfiguration, ConfigError> {
            Err(ConfigError::Invalid {
                path: "proxies.0.port".into(),
                constraint: "must be between 1024 and 65535".into(),
            })
        }
    }

    struct Credentials(bool);

    impl CredentialChecker for Credentials {
        fn check(&self) -> Result<(), CredentialError> {
            if self.0 {
                Ok(())
            } else {
                Err(CredentialError::Missing)
            }
        }
    }

    /// Records spawns instead of starting anything.
    #[derive(Default)]
    struct RecordingLauncher {
        spawned: Mutex<Vec<(PathBuf, Vec<OsString>)>>,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn spawn_detached(&self, program: &Path, args: &[OsString], _log: File) -> Result<u32, DaemonError> {
            self.spawned
                .lock()
                .unwrap()
                .push((program.to_path_buf(), args.to_vec()));
            Ok(99_999)
        }
    }

    struct EchoDialer {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Dialer for EchoDialer {
        async fn dial(&self, _instance: &InstanceName) -> Result<BoxedStream, DialError> {
            let (near, far) = tokio::io::duplex(4096);
            tokio::spawn(async move {
                let (mut rx, mut tx) = tokio::io::split(far);
                let _ = tokio::io::copy(&mut rx, &mut tx).await;
            });
            Ok(Box::new(near))
        }

        async fn close(&self) -> Result<(), DialError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn echo_factory(closed: Arc<AtomicUsize>) -> DialerFactory {
        Arc::new(move || {
            Ok(Arc::new(EchoDialer {
                closed: Arc::clone(&closed),
            }) as Arc<dyn Dialer>)
        })
    }

    fn fast_timings() -> Timings {
        Timings {
            startup_grace: Duration::from_millis(10),
            readiness_timeout: Duration::from_millis(200),
            drain_timeout: Duration::from_millis(500),
            stop: StopPolicy {
                timeout: Duration::from_millis(500),
                poll_interval: Duration::from_millis(20),
            },
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn supervisor(dir: &Path, config: DesiredConfiguration) -> (Supervisor, Arc<RecordingLauncher>, Arc<AtomicUsize>) {
        let launcher = Arc::new(RecordingLauncher::default());
        let closed = Arc::new(AtomicUsize::new(0));
        let sup = Supervisor::new(dir, dir.join("config.yaml"))
            .with_config_provider(Arc::new(StaticConfig(config)))
            .with_credential_checker(Arc::new(Credentials(true)))
            .with_dialer_factory(echo_factory(Arc::clone(&closed)))
            .with_launcher(launcher.clone())
            .with_timings(fast_timings());
        (sup, launcher, closed)
    }

    fn one_endpoint(port: u16) -> DesiredConfiguration {
        DesiredConfiguration::new(vec![EndpointSpec::new("proj:us-central1:orders", port, "orders-pw")])
    }

    #[test]
    fn start_spawns_daemon_with_config_path() {
        let dir = TempDir::new().unwrap();
        let (sup, launcher, _) = supervisor(dir.path(), one_endpoint(free_port()));

        let report = sup.start(Path::new("/usr/local/bin/sqltunnel")).unwrap();
        assert_eq!(
            report.outcome,
            StartOutcome::Started {
                pid: 99_999,
                replaced: None
            }
        );
        assert_eq!(report.readiness.len(), 1);
        assert!(!report.readiness[0].ready, "nothing listens in this test");

        let spawned = launcher.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 1);
        let (program, args) = &spawned[0];
        assert_eq!(program, Path::new("/usr/local/bin/sqltunnel"));
        let expected: Vec<OsString> = vec![
            "start".into(),
            "--daemon".into(),
            "--config".into(),
            dir.path().join("config.yaml").into_os_string(),
        ];
        assert_eq!(args, &expected);
        assert!(log_path(dir.path()).exists(), "log is created before spawning");
    }

    #[test]
    fn start_keeps_matching_daemon() {
        let dir = TempDir::new().unwrap();
        let config = one_endpoint(free_port());
        let own = std::process::id();
        write_pid_at(dir.path(), own).unwrap();
        write_state_at(dir.path(), &DaemonState::new(own, &config)).unwrap();

        let (sup, launcher, _) = supervisor(dir.path(), config);
        let report = sup.start(Path::new("sqltunnel")).unwrap();
        assert_eq!(report.outcome, StartOutcome::AlreadyRunning { pid: own });
        assert!(report.readiness.is_empty());
        assert!(launcher.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn start_clears_stale_identity_before_spawning() {
        let dir = TempDir::new().unwrap();
        let config = one_endpoint(free_port());
        let dead = crate::process::tests::exited_pid();
        write_pid_at(dir.path(), dead).unwrap();
        write_state_at(dir.path(), &DaemonState::new(dead, &config)).unwrap();

        let (sup, launcher, _) = supervisor(dir.path(), config);
        let report = sup.start(Path::new("sqltunnel")).unwrap();
        assert!(matches!(report.outcome, StartOutcome::Started { replaced: None, .. }));
        assert!(!pid_path(dir.path()).exists());
        assert!(!state_path(dir.path()).exists());
        assert_eq!(launcher.spawned.lock().unwrap().len(), 1);
    }

    #[test]
    fn start_fails_fast_without_credentials() {
        let dir = TempDir::new().unwrap();
        let (sup, launcher, _) = supervisor(dir.path(), one_endpoint(free_port()));
        let sup = sup.with_credential_checker(Arc::new(Credentials(false)));

        let err = sup.start(Path::new("sqltunnel")).unwrap_err();
        assert!(matches!(err, DaemonError::Credential(CredentialError::Missing)));
        assert!(launcher.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn start_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let (sup, launcher, _) = supervisor(dir.path(), one_endpoint(free_port()));
        let sup = sup.with_config_provider(Arc::new(BrokenConfig));

        let err = sup.start(Path::new("sqltunnel")).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
        assert!(launcher.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_without_daemon_reports_not_running() {
        let dir = TempDir::new().unwrap();
        let (sup, _, _) = supervisor(dir.path(), one_endpoint(free_port()));
        assert_eq!(sup.stop(), StopOutcome::NotRunning);
        assert_eq!(sup.stop(), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn serve_forwards_until_shutdown_then_cleans_up() {
        let dir = TempDir::new().unwrap();
        let port = free_port();
        let config = one_endpoint(port);
        let (sup, _, closed) = supervisor(dir.path(), config.clone());
        let sup = Arc::new(sup);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serving = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move {
                sup.serve(async {
                    let _ = stop_rx.await;
                })
                .await
            })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while read_state_at(dir.path()).is_err() {
            assert!(tokio::time::Instant::now() < deadline, "state.json never appeared");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let state = read_state_at(dir.path()).unwrap();
        assert_eq!(state.pid, std::process::id());
        assert!(config.is_equivalent(&state.proxies));
        assert_eq!(read_pid_at(dir.path()).unwrap(), std::process::id());
        assert_eq!(running_state(dir.path()), Some(state));

        let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");
        drop(client);

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .expect("serve returns after shutdown")
            .unwrap()
            .unwrap();

        assert!(!pid_path(dir.path()).exists());
        assert!(!state_path(dir.path()).exists());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok(), "port released");
    }

    #[tokio::test]
    async fn serve_is_all_or_nothing_when_a_port_is_taken() {
        let dir = TempDir::new().unwrap();
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let held_port = held.local_addr().unwrap().port();
        let first_port = free_port();
        let config = DesiredConfiguration::new(vec![
            EndpointSpec::new("proj:us-central1:orders", first_port, "orders-pw"),
            EndpointSpec::new("proj:us-central1:users", held_port, "users-pw"),
        ]);
        let (sup, _, closed) = supervisor(dir.path(), config);

        let err = sup.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, DaemonError::Bind { port, .. } if port == held_port));

        assert!(!pid_path(dir.path()).exists());
        assert!(!state_path(dir.path()).exists());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(std::net::TcpListener::bind(("127.0.0.1", first_port)).is_ok());
    }

    #[tokio::test]
    async fn serve_with_bad_config_removes_identity() {
        let dir = TempDir::new().unwrap();
        let (sup, _, closed) = supervisor(dir.path(), one_endpoint(free_port()));
        let sup = sup.with_config_provider(Arc::new(BrokenConfig));

        let err = sup.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
        assert!(!pid_path(dir.path()).exists());
        assert_eq!(closed.load(Ordering::SeqCst), 0, "dialer is never built");
    }
}
