//! Top-level process supervision: ordered startup, periodic health checks,
//! and coordinated shutdown.
//!
//! [`Scanner::run`](crate::scanner::Scanner::run) already spawns one
//! reconnect-loop task per subsystem (oracle events, pool events, tiered
//! cycles). `Supervisor` sits above that: it decides what counts as a fatal
//! condition worth stopping the whole process for (the same distinction
//! [`LiquidatorError::is_fatal`](crate::errors::LiquidatorError::is_fatal)
//! draws at the error level), broadcasts a shutdown signal to every
//! supervised task when that happens, and reports a process exit code so
//! the surrounding init system (systemd, Docker) can tell a clean exit from
//! a crash.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{error, info, warn};

use crate::errors::{LiquidatorError, UnbuildableReason};
use crate::health_resolver::HealthResolver;
use crate::metrics::MetricsRegistry;

/// Process exit codes. `0` is the only code init systems treat as
/// "don't restart me" by convention; anything else signals the process
/// should be restarted (and, for `CONFIG_ERROR`, that restarting won't help
/// until an operator intervenes).
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const FATAL_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

/// A named background task the supervisor tracks and can signal to stop.
/// Mirrors the shape of the reconnect-loop tasks `Scanner::run` already
/// spawns, but gives them a name for logging and a shared shutdown signal
/// instead of running forever unconditionally.
struct Supervised {
    name: &'static str,
    handle: tokio::task::JoinHandle<()>,
}

/// Coordinates startup, health monitoring, and shutdown for the bot's
/// background tasks.
pub struct Supervisor {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_notify: Arc<Notify>,
    tasks: Vec<Supervised>,
    metrics: Arc<MetricsRegistry>,
    health_resolver: Option<Arc<HealthResolver>>,
    fatal: Arc<std::sync::atomic::AtomicBool>,
}

impl Supervisor {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            shutdown_notify: Arc::new(Notify::new()),
            tasks: Vec::new(),
            metrics,
            health_resolver: None,
            fatal: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn with_health_resolver(mut self, resolver: Arc<HealthResolver>) -> Self {
        self.health_resolver = Some(resolver);
        self
    }

    /// Subscribe a new receiver to the shutdown broadcast. Supervised tasks
    /// should `tokio::select!` against this alongside their normal work.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Register an already-spawned task under a name, so the supervisor can
    /// report on it and join it during shutdown. Call this in dependency
    /// order — e.g. the provider/event-listener tasks before the tiered
    /// scan cycles that depend on them having populated the tracker.
    pub fn supervise(&mut self, name: &'static str, handle: tokio::task::JoinHandle<()>) {
        self.tasks.push(Supervised { name, handle });
    }

    /// Record a fatal error from any task. Once set, `run_until_shutdown`
    /// will broadcast shutdown and the process should exit non-zero.
    pub fn report_fatal(&self, error: &LiquidatorError) {
        if error.is_fatal() {
            error!(error = %error, "fatal error reported, initiating shutdown");
            self.fatal.store(true, std::sync::atomic::Ordering::SeqCst);
            self.shutdown_notify.notify_one();
        }
    }

    /// Broadcast the shutdown signal to every subscriber immediately.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.shutdown_notify.notify_one();
    }

    /// Run the periodic health-check / metrics-snapshot loop until either a
    /// fatal error is reported or an external Ctrl-C/SIGTERM arrives, then
    /// join every supervised task and return the process exit code.
    pub async fn run_until_shutdown(mut self, health_interval: Duration) -> i32 {
        let mut ticker = tokio::time::interval(health_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.metrics.log_snapshot();
                    self.log_health();
                }
                _ = self.shutdown_notify.notified() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("ctrl-c received, shutting down");
                    break;
                }
            }
        }

        self.shutdown();
        self.join_all().await;

        if self.fatal.load(std::sync::atomic::Ordering::SeqCst) {
            exit_code::FATAL_ERROR
        } else {
            exit_code::OK
        }
    }

    fn log_health(&self) {
        for task in &self.tasks {
            if task.handle.is_finished() {
                warn!(task = task.name, "supervised task has exited");
            }
        }
    }

    async fn join_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.handle.abort();
            info!(task = task.name, "task aborted for shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_delivered_to_subscribers() {
        let supervisor = Supervisor::new(Arc::new(MetricsRegistry::new()));
        let mut rx = supervisor.shutdown_signal();
        supervisor.shutdown();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_report_fatal_sets_exit_code() {
        let mut supervisor = Supervisor::new(Arc::new(MetricsRegistry::new()));
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        supervisor.supervise("dummy", handle);

        supervisor.report_fatal(&LiquidatorError::Fatal("test".into()));
        let code = supervisor.run_until_shutdown(Duration::from_secs(3600)).await;
        assert_eq!(code, exit_code::FATAL_ERROR);
    }

    #[tokio::test]
    async fn test_non_fatal_error_does_not_trigger_shutdown() {
        let supervisor = Supervisor::new(Arc::new(MetricsRegistry::new()));
        supervisor.report_fatal(&LiquidatorError::Unbuildable {
            user: "0xabc".into(),
            reason: UnbuildableReason::NoViablePlan,
        });
        assert!(!supervisor.fatal.load(std::sync::atomic::Ordering::SeqCst));
    }
}
