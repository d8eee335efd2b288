//! Concurrent watchdog tasks racing on a shared "done" signal.
//!
//! Grounded in `original_source/pkg/crawler/crawler.go`'s `done` channel
//! and its three writers (signal handler, resource ticker, collector
//! wait). `tokio::sync::Notify` stands in for the unbuffered `chan bool`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tokio::task::JoinHandle;

/// Shared completion signal. `notify()` is idempotent: only the first
/// caller's reason is recorded, matching the original's single-fire
/// channel write semantics.
#[derive(Clone)]
pub struct Done {
    notify: Arc<tokio::sync::Notify>,
    fired: Arc<AtomicBool>,
}

impl Default for Done {
    fn default() -> Self {
        Self::new()
    }
}

impl Done {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(tokio::sync::Notify::new()),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn signal(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_signaled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Watch for SIGINT/SIGTERM/SIGQUIT and fire `done` on the first one.
pub fn spawn_signal_watcher(done: Done) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
            let mut quit = signal(SignalKind::quit()).expect("install SIGQUIT handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = term.recv() => {},
                _ = quit.recv() => {},
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        done.signal();
    })
}

/// Sample this process's RSS every `tick_every`; fire `done` if it
/// exceeds `ceiling_bytes` or wall-clock since `started_at` exceeds
/// `max_runtime`.
pub fn spawn_resource_ticker(
    done: Done,
    tick_every: Duration,
    ceiling_bytes: u64,
    max_runtime: Duration,
) -> JoinHandle<()> {
    let started_at = Instant::now();
    tokio::spawn(async move {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        let mut interval = tokio::time::interval(tick_every);

        loop {
            interval.tick().await;
            if done.is_signaled() {
                break;
            }

            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
            let resident = system.process(pid).map(|p| p.memory()).unwrap_or(0);
            log::info!("Tick: resident={}MiB", resident / (1024 * 1024));

            if resident > ceiling_bytes {
                log::warn!("RSS ceiling exceeded, requesting shutdown");
                done.signal();
                break;
            }

            if started_at.elapsed() > max_runtime {
                log::warn!("Max run time exceeded, requesting shutdown");
                done.signal();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn done_wait_returns_immediately_after_signal() {
        let done = Done::new();
        done.signal();
        tokio::time::timeout(Duration::from_millis(50), done.wait())
            .await
            .expect("wait must not block once signaled");
    }

    #[tokio::test]
    async fn resource_ticker_fires_on_deadline() {
        let done = Done::new();
        let handle = spawn_resource_ticker(
            done.clone(),
            Duration::from_millis(5),
            u64::MAX,
            Duration::from_millis(1),
        );
        tokio::time::timeout(Duration::from_secs(2), done.wait())
            .await
            .expect("deadline must fire done");
        handle.abort();
    }
}
