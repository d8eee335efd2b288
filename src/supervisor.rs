//! Subprocess supervisor: spawns one `crawl-one` child per work item,
//! pipes and logs its output, and enforces RSS/deadline kill
//! escalation.
//!
//! Grounded in `original_source/pkg/crawler/supervisor.go` (the
//! re-exec + PID watcher + deadline killer trio) and the kill
//! escalation's SIGTERM-then-SIGKILL contract from `spec.md` §4.8.

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sysinfo::System;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::FleetConfig;
use crate::error::SupervisorError;

/// Escalate from SIGTERM to SIGKILL against `pid`, waiting `kill_sleep`
/// between them. Errors are logged, never propagated: killing a
/// process that already exited is not a failure.
async fn escalate_kill(pid: u32, kill_sleep: Duration) {
    let nix_pid = Pid::from_raw(pid as i32);
    if let Err(err) = signal::kill(nix_pid, Signal::SIGTERM) {
        log::debug!("SIGTERM to {pid} failed (already exited?): {err}");
        return;
    }
    tokio::time::sleep(kill_sleep).await;
    if let Err(err) = signal::kill(nix_pid, Signal::SIGKILL) {
        log::debug!("SIGKILL to {pid} failed (already exited?): {err}");
    }
}

/// Sample `pid`'s RSS every `tick_every`; escalate-kill once it exceeds
/// `ceiling_bytes`. Exits quietly once the process can no longer be
/// found (it already exited).
async fn pid_watcher(pid: u32, tick_every: Duration, ceiling_bytes: u64, kill_sleep: Duration) {
    let sys_pid = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    let mut interval = tokio::time::interval(tick_every);

    loop {
        interval.tick().await;
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sys_pid]), true);
        let Some(process) = system.process(sys_pid) else {
            return;
        };

        let resident = process.memory();
        if resident > ceiling_bytes {
            log::warn!("child {pid} exceeded RSS ceiling ({resident} bytes), killing");
            escalate_kill(pid, kill_sleep).await;
            return;
        }
    }
}

/// Unconditionally escalate-kill `pid` once `max_runtime` elapses,
/// regardless of child state.
async fn deadline_killer(pid: u32, max_runtime: Duration, kill_sleep: Duration) {
    tokio::time::sleep(max_runtime).await;
    log::warn!("child {pid} exceeded max run time, killing");
    escalate_kill(pid, kill_sleep).await;
}

/// Spawn `crawl-one` for `domain`, stream its logs, and enforce the
/// supervisor's resource/deadline contract. Returns once the child
/// exits (killed or natural).
pub async fn run_crawl(
    config: &FleetConfig,
    exe_path: &str,
    domain: &str,
    server_addr: &str,
) -> Result<std::process::ExitStatus, SupervisorError> {
    let mut command = Command::new(exe_path);
    command
        .arg("crawl-one")
        .arg("--url")
        .arg(domain)
        .arg("--server")
        .arg(server_addr);
    if config.debug {
        command.arg("--debug");
    }
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let pid = child.id().unwrap_or(0);

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let domain_label = domain.to_string();

    let stdout_task = stdout.map(|out| {
        let domain_label = domain_label.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::info!("[{domain_label}] {}", line.to_uppercase());
            }
        })
    });
    let stderr_task = stderr.map(|err| {
        let domain_label = domain_label.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(err).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::info!("[{domain_label}] {}", line.to_uppercase());
            }
        })
    });

    let watcher = tokio::spawn(pid_watcher(
        pid,
        config.tick_every,
        config.memory_ceiling_bytes,
        config.kill_sleep,
    ));
    let killer = tokio::spawn(deadline_killer(
        pid,
        config.crawler_max_runtime,
        config.kill_sleep,
    ));

    let status = child.wait().await?;

    watcher.abort();
    killer.abort();
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_crawl_reports_exit_status_for_missing_binary() {
        let config = FleetConfig::default();
        let result = run_crawl(&config, "/nonexistent/binary/path", "example.com", "127.0.0.1:0").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_crawl_waits_for_true_exit_status() {
        let config = FleetConfig::default();
        let status = run_crawl(&config, "/bin/true", "example.com", "127.0.0.1:0")
            .await
            .unwrap();
        assert!(status.success());
    }
}
