//! Process supervisor: relaunches the checker when it crashes.
//!
//! Exit code 0 ends supervision, 2 ends it permanently (misconfiguration),
//! anything else (or death by signal) triggers a restart. Too many restarts
//! inside the window trigger a cooldown before the next launch.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SupervisorConfig;

pub const EXIT_OK: i32 = 0;
pub const EXIT_NO_RESTART: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_quick_restarts: u32,
    pub window: Duration,
    pub cooldown: Duration,
    pub restart_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for RestartPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            max_quick_restarts: config.max_quick_restarts.max(1),
            window: Duration::from_secs(config.quick_restart_window_seconds),
            cooldown: Duration::from_secs(config.cooldown_seconds),
            restart_delay: Duration::from_secs(config.restart_delay_seconds),
        }
    }
}

/// Sliding-window restart counter.
#[derive(Debug, Clone)]
pub struct RestartGovernor {
    policy: RestartPolicy,
    recent: VecDeque<Instant>,
}

impl RestartGovernor {
    pub const fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            recent: VecDeque::new(),
        }
    }

    /// Note a restart at `now`. Returns the cooldown to sit out first when
    /// the restart limit inside the window has been reached.
    pub fn register_restart(&mut self, now: Instant) -> Option<Duration> {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= self.policy.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.push_back(now);

        if self.recent.len() >= self.policy.max_quick_restarts as usize {
            self.recent.clear();
            Some(self.policy.cooldown)
        } else {
            None
        }
    }

    pub fn recent_restarts(&self) -> usize {
        self.recent.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Stop,
    StopPermanently,
    Restart,
}

impl ExitDisposition {
    /// `None` means the child was killed by a signal.
    pub const fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_OK) => Self::Stop,
            Some(EXIT_NO_RESTART) => Self::StopPermanently,
            _ => Self::Restart,
        }
    }
}

pub struct Supervisor {
    program: PathBuf,
    args: Vec<OsString>,
    policy: RestartPolicy,
    governor: RestartGovernor,
}

impl Supervisor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, policy: RestartPolicy) -> Self {
        Self {
            program: program.into(),
            args,
            governor: RestartGovernor::new(policy.clone()),
            policy,
        }
    }

    /// Run the child until it asks to stop or `cancel` fires. Returns the
    /// exit code the supervisor itself should use.
    pub async fn run(&mut self, cancel: &CancellationToken) -> DomainResult<i32> {
        info!(program = %self.program.display(), "Supervisor started");
        loop {
            let mut child = tokio::process::Command::new(&self.program)
                .args(&self.args)
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| DomainError::Io(format!("failed to launch {}: {e}", self.program.display())))?;
            info!(pid = child.id(), "Child started");

            let status = tokio::select! {
                status = child.wait() => status?,
                () = cancel.cancelled() => {
                    info!("Interrupt received, stopping child");
                    forward_interrupt(child.id());
                    match tokio::time::timeout(self.policy.window, child.wait()).await {
                        Ok(status) => info!(status = ?status.ok(), "Child stopped"),
                        Err(_) => {
                            warn!("Child ignored interrupt, killing it");
                            child.kill().await?;
                        }
                    }
                    return Ok(EXIT_OK);
                }
            };

            match ExitDisposition::from_exit_code(status.code()) {
                ExitDisposition::Stop => {
                    info!("Child exited normally");
                    return Ok(EXIT_OK);
                }
                ExitDisposition::StopPermanently => {
                    warn!("Child requested permanent stop");
                    return Ok(EXIT_NO_RESTART);
                }
                ExitDisposition::Restart => {
                    error!(code = ?status.code(), "Child crashed");
                    let pause = match self.governor.register_restart(Instant::now()) {
                        Some(cooldown) => {
                            warn!(
                                restarts = self.policy.max_quick_restarts,
                                window_secs = self.policy.window.as_secs(),
                                cooldown_secs = cooldown.as_secs(),
                                "Too many restarts, cooling down"
                            );
                            cooldown
                        }
                        None => self.policy.restart_delay,
                    };
                    tokio::select! {
                        () = tokio::time::sleep(pause) => {}
                        () = cancel.cancelled() => return Ok(EXIT_OK),
                    }
                }
            }
        }
    }
}

fn forward_interrupt(pid: Option<u32>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGINT) {
        warn!(pid, error = %e, "Failed to forward interrupt to child");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RestartPolicy {
        RestartPolicy {
            max_quick_restarts: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
            restart_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_fifth_quick_restart_triggers_cooldown() {
        let mut governor = RestartGovernor::new(policy());
        let start = Instant::now();
        for i in 0..4 {
            assert_eq!(governor.register_restart(start + Duration::from_secs(i)), None);
        }
        assert_eq!(
            governor.register_restart(start + Duration::from_secs(4)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(governor.recent_restarts(), 0);
    }

    #[test]
    fn test_spread_out_restarts_never_cool_down() {
        let mut governor = RestartGovernor::new(policy());
        let start = Instant::now();
        for i in 0..20 {
            assert_eq!(governor.register_restart(start + Duration::from_secs(i * 20)), None);
        }
        assert!(governor.recent_restarts() < 5);
    }

    #[test]
    fn test_exit_dispositions() {
        assert_eq!(ExitDisposition::from_exit_code(Some(0)), ExitDisposition::Stop);
        assert_eq!(ExitDisposition::from_exit_code(Some(2)), ExitDisposition::StopPermanently);
        assert_eq!(ExitDisposition::from_exit_code(Some(1)), ExitDisposition::Restart);
        assert_eq!(ExitDisposition::from_exit_code(Some(130)), ExitDisposition::Restart);
        assert_eq!(ExitDisposition::from_exit_code(None), ExitDisposition::Restart);
    }

    #[tokio::test]
    async fn test_child_requesting_permanent_stop_ends_supervision() {
        let mut supervisor = Supervisor::new(
            "sh",
            vec!["-c".into(), "exit 2".into()],
            policy(),
        );
        let code = supervisor.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(code, EXIT_NO_RESTART);
    }

    #[tokio::test]
    async fn test_clean_exit_ends_supervision() {
        let mut supervisor = Supervisor::new("sh", vec!["-c".into(), "exit 0".into()], policy());
        let code = supervisor.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(code, EXIT_OK);
    }
}
