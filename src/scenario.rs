//! Roundtrip scenario driver
//!
//! Brings the stack up in dependency order, drives one scripted client
//! session, verifies it, and tears everything down again.
//!
//! # Stage Flow
//!
//! ```text
//! Idle
//!     ↓   resolve binaries, launch coordinator
//! WaitCoordinatorReady
//!     ↓
//! StartStorageNode
//!     ↓
//! WaitStorageReady
//!     ↓
//! GracePeriod            fixed 1s for storage registration
//!     ↓
//! RunClientScenario
//!     ↓
//! Verify
//!     ↓
//! Cleanup                reached from every stage above, exactly once
//!     ↓
//! Done | Failed
//! ```
//!
//! All mutable state of a run (log directory, running services, interrupt
//! flag, stage history) lives in a `ScenarioContext` owned by the caller.
//! Cleanup runs on the driver's normal return path; `Drop` on the context is
//! the backstop for early exits such as panics.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use strum::Display;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::client::{ClientExit, ClientSession};
use crate::config::ScenarioConfig;
use crate::error::{NetTestError, Result};
use crate::probe::{self, Readiness};
use crate::process_guard::{Interrupt, STOP_GRACE, StopOutcome};
use crate::supervisor::{self, LaunchSpec, ProcessHandle, ServiceRole};
use crate::transcript::ScriptedTranscript;
use crate::verify;

/// Delay between storage-node readiness and the first client command
pub const REGISTRATION_GRACE: Duration = Duration::from_secs(1);

const CLIENT_BINARY: &str = "client";

/// Driver stages in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u8)]
pub enum ScenarioStage {
    #[strum(serialize = "starting coordinator")]
    Idle = 0,
    #[strum(serialize = "waiting for coordinator")]
    WaitCoordinatorReady = 1,
    #[strum(serialize = "starting storage node")]
    StartStorageNode = 2,
    #[strum(serialize = "waiting for storage node")]
    WaitStorageReady = 3,
    #[strum(serialize = "registration grace period")]
    GracePeriod = 4,
    #[strum(serialize = "running client scenario")]
    RunClientScenario = 5,
    #[strum(serialize = "verifying output")]
    Verify = 6,
    #[strum(serialize = "cleanup")]
    Cleanup = 7,
    /// Terminal: verified success
    #[strum(serialize = "done")]
    Done = 8,
    /// Terminal: any failure branch
    #[strum(serialize = "failed")]
    Failed = 255,
}

impl ScenarioStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Next stage on the success path, or None at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::WaitCoordinatorReady),
            Self::WaitCoordinatorReady => Some(Self::StartStorageNode),
            Self::StartStorageNode => Some(Self::WaitStorageReady),
            Self::WaitStorageReady => Some(Self::GracePeriod),
            Self::GracePeriod => Some(Self::RunClientScenario),
            Self::RunClientScenario => Some(Self::Verify),
            Self::Verify => Some(Self::Cleanup),
            Self::Cleanup => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: ScenarioStage, to: ScenarioStage },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: ScenarioStage, to: ScenarioStage },

    #[error("Cannot transition from terminal stage {from}")]
    FromTerminalState { from: ScenarioStage },
}

/// Captured result of the client session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub success: bool,
    pub captured_stdout: String,
    pub captured_stderr: String,
    pub exit_code: Option<i32>,
}

/// A service that was stopped during cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedService {
    pub role: ServiceRole,
    pub pid: u32,
    /// None when stopping failed; the failure is logged
    pub outcome: Option<StopOutcome>,
}

/// A service left running because keep-alive was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedService {
    pub role: ServiceRole,
    pub pid: u32,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// In stop order (reverse of start order)
    pub stopped: Vec<StoppedService>,
    pub retained: Vec<RetainedService>,
}

/// Explicit owner of everything one scenario run touches
#[derive(Debug)]
pub struct ScenarioContext {
    config: ScenarioConfig,
    interrupt: Interrupt,
    stop_grace: Duration,

    /// Supervised services in start order
    services: Vec<ProcessHandle>,

    stage: ScenarioStage,
    failed_at: Option<ScenarioStage>,
    started: Instant,
    /// (stage, time since context creation)
    stage_history: Vec<(ScenarioStage, Duration)>,

    cleanup_runs: usize,
    cleanup_report: CleanupReport,
}

impl ScenarioContext {
    /// The context owns the configuration it runs, so one context always
    /// drives exactly one scenario definition.
    pub fn new(config: ScenarioConfig, interrupt: Interrupt) -> Self {
        Self {
            config,
            interrupt,
            stop_grace: STOP_GRACE,
            services: Vec::new(),
            stage: ScenarioStage::Idle,
            failed_at: None,
            started: Instant::now(),
            stage_history: vec![(ScenarioStage::Idle, Duration::ZERO)],
            cleanup_runs: 0,
            cleanup_report: CleanupReport::default(),
        }
    }

    /// Override the SIGTERM→SIGKILL window used during cleanup
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    pub fn bin_dir(&self) -> &Path {
        &self.config.bin_dir
    }

    fn keep_alive(&self) -> bool {
        self.config.keep_procs
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    #[inline]
    pub fn current_stage(&self) -> ScenarioStage {
        self.stage
    }

    #[inline]
    pub fn failed_at(&self) -> Option<ScenarioStage> {
        self.failed_at
    }

    pub fn stage_history(&self) -> &[(ScenarioStage, Duration)] {
        &self.stage_history
    }

    /// How many times cleanup actually ran (0 or 1)
    pub fn cleanup_runs(&self) -> usize {
        self.cleanup_runs
    }

    /// Pids of services currently owned by the context, in start order
    pub fn running_pids(&self) -> Vec<u32> {
        self.services.iter().map(ProcessHandle::pid).collect()
    }

    /// Move to `target`.
    ///
    /// Only the next stage on the success path is accepted, except that
    /// `Cleanup` may be entered from any non-terminal stage and `Failed`
    /// only from `Cleanup`.
    pub fn transition_to(&mut self, target: ScenarioStage) -> std::result::Result<(), StageTransitionError> {
        let from = self.stage;
        if from.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from });
        }

        let allowed = match target {
            ScenarioStage::Cleanup => from != ScenarioStage::Cleanup,
            ScenarioStage::Failed => from == ScenarioStage::Cleanup,
            _ => from.next() == Some(target),
        };
        if !allowed {
            if target.order() <= from.order() {
                return Err(StageTransitionError::BackwardTransition { from, to: target });
            }
            return Err(StageTransitionError::SkippedStage { from, to: target });
        }

        self.stage = target;
        self.stage_history.push((target, self.started.elapsed()));
        info!("Scenario stage: {}", target);
        Ok(())
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_requested() {
            return Err(NetTestError::Interrupted { stage: self.stage });
        }
        Ok(())
    }

    /// Launch a supervised service and take ownership of its handle
    fn launch(&mut self, role: ServiceRole, program: PathBuf, args: Vec<String>) -> Result<()> {
        self.check_interrupt()?;
        let spec = LaunchSpec {
            role,
            program,
            args,
            detachable: self.keep_alive(),
        };
        let handle = supervisor::start(&spec, &self.config.log_dir, role.log_name())?;
        self.services.push(handle);
        Ok(())
    }

    /// Block until `host:port` accepts connections, the budget runs out, or
    /// an interrupt arrives
    fn await_port(&self, service: &str, host: &str, port: u16, timeout: Duration) -> Result<()> {
        match probe::wait_until_reachable_or(host, port, timeout, &self.interrupt) {
            Readiness::Ready => Ok(()),
            Readiness::Interrupted => Err(NetTestError::Interrupted { stage: self.stage }),
            Readiness::TimedOut => Err(NetTestError::readiness_timeout(
                service,
                host,
                port,
                timeout.as_secs_f64(),
            )),
        }
    }

    /// Stop every owned service in reverse start order, or hand them over
    /// untouched when keep-alive is set. Idempotent: only the first call
    /// does any work.
    pub fn cleanup(&mut self) -> CleanupReport {
        if self.cleanup_runs > 0 {
            return self.cleanup_report.clone();
        }
        self.cleanup_runs += 1;

        let mut report = CleanupReport::default();
        while let Some(handle) = self.services.pop() {
            let role = handle.role();
            let pid = handle.pid();

            if self.keep_alive() {
                info!("Keeping {} alive (pid {})", role, pid);
                report.retained.push(RetainedService {
                    role,
                    pid,
                    log_path: handle.log_path().to_path_buf(),
                });
                continue;
            }

            let outcome = match handle.stop(self.stop_grace) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!("Failed to stop {} (pid {}): {}", role, pid, e);
                    None
                }
            };
            report.stopped.push(StoppedService { role, pid, outcome });
        }
        // Retained list in start order reads better in the report
        report.retained.reverse();

        self.cleanup_report = report.clone();
        report
    }
}

impl Drop for ScenarioContext {
    fn drop(&mut self) {
        if self.cleanup_runs == 0 && !self.services.is_empty() {
            warn!("ScenarioContext dropped before cleanup, stopping services");
            self.cleanup();
        }
    }
}

/// Terminal result of one roundtrip run
#[derive(Debug)]
pub struct ScenarioReport {
    /// Present once the client has run, even when verification failed
    pub outcome: Option<ScenarioOutcome>,
    pub error: Option<NetTestError>,
    pub failed_at: Option<ScenarioStage>,
    pub cleanup: CleanupReport,
}

impl ScenarioReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.outcome.as_ref().is_some_and(|o| o.success)
    }

    /// 0 on verified success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Locate `<bin_dir>/<name>` or `<bin_dir>/<name>.exe`
pub fn resolve_binary(bin_dir: &Path, name: &str) -> Result<PathBuf> {
    [bin_dir.join(name), bin_dir.join(format!("{}.exe", name))]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| NetTestError::BinaryNotFound {
            name: name.to_string(),
            dir: bin_dir.to_path_buf(),
        })
}

struct Binaries {
    coordinator: PathBuf,
    storage: PathBuf,
    client: PathBuf,
}

impl Binaries {
    /// All three must exist before anything is launched
    fn resolve(bin_dir: &Path) -> Result<Self> {
        Ok(Self {
            coordinator: resolve_binary(bin_dir, ServiceRole::Coordinator.binary_name())?,
            storage: resolve_binary(bin_dir, ServiceRole::StorageNode.binary_name())?,
            client: resolve_binary(bin_dir, CLIENT_BINARY)?,
        })
    }
}

/// Run one full roundtrip scenario.
///
/// Cleanup runs exactly once before this returns, whichever stage failed.
pub fn run_roundtrip(ctx: &mut ScenarioContext) -> ScenarioReport {
    let mut outcome = None;
    let config = ctx.config.clone();
    let result = drive(&config, ctx, &mut outcome);

    let failed_at = match &result {
        Ok(()) => None,
        Err(e) => {
            error!("Scenario failed during {}: {}", ctx.current_stage(), e);
            ctx.failed_at = Some(ctx.current_stage());
            ctx.failed_at
        }
    };

    if ctx.current_stage() != ScenarioStage::Cleanup {
        record(ctx.transition_to(ScenarioStage::Cleanup));
    }
    let cleanup = ctx.cleanup();
    let terminal = if result.is_ok() {
        ScenarioStage::Done
    } else {
        ScenarioStage::Failed
    };
    record(ctx.transition_to(terminal));

    ScenarioReport {
        outcome,
        error: result.err(),
        failed_at,
        cleanup,
    }
}

fn record(transition: std::result::Result<(), StageTransitionError>) {
    if let Err(e) = transition {
        warn!("{}", e);
    }
}

fn drive(
    config: &ScenarioConfig,
    ctx: &mut ScenarioContext,
    outcome: &mut Option<ScenarioOutcome>,
) -> Result<()> {
    config.validate()?;
    let bins = Binaries::resolve(ctx.bin_dir())?;
    let wait_timeout = config.wait_timeout();

    ctx.launch(ServiceRole::Coordinator, bins.coordinator, config.coordinator_args())?;

    ctx.transition_to(ScenarioStage::WaitCoordinatorReady)?;
    ctx.await_port("NM", &config.nm_ip, config.nm_client_port, wait_timeout)?;

    ctx.transition_to(ScenarioStage::StartStorageNode)?;
    ctx.launch(ServiceRole::StorageNode, bins.storage, config.storage_args())?;

    ctx.transition_to(ScenarioStage::WaitStorageReady)?;
    ctx.await_port("SS client", &config.ss_ip, config.ss_client_port, wait_timeout)?;

    // Storage readiness does not imply it has registered with the
    // coordinator yet; there is no explicit signal for that.
    ctx.transition_to(ScenarioStage::GracePeriod)?;
    if !ctx.interrupt().sleep(REGISTRATION_GRACE) {
        return Err(NetTestError::Interrupted { stage: ctx.current_stage() });
    }

    ctx.transition_to(ScenarioStage::RunClientScenario)?;
    let file_name = config.resolve_file_name();
    let transcript = ScriptedTranscript::roundtrip(&file_name);
    println!("[roundtrip] launching client scenario for {}", file_name);
    let capture = ClientSession::new(bins.client, config.client_args()).run(
        &transcript,
        config.client_timeout(),
        ctx.interrupt(),
    )?;

    let exit_code = capture.exit_code();
    let mut result = ScenarioOutcome {
        success: false,
        captured_stdout: capture.stdout,
        captured_stderr: capture.stderr,
        exit_code,
    };

    match capture.exit {
        ClientExit::TimedOut => {
            eprintln!("[roundtrip] client timed out");
            println!("{}", result.captured_stdout);
            eprintln!("{}", result.captured_stderr);
            *outcome = Some(result);
            return Err(NetTestError::ClientTimeout {
                timeout_secs: config.client_timeout_secs,
            });
        }
        ClientExit::Interrupted => {
            *outcome = Some(result);
            return Err(NetTestError::Interrupted { stage: ctx.current_stage() });
        }
        ClientExit::Exited(_) => {}
    }

    ctx.transition_to(ScenarioStage::Verify)?;
    result.success = verify::verify(&result.captured_stdout, result.exit_code);
    println!("[roundtrip] client output:\n{}", result.captured_stdout);
    if !result.captured_stderr.is_empty() {
        eprintln!("[roundtrip] client stderr:\n{}", result.captured_stderr);
    }

    let success = result.success;
    *outcome = Some(result);
    if !success {
        return Err(NetTestError::VerificationFailure { exit_code });
    }

    ctx.transition_to(ScenarioStage::Cleanup)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> ScenarioContext {
        ScenarioContext::new(ScenarioConfig::default(), Interrupt::new())
    }

    #[test]
    fn test_stage_sequence() {
        let mut stage = ScenarioStage::Idle;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 9);
        assert_eq!(seen.last(), Some(&ScenarioStage::Done));
        assert!(ScenarioStage::Done.is_terminal());
        assert!(ScenarioStage::Failed.is_terminal());
        assert!(!ScenarioStage::Cleanup.is_terminal());
    }

    #[test]
    fn test_transition_rejects_skips_and_backwards() {
        let mut ctx = context();
        assert_eq!(
            ctx.transition_to(ScenarioStage::GracePeriod),
            Err(StageTransitionError::SkippedStage {
                from: ScenarioStage::Idle,
                to: ScenarioStage::GracePeriod,
            })
        );

        ctx.transition_to(ScenarioStage::WaitCoordinatorReady).unwrap();
        assert!(matches!(
            ctx.transition_to(ScenarioStage::Idle),
            Err(StageTransitionError::BackwardTransition { .. })
        ));
        assert!(ctx.transition_to(ScenarioStage::Failed).is_err());
    }

    #[test]
    fn test_cleanup_reachable_from_any_running_stage() {
        let mut ctx = context();
        ctx.transition_to(ScenarioStage::WaitCoordinatorReady).unwrap();
        ctx.transition_to(ScenarioStage::Cleanup).unwrap();
        assert!(ctx.transition_to(ScenarioStage::Cleanup).is_err());
        ctx.transition_to(ScenarioStage::Failed).unwrap();

        assert_eq!(
            ctx.transition_to(ScenarioStage::Cleanup),
            Err(StageTransitionError::FromTerminalState {
                from: ScenarioStage::Failed
            })
        );
        let stages: Vec<_> = ctx.stage_history().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            [
                ScenarioStage::Idle,
                ScenarioStage::WaitCoordinatorReady,
                ScenarioStage::Cleanup,
                ScenarioStage::Failed,
            ]
        );
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ScenarioStage::Idle.to_string(), "starting coordinator");
        assert_eq!(ScenarioStage::WaitStorageReady.to_string(), "waiting for storage node");
        assert_eq!(ScenarioStage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_context_owns_its_config() {
        let config = ScenarioConfig {
            bin_dir: PathBuf::from("/opt/dfs/bin"),
            log_dir: PathBuf::from("/var/log/dfs"),
            keep_procs: true,
            ..Default::default()
        };
        let ctx = ScenarioContext::new(config.clone(), Interrupt::new());

        assert_eq!(ctx.config(), &config);
        assert_eq!(ctx.bin_dir(), Path::new("/opt/dfs/bin"));
        assert_eq!(ctx.log_dir(), Path::new("/var/log/dfs"));
        assert!(ctx.keep_alive());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut ctx = context();
        let first = ctx.cleanup();
        let second = ctx.cleanup();
        assert_eq!(first, second);
        assert_eq!(ctx.cleanup_runs(), 1);
    }

    #[test]
    fn test_resolve_binary() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_binary(dir.path(), "nm"),
            Err(NetTestError::BinaryNotFound { .. })
        ));

        std::fs::write(dir.path().join("nm.exe"), "").unwrap();
        assert_eq!(resolve_binary(dir.path(), "nm").unwrap(), dir.path().join("nm.exe"));

        std::fs::write(dir.path().join("nm"), "").unwrap();
        assert_eq!(resolve_binary(dir.path(), "nm").unwrap(), dir.path().join("nm"));
    }

    #[test]
    fn test_report_exit_code() {
        let ok = ScenarioReport {
            outcome: Some(ScenarioOutcome {
                success: true,
                captured_stdout: verify::PAYLOAD.to_string(),
                captured_stderr: String::new(),
                exit_code: Some(0),
            }),
            error: None,
            failed_at: None,
            cleanup: CleanupReport::default(),
        };
        assert_eq!(ok.exit_code(), 0);

        let missing = ScenarioReport {
            outcome: None,
            error: None,
            failed_at: None,
            cleanup: CleanupReport::default(),
        };
        assert_eq!(missing.exit_code(), 1);
    }
}
