//! Long-lived service processes (coordinator, storage node)
//!
//! `start` launches a binary with stdout and stderr both redirected into a
//! fresh log file and hands back a `ProcessHandle`. Readiness is not this
//! module's concern; callers pair it with the prober.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use strum::Display;
use tracing::{debug, info};

use crate::error::{NetTestError, Result};
use crate::process_guard::{self, CommandProcessGroup, StopOutcome};

/// Which service a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ServiceRole {
    #[strum(serialize = "coordinator")]
    Coordinator,
    #[strum(serialize = "storage node")]
    StorageNode,
}

impl ServiceRole {
    /// Binary name inside the bin directory
    pub const fn binary_name(self) -> &'static str {
        match self {
            Self::Coordinator => "nm",
            Self::StorageNode => "ss",
        }
    }

    /// Log file name inside the log directory
    pub const fn log_name(self) -> &'static str {
        match self {
            Self::Coordinator => "nettest-nm.log",
            Self::StorageNode => "nettest-ss.log",
        }
    }
}

/// Launch parameters for one supervised service
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub role: ServiceRole,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Skip the parent-death signal so the process can outlive the harness
    pub detachable: bool,
}

impl LaunchSpec {
    /// Program followed by its arguments, space separated
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// A running supervised process and the log file capturing its output.
///
/// Stopping consumes the handle, so a stopped process can never be touched
/// again through it.
#[derive(Debug)]
pub struct ProcessHandle {
    role: ServiceRole,
    child: Child,
    log_path: PathBuf,
    _log_file: File,
}

impl ProcessHandle {
    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Non-blocking liveness check
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Two-phase stop: SIGTERM, up to `grace`, then SIGKILL.
    ///
    /// A process that has already exited is left alone and reported as such.
    pub fn stop(mut self, grace: Duration) -> Result<StopOutcome> {
        let pid = self.pid();
        let outcome = process_guard::terminate_gracefully(&mut self.child, grace)?;
        info!("Stopped {} (pid {}): {:?}", self.role, pid, outcome);
        Ok(outcome)
    }
}

/// Launch a service with combined output redirected to `<log_dir>/<log_name>`.
///
/// The log directory is created if needed and any previous log is truncated.
pub fn start(spec: &LaunchSpec, log_dir: &Path, log_name: &str) -> Result<ProcessHandle> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(log_name);
    let log_file = File::create(&log_path)?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file.try_clone()?))
        .in_new_process_group();
    if !spec.detachable {
        cmd.with_death_pact();
    }

    let command_line = spec.command_line();
    debug!("Launching {}: {}", spec.role, command_line);
    let child = cmd.spawn().map_err(|source| NetTestError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    println!(
        "[net-test] spawned {} (logs -> {})",
        command_line,
        log_path.display()
    );
    info!("{} started with pid {}", spec.role, child.id());

    Ok(ProcessHandle {
        role: spec.role,
        child,
        log_path,
        _log_file: log_file,
    })
}

/// Stop an optional handle; absent handles are a no-op
pub fn stop(handle: Option<ProcessHandle>, grace: Duration) -> Result<Option<StopOutcome>> {
    handle.map(|h| h.stop(grace)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh_spec(script: &str) -> LaunchSpec {
        LaunchSpec {
            role: ServiceRole::Coordinator,
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            detachable: false,
        }
    }

    #[test]
    fn test_start_captures_combined_output() {
        let dir = TempDir::new().unwrap();
        let handle = start(&sh_spec("echo out; echo err >&2; exec sleep 30"), dir.path(), "svc.log").unwrap();

        std::thread::sleep(Duration::from_millis(300));
        let log_path = handle.log_path().to_path_buf();
        assert_eq!(handle.stop(Duration::from_secs(2)).unwrap(), StopOutcome::Terminated);

        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("out"));
        assert!(log.contains("err"));
    }

    #[test]
    fn test_start_creates_log_dir_and_truncates_previous_log() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        let first = start(&sh_spec("echo first run"), &log_dir, "svc.log").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        first.stop(Duration::from_secs(1)).unwrap();
        assert!(fs::read_to_string(log_dir.join("svc.log")).unwrap().contains("first run"));

        let mut second = start(&sh_spec("exit 0"), &log_dir, "svc.log").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!second.is_running());
        assert_eq!(fs::read_to_string(log_dir.join("svc.log")).unwrap(), "");
        assert_eq!(
            second.stop(Duration::from_secs(1)).unwrap(),
            StopOutcome::AlreadyExited(Some(0))
        );
    }

    #[test]
    fn test_start_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let spec = LaunchSpec {
            role: ServiceRole::StorageNode,
            program: dir.path().join("does-not-exist"),
            args: Vec::new(),
            detachable: false,
        };

        let err = start(&spec, dir.path(), "ss.log").unwrap_err();
        assert!(matches!(err, NetTestError::Spawn { .. }));
    }

    #[test]
    fn test_stop_absent_handle_is_noop() {
        assert_eq!(stop(None, Duration::from_secs(1)).unwrap(), None);
    }

    #[test]
    fn test_role_names() {
        assert_eq!(ServiceRole::Coordinator.to_string(), "coordinator");
        assert_eq!(ServiceRole::StorageNode.binary_name(), "ss");
        assert_eq!(ServiceRole::StorageNode.log_name(), "nettest-ss.log");
    }
}
