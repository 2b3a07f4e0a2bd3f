//! Error handling module for the harness
//!
//! Every fatal condition a scenario can hit is a variant here. Transient
//! probe failures are deliberately absent: they live in `ProbeResult::error`
//! and only turn into `ReadinessTimeout` once the wait budget runs out.

use std::path::PathBuf;
use thiserror::Error;

use crate::scenario::{ScenarioStage, StageTransitionError};

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum NetTestError {
    /// A required executable is absent from the binary directory
    #[error("Could not find compiled binary for '{name}' in {}", dir.display())]
    BinaryNotFound { name: String, dir: PathBuf },

    /// An existing executable could not be launched
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A service port never accepted connections within the wait budget
    #[error("{service} port {addr} did not open within {timeout_secs:.1}s")]
    ReadinessTimeout {
        service: String,
        addr: String,
        timeout_secs: f64,
    },

    /// The scripted client session exceeded its budget
    #[error("client did not finish within {timeout_secs:.1}s")]
    ClientTimeout { timeout_secs: f64 },

    /// The client completed but the payload was not echoed back cleanly
    #[error("expected READ output not observed (client exit code: {})", fmt_exit(*exit_code))]
    VerificationFailure { exit_code: Option<i32> },

    /// An external signal arrived while a stage was blocking
    #[error("interrupted during {stage}")]
    Interrupted { stage: ScenarioStage },

    /// Driver stage machine misuse
    #[error("Scenario transition error: {0}")]
    Transition(#[from] StageTransitionError),

    /// Invalid scenario configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (log files, pipes, signal registration)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, NetTestError>;

fn fmt_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "killed by signal".to_string(), |c| c.to_string())
}

impl NetTestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a readiness timeout for a named service
    pub fn readiness_timeout(service: impl Into<String>, host: &str, port: u16, timeout_secs: f64) -> Self {
        Self::ReadinessTimeout {
            service: service.into(),
            addr: format!("{}:{}", host, port),
            timeout_secs,
        }
    }

    /// Returns true if this error was caused by an external interrupt
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
