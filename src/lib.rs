//! nettest library
//!
//! Connectivity probing and the end-to-end roundtrip scenario for the
//! coordinator (`nm`), storage node (`ss`) and `client` binaries.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod probe;
pub mod process_guard;
pub mod scenario;
pub mod supervisor;
pub mod transcript;
pub mod verify;

// Re-export main types for convenience
pub use client::{ClientCapture, ClientExit, ClientSession};
pub use config::ScenarioConfig;
pub use error::{NetTestError, Result};
pub use probe::{ProbeResult, Readiness, probe, wait_until_reachable, wait_until_reachable_or};
pub use process_guard::{CommandProcessGroup, Interrupt, StopOutcome};
pub use scenario::{
    CleanupReport, ScenarioContext, ScenarioOutcome, ScenarioReport, ScenarioStage, run_roundtrip,
};
pub use supervisor::{LaunchSpec, ProcessHandle, ServiceRole};
pub use transcript::ScriptedTranscript;
pub use verify::{verify, verify_with_marker};
