//! Subcommand handlers
//!
//! Each handler prints the operator-facing status lines and returns the
//! process exit code; `main` only wires up logging and signals.

use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::cli::{PingArgs, RoundtripArgs};
use crate::config::ScenarioConfig;
use crate::error::NetTestError;
use crate::probe;
use crate::process_guard::Interrupt;
use crate::scenario::{self, ScenarioContext, ScenarioReport};

/// `ping`: 0 if the coordinator is reachable, 1 otherwise.
///
/// The storage node is probed only when both its address and port are
/// given, and its result is informational.
pub fn ping(args: &PingArgs) -> i32 {
    let timeout = match Duration::try_from_secs_f64(args.timeout) {
        Ok(t) if !t.is_zero() => t,
        _ => {
            eprintln!("[ping] timeout must be a positive number of seconds");
            return 1;
        }
    };

    println!("[ping] NM {}:{}", args.nm_ip, args.nm_port);
    let nm = probe::probe(&args.nm_ip, args.nm_port, timeout);
    println!("  -> {}", nm);

    if let (Some(ss_ip), Some(ss_port)) = (&args.ss_ip, args.ss_port) {
        println!("[ping] SS {}:{}", ss_ip, ss_port);
        let ss = probe::probe(ss_ip, ss_port, timeout);
        println!("  -> {}", ss);
    }

    if nm.reachable { 0 } else { 1 }
}

/// `roundtrip`: 0 on verified success, 1 otherwise
pub fn roundtrip(args: &RoundtripArgs, interrupt: Interrupt) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => ScenarioConfig::load_from_file(path)
            .with_context(|| format!("Cannot use scenario file {}", path.display()))?,
        None => args.to_config(),
    };

    let mut ctx = ScenarioContext::new(config, interrupt);
    let report = scenario::run_roundtrip(&mut ctx);
    print_report(&report);

    info!(
        "Roundtrip finished with exit code {} after {:?}",
        report.exit_code(),
        ctx.stage_history().last().map(|(_, at)| *at).unwrap_or_default()
    );
    Ok(report.exit_code())
}

/// `validate`: 0 if the file parses and passes validation
pub fn validate(path: &Path) -> i32 {
    info!("Validating scenario file: {:?}", path);
    match ScenarioConfig::load_from_file(path) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                println!("✓ Scenario file is valid: {}", path.display());
                0
            }
            Err(e) => {
                error!("Scenario validation failed: {}", e);
                eprintln!("✗ Scenario validation failed: {}", e);
                1
            }
        },
        Err(e) => {
            error!("Failed to load scenario file: {:#}", e);
            eprintln!("✗ Failed to load scenario file: {:#}", e);
            1
        }
    }
}

fn print_report(report: &ScenarioReport) {
    match &report.error {
        None if report.is_success() => {
            println!("[roundtrip] success: CREATE/WRITE/READ verified end-to-end.");
        }
        None => {
            eprintln!("[roundtrip] failure: could not observe expected READ output.");
        }
        Some(NetTestError::VerificationFailure { .. }) => {
            eprintln!("[roundtrip] failure: could not observe expected READ output.");
        }
        Some(e @ NetTestError::BinaryNotFound { .. }) => {
            eprintln!("[roundtrip] {}", e);
            eprintln!("Please run `make all` first.");
        }
        Some(NetTestError::Interrupted { stage }) => {
            eprintln!("\n[net-test] interrupted during {}", stage);
        }
        // Already reported together with the partial output
        Some(NetTestError::ClientTimeout { .. }) => {}
        Some(e) => {
            eprintln!("[roundtrip] {}", e);
        }
    }

    for service in &report.cleanup.retained {
        println!(
            "[roundtrip] leaving {} running (pid {}, logs -> {})",
            service.role,
            service.pid,
            service.log_path.display()
        );
    }
}
