//! Property-based tests for the pure parts of the harness
//!
//! These tests verify:
//! - The verifier requires both the marker and a zero exit code
//! - Transcript shape for arbitrary file names
//! - Configuration validation invariants

use proptest::prelude::*;

use nettest::scenario::ScenarioStage;
use nettest::verify::{PAYLOAD, verify, verify_with_marker};
use nettest::{ScenarioConfig, ScriptedTranscript};

/// File names the client protocol accepts as a single token
fn file_name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.-]{1,40}"
}

// =============================================================================
// Verifier
// =============================================================================

proptest! {
    /// Marker present but non-zero (or signal) exit is always a failure
    #[test]
    fn verify_rejects_nonzero_exit(
        prefix in ".{0,64}",
        suffix in ".{0,64}",
        code in prop_oneof![Just(None), (1i32..=255).prop_map(Some), (i32::MIN..0).prop_map(Some)],
    ) {
        let stdout = format!("{}{}{}", prefix, PAYLOAD, suffix);
        prop_assert!(!verify(&stdout, code));
    }

    /// Zero exit without the marker is always a failure
    #[test]
    fn verify_rejects_missing_marker(stdout in "[^H]{0,128}") {
        prop_assert!(!verify(&stdout, Some(0)));
    }

    /// Marker anywhere in the output with a zero exit always passes
    #[test]
    fn verify_accepts_marker_with_zero_exit(prefix in ".{0,64}", suffix in ".{0,64}") {
        let stdout = format!("{}{}{}", prefix, PAYLOAD, suffix);
        prop_assert!(verify(&stdout, Some(0)));
    }

    /// The general form agrees with substring containment
    #[test]
    fn verify_with_marker_matches_contains(stdout in ".{0,64}", marker in ".{0,8}") {
        prop_assert_eq!(
            verify_with_marker(&stdout, &marker, Some(0)),
            stdout.contains(marker.as_str())
        );
    }
}

// =============================================================================
// Transcript
// =============================================================================

proptest! {
    /// Six lines in fixed order, every one newline-terminated
    #[test]
    fn transcript_shape(name in file_name_strategy()) {
        let transcript = ScriptedTranscript::roundtrip(&name);
        let lines = transcript.lines();

        prop_assert_eq!(lines.len(), 6);
        prop_assert_eq!(&lines[0], &format!("CREATE {}", name));
        prop_assert_eq!(&lines[1], &format!("WRITE {} 0", name));
        prop_assert_eq!(&lines[2], &format!("0 {}", PAYLOAD));
        prop_assert_eq!(lines[3].as_str(), "ETIRW");
        prop_assert_eq!(&lines[4], &format!("READ {}", name));
        prop_assert_eq!(lines[5].as_str(), "QUIT");

        let rendered = transcript.render();
        prop_assert!(rendered.ends_with('\n'));
        prop_assert_eq!(rendered.lines().count(), 6);
    }

    /// Any token-shaped file name passes config validation
    #[test]
    fn token_file_names_validate(name in "[A-Za-z0-9_.-]{1,40}") {
        let config = ScenarioConfig {
            file_name: Some(name),
            ..Default::default()
        };
        prop_assert!(config.validate().is_ok());
    }

    /// File names with whitespace would split the protocol line and are rejected
    #[test]
    fn whitespace_file_names_rejected(a in "[a-z]{1,8}", b in "[a-z]{1,8}", ws in "[ \t\n]") {
        let config = ScenarioConfig {
            file_name: Some(format!("{}{}{}", a, ws, b)),
            ..Default::default()
        };
        prop_assert!(config.validate().is_err());
    }

    /// Positive finite timeouts are accepted, anything else rejected
    #[test]
    fn timeout_validation(secs in prop::num::f64::ANY) {
        let config = ScenarioConfig {
            wait_timeout_secs: secs,
            ..Default::default()
        };
        let acceptable = secs.is_finite() && secs > 0.0 && config.wait_timeout() > std::time::Duration::ZERO;
        prop_assert_eq!(config.validate().is_ok(), acceptable);
    }
}

// =============================================================================
// Stage ordering
// =============================================================================

#[test]
fn stage_order_strictly_increases_along_success_path() {
    let mut stage = ScenarioStage::Idle;
    while let Some(next) = stage.next() {
        assert!(next.order() > stage.order(), "{} -> {}", stage, next);
        stage = next;
    }
    assert_eq!(stage, ScenarioStage::Done);
}
