//! Pass/fail decision for a finished client session

/// Payload written by the roundtrip scenario and expected back from READ
pub const PAYLOAD: &str = "Hello from net_test.";

/// Returns true iff the roundtrip payload was echoed and the client exited 0
pub fn verify(stdout: &str, exit_code: Option<i32>) -> bool {
    verify_with_marker(stdout, PAYLOAD, exit_code)
}

/// Both conditions are required: a clean exit without the marker fails,
/// and so does the marker followed by a non-zero or signal exit.
pub fn verify_with_marker(stdout: &str, marker: &str, exit_code: Option<i32>) -> bool {
    exit_code == Some(0) && stdout.contains(marker)
}
