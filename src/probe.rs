//! TCP reachability checks
//!
//! Uses `TcpStream::connect_timeout` rather than ICMP: the question is
//! whether a service accepts connections on its port, not whether the host
//! answers pings.

use std::fmt;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::process_guard::Interrupt;

/// Fixed interval between readiness attempts
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Upper bound for a single readiness attempt
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of one connection attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl ProbeResult {
    fn reachable(latency: Duration) -> Self {
        Self {
            reachable: true,
            latency_ms: Some(latency.as_secs_f64() * 1000.0),
            error: None,
        }
    }

    fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.latency_ms, &self.error) {
            (Some(ms), _) => write!(f, "reachable in {:.2} ms", ms),
            (None, Some(err)) => write!(f, "unreachable ({})", err),
            (None, None) => write!(f, "unreachable"),
        }
    }
}

/// Outcome of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    Interrupted,
}

/// Attempt a single TCP connection to `host:port`.
///
/// Every resolved address is tried in turn until one accepts. Failures of
/// any kind are reported in the result, never as an error.
pub fn probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let start = Instant::now();

    let addrs: Vec<_> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => return ProbeResult::unreachable(format!("cannot resolve {}: {}", host, e)),
    };
    if addrs.is_empty() {
        return ProbeResult::unreachable(format!("no addresses found for {}", host));
    }
    if timeout.is_zero() {
        return ProbeResult::unreachable("timed out");
    }

    match connect_any(&addrs, start, timeout) {
        Ok(()) => ProbeResult::reachable(start.elapsed()),
        Err(msg) => ProbeResult::unreachable(msg),
    }
}

/// Try each address in turn, splitting what is left of `timeout` evenly
/// across the addresses not yet tried.
fn connect_any(addrs: &[SocketAddr], start: Instant, timeout: Duration) -> Result<(), String> {
    let mut last_err = None;
    for (i, addr) in addrs.iter().enumerate() {
        let left = (addrs.len() - i) as u32;
        let share = timeout.saturating_sub(start.elapsed()) / left;
        if share.is_zero() {
            return Err("timed out".to_string());
        }
        match TcpStream::connect_timeout(addr, share) {
            Ok(_stream) => return Ok(()),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.map_or_else(|| "connection failed".to_string(), |e| e.to_string()))
}

/// Poll `host:port` until it accepts a connection or `timeout` elapses.
pub fn wait_until_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    wait_until_reachable_or(host, port, timeout, &Interrupt::new()) == Readiness::Ready
}

/// Interruptible form of [`wait_until_reachable`].
///
/// Per-attempt timeout and the sleep between attempts are clamped to the
/// remaining budget, so the call returns no later than `timeout` plus one
/// polling interval.
pub fn wait_until_reachable_or(
    host: &str,
    port: u16,
    timeout: Duration,
    interrupt: &Interrupt,
) -> Readiness {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        if interrupt.is_requested() {
            return Readiness::Interrupted;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        attempts += 1;
        let result = probe(host, port, ATTEMPT_TIMEOUT.min(deadline - now));
        if result.reachable {
            info!("{}:{} reachable after {} attempt(s)", host, port, attempts);
            return Readiness::Ready;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if !interrupt.sleep(POLL_INTERVAL.min(remaining)) {
            return Readiness::Interrupted;
        }
    }

    debug!("{}:{} not reachable after {} attempt(s)", host, port, attempts);
    Readiness::TimedOut
}
