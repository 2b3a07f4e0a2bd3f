//! Process lifecycle primitives shared by the supervisor and the client session
//!
//! Every child the harness launches is placed in its own process group so a
//! terminal Ctrl+C reaches only the harness, which then decides what to stop.
//! Termination is two-phase: SIGTERM to the whole group, a grace window, then
//! SIGKILL for anything still running.
//!
//! Interrupts are not handled by unwinding. Signal handlers only raise a flag
//! (`Interrupt`); the blocking loops poll it and return normally, so cleanup
//! always runs on the ordinary return path.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io;
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Grace window between SIGTERM and SIGKILL
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Granularity of every interruptible wait in the harness
const POLL_SLICE: Duration = Duration::from_millis(50);

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process had already exited before the request; nothing was sent
    AlreadyExited(Option<i32>),
    /// The process exited within the grace window after SIGTERM
    Terminated,
    /// The process ignored SIGTERM and was killed
    Killed,
}

/// Cooperative cancellation flag raised by SIGINT, SIGTERM or SIGHUP
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag that only fires when `trigger` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag wired to SIGINT, SIGTERM and SIGHUP.
    ///
    /// The first SIGINT/SIGTERM only raises the flag. A second one while the
    /// flag is still set exits the harness with status 1 immediately.
    pub fn install() -> io::Result<Self> {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
        use signal_hook::flag;

        let interrupt = Self::new();
        for sig in [SIGINT, SIGTERM] {
            // Must be registered before the plain flag handler so the first
            // delivery sees `false` and does not exit.
            flag::register_conditional_shutdown(sig, 1, Arc::clone(&interrupt.flag))?;
            flag::register(sig, Arc::clone(&interrupt.flag))?;
        }
        flag::register(SIGHUP, Arc::clone(&interrupt.flag))?;

        debug!("Signal handlers installed for SIGINT, SIGTERM, SIGHUP");
        Ok(interrupt)
    }

    /// Raise the flag manually
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once an interrupt has been requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices.
    ///
    /// Returns false if the interrupt fired before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

/// Send a signal to a process
fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Send a signal to an entire process group
/// Uses negative PID so helpers forked by the service die with it
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

fn signal_group_or_pid(pid: u32, sig: Signal) {
    if let Err(e) = send_signal_to_group(pid, sig) {
        debug!("Failed to send {:?} to process group {}: {}", sig, pid, e);
        if let Err(e2) = send_signal(pid, sig) {
            debug!("Failed to send {:?} to PID {}: {}", sig, pid, e2);
        }
    }
}

/// Two-phase stop of a child: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// A child that has already exited is left alone. The child is always reaped
/// before this returns `Ok`.
pub fn terminate_gracefully(child: &mut Child, grace: Duration) -> io::Result<StopOutcome> {
    if let Some(status) = child.try_wait()? {
        debug!("PID {} already exited ({})", child.id(), status);
        return Ok(StopOutcome::AlreadyExited(status.code()));
    }

    let pid = child.id();
    signal_group_or_pid(pid, Signal::SIGTERM);

    let start = Instant::now();
    while start.elapsed() < grace {
        if child.try_wait()?.is_some() {
            info!("PID {} terminated gracefully", pid);
            return Ok(StopOutcome::Terminated);
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    warn!("PID {} did not terminate within {:?}, sending SIGKILL", pid, grace);
    kill_now(child)?;
    Ok(StopOutcome::Killed)
}

/// SIGKILL a child's process group immediately and reap it
pub fn kill_now(child: &mut Child) -> io::Result<()> {
    let pid = child.id();
    if send_signal_to_group(pid, Signal::SIGKILL).is_err() {
        // Already gone, or not a group leader
        let _ = child.kill();
    }
    child.wait()?;
    Ok(())
}

/// SIGKILL whatever is left in a process group whose leader has been reaped.
///
/// An empty group is not an error.
pub fn kill_group(pgid: u32) {
    match send_signal_to_group(pgid, Signal::SIGKILL) {
        Ok(()) => debug!("Killed leftover members of process group {}", pgid),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => debug!("Failed to kill process group {}: {}", pgid, e),
    }
}

/// Extension trait for std::process::Command to control child lifetime
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group
    /// so the whole tree can be signalled at once
    fn in_new_process_group(&mut self) -> &mut Self;

    /// Ask the kernel to SIGTERM the child if the harness thread dies
    fn with_death_pact(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                // PGID = child PID, making it the leader of a new group
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(())
            });
        }
        self
    }

    fn with_death_pact(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
