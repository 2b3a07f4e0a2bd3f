//! Short-lived scripted client run
//!
//! Unlike the coordinator and storage node, the client is not supervised:
//! this module launches it, feeds it the whole transcript, and owns it until
//! it exits or its budget runs out. Helper threads drain stdout/stderr and
//! feed stdin so a chatty client can never block on a full pipe while the
//! calling thread polls for exit.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{NetTestError, Result};
use crate::process_guard::{self, CommandProcessGroup, Interrupt};
use crate::transcript::ScriptedTranscript;

const EXIT_POLL: Duration = Duration::from_millis(50);

/// Minimum time left for draining pipes once the client is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How the client run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// Exited on its own; `None` if killed by a signal it did not expect
    Exited(Option<i32>),
    /// Budget elapsed; the client was killed
    TimedOut,
    /// Harness interrupt; the client was killed
    Interrupted,
}

/// Everything observed from one client run, partial output included
#[derive(Debug, Clone)]
pub struct ClientCapture {
    pub stdout: String,
    pub stderr: String,
    pub exit: ClientExit,
}

impl ClientCapture {
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit {
            ClientExit::Exited(code) => code,
            ClientExit::TimedOut | ClientExit::Interrupted => None,
        }
    }
}

/// The client binary and its arguments
#[derive(Debug, Clone)]
pub struct ClientSession {
    program: PathBuf,
    args: Vec<String>,
}

impl ClientSession {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the client to completion, to `timeout`, or until interrupted.
    ///
    /// Only a failure to launch is an error; timeouts and interrupts are
    /// reported in the capture together with whatever output was produced.
    pub fn run(
        &self,
        transcript: &ScriptedTranscript,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<ClientCapture> {
        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group()
            .with_death_pact()
            .spawn()
            .map_err(|source| NetTestError::Spawn {
                command: self.program.display().to_string(),
                source,
            })?;
        debug!("client started with pid {}", child.id());

        // Detached; ends once the client has read the transcript or exited
        if let Some(mut stdin) = child.stdin.take() {
            let input = transcript.render();
            thread::spawn(move || {
                // Dropping stdin at the end of this closure sends EOF
                if let Err(e) = stdin.write_all(input.as_bytes()) {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        warn!("Failed to write transcript to client: {}", e);
                    }
                }
            });
        }
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let waited = wait_for_exit(&mut child, start, timeout, interrupt);
        let exit = kill_on_error(&mut child, waited)?;

        // Helpers the client left behind in its group would otherwise keep
        // the pipes open past the budget.
        process_guard::kill_group(child.id());
        let deadline = Instant::now() + timeout.saturating_sub(start.elapsed()).max(DRAIN_GRACE);
        let capture = ClientCapture {
            stdout: stdout_reader.map(|d| d.collect(deadline)).unwrap_or_default(),
            stderr: stderr_reader.map(|d| d.collect(deadline)).unwrap_or_default(),
            exit,
        };
        info!("client finished: {:?}", capture.exit);
        Ok(capture)
    }
}

fn wait_for_exit(
    child: &mut Child,
    start: Instant,
    timeout: Duration,
    interrupt: &Interrupt,
) -> Result<ClientExit> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ClientExit::Exited(status.code()));
        }
        if interrupt.is_requested() {
            process_guard::kill_now(child)?;
            return Ok(ClientExit::Interrupted);
        }
        if start.elapsed() >= timeout {
            warn!("client exceeded {:?}, killing pid {}", timeout, child.id());
            process_guard::kill_now(child)?;
            return Ok(ClientExit::TimedOut);
        }
        thread::sleep(EXIT_POLL);
    }
}

/// Make sure a failed wait never leaves the client running
fn kill_on_error<T>(child: &mut Child, result: Result<T>) -> Result<T> {
    if result.is_err() {
        if let Err(e) = process_guard::kill_now(child) {
            warn!("Failed to kill client pid {}: {}", child.id(), e);
        }
    }
    result
}

/// Output pipe read on a helper thread into a shared buffer
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Drain {
    /// Whatever was read by `deadline`; a pipe still open then is abandoned
    fn collect(self, deadline: Instant) -> String {
        let wait = deadline.saturating_duration_since(Instant::now());
        if self.done.recv_timeout(wait).is_err() {
            warn!("client output pipe still open at deadline, keeping partial output");
        }
        let bytes = self.buf.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Drain {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, done) = mpsc::channel();
    let sink = Arc::clone(&buf);
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut b) = sink.lock() {
                        b.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("client pipe read failed: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(());
    });
    Drain { buf, done }
}
