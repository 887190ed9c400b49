//! Subprocess execution of generated scripts.
//!
//! Scripts run in a separate interpreter process with captured stdio and a
//! hard wall-clock timeout. Execution is infallible at the API level: launch
//! failures and timeouts are reported inside [`ExecutionOutcome`] with
//! synthetic exit codes, so callers branch on one shape.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Synthetic exit code for a timed-out script, matching the shell convention
/// for `timeout(1)`.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Synthetic exit code when the interpreter cannot be launched at all.
const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Synthetic exit code when polling the child fails; the child is killed but
/// the outcome must not masquerade as a timeout.
const POLL_FAILURE_EXIT_CODE: i32 = 125;

/// How often to poll a running child for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of one script execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_status == TIMEOUT_EXIT_CODE
    }
}

/// Runs generated scripts under an interpreter with a timeout.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    /// Execute `script` and wait for completion or timeout.
    ///
    /// On timeout the child is killed and the outcome carries exit status
    /// 124 with a note in stderr. If the interpreter cannot be spawned the
    /// outcome carries exit status 127 and the launch error in stderr. If
    /// polling the child fails it is killed and the outcome carries exit
    /// status 125 with the poll error in stderr.
    pub fn run(&self, script: &Path) -> ExecutionOutcome {
        debug!(
            interpreter = %self.interpreter,
            script = %script.display(),
            timeout_secs = self.timeout.as_secs(),
            "executing script"
        );

        let child = Command::new(&self.interpreter)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(interpreter = %self.interpreter, "failed to launch interpreter: {e}");
                return ExecutionOutcome {
                    exit_status: LAUNCH_FAILURE_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!("failed to launch '{}': {e}", self.interpreter),
                };
            }
        };

        // Drain both pipes on background threads so a chatty script cannot
        // deadlock against a full pipe buffer while we poll.
        let stdout_handle = drain_pipe(child.stdout.take());
        let stderr_handle = drain_pipe(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let mut poll_failure = None;
        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code().unwrap_or(-1),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        break self.kill_timed_out(&mut child);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("failed to poll child process: {e}");
                    poll_failure = Some(e.to_string());
                    let _ = child.kill();
                    let _ = child.wait();
                    break POLL_FAILURE_EXIT_CODE;
                }
            }
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let mut stderr = stderr_handle.join().unwrap_or_default();

        if exit_status == TIMEOUT_EXIT_CODE {
            append_note(
                &mut stderr,
                &format!(
                    "script timed out after {}s and was killed",
                    self.timeout.as_secs()
                ),
            );
        } else if let Some(reason) = poll_failure {
            append_note(
                &mut stderr,
                &format!("failed to poll script process and killed it: {reason}"),
            );
        }

        debug!(exit_status, "script finished");
        ExecutionOutcome {
            exit_status,
            stdout,
            stderr,
        }
    }

    fn kill_timed_out(&self, child: &mut Child) -> i32 {
        warn!(
            timeout_secs = self.timeout.as_secs(),
            "script exceeded timeout, killing"
        );
        // Kill can only fail if the child already exited, which is fine.
        let _ = child.kill();
        let _ = child.wait();
        TIMEOUT_EXIT_CODE
    }
}

fn append_note(stderr: &mut String, note: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(note);
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}
