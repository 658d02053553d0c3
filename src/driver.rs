//! Process driver
//!
//! Executes one shell statement and produces a [`ProcessResult`].
//! Two modes:
//!
//! - **Batch**: spawn with stdout/stderr piped to background reader
//!   threads (avoids pipe-buffer deadlock), stdin closed, bounded by a
//!   wall-clock timeout.
//! - **Interactive**: spawn under a pseudo-terminal so the child sees a
//!   tty and line-buffers its output, then drive an expect/send script
//!   with a per-step timeout. Output arrives combined on the PTY master
//!   as a single transcript.
//!
//! The child runs in the test case's working directory and inherits the
//! parent environment plus the test's extra variables.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, CommandBuilder, PtySize};

use crate::error::{ErrorKind, SpecError};
use crate::parser::StepKind;

/// How often the driver polls a child for exit
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// PTY read chunk size
const PTY_READ_BUFFER: usize = 8192;

/// Which driver produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Batch,
    Interactive,
}

/// Outcome of one shell statement
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub mode: ExecMode,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A fully resolved command: aliases applied, variables expanded
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Command line as shown in diagnostics
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}

/// One interactive step with its text already expanded
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub kind: StepKind,
    pub text: String,
}

// ──────────────────────────────────────────────────────────
// Batch mode
// ──────────────────────────────────────────────────────────

/// Run a command to completion, capturing stdout and stderr separately.
pub fn run_batch(inv: &Invocation, timeout: Duration) -> Result<ProcessResult, SpecError> {
    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .current_dir(&inv.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in &inv.env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().map_err(|e| spawn_error(&inv.program, e))?;

    // Drain both pipes on background threads so a chatty child can't
    // deadlock on a full pipe buffer.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let stdout = join_reader(stdout_reader);
                    let stderr = join_reader(stderr_reader);
                    return Err(timeout_error(
                        format!(
                            "command timed out after {}s: {}",
                            timeout.as_secs(),
                            inv.display()
                        ),
                        &stdout,
                        &stderr,
                    ));
                }
                thread::sleep(WAIT_POLL_INTERVAL);
            }
            Err(e) => return Err(SpecError::from(e)),
        }
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    Ok(ProcessResult {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
        mode: ExecMode::Batch,
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn join_reader(handle: thread::JoinHandle<Vec<u8>>) -> String {
    String::from_utf8_lossy(&handle.join().unwrap_or_default()).into_owned()
}

fn spawn_error(program: &str, e: std::io::Error) -> SpecError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SpecError::new(
            ErrorKind::CommandFailed,
            format!("executable not found: {}", program),
        )
    } else {
        SpecError::new(
            ErrorKind::CommandFailed,
            format!("failed to execute '{}': {}", program, e),
        )
    }
}

fn timeout_error(mut msg: String, stdout: &str, stderr: &str) -> SpecError {
    if !stdout.trim().is_empty() {
        msg.push_str(&format!("\nstdout so far:\n{}", stdout));
    }
    if !stderr.trim().is_empty() {
        msg.push_str(&format!("\nstderr so far:\n{}", stderr));
    }
    SpecError::new(ErrorKind::Timeout, msg)
}

// ──────────────────────────────────────────────────────────
// Interactive mode
// ──────────────────────────────────────────────────────────

/// Run a command under a pseudo-terminal, driving an expect/send script.
///
/// Each `Expect` step reads until the transcript (past the previous
/// match) contains the text; each `Send` step writes the text plus a
/// newline. After the script, output is drained to EOF and the child is
/// waited for, all bounded by `step_timeout`.
pub fn run_interactive(
    inv: &Invocation,
    steps: &[ResolvedStep],
    step_timeout: Duration,
) -> Result<ProcessResult, SpecError> {
    let pty = native_pty_system();
    let pair = pty
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| SpecError::new(ErrorKind::Io, format!("failed to open pty: {}", e)))?;

    let mut cmd = CommandBuilder::new(&inv.program);
    cmd.args(&inv.args);
    cmd.cwd(&inv.workdir);
    for (k, v) in &inv.env {
        cmd.env(k, v);
    }

    let mut child = pair.slave.spawn_command(cmd).map_err(|e| {
        SpecError::new(
            ErrorKind::CommandFailed,
            format!("failed to execute '{}': {}", inv.program, e),
        )
    })?;
    // The parent must not hold the slave end open or the master never
    // sees EOF.
    drop(pair.slave);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| SpecError::new(ErrorKind::Io, format!("pty reader: {}", e)))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| SpecError::new(ErrorKind::Io, format!("pty writer: {}", e)))?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    thread::spawn(move || {
        let mut buf = [0u8; PTY_READ_BUFFER];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut transcript = String::new();
    // Matched text is consumed: each expect searches past the previous
    // match so repeated prompts are matched in sequence.
    let mut cursor = 0usize;

    for step in steps {
        match step.kind {
            StepKind::Expect => {
                let deadline = Instant::now() + step_timeout;
                loop {
                    if let Some(pos) = transcript[cursor..].find(&step.text) {
                        cursor += pos + step.text.len();
                        break;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        kill_child(&mut *child);
                        return Err(timeout_error(
                            format!(
                                "timed out after {}s waiting for '{}'",
                                step_timeout.as_secs(),
                                step.text
                            ),
                            &transcript,
                            "",
                        ));
                    }
                    match rx.recv_timeout(deadline - now) {
                        Ok(chunk) => {
                            transcript.push_str(&String::from_utf8_lossy(&chunk));
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            kill_child(&mut *child);
                            return Err(timeout_error(
                                format!(
                                    "timed out after {}s waiting for '{}'",
                                    step_timeout.as_secs(),
                                    step.text
                                ),
                                &transcript,
                                "",
                            ));
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => {
                            // Output ended before the expected text appeared
                            kill_child(&mut *child);
                            return Err(timeout_error(
                                format!("child exited before printing '{}'", step.text),
                                &transcript,
                                "",
                            ));
                        }
                    }
                }
            }
            StepKind::Send => {
                writer
                    .write_all(step.text.as_bytes())
                    .and_then(|_| writer.write_all(b"\n"))
                    .and_then(|_| writer.flush())
                    .map_err(|e| {
                        SpecError::new(
                            ErrorKind::Io,
                            format!("failed to send '{}': {}", step.text, e),
                        )
                    })?;
            }
        }
    }

    // Drain remaining output until the reader hits EOF
    let deadline = Instant::now() + step_timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            kill_child(&mut *child);
            return Err(timeout_error(
                format!(
                    "timed out after {}s waiting for exit: {}",
                    step_timeout.as_secs(),
                    inv.display()
                ),
                &transcript,
                "",
            ));
        }
        match rx.recv_timeout(deadline - now) {
            Ok(chunk) => transcript.push_str(&String::from_utf8_lossy(&chunk)),
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                kill_child(&mut *child);
                return Err(timeout_error(
                    format!(
                        "timed out after {}s waiting for exit: {}",
                        step_timeout.as_secs(),
                        inv.display()
                    ),
                    &transcript,
                    "",
                ));
            }
        }
    }

    // EOF seen — the child should exit promptly now
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_child(&mut *child);
                    return Err(timeout_error(
                        format!(
                            "timed out after {}s waiting for exit: {}",
                            step_timeout.as_secs(),
                            inv.display()
                        ),
                        &transcript,
                        "",
                    ));
                }
                thread::sleep(WAIT_POLL_INTERVAL);
            }
            Err(e) => return Err(SpecError::from(e)),
        }
    };

    Ok(ProcessResult {
        exit_code: status.exit_code() as i32,
        stdout: transcript,
        stderr: String::new(),
        mode: ExecMode::Interactive,
    })
}

fn kill_child(child: &mut dyn portable_pty::Child) {
    let _ = child.kill();
    let _ = child.wait();
}
