//! Child processes bounded by a wall-clock timeout and an output cap.
//!
//! The agent CLI can run for minutes and print without limit, so both pipes
//! are drained on reader threads while the parent waits with a deadline.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

const READ_CHUNK: usize = 8 * 1024;

/// Bounds applied to one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is read and discarded.
    pub output_limit_bytes: usize,
}

/// One captured stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the limit.
    pub dropped: usize,
}

impl Captured {
    fn append_to(&self, label: &str, buf: &mut String) {
        if !buf.is_empty() && !buf.ends_with('\n') && !self.bytes.is_empty() {
            buf.push('\n');
        }
        buf.push_str(&String::from_utf8_lossy(&self.bytes));
        if self.dropped > 0 {
            buf.push_str(&format!("\n[{label} truncated {} bytes]\n", self.dropped));
        }
    }
}

#[derive(Debug)]
pub struct BoundedOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    /// The deadline passed and the child was killed.
    pub timed_out: bool,
}

impl BoundedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout then stderr as text, with a notice after each truncated stream.
    pub fn transcript(&self) -> String {
        let mut buf = String::new();
        self.stdout.append_to("stdout", &mut buf);
        self.stderr.append_to("stderr", &mut buf);
        buf
    }
}

/// Spawn `cmd` with stdin closed and wait for it within `limits`.
///
/// Spawn failures are errors; a timeout is reported through
/// [`BoundedOutput::timed_out`].
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = limits.timeout.as_secs()))]
pub fn run_bounded(mut cmd: Command, limits: &Limits) -> Result<BoundedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", cmd.get_program().to_string_lossy()))?;
    debug!(pid = child.id(), "child started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("child stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("child stderr not captured"))?;
    let cap = limits.output_limit_bytes;
    let stdout_reader = thread::spawn(move || drain(stdout, cap));
    let stderr_reader = thread::spawn(move || drain(stderr, cap));

    let (status, timed_out) = match child.wait_timeout(limits.timeout).context("wait for child")? {
        Some(status) => (status, false),
        None => {
            warn!("deadline passed, killing child");
            child.kill().context("kill child")?;
            (child.wait().context("reap child")?, true)
        }
    };

    let stdout = collect(stdout_reader).context("read stdout")?;
    let stderr = collect(stderr_reader).context("read stderr")?;
    if stdout.dropped + stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "child output over limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");

    Ok(BoundedOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn collect(reader: JoinHandle<Result<Captured>>) -> Result<Captured> {
    reader
        .join()
        .map_err(|_| anyhow!("reader thread panicked"))?
}

fn drain<R: Read>(mut stream: R, cap: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(captured);
        }
        let keep = n.min(cap.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn limits(timeout: Duration, output_limit_bytes: usize) -> Limits {
        Limits {
            timeout,
            output_limit_bytes,
        }
    }

    #[test]
    fn transcript_joins_streams() {
        let output = run_bounded(
            sh("printf out; echo err >&2"),
            &limits(Duration::from_secs(10), 1_000),
        )
        .expect("run");
        assert!(output.success());
        assert_eq!(output.transcript(), "out\nerr\n");
    }

    #[test]
    fn output_past_limit_is_dropped() {
        let output = run_bounded(
            sh("printf 0123456789"),
            &limits(Duration::from_secs(10), 4),
        )
        .expect("run");
        assert_eq!(output.stdout.bytes, b"0123");
        assert_eq!(output.stdout.dropped, 6);
        assert!(output.transcript().ends_with("[stdout truncated 6 bytes]\n"));
    }

    #[test]
    fn deadline_kills_child() {
        let output = run_bounded(
            sh("exec sleep 5"),
            &limits(Duration::from_millis(100), 100),
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = run_bounded(
            Command::new("gardener-no-such-program"),
            &limits(Duration::from_secs(1), 100),
        )
        .expect_err("spawn fails");
        assert!(format!("{err:#}").contains("spawn gardener-no-such-program"));
    }
}
