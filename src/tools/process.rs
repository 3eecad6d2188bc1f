//! Subprocess supervision for external tools.
//!
//! Output is streamed line by line into an injected [`OutputSink`] and kept
//! in a bounded ring buffer, which is replayed when the tool exits with a
//! failure status.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lines of output retained for replay after a failure.
const DEFAULT_REPLAY_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Destination for captured tool output.
pub trait OutputSink: Send + Sync + fmt::Debug {
    fn line(&self, tool: &str, stream: OutputStream, line: &str);

    /// Called with the retained output after a failed exit.
    fn replay(&self, tool: &str, lines: &[String]);
}

/// Re-emits tool output as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, tool: &str, stream: OutputStream, line: &str) {
        tracing::info!(tool, %stream, "{}", readable_line(line));
    }

    fn replay(&self, tool: &str, lines: &[String]) {
        if lines.is_empty() {
            tracing::warn!("{} produced no output before exiting", tool);
            return;
        }
        tracing::warn!("Last {} lines of {} output:", lines.len(), tool);
        for line in lines {
            tracing::warn!(tool, "  {}", readable_line(line));
        }
    }
}

/// The supervisor emits JSON log lines; show their message when possible.
fn readable_line(line: &str) -> Cow<'_, str> {
    if !line.starts_with('{') {
        return Cow::Borrowed(line);
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return Cow::Borrowed(line);
    };
    match (
        value.get("message").and_then(|m| m.as_str()),
        value.get("process").and_then(|p| p.as_str()),
    ) {
        (Some(message), Some(process)) => Cow::Owned(format!("[{}] {}", process, message)),
        (Some(message), None) => Cow::Owned(message.to_string()),
        _ => Cow::Borrowed(line),
    }
}

/// Keeps everything it receives; for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(String, OutputStream, String)>>,
    replays: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(String, OutputStream, String)> {
        self.lines.lock().clone()
    }

    pub fn replays(&self) -> Vec<(String, Vec<String>)> {
        self.replays.lock().clone()
    }
}

impl OutputSink for RecordingSink {
    fn line(&self, tool: &str, stream: OutputStream, line: &str) {
        self.lines
            .lock()
            .push((tool.to_string(), stream, line.to_string()));
    }

    fn replay(&self, tool: &str, lines: &[String]) {
        self.replays.lock().push((tool.to_string(), lines.to_vec()));
    }
}

type RingBuffer = Arc<Mutex<VecDeque<String>>>;

/// One invocation of an external tool.
pub struct ToolProcess {
    tool: String,
    program: PathBuf,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
    grace_period: Duration,
    sink: Arc<dyn OutputSink>,
    replay_lines: usize,
}

impl ToolProcess {
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
            grace_period: super::DEFAULT_GRACE_PERIOD,
            sink,
            replay_lines: DEFAULT_REPLAY_LINES,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn replay_lines(mut self, lines: usize) -> Self {
        self.replay_lines = lines.max(1);
        self
    }

    /// Run until the tool exits or `cancel` fires.
    ///
    /// Cancellation sends SIGTERM to the tool's process group and escalates
    /// to SIGKILL after the grace period; it is not an error. A failed exit
    /// is logged at warn level with the retained output replayed, then
    /// returned as [`Error::SubprocessExit`].
    #[tracing::instrument(skip_all, fields(tool = %self.tool))]
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.work_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!("Launching {} {}", self.program.display(), self.args.join(" "));
        let mut child = command.spawn().map_err(|e| {
            tracing::error!("Failed to launch {}: {}", self.tool, e);
            Error::Io(e)
        })?;

        let buffer: RingBuffer = Arc::new(Mutex::new(VecDeque::new()));
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(self.pump(stdout, OutputStream::Stdout, Arc::clone(&buffer)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(self.pump(stderr, OutputStream::Stderr, Arc::clone(&buffer)));
        }

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => {
                terminate(&mut child, &self.tool, self.grace_period).await;
                None
            }
        };

        for pump in pumps {
            let _ = pump.await;
        }

        match status {
            None => {
                tracing::debug!("{} stopped", self.tool);
                Ok(())
            }
            Some(status) if status.success() => {
                tracing::info!("{} exited", self.tool);
                Ok(())
            }
            Some(status) => {
                self.report_failure(status, &buffer);
                Err(Error::SubprocessExit {
                    tool: self.tool.clone(),
                    code: status.code(),
                })
            }
        }
    }

    fn pump<R>(&self, reader: R, stream: OutputStream, buffer: RingBuffer) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tool = self.tool.clone();
        let sink = Arc::clone(&self.sink);
        let capacity = self.replay_lines;
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.line(&tool, stream, &line);
                let mut buffer = buffer.lock();
                buffer.push_back(line);
                if buffer.len() > capacity {
                    buffer.pop_front();
                }
            }
        })
    }

    fn report_failure(&self, status: ExitStatus, buffer: &RingBuffer) {
        match status.code() {
            Some(code) => tracing::warn!("{} exited with code {}", self.tool, code),
            None => tracing::warn!("{} was terminated by a signal", self.tool),
        }
        let lines: Vec<String> = buffer.lock().iter().cloned().collect();
        self.sink.replay(&self.tool, &lines);
    }
}

#[cfg(unix)]
async fn terminate(child: &mut Child, tool: &str, grace_period: Duration) {
    use nix::sys::signal::{self, killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|raw| i32::try_from(raw).ok()) else {
        // Already reaped.
        let _ = child.wait().await;
        return;
    };
    let pid = Pid::from_raw(pid);

    let signalled = killpg(pid, Signal::SIGTERM).or_else(|_| signal::kill(pid, Signal::SIGTERM));
    if signalled.is_ok() {
        match tokio::time::timeout(grace_period, child.wait()).await {
            Ok(_) => {
                tracing::debug!("{} exited after SIGTERM", tool);
                return;
            }
            Err(_) => tracing::warn!(
                "{} did not exit after SIGTERM (grace period: {:?}), sending SIGKILL",
                tool,
                grace_period
            ),
        }
    }

    let _ = killpg(pid, Signal::SIGKILL).or_else(|_| signal::kill(pid, Signal::SIGKILL));
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, tool: &str, _grace_period: Duration) {
    tracing::debug!("Killing {}", tool);
    let _ = child.start_kill();
    let _ = child.wait().await;
}
