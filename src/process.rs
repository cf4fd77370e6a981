use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::{Result, SojiError};

/// Cooperative cancellation signal shared between an operation and the
/// tasks it owns. Cloning the token shares the same signal.
#[derive(Clone)]
pub struct CancelToken {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called. Safe to await from
    /// multiple tasks concurrently.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable description of an external tool invocation.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub description: String,
}

impl ExternalCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion and capture all output at once. Intended for
    /// short-lived commands (probes, single-file conversions) where
    /// incremental output is not worth streaming.
    pub async fn execute(&self) -> Result<Output> {
        debug!("Executing {}: {} {:?}", self.description, self.program, self.args);

        let mut cmd = self.build();
        cmd.stdin(Stdio::null());
        cmd.output().await.map_err(|e| SojiError::Launch {
            program: self.program.clone(),
            source: e,
        })
    }
}

/// One line of child output, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(line) | OutputLine::Stderr(line) => line,
        }
    }

    pub fn is_stderr(&self) -> bool {
        matches!(self, OutputLine::Stderr(_))
    }
}

/// How a streamed child process ended.
#[derive(Debug)]
pub enum ProcessEnd {
    Exited(ExitStatus),
    Cancelled,
}

const LINE_CHANNEL_CAPACITY: usize = 256;

pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `command` with both output streams piped. Lines arrive through
    /// `RunningProcess::next_line` as the child writes them; the final status
    /// comes from `RunningProcess::wait`. When `cancel` fires, the child's
    /// whole process group is killed and the child reaped before `wait`
    /// resolves with `ProcessEnd::Cancelled`.
    pub fn spawn(command: &ExternalCommand, cancel: CancelToken) -> Result<RunningProcess> {
        debug!(
            "Spawning {}: {} {:?}",
            command.description, command.program, command.args
        );

        let mut cmd = command.build();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Lead a fresh process group so cancellation can take down the whole
        // tree, helpers included (yt-dlp spawns ffmpeg, which would otherwise
        // survive and hold the inherited output pipes open).
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| SojiError::Launch {
            program: command.program.clone(),
            source: e,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SojiError::Process("child stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SojiError::Process("child stderr was not piped".to_string()))?;

        let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        drain_stream(stdout, line_tx.clone(), OutputLine::Stdout);
        drain_stream(stderr, line_tx, OutputLine::Stderr);

        let (exit_tx, exit_rx) = oneshot::channel();
        let program = command.program.clone();
        tokio::spawn(async move {
            let end = tokio::select! {
                status = child.wait() => status.map(ProcessEnd::Exited).map_err(SojiError::Io),
                _ = cancel.cancelled() => {
                    terminate(&mut child, &program).await.map(|_| ProcessEnd::Cancelled)
                }
            };
            let _ = exit_tx.send(end);
        });

        Ok(RunningProcess {
            lines: line_rx,
            exit: exit_rx,
        })
    }
}

/// Handle to a spawned child. Streams end (``next_line`` returns `None`)
/// once both pipes close; `wait` must then be called to observe the exit.
pub struct RunningProcess {
    lines: mpsc::Receiver<OutputLine>,
    exit: oneshot::Receiver<Result<ProcessEnd>>,
}

impl RunningProcess {
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    pub async fn wait(self) -> Result<ProcessEnd> {
        drop(self.lines);
        match self.exit.await {
            Ok(end) => end,
            Err(_) => Err(SojiError::Process(
                "process monitor task ended unexpectedly".to_string(),
            )),
        }
    }
}

/// Kill the child's whole process group, then reap it. Signalling only the
/// direct child would leave its helpers running with the output pipes still
/// open, so the line streams would never reach EOF.
async fn terminate(child: &mut Child, program: &str) -> Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // The child leads its group, so its pid is the pgid.
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!("Failed to kill process group of {}: {}", program, e);
        }
        child.wait().await.map_err(SojiError::Io)?;
        return Ok(());
    }

    // Non-unix, or the child was already reaped: kill directly.
    match child.kill().await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Failed to kill {}: {}", program, e);
            // The child may have exited on its own already.
            child.wait().await.map(|_| ()).map_err(SojiError::Io)
        }
    }
}

fn drain_stream<R>(reader: R, tx: mpsc::Sender<OutputLine>, wrap: fn(String) -> OutputLine)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(wrap(line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Read errors end this stream but leave the process alone.
                    warn!("Error reading child output stream: {}", e);
                    break;
                }
            }
        }
    });
}
