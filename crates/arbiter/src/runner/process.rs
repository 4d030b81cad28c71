//! Process spawning and I/O
//!
//! Runs a single command inside a workspace with a cleared environment,
//! feeds it stdin, captures bounded output, and kills it when its wall-clock
//! timer fires or an output cap is hit.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::DEFAULT_PATH;

/// How long to wait for output readers once the process is gone
///
/// Background processes that inherited the pipes can keep them open after
/// the direct child died.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8 * 1024;

/// Errors that prevent a process from running at all
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command")]
    EmptyCommand,

    #[error("command '{program}' not found in PATH ({path})")]
    NotFound { program: String, path: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Output stream of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Why a process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own, or was killed by a signal it did not get from us
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// Killed because the wall-clock timeout elapsed
    TimedOut,

    /// Killed because it wrote more than the cap to a stream
    OutputLimitExceeded(Stream),
}

/// Everything captured from a finished process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub termination: Termination,

    /// Captured stdout, at most the configured limit
    pub stdout: Vec<u8>,

    /// Captured stderr, at most the configured limit
    pub stderr: Vec<u8>,

    /// Whether stdout was cut at the limit
    pub stdout_truncated: bool,

    /// Whether stderr was cut at the limit
    pub stderr_truncated: bool,

    /// Wall-clock time from spawn until the process was gone
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Check if the process exited on its own with status zero
    pub fn success(&self) -> bool {
        matches!(
            self.termination,
            Termination::Exited {
                code: Some(0),
                ..
            }
        )
    }

    /// Exit code if the process exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited { code, .. } => code,
            _ => None,
        }
    }
}

/// Builder for one process invocation
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    argv: Vec<String>,
    working_dir: PathBuf,
    /// Extra environment; everything else is cleared
    env: HashMap<String, String>,
    /// PATH for program lookup and for the child
    path: String,
    stdin: Vec<u8>,
    timeout: Duration,
    stdout_limit: usize,
    stderr_limit: usize,
    /// Kill the process once a stream exceeds its cap, instead of discarding the excess
    kill_on_output_limit: bool,
}

impl ProcessCommand {
    /// Create a new command builder
    pub fn new(argv: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            working_dir: working_dir.into(),
            env: HashMap::new(),
            path: DEFAULT_PATH.to_owned(),
            stdin: Vec::new(),
            timeout: Duration::from_secs(10),
            stdout_limit: 100 * 1024,
            stderr_limit: 10 * 1024,
            kill_on_output_limit: true,
        }
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the PATH used to find the program
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the bytes written to stdin before it is closed
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = data.into();
        self
    }

    /// Set the wall-clock timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set output caps for stdout and stderr
    pub fn output_limits(mut self, stdout: usize, stderr: usize) -> Self {
        self.stdout_limit = stdout;
        self.stderr_limit = stderr;
        self
    }

    /// Whether exceeding an output cap kills the process
    pub fn kill_on_output_limit(mut self, kill: bool) -> Self {
        self.kill_on_output_limit = kill;
        self
    }

    /// Get the argument vector
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Run the command to completion
    #[instrument(skip(self), fields(program = self.argv.first().map(String::as_str)))]
    pub async fn run(self) -> Result<ProcessOutput, ProcessError> {
        let program_name = self.argv.first().ok_or(ProcessError::EmptyCommand)?;
        let program = resolve_program(program_name, &self.working_dir, &self.path)?;

        let mut command = Command::new(&program);
        command
            .args(&self.argv[1..])
            .current_dir(&self.working_dir)
            .env_clear()
            .env("PATH", &self.path)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(argv = ?self.argv, "spawning process");

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program_name.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let data = self.stdin;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&data).await
                    && e.kind() != std::io::ErrorKind::BrokenPipe
                {
                    debug!(error = %e, "failed to write stdin");
                }
                // stdin is closed when dropped here
            });
        }

        let (overflow_tx, mut overflow_rx) = mpsc::channel(2);
        let overflow = self.kill_on_output_limit.then_some(overflow_tx);
        let stdout_task = child.stdout.take().map(|out| {
            tokio::spawn(capture(out, self.stdout_limit, Stream::Stdout, overflow.clone()))
        });
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, self.stderr_limit, Stream::Stderr, overflow)));

        let mut termination = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ProcessError::Wait)?;
                Termination::Exited {
                    code: status.code(),
                    signal: exit_signal(&status),
                }
            }
            _ = tokio::time::sleep(self.timeout) => Termination::TimedOut,
            Some(stream) = overflow_rx.recv() => Termination::OutputLimitExceeded(stream),
        };
        let mut elapsed = start.elapsed();

        if !matches!(termination, Termination::Exited { .. }) {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill process");
            }
            elapsed = start.elapsed();
            debug!(?termination, "process killed");
        }

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;

        // An exit can win the race against the reader that saw the overflow
        if self.kill_on_output_limit && matches!(termination, Termination::Exited { .. }) {
            if stdout.truncated {
                termination = Termination::OutputLimitExceeded(Stream::Stdout);
            } else if stderr.truncated {
                termination = Termination::OutputLimitExceeded(Stream::Stderr);
            }
        }

        debug!(
            ?termination,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_len = stdout.bytes.len(),
            stderr_len = stderr.bytes.len(),
            "process finished"
        );

        Ok(ProcessOutput {
            termination,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            elapsed,
        })
    }
}

/// Resolve the program of a command to a path
///
/// Names with a `/` are taken relative to the working directory, bare names
/// are looked up in `path`.
pub fn resolve_program(program: &str, working_dir: &Path, path: &str) -> Result<PathBuf, ProcessError> {
    if program.is_empty() {
        return Err(ProcessError::EmptyCommand);
    }

    if program.contains('/') {
        let program = Path::new(program);
        return Ok(if program.is_absolute() {
            program.to_path_buf()
        } else {
            working_dir.join(program)
        });
    }

    path.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ProcessError::NotFound {
            program: program.to_owned(),
            path: path.to_owned(),
        })
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Read a stream into memory, keeping at most `limit` bytes
///
/// With an overflow sender, reading stops at the first byte past the limit
/// and the stream is reported; without one, the excess is read and dropped.
async fn capture<R>(
    mut reader: R,
    limit: usize,
    stream: Stream,
    overflow: Option<mpsc::Sender<Stream>>,
) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(captured);
        }

        let room = limit.saturating_sub(captured.bytes.len());
        if n <= room {
            captured.bytes.extend_from_slice(&chunk[..n]);
            continue;
        }

        captured.bytes.extend_from_slice(&chunk[..room]);
        captured.truncated = true;
        if let Some(ref tx) = overflow {
            let _ = tx.send(stream).await;
            return Ok(captured);
        }
    }
}

async fn drain(task: Option<JoinHandle<std::io::Result<Captured>>>) -> Captured {
    let Some(mut task) = task else {
        return Captured::default();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(Ok(captured))) => captured,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "failed to read process output");
            Captured::default()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            Captured::default()
        }
        Err(_) => {
            warn!("output pipe still open after process exit, discarding");
            task.abort();
            Captured::default()
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
