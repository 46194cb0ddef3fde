//! Running external tools.
//!
//! An [`Invocation`] describes one command line. A [`ProcessRunner`] turns it
//! into a [`ProcessResult`]; the production implementation is
//! [`SystemRunner`], which resolves the executable on `PATH`, streams the
//! child's output to an [`OutputSink`] as it arrives, and keeps a copy of
//! everything it read. Tests substitute their own runner.

pub mod tools;

use std::{
    ffi::{OsStr, OsString},
    fmt::Display,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::{debug, info};

use crate::error::{EncrustError, Result};

pub use tools::Tool;

/// A full command line to be run. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    quiet: bool,
    inherit_stdio: bool,
}

/// Display raw command string
impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

impl Invocation {
    /// Start an invocation of `program`. Prefer the [`Tool`] registry for
    /// the commands the workflows know about.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            quiet: false,
            inherit_stdio: false,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Add an environment override on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Do not forward output events to the sink. Output is still captured.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Hand the terminal to the child; nothing is captured.
    pub fn inherit_stdio(mut self) -> Self {
        self.inherit_stdio = true;
        self
    }

    /// Program name as given, before `PATH` resolution.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program name.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Environment overrides, in insertion order.
    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    /// Working directory override, if any.
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// See [`Invocation::quiet`].
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// See [`Invocation::inherit_stdio`].
    pub fn inherits_stdio(&self) -> bool {
        self.inherit_stdio
    }

    /// Arguments as lossy strings, handy for assertions and logs.
    pub fn argv_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn to_command(&self, executable: &Path) -> Command {
        let mut cmd = Command::new(executable);
        cmd.args(&self.args);
        if !self.env.is_empty() {
            cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if self.inherit_stdio {
            cmd.stdin(Stdio::inherit());
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        }
        cmd
    }
}

/// The result of running a process to completion.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Exit status; `None` when a signal ended the process.
    pub code: Option<i32>,
    /// Captured stdout. Empty when stdio was inherited.
    pub stdout: Vec<u8>,
    /// Captured stderr. Empty when stdio was inherited.
    pub stderr: Vec<u8>,
    /// What was run.
    pub invocation: Invocation,
}

impl ProcessResult {
    /// Exit status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`EncrustError::ProcessExit`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(EncrustError::ProcessExit {
            invocation: self.invocation.to_string(),
            code: self.code,
            stdout: self.stdout,
            stderr: self.stderr,
        })
    }

    /// Captured stdout as text.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Which pipe an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// The child's standard output.
    Stdout,
    /// The child's standard error.
    Stderr,
}

/// One line (terminator included when present) read from a child.
#[derive(Debug, Clone, Copy)]
pub struct OutputEvent<'a> {
    /// Pipe the line was read from.
    pub source: StreamSource,
    /// Raw bytes of the line.
    pub line: &'a [u8],
}

/// Receives output events while a process runs.
pub trait OutputSink: Send + Sync {
    /// Called once per line, from the task reading that pipe.
    fn event(&self, invocation: &Invocation, event: OutputEvent<'_>);
}

/// Forwards process output to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn event(&self, invocation: &Invocation, event: OutputEvent<'_>) {
        let text = String::from_utf8_lossy(event.line);
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }
        match event.source {
            StreamSource::Stdout => {
                info!(program = invocation.program(), "{text}")
            }
            StreamSource::Stderr => {
                info!(program = invocation.program(), stream = "stderr", "{text}")
            }
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn event(&self, _invocation: &Invocation, _event: OutputEvent<'_>) {}
}

/// Something that can run an [`Invocation`] to completion.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and report the outcome whatever the exit status.
    async fn execute(&self, invocation: &Invocation) -> Result<ProcessResult>;

    /// Run to completion, failing with [`EncrustError::ProcessExit`] on a
    /// non-zero exit.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessResult> {
        self.execute(invocation).await?.check()
    }

    /// Absolute path of `program`, for tools that take another tool's path
    /// as an argument.
    fn locate(&self, program: &str) -> Result<PathBuf> {
        resolve_executable(program)
    }
}

/// Runs real processes on the host.
#[derive(Clone)]
pub struct SystemRunner {
    sink: Arc<dyn OutputSink>,
}

impl std::fmt::Debug for SystemRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRunner").finish_non_exhaustive()
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRunner {
    /// A runner that logs output through [`TracingSink`].
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// A runner that never echoes output.
    pub fn silent() -> Self {
        Self::with_sink(Arc::new(NullSink))
    }

    /// A runner that sends output to `sink`.
    pub fn with_sink(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }
}

/// Locate `program` on `PATH` (or accept it as a path).
pub fn resolve_executable(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|source| EncrustError::ExecutableNotFound {
        name: program.to_string(),
        source,
    })
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<ProcessResult> {
        let executable = resolve_executable(invocation.program())?;
        debug!(
            executable = %executable.display(),
            "running {invocation}"
        );

        let mut child = invocation.to_command(&executable).spawn().map_err(
            |source| EncrustError::Spawn {
                program: invocation.program().to_string(),
                source,
            },
        )?;

        let sink = if invocation.is_quiet() {
            None
        } else {
            Some(self.sink.as_ref())
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr, status) = tokio::join!(
            pump(stdout, StreamSource::Stdout, invocation, sink),
            pump(stderr, StreamSource::Stderr, invocation, sink),
            child.wait(),
        );
        let status = status.map_err(|source| EncrustError::Spawn {
            program: invocation.program().to_string(),
            source,
        })?;
        let stdout = stdout
            .map_err(|source| EncrustError::io(&executable, source))?;
        let stderr = stderr
            .map_err(|source| EncrustError::io(&executable, source))?;

        debug!(code = ?status.code(), "{} finished", invocation.program());
        Ok(ProcessResult {
            code: status.code(),
            stdout,
            stderr,
            invocation: invocation.clone(),
        })
    }
}

/// Read a pipe to EOF, forwarding each line to the sink and keeping a copy.
async fn pump<R>(
    reader: Option<R>,
    source: StreamSource,
    invocation: &Invocation,
    sink: Option<&dyn OutputSink>,
) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let Some(reader) = reader else {
        return Ok(captured);
    };
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            break;
        }
        if let Some(sink) = sink {
            sink.event(invocation, OutputEvent { source, line: &line });
        }
        captured.extend_from_slice(&line);
    }
    Ok(captured)
}
