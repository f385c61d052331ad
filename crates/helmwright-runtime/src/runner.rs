use crate::invocation::Invocation;
use crate::RuntimeError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use tracing::debug;

/// Raw result of running the tool: exit code and interleaved stdout+stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub output: String,
}

impl ToolOutput {
    pub fn new(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }
}

/// How exit codes are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// `diff --detailed-exitcode`: 0 means no changes, 2 means changes present.
    Diff,
    /// Any other sub-command: only 0 is success.
    Capture,
}

pub trait ToolRunner: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, invocation: &Invocation) -> Result<ToolOutput, RuntimeError>;
}

/// Run `invocation` and interpret its exit code.
///
/// In diff mode exit 0 yields empty text and exit 2 yields the output. Any
/// other non-zero exit is a [`RuntimeError::ToolFailed`] carrying the combined
/// output.
pub fn run_tool(
    runner: &dyn ToolRunner,
    invocation: &Invocation,
    mode: RunMode,
) -> Result<String, RuntimeError> {
    let out = runner.execute(invocation)?;
    debug!(
        runner = runner.name(),
        subcommand = invocation.subcommand_name(),
        code = ?out.code,
        "helmfile command output: {:?}",
        out.output
    );
    match (mode, out.code) {
        (RunMode::Diff, Some(0)) => Ok(String::new()),
        (RunMode::Diff, Some(2)) | (RunMode::Capture, Some(0)) => Ok(out.output),
        (_, code) => Err(RuntimeError::ToolFailed {
            program: invocation.program.clone(),
            status: code.map_or_else(
                || "terminated by signal".to_owned(),
                |c| format!("exit status {c}"),
            ),
            output: out.output,
        }),
    }
}

/// Spawns the real tool as a child process.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ToolRunner for ProcessRunner {
    fn name(&self) -> &'static str {
        "process"
    }

    fn execute(&self, invocation: &Invocation) -> Result<ToolOutput, RuntimeError> {
        // One file for both streams keeps their interleaving.
        let mut sink: File = tempfile::tempfile()?;
        let status = Command::new(&invocation.program)
            .args(invocation.argv())
            .current_dir(&invocation.dir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::from(sink.try_clone()?))
            .stderr(Stdio::from(sink.try_clone()?))
            .status()
            .map_err(|e| RuntimeError::Spawn {
                program: invocation.program.clone(),
                source: e,
            })?;

        sink.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        sink.read_to_end(&mut raw)?;

        Ok(ToolOutput {
            code: status.code(),
            output: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}
