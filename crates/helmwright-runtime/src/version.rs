use crate::invocation::Invocation;
use crate::runner::{run_tool, RunMode, ToolRunner};
use crate::RuntimeError;
use semver::Version;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolved version of the tool. `Unknown` means assume the oldest
/// supported behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolVersion {
    Known(Version),
    Unknown,
}

impl ToolVersion {
    /// True only for a known version at or above `min`.
    pub fn at_least(&self, min: &Version) -> bool {
        match self {
            Self::Known(v) => v >= min,
            Self::Unknown => false,
        }
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Parse the trailing token of `<tool> version` output, e.g.
/// `helmfile version v0.150.0`.
pub fn parse_version_output(output: &str) -> ToolVersion {
    let Some(token) = output.split_whitespace().last() else {
        return ToolVersion::Unknown;
    };
    let token = token.strip_prefix('v').unwrap_or(token);
    match Version::parse(token) {
        Ok(v) => ToolVersion::Known(v),
        Err(e) => {
            warn!("unable to parse tool version {token:?}: {e}");
            ToolVersion::Unknown
        }
    }
}

/// Run `invocation` (a `version` call) and parse the result, giving up after
/// `timeout`. Every failure degrades to [`ToolVersion::Unknown`].
pub fn resolve_version(
    runner: Arc<dyn ToolRunner>,
    invocation: Invocation,
    timeout: Duration,
) -> ToolVersion {
    let (tx, rx) = mpsc::channel();
    let program = invocation.program.clone();
    std::thread::spawn(move || {
        let _ = tx.send(run_tool(runner.as_ref(), &invocation, RunMode::Capture));
    });

    let result = match rx.recv_timeout(timeout) {
        Ok(r) => r,
        Err(RecvTimeoutError::Timeout) => Err(RuntimeError::Timeout {
            what: format!("{program} version"),
            secs: timeout.as_secs(),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(RuntimeError::WorkerLost {
            what: format!("{program} version"),
        }),
    };

    match result {
        Ok(output) => {
            let v = parse_version_output(&output);
            debug!(%program, version = %v, "resolved tool version");
            v
        }
        Err(e) => {
            warn!(%program, "unable to resolve tool version: {e}");
            ToolVersion::Unknown
        }
    }
}
