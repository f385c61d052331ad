/// Which sub-command produced a block of output.
///
/// The kind decides which non-deterministic lines are stripped before the
/// output is hashed or shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `diff` output.
    Diff,
    /// `template` output.
    Template,
    /// `build --embed-values` output, which carries comments and the
    /// absolute manifest path.
    EmbeddedBuild,
}

/// Repository refresh chatter that differs between runs.
const REPO_UPDATE_PREFIX: &str = "...Successfully got an update from the \"";
const FILEPATH_PREFIX: &str = "filepath:";

/// Strip non-deterministic lines from tool output.
///
/// Pure and idempotent: every kept line is re-terminated with `\n`, so
/// normalizing already-normalized text returns it unchanged.
pub fn normalize_output(raw: &str, kind: OutputKind) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.starts_with(REPO_UPDATE_PREFIX) {
            continue;
        }
        if kind == OutputKind::EmbeddedBuild
            && (line.trim_start().starts_with('#') || line.starts_with(FILEPATH_PREFIX))
        {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
