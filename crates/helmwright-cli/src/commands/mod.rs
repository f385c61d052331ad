pub mod apply;
pub mod destroy;
pub mod import;
pub mod plan;
pub mod refresh;
pub mod show;

use helmwright_core::CoreError;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_TOOL_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render an engine error with the prefix `main` maps to an exit code.
pub fn describe(e: &CoreError) -> String {
    if e.is_invalid_config() {
        format!("configuration error: {e}")
    } else if e.is_tool_failure() {
        format!("tool error: {e}")
    } else {
        e.to_string()
    }
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(finished_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(finished_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Color added and removed lines of a diff.
pub fn colorize_diff(diff: &str) -> String {
    use console::Style;
    let added = Style::new().green();
    let removed = Style::new().red();
    diff.lines()
        .map(|line| {
            if line.starts_with('+') {
                added.apply_to(line).to_string()
            } else if line.starts_with('-') {
                removed.apply_to(line).to_string()
            } else {
                line.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
