//! Subprocess helpers shared across the pipeline.

use anyhow::Context;
use indexmap::IndexMap;
use std::path::Path;
use std::process::Output;

use crate::{anyhow_loc, function_name};

/// Ensures that the directory for a given file path exists, creating it if necessary.
pub fn ensure_directory_for_file(filepath: &Path) -> anyhow::Result<()> {
    let dir =
        filepath.parent().ok_or_else(|| anyhow_loc!("Could not get dir from filepath [{:?}]", filepath))?;
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Ensures that a directory exists, creating it if necessary.
pub fn ensure_directory(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to ensure directories for [{:?}]", dir))
}

/// Executes a command with piped stdout/stderr for capture. Returns the
/// command output, or an error if the process could not be spawned at all (a
/// non-zero exit is NOT an error here). When `verbose_tools` is true the
/// captured stdout/stderr are replayed at info level after completion.
pub fn run_command_verbose(exe: &Path, args: &[String], verbose_tools: bool) -> anyhow::Result<Output> {
    let command_display = format!("{} {}", exe.display(), args.join(" "));

    tracing::trace!("Executing command: {command_display}");

    let output = std::process::Command::new(exe)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .with_context(|| format!("Failed to execute command: {command_display}"))?;

    if verbose_tools {
        log_tool_output(&output);
    }

    Ok(output)
}

/// Executes a command with a fully-resolved environment. The ambient process
/// environment is cleared first; the analyzer must see exactly the merged
/// environment the pipeline assembled, nothing more.
pub fn run_command_with_env(
    exe: &Path,
    args: &[String],
    env: &IndexMap<String, String>,
    verbose_tools: bool,
) -> anyhow::Result<Output> {
    let command_display = format!("{} {}", exe.display(), args.join(" "));

    tracing::trace!("Executing command: {command_display}");

    let output = std::process::Command::new(exe)
        .args(args)
        .env_clear()
        .envs(env.iter())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .with_context(|| format!("Failed to execute command: {command_display}"))?;

    if verbose_tools {
        log_tool_output(&output);
    }

    Ok(output)
}

fn log_tool_output(output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stdout.is_empty() {
        tracing::info!(target: "command_output", "stdout:\n{}", stdout);
    }
    if !stderr.is_empty() {
        tracing::info!(target: "command_output", "stderr:\n{}", stderr);
    }
}
