use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use maat::codemodel::IncludePath;
use maat::logging::{init_logging, init_logging_with_profile, LogConfig, LogFormat, LogLevel, LogOutput};
use maat::util::format_duration;
use maat::{run_analysis, AnalyzeOptions, Maat};

/// Drive MSVC code analysis over a configured CMake build tree and collect
/// one SARIF log per compiled source file.
#[derive(Debug, Parser)]
#[command(name = "maat", version)]
struct Cli {
    /// Previously-configured CMake build directory
    #[arg(long)]
    build_dir: PathBuf,

    /// Directory where per-source SARIF logs are written
    #[arg(long)]
    results_dir: PathBuf,

    /// cmake executable used to regenerate the File API reply
    #[arg(long, default_value = "cmake")]
    cmake: PathBuf,

    /// Project root for resolving a relative ruleset path
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Ruleset file name or path; omit to enable all checks
    #[arg(long)]
    ruleset: Option<String>,

    /// Treat system includes as external and suppress their diagnostics
    #[arg(long)]
    ignore_system_headers: bool,

    /// Run vcvarsall.bat to pick up the toolchain's implicit INCLUDE/LIB
    #[arg(long)]
    load_implicit_compiler_env: bool,

    /// Skip targets whose source directory sits under this path (repeatable)
    #[arg(long = "ignore-target-path")]
    ignored_target_paths: Vec<PathBuf>,

    /// Extra include directory to force into external treatment (repeatable)
    #[arg(long = "ignore-include-path")]
    ignored_include_paths: Vec<PathBuf>,

    /// Extra raw analyzer arguments, tokenized like compile fragments
    #[arg(long, default_value = "")]
    additional_args: String,

    /// Delete stale .sarif files from the results directory first
    #[arg(long)]
    clean_results: bool,

    /// Log level: error, warn, info, debug, trace, fullverbose
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: pretty, json, compact, simple
    #[arg(long, default_value = "simple")]
    log_format: String,

    /// Also mirror logs (as json) into this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write a chrome trace of the run to this path
    #[arg(long)]
    profile: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = LogLevel::from_str(&cli.log_level)?;
    let log_config = LogConfig {
        level,
        format: LogFormat::from_str(&cli.log_format)?,
        output: match &cli.log_file {
            Some(path) => LogOutput::Both { path: path.clone() },
            None => LogOutput::Stdout,
        },
    };

    // The chrome-trace guard must outlive the run so the trace flushes on exit.
    let _profile_guard = match &cli.profile {
        Some(trace_path) => Some(init_logging_with_profile(&log_config, trace_path)?),
        None => {
            init_logging(&log_config)?;
            None
        }
    };

    let options = AnalyzeOptions {
        build_dir: cli.build_dir,
        results_dir: cli.results_dir,
        cmake_path: cli.cmake,
        project_dir: cli.project_dir,
        ruleset: cli.ruleset,
        ignore_system_headers: cli.ignore_system_headers,
        load_implicit_compiler_env: cli.load_implicit_compiler_env,
        ignored_target_paths: cli.ignored_target_paths,
        ignored_include_paths: cli
            .ignored_include_paths
            .into_iter()
            .map(|p| IncludePath::new(p, true))
            .collect(),
        additional_args: cli.additional_args,
        clean_results: cli.clean_results,
    };

    tracing::info!("Starting analysis of build tree {:?}", options.build_dir);
    let start = Instant::now();

    let maat = Maat::new(options, level.is_verbose_tools());
    let summary = run_analysis(&maat).context("Analysis run failed")?;

    for failure in &summary.failures {
        tracing::warn!("Analysis of {:?} failed: {}", failure.source, failure.message);
    }
    tracing::info!(
        "Analyzed {}/{} file(s) in {}",
        summary.succeeded,
        summary.attempted,
        format_duration(start.elapsed())
    );

    Ok(())
}
