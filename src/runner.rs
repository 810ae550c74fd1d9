//! Plan execution.
//!
//! Every AnalyzeCommand is fully resolved and immutable by assembly time, so
//! execution is a bounded worker pool with no shared mutable state beyond the
//! result map. A failing file is logged and counted; it never aborts the
//! remaining files.

use dashmap::DashMap;
use itertools::Itertools;
use std::path::PathBuf;

use crate::analyze::AnalyzeCommand;
use crate::process::run_command_with_env;

// ----------------------------------------------------------------------------
// Public Structs
// ----------------------------------------------------------------------------
#[derive(Debug)]
pub struct AnalysisFailure {
    pub source: PathBuf,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<AnalysisFailure>,
}

// ----------------------------------------------------------------------------
// Public functions
// ----------------------------------------------------------------------------
/// Runs every command in the plan on a pool of `num_workers` threads and
/// aggregates per-file outcomes into a summary.
pub fn run_plan(
    plan: Vec<AnalyzeCommand>,
    num_workers: usize,
    verbose_tools: bool,
) -> anyhow::Result<RunSummary> {
    let attempted = plan.len();
    let num_workers = num_workers.max(1).min(attempted.max(1));
    tracing::info!("Analyzing {} file(s) on {} worker(s)", attempted, num_workers);

    let sources: Vec<PathBuf> = plan.iter().map(|c| c.source.clone()).collect();
    let results: DashMap<usize, Result<(), String>> = Default::default();
    let (tx, rx) = crossbeam::channel::unbounded::<(usize, AnalyzeCommand)>();
    for item in plan.into_iter().enumerate() {
        tx.send(item)?;
    }
    drop(tx);

    std::thread::scope(|scope| {
        for _ in 0..num_workers {
            let rx = rx.clone();
            let results = &results;
            scope.spawn(move || {
                for (index, command) in rx.iter() {
                    results.insert(index, execute_command(&command, verbose_tools));
                }
            });
        }
    });

    let mut summary = RunSummary {
        attempted,
        ..Default::default()
    };
    for entry in results.iter().sorted_by_key(|e| *e.key()) {
        match entry.value() {
            Ok(()) => summary.succeeded += 1,
            Err(message) => summary.failures.push(AnalysisFailure {
                source: sources[*entry.key()].clone(),
                message: message.clone(),
            }),
        }
    }

    Ok(summary)
}

// ----------------------------------------------------------------------------
// Private functions
// ----------------------------------------------------------------------------
fn execute_command(command: &AnalyzeCommand, verbose_tools: bool) -> Result<(), String> {
    tracing::info!("Analyzing {:?}", command.source);

    let argv = command.argv();
    let result = run_command_with_env(&command.compiler_path, &argv, &command.env, verbose_tools);

    let outcome = match result {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(format!(
            "analyzer exited with [{}]\n  stdout: {}\n  stderr: {}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )),
        Err(e) => Err(format!("{:#}", e)),
    };

    if let Err(message) = &outcome {
        tracing::warn!(
            source = %command.source.display(),
            args = %argv.iter().join(" "),
            env = %command.env.iter().map(|(k, v)| format!("{k}={v}")).join("\n"),
            "Analysis failed: {}",
            message
        );
    } else {
        tracing::debug!("Wrote {:?}", command.sarif_log);
    }

    outcome
}
