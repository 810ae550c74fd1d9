//! Pipeline orchestrator.
//!
//! Owns the per-toolchain memoized artifacts (common argument suffix, common
//! environment) and drives the full run: reply index, toolchains, compile
//! commands, plan assembly, execution.

use anyhow::anyhow;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::analyze::{self, AnalyzeCommand, SARIF_EXTENSION};
use crate::codemodel::{self, CompileCommand};
use crate::environment;
use crate::error::MaatError;
use crate::file_api;
use crate::options::AnalyzeOptions;
use crate::process::ensure_directory;
use crate::ruleset;
use crate::runner::{self, RunSummary};
use crate::toolchain::{self, Language, ToolchainInfo, VsToolsLayout};

// utility for an Arc<RwLock<HashMap<K,V>>>
pub type SharedHashMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

// ----------------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------------
#[derive(Debug, Default)]
pub struct Maat {
    pub options: AnalyzeOptions,
    pub verbose_tools: bool,

    // memoized per-toolchain artifacts, keyed by compiler path, written once per key
    common_args_cache: SharedHashMap<PathBuf, Arc<Vec<String>>>,
    common_env_cache: SharedHashMap<PathBuf, Arc<IndexMap<String, String>>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------
impl Maat {
    pub fn new(options: AnalyzeOptions, verbose_tools: bool) -> Maat {
        Maat {
            options,
            verbose_tools,
            ..Default::default()
        }
    }

    /// The common argument suffix for one toolchain, including ruleset
    /// resolution. Computed at most once per compiler path per run.
    pub fn common_args(&self, toolchain: &ToolchainInfo) -> anyhow::Result<Arc<Vec<String>>> {
        if let Some(args) = read_lock(&self.common_args_cache)?.get(&toolchain.compiler_path) {
            return Ok(args.clone());
        }

        let resolved = ruleset::resolve_ruleset(
            self.options.ruleset.as_deref(),
            &self.options.project_dir,
            &toolchain.layout.official_rulesets_dir,
        )?;
        let args = Arc::new(analyze::build_common_args(toolchain, &self.options, resolved.as_ref()));

        write_lock(&self.common_args_cache)?.insert(toolchain.compiler_path.clone(), args.clone());
        Ok(args)
    }

    /// The resolved environment for one toolchain. The environment-setup
    /// script runs at most once per compiler path per run, no matter how many
    /// sources the toolchain compiles.
    pub fn common_env(&self, toolchain: &ToolchainInfo) -> anyhow::Result<Arc<IndexMap<String, String>>> {
        if let Some(env) = read_lock(&self.common_env_cache)?.get(&toolchain.compiler_path) {
            return Ok(env.clone());
        }

        let env = Arc::new(environment::resolve_environment(
            toolchain,
            self.options.load_implicit_compiler_env,
            self.verbose_tools,
        )?);

        write_lock(&self.common_env_cache)?.insert(toolchain.compiler_path.clone(), env.clone());
        Ok(env)
    }

    /// Assembles the full invocation plan. Compile commands whose language has
    /// no resolved toolchain are skipped, not errors.
    pub fn assemble_plan(
        &self,
        commands: &[CompileCommand],
        toolchains: &HashMap<Language, ToolchainInfo>,
    ) -> anyhow::Result<Vec<AnalyzeCommand>> {
        let mut plan: Vec<AnalyzeCommand> = Default::default();
        let mut log_counter: u64 = 0;

        for cmd in commands {
            let toolchain = Language::from_reply(&cmd.language).and_then(|lang| toolchains.get(&lang));
            let Some(toolchain) = toolchain else {
                tracing::debug!(
                    "Skipping [{:?}]: no toolchain for language [{}]",
                    cmd.source,
                    cmd.language
                );
                continue;
            };

            let common_args = self.common_args(toolchain)?;
            let env = self.common_env(toolchain)?;
            plan.push(analyze::assemble_command(
                cmd,
                toolchain,
                &self.options,
                &self.options.results_dir,
                &mut log_counter,
                common_args,
                env,
            ));
        }

        Ok(plan)
    }
}

// ----------------------------------------------------------------------------
// Free functions
// ----------------------------------------------------------------------------
/// Runs the whole pipeline: reconfigure, parse replies, assemble, execute.
pub fn run_analysis(maat: &Maat) -> anyhow::Result<RunSummary> {
    maat.options.validate()?;
    prepare_results_dir(&maat.options)?;

    let index = file_api::load_reply_index(
        &maat.options.cmake_path,
        &maat.options.build_dir,
        maat.verbose_tools,
    )?;
    tracing::info!("CMake version {}", index.version);

    let reply_dir = maat.options.build_dir.join(".cmake/api/v1/reply");
    let toolchains_path = index
        .toolchains_response_file
        .ok_or_else(|| MaatError::MissingReply(reply_dir.join("toolchains-v1.json")))?;
    let codemodel_path = index
        .codemodel_response_file
        .ok_or_else(|| MaatError::MissingReply(reply_dir.join("codemodel-v2.json")))?;

    let toolchains = toolchain::resolve_toolchains(&toolchains_path, &VsToolsLayout)?;
    let commands = codemodel::extract_compile_commands(&codemodel_path, &maat.options.ignored_target_paths)?;
    tracing::info!(
        "Codemodel yielded {} compile command(s) across {} toolchain(s)",
        commands.len(),
        toolchains.len()
    );

    let plan = maat.assemble_plan(&commands, &toolchains)?;
    if plan.is_empty() {
        return Err(MaatError::NoAnalyzableSources.into());
    }

    runner::run_plan(plan, num_cpus::get_physical(), maat.verbose_tools)
}

fn prepare_results_dir(options: &AnalyzeOptions) -> anyhow::Result<()> {
    ensure_directory(&options.results_dir)?;

    if options.clean_results {
        for entry in std::fs::read_dir(&options.results_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == SARIF_EXTENSION).unwrap_or(false) {
                tracing::debug!("Removing stale result {:?}", path);
                std::fs::remove_file(&path)?;
            }
        }
    }

    Ok(())
}

fn read_lock<T>(lock: &Arc<RwLock<T>>) -> anyhow::Result<std::sync::RwLockReadGuard<'_, T>> {
    lock.read().map_err(|e| anyhow!("Lock poisoned: {}", e))
}

fn write_lock<T>(lock: &Arc<RwLock<T>>) -> anyhow::Result<std::sync::RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|e| anyhow!("Lock poisoned: {}", e))
}
