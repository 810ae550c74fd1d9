//! Analyzer invocation assembly.
//!
//! Combines a compile command with its toolchain's memoized common arguments
//! and environment into one fully-specified, immutable unit of work. Flag
//! order is fixed: tokenized compile fragment, includes (toolchain-implicit,
//! per-command, user-ignored), defines, source, per-file SARIF log flag, then
//! the per-toolchain common argument suffix.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codemodel::CompileCommand;
use crate::options::AnalyzeOptions;
use crate::ruleset::ResolvedRuleset;
use crate::toolchain::ToolchainInfo;

pub const SARIF_EXTENSION: &str = "sarif";

// ----------------------------------------------------------------------------
// Public Structs
// ----------------------------------------------------------------------------
/// One fully-resolved analyzer invocation. The common argument suffix and the
/// environment are Arc-shared across every command of the same toolchain.
#[derive(Clone, Debug)]
pub struct AnalyzeCommand {
    pub source: PathBuf,
    pub compiler_path: PathBuf,
    pub sarif_log: PathBuf,
    /// Per-file arguments: fragment tokens, includes, defines, source, log flag.
    pub args: Vec<String>,
    /// Memoized per-toolchain suffix: analyze mode flags, plugin, ruleset,
    /// suppression flags, user extra args.
    pub common_args: Arc<Vec<String>>,
    pub env: Arc<IndexMap<String, String>>,
}

impl AnalyzeCommand {
    /// The complete argv, per-file arguments followed by the common suffix.
    pub fn argv(&self) -> Vec<String> {
        self.args.iter().chain(self.common_args.iter()).cloned().collect()
    }
}

// ----------------------------------------------------------------------------
// Public functions
// ----------------------------------------------------------------------------
/// Splits a raw compile fragment into discrete arguments. Double quotes group
/// tokens containing spaces and are stripped from the result.
pub fn tokenize_fragment(raw: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Default::default();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Builds the per-toolchain common argument suffix. Computed once per
/// compiler path and shared across all of its sources.
pub fn build_common_args(
    toolchain: &ToolchainInfo,
    options: &AnalyzeOptions,
    ruleset: Option<&ResolvedRuleset>,
) -> Vec<String> {
    let mut args: Vec<String> = Default::default();

    args.push("/analyze:only".to_owned());
    args.push("/analyze:quiet".to_owned());
    args.push("/analyze:log:format:sarif".to_owned());
    args.push("/analyze:plugin".to_owned());
    args.push(toolchain.layout.analyzer_plugin.to_string_lossy().into_owned());

    if let Some(ruleset) = ruleset {
        args.push("/analyze:ruleset".to_owned());
        args.push(ruleset.path.to_string_lossy().into_owned());
        if let Some(directory) = &ruleset.directory {
            args.push("/analyze:rulesetdirectory".to_owned());
            args.push(directory.to_string_lossy().into_owned());
        }
    }

    if options.ignore_system_headers {
        args.push("/external:W0".to_owned());
        args.push("/analyze:external-".to_owned());
    }

    args.extend(tokenize_fragment(&options.additional_args));

    args
}

/// Assembles one analyzer invocation for a compile command. `log_counter` is
/// a strictly increasing disambiguator so same-named sources from different
/// targets never share a SARIF log.
pub fn assemble_command(
    cmd: &CompileCommand,
    toolchain: &ToolchainInfo,
    options: &AnalyzeOptions,
    results_dir: &Path,
    log_counter: &mut u64,
    common_args: Arc<Vec<String>>,
    env: Arc<IndexMap<String, String>>,
) -> AnalyzeCommand {
    let mut args = tokenize_fragment(&cmd.raw_fragment);

    // Include order matters for resolution: toolchain-implicit first, then the
    // compile group's own, then user-ignored paths.
    let includes = toolchain
        .implicit_includes
        .iter()
        .chain(cmd.includes.iter())
        .chain(options.ignored_include_paths.iter());
    for include in includes {
        if include.is_system && options.ignore_system_headers {
            args.push("/external:I".to_owned());
        } else {
            args.push("/I".to_owned());
        }
        args.push(include.path.to_string_lossy().into_owned());
    }

    for define in &cmd.defines {
        args.push(format!("/D{}", define));
    }

    args.push(cmd.source.to_string_lossy().into_owned());

    let basename = cmd.source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let sarif_log = results_dir.join(format!("{}.{}.{}", basename, *log_counter, SARIF_EXTENSION));
    *log_counter += 1;

    args.push("/analyze:log".to_owned());
    args.push(sarif_log.to_string_lossy().into_owned());

    AnalyzeCommand {
        source: cmd.source.clone(),
        compiler_path: toolchain.compiler_path.clone(),
        sarif_log,
        args,
        common_args,
        env,
    }
}
