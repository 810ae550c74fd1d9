//! User-configured analysis policy, already resolved by the CLI layer.

use std::path::PathBuf;

use crate::codemodel::IncludePath;
use crate::error::MaatError;

#[derive(Clone, Debug)]
pub struct AnalyzeOptions {
    /// Previously-configured CMake build tree.
    pub build_dir: PathBuf,
    /// Where per-source SARIF logs are written.
    pub results_dir: PathBuf,
    /// cmake executable used for the reconfigure step.
    pub cmake_path: PathBuf,
    /// Project root against which a user ruleset path is first resolved.
    pub project_dir: PathBuf,
    /// Ruleset name or path; None means all checks enabled.
    pub ruleset: Option<String>,
    pub ignore_system_headers: bool,
    pub load_implicit_compiler_env: bool,
    /// Targets whose source dir sits under any of these paths are skipped.
    pub ignored_target_paths: Vec<PathBuf>,
    /// Extra include dirs to force into the external/system treatment.
    pub ignored_include_paths: Vec<IncludePath>,
    /// Raw extra analyzer arguments, tokenized like compile fragments.
    pub additional_args: String,
    /// Delete stale .sarif files from the results dir before running.
    pub clean_results: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::new(),
            results_dir: PathBuf::new(),
            cmake_path: PathBuf::from("cmake"),
            project_dir: PathBuf::from("."),
            ruleset: None,
            ignore_system_headers: false,
            load_implicit_compiler_env: false,
            ignored_target_paths: Default::default(),
            ignored_include_paths: Default::default(),
            additional_args: Default::default(),
            clean_results: false,
        }
    }
}

impl AnalyzeOptions {
    /// Checks option invariants before any work starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.ignored_include_paths.is_empty() && !self.ignore_system_headers {
            return Err(MaatError::Configuration(
                "ignored include paths require ignore-system-headers to be enabled".to_owned(),
            )
            .into());
        }
        Ok(())
    }
}
