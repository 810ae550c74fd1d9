//! Analyzer environment resolution.
//!
//! The analyzer sees a fully-resolved environment: the SARIF compatibility
//! toggle, passthrough of ambient INCLUDE/LIB/CAExcludePath, and, when
//! requested, the toolchain-implicit INCLUDE/LIB extracted by running
//! vcvarsall.bat and capturing its `set` output. Extracted INCLUDE is also
//! appended to CAExcludePath so implicit system headers stay out of the
//! analysis scope.

use indexmap::IndexMap;
use std::path::Path;

use crate::error::MaatError;
use crate::process::run_command_verbose;
use crate::toolchain::ToolchainInfo;

const EMIT_SARIF_VAR: &str = "CAEmitSarifLog";
const EXCLUDE_PATH_VAR: &str = "CAExcludePath";
const INCLUDE_VAR: &str = "INCLUDE";
const LIB_VAR: &str = "LIB";

/// Builds the outgoing environment map for one toolchain. Memoization by
/// compiler path is the orchestrator's job; this function always does the
/// full (possibly script-invoking) resolution.
pub fn resolve_environment(
    toolchain: &ToolchainInfo,
    load_implicit_compiler_env: bool,
    verbose_tools: bool,
) -> anyhow::Result<IndexMap<String, String>> {
    let ambient: IndexMap<String, String> = std::env::vars().collect();
    let mut env = base_environment(&ambient);

    if load_implicit_compiler_env {
        let (include, lib) = extract_implicit_env(toolchain, verbose_tools)?;
        merge_extracted(&mut env, include, lib);
    }

    Ok(env)
}

/// The environment every analyzer invocation gets, independent of the
/// implicit-compiler-env option.
pub fn base_environment(ambient: &IndexMap<String, String>) -> IndexMap<String, String> {
    let mut env: IndexMap<String, String> = Default::default();
    env.insert(EMIT_SARIF_VAR.to_owned(), "1".to_owned());

    for var in [EXCLUDE_PATH_VAR, INCLUDE_VAR, LIB_VAR] {
        if let Some(value) = ambient.get(var) {
            env.insert(var.to_owned(), value.clone());
        }
    }

    env
}

/// Appends the extracted INCLUDE to both the exclude-path list and the
/// outgoing INCLUDE, and the extracted LIB to the outgoing LIB.
pub fn merge_extracted(
    env: &mut IndexMap<String, String>,
    include: Option<String>,
    lib: Option<String>,
) {
    if let Some(include) = include {
        append_path_list(env, EXCLUDE_PATH_VAR, &include);
        append_path_list(env, INCLUDE_VAR, &include);
    }
    if let Some(lib) = lib {
        append_path_list(env, LIB_VAR, &lib);
    }
}

/// Parses `NAME=value` lines from the environment script's stdout, extracting
/// only INCLUDE and LIB.
pub fn parse_env_script_output(stdout: &str) -> (Option<String>, Option<String>) {
    let mut include = None;
    let mut lib = None;

    for line in stdout.lines() {
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case(INCLUDE_VAR) {
            include = Some(value.trim_end_matches(['\r', '\n']).to_owned());
        } else if name.eq_ignore_ascii_case(LIB_VAR) {
            lib = Some(value.trim_end_matches(['\r', '\n']).to_owned());
        }
    }

    (include, lib)
}

/// The architecture argument vcvarsall expects: the host arch alone when host
/// and target agree, else `host_target` (e.g. `x64_x86`).
pub fn vcvars_arch_argument(toolchain: &ToolchainInfo) -> String {
    let host = toolchain.layout.host_arch;
    let target = toolchain.layout.target_arch;
    if host == target {
        host.as_str().to_owned()
    } else {
        format!("{}_{}", host.as_str(), target.as_str())
    }
}

// ----------------------------------------------------------------------------
// Private functions
// ----------------------------------------------------------------------------
fn extract_implicit_env(
    toolchain: &ToolchainInfo,
    verbose_tools: bool,
) -> anyhow::Result<(Option<String>, Option<String>)> {
    let script = &toolchain.layout.env_script;
    let args = vec![
        "/c".to_owned(),
        "call".to_owned(),
        script.to_string_lossy().into_owned(),
        vcvars_arch_argument(toolchain),
        format!("-vcvars_ver={}", toolchain.layout.toolset_version),
        "&&".to_owned(),
        "set".to_owned(),
    ];

    tracing::debug!(
        "Extracting implicit compiler environment via {:?} for {:?}",
        script,
        toolchain.compiler_path
    );

    let output = run_command_verbose(Path::new("cmd.exe"), &args, verbose_tools)?;
    if !output.status.success() {
        return Err(MaatError::EnvironmentExtraction(format!(
            "{:?} exited with [{}]\n  stdout: {}\n  stderr: {}",
            script,
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ))
        .into());
    }

    Ok(parse_env_script_output(&String::from_utf8_lossy(&output.stdout)))
}

fn append_path_list(env: &mut IndexMap<String, String>, key: &str, value: &str) {
    match env.get_mut(key) {
        Some(existing) if !existing.is_empty() => {
            if !existing.ends_with(';') {
                existing.push(';');
            }
            existing.push_str(value);
        }
        _ => {
            env.insert(key.to_owned(), value.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::{ToolchainLayout, VsToolsLayout};

    fn toolchain(compiler: &str) -> ToolchainInfo {
        let path = std::path::PathBuf::from(compiler);
        ToolchainInfo {
            language: crate::toolchain::Language::Cxx,
            layout: VsToolsLayout.resolve(&path).unwrap(),
            compiler_path: path,
            version: "19.29.30133".to_owned(),
            implicit_includes: Default::default(),
        }
    }

    #[test]
    fn base_env_carries_sarif_toggle_and_passthrough() {
        let mut ambient: IndexMap<String, String> = Default::default();
        ambient.insert("INCLUDE".to_owned(), "C:/sdk/include".to_owned());
        ambient.insert("PATH".to_owned(), "C:/windows".to_owned());

        let env = base_environment(&ambient);
        assert_eq!(env.get("CAEmitSarifLog").map(String::as_str), Some("1"));
        assert_eq!(env.get("INCLUDE").map(String::as_str), Some("C:/sdk/include"));
        assert_eq!(env.get("PATH"), None);
        assert_eq!(env.get("LIB"), None);
    }

    #[test]
    fn merge_appends_include_to_exclude_path_and_include() {
        let mut env: IndexMap<String, String> = Default::default();
        env.insert("INCLUDE".to_owned(), "C:/proj/include".to_owned());

        merge_extracted(
            &mut env,
            Some("C:/vs/include".to_owned()),
            Some("C:/vs/lib".to_owned()),
        );

        assert_eq!(
            env.get("INCLUDE").map(String::as_str),
            Some("C:/proj/include;C:/vs/include")
        );
        assert_eq!(env.get("CAExcludePath").map(String::as_str), Some("C:/vs/include"));
        assert_eq!(env.get("LIB").map(String::as_str), Some("C:/vs/lib"));
    }

    #[test]
    fn parses_only_include_and_lib() {
        let stdout = "PATH=C:\\windows\r\nINCLUDE=C:\\vs\\include;C:\\sdk\\include\r\nLIB=C:\\vs\\lib\r\nPROMPT=$P$G\r\n";
        let (include, lib) = parse_env_script_output(stdout);
        assert_eq!(include.as_deref(), Some("C:\\vs\\include;C:\\sdk\\include"));
        assert_eq!(lib.as_deref(), Some("C:\\vs\\lib"));
    }

    #[test]
    fn arch_argument_formats() {
        let same = toolchain("/vs/VC/Tools/MSVC/14.29.30133/bin/Hostx64/x64/cl.exe");
        assert_eq!(vcvars_arch_argument(&same), "x64");

        let cross = toolchain("/vs/VC/Tools/MSVC/14.29.30133/bin/Hostx64/x86/cl.exe");
        assert_eq!(vcvars_arch_argument(&cross), "x64_x86");
    }
}
