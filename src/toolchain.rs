//! Toolchains reply parsing and MSVC installation-layout inference.
//!
//! The toolchains reply names the compiler and its implicit includes, but not
//! the toolset version or host/target architecture. Those are recovered from
//! the compiler's own filesystem path, which follows a fixed vendor layout:
//!
//!   <VS>/VC/Tools/MSVC/<toolset>/bin/Host{x64|x86}/{x64|x86}/cl.exe
//!
//! The climb is inherently fragile to vendor layout changes, so an
//! unrecognized folder token is a typed hard failure, never a silent guess.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codemodel::IncludePath;
use crate::error::MaatError;
use crate::{anyhow_loc, function_name};

/// Compiler identity the resolver accepts.
const MSVC_COMPILER_ID: &str = "MSVC";

// ----------------------------------------------------------------------------
// Public Enums
// ----------------------------------------------------------------------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    pub fn from_reply(s: &str) -> Option<Language> {
        match s {
            "C" => Some(Language::C),
            "CXX" => Some(Language::Cxx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cxx => "CXX",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    X86,
    X64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
        }
    }
}

// ----------------------------------------------------------------------------
// Public Structs
// ----------------------------------------------------------------------------
/// Everything the layout climb recovers from the compiler path.
#[derive(Clone, Debug)]
pub struct LayoutInfo {
    pub toolset_version: String,
    pub host_arch: Arch,
    pub target_arch: Arch,
    /// EspXEngine.dll, which ships beside cl.exe.
    pub analyzer_plugin: PathBuf,
    /// VC/Auxiliary/Build/vcvarsall.bat.
    pub env_script: PathBuf,
    /// Candidate official rulesets directory; not checked for existence here.
    pub official_rulesets_dir: PathBuf,
}

/// One resolved compiler per supported language. Derived once, then read-only;
/// keys the memoized per-toolchain artifacts by `compiler_path`.
#[derive(Clone, Debug)]
pub struct ToolchainInfo {
    pub language: Language,
    pub compiler_path: PathBuf,
    pub version: String,
    pub implicit_includes: Vec<IncludePath>,
    pub layout: LayoutInfo,
}

// ----------------------------------------------------------------------------
// Layout strategies
// ----------------------------------------------------------------------------
/// Maps a compiler binary path to toolset/architecture facts. One
/// implementation per known vendor installation layout; future layout changes
/// are additive rather than invasive.
pub trait ToolchainLayout {
    fn name(&self) -> &'static str;
    fn resolve(&self, compiler: &Path) -> anyhow::Result<LayoutInfo>;
}

/// The Visual Studio `VC/Tools/MSVC` layout used by VS 2017 and later.
pub struct VsToolsLayout;

impl ToolchainLayout for VsToolsLayout {
    fn name(&self) -> &'static str {
        "vs-tools"
    }

    fn resolve(&self, compiler: &Path) -> anyhow::Result<LayoutInfo> {
        let layout_err = |message: String| MaatError::UnknownToolchainLayout {
            compiler: compiler.to_path_buf(),
            message,
        };

        // <toolset>/bin/<host>/<target>/cl.exe
        let target_dir = compiler
            .parent()
            .ok_or_else(|| layout_err("compiler path has no parent directory".into()))?;
        let host_dir = target_dir
            .parent()
            .ok_or_else(|| layout_err("compiler path is too shallow for the VC tools layout".into()))?;
        let bin_dir = host_dir
            .parent()
            .ok_or_else(|| layout_err("compiler path is too shallow for the VC tools layout".into()))?;
        let toolset_dir = bin_dir
            .parent()
            .ok_or_else(|| layout_err("compiler path is too shallow for the VC tools layout".into()))?;

        let host_arch = match dir_name(host_dir) {
            Some("Hostx64") => Arch::X64,
            Some("Hostx86") => Arch::X86,
            other => {
                return Err(layout_err(format!(
                    "unrecognized host architecture folder [{:?}], expected Hostx64 or Hostx86",
                    other
                ))
                .into())
            }
        };

        let target_arch = match dir_name(target_dir) {
            Some("x64") => Arch::X64,
            Some("x86") => Arch::X86,
            other => {
                return Err(layout_err(format!(
                    "unrecognized target architecture folder [{:?}], expected x64 or x86",
                    other
                ))
                .into())
            }
        };

        let toolset_version = dir_name(toolset_dir)
            .ok_or_else(|| layout_err("could not read toolset version folder name".into()))?
            .to_owned();

        // <toolset> lives at VC/Tools/MSVC/<toolset>; climb to VC and the VS root.
        let vc_dir = toolset_dir
            .ancestors()
            .nth(3)
            .ok_or_else(|| layout_err("compiler path is too shallow to locate the VC directory".into()))?;
        let vs_root = vc_dir
            .parent()
            .ok_or_else(|| layout_err("VC directory has no parent installation root".into()))?;

        Ok(LayoutInfo {
            toolset_version,
            host_arch,
            target_arch,
            analyzer_plugin: target_dir.join("EspXEngine.dll"),
            env_script: vc_dir.join("Auxiliary").join("Build").join("vcvarsall.bat"),
            official_rulesets_dir: vs_root
                .join("Team Tools")
                .join("Static Analysis Tools")
                .join("Rule Sets"),
        })
    }
}

// ----------------------------------------------------------------------------
// Reply document shapes
// ----------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
struct ToolchainsReply {
    #[serde(default)]
    toolchains: Vec<ToolchainEntry>,
}

#[derive(Debug, Deserialize)]
struct ToolchainEntry {
    language: String,
    compiler: CompilerEntry,
}

#[derive(Debug, Deserialize)]
struct CompilerEntry {
    id: Option<String>,
    path: Option<PathBuf>,
    version: Option<String>,
    implicit: Option<ImplicitEntry>,
}

#[derive(Debug, Deserialize)]
struct ImplicitEntry {
    #[serde(rename = "includeDirectories", default)]
    include_directories: Vec<PathBuf>,
}

// ----------------------------------------------------------------------------
// Public functions
// ----------------------------------------------------------------------------
/// Parses the toolchains reply and selects at most one MSVC toolchain per
/// supported language. Fails when no supported toolchain exists at all.
pub fn resolve_toolchains(
    toolchains_path: &Path,
    layout: &dyn ToolchainLayout,
) -> anyhow::Result<HashMap<Language, ToolchainInfo>> {
    let text = fs::read_to_string(toolchains_path)
        .map_err(|_| MaatError::MissingReply(toolchains_path.to_path_buf()))?;
    let reply: ToolchainsReply = serde_json::from_str(&text)
        .map_err(|e| anyhow_loc!("Malformed toolchains reply [{:?}]: {}", toolchains_path, e))?;

    let mut toolchains: HashMap<Language, ToolchainInfo> = Default::default();

    for entry in &reply.toolchains {
        let Some(language) = Language::from_reply(&entry.language) else {
            continue;
        };
        if toolchains.contains_key(&language) {
            continue;
        }
        if entry.compiler.id.as_deref() != Some(MSVC_COMPILER_ID) {
            tracing::debug!(
                "Skipping {} toolchain with compiler id {:?}",
                entry.language,
                entry.compiler.id
            );
            continue;
        }
        let Some(compiler_path) = &entry.compiler.path else {
            continue;
        };

        let implicit_includes: Vec<IncludePath> = entry
            .compiler
            .implicit
            .as_ref()
            .map(|imp| {
                imp.include_directories.iter().map(|p| IncludePath::new(p.clone(), true)).collect()
            })
            .unwrap_or_default();

        let layout_info = layout.resolve(compiler_path)?;
        tracing::debug!(
            language = language.as_str(),
            compiler = %compiler_path.display(),
            toolset = %layout_info.toolset_version,
            host = layout_info.host_arch.as_str(),
            target = layout_info.target_arch.as_str(),
            "Resolved toolchain via [{}] layout",
            layout.name()
        );

        toolchains.insert(
            language,
            ToolchainInfo {
                language,
                compiler_path: compiler_path.clone(),
                version: entry.compiler.version.clone().unwrap_or_default(),
                implicit_includes,
                layout: layout_info,
            },
        );
    }

    if toolchains.is_empty() {
        return Err(MaatError::NoSupportedToolchain.into());
    }

    Ok(toolchains)
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
