//! Codemodel reply parsing.
//!
//! Flattens the configured build graph (targets, compile groups, per-source
//! compile fragments) into one normalized [`CompileCommand`] per compiled
//! source file, honoring ignored-target-path exclusions.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MaatError;
use crate::util::is_ancestor_of;
use crate::{anyhow_loc, function_name};

// ----------------------------------------------------------------------------
// Public Structs
// ----------------------------------------------------------------------------
/// An include directory plus whether the build marked it as a system include.
/// Identity is the path alone; the system flag only changes flag emission.
#[derive(Clone, Debug, Eq)]
pub struct IncludePath {
    pub path: PathBuf,
    pub is_system: bool,
}

impl PartialEq for IncludePath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl IncludePath {
    pub fn new(path: impl Into<PathBuf>, is_system: bool) -> Self {
        Self {
            path: path.into(),
            is_system,
        }
    }
}

/// One compiled source file with the compile options of its group. Never
/// mutated after extraction.
#[derive(Clone, Debug)]
pub struct CompileCommand {
    pub source: PathBuf,
    pub language: String,
    pub standard: Option<String>,
    pub raw_fragment: String,
    pub includes: Vec<IncludePath>,
    pub defines: Vec<String>,
}

// ----------------------------------------------------------------------------
// Reply document shapes
// ----------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
struct CodemodelReply {
    paths: CodemodelPaths,
    configurations: Vec<Configuration>,
}

#[derive(Debug, Deserialize)]
struct CodemodelPaths {
    source: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Configuration {
    #[serde(default)]
    directories: Vec<Directory>,
    #[serde(default)]
    targets: Vec<TargetRef>,
}

#[derive(Debug, Deserialize)]
struct Directory {
    source: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TargetRef {
    #[serde(rename = "directoryIndex")]
    directory_index: usize,
    #[serde(rename = "jsonFile")]
    json_file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TargetReply {
    name: Option<String>,
    #[serde(rename = "compileGroups", default)]
    compile_groups: Vec<CompileGroup>,
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct CompileGroup {
    language: String,
    #[serde(rename = "languageStandard")]
    language_standard: Option<LanguageStandard>,
    #[serde(rename = "compileCommandFragments", default)]
    compile_command_fragments: Vec<Fragment>,
    #[serde(default)]
    includes: Vec<IncludeEntry>,
    #[serde(default)]
    defines: Vec<DefineEntry>,
    #[serde(rename = "sourceIndexes", default)]
    source_indexes: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct LanguageStandard {
    standard: String,
}

#[derive(Debug, Deserialize)]
struct Fragment {
    fragment: String,
}

#[derive(Debug, Deserialize)]
struct IncludeEntry {
    path: PathBuf,
    #[serde(rename = "isSystem", default)]
    is_system: bool,
}

#[derive(Debug, Deserialize)]
struct DefineEntry {
    define: String,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    path: PathBuf,
}

// ----------------------------------------------------------------------------
// Public functions
// ----------------------------------------------------------------------------
/// Parses the codemodel reply and every retained target's detail file into a
/// flat list of compile commands.
pub fn extract_compile_commands(
    codemodel_path: &Path,
    ignored_target_paths: &[PathBuf],
) -> anyhow::Result<Vec<CompileCommand>> {
    let text = fs::read_to_string(codemodel_path)
        .map_err(|_| MaatError::MissingReply(codemodel_path.to_path_buf()))?;
    let codemodel: CodemodelReply = serde_json::from_str(&text)
        .map_err(|e| anyhow_loc!("Malformed codemodel reply [{:?}]: {}", codemodel_path, e))?;

    let reply_dir = codemodel_path
        .parent()
        .ok_or_else(|| anyhow_loc!("Codemodel reply [{:?}] has no parent directory", codemodel_path))?;

    let config = codemodel
        .configurations
        .first()
        .ok_or_else(|| anyhow_loc!("Codemodel reply [{:?}] has no configurations", codemodel_path))?;

    let source_root = &codemodel.paths.source;
    let mut commands: Vec<CompileCommand> = Default::default();

    for target_ref in &config.targets {
        let directory = config.directories.get(target_ref.directory_index).ok_or_else(|| {
            anyhow_loc!(
                "Target [{:?}] names directory index {} but the codemodel has {} directories",
                target_ref.json_file,
                target_ref.directory_index,
                config.directories.len()
            )
        })?;

        let target_source_dir = source_root.join(&directory.source);
        if let Some(ignored) =
            ignored_target_paths.iter().find(|p| is_ancestor_of(p, &target_source_dir))
        {
            tracing::debug!(
                "Skipping target [{:?}]: source dir {:?} is under ignored path {:?}",
                target_ref.json_file,
                target_source_dir,
                ignored
            );
            continue;
        }

        let target_path = reply_dir.join(&target_ref.json_file);
        commands.extend(extract_target_commands(&target_path, source_root)?);
    }

    Ok(commands)
}

// ----------------------------------------------------------------------------
// Private functions
// ----------------------------------------------------------------------------
fn extract_target_commands(target_path: &Path, source_root: &Path) -> anyhow::Result<Vec<CompileCommand>> {
    let text =
        fs::read_to_string(target_path).map_err(|_| MaatError::MissingReply(target_path.to_path_buf()))?;
    let target: TargetReply = serde_json::from_str(&text)
        .map_err(|e| anyhow_loc!("Malformed target reply [{:?}]: {}", target_path, e))?;

    let mut commands: Vec<CompileCommand> = Default::default();

    for group in &target.compile_groups {
        let raw_fragment: String = group
            .compile_command_fragments
            .iter()
            .map(|f| f.fragment.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let includes: Vec<IncludePath> =
            group.includes.iter().map(|inc| IncludePath::new(inc.path.clone(), inc.is_system)).collect();
        let defines: Vec<String> = group.defines.iter().map(|d| d.define.clone()).collect();

        for &source_index in &group.source_indexes {
            let source_entry = target.sources.get(source_index).ok_or_else(|| {
                anyhow_loc!(
                    "Target [{:?}] compile group names source index {} but the target has {} sources",
                    target.name,
                    source_index,
                    target.sources.len()
                )
            })?;

            commands.push(CompileCommand {
                source: source_root.join(&source_entry.path),
                language: group.language.clone(),
                standard: group.language_standard.as_ref().map(|s| s.standard.clone()),
                raw_fragment: raw_fragment.clone(),
                includes: includes.clone(),
                defines: defines.clone(),
            });
        }
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_target(dir: &Path, name: &str, sources: &[&str]) -> String {
        let filename = format!("target-{name}.json");
        let body = serde_json::json!({
            "name": name,
            "compileGroups": [{
                "language": "CXX",
                "languageStandard": { "standard": "17" },
                "compileCommandFragments": [
                    { "fragment": "/W4" },
                    { "fragment": "/EHsc" },
                ],
                "includes": [
                    { "path": "/repo/include" },
                    { "path": "/opt/sdk/include", "isSystem": true },
                ],
                "defines": [ { "define": "NDEBUG" } ],
                "sourceIndexes": (0..sources.len()).collect::<Vec<_>>(),
            }],
            "sources": sources.iter().map(|s| serde_json::json!({ "path": s })).collect::<Vec<_>>(),
        });
        fs::write(dir.join(&filename), serde_json::to_string(&body).unwrap()).unwrap();
        filename
    }

    fn write_codemodel(dir: &Path, directories: &[&str], targets: &[(usize, &str)]) -> PathBuf {
        let body = serde_json::json!({
            "paths": { "source": "/repo" },
            "configurations": [{
                "directories": directories.iter().map(|d| serde_json::json!({ "source": d })).collect::<Vec<_>>(),
                "targets": targets
                    .iter()
                    .map(|(idx, json_file)| serde_json::json!({ "directoryIndex": idx, "jsonFile": json_file }))
                    .collect::<Vec<_>>(),
            }],
        });
        let path = dir.join("codemodel-v2.json");
        fs::write(&path, serde_json::to_string(&body).unwrap()).unwrap();
        path
    }

    #[test]
    fn flattens_compile_groups_into_commands() {
        let dir = tempfile::tempdir().unwrap();
        let target = write_target(dir.path(), "app", &["src/main.cpp", "src/util.cpp"]);
        let codemodel = write_codemodel(dir.path(), &["."], &[(0, target.as_str())]);

        let commands = extract_compile_commands(&codemodel, &[]).unwrap();
        assert_eq!(commands.len(), 2);

        let cmd = &commands[0];
        assert_eq!(cmd.source, PathBuf::from("/repo/src/main.cpp"));
        assert_eq!(cmd.language, "CXX");
        assert_eq!(cmd.standard.as_deref(), Some("17"));
        assert_eq!(cmd.raw_fragment, "/W4 /EHsc");
        assert_eq!(cmd.defines, vec!["NDEBUG".to_owned()]);
        assert_eq!(cmd.includes.len(), 2);
        assert!(!cmd.includes[0].is_system);
        assert!(cmd.includes[1].is_system);
    }

    #[test]
    fn excludes_targets_under_ignored_paths_but_not_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let vendored = write_target(dir.path(), "vendored", &["third_party/lib/a.cpp"]);
        let sibling = write_target(dir.path(), "sibling", &["third_party_other/b.cpp"]);
        let codemodel = write_codemodel(
            dir.path(),
            &["third_party/lib", "third_party_other"],
            &[(0, vendored.as_str()), (1, sibling.as_str())],
        );

        let ignored = vec![PathBuf::from("/repo/third_party")];
        let commands = extract_compile_commands(&codemodel, &ignored).unwrap();

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].source, PathBuf::from("/repo/third_party_other/b.cpp"));
    }

    #[test]
    fn missing_codemodel_is_a_missing_reply() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_compile_commands(&dir.path().join("codemodel-v2.json"), &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaatError>(),
            Some(MaatError::MissingReply(_))
        ));
    }

    #[test]
    fn include_path_identity_ignores_system_flag() {
        let a = IncludePath::new("/sdk/include", true);
        let b = IncludePath::new("/sdk/include", false);
        assert_eq!(a, b);
    }
}
