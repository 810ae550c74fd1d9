//! CMake File API client.
//!
//! Writes the query descriptor, drives a reconfigure so CMake regenerates its
//! reply documents, and locates the authoritative index reply.

use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MaatError;
use crate::process::{ensure_directory_for_file, run_command_verbose};
use crate::{anyhow_loc, function_name};

/// Client name under which maat's query/reply documents live.
pub const CLIENT_NAME: &str = "client-maat";

/// Oldest CMake release whose File API replies carry everything we need
/// (toolchains v1 appeared in 3.20, implicit include info stabilized in 3.20.5).
pub const MIN_CMAKE_VERSION: &str = "3.20.5";

// ----------------------------------------------------------------------------
// Public Structs
// ----------------------------------------------------------------------------
/// Resolved locations of the reply documents this run asked for. Produced once
/// per build root; either response file may be absent from the reply.
#[derive(Debug, Clone)]
pub struct ReplyIndexInfo {
    pub codemodel_response_file: Option<PathBuf>,
    pub toolchains_response_file: Option<PathBuf>,
    pub version: String,
}

// ----------------------------------------------------------------------------
// Reply document shapes
// ----------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
struct IndexReply {
    cmake: CmakeDesc,
    reply: HashMap<String, ClientReply>,
}

#[derive(Debug, Deserialize)]
struct CmakeDesc {
    version: CmakeVersion,
}

#[derive(Debug, Deserialize)]
struct CmakeVersion {
    string: String,
}

#[derive(Debug, Deserialize)]
struct ClientReply {
    #[serde(rename = "query.json")]
    query_json: QueryReply,
}

#[derive(Debug, Default, Deserialize)]
struct QueryReply {
    #[serde(default)]
    responses: Vec<ResponseRef>,
}

#[derive(Debug, Deserialize)]
struct ResponseRef {
    kind: String,
    #[serde(rename = "jsonFile")]
    json_file: PathBuf,
}

// ----------------------------------------------------------------------------
// Public functions
// ----------------------------------------------------------------------------
/// Regenerates the File API reply for `build_root` and parses the index.
///
/// The build root must be a previously-configured, non-empty directory; this
/// never configures a project from scratch.
pub fn load_reply_index(
    cmake_exe: &Path,
    build_root: &Path,
    verbose_tools: bool,
) -> anyhow::Result<ReplyIndexInfo> {
    ensure_configured_build_root(build_root)?;
    write_query_descriptor(build_root)?;
    reconfigure(cmake_exe, build_root, verbose_tools)?;

    let reply_dir = api_dir(build_root).join("reply");
    let index_path = select_index_reply(&reply_dir)?;
    tracing::debug!("Using File API index reply: {:?}", index_path);

    let info = parse_index_reply(&index_path, &reply_dir)?;
    ensure_supported_version(&info.version)?;
    Ok(info)
}

/// Dotted-version comparison: each `.`-separated segment compares numerically,
/// missing segments count as zero. "3.9.0" < "3.10.0" even though it is
/// lexicographically greater.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let segments = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|seg| seg.chars().take_while(|c| c.is_ascii_digit()).collect::<String>())
            .map(|digits| digits.parse::<u64>().unwrap_or(0))
            .collect()
    };

    let a = segments(a);
    let b = segments(b);
    let len = a.len().max(b.len());
    for i in 0..len {
        let lhs = a.get(i).copied().unwrap_or(0);
        let rhs = b.get(i).copied().unwrap_or(0);
        match lhs.cmp(&rhs) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

// ----------------------------------------------------------------------------
// Private functions
// ----------------------------------------------------------------------------
fn api_dir(build_root: &Path) -> PathBuf {
    build_root.join(".cmake").join("api").join("v1")
}

fn ensure_configured_build_root(build_root: &Path) -> anyhow::Result<()> {
    if !build_root.is_dir() {
        return Err(MaatError::Configuration(format!(
            "build directory [{:?}] does not exist; configure the project first",
            build_root
        ))
        .into());
    }

    let empty = fs::read_dir(build_root)?.next().is_none();
    if empty {
        return Err(MaatError::Configuration(format!(
            "build directory [{:?}] is empty; configure the project first",
            build_root
        ))
        .into());
    }

    Ok(())
}

fn write_query_descriptor(build_root: &Path) -> anyhow::Result<()> {
    let query_file = api_dir(build_root).join("query").join(CLIENT_NAME).join("query.json");
    ensure_directory_for_file(&query_file)?;

    let query = serde_json::json!({
        "requests": [
            { "kind": "codemodel", "version": 2 },
            { "kind": "toolchains", "version": 1 },
        ]
    });
    fs::write(&query_file, serde_json::to_string_pretty(&query)?)?;
    tracing::debug!("Wrote File API query: {:?}", query_file);
    Ok(())
}

fn reconfigure(cmake_exe: &Path, build_root: &Path, verbose_tools: bool) -> anyhow::Result<()> {
    tracing::info!("Regenerating CMake File API reply for {:?}", build_root);

    let args = vec![build_root.to_string_lossy().into_owned()];
    let output = run_command_verbose(cmake_exe, &args, verbose_tools)?;
    if !output.status.success() {
        return Err(MaatError::ToolInvocation {
            tool: cmake_exe.to_string_lossy().into_owned(),
            message: format!(
                "exit status [{}]\n  stdout: {}\n  stderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
        }
        .into());
    }
    Ok(())
}

/// Picks the lexicographically greatest `index-*.json` filename. Index names
/// embed a sortable timestamp token, so the greatest name is the newest reply.
fn select_index_reply(reply_dir: &Path) -> anyhow::Result<PathBuf> {
    if !reply_dir.is_dir() {
        return Err(MaatError::MissingReply(reply_dir.to_path_buf()).into());
    }

    let mut best: Option<String> = None;
    for entry in fs::read_dir(reply_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("index-") || !name.ends_with(".json") {
            continue;
        }
        if best.as_deref().map(|b| name.as_str() > b).unwrap_or(true) {
            best = Some(name);
        }
    }

    match best {
        Some(name) => Ok(reply_dir.join(name)),
        None => Err(MaatError::MissingReply(reply_dir.join("index-*.json")).into()),
    }
}

fn parse_index_reply(index_path: &Path, reply_dir: &Path) -> anyhow::Result<ReplyIndexInfo> {
    let text = fs::read_to_string(index_path)
        .map_err(|_| MaatError::MissingReply(index_path.to_path_buf()))?;
    let index: IndexReply = serde_json::from_str(&text)
        .map_err(|e| anyhow_loc!("Malformed index reply [{:?}]: {}", index_path, e))?;

    let client = index
        .reply
        .get(CLIENT_NAME)
        .ok_or_else(|| anyhow_loc!("Index reply has no entry for client [{}]", CLIENT_NAME))?;

    let mut info = ReplyIndexInfo {
        codemodel_response_file: None,
        toolchains_response_file: None,
        version: index.cmake.version.string.clone(),
    };

    // Response file paths are relative to the reply directory.
    for response in &client.query_json.responses {
        match response.kind.as_str() {
            "codemodel" => info.codemodel_response_file = Some(reply_dir.join(&response.json_file)),
            "toolchains" => info.toolchains_response_file = Some(reply_dir.join(&response.json_file)),
            other => tracing::debug!("Ignoring unrequested reply kind [{}]", other),
        }
    }

    Ok(info)
}

fn ensure_supported_version(version: &str) -> anyhow::Result<()> {
    if compare_versions(version, MIN_CMAKE_VERSION) == Ordering::Less {
        return Err(MaatError::UnsupportedVersion {
            required: MIN_CMAKE_VERSION.to_owned(),
            found: version.to_owned(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_err, assert_ok};

    fn write_index(dir: &Path, name: &str, version: &str) {
        let body = serde_json::json!({
            "cmake": { "version": { "string": version } },
            "reply": {
                CLIENT_NAME: {
                    "query.json": {
                        "responses": [
                            { "kind": "codemodel", "jsonFile": format!("codemodel-{name}") },
                            { "kind": "toolchains", "jsonFile": format!("toolchains-{name}") },
                        ]
                    }
                }
            }
        });
        fs::write(dir.join(name), serde_json::to_string(&body).unwrap()).unwrap();
    }

    #[test]
    fn index_selection_prefers_greatest_name() {
        let dir = tempfile::tempdir().unwrap();
        write_index(dir.path(), "index-2023-01-01T00-00-00-0000.json", "3.21.0");
        write_index(dir.path(), "index-2023-01-02T00-00-00-0000.json", "3.21.0");

        let chosen = select_index_reply(dir.path()).unwrap();
        assert_eq!(
            chosen.file_name().unwrap().to_string_lossy(),
            "index-2023-01-02T00-00-00-0000.json"
        );
    }

    #[test]
    fn index_selection_fails_without_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("codemodel-v2.json"), "{}").unwrap();

        let err = select_index_reply(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaatError>(),
            Some(MaatError::MissingReply(_))
        ));
    }

    #[test]
    fn index_parse_resolves_response_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_index(dir.path(), "index-a.json", "3.22.1");

        let info = parse_index_reply(&dir.path().join("index-a.json"), dir.path()).unwrap();
        assert_eq!(info.version, "3.22.1");
        assert_eq!(
            info.codemodel_response_file,
            Some(dir.path().join("codemodel-index-a.json"))
        );
        assert_eq!(
            info.toolchains_response_file,
            Some(dir.path().join("toolchains-index-a.json"))
        );
    }

    #[test]
    fn version_compare_is_numeric_per_segment() {
        assert_eq!(compare_versions("3.9.0", "3.10.0"), Ordering::Less);
        assert_eq!(compare_versions("3.10.0", "3.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("3.20", "3.20.0"), Ordering::Equal);
        assert_eq!(compare_versions("3.20.5-rc1", "3.20.5"), Ordering::Equal);
    }

    #[test]
    fn version_gate() {
        assert_err!(ensure_supported_version("3.20.4"));
        assert_ok!(ensure_supported_version("3.20.5"));
        assert_ok!(ensure_supported_version("3.21.0"));

        let err = ensure_supported_version("3.20.4").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaatError>(),
            Some(MaatError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn empty_build_root_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_configured_build_root(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaatError>(),
            Some(MaatError::Configuration(_))
        ));

        fs::write(dir.path().join("CMakeCache.txt"), "").unwrap();
        assert_ok!(ensure_configured_build_root(dir.path()));
    }

    #[test]
    fn query_descriptor_lands_in_client_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_query_descriptor(dir.path()).unwrap();

        let query = dir
            .path()
            .join(".cmake")
            .join("api")
            .join("v1")
            .join("query")
            .join(CLIENT_NAME)
            .join("query.json");
        let text = fs::read_to_string(query).unwrap();
        assert!(text.contains("codemodel"));
        assert!(text.contains("toolchains"));
    }
}
