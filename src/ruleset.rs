//! Analysis ruleset resolution.
//!
//! Search order: a path relative to the project root wins over the official
//! rulesets directory shipped with the toolchain. No requested ruleset at all
//! means every check runs, which is a legitimate terminal state.

use std::path::{Path, PathBuf};

use crate::error::MaatError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRuleset {
    /// The ruleset file passed to the analyzer.
    pub path: PathBuf,
    /// Directory the analyzer searches for rulesets referenced by include,
    /// present only when the official directory exists on disk.
    pub directory: Option<PathBuf>,
}

/// Resolves a user-requested ruleset against the project root and the
/// toolchain's official rulesets directory (a candidate path; it only
/// participates when it actually exists).
pub fn resolve_ruleset(
    ruleset: Option<&str>,
    project_dir: &Path,
    official_dir: &Path,
) -> anyhow::Result<Option<ResolvedRuleset>> {
    let Some(ruleset) = ruleset else {
        tracing::debug!("No ruleset requested; all analysis checks enabled");
        return Ok(None);
    };

    let official_dir = if official_dir.is_dir() {
        Some(official_dir)
    } else {
        tracing::warn!(
            "Official rulesets directory {:?} not found; searching only relative to {:?}",
            official_dir,
            project_dir
        );
        None
    };
    let directory = official_dir.map(Path::to_path_buf);

    let local = project_dir.join(ruleset);
    if local.is_file() {
        tracing::debug!("Using project-local ruleset {:?}", local);
        return Ok(Some(ResolvedRuleset {
            path: local,
            directory,
        }));
    }

    if let Some(official_dir) = official_dir {
        let official = official_dir.join(ruleset);
        if official.is_file() {
            tracing::debug!("Using official ruleset {:?}", official);
            return Ok(Some(ResolvedRuleset {
                path: official,
                directory,
            }));
        }
    }

    Err(MaatError::RulesetNotFound(ruleset.to_owned()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn no_request_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_ruleset(None, dir.path(), &dir.path().join("absent")).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn local_file_wins_over_official() {
        let project = tempfile::tempdir().unwrap();
        let official = tempfile::tempdir().unwrap();
        fs::write(project.path().join("NativeRecommendedRules.ruleset"), "").unwrap();
        fs::write(official.path().join("NativeRecommendedRules.ruleset"), "").unwrap();

        let resolved =
            resolve_ruleset(Some("NativeRecommendedRules.ruleset"), project.path(), official.path())
                .unwrap()
                .unwrap();
        assert_eq!(resolved.path, project.path().join("NativeRecommendedRules.ruleset"));
        assert_eq!(resolved.directory, Some(official.path().to_path_buf()));
    }

    #[test]
    fn official_dir_is_the_fallback() {
        let project = tempfile::tempdir().unwrap();
        let official = tempfile::tempdir().unwrap();
        fs::write(official.path().join("AllRules.ruleset"), "").unwrap();

        let resolved = resolve_ruleset(Some("AllRules.ruleset"), project.path(), official.path())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.path, official.path().join("AllRules.ruleset"));
    }

    #[test]
    fn unresolved_request_fails() {
        let project = tempfile::tempdir().unwrap();
        let official = tempfile::tempdir().unwrap();

        let err =
            resolve_ruleset(Some("Nope.ruleset"), project.path(), official.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaatError>(),
            Some(MaatError::RulesetNotFound(_))
        ));
    }

    #[test]
    fn missing_official_dir_degrades_to_local_search() {
        let project = tempfile::tempdir().unwrap();
        fs::write(project.path().join("my.ruleset"), "").unwrap();

        let resolved =
            resolve_ruleset(Some("my.ruleset"), project.path(), &project.path().join("no-such-dir"))
                .unwrap()
                .unwrap();
        assert_eq!(resolved.path, project.path().join("my.ruleset"));
        assert_eq!(resolved.directory, None);
    }
}
