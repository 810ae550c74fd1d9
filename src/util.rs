use std::path::{Component, Path};
use std::time::Duration;

/// Returns true when `ancestor` is a component-wise prefix of `path`.
/// `/repo/third_party` is an ancestor of `/repo/third_party/lib` but NOT of
/// `/repo/third_party_other` (raw string prefixes lie about siblings).
pub fn is_ancestor_of(ancestor: &Path, path: &Path) -> bool {
    let ancestor: Vec<Component> =
        ancestor.components().filter(|c| !matches!(c, Component::CurDir)).collect();
    let path: Vec<Component> = path.components().filter(|c| !matches!(c, Component::CurDir)).collect();

    if ancestor.len() > path.len() {
        return false;
    }
    ancestor.iter().zip(path.iter()).all(|(a, b)| a == b)
}

/// Formats a duration as ms, fractional seconds, or minutes+seconds.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else {
        let secs = d.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_basic() {
        assert!(is_ancestor_of(
            Path::new("/repo/third_party"),
            Path::new("/repo/third_party/lib")
        ));
        assert!(is_ancestor_of(
            Path::new("/repo/third_party"),
            Path::new("/repo/third_party")
        ));
    }

    #[test]
    fn ancestor_rejects_textual_prefix_of_sibling() {
        assert!(!is_ancestor_of(
            Path::new("/repo/third_party"),
            Path::new("/repo/third_party_other")
        ));
        assert!(!is_ancestor_of(
            Path::new("/repo/third_party/lib"),
            Path::new("/repo/third_party")
        ));
    }

    #[test]
    fn ancestor_ignores_cur_dir_components() {
        assert!(is_ancestor_of(
            Path::new("/repo/./vendor"),
            Path::new("/repo/vendor/zlib")
        ));
    }

    #[test]
    fn format_duration_milliseconds() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
    }

    #[test]
    fn format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.0s");
        assert_eq!(format_duration(Duration::from_millis(45678)), "45.7s");
    }

    #[test]
    fn format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(61)), "1m 1s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "61m 1s");
    }
}
