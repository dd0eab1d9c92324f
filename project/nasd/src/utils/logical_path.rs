//! Helpers for user-facing logical paths such as `alice/docs/report.pdf`.
//!
//! Logical paths use `/` as separator, carry no leading slash, and start with
//! the owning username. The synthetic parent of a top-level node is `/`.

pub const ROOT: &str = "/";
pub const TRASH_DIR: &str = "trash";

/// Joins a parent directory and a single name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == ROOT {
        name.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Returns the parent of `path`, or `/` for a top-level path.
pub fn parent_of(path: &str) -> String {
    path.rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_else(|| ROOT.to_string())
}

pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// The owning user is always the first segment.
pub fn username(path: &str) -> &str {
    path.split_once('/').map(|(user, _)| user).unwrap_or(path)
}

/// Canonical form of a directory argument: empty and `/` mean the root,
/// trailing slashes are dropped.
pub fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn trash_dir(username: &str) -> String {
    join(username, TRASH_DIR)
}

/// True for `<user>/trash` itself.
pub fn is_trash_dir(path: &str) -> bool {
    let mut segments = path.split('/');
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(user), Some(TRASH_DIR), None) if !user.is_empty()
    )
}

/// True for anything strictly below `<user>/trash`.
pub fn is_in_trash(path: &str) -> bool {
    let mut segments = path.split('/');
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(user), Some(TRASH_DIR), Some(_)) if !user.is_empty()
    )
}

/// True when `path` lies strictly below `ancestor`.
pub fn is_descendant_of(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Prefix substitution used by moves: `old_root/x/y` becomes `new_root/x/y`.
pub fn rebase(path: &str, old_root: &str, new_root: &str) -> String {
    format!("{}{}", new_root, &path[old_root.len()..])
}

/// Splits `report.pdf` into `("report", ".pdf")`. A leading dot is not an
/// extension separator, and names without a dot have no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// `report.pdf` with `n = 2` becomes `report(2).pdf`.
pub fn numbered_name(name: &str, n: u32) -> String {
    let (base, extension) = split_extension(name);
    format!("{base}({n}){extension}")
}

pub fn trash_name(name: &str, suffix: &str) -> String {
    format!("{name}-{suffix}")
}

/// Recovers `photos` from a trash entry named `photos-<suffix>`.
pub fn original_name_from_trash(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((original, _)) if !original.is_empty() => original,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("alice/docs", "a.txt"), "alice/docs/a.txt");
        assert_eq!(join("/", "alice"), "alice");
        assert_eq!(join("alice/", "docs"), "alice/docs");
        assert_eq!(parent_of("alice/docs/a.txt"), "alice/docs");
        assert_eq!(parent_of("alice"), "/");
        assert_eq!(file_name("alice/docs/a.txt"), "a.txt");
        assert_eq!(file_name("alice"), "alice");
        assert_eq!(username("alice/docs/a.txt"), "alice");
    }

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir(""), "/");
        assert_eq!(normalize_dir("/"), "/");
        assert_eq!(normalize_dir("alice/docs/"), "alice/docs");
    }

    #[test]
    fn test_trash_classification() {
        assert!(is_trash_dir("alice/trash"));
        assert!(!is_trash_dir("alice/trash/x"));
        assert!(!is_trash_dir("alice/docs/trash"));
        assert!(is_in_trash("alice/trash/photos-1a2b3c4d"));
        assert!(is_in_trash("alice/trash/photos-1a2b3c4d/a.jpg"));
        assert!(!is_in_trash("alice/trash"));
        assert!(!is_in_trash("alice/docs/trash/a.jpg"));
    }

    #[test]
    fn test_descendants_need_separator() {
        assert!(is_descendant_of("alice/photos/a.jpg", "alice/photos"));
        assert!(!is_descendant_of("alice/photos2", "alice/photos"));
        assert!(!is_descendant_of("alice/photos", "alice/photos"));
        assert_eq!(
            rebase("alice/photos/2024/a.jpg", "alice/photos", "alice/trash/photos-x"),
            "alice/trash/photos-x/2024/a.jpg"
        );
    }

    #[test]
    fn test_numbered_names() {
        assert_eq!(numbered_name("report.pdf", 1), "report(1).pdf");
        assert_eq!(numbered_name("archive.tar.gz", 2), "archive.tar(2).gz");
        assert_eq!(numbered_name("README", 3), "README(3)");
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
    }

    #[test]
    fn test_trash_names_round_trip() {
        let name = trash_name("my-photos", "1a2b3c4d");
        assert_eq!(name, "my-photos-1a2b3c4d");
        assert_eq!(original_name_from_trash(&name), "my-photos");
        assert_eq!(original_name_from_trash("plain"), "plain");
        assert_eq!(original_name_from_trash("-x"), "-x");
    }
}
