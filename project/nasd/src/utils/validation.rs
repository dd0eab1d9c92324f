use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

// One path segment: not empty, not hidden, no separators or NUL bytes.
static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^./\x00][^/\x00]*$").unwrap());

pub fn is_valid_name(name: &str) -> bool {
    SEGMENT_RE.is_match(name)
}

pub fn is_valid_logical_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("..") && path.split('/').all(is_valid_name)
}

pub fn validate_file_name(name: &str) -> Result<(), AppError> {
    if is_valid_name(name) {
        return Ok(());
    }
    Err(AppError::InvalidName(format!(
        "`{name}`: files cannot be hidden, empty or contain '/'"
    )))
}

pub fn validate_logical_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() || path.contains("..") {
        return Err(AppError::InvalidPath(format!(
            "`{path}`: path cannot be empty or contain '..'"
        )));
    }
    if !path.split('/').all(is_valid_name) {
        return Err(AppError::InvalidPath(format!(
            "`{path}`: folders or subfolders cannot be empty or start with a dot"
        )));
    }
    Ok(())
}
