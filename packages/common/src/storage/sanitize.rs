//! Turns untrusted client filenames and stored paths into paths confined to
//! the storage root.
//!
//! Everything here is lexical. The filesystem half of the containment check
//! (symlink resolution against the canonical root) lives in
//! [`FilesystemBlobStore`](super::filesystem::FilesystemBlobStore).

use std::path::PathBuf;

use crate::modality::Modality;

use super::error::StorageError;

/// Longest sanitized filename we hand to the filesystem.
pub const MAX_FILENAME_LEN: usize = 255;

/// Checks whether any segment of `path` is `..`, splitting on both separators.
pub fn contains_path_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Checks for a Windows drive root such as `C:`, `C:\` or `c:/`.
///
/// The colon must end the string or be followed by a separator, so names like
/// `a:b.png` are left to character mapping.
pub fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes.get(2), None | Some(b'/' | b'\\'))
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Reduce an uploaded filename to a single safe path segment.
///
/// Traversal payloads, absolute paths and drive-letter prefixes are rejected
/// with [`StorageError::PathViolation`] rather than silently rewritten. Benign
/// directory components (`scans/xray.png`) are dropped and the final segment
/// is kept. Characters outside `[A-Za-z0-9._-]` become `_` and leading dots are
/// stripped.
pub fn sanitize_filename(raw: &str) -> Result<String, StorageError> {
    let trimmed = raw.trim();

    if trimmed.contains('\0') {
        return Err(StorageError::PathViolation(
            "filename contains a null byte".into(),
        ));
    }

    if trimmed.starts_with(['/', '\\']) || has_drive_prefix(trimmed) {
        return Err(StorageError::PathViolation(trimmed.to_string()));
    }

    if contains_path_traversal(trimmed) {
        return Err(StorageError::PathViolation(trimmed.to_string()));
    }

    let last = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    let mapped: String = last
        .chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect();
    let name = mapped.trim_start_matches('.');

    if name.is_empty() {
        return Err(StorageError::InvalidFilename(format!(
            "'{raw}' has no usable name"
        )));
    }

    Ok(truncate_keeping_extension(name))
}

fn truncate_keeping_extension(name: &str) -> String {
    if name.len() <= MAX_FILENAME_LEN {
        return name.to_string();
    }
    // Sanitized names are pure ASCII, so byte offsets are char boundaries.
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.len() < MAX_FILENAME_LEN / 2 => {
            let keep = MAX_FILENAME_LEN - ext.len() - 1;
            format!("{}.{}", &stem[..keep.min(stem.len())], ext)
        }
        _ => name[..MAX_FILENAME_LEN].to_string(),
    }
}

/// Lowercased extension of a sanitized filename, without the dot.
///
/// Returns an empty string when the name has no extension.
pub fn file_format(sanitized: &str) -> String {
    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Build the bucket-relative path (`<bucket>/<name>`) for an upload.
pub fn bucket_path(modality: Modality, raw_filename: &str) -> Result<String, StorageError> {
    let name = sanitize_filename(raw_filename)?;
    Ok(format!("{}/{}", modality.bucket(), name))
}

/// Lexically normalize a root-relative path.
///
/// Either separator is accepted. `.` segments and empty segments are dropped
/// and `..` pops a segment; popping past the root, an absolute root or a drive
/// prefix is a [`StorageError::PathViolation`]. The root itself is not a valid
/// blob path.
pub fn normalize_relative(path: &str) -> Result<PathBuf, StorageError> {
    let unified = path.trim().replace('\\', "/");

    if unified.contains('\0') || unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(StorageError::PathViolation(path.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::PathViolation(path.to_string()));
                }
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(StorageError::PathViolation(path.to_string()));
    }

    Ok(parts.iter().collect())
}
