//! Folder-name derivation for dataset titles.

/// Characters that can't appear in a folder name on common filesystems.
const PATH_HOSTILE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Derives a filesystem-safe folder name from a dataset title.
///
/// Whitespace, path separators, and other path-hostile or control characters
/// each become `_`. A name made only of dots (`.`, `..`) is replaced with
/// underscores so it can't address the parent directory. Applying the function
/// to its own output returns the same string.
#[must_use]
pub fn sanitize_dataset_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || ch.is_control() || PATH_HOSTILE.contains(&ch) {
                '_'
            } else {
                ch
            }
        })
        .collect();

    if sanitized.chars().all(|ch| ch == '.') {
        return "_".repeat(sanitized.len().max(1));
    }
    sanitized
}
