use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Extensions accepted by the upload form
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// Used when a model response sanitizes down to nothing.
pub const FALLBACK_STEM: &str = "document";

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// True when the part after the last '.' is an allowed extension (case-insensitive).
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_lowercase();
            ALLOWED_EXTENSIONS.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}

/// Reduces a filename to a flat, ASCII-only name that is safe on any filesystem.
///
/// Characters are NFKD-decomposed first so accented letters keep their base
/// letter. Path separators become spaces, runs of whitespace become a single `_`, and
/// everything outside `[A-Za-z0-9_.-]` is dropped. Leading and trailing dots
/// and underscores are stripped, so the result can never be hidden or climb
/// out of a directory. The result may be empty.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = trimmed.split('.').next().unwrap_or("").to_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        return format!("_{}", trimmed);
    }

    trimmed
}

/// Appends `.pdf` unless the name already carries it (case-insensitive).
pub fn ensure_pdf_extension(filename: &str) -> String {
    if filename.is_empty() {
        return format!("{}.pdf", FALLBACK_STEM);
    }
    if filename.to_lowercase().ends_with(".pdf") {
        filename.to_string()
    } else {
        format!("{}.pdf", filename)
    }
}

/// Turns a raw model response into the final on-disk filename.
pub fn normalize_proposed_filename(proposed: &str) -> String {
    ensure_pdf_extension(&secure_filename(proposed.trim()))
}

/// Splits `name.ext` into (`name`, `.ext`); names without a dot get an empty extension.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => filename.split_at(filename.len() - ext.len() - 1),
        None => (filename, ""),
    }
}
