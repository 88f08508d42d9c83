//! Program text loading: comment stripping and statement splitting.

use std::fs;
use std::path::Path;

/// Statement separator.
pub const STATEMENT_SEPARATOR: char = ';';

/// Remove `//` line comments.
pub fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split comment-free text into raw statements (untrimmed, possibly blank).
pub fn split_statements(source: &str) -> Vec<String> {
    source
        .split(STATEMENT_SEPARATOR)
        .map(|s| s.to_string())
        .collect()
}

/// Read a program file and return its raw statements.
pub fn load_file(path: &Path) -> Result<Vec<String>, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(split_statements(&strip_comments(&source)))
}
