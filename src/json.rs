//! JSON parsing with error messages that point at the offending value.

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Width of the excerpt shown around a parse error.
const SNIPPET_WIDTH: usize = 40;

/// Parse `body`, reporting the serde path and an excerpt of the failing line on error.
pub fn parse_json_with_context<T: DeserializeOwned>(body: &str) -> Result<T> {
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let snippet = error_snippet(body, inner.line(), inner.column());

        if path.is_empty() || path == "." {
            anyhow::anyhow!("{inner}\n{snippet}")
        } else {
            anyhow::anyhow!("at path '{path}': {inner}\n{snippet}")
        }
    })
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Excerpt of `line` (1-based) centred on `column` (1-based byte offset), with a caret.
fn error_snippet(body: &str, line: usize, column: usize) -> String {
    let target = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    let error_idx = floor_boundary(target, column.saturating_sub(1));
    let start = floor_boundary(target, error_idx.saturating_sub(SNIPPET_WIDTH / 2));
    let end = floor_boundary(target, error_idx + SNIPPET_WIDTH / 2);

    let excerpt = &target[start..end];
    let caret_offset = target[start..error_idx].chars().count();
    format!("...{excerpt}...\n   {}^", " ".repeat(caret_offset))
}
