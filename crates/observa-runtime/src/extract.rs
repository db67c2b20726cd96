//! Record extraction from noisy model output.
//!
//! Models wrap their JSON in markdown fences, add commentary, or emit several
//! objects back to back with no separator. The scanner below walks the text
//! tracking brace depth and pulls out every top-level `{...}` that parses.

use serde_json::Value;
use tracing::trace;

/// Replace line breaks with spaces so multi-line string values parse.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Byte offset of the `}` that closes the object opened at `start`, or
/// `None` if it never closes.
///
/// Braces inside string literals, including after escaped quotes, do not
/// count towards depth.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract every top-level JSON object from `text`, in source order.
///
/// Fragments that fail to parse are skipped. Never fails.
pub fn extract_json_objects(text: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    let mut pos = 0;

    while let Some(found) = text[pos..].find('{') {
        let start = pos + found;
        let Some(end) = matching_brace(text, start) else {
            // Unterminated, e.g. a stray quote; retry from the next brace.
            pos = start + 1;
            continue;
        };

        let candidate = normalize_newlines(&text[start..=end]);
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value @ Value::Object(_)) => objects.push(value),
            Ok(_) => {}
            Err(e) => trace!("Skipping malformed fragment at byte {}: {}", start, e),
        }
        pos = end + 1;
    }

    objects
}
