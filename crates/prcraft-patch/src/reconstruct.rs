use tracing::warn;

use crate::{is_old_file_header, GIT_HEADER_PREFIX, HUNK_PREFIX};

/// Rebuilds a file's new content from its hunk body.
///
/// Context and added lines are kept in order with their marker stripped;
/// removed lines, blank separators and stray headers are dropped. The walk
/// stops at the next file header. When nothing is kept the `original` text
/// is returned unchanged.
///
/// See the crate docs for why this only suits full-context diffs.
pub fn reconstruct<S: AsRef<str>>(original: &str, body: &[S]) -> String {
    let start = body
        .iter()
        .position(|line| line.as_ref().starts_with(HUNK_PREFIX))
        .map(|index| index + 1)
        .unwrap_or(0);

    let mut kept: Vec<&str> = Vec::new();
    for (offset, line) in body[start..].iter().enumerate() {
        let line = line.as_ref();
        if line.starts_with(GIT_HEADER_PREFIX) {
            break;
        }
        if is_old_file_header(line) && next_is_new_header(body, start + offset + 1) {
            break;
        }
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if let Some(text) = line.strip_prefix('+') {
            kept.push(text);
        } else if let Some(text) = line.strip_prefix(' ') {
            kept.push(text);
        }
    }

    if kept.is_empty() {
        warn!(
            body_lines = body.len(),
            "hunk body produced no content, keeping original"
        );
        return original.to_string();
    }

    kept.join("\n")
}

fn next_is_new_header<S: AsRef<str>>(body: &[S], index: usize) -> bool {
    body.get(index)
        .is_some_and(|line| line.as_ref().starts_with("+++ "))
}
