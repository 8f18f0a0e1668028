use serde::Serialize;
use tracing::debug;

use crate::hunk::{parse_hunks, Hunk};
use crate::{is_old_file_header, GIT_HEADER_PREFIX, HUNK_PREFIX, NEW_FILE_PREFIX, OLD_FILE_PREFIX};

/// One file's slice of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    /// `None` when the old side is `/dev/null`, i.e. the file is created.
    pub old_path: Option<String>,
    pub new_path: String,
    /// Raw lines from the first `@@` up to the next file header.
    pub body: Vec<String>,
}

impl FileDiff {
    pub fn is_new_file(&self) -> bool {
        self.old_path.is_none()
    }

    pub fn hunks(&self) -> Vec<Hunk> {
        parse_hunks(&self.body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnifiedDiff {
    files: Vec<FileDiff>,
}

impl UnifiedDiff {
    pub fn parse(diff_text: &str) -> Self {
        Self {
            files: split(diff_text),
        }
    }

    pub fn files(&self) -> &[FileDiff] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.new_path.as_str())
    }
}

impl IntoIterator for UnifiedDiff {
    type Item = FileDiff;
    type IntoIter = std::vec::IntoIter<FileDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Splits a multi-file unified diff into per-file hunk bodies.
///
/// A file starts at a `--- a/<path>` (or `--- /dev/null`) line directly
/// followed by `+++ b/<path>`. Its body runs from the first `@@` line to
/// the next file header, `diff --git` line, or end of input. Headers with
/// no hunk before the next header are skipped.
///
/// Lines are cut on `\n` only, so a `\r` before it stays part of the line.
pub fn split(diff_text: &str) -> Vec<FileDiff> {
    let mut lines: Vec<&str> = diff_text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some((old_path, new_path)) = header_at(&lines, i) else {
            i += 1;
            continue;
        };

        let mut hunk_start = i + 2;
        while hunk_start < lines.len()
            && !lines[hunk_start].starts_with(HUNK_PREFIX)
            && header_at(&lines, hunk_start).is_none()
        {
            hunk_start += 1;
        }

        if hunk_start >= lines.len() || !lines[hunk_start].starts_with(HUNK_PREFIX) {
            debug!(path = %new_path, "file header without hunks, skipping");
            i = hunk_start;
            continue;
        }

        let end = body_end(&lines, hunk_start + 1);
        files.push(FileDiff {
            old_path,
            new_path,
            body: lines[hunk_start..end]
                .iter()
                .map(|line| line.to_string())
                .collect(),
        });
        i = end;
    }

    files
}

fn header_at(lines: &[&str], index: usize) -> Option<(Option<String>, String)> {
    let old = *lines.get(index)?;
    let new = *lines.get(index + 1)?;
    if !is_old_file_header(old) {
        return None;
    }
    let new_path = new.strip_prefix(NEW_FILE_PREFIX)?.trim_end();
    if new_path.is_empty() {
        return None;
    }
    let old_path = old
        .strip_prefix(OLD_FILE_PREFIX)
        .map(|path| path.trim_end().to_string());
    Some((old_path, new_path.to_string()))
}

fn body_end(lines: &[&str], from: usize) -> usize {
    let mut end = from;
    while end < lines.len() {
        if lines[end].starts_with(GIT_HEADER_PREFIX) || header_at(lines, end).is_some() {
            break;
        }
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FILES: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,2 +1,3 @@
 pub mod a;
+pub mod b;
 pub mod c;
diff --git a/README.md b/README.md
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/README.md
@@ -0,0 +1,2 @@
+# widgets
+hello
";

    #[test]
    fn two_file_diff_yields_two_disjoint_bodies() {
        let files = split(TWO_FILES);
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].new_path, "src/lib.rs");
        assert_eq!(files[0].old_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(
            files[0].body,
            vec!["@@ -1,2 +1,3 @@", " pub mod a;", "+pub mod b;", " pub mod c;"]
        );

        assert_eq!(files[1].new_path, "README.md");
        assert!(files[1].is_new_file());
        assert_eq!(files[1].body, vec!["@@ -0,0 +1,2 @@", "+# widgets", "+hello"]);

        for line in &files[1].body {
            assert!(!files[0].body.contains(line));
        }
    }

    #[test]
    fn header_without_hunk_is_skipped_without_stealing_the_next_file() {
        let diff = "\
--- a/bin/tool
+++ b/bin/tool
--- a/src/main.rs
+++ b/src/main.rs
@@ -1 +1 @@
-fn main() {}
+fn main() { run() }
";
        let files = split(diff);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path, "src/main.rs");
    }

    #[test]
    fn multiple_hunks_stay_in_one_body() {
        let diff = "\
--- a/notes.txt
+++ b/notes.txt
@@ -1,2 +1,2 @@
 one
-two
+TWO
@@ -8,2 +8,3 @@
 eight
 nine
+ten
";
        let parsed = UnifiedDiff::parse(diff);
        assert_eq!(parsed.len(), 1);
        let file = &parsed.files()[0];
        assert_eq!(file.body.len(), 9);
        assert_eq!(file.hunks().len(), 2);
        assert_eq!(parsed.paths().collect::<Vec<_>>(), vec!["notes.txt"]);
    }

    #[test]
    fn crlf_line_endings_survive_into_the_body() {
        let diff = "--- a/win.txt\r\n+++ b/win.txt\r\n@@ -1,2 +1,2 @@\r\n one\r\n-two\r\n+TWO\r\n";
        let files = split(diff);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path, "win.txt");
        assert_eq!(files[0].old_path.as_deref(), Some("win.txt"));
        assert_eq!(
            files[0].body,
            vec!["@@ -1,2 +1,2 @@\r", " one\r", "-two\r", "+TWO\r"]
        );
        assert_eq!(
            crate::reconstruct("one\r\ntwo\r\n", &files[0].body),
            "one\r\nTWO\r"
        );
    }

    #[test]
    fn text_without_headers_splits_to_nothing() {
        assert!(split("").is_empty());
        assert!(split("just some text\n+++ b/orphan\n@@ -1 +1 @@\n").is_empty());
        assert!(UnifiedDiff::parse("--- a/x\n+++ b/x\n").is_empty());
    }
}
