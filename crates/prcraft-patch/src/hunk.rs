use serde::Serialize;

use crate::HUNK_PREFIX;

/// Line ranges from a `@@ -a,b +c,d @@` header. Informational only: the
/// reconstructor never positions lines by these numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HunkRange {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

impl HunkRange {
    pub fn parse(header: &str) -> Option<Self> {
        let rest = header.strip_prefix(HUNK_PREFIX)?.trim_start();
        let mut fields = rest.split_whitespace();
        let old = fields.next()?.strip_prefix('-')?;
        let new = fields.next()?.strip_prefix('+')?;
        let (old_start, old_count) = parse_span(old)?;
        let (new_start, new_count) = parse_span(new)?;
        Some(Self {
            old_start,
            old_count,
            new_start,
            new_count,
        })
    }
}

// "12,3" or "12" (count defaults to 1)
fn parse_span(span: &str) -> Option<(usize, usize)> {
    match span.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((span.parse().ok()?, 1)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

impl DiffLine {
    /// Classifies one hunk-body line. File headers (`+++`/`---`), blank
    /// separators and markers such as `\ No newline at end of file` are
    /// not diff lines.
    pub fn parse(line: &str) -> Option<Self> {
        if line.starts_with("+++") || line.starts_with("---") {
            return None;
        }
        if let Some(text) = line.strip_prefix('+') {
            return Some(DiffLine::Added(text.to_string()));
        }
        if let Some(text) = line.strip_prefix(' ') {
            return Some(DiffLine::Context(text.to_string()));
        }
        if let Some(text) = line.strip_prefix('-') {
            return Some(DiffLine::Removed(text.to_string()));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub header: String,
    pub range: Option<HunkRange>,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    fn new(header: &str) -> Self {
        Self {
            header: header.to_string(),
            range: HunkRange::parse(header),
            lines: Vec::new(),
        }
    }

    pub fn additions(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, DiffLine::Added(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, DiffLine::Removed(_)))
            .count()
    }
}

/// Groups a file's hunk body into hunks. Lines before the first `@@` are
/// dropped.
pub fn parse_hunks<S: AsRef<str>>(body: &[S]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for line in body {
        let line = line.as_ref();
        if line.starts_with(HUNK_PREFIX) {
            hunks.push(Hunk::new(line));
            continue;
        }
        let (Some(current), Some(parsed)) = (hunks.last_mut(), DiffLine::parse(line)) else {
            continue;
        };
        current.lines.push(parsed);
    }
    hunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parses_with_and_without_counts() {
        assert_eq!(
            HunkRange::parse("@@ -1,4 +1,5 @@ fn main() {"),
            Some(HunkRange {
                old_start: 1,
                old_count: 4,
                new_start: 1,
                new_count: 5,
            })
        );
        assert_eq!(
            HunkRange::parse("@@ -3 +3 @@"),
            Some(HunkRange {
                old_start: 3,
                old_count: 1,
                new_start: 3,
                new_count: 1,
            })
        );
        assert_eq!(HunkRange::parse("@@ garbage @@"), None);
    }

    #[test]
    fn lines_are_classified_in_order() {
        let body = [
            "@@ -1,3 +1,3 @@",
            " keep",
            "-old",
            "+new",
            "\\ No newline at end of file",
            "@@ -10,1 +10,2 @@",
            " tail",
            "+extra",
        ];
        let hunks = parse_hunks(&body);
        assert_eq!(hunks.len(), 2);
        assert_eq!(
            hunks[0].lines,
            vec![
                DiffLine::Context("keep".to_string()),
                DiffLine::Removed("old".to_string()),
                DiffLine::Added("new".to_string()),
            ]
        );
        assert_eq!(hunks[0].additions(), 1);
        assert_eq!(hunks[0].deletions(), 1);
        assert_eq!(hunks[1].range.map(|r| r.new_count), Some(2));
        assert_eq!(hunks[1].additions(), 1);
        assert_eq!(hunks[1].deletions(), 0);
    }
}
