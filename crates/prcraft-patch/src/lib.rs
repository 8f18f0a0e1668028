//! Unified-diff handling for publishing stored task patches.
//!
//! [`split`] cuts a multi-file diff into per-file hunk bodies and
//! [`reconstruct`] rebuilds a file's full new content from one of those
//! bodies.
//!
//! **Limitation:** reconstruction is not offset-based patch application.
//! It walks the hunk body once and keeps every context and added line, so
//! the result is only the whole new file when the hunks cover the file in
//! strictly increasing order with full context. Diffs produced in a single
//! pass against a known base (as the task runner emits them) satisfy this.
//! Arbitrary `git diff` output with partial context does not: lines outside
//! the hunks are dropped. Do not use this crate as a general patch engine.

pub mod hunk;
pub mod reconstruct;
pub mod split;

pub use hunk::{DiffLine, Hunk, HunkRange};
pub use reconstruct::reconstruct;
pub use split::{split, FileDiff, UnifiedDiff};

pub(crate) const OLD_FILE_PREFIX: &str = "--- a/";
pub(crate) const DEV_NULL_OLD: &str = "--- /dev/null";
pub(crate) const NEW_FILE_PREFIX: &str = "+++ b/";
pub(crate) const HUNK_PREFIX: &str = "@@";
pub(crate) const GIT_HEADER_PREFIX: &str = "diff --git";

pub(crate) fn is_old_file_header(line: &str) -> bool {
    line.starts_with(OLD_FILE_PREFIX) || line.starts_with(DEV_NULL_OLD)
}
