use thiserror::Error;
use tracing::{info, warn};

use crate::error::GitHubError;
use crate::host::GitHost;
use crate::repo::RepoRef;
use crate::types::{FileWrite, TreeEntry};

const MESSAGE_PROMPT_CHARS: usize = 100;

/// Full new content for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

/// Everything that lands in one commit on one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    pub branch: String,
    pub message: String,
    changes: Vec<FileChange>,
}

impl CommitPlan {
    pub fn new(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            message: message.into(),
            changes: Vec::new(),
        }
    }

    /// Adds `path`, or replaces its content in place if already present.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        match self.changes.iter_mut().find(|change| change.path == path) {
            Some(existing) => existing.content = content,
            None => self.changes.push(FileChange { path, content }),
        }
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    pub fn paths(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitMode {
    Atomic { commit_sha: String },
    Fallback,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub updated: Vec<String>,
    pub failed: Vec<(String, GitHubError)>,
    pub mode: CommitMode,
}

impl CommitOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("No file changes to commit")]
    EmptyPlan,

    #[error("No files could be committed to {branch}: {summary}")]
    NothingCommitted { branch: String, summary: String },
}

/// `"{tag}: {first 100 chars of prompt}"`.
pub fn commit_message(tag: &str, prompt: &str) -> String {
    let head: String = prompt.chars().take(MESSAGE_PROMPT_CHARS).collect();
    format!("{tag}: {head}")
}

/// Writes a [`CommitPlan`] to a branch, preferring a single commit built
/// from blobs and a tree, and falling back to one contents-API write per
/// file when any step of that fails.
pub struct CommitBuilder<'a> {
    host: &'a dyn GitHost,
    repo: &'a RepoRef,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(host: &'a dyn GitHost, repo: &'a RepoRef) -> Self {
        Self { host, repo }
    }

    pub async fn commit(&self, plan: &CommitPlan) -> Result<CommitOutcome, CommitError> {
        if plan.is_empty() {
            return Err(CommitError::EmptyPlan);
        }

        match self.commit_atomic(plan).await {
            Ok(commit_sha) => {
                info!(
                    repo = %self.repo,
                    branch = %plan.branch,
                    commit = %commit_sha,
                    files = plan.len(),
                    "committed changes atomically"
                );
                return Ok(CommitOutcome {
                    updated: plan.paths(),
                    failed: Vec::new(),
                    mode: CommitMode::Atomic { commit_sha },
                });
            }
            Err(e) => {
                // Blobs created before the failure stay behind as unreachable objects.
                warn!(
                    repo = %self.repo,
                    branch = %plan.branch,
                    error = %e,
                    "atomic commit failed, writing files one by one"
                );
            }
        }

        let outcome = self.commit_per_file(plan).await;
        if outcome.updated.is_empty() {
            let summary = outcome
                .failed
                .iter()
                .map(|(path, e)| format!("{path}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CommitError::NothingCommitted {
                branch: plan.branch.clone(),
                summary,
            });
        }
        Ok(outcome)
    }

    async fn commit_atomic(&self, plan: &CommitPlan) -> Result<String, GitHubError> {
        let tip = self.host.get_branch(self.repo, &plan.branch).await?;

        let mut entries = Vec::with_capacity(plan.len());
        for change in plan.changes() {
            let sha = self.host.create_blob(self.repo, &change.content).await?;
            entries.push(TreeEntry {
                path: change.path.clone(),
                sha,
            });
        }

        let tree = self
            .host
            .create_tree(self.repo, &tip.tree_sha, &entries)
            .await?;
        let commit = self
            .host
            .create_commit(self.repo, &plan.message, &tree, &[tip.commit_sha])
            .await?;
        self.host
            .update_ref(self.repo, &plan.branch, &commit)
            .await?;
        Ok(commit)
    }

    async fn commit_per_file(&self, plan: &CommitPlan) -> CommitOutcome {
        let mut updated = Vec::new();
        let mut failed = Vec::new();

        for change in plan.changes() {
            let write = FileWrite {
                path: &change.path,
                content: &change.content,
                message: &plan.message,
                branch: &plan.branch,
            };
            let result = match self
                .host
                .get_contents(self.repo, &change.path, &plan.branch)
                .await
            {
                Ok(Some(existing)) => self.host.update_file(self.repo, write, &existing.sha).await,
                Ok(None) => self.host.create_file(self.repo, write).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => updated.push(change.path.clone()),
                Err(e) => {
                    warn!(path = %change.path, error = %e, "failed to write file");
                    failed.push((change.path.clone(), e));
                }
            }
        }

        CommitOutcome {
            updated,
            failed,
            mode: CommitMode::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryHost};

    fn three_file_plan() -> CommitPlan {
        let mut plan = CommitPlan::new("main", "prcraft: add files");
        plan.insert("a.txt", "alpha");
        plan.insert("src/b.rs", "fn b() {}");
        plan.insert("README.md", "# widgets\nupdated");
        plan
    }

    #[test]
    fn plan_replaces_repeated_paths_in_place() {
        let mut plan = CommitPlan::new("main", "msg");
        plan.insert("a", "1");
        plan.insert("b", "2");
        plan.insert("a", "3");
        assert_eq!(plan.paths(), vec!["a", "b"]);
        assert_eq!(plan.changes()[0].content, "3");
    }

    #[test]
    fn message_truncates_prompt_to_100_chars() {
        let prompt = "x".repeat(150);
        let message = commit_message("prcraft", &prompt);
        assert_eq!(message, format!("prcraft: {}", "x".repeat(100)));
        assert_eq!(commit_message("prcraft", "short"), "prcraft: short");
    }

    #[tokio::test]
    async fn atomic_commit_lands_all_files_in_one_commit() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        let repo = host.repo();
        let before = host.branch_tip("main").expect("main exists");

        let outcome = CommitBuilder::new(&host, &repo)
            .commit(&three_file_plan())
            .await
            .expect("commit");

        let CommitMode::Atomic { commit_sha } = &outcome.mode else {
            panic!("expected atomic commit, got {:?}", outcome.mode);
        };
        assert_eq!(outcome.updated.len(), 3);
        assert!(outcome.failed.is_empty());
        assert_eq!(host.branch_tip("main").as_deref(), Some(commit_sha.as_str()));
        assert_eq!(host.commit_parents(commit_sha), vec![before]);
        assert_eq!(host.file_at("main", "a.txt").as_deref(), Some("alpha"));
        assert_eq!(host.file_at("main", "src/b.rs").as_deref(), Some("fn b() {}"));
        assert_eq!(
            host.file_at("main", "README.md").as_deref(),
            Some("# widgets\nupdated")
        );
    }

    #[tokio::test]
    async fn tree_failure_falls_back_and_collects_per_file_failures() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        host.fail(Fault::CreateTree);
        host.fail_path("src/b.rs");
        let repo = host.repo();

        let outcome = CommitBuilder::new(&host, &repo)
            .commit(&three_file_plan())
            .await
            .expect("partial success is not an error");

        assert_eq!(outcome.mode, CommitMode::Fallback);
        assert_eq!(outcome.updated, vec!["a.txt", "README.md"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "src/b.rs");
        assert!(outcome.is_partial());
        assert_eq!(host.file_at("main", "a.txt").as_deref(), Some("alpha"));
        assert_eq!(host.file_at("main", "src/b.rs"), None);
    }

    #[tokio::test]
    async fn moved_branch_rejects_the_atomic_commit_and_falls_back() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        host.race_ref_update("main", "other.txt", "written elsewhere");
        let repo = host.repo();

        let outcome = CommitBuilder::new(&host, &repo)
            .commit(&three_file_plan())
            .await
            .expect("fallback lands the files");

        assert_eq!(outcome.mode, CommitMode::Fallback);
        assert_eq!(outcome.updated.len(), 3);
        assert!(host.calls().contains(&"update_ref main".to_string()));
        // The racing commit is still reachable, so the branch never took the stale commit.
        assert_eq!(
            host.file_at("main", "other.txt").as_deref(),
            Some("written elsewhere")
        );
        assert_eq!(host.file_at("main", "a.txt").as_deref(), Some("alpha"));
        assert_eq!(
            host.file_at("main", "README.md").as_deref(),
            Some("# widgets\nupdated")
        );
    }

    #[tokio::test]
    async fn rejected_ref_update_leaves_branch_on_fallback_commits() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        host.fail(Fault::UpdateRef);
        let repo = host.repo();
        let before = host.branch_tip("main").expect("main");

        let outcome = CommitBuilder::new(&host, &repo)
            .commit(&three_file_plan())
            .await
            .expect("fallback");

        assert_eq!(outcome.mode, CommitMode::Fallback);
        assert_eq!(outcome.updated.len(), 3);
        // One contents-API commit per file, chained on the old tip.
        let mut tip = host.branch_tip("main").expect("main");
        for _ in 0..3 {
            let parents = host.commit_parents(&tip);
            assert_eq!(parents.len(), 1);
            tip = parents[0].clone();
        }
        assert_eq!(tip, before);
    }

    #[tokio::test]
    async fn blob_or_commit_failure_also_falls_back() {
        for fault in [Fault::CreateBlob, Fault::CreateCommit] {
            let host = MemoryHost::new("octocat", "acme/widgets");
            host.fail(fault);
            let repo = host.repo();

            let outcome = CommitBuilder::new(&host, &repo)
                .commit(&three_file_plan())
                .await
                .expect("fallback");

            assert_eq!(outcome.mode, CommitMode::Fallback, "{fault:?}");
            assert!(!outcome.is_partial());
            assert_eq!(host.file_at("main", "src/b.rs").as_deref(), Some("fn b() {}"));
        }
    }

    #[tokio::test]
    async fn unreadable_contents_fail_every_fallback_write() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        host.fail(Fault::CreateTree);
        host.fail(Fault::GetContents);
        let repo = host.repo();

        let err = CommitBuilder::new(&host, &repo)
            .commit(&three_file_plan())
            .await
            .expect_err("nothing committed");
        let CommitError::NothingCommitted { summary, .. } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(summary.contains("a.txt"));
        assert_eq!(host.file_at("main", "a.txt"), None);
    }

    #[tokio::test]
    async fn fallback_with_no_successes_is_an_error() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        host.fail(Fault::GetBranch);
        host.fail_path("only.txt");
        let repo = host.repo();

        let mut plan = CommitPlan::new("main", "msg");
        plan.insert("only.txt", "content");
        let err = CommitBuilder::new(&host, &repo)
            .commit(&plan)
            .await
            .expect_err("nothing committed");
        assert!(matches!(err, CommitError::NothingCommitted { .. }));
    }

    #[tokio::test]
    async fn empty_plan_is_rejected_without_remote_calls() {
        let host = MemoryHost::new("octocat", "acme/widgets");
        let repo = host.repo();
        let err = CommitBuilder::new(&host, &repo)
            .commit(&CommitPlan::new("main", "msg"))
            .await
            .expect_err("empty plan");
        assert!(matches!(err, CommitError::EmptyPlan));
        assert!(host.calls().is_empty());
    }
}
