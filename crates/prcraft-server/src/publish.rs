//! Turns a completed task's stored patch into a branch, one commit and a
//! pull request.

use tracing::{debug, info, warn};

use prcraft_github::{
    commit_message, CommitBuilder, CommitMode, CommitPlan, GitHost, NewPullRequest, RepoRef,
};
use prcraft_patch::{reconstruct, UnifiedDiff};
use prcraft_types::Task;

use crate::error::{ApiError, Result};

const TITLE_PROMPT_CHARS: usize = 50;

/// Naming knobs for generated branches, titles and commit messages.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub tag: String,
    pub branch_prefix: String,
    pub probe_prefix: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            tag: prcraft_config::DEFAULT_TAG.to_string(),
            branch_prefix: prcraft_config::DEFAULT_BRANCH_PREFIX.to_string(),
            probe_prefix: prcraft_config::DEFAULT_PROBE_PREFIX.to_string(),
        }
    }
}

impl PublishSettings {
    pub fn from_config(config: &prcraft_config::Config) -> Self {
        Self {
            tag: config.tag().to_string(),
            branch_prefix: config.branch_prefix().to_string(),
            probe_prefix: config.probe_prefix().to_string(),
        }
    }

    pub fn branch_for(&self, task_id: i64) -> String {
        format!("{}-{}", self.branch_prefix, task_id)
    }

    pub fn default_title(&self, prompt: &str) -> String {
        let head: String = prompt.chars().take(TITLE_PROMPT_CHARS).collect();
        format!("{}: {}...", self.tag, head)
    }

    pub fn default_body(&self, prompt: &str, changed_files: &[String]) -> String {
        let files = changed_files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Automated changes generated by {}.\n\nPrompt: {}\n\nChanged files:\n{}",
            self.tag, prompt, files
        )
    }
}

/// Caller overrides for the pull request text.
#[derive(Debug, Clone, Default)]
pub struct PullRequestText {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub pr_url: String,
    pub pr_number: u64,
    pub branch: String,
    pub files_updated: usize,
    pub files_expected: usize,
}

impl PublishOutcome {
    pub fn is_partial(&self) -> bool {
        self.files_updated < self.files_expected
    }
}

pub struct Publisher<'a> {
    host: &'a dyn GitHost,
    settings: &'a PublishSettings,
}

impl<'a> Publisher<'a> {
    pub fn new(host: &'a dyn GitHost, settings: &'a PublishSettings) -> Self {
        Self { host, settings }
    }

    pub async fn publish(&self, task: &Task, text: PullRequestText) -> Result<PublishOutcome> {
        let patch = task
            .patch()
            .ok_or_else(|| ApiError::BadRequest("No patch data available for this task".into()))?;

        let user = self
            .host
            .authenticate()
            .await
            .map_err(|e| ApiError::Auth(e.to_string()))?
            .login;

        let repo = RepoRef::parse(&task.repo_url).map_err(|e| ApiError::RepoAccess {
            message: e.to_string(),
            user: user.clone(),
        })?;
        self.host
            .get_repo(&repo)
            .await
            .map_err(|e| ApiError::RepoAccess {
                message: e.message().to_string(),
                user: user.clone(),
            })?;

        let base = task.target_branch.as_str();
        let branch = self.settings.branch_for(task.id);
        info!(task_id = task.id, %repo, %base, %branch, "creating pull request branch");
        self.prepare_branch(&repo, base, &branch).await?;

        let plan = self.plan(&repo, &branch, task, patch).await;
        if plan.is_empty() {
            return Err(ApiError::PatchParse("no file changes extracted".into()));
        }

        let outcome = CommitBuilder::new(self.host, &repo).commit(&plan).await?;
        for (path, err) in &outcome.failed {
            warn!(task_id = task.id, %path, error = %err, "file was not committed");
        }
        if let CommitMode::Atomic { commit_sha } = &outcome.mode {
            debug!(task_id = task.id, commit = %commit_sha, "atomic commit landed");
        }

        let prompt = task.prompt();
        let listed = if task.changed_files.is_empty() {
            plan.paths()
        } else {
            task.changed_files.clone()
        };
        let request = NewPullRequest {
            title: text
                .title
                .unwrap_or_else(|| self.settings.default_title(prompt)),
            body: text
                .body
                .unwrap_or_else(|| self.settings.default_body(prompt, &listed)),
            head: branch.clone(),
            base: base.to_string(),
        };
        let pr = self
            .host
            .create_pull_request(&repo, &request)
            .await
            .map_err(|e| ApiError::Remote(e.to_string()))?;

        info!(task_id = task.id, number = pr.number, url = %pr.html_url, "created pull request");
        Ok(PublishOutcome {
            pr_url: pr.html_url,
            pr_number: pr.number,
            branch,
            files_updated: outcome.updated.len(),
            files_expected: plan.len(),
        })
    }

    /// Points `branch` at the tip of `base`, deleting any earlier attempt.
    async fn prepare_branch(&self, repo: &RepoRef, base: &str, branch: &str) -> Result<()> {
        let tip = self
            .host
            .get_branch(repo, base)
            .await
            .map_err(|e| ApiError::Remote(format!("cannot read base branch '{base}': {e}")))?;

        match self.host.get_branch(repo, branch).await {
            Ok(_) => {
                warn!(%branch, "branch already exists, deleting it first");
                self.host
                    .delete_ref(repo, branch)
                    .await
                    .map_err(|e| ApiError::branch_create(branch, &e))?;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => debug!(%branch, error = %e, "could not check for an existing branch"),
        }

        self.host
            .create_ref(repo, branch, &tip.commit_sha)
            .await
            .map_err(|e| ApiError::branch_create(branch, &e))?;
        let short: String = tip.commit_sha.chars().take(8).collect();
        info!(%branch, base = %short, "created branch");
        Ok(())
    }

    async fn plan(&self, repo: &RepoRef, branch: &str, task: &Task, patch: &str) -> CommitPlan {
        let diff = UnifiedDiff::parse(patch);
        let mut plan = CommitPlan::new(branch, commit_message(&self.settings.tag, task.prompt()));

        for file in diff.files() {
            let hunks = file.hunks();
            debug!(
                path = %file.new_path,
                hunks = hunks.len(),
                added = hunks.iter().map(|h| h.additions()).sum::<usize>(),
                removed = hunks.iter().map(|h| h.deletions()).sum::<usize>(),
                "file diff"
            );
            let original = if file.is_new_file() {
                String::new()
            } else {
                match self.host.get_contents(repo, &file.new_path, branch).await {
                    Ok(Some(contents)) => contents.content,
                    Ok(None) => String::new(),
                    Err(e) => {
                        warn!(
                            path = %file.new_path,
                            error = %e,
                            "could not read original, treating as empty"
                        );
                        String::new()
                    }
                }
            };
            plan.insert(file.new_path.clone(), reconstruct(&original, &file.body));
        }

        info!(files = plan.len(), "reconstructed files from patch");
        plan
    }
}
