use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::repo::RepoRef;
use crate::types::{
    BranchSummary, BranchTip, FileContents, FileWrite, GitHubRepo, GitHubUser, NewPullRequest,
    PullRequest, RateLimit, TreeEntry,
};

/// The subset of a Git hosting REST API used to validate tokens and publish
/// commits. Every call is authenticated with the token the host was
/// connected with.
#[async_trait]
pub trait GitHost: Send + Sync {
    async fn authenticate(&self) -> Result<GitHubUser>;
    async fn rate_limit(&self) -> Result<RateLimit>;

    async fn get_repo(&self, repo: &RepoRef) -> Result<GitHubRepo>;
    async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<BranchSummary>>;
    async fn get_branch(&self, repo: &RepoRef, branch: &str) -> Result<BranchTip>;

    async fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()>;
    async fn delete_ref(&self, repo: &RepoRef, branch: &str) -> Result<()>;
    /// Moves `branch` to `sha`. Never forced: non-fast-forward updates fail.
    async fn update_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()>;

    /// `Ok(None)` when the path does not exist at `branch`.
    async fn get_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContents>>;
    async fn create_file(&self, repo: &RepoRef, write: FileWrite<'_>) -> Result<()>;
    async fn update_file(&self, repo: &RepoRef, write: FileWrite<'_>, sha: &str) -> Result<()>;

    /// Returns the blob sha.
    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<String>;
    /// Returns the tree sha.
    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String>;
    /// Returns the commit sha.
    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String>;

    async fn create_pull_request(&self, repo: &RepoRef, pr: &NewPullRequest)
        -> Result<PullRequest>;
}

/// Builds a host bound to one caller's token. Tokens arrive per request and
/// are never stored.
pub trait GitHostFactory: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn GitHost>>;
}
