use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoPermissions {
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubRepo {
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    pub default_branch: String,
    /// Absent for tokens that cannot see collaborator permissions.
    #[serde(default)]
    pub permissions: Option<RepoPermissions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchSummary {
    pub name: String,
}

/// Head of a branch: the tip commit and its root tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTip {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// Decoded file body at a ref, plus its blob sha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub content: String,
    pub sha: String,
}

/// One blob entry of a tree; always a regular `100644` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
}

/// Single-file write through the contents API.
#[derive(Debug, Clone, Copy)]
pub struct FileWrite<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
}
