//! GitHub access for prcraft: the [`GitHost`] API seam, its reqwest
//! implementation, and the two workflows built on it, [`CommitBuilder`]
//! and [`AccessGuard`].

pub mod client;
pub mod commit;
pub mod error;
pub mod guard;
pub mod host;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod repo;
pub mod types;

pub use client::{GitHubClient, GitHubClientFactory};
pub use commit::{
    commit_message, CommitBuilder, CommitError, CommitMode, CommitOutcome, CommitPlan, FileChange,
};
pub use error::GitHubError;
pub use guard::{
    AccessError, AccessGuard, AccessReport, PermissionReport, ProbeBranch, ProbeOutcome,
    RepoAccess,
};
pub use host::{GitHost, GitHostFactory};
pub use repo::RepoRef;
pub use types::*;
