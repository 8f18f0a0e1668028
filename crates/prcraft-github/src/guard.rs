use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::GitHubError;
use crate::host::GitHost;
use crate::repo::RepoRef;

pub const DEFAULT_PROBE_PREFIX: &str = "test-permissions";

static PROBE_SEQ: AtomicU64 = AtomicU64::new(0);

/// `{prefix}-{millis}-{seq}`, unique within this process.
fn probe_name(prefix: &str) -> String {
    let seq = PROBE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        seq
    )
}

/// What a token was observed to be allowed to do. Serialized with the
/// short names clients expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionReport {
    #[serde(rename = "read")]
    pub can_read: bool,
    #[serde(rename = "read_branches")]
    pub can_read_branches: bool,
    #[serde(rename = "create_branches")]
    pub can_create_branches: bool,
    #[serde(rename = "write")]
    pub can_write: bool,
    #[serde(rename = "admin")]
    pub can_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoAccess {
    pub name: String,
    pub private: bool,
    pub default_branch: String,
    pub permissions: PermissionReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub user: String,
    pub repo: Option<RepoAccess>,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Token validation failed: {0}")]
    Auth(GitHubError),

    #[error("Cannot access repository: {message}")]
    RepoAccess { user: String, message: String },
}

/// A throwaway branch created to prove the token can create refs.
///
/// Acquisition and release are separate steps so callers release on every
/// path where the ref may exist.
#[derive(Debug)]
pub struct ProbeBranch {
    name: String,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Created(ProbeBranch),
    /// The create request failed in a way that may still have created it.
    Uncertain(ProbeBranch, GitHubError),
    Refused(GitHubError),
}

impl ProbeBranch {
    pub async fn acquire(
        host: &dyn GitHost,
        repo: &RepoRef,
        base_branch: &str,
        prefix: &str,
    ) -> ProbeOutcome {
        let name = probe_name(prefix);
        let tip = match host.get_branch(repo, base_branch).await {
            Ok(tip) => tip,
            Err(e) => return ProbeOutcome::Refused(e),
        };
        match host.create_ref(repo, &name, &tip.commit_sha).await {
            Ok(()) => ProbeOutcome::Created(ProbeBranch { name }),
            Err(e) if e.is_ambiguous() => ProbeOutcome::Uncertain(ProbeBranch { name }, e),
            Err(e) => ProbeOutcome::Refused(e),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(self, host: &dyn GitHost, repo: &RepoRef) -> Result<(), GitHubError> {
        host.delete_ref(repo, &self.name).await
    }
}

/// Reports what a token can do, optionally against one repository.
pub struct AccessGuard<'a> {
    host: &'a dyn GitHost,
    probe_prefix: String,
}

impl<'a> AccessGuard<'a> {
    pub fn new(host: &'a dyn GitHost, probe_prefix: impl Into<String>) -> Self {
        Self {
            host,
            probe_prefix: probe_prefix.into(),
        }
    }

    pub async fn probe(&self, repo_url: Option<&str>) -> Result<AccessReport, AccessError> {
        let user = self
            .host
            .authenticate()
            .await
            .map_err(AccessError::Auth)?
            .login;
        info!(%user, "token authenticated");

        match self.host.rate_limit().await {
            Ok(rate) => info!(remaining = rate.remaining, limit = rate.limit, "rate limit"),
            Err(e) => warn!(error = %e, "could not read rate limit"),
        }

        let Some(repo_url) = repo_url.map(str::trim).filter(|url| !url.is_empty()) else {
            return Ok(AccessReport { user, repo: None });
        };

        let repo = RepoRef::parse(repo_url).map_err(|e| AccessError::RepoAccess {
            user: user.clone(),
            message: e.to_string(),
        })?;
        let remote = self
            .host
            .get_repo(&repo)
            .await
            .map_err(|e| AccessError::RepoAccess {
                user: user.clone(),
                message: e.message().to_string(),
            })?;

        let mut permissions = PermissionReport {
            can_read: true,
            ..Default::default()
        };

        match self.host.list_branches(&repo).await {
            Ok(branches) => {
                permissions.can_read_branches = true;
                info!(repo = %repo, count = branches.len(), "branches readable");
                permissions.can_create_branches =
                    self.probe_branch_creation(&repo, &remote.default_branch).await;
            }
            Err(e) => warn!(repo = %repo, error = %e, "cannot read branches"),
        }

        if let Some(repo_permissions) = &remote.permissions {
            permissions.can_write = repo_permissions.push;
            permissions.can_admin = repo_permissions.admin;
        }

        Ok(AccessReport {
            user,
            repo: Some(RepoAccess {
                name: remote.full_name,
                private: remote.private,
                default_branch: remote.default_branch,
                permissions,
            }),
        })
    }

    async fn probe_branch_creation(&self, repo: &RepoRef, base_branch: &str) -> bool {
        let (probe, created) =
            match ProbeBranch::acquire(self.host, repo, base_branch, &self.probe_prefix).await {
                ProbeOutcome::Created(probe) => (probe, true),
                ProbeOutcome::Uncertain(probe, e) => {
                    warn!(branch = probe.name(), error = %e, "probe branch create was ambiguous");
                    (probe, false)
                }
                ProbeOutcome::Refused(e) => {
                    warn!(repo = %repo, error = %e, "cannot create branches");
                    return false;
                }
            };

        let name = probe.name().to_string();
        match probe.release(self.host, repo).await {
            Ok(()) => info!(branch = %name, "removed probe branch"),
            Err(e) if e.is_not_found() && !created => {}
            Err(e) => warn!(branch = %name, error = %e, "failed to remove probe branch"),
        }
        created
    }
}
