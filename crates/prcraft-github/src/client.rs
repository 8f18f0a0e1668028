use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::{GitHubError, Result};
use crate::host::{GitHost, GitHostFactory};
use crate::repo::RepoRef;
use crate::types::{
    BranchSummary, BranchTip, FileContents, FileWrite, GitHubRepo, GitHubUser, NewPullRequest,
    PullRequest, RateLimit, TreeEntry,
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "prcraft";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_VERSION: &str = "2022-11-28";
const BRANCH_PAGE_SIZE: &str = "100";

/// Creates a [`GitHubClient`] per token against a fixed API base.
#[derive(Debug, Clone)]
pub struct GitHubClientFactory {
    api_base: Url,
    user_agent: String,
    timeout: Duration,
}

impl GitHubClientFactory {
    pub fn new(api_base: &str, user_agent: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| GitHubError::InvalidRepoUrl(format!("{api_base}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(GitHubError::InvalidRepoUrl(api_base.to_string()));
        }
        Ok(Self {
            api_base,
            user_agent: user_agent.into(),
            timeout,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }
}

impl GitHostFactory for GitHubClientFactory {
    fn connect(&self, token: &str) -> Result<Arc<dyn GitHost>> {
        Ok(Arc::new(GitHubClient::new(
            self.api_base.clone(),
            token,
            &self.user_agent,
            self.timeout,
        )?))
    }
}

/// REST client for one token.
pub struct GitHubClient {
    http: Client,
    api_base: Url,
}

impl GitHubClient {
    pub fn new(api_base: Url, token: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| GitHubError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );

        let http = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, api_base })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidRepoUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_url<'a>(
        &self,
        repo: &'a RepoRef,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url> {
        self.url(
            ["repos", repo.owner.as_str(), repo.name.as_str()]
                .into_iter()
                .chain(rest),
        )
    }

    fn ref_url(&self, repo: &RepoRef, branch: &str) -> Result<Url> {
        self.repo_url(
            repo,
            ["git", "refs", "heads"].into_iter().chain(branch.split('/')),
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        check(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json::<T>().await?)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiMessage>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });
    debug!(status = status.as_u16(), %message, "GitHub request failed");
    if status == StatusCode::NOT_FOUND {
        return Err(GitHubError::NotFound(message));
    }
    Err(GitHubError::Api {
        status: status.as_u16(),
        message,
    })
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    rate: RateLimit,
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    tree: ShaResponse,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| GitHubError::Decode(format!("file content is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| GitHubError::Decode("file content is not UTF-8".to_string()))
}

#[async_trait]
impl GitHost for GitHubClient {
    async fn authenticate(&self) -> Result<GitHubUser> {
        let url = self.url(["user"])?;
        self.send_json(self.http.get(url)).await
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        let url = self.url(["rate_limit"])?;
        let body: RateLimitResponse = self.send_json(self.http.get(url)).await?;
        Ok(body.rate)
    }

    async fn get_repo(&self, repo: &RepoRef) -> Result<GitHubRepo> {
        let url = self.url(["repos", repo.owner.as_str(), repo.name.as_str()])?;
        self.send_json(self.http.get(url)).await
    }

    async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<BranchSummary>> {
        let url = self.repo_url(repo, ["branches"])?;
        self.send_json(self.http.get(url).query(&[("per_page", BRANCH_PAGE_SIZE)]))
            .await
    }

    async fn get_branch(&self, repo: &RepoRef, branch: &str) -> Result<BranchTip> {
        let url = self.repo_url(repo, ["branches"].into_iter().chain(branch.split('/')))?;
        let body: BranchResponse = self.send_json(self.http.get(url)).await?;
        Ok(BranchTip {
            commit_sha: body.commit.sha,
            tree_sha: body.commit.commit.tree.sha,
        })
    }

    async fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()> {
        let url = self.repo_url(repo, ["git", "refs"])?;
        let payload = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        self.send(self.http.post(url).json(&payload)).await?;
        Ok(())
    }

    async fn delete_ref(&self, repo: &RepoRef, branch: &str) -> Result<()> {
        let url = self.ref_url(repo, branch)?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn update_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()> {
        let url = self.ref_url(repo, branch)?;
        let payload = json!({ "sha": sha, "force": false });
        self.send(self.http.patch(url).json(&payload)).await?;
        Ok(())
    }

    async fn get_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContents>> {
        let url = self.repo_url(repo, ["contents"].into_iter().chain(path.split('/')))?;
        let request = self.http.get(url).query(&[("ref", branch)]);
        let body: ContentsResponse = match self.send_json(request).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(FileContents {
            content: decode_content(&body.content)?,
            sha: body.sha,
        }))
    }

    async fn create_file(&self, repo: &RepoRef, write: FileWrite<'_>) -> Result<()> {
        let url = self.repo_url(repo, ["contents"].into_iter().chain(write.path.split('/')))?;
        let payload = json!({
            "message": write.message,
            "content": STANDARD.encode(write.content),
            "branch": write.branch,
        });
        self.send(self.http.put(url).json(&payload)).await?;
        Ok(())
    }

    async fn update_file(&self, repo: &RepoRef, write: FileWrite<'_>, sha: &str) -> Result<()> {
        let url = self.repo_url(repo, ["contents"].into_iter().chain(write.path.split('/')))?;
        let payload = json!({
            "message": write.message,
            "content": STANDARD.encode(write.content),
            "branch": write.branch,
            "sha": sha,
        });
        self.send(self.http.put(url).json(&payload)).await?;
        Ok(())
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<String> {
        let url = self.repo_url(repo, ["git", "blobs"])?;
        let payload = json!({ "content": content, "encoding": "utf-8" });
        let body: ShaResponse = self.send_json(self.http.post(url).json(&payload)).await?;
        Ok(body.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String> {
        let url = self.repo_url(repo, ["git", "trees"])?;
        let tree: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "path": entry.path,
                    "mode": "100644",
                    "type": "blob",
                    "sha": entry.sha,
                })
            })
            .collect();
        let payload = json!({ "base_tree": base_tree, "tree": tree });
        let body: ShaResponse = self.send_json(self.http.post(url).json(&payload)).await?;
        Ok(body.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String> {
        let url = self.repo_url(repo, ["git", "commits"])?;
        let payload = json!({ "message": message, "tree": tree, "parents": parents });
        let body: ShaResponse = self.send_json(self.http.post(url).json(&payload)).await?;
        Ok(body.sha)
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pr: &NewPullRequest,
    ) -> Result<PullRequest> {
        let url = self.repo_url(repo, ["pulls"])?;
        self.send_json(self.http.post(url).json(pr)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(
            Url::parse(base).expect("base url"),
            "ghp_test",
            DEFAULT_USER_AGENT,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[test]
    fn urls_are_built_under_the_api_base() {
        let repo = RepoRef::new("acme", "widgets");

        let public = client(DEFAULT_API_BASE);
        assert_eq!(
            public.ref_url(&repo, "feature/x").expect("url").as_str(),
            "https://api.github.com/repos/acme/widgets/git/refs/heads/feature/x"
        );

        let enterprise = client("https://git.example.com/api/v3/");
        assert_eq!(
            enterprise
                .repo_url(&repo, ["contents", "docs", "read me.md"])
                .expect("url")
                .as_str(),
            "https://git.example.com/api/v3/repos/acme/widgets/contents/docs/read%20me.md"
        );
    }

    #[test]
    fn content_decoding_tolerates_line_breaks() {
        let encoded = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_content(encoded).expect("decode"), "hello world");
        assert!(decode_content("!!!").is_err());
    }

    #[test]
    fn invalid_token_is_rejected_before_any_request() {
        let result = GitHubClient::new(
            Url::parse(DEFAULT_API_BASE).expect("base url"),
            "bad\ntoken",
            DEFAULT_USER_AGENT,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(GitHubError::InvalidToken)));
    }
}
