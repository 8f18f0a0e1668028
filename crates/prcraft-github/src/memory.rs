//! In-memory [`GitHost`] with content-addressed objects and fault
//! injection. Used by tests across the workspace; clones share state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{GitHubError, Result};
use crate::host::{GitHost, GitHostFactory};
use crate::repo::RepoRef;
use crate::types::{
    BranchSummary, BranchTip, FileContents, FileWrite, GitHubRepo, GitHubUser, NewPullRequest,
    PullRequest, RateLimit, RepoPermissions, TreeEntry,
};

/// A remote operation forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    RateLimit,
    ListBranches,
    GetBranch,
    /// `create_ref` answers 403 "Resource not accessible by integration".
    CreateRefDenied,
    /// `create_ref` creates the ref, then reports a transport error.
    CreateRefAmbiguous,
    DeleteRef,
    UpdateRef,
    GetContents,
    CreateBlob,
    CreateTree,
    CreateCommit,
    CreatePullRequest,
}

#[derive(Debug, Clone)]
enum Object {
    Blob(String),
    Tree(BTreeMap<String, String>),
    Commit { tree: String, parents: Vec<String> },
}

#[derive(Debug)]
struct State {
    user: Option<String>,
    repo: GitHubRepo,
    objects: HashMap<String, Object>,
    refs: BTreeMap<String, String>,
    faults: HashSet<Fault>,
    failing_paths: HashSet<String>,
    /// Applied just before the next `update_ref`, as another writer would.
    racing_writes: Vec<(String, String, String)>,
    pulls: Vec<NewPullRequest>,
    calls: Vec<String>,
    tokens: Vec<String>,
}

fn object_id(kind: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(40);
    id
}

fn api(status: u16, message: &str) -> GitHubError {
    GitHubError::Api {
        status,
        message: message.to_string(),
    }
}

fn injected(op: &str) -> GitHubError {
    api(500, &format!("injected failure: {op}"))
}

impl State {
    fn store(&mut self, object: Object) -> String {
        let id = match &object {
            Object::Blob(content) => object_id("blob", content),
            Object::Tree(entries) => {
                let listing: String = entries
                    .iter()
                    .map(|(path, sha)| format!("{path} {sha}\n"))
                    .collect();
                object_id("tree", &listing)
            }
            Object::Commit { tree, parents } => {
                let nonce = self.objects.len();
                object_id("commit", &format!("{tree} {} {nonce}", parents.join(",")))
            }
        };
        self.objects.insert(id.clone(), object);
        id
    }

    fn check_repo(&self, repo: &RepoRef) -> Result<()> {
        if repo.full_name() == self.repo.full_name {
            Ok(())
        } else {
            Err(GitHubError::NotFound("Not Found".to_string()))
        }
    }

    fn check_fault(&self, fault: Fault, op: &str) -> Result<()> {
        if self.faults.contains(&fault) {
            Err(injected(op))
        } else {
            Ok(())
        }
    }

    fn tree_of_commit(&self, commit: &str) -> Option<(&String, &BTreeMap<String, String>)> {
        let Some(Object::Commit { tree, .. }) = self.objects.get(commit) else {
            return None;
        };
        match self.objects.get(tree) {
            Some(Object::Tree(entries)) => Some((tree, entries)),
            _ => None,
        }
    }

    fn files_at(&self, branch: &str) -> Option<&BTreeMap<String, String>> {
        let tip = self.refs.get(branch)?;
        self.tree_of_commit(tip).map(|(_, entries)| entries)
    }

    fn blob(&self, sha: &str) -> Option<&str> {
        match self.objects.get(sha) {
            Some(Object::Blob(content)) => Some(content),
            _ => None,
        }
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut stack = vec![descendant.to_string()];
        let mut seen = HashSet::new();
        while let Some(sha) = stack.pop() {
            if sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(Object::Commit { parents, .. }) = self.objects.get(&sha) {
                stack.extend(parents.iter().cloned());
            }
        }
        false
    }

    /// Commits `path = content` on top of `branch`, as the contents API does.
    fn write_file(&mut self, branch: &str, path: &str, content: &str) -> Result<()> {
        let tip = self
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(format!("Branch {branch} not found")))?;
        let mut entries = self
            .tree_of_commit(&tip)
            .map(|(_, entries)| entries.clone())
            .unwrap_or_default();
        let blob = self.store(Object::Blob(content.to_string()));
        entries.insert(path.to_string(), blob);
        let tree = self.store(Object::Tree(entries));
        let commit = self.store(Object::Commit {
            tree,
            parents: vec![tip],
        });
        self.refs.insert(branch.to_string(), commit);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<State>>,
}

impl MemoryHost {
    /// A repository `full_name` whose `main` branch holds `README.md`.
    pub fn new(user: &str, full_name: &str) -> Self {
        let mut state = State {
            user: Some(user.to_string()),
            repo: GitHubRepo {
                full_name: full_name.to_string(),
                private: false,
                default_branch: "main".to_string(),
                permissions: None,
            },
            objects: HashMap::new(),
            refs: BTreeMap::new(),
            faults: HashSet::new(),
            failing_paths: HashSet::new(),
            racing_writes: Vec::new(),
            pulls: Vec::new(),
            calls: Vec::new(),
            tokens: Vec::new(),
        };
        let blob = state.store(Object::Blob("# widgets\n".to_string()));
        let tree = state.store(Object::Tree(BTreeMap::from([(
            "README.md".to_string(),
            blob,
        )])));
        let root = state.store(Object::Commit {
            tree,
            parents: Vec::new(),
        });
        state.refs.insert("main".to_string(), root);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: String) -> MutexGuard<'_, State> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    pub fn repo(&self) -> RepoRef {
        let full_name = self.lock().repo.full_name.clone();
        let (owner, name) = full_name.split_once('/').unwrap_or((full_name.as_str(), ""));
        RepoRef::new(owner, name)
    }

    pub fn set_user(&self, user: Option<&str>) {
        self.lock().user = user.map(str::to_string);
    }

    pub fn set_permissions(&self, permissions: Option<RepoPermissions>) {
        self.lock().repo.permissions = permissions;
    }

    pub fn set_private(&self, private: bool) {
        self.lock().repo.private = private;
    }

    pub fn fail(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    /// Makes contents-API writes to `path` fail.
    pub fn fail_path(&self, path: &str) {
        self.lock().failing_paths.insert(path.to_string());
    }

    /// Moves `branch` with a commit of `path = content` right before the
    /// next ref update, so that update is no longer a fast forward.
    pub fn race_ref_update(&self, branch: &str, path: &str, content: &str) {
        self.lock().racing_writes.push((
            branch.to_string(),
            path.to_string(),
            content.to_string(),
        ));
    }

    /// Commits a file directly onto `branch`, bypassing faults and the call log.
    pub fn seed_file(&self, branch: &str, path: &str, content: &str) -> Result<()> {
        self.lock().write_file(branch, path, content)
    }

    pub fn branches(&self) -> Vec<String> {
        self.lock().refs.keys().cloned().collect()
    }

    pub fn branch_tip(&self, branch: &str) -> Option<String> {
        self.lock().refs.get(branch).cloned()
    }

    pub fn commit_parents(&self, sha: &str) -> Vec<String> {
        match self.lock().objects.get(sha) {
            Some(Object::Commit { parents, .. }) => parents.clone(),
            _ => Vec::new(),
        }
    }

    pub fn file_at(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        let sha = state.files_at(branch)?.get(path)?;
        state.blob(sha).map(str::to_string)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn pull_requests(&self) -> Vec<NewPullRequest> {
        self.lock().pulls.clone()
    }

    /// Tokens passed to [`GitHostFactory::connect`], in order.
    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }
}

impl GitHostFactory for MemoryHost {
    fn connect(&self, token: &str) -> Result<Arc<dyn GitHost>> {
        self.lock().tokens.push(token.to_string());
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl GitHost for MemoryHost {
    async fn authenticate(&self) -> Result<GitHubUser> {
        let state = self.record("authenticate".to_string());
        match &state.user {
            Some(login) => Ok(GitHubUser {
                login: login.clone(),
            }),
            None => Err(api(401, "Bad credentials")),
        }
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        let state = self.record("rate_limit".to_string());
        state.check_fault(Fault::RateLimit, "rate_limit")?;
        Ok(RateLimit {
            limit: 5000,
            remaining: 4999,
        })
    }

    async fn get_repo(&self, repo: &RepoRef) -> Result<GitHubRepo> {
        let state = self.record(format!("get_repo {repo}"));
        state.check_repo(repo)?;
        Ok(state.repo.clone())
    }

    async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<BranchSummary>> {
        let state = self.record(format!("list_branches {repo}"));
        state.check_repo(repo)?;
        state.check_fault(Fault::ListBranches, "list_branches")?;
        Ok(state
            .refs
            .keys()
            .map(|name| BranchSummary { name: name.clone() })
            .collect())
    }

    async fn get_branch(&self, repo: &RepoRef, branch: &str) -> Result<BranchTip> {
        let state = self.record(format!("get_branch {branch}"));
        state.check_repo(repo)?;
        state.check_fault(Fault::GetBranch, "get_branch")?;
        let commit = state
            .refs
            .get(branch)
            .ok_or_else(|| GitHubError::NotFound("Branch not found".to_string()))?;
        let (tree, _) = state
            .tree_of_commit(commit)
            .ok_or_else(|| api(500, "dangling branch"))?;
        Ok(BranchTip {
            commit_sha: commit.clone(),
            tree_sha: tree.clone(),
        })
    }

    async fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()> {
        let mut state = self.record(format!("create_ref {branch}"));
        state.check_repo(repo)?;
        if state.faults.contains(&Fault::CreateRefDenied) {
            return Err(api(403, "Resource not accessible by integration"));
        }
        if state.refs.contains_key(branch) {
            return Err(api(422, "Reference already exists"));
        }
        if !matches!(state.objects.get(sha), Some(Object::Commit { .. })) {
            return Err(api(422, "Object does not exist"));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        if state.faults.contains(&Fault::CreateRefAmbiguous) {
            return Err(GitHubError::Transport("connection reset by peer".to_string()));
        }
        Ok(())
    }

    async fn delete_ref(&self, repo: &RepoRef, branch: &str) -> Result<()> {
        let mut state = self.record(format!("delete_ref {branch}"));
        state.check_repo(repo)?;
        state.check_fault(Fault::DeleteRef, "delete_ref")?;
        state
            .refs
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| api(422, "Reference does not exist"))
    }

    async fn update_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()> {
        let mut state = self.record(format!("update_ref {branch}"));
        state.check_repo(repo)?;
        state.check_fault(Fault::UpdateRef, "update_ref")?;
        for (racing_branch, path, content) in std::mem::take(&mut state.racing_writes) {
            state.write_file(&racing_branch, &path, &content)?;
        }
        let current = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| api(422, "Reference does not exist"))?;
        if !state.is_ancestor(&current, sha) {
            return Err(api(422, "Update is not a fast forward"));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn get_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContents>> {
        let state = self.record(format!("get_contents {path}@{branch}"));
        state.check_repo(repo)?;
        state.check_fault(Fault::GetContents, "get_contents")?;
        let Some(sha) = state.files_at(branch).and_then(|files| files.get(path)) else {
            return Ok(None);
        };
        Ok(state.blob(sha).map(|content| FileContents {
            content: content.to_string(),
            sha: sha.clone(),
        }))
    }

    async fn create_file(&self, repo: &RepoRef, write: FileWrite<'_>) -> Result<()> {
        let mut state = self.record(format!("create_file {}", write.path));
        state.check_repo(repo)?;
        if state.failing_paths.contains(write.path) {
            return Err(injected("create_file"));
        }
        if state
            .files_at(write.branch)
            .is_some_and(|files| files.contains_key(write.path))
        {
            return Err(api(422, "\"sha\" wasn't supplied."));
        }
        state.write_file(write.branch, write.path, write.content)
    }

    async fn update_file(&self, repo: &RepoRef, write: FileWrite<'_>, sha: &str) -> Result<()> {
        let mut state = self.record(format!("update_file {}", write.path));
        state.check_repo(repo)?;
        if state.failing_paths.contains(write.path) {
            return Err(injected("update_file"));
        }
        let current = state
            .files_at(write.branch)
            .and_then(|files| files.get(write.path))
            .cloned();
        if current.as_deref() != Some(sha) {
            return Err(api(409, &format!("{} does not match {sha}", write.path)));
        }
        state.write_file(write.branch, write.path, write.content)
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<String> {
        let mut state = self.record("create_blob".to_string());
        state.check_repo(repo)?;
        state.check_fault(Fault::CreateBlob, "create_blob")?;
        Ok(state.store(Object::Blob(content.to_string())))
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String> {
        let mut state = self.record(format!("create_tree {} entries", entries.len()));
        state.check_repo(repo)?;
        state.check_fault(Fault::CreateTree, "create_tree")?;
        let Some(Object::Tree(base)) = state.objects.get(base_tree) else {
            return Err(api(422, "base_tree is not a tree"));
        };
        let mut tree = base.clone();
        for entry in entries {
            if state.blob(&entry.sha).is_none() {
                return Err(api(422, &format!("{} is not a blob", entry.sha)));
            }
            tree.insert(entry.path.clone(), entry.sha.clone());
        }
        Ok(state.store(Object::Tree(tree)))
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        _message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String> {
        let mut state = self.record("create_commit".to_string());
        state.check_repo(repo)?;
        state.check_fault(Fault::CreateCommit, "create_commit")?;
        if !matches!(state.objects.get(tree), Some(Object::Tree(_))) {
            return Err(api(422, "tree is not a tree"));
        }
        if parents
            .iter()
            .any(|p| !matches!(state.objects.get(p), Some(Object::Commit { .. })))
        {
            return Err(api(422, "parent is not a commit"));
        }
        Ok(state.store(Object::Commit {
            tree: tree.to_string(),
            parents: parents.to_vec(),
        }))
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        pr: &NewPullRequest,
    ) -> Result<PullRequest> {
        let mut state = self.record(format!("create_pull_request {}", pr.head));
        state.check_repo(repo)?;
        state.check_fault(Fault::CreatePullRequest, "create_pull_request")?;
        if !state.refs.contains_key(&pr.head) || !state.refs.contains_key(&pr.base) {
            return Err(api(422, "Validation Failed"));
        }
        state.pulls.push(pr.clone());
        let number = state.pulls.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/{}/pull/{number}", state.repo.full_name),
        })
    }
}
