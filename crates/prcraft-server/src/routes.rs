use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use prcraft_github::AccessGuard;
use prcraft_types::{ChatRole, Task, TaskStatus, TaskUpdate};

use crate::publish::{PublishOutcome, Publisher, PullRequestText};
use crate::{ApiError, Result, ServerState};

pub const USER_ID_HEADER: &str = "x-user-id";

const PREVIEW_CHARS: usize = 50;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/health", get(health))
        .route("/validate-token", post(validate_token))
        .route("/create-pr/{task_id}", post(create_pull_request))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{task_id}", get(get_task))
        .route("/tasks/{task_id}/chat", post(add_chat_message))
        .route("/task-status/{task_id}", get(task_status))
        .route("/git-diff/{task_id}", get(git_diff))
}

/// The caller's identity, taken from the `X-User-ID` header.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
            .ok_or_else(|| ApiError::BadRequest("User ID required".to_string()))
    }
}

/// `None` for an empty body.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

async fn find_task(state: &ServerState, task_id: i64, user: &UserId) -> Result<Task> {
    state
        .store
        .get(task_id, &user.0)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ValidateTokenRequest {
    github_token: Option<String>,
    repo_url: Option<String>,
}

async fn validate_token(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let request: ValidateTokenRequest = parse_body(&body)?.unwrap_or_default();
    let token = required(request.github_token, "github_token is required")?;

    let host = state
        .hosts
        .connect(&token)
        .map_err(|e| ApiError::Auth(format!("Token validation failed: {e}")))?;
    let report = AccessGuard::new(host.as_ref(), state.settings.probe_prefix.clone())
        .probe(request.repo_url.as_deref())
        .await?;

    let repo = match &report.repo {
        Some(repo) => json!(repo),
        None => json!({}),
    };
    Ok(Json(json!({
        "status": "success",
        "user": report.user,
        "repo": repo,
        "message": "Token is valid and has repository access",
    })))
}

#[derive(Debug, Default, Deserialize)]
struct CreatePullRequestBody {
    title: Option<String>,
    body: Option<String>,
    github_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePullRequestResponse {
    status: &'static str,
    pr_url: String,
    pr_number: u64,
    branch: String,
    files_updated: usize,
    files_expected: usize,
}

impl From<PublishOutcome> for CreatePullRequestResponse {
    fn from(outcome: PublishOutcome) -> Self {
        Self {
            status: if outcome.is_partial() {
                "partial"
            } else {
                "success"
            },
            pr_url: outcome.pr_url,
            pr_number: outcome.pr_number,
            branch: outcome.branch,
            files_updated: outcome.files_updated,
            files_expected: outcome.files_expected,
        }
    }
}

async fn create_pull_request(
    State(state): State<Arc<ServerState>>,
    user: UserId,
    Path(task_id): Path<i64>,
    body: Bytes,
) -> Result<Json<CreatePullRequestResponse>> {
    info!(task_id, "pull request requested");
    let task = find_task(&state, task_id, &user).await?;

    if task.status != TaskStatus::Completed {
        return Err(ApiError::BadRequest("Task not completed yet".to_string()));
    }
    if task.patch().is_none() {
        return Err(ApiError::BadRequest(
            "No patch data available for this task".to_string(),
        ));
    }

    let request: CreatePullRequestBody = parse_body(&body)?.unwrap_or_default();
    let token = required(request.github_token, "github_token is required")?;
    let host = state
        .hosts
        .connect(&token)
        .map_err(|e| ApiError::Auth(e.to_string()))?;

    let outcome = Publisher::new(host.as_ref(), &state.settings)
        .publish(
            &task,
            PullRequestText {
                title: request.title,
                body: request.body,
            },
        )
        .await?;

    let update = TaskUpdate::pull_request(&outcome.branch, outcome.pr_number, &outcome.pr_url);
    match state.store.update(task_id, &user.0, update).await {
        Ok(Some(_)) => {}
        Ok(None) => warn!(task_id, "task disappeared before recording its pull request"),
        Err(e) => warn!(task_id, error = %e, "failed to record pull request on task"),
    }

    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    project_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct TaskSummary {
    id: i64,
    status: TaskStatus,
    created_at: chrono::DateTime<chrono::Utc>,
    prompt: String,
    has_patch: bool,
    project_id: Option<i64>,
    repo_url: String,
    agent: String,
    chat_messages: Vec<prcraft_types::ChatMessage>,
}

fn preview(prompt: &str) -> String {
    if prompt.chars().count() > PREVIEW_CHARS {
        let head: String = prompt.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        prompt.to_string()
    }
}

impl From<Task> for TaskSummary {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            created_at: task.created_at,
            prompt: preview(task.prompt()),
            has_patch: task.patch().is_some(),
            project_id: task.project_id,
            repo_url: task.repo_url,
            agent: task.agent,
            chat_messages: task.chat_messages,
        }
    }
}

async fn list_tasks(
    State(state): State<Arc<ServerState>>,
    user: UserId,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<serde_json::Value>> {
    let tasks = state.store.list(&user.0, query.project_id).await?;
    let total = tasks.len();
    let tasks: BTreeMap<String, TaskSummary> = tasks
        .into_iter()
        .map(|task| (task.id.to_string(), TaskSummary::from(task)))
        .collect();

    Ok(Json(json!({
        "status": "success",
        "tasks": tasks,
        "total_tasks": total,
    })))
}

async fn get_task(
    State(state): State<Arc<ServerState>>,
    user: UserId,
    Path(task_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let task = find_task(&state, task_id, &user).await?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

async fn task_status(
    State(state): State<Arc<ServerState>>,
    user: UserId,
    Path(task_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let task = find_task(&state, task_id, &user).await?;
    info!(task_id, status = %task.status, "task status polled");

    Ok(Json(json!({
        "status": "success",
        "task": {
            "id": task.id,
            "status": task.status,
            "prompt": task.prompt(),
            "repo_url": task.repo_url,
            "branch": task.target_branch,
            "model": task.agent,
            "commit_hash": task.commit_hash,
            "changed_files": task.changed_files,
            "error": task.error,
            "created_at": task.created_at,
            "project_id": task.project_id,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    content: Option<String>,
    role: Option<String>,
}

async fn add_chat_message(
    State(state): State<Arc<ServerState>>,
    user: UserId,
    Path(task_id): Path<i64>,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let request: ChatRequest = parse_body(&body)?
        .ok_or_else(|| ApiError::BadRequest("No data provided".to_string()))?;
    let content = request
        .content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("content is required".to_string()))?;
    let role: ChatRole = request
        .role
        .as_deref()
        .unwrap_or("user")
        .parse()
        .map_err(|_| {
            ApiError::BadRequest("role must be either \"user\" or \"assistant\"".to_string())
        })?;

    let task = state
        .store
        .add_chat_message(task_id, &user.0, role, &content)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

async fn git_diff(
    State(state): State<Arc<ServerState>>,
    user: UserId,
    Path(task_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let task = find_task(&state, task_id, &user).await?;
    Ok(Json(json!({
        "status": "success",
        "git_diff": task.git_diff.unwrap_or_default(),
        "task_id": task_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishSettings;
    use crate::server::build_app;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use prcraft_github::memory::{Fault, MemoryHost};
    use prcraft_github::RepoPermissions;
    use prcraft_storage::{Database, TaskRepository, TaskStore};
    use prcraft_types::{ChatMessage, NewTask};
    use serde_json::Value;
    use tower::ServiceExt;

    const PATCH: &str = "\
--- /dev/null
+++ b/a.txt
@@ -0,0 +1 @@
+alpha
--- /dev/null
+++ b/b.txt
@@ -0,0 +1 @@
+beta
--- a/README.md
+++ b/README.md
@@ -1 +1,2 @@
 # widgets
+More.
";

    struct Harness {
        app: Router,
        store: Arc<TaskRepository>,
        host: MemoryHost,
    }

    async fn harness() -> Harness {
        let db = Database::in_memory().await.expect("database");
        let store = Arc::new(TaskRepository::new(db.pool().clone()));
        let host = MemoryHost::new("octocat", "acme/widgets");
        let state = Arc::new(ServerState::new(
            store.clone(),
            Arc::new(host.clone()),
            PublishSettings::default(),
        ));
        Harness {
            app: build_app(state, Vec::new()),
            store,
            host,
        }
    }

    fn new_task(user: &str, status: TaskStatus, patch: Option<&str>) -> NewTask {
        NewTask {
            user_id: user.to_string(),
            project_id: Some(1),
            status,
            repo_url: "https://github.com/acme/widgets".to_string(),
            target_branch: "main".to_string(),
            agent: "claude".to_string(),
            git_diff: Some("diff text".to_string()),
            git_patch: patch.map(str::to_string),
            commit_hash: None,
            changed_files: vec![
                "a.txt".to_string(),
                "b.txt".to_string(),
                "README.md".to_string(),
            ],
            chat_messages: vec![ChatMessage::user(
                "Add the alpha and beta files and extend the readme with more",
            )],
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn post_json(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("X-User-ID", user);
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_as(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("X-User-ID", user)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness().await;
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_pr_commits_every_file_and_records_the_pr() {
        let h = harness().await;
        let task = h
            .store
            .create(new_task("alice", TaskStatus::Completed, Some(PATCH)))
            .await
            .expect("create");

        let (status, body) = send(
            &h.app,
            post_json(
                &format!("/create-pr/{}", task.id),
                Some("alice"),
                json!({ "github_token": "ghp_test" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "success");
        assert_eq!(body["files_updated"], 3);
        assert_eq!(body["files_expected"], 3);
        let branch = format!("prcraft-{}", task.id);
        assert_eq!(body["branch"], branch.as_str());
        assert_eq!(body["pr_url"], "https://github.com/acme/widgets/pull/1");

        assert_eq!(h.host.file_at(&branch, "a.txt").as_deref(), Some("alpha"));
        assert_eq!(
            h.host.file_at(&branch, "README.md").as_deref(),
            Some("# widgets\nMore.")
        );
        assert_eq!(h.host.tokens(), vec!["ghp_test"]);

        let pulls = h.host.pull_requests();
        assert_eq!(
            pulls[0].title,
            "prcraft: Add the alpha and beta files and extend the readme..."
        );

        let stored = h
            .store
            .get(task.id, "alice")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stored.pr_branch.as_deref(), Some(branch.as_str()));
        assert_eq!(stored.pr_number, Some(1));
    }

    #[tokio::test]
    async fn create_pr_reports_partial_success() {
        let h = harness().await;
        h.host.fail(Fault::CreateTree);
        h.host.fail_path("b.txt");
        let task = h
            .store
            .create(new_task("alice", TaskStatus::Completed, Some(PATCH)))
            .await
            .expect("create");

        let (status, body) = send(
            &h.app,
            post_json(
                &format!("/create-pr/{}", task.id),
                Some("alice"),
                json!({ "github_token": "ghp_test", "title": "Custom" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "partial");
        assert_eq!(body["files_updated"], 2);
        assert_eq!(body["files_expected"], 3);
        assert_eq!(h.host.pull_requests()[0].title, "Custom");
    }

    #[tokio::test]
    async fn create_pr_rejects_bad_requests_in_order() {
        let h = harness().await;
        let pending = h
            .store
            .create(new_task("alice", TaskStatus::Running, Some(PATCH)))
            .await
            .expect("create");
        let no_patch = h
            .store
            .create(new_task("alice", TaskStatus::Completed, None))
            .await
            .expect("create");
        let ready = h
            .store
            .create(new_task("alice", TaskStatus::Completed, Some(PATCH)))
            .await
            .expect("create");
        let token = json!({ "github_token": "ghp_test" });

        let (status, body) = send(
            &h.app,
            post_json(&format!("/create-pr/{}", ready.id), None, token.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "User ID required");

        let (status, body) = send(
            &h.app,
            post_json(&format!("/create-pr/{}", ready.id), Some("bob"), token.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found");

        let (status, body) = send(
            &h.app,
            post_json(&format!("/create-pr/{}", pending.id), Some("alice"), token.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Task not completed yet");

        let (status, body) = send(
            &h.app,
            post_json(&format!("/create-pr/{}", no_patch.id), Some("alice"), token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "No patch data available for this task"
        );

        let (status, body) = send(
            &h.app,
            post_json(&format!("/create-pr/{}", ready.id), Some("alice"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "github_token is required");

        assert!(h.host.calls().is_empty());
    }

    #[tokio::test]
    async fn create_pr_with_bad_credentials_is_unauthorized() {
        let h = harness().await;
        h.host.set_user(None);
        let task = h
            .store
            .create(new_task("alice", TaskStatus::Completed, Some(PATCH)))
            .await
            .expect("create");

        let (status, body) = send(
            &h.app,
            post_json(
                &format!("/create-pr/{}", task.id),
                Some("alice"),
                json!({ "github_token": "ghp_revoked" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "auth_error");
        assert!(h.host.branches().iter().all(|b| b == "main"));
    }

    #[tokio::test]
    async fn validate_token_reports_repository_permissions() {
        let h = harness().await;
        h.host.set_permissions(Some(RepoPermissions {
            push: true,
            admin: false,
        }));

        let (status, body) = send(
            &h.app,
            post_json(
                "/validate-token",
                None,
                json!({
                    "github_token": "ghp_test",
                    "repo_url": "git@github.com:acme/widgets.git",
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "success");
        assert_eq!(body["user"], "octocat");
        assert_eq!(body["repo"]["name"], "acme/widgets");
        assert_eq!(body["repo"]["default_branch"], "main");
        assert_eq!(
            body["repo"]["permissions"],
            json!({
                "read": true,
                "read_branches": true,
                "create_branches": true,
                "write": true,
                "admin": false,
            })
        );
        assert_eq!(h.host.branches(), vec!["main"]);
    }

    #[tokio::test]
    async fn validate_token_errors_map_to_status_codes() {
        let h = harness().await;

        let (status, body) = send(&h.app, post_json("/validate-token", None, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "github_token is required");

        let (status, body) = send(
            &h.app,
            post_json("/validate-token", None, json!({ "github_token": "ghp_test" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["repo"], json!({}));

        let (status, body) = send(
            &h.app,
            post_json(
                "/validate-token",
                None,
                json!({
                    "github_token": "ghp_test",
                    "repo_url": "https://github.com/acme/secret",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["user"], "octocat");

        h.host.set_user(None);
        let (status, body) = send(
            &h.app,
            post_json("/validate-token", None, json!({ "github_token": "ghp_test" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"]["message"]
            .as_str()
            .expect("message")
            .starts_with("Token validation failed"));
    }

    #[tokio::test]
    async fn task_routes_are_scoped_to_the_user() {
        let h = harness().await;
        let task = h
            .store
            .create(new_task("alice", TaskStatus::Completed, Some(PATCH)))
            .await
            .expect("create");
        h.store
            .create(new_task("bob", TaskStatus::Completed, None))
            .await
            .expect("create");

        let (status, body) = send(&h.app, get_as("/tasks?project_id=1", "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_tasks"], 1);
        let summary = &body["tasks"][task.id.to_string()];
        assert_eq!(summary["has_patch"], true);
        assert_eq!(
            summary["prompt"],
            "Add the alpha and beta files and extend the readme..."
        );

        let (status, body) = send(&h.app, get_as(&format!("/task-status/{}", task.id), "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["status"], "completed");
        assert_eq!(body["task"]["branch"], "main");

        let (status, body) = send(&h.app, get_as(&format!("/git-diff/{}", task.id), "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["git_diff"], "diff text");

        let (status, _) = send(&h.app, get_as(&format!("/tasks/{}", task.id), "bob")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_messages_are_validated_and_appended() {
        let h = harness().await;
        let task = h
            .store
            .create(new_task("alice", TaskStatus::Completed, None))
            .await
            .expect("create");
        let uri = format!("/tasks/{}/chat", task.id);

        let empty = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("X-User-ID", "alice")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&h.app, empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "No data provided");

        let (status, body) = send(
            &h.app,
            post_json(&uri, Some("alice"), json!({ "content": "hi", "role": "system" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "role must be either \"user\" or \"assistant\""
        );

        let (status, body) = send(
            &h.app,
            post_json(&uri, Some("alice"), json!({ "role": "assistant" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "content is required");

        let (status, body) = send(
            &h.app,
            post_json(&uri, Some("alice"), json!({ "content": "done", "role": "assistant" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let messages = body["task"]["chat_messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["role"], "assistant");
    }
}
