use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{FromRow, SqlitePool};
use tracing::warn;

use prcraft_types::{ChatMessage, ChatRole, NewTask, Task, TaskStatus, TaskUpdate};

use crate::database::DatabaseError;

/// Durable task records. Every call is scoped by the owning user; a task
/// belonging to someone else is reported as absent.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task, DatabaseError>;
    async fn get(&self, task_id: i64, user_id: &str) -> Result<Option<Task>, DatabaseError>;
    async fn list(
        &self,
        user_id: &str,
        project_id: Option<i64>,
    ) -> Result<Vec<Task>, DatabaseError>;
    async fn update(
        &self,
        task_id: i64,
        user_id: &str,
        update: TaskUpdate,
    ) -> Result<Option<Task>, DatabaseError>;
    async fn add_chat_message(
        &self,
        task_id: i64,
        user_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<Option<Task>, DatabaseError>;
}

const TASK_COLUMNS: &str = r#"
    id, user_id, project_id, status, repo_url, target_branch, agent,
    git_diff, git_patch, commit_hash, changed_files, error, chat_messages,
    pr_branch, pr_number, pr_url, created_at, updated_at"#;

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    user_id: String,
    project_id: Option<i64>,
    status: String,
    repo_url: String,
    target_branch: String,
    agent: String,
    git_diff: Option<String>,
    git_patch: Option<String>,
    commit_hash: Option<String>,
    changed_files: String,
    error: Option<String>,
    chat_messages: String,
    pr_branch: Option<String>,
    pr_number: Option<i64>,
    pr_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn into_task(self) -> Task {
        let created_at = DateTime::from_timestamp_millis(self.created_at).unwrap_or_else(Utc::now);
        let updated_at = DateTime::from_timestamp_millis(self.updated_at).unwrap_or_else(Utc::now);

        Task {
            id: self.id,
            user_id: self.user_id,
            project_id: self.project_id,
            status: TaskStatus::parse(&self.status),
            repo_url: self.repo_url,
            target_branch: self.target_branch,
            agent: self.agent,
            git_diff: self.git_diff,
            git_patch: self.git_patch,
            commit_hash: self.commit_hash,
            changed_files: json_column(self.id, "changed_files", &self.changed_files),
            error: self.error,
            chat_messages: json_column(self.id, "chat_messages", &self.chat_messages),
            pr_branch: self.pr_branch,
            pr_number: self.pr_number.and_then(|n| u64::try_from(n).ok()),
            pr_url: self.pr_url,
            created_at,
            updated_at,
        }
    }
}

/// Unreadable JSON reads as empty so one bad row does not hide the task.
fn json_column<T: DeserializeOwned + Default>(task_id: i64, column: &str, raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(task_id, column, error = %e, "corrupt JSON column, reading it as empty");
        T::default()
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::SerializationError(e.to_string()))
}

pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Writes every mutable column of `task` back to its row.
    async fn save(&self, task: &Task) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?, git_diff = ?, git_patch = ?, commit_hash = ?,
                changed_files = ?, error = ?, chat_messages = ?,
                pr_branch = ?, pr_number = ?, pr_url = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(&task.git_diff)
        .bind(&task.git_patch)
        .bind(&task.commit_hash)
        .bind(to_json(&task.changed_files)?)
        .bind(&task.error)
        .bind(to_json(&task.chat_messages)?)
        .bind(&task.pr_branch)
        .bind(task.pr_number.map(|n| n as i64))
        .bind(&task.pr_url)
        .bind(task.updated_at.timestamp_millis())
        .bind(task.id)
        .bind(&task.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task, DatabaseError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                user_id, project_id, status, repo_url, target_branch, agent,
                git_diff, git_patch, commit_hash, changed_files, chat_messages,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.user_id)
        .bind(task.project_id)
        .bind(task.status.as_str())
        .bind(&task.repo_url)
        .bind(&task.target_branch)
        .bind(&task.agent)
        .bind(&task.git_diff)
        .bind(&task.git_patch)
        .bind(&task.commit_hash)
        .bind(to_json(&task.changed_files)?)
        .bind(to_json(&task.chat_messages)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get(id, &task.user_id)
            .await?
            .ok_or_else(|| DatabaseError::QueryError(format!("task {id} vanished after insert")))
    }

    async fn get(&self, task_id: i64, user_id: &str) -> Result<Option<Task>, DatabaseError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(row.map(|r| r.into_task()))
    }

    async fn list(
        &self,
        user_id: &str,
        project_id: Option<i64>,
    ) -> Result<Vec<Task>, DatabaseError> {
        let rows = match project_id {
            Some(pid) => {
                let sql = format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND project_id = ? \
                     ORDER BY created_at DESC, id DESC"
                );
                sqlx::query_as::<_, TaskRow>(&sql)
                    .bind(user_id)
                    .bind(pid)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| DatabaseError::QueryError(e.to_string()))?
            }
            None => {
                let sql = format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? \
                     ORDER BY created_at DESC, id DESC"
                );
                sqlx::query_as::<_, TaskRow>(&sql)
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| DatabaseError::QueryError(e.to_string()))?
            }
        };

        Ok(rows.into_iter().map(|r| r.into_task()).collect())
    }

    async fn update(
        &self,
        task_id: i64,
        user_id: &str,
        update: TaskUpdate,
    ) -> Result<Option<Task>, DatabaseError> {
        let Some(mut task) = self.get(task_id, user_id).await? else {
            return Ok(None);
        };
        update.apply(&mut task);
        self.save(&task).await?;
        Ok(Some(task))
    }

    async fn add_chat_message(
        &self,
        task_id: i64,
        user_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<Option<Task>, DatabaseError> {
        let Some(mut task) = self.get(task_id, user_id).await? else {
            return Ok(None);
        };
        task.chat_messages.push(ChatMessage::new(role, content));
        task.updated_at = Utc::now();
        self.save(&task).await?;
        Ok(Some(task))
    }
}
