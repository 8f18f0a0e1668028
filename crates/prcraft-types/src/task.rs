use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::{first_user_prompt, ChatMessage};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished (or in-flight) AI coding task, as recorded by the task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    pub status: TaskStatus,
    pub repo_url: String,
    pub target_branch: String,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub chat_messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn prompt(&self) -> &str {
        first_user_prompt(&self.chat_messages).unwrap_or_default()
    }

    /// The stored patch, if any non-blank one was recorded.
    pub fn patch(&self) -> Option<&str> {
        self.git_patch
            .as_deref()
            .filter(|patch| !patch.trim().is_empty())
    }
}

/// Fields needed to record a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub user_id: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub status: TaskStatus,
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub target_branch: String,
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default)]
    pub git_diff: Option<String>,
    #[serde(default)]
    pub git_patch: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub chat_messages: Vec<ChatMessage>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_agent() -> String {
    "claude".to_string()
}

/// Sparse update applied by the task store; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

impl TaskUpdate {
    pub fn pull_request(branch: impl Into<String>, number: u64, url: impl Into<String>) -> Self {
        Self {
            pr_branch: Some(branch.into()),
            pr_number: Some(number),
            pr_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(diff) = self.git_diff {
            task.git_diff = Some(diff);
        }
        if let Some(patch) = self.git_patch {
            task.git_patch = Some(patch);
        }
        if let Some(hash) = self.commit_hash {
            task.commit_hash = Some(hash);
        }
        if let Some(files) = self.changed_files {
            task.changed_files = files;
        }
        if let Some(error) = self.error {
            task.error = Some(error);
        }
        if let Some(branch) = self.pr_branch {
            task.pr_branch = Some(branch);
        }
        if let Some(number) = self.pr_number {
            task.pr_number = Some(number);
        }
        if let Some(url) = self.pr_url {
            task.pr_url = Some(url);
        }
        task.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatRole;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: 7,
            user_id: "u1".to_string(),
            project_id: None,
            status: TaskStatus::Completed,
            repo_url: "https://github.com/acme/widgets".to_string(),
            target_branch: "main".to_string(),
            agent: "claude".to_string(),
            git_diff: None,
            git_patch: Some("   \n".to_string()),
            commit_hash: None,
            changed_files: vec![],
            error: None,
            chat_messages: vec![
                ChatMessage::new(ChatRole::Assistant, "ok"),
                ChatMessage::user("fix the build"),
            ],
            pr_branch: None,
            pr_number: None,
            pr_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_parses_known_values_and_defaults_to_pending() {
        assert_eq!(TaskStatus::parse("completed"), TaskStatus::Completed);
        assert_eq!(TaskStatus::parse("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::parse("bogus"), TaskStatus::Pending);
        assert_eq!(
            serde_json::to_value(TaskStatus::Running).expect("serialize"),
            serde_json::json!("running")
        );
    }

    #[test]
    fn blank_patch_counts_as_missing() {
        let task = sample_task();
        assert!(task.patch().is_none());
        assert_eq!(task.prompt(), "fix the build");
    }

    #[test]
    fn update_only_touches_given_fields() {
        let mut task = sample_task();
        TaskUpdate::pull_request("prcraft-7", 12, "https://github.com/acme/widgets/pull/12")
            .apply(&mut task);
        assert_eq!(task.pr_branch.as_deref(), Some("prcraft-7"));
        assert_eq!(task.pr_number, Some(12));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.repo_url, "https://github.com/acme/widgets");
    }
}
