// ============================================================================
// SQLite Schema Definitions
// ============================================================================

/// Tasks table - one row per AI coding task and its stored patch
pub const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    project_id INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    repo_url TEXT NOT NULL,
    target_branch TEXT NOT NULL DEFAULT 'main',
    agent TEXT NOT NULL DEFAULT 'claude',

    -- Agent output
    git_diff TEXT,
    git_patch TEXT,
    commit_hash TEXT,
    changed_files TEXT NOT NULL DEFAULT '[]',
    error TEXT,

    -- Conversation (JSON array of {role, content, timestamp})
    chat_messages TEXT NOT NULL DEFAULT '[]',

    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

// Pull request bookkeeping was added after the first release.
pub const ADD_TASK_PR_BRANCH: &str = "ALTER TABLE tasks ADD COLUMN pr_branch TEXT";
pub const ADD_TASK_PR_NUMBER: &str = "ALTER TABLE tasks ADD COLUMN pr_number INTEGER";
pub const ADD_TASK_PR_URL: &str = "ALTER TABLE tasks ADD COLUMN pr_url TEXT";

pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
CREATE INDEX IF NOT EXISTS idx_tasks_user_project ON tasks(user_id, project_id);
"#;

pub const ALL_MIGRATIONS: &[&str] = &[
    CREATE_TASKS_TABLE,
    ADD_TASK_PR_BRANCH,
    ADD_TASK_PR_NUMBER,
    ADD_TASK_PR_URL,
    CREATE_INDEXES,
];
