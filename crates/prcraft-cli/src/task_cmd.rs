use anyhow::{bail, Context};
use std::path::Path;

use prcraft_config::Config;
use prcraft_storage::{Database, TaskRepository, TaskStore};
use prcraft_types::NewTask;

use crate::cli::TaskCommands;

pub(crate) async fn handle_task_command(
    config: &Config,
    action: TaskCommands,
) -> anyhow::Result<()> {
    let db = Database::new(&config.database_path()).await?;
    let store = TaskRepository::new(db.pool().clone());

    match action {
        TaskCommands::Import { file, user } => {
            let tasks = read_tasks(&file, user.as_deref())?;
            for task in tasks {
                let created = store.create(task).await?;
                println!(
                    "imported task {} ({}, {})",
                    created.id, created.user_id, created.status
                );
            }
        }
        TaskCommands::List { user, project_id } => {
            let tasks = store.list(&user, project_id).await?;
            if tasks.is_empty() {
                println!("no tasks for {}", user);
            }
            for task in tasks {
                let pr = task.pr_url.as_deref().unwrap_or("-");
                println!("{:>6}  {:<10} {}  {}", task.id, task.status.as_str(), task.repo_url, pr);
            }
        }
    }
    Ok(())
}

/// Accepts one task object or an array of them. `user` fills in or
/// overrides each task's owner.
fn read_tasks(path: &Path, user: Option<&str>) -> anyhow::Result<Vec<NewTask>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file: {:?}", path))?;
    parse_tasks(&content, user).with_context(|| format!("Invalid task file: {:?}", path))
}

fn parse_tasks(content: &str, user: Option<&str>) -> anyhow::Result<Vec<NewTask>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => bail!("expected a task object or an array of tasks"),
    };

    items
        .into_iter()
        .map(|mut item| {
            if let (Some(user), Some(object)) = (user, item.as_object_mut()) {
                object.insert("user_id".to_string(), serde_json::json!(user));
            }
            serde_json::from_value(item).map_err(anyhow::Error::from)
        })
        .collect()
}
