use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("role must be either \"user\" or \"assistant\", got {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for ChatRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// One entry of a task's conversation. `timestamp` is seconds since the
/// Unix epoch with sub-second precision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: f64,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            role,
            content: content.into(),
            timestamp: now.timestamp_millis() as f64 / 1000.0,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }
}

/// The task prompt is the first user message in the conversation.
pub fn first_user_prompt(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!("user".parse::<ChatRole>(), Ok(ChatRole::User));
        assert_eq!("assistant".parse::<ChatRole>(), Ok(ChatRole::Assistant));
        assert!("system".parse::<ChatRole>().is_err());
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn prompt_is_first_user_message() {
        let messages = vec![
            ChatMessage::new(ChatRole::Assistant, "hello"),
            ChatMessage::user("add a README"),
            ChatMessage::user("and a LICENSE"),
        ];
        assert_eq!(first_user_prompt(&messages), Some("add a README"));
        assert_eq!(first_user_prompt(&[]), None);
    }
}
