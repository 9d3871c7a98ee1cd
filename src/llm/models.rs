use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

// Anything that is not a known role is treated as the user speaking.
impl From<String> for ChatRole {
    fn from(role: String) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "system" => ChatRole::System,
            "assistant" => ChatRole::Assistant,
            _ => ChatRole::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Input for one chat completion. Unset controls fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Self::default() }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Keeps the first system message and the last `max_messages` others.
pub fn limit_history(messages: &[ChatMessage], max_messages: usize) -> Vec<ChatMessage> {
    let system = messages.iter().find(|msg| msg.role == ChatRole::System);
    let others: Vec<&ChatMessage> = messages.iter().filter(|msg| msg.role != ChatRole::System).collect();
    let skip = others.len().saturating_sub(max_messages);

    system
        .into_iter()
        .chain(others.into_iter().skip(skip))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_become_user() {
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"tool","content":"x"}"#).expect("message");
        assert_eq!(msg.role, ChatRole::User);
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"assistant"}"#).expect("message");
        assert_eq!(msg, ChatMessage::assistant(""));
    }

    #[test]
    fn history_keeps_leading_system_and_latest_turns() {
        let mut history = vec![ChatMessage::system("règles")];
        for i in 0..8 {
            history.push(ChatMessage::user(format!("q{i}")));
        }
        let limited = limit_history(&history, 5);
        assert_eq!(limited.len(), 6);
        assert_eq!(limited[0].role, ChatRole::System);
        assert_eq!(limited[1].content, "q3");
        assert_eq!(limited[5].content, "q7");
    }
}
