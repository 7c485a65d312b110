use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: &'static str,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatMessage,
}

/// Any created object we only need the identifier of (threads, thread messages).
#[derive(Debug, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMessageRequest<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RunObject {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,

    #[serde(other)]
    Unknown,
}
impl RunStatus {
    /// Statuses that still resolve to a terminal one and are worth another
    /// poll. Cancelling counts: it always ends in Cancelled.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageListResponse {
    pub data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: Vec<ThreadMessageContent>,
}
impl ThreadMessage {
    /// First text block, ignoring attachments and other content kinds.
    pub fn into_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            ThreadMessageContent::Text { text } => Some(text.value),
            ThreadMessageContent::Unsupported => None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadMessageContent {
    Text { text: TextValue },

    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct TextValue {
    pub value: String,
}
