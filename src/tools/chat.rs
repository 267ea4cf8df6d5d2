//! Conversation handler and its history store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SearchEngine, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Where conversations are kept between calls.
pub trait ChatStore: Send + Sync {
    /// Messages of `chat_id`, oldest first.
    fn history(&self, chat_id: &str) -> Vec<ChatMessage>;

    fn append(&self, chat_id: &str, message: ChatMessage);
}

/// Process-local store; history is lost on exit.
#[derive(Default)]
pub struct InMemoryChatStore {
    chats: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for InMemoryChatStore {
    fn history(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.chats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    fn append(&self, chat_id: &str, message: ChatMessage) {
        self.chats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(chat_id.to_string())
            .or_default()
            .push(message);
    }
}

/// Conversations kept in one JSON file, so a chat can be continued by a
/// later process. Read and write failures are logged and treated as an
/// empty history.
pub struct FileChatStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileChatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, Vec<ChatMessage>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("Could not read chat history {}: {}", self.path.display(), e);
                return HashMap::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Ignoring malformed chat history {}: {}", self.path.display(), e);
            HashMap::new()
        })
    }

    fn write_all(&self, chats: &HashMap<String, Vec<ChatMessage>>) {
        let result = serde_json::to_string_pretty(chats)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(&self.path, json)
            });
        if let Err(e) = result {
            warn!("Could not save chat history {}: {}", self.path.display(), e);
        }
    }
}

impl ChatStore for FileChatStore {
    fn history(&self, chat_id: &str) -> Vec<ChatMessage> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_all().remove(chat_id).unwrap_or_default()
    }

    fn append(&self, chat_id: &str, message: ChatMessage) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut chats = self.read_all();
        chats.entry(chat_id.to_string()).or_default().push(message);
        self.write_all(&chats);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub chat_id: String,
    pub answer: String,
}

/// Render the transcript followed by the new message.
pub fn build_conversation_prompt(history: &[ChatMessage], message: &str) -> String {
    let mut prompt = String::new();
    for msg in history {
        match msg.role {
            ChatRole::User => prompt.push_str(&format!("User: {}\n", msg.content)),
            ChatRole::Assistant => prompt.push_str(&format!("Assistant: {}\n", msg.content)),
        }
    }
    prompt.push_str(&format!("User: {}\n", message));
    prompt
}

/// Continue (or start, without `chat_id`) a conversation.
pub async fn handle_chat(
    engine: &dyn SearchEngine,
    store: &dyn ChatStore,
    message: &str,
    chat_id: Option<&str>,
) -> Result<ChatReply, ToolError> {
    let chat_id = chat_id
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let history = store.history(&chat_id);
    debug!("Chat {} has {} earlier messages", chat_id, history.len());
    store.append(&chat_id, ChatMessage::user(message));

    let prompt = build_conversation_prompt(&history, message);
    let answer = engine.perform_search(&prompt).await?;
    store.append(&chat_id, ChatMessage::assistant(answer.clone()));

    Ok(ChatReply { chat_id, answer })
}
