//! Tool handlers: turn tool arguments into prompts for the answer engine.
//!
//! Handlers never return a raw engine error to the caller; [`run_tool`]
//! renders failures into a message the client can show.

pub mod chat;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::BrowserError;
use crate::extract::ExtractionOutcome;

pub use chat::{
    handle_chat, ChatMessage, ChatReply, ChatRole, ChatStore, FileChatStore, InMemoryChatStore,
};

static CODE_CHUNK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s).{1,200}").unwrap());

/// What the handlers need from the engine.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn perform_search(&self, query: &str) -> Result<String, BrowserError>;

    async fn extract_url_content(&self, url: &str, depth: Option<u32>) -> ExtractionOutcome;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Search failed: {0}")]
    Search(#[from] BrowserError),

    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Message shown to the client in place of a failed tool call.
pub fn render_error(error: &ToolError) -> String {
    format!(
        "The operation encountered an error: {}. Please try again.",
        error
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Brief,
    #[default]
    Normal,
    Detailed,
}

impl DetailLevel {
    pub fn prompt(self, query: &str) -> String {
        match self {
            DetailLevel::Brief => format!("Provide a brief, concise answer to: {}", query),
            DetailLevel::Normal => format!(
                "Provide a clear, balanced answer to: {}. Include key points and relevant context.",
                query
            ),
            DetailLevel::Detailed => format!(
                "Provide a comprehensive, detailed analysis of: {}. Include relevant examples, context, and supporting information where applicable.",
                query
            ),
        }
    }
}

impl std::str::FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "brief" => Ok(DetailLevel::Brief),
            "normal" => Ok(DetailLevel::Normal),
            "detailed" => Ok(DetailLevel::Detailed),
            other => Err(format!("unknown detail level: {}", other)),
        }
    }
}

pub async fn handle_search(
    engine: &dyn SearchEngine,
    query: &str,
    detail_level: DetailLevel,
) -> Result<String, ToolError> {
    info!("Searching ({:?}): {}", detail_level, query);
    Ok(engine.perform_search(&detail_level.prompt(query)).await?)
}

pub fn documentation_prompt(query: &str, context: Option<&str>) -> String {
    let focus = match context.filter(|c| !c.is_empty()) {
        Some(c) => format!("Focus on: {}", c),
        None => String::new(),
    };
    format!(
        "Provide comprehensive documentation and usage examples for {}. {} Include:\n\
         1. Basic overview and purpose\n\
         2. Key features and capabilities\n\
         3. Installation/setup if applicable\n\
         4. Common usage examples with code snippets\n\
         5. Best practices and performance considerations\n\
         6. Common pitfalls to avoid\n\
         7. Version compatibility information\n\
         8. Links to official documentation\n\
         9. Community resources (forums, chat channels)\n\
         10. Related tools/libraries that work well with it\n\n\
         Crucially, also provide the main official URL(s) for this documentation on separate lines, prefixed with 'Official URL(s):'.",
        query, focus
    )
}

pub async fn handle_get_documentation(
    engine: &dyn SearchEngine,
    query: &str,
    context: Option<&str>,
) -> Result<String, ToolError> {
    Ok(engine
        .perform_search(&documentation_prompt(query, context))
        .await?)
}

pub fn find_apis_prompt(requirement: &str, context: Option<&str>) -> String {
    let context = match context.filter(|c| !c.is_empty()) {
        Some(c) => format!("Context: {}", c),
        None => String::new(),
    };
    format!(
        "Find and evaluate APIs that could be used for: {}. {} For each API, provide:\n\
         1. Name and brief description\n\
         2. Key features and capabilities\n\
         3. Pricing model and rate limits\n\
         4. Authentication methods\n\
         5. Integration complexity\n\
         6. Documentation quality and examples\n\
         7. Community support and popularity\n\
         8. Any potential limitations or concerns\n\
         9. Code examples for basic usage\n\
         10. Comparison with similar APIs\n\
         11. SDK availability and language support",
        requirement, context
    )
}

pub async fn handle_find_apis(
    engine: &dyn SearchEngine,
    requirement: &str,
    context: Option<&str>,
) -> Result<String, ToolError> {
    Ok(engine
        .perform_search(&find_apis_prompt(requirement, context))
        .await?)
}

/// Leading 200-character chunk of `code`; only that much is sent.
pub fn first_code_chunk(code: &str) -> &str {
    CODE_CHUNK.find(code).map(|m| m.as_str()).unwrap_or(code)
}

pub fn deprecated_code_prompt(chunk: &str, technology: Option<&str>) -> String {
    let tech = technology
        .filter(|t| !t.is_empty())
        .map(|t| format!(" in {}", t))
        .unwrap_or_default();
    format!(
        "Analyze this code for deprecated features or patterns{}:\n\n{}\n\n\
         Please provide:\n\
         1. Identification of deprecated features/methods\n\
         2. Current recommended alternatives\n\
         3. Step-by-step migration guide\n\
         4. Impact assessment of the changes\n\
         5. Deprecation timeline if available\n\
         6. Code examples before/after updating\n\
         7. Performance implications\n\
         8. Backward compatibility considerations\n\
         9. Testing recommendations for the changes",
        tech, chunk
    )
}

pub fn simple_deprecated_code_prompt(chunk: &str, technology: Option<&str>) -> String {
    let tech = technology
        .filter(|t| !t.is_empty())
        .map(|t| format!(" for {}", t))
        .unwrap_or_default();
    format!(
        "List deprecated patterns in this code{} and suggest replacements:\n\n{}",
        tech, chunk
    )
}

/// Ask for a deprecation review, retrying once with a shorter prompt.
pub async fn handle_check_deprecated_code(
    engine: &dyn SearchEngine,
    code: &str,
    technology: Option<&str>,
) -> Result<String, ToolError> {
    let chunk = first_code_chunk(code);
    match engine
        .perform_search(&deprecated_code_prompt(chunk, technology))
        .await
    {
        Ok(answer) => Ok(answer),
        Err(e) => {
            warn!("Detailed deprecation check failed, trying short prompt: {}", e);
            Ok(engine
                .perform_search(&simple_deprecated_code_prompt(chunk, technology))
                .await?)
        }
    }
}

/// Extraction result as pretty JSON.
pub async fn handle_extract_url_content(
    engine: &dyn SearchEngine,
    url: &str,
    depth: Option<u32>,
) -> Result<String, ToolError> {
    let outcome = engine.extract_url_content(url, depth).await;
    Ok(outcome.to_json()?)
}

/// A tool invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolRequest {
    Search {
        query: String,
        #[serde(default)]
        detail_level: DetailLevel,
    },
    GetDocumentation {
        query: String,
        context: Option<String>,
    },
    FindApis {
        requirement: String,
        context: Option<String>,
    },
    CheckDeprecatedCode {
        code: String,
        technology: Option<String>,
    },
    ExtractUrlContent {
        url: String,
        depth: Option<u32>,
    },
    Chat {
        message: String,
        chat_id: Option<String>,
    },
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::Search { .. } => "search",
            ToolRequest::GetDocumentation { .. } => "get_documentation",
            ToolRequest::FindApis { .. } => "find_apis",
            ToolRequest::CheckDeprecatedCode { .. } => "check_deprecated_code",
            ToolRequest::ExtractUrlContent { .. } => "extract_url_content",
            ToolRequest::Chat { .. } => "chat",
        }
    }
}

/// Run one tool and return the text for the client. Errors are rendered,
/// not returned.
pub async fn run_tool(
    engine: &dyn SearchEngine,
    chats: &dyn ChatStore,
    request: ToolRequest,
) -> String {
    let name = request.name();
    let result = match request {
        ToolRequest::Search {
            query,
            detail_level,
        } => handle_search(engine, &query, detail_level).await,
        ToolRequest::GetDocumentation { query, context } => {
            handle_get_documentation(engine, &query, context.as_deref()).await
        }
        ToolRequest::FindApis {
            requirement,
            context,
        } => handle_find_apis(engine, &requirement, context.as_deref()).await,
        ToolRequest::CheckDeprecatedCode { code, technology } => {
            handle_check_deprecated_code(engine, &code, technology.as_deref()).await
        }
        ToolRequest::ExtractUrlContent { url, depth } => {
            handle_extract_url_content(engine, &url, depth).await
        }
        ToolRequest::Chat { message, chat_id } => {
            handle_chat(engine, chats, &message, chat_id.as_deref())
                .await
                .map(|reply| reply.answer)
        }
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            warn!("Tool {} failed: {}", name, e);
            render_error(&e)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingEngine;
    use super::*;

    #[tokio::test]
    async fn brief_search_prompt() {
        let engine = RecordingEngine::answering("Rainy.");
        let answer = handle_search(&engine, "What is the weather in London?", DetailLevel::Brief)
            .await
            .unwrap();
        assert_eq!(answer, "Rainy.");
        assert_eq!(
            engine.prompts(),
            vec!["Provide a brief, concise answer to: What is the weather in London?".to_string()]
        );
    }

    #[test]
    fn detail_levels_build_distinct_prompts() {
        assert_eq!(
            DetailLevel::Normal.prompt("q"),
            "Provide a clear, balanced answer to: q. Include key points and relevant context."
        );
        assert!(DetailLevel::Detailed
            .prompt("q")
            .starts_with("Provide a comprehensive, detailed analysis of: q."));
        assert_eq!(DetailLevel::default(), DetailLevel::Normal);
        assert_eq!("BRIEF".parse::<DetailLevel>().unwrap(), DetailLevel::Brief);
        assert!("verbose".parse::<DetailLevel>().is_err());
    }

    #[test]
    fn documentation_prompt_with_and_without_focus() {
        let with = documentation_prompt("tokio", Some("timers"));
        assert!(with.starts_with(
            "Provide comprehensive documentation and usage examples for tokio. Focus on: timers Include:\n1. Basic overview"
        ));
        assert!(with.contains("10. Related tools/libraries that work well with it\n\n"));
        assert!(with.ends_with("prefixed with 'Official URL(s):'."));

        let without = documentation_prompt("tokio", None);
        assert!(without.contains("for tokio.  Include:"));
    }

    #[test]
    fn find_apis_prompt_lists_eleven_points() {
        let prompt = find_apis_prompt("geocoding", Some("mobile app"));
        assert!(prompt.starts_with(
            "Find and evaluate APIs that could be used for: geocoding. Context: mobile app For each API, provide:\n"
        ));
        assert!(prompt.ends_with("11. SDK availability and language support"));
    }

    #[test]
    fn only_first_chunk_of_code_is_used() {
        let code = "a".repeat(450);
        assert_eq!(first_code_chunk(&code).len(), 200);
        assert_eq!(first_code_chunk("short\ncode"), "short\ncode");
        assert_eq!(first_code_chunk(""), "");
    }

    #[tokio::test]
    async fn deprecated_check_falls_back_to_short_prompt() {
        let engine = RecordingEngine::answering("Use let instead of var.").then(Err("timed out"));

        let answer = handle_check_deprecated_code(&engine, "var x = 1;", Some("javascript"))
            .await
            .unwrap();

        assert_eq!(answer, "Use let instead of var.");
        let prompts = engine.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].starts_with(
            "Analyze this code for deprecated features or patterns in javascript:\n\nvar x = 1;\n\nPlease provide:\n"
        ));
        assert_eq!(
            prompts[1],
            "List deprecated patterns in this code for javascript and suggest replacements:\n\nvar x = 1;"
        );
    }

    #[tokio::test]
    async fn extract_returns_json() {
        let engine = RecordingEngine::answering("");
        let json = handle_extract_url_content(&engine, "https://example.com/", Some(1))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "Success");
        assert_eq!(value["textContent"], "main content");
    }

    #[tokio::test]
    async fn run_tool_renders_failures() {
        let engine = RecordingEngine::failing("browser crashed");
        let chats = InMemoryChatStore::new();
        let request: ToolRequest =
            serde_json::from_str(r#"{"tool":"search","query":"anything"}"#).unwrap();

        let text = run_tool(&engine, &chats, request).await;

        assert_eq!(
            text,
            "The operation encountered an error: Search failed: browser crashed. Please try again."
        );
    }

    #[tokio::test]
    async fn run_tool_dispatches_chat() {
        let engine = RecordingEngine::answering("Hi!");
        let chats = InMemoryChatStore::new();
        let request = ToolRequest::Chat {
            message: "Hello".into(),
            chat_id: Some("c1".into()),
        };

        assert_eq!(run_tool(&engine, &chats, request).await, "Hi!");
        assert_eq!(chats.history("c1").len(), 2);
    }
}
