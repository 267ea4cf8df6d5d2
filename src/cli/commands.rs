//! Command implementations. Each one owns an engine for the run and shuts
//! the browser down before returning.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use docshunter::tools::{self, DetailLevel, FileChatStore, ToolError};
use docshunter::{Config, Engine};

async fn with_engine<F, Fut>(config: Config, f: F) -> anyhow::Result<()>
where
    F: FnOnce(Arc<Engine>) -> Fut,
    Fut: std::future::Future<Output = Result<String, ToolError>>,
{
    let engine = Arc::new(Engine::new(config));
    let result = f(engine.clone()).await;
    engine.shutdown().await;
    println!("{}", result?);
    Ok(())
}

pub async fn cmd_search(config: Config, query: &str, detail: DetailLevel) -> anyhow::Result<()> {
    let query = query.to_string();
    with_engine(config, |engine| async move {
        tools::handle_search(&*engine, &query, detail).await
    })
    .await
}

pub async fn cmd_extract(config: Config, url: &str, depth: Option<u32>) -> anyhow::Result<()> {
    let url = url.to_string();
    with_engine(config, |engine| async move {
        tools::handle_extract_url_content(&*engine, &url, depth).await
    })
    .await
}

pub async fn cmd_chat(
    config: Config,
    message: &str,
    chat_id: Option<&str>,
    history: PathBuf,
) -> anyhow::Result<()> {
    let message = message.to_string();
    let chat_id = chat_id.map(str::to_string);
    with_engine(config, |engine| async move {
        let store = FileChatStore::new(history);
        let reply =
            tools::handle_chat(&*engine, &store, &message, chat_id.as_deref()).await?;
        eprintln!("chat id: {}", reply.chat_id);
        Ok(reply.answer)
    })
    .await
}

pub async fn cmd_docs(config: Config, query: &str, context: Option<&str>) -> anyhow::Result<()> {
    let query = query.to_string();
    let context = context.map(str::to_string);
    with_engine(config, |engine| async move {
        tools::handle_get_documentation(&*engine, &query, context.as_deref()).await
    })
    .await
}

pub async fn cmd_apis(
    config: Config,
    requirement: &str,
    context: Option<&str>,
) -> anyhow::Result<()> {
    let requirement = requirement.to_string();
    let context = context.map(str::to_string);
    with_engine(config, |engine| async move {
        tools::handle_find_apis(&*engine, &requirement, context.as_deref()).await
    })
    .await
}

pub async fn cmd_deprecated(
    config: Config,
    code: &str,
    technology: Option<&str>,
) -> anyhow::Result<()> {
    let code = if code == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        code.to_string()
    };
    let technology = technology.map(str::to_string);
    with_engine(config, |engine| async move {
        tools::handle_check_deprecated_code(&*engine, &code, technology.as_deref()).await
    })
    .await
}
