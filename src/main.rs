//! Aria - 语音驱动个人助理的命令管线
//!
//! 入口：初始化日志与配置，装配助理，运行本地读循环。
//! 待定追问期间输入 "cancel" 可显式取消当前请求。

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use aria::config::load_config;
use aria::llm::OpenAiClient;
use aria::voice::ConsoleSpeaker;
use aria::Assistant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aria::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let llm = Arc::new(OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        None,
    ));
    let assistant = Assistant::new(
        llm,
        Arc::new(aria::tools::InMemoryCalendar::new()),
        Arc::new(aria::tools::InMemoryMailbox::new()),
        Arc::new(aria::context::InMemoryContextStore::default()),
        Arc::new(ConsoleSpeaker),
        &cfg,
    )
    .context("Failed to build assistant")?;

    // 本地循环共用一个会话身份
    let user_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("Aria ready, session {}", user_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }
        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }

        let result = if assistant.pending().has_pending(&user_id).await {
            let cancelled = text.eq_ignore_ascii_case("cancel");
            assistant
                .resolve_followup(&user_id, None, text, cancelled)
                .await
        } else {
            assistant.process(&user_id, None, text).await
        };

        // 播报已由 ConsoleSpeaker 完成；这里只记录失败原因
        if let Err(e) = result {
            tracing::warn!("Turn failed: {}", e);
        }

        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
