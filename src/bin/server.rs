//! Aria HTTP/WebSocket 服务
//!
//! 暴露 /api/process-command、/api/handle-followup 与 /ws/assistant。
//!
//! 环境变量:
//! - OPENAI_API_KEY: LLM API Key
//! - ARIA__SERVER__HOST / ARIA__SERVER__PORT: 监听地址覆盖
//!
//! 启动: cargo run --bin aria-server --features server

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use aria::config::load_config;
    use aria::llm::OpenAiClient;
    use aria::server::{create_router, ServerState};
    use aria::voice::NoopSpeaker;
    use aria::Assistant;

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
        Arc::new(NoopSpeaker),
        &cfg,
    )
    .context("Failed to build assistant")?;

    let shutdown = tokio_util::sync::CancellationToken::new();
    let state = Arc::new(ServerState {
        assistant: Arc::new(assistant),
        shutdown: shutdown.clone(),
    });
    let app = create_router(state);

    // Ctrl-C 触发关停：在途 WebSocket 会话随令牌一起结束
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
        }
    });

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    tracing::info!("Aria server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

#[cfg(not(feature = "server"))]
fn main() {
    eprintln!("请使用 --features server 编译: cargo run --bin aria-server --features server");
    std::process::exit(1);
}
