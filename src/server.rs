//! HTTP + WebSocket 传输层（feature = "server"）
//!
//! 两种通道承载同一套消息形状：
//! - 请求/响应：POST /api/process-command、POST /api/handle-followup，
//!   返回 Command 形状的 JSON；
//! - 双工：GET /ws/assistant，入站 utterance / followup_response 帧，
//!   出站 Command 回复或 {type:"error", error} 信封。
//!
//! 畸形帧按条报告，连接保持打开；只有断连才结束会话。

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::AssistantError;
use crate::pipeline::Assistant;

/// 服务状态：共享的助理实例与关停信号
pub struct ServerState {
    pub assistant: Arc<Assistant>,
    pub shutdown: CancellationToken,
}

/// /api/* 请求体；user_id 缺省时由服务端铸一个
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

/// WebSocket 入站帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    Utterance {
        text: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        chat_id: Option<String>,
    },
    FollowupResponse {
        response: String,
        #[serde(default)]
        cancelled: bool,
    },
}

/// 创建路由
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/process-command", post(process_command))
        .route("/api/handle-followup", post(handle_followup))
        .route("/ws/assistant", get(ws_upgrade))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

fn status_of(e: &AssistantError) -> StatusCode {
    match e {
        AssistantError::Session(_) | AssistantError::Transport(_) | AssistantError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        AssistantError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AssistantError::Oracle(_) => StatusCode::BAD_GATEWAY,
        AssistantError::Tool(_) | AssistantError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ErrorReply = (StatusCode, Json<serde_json::Value>);

fn error_reply(e: &AssistantError) -> ErrorReply {
    (
        status_of(e),
        Json(json!({ "type": "error", "error": e.user_message() })),
    )
}

/// POST /api/process-command - 处理一条新话语
async fn process_command(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<Command>, ErrorReply> {
    let user_id = req
        .user_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match state
        .assistant
        .process(&user_id, req.chat_id.as_deref(), &req.text)
        .await
    {
        Ok(cmd) => Ok(Json(cmd)),
        Err(e) => {
            tracing::warn!("process-command failed for {}: {}", user_id, e);
            Err(error_reply(&e))
        }
    }
}

/// POST /api/handle-followup - 处理一轮追问答案
async fn handle_followup(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<Command>, ErrorReply> {
    let Some(user_id) = req.user_id else {
        let e = AssistantError::Session("followup without user_id".to_string());
        return Err(error_reply(&e));
    };

    match state
        .assistant
        .resolve_followup(&user_id, req.chat_id.as_deref(), &req.text, req.cancelled)
        .await
    {
        Ok(cmd) => Ok(Json(cmd)),
        Err(e) => {
            tracing::warn!("handle-followup failed for {}: {}", user_id, e);
            Err(error_reply(&e))
        }
    }
}

/// GET /ws/assistant - 升级为双工通道
async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_session(state, socket))
}

/// 单连接会话循环：连接即会话身份，帧错误不掐线，关停信号结束循环
async fn ws_session(state: Arc<ServerState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    // 客户端不报 user_id 时整条连接共用服务端铸的 id
    let mut session_user: Option<String> = None;
    let mut session_chat: Option<String> = None;

    loop {
        let msg = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = receiver.next() => msg,
        };
        let msg = match msg {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::warn!("WebSocket receive error: {}", e);
                break;
            }
            None => break,
        };

        let text = match msg {
            WsMessage::Text(t) => t,
            WsMessage::Close(_) => break,
            // Ping/Pong 由 axum 处理，其余帧忽略
            _ => continue,
        };

        let reply = match serde_json::from_str::<InboundFrame>(&text) {
            Ok(InboundFrame::Utterance {
                text,
                user_id,
                chat_id,
            }) => {
                let uid = session_user
                    .get_or_insert_with(|| {
                        user_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
                    })
                    .clone();
                if chat_id.is_some() {
                    session_chat = chat_id;
                }
                command_reply(
                    state
                        .assistant
                        .process(&uid, session_chat.as_deref(), &text)
                        .await,
                )
            }
            Ok(InboundFrame::FollowupResponse {
                response,
                cancelled,
            }) => match &session_user {
                Some(uid) => command_reply(
                    state
                        .assistant
                        .resolve_followup(uid, session_chat.as_deref(), &response, cancelled)
                        .await,
                ),
                None => json!({
                    "type": "error",
                    "error": AssistantError::Session("followup before any utterance".to_string())
                        .user_message(),
                }),
            },
            Err(e) => {
                tracing::debug!("Malformed frame: {}", e);
                json!({ "type": "error", "error": format!("malformed message: {}", e) })
            }
        };

        let payload = match serde_json::to_string(&reply) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to serialize reply: {}", e);
                continue;
            }
        };
        if sender.send(WsMessage::Text(payload)).await.is_err() {
            break;
        }
    }

    tracing::info!("WebSocket session closed");
}

fn command_reply(result: Result<Command, AssistantError>) -> serde_json::Value {
    match result {
        Ok(cmd) => serde_json::to_value(&cmd)
            .unwrap_or_else(|e| json!({ "type": "error", "error": e.to_string() })),
        Err(e) => json!({ "type": "error", "error": e.user_message() }),
    }
}
