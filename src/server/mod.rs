//! # HTTP 服务层
//!
//! 基于 axum 的对外路由：聊天补全、模型列表与健康检查。
//! 处理器只做鉴权、入参校验与响应编码，业务流程全部委托给
//! [`Gateway`](crate::service::Gateway)。

use crate::error::ProxyError;
use crate::models;
use crate::openai::types::{
    ChatCompletionChunk, ChatCompletionRequest, ErrorBody, ModelList, ModelObject,
};
use crate::service::Gateway;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// 构建服务路由
pub fn router(gateway: Arc<Gateway>) -> axum::Router {
    axum::Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/v1/models/{model}", get(get_model))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

/// 聊天补全入口：按 `stream` 字段分流到聚合或 SSE 响应
async fn chat_completions(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if !gateway.pool().validate_api_key(bearer_token(&headers)) {
        return error_response(&ProxyError::auth("invalid or missing API key"));
    }
    if let Err(err) = validate_request(&request) {
        return error_response(&err);
    }

    if request.stream {
        match gateway.chat_completion_stream(&request).await {
            Ok(chunks) => sse_response(chunks),
            Err(err) => {
                tracing::warn!(error = %err, "streaming completion failed to start");
                error_response(&err)
            }
        }
    } else {
        match gateway.chat_completion(&request).await {
            Ok(completion) => Json(completion).into_response(),
            Err(err) => {
                tracing::warn!(error = %err, "completion failed");
                error_response(&err)
            }
        }
    }
}

/// 模型列表（含别名）
async fn list_models(State(gateway): State<Arc<Gateway>>, headers: HeaderMap) -> Response {
    if !gateway.pool().validate_api_key(bearer_token(&headers)) {
        return error_response(&ProxyError::auth("invalid or missing API key"));
    }
    Json(ModelList {
        object: "list",
        data: models::all_model_names()
            .iter()
            .map(|name| ModelObject::new(name))
            .collect(),
    })
    .into_response()
}

/// 单个模型查询；未知模型返回 404
async fn get_model(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(model): Path<String>,
) -> Response {
    if !gateway.pool().validate_api_key(bearer_token(&headers)) {
        return error_response(&ProxyError::auth("invalid or missing API key"));
    }
    match models::resolve(&model) {
        Ok(config) => Json(ModelObject::new(config.canonical)).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new(
                format!("The model '{model}' does not exist"),
                "invalid_request_error",
                "model_not_found",
            )),
        )
            .into_response(),
    }
}

/// 健康检查：凭证池与保活调度器快照
async fn health(State(gateway): State<Arc<Gateway>>) -> Json<serde_json::Value> {
    let pool = gateway.pool().status();
    let status = if pool.total_tokens > 0 { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "uptime_seconds": gateway.uptime_seconds(),
        "pool": pool,
        "keep_alive": gateway.keep_alive().status().await,
    }))
}

/// 从 `Authorization: Bearer` 头提取调用方密钥
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// 请求级校验：消息非空且候选数为 1
fn validate_request(request: &ChatCompletionRequest) -> crate::error::Result<()> {
    if request.messages.is_empty() {
        return Err(ProxyError::validation("messages must not be empty"));
    }
    if request.n != 1 {
        return Err(ProxyError::validation("only n=1 is supported"));
    }
    Ok(())
}

fn error_body(err: &ProxyError) -> ErrorBody {
    ErrorBody::new(err.message(), err.error_type(), err.error_code())
}

fn error_response(err: &ProxyError) -> Response {
    (err.status_code(), Json(error_body(err))).into_response()
}

/// 把分块流编码为 SSE 响应
///
/// 流开始后的失败无法再改状态码，错误体作为带内 `data:` 帧下发；
/// 无论成败最后都跟一个 `[DONE]` 哨兵帧。
fn sse_response(chunks: BoxStream<'static, crate::error::Result<ChatCompletionChunk>>) -> Response {
    let events = chunks
        .map(|item| {
            let payload = match item {
                Ok(chunk) => serde_json::to_string(&chunk),
                Err(err) => {
                    tracing::warn!(error = %err, "streaming completion failed mid-flight");
                    serde_json::to_string(&error_body(&err))
                }
            };
            Ok::<_, Infallible>(Event::default().data(payload.unwrap_or_default()))
        })
        .chain(futures::stream::once(async {
            Ok(Event::default().data("[DONE]"))
        }));
    Sse::new(events).into_response()
}
