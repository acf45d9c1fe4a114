//! # 网关端到端流程测试
//!
//! 模拟完整上游（会话创建、挑战、补全流），验证聚合与流式两种
//! 模式的最终输出形态。

use deepseek_proxy::config::ProxyConfig;
use deepseek_proxy::error::ProxyError;
use deepseek_proxy::openai::types::ChatCompletionRequest;
use deepseek_proxy::pow::{PowChallenge, PowSolver};
use deepseek_proxy::service::Gateway;
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedSolver;

impl PowSolver for FixedSolver {
    fn solve(&mut self, _challenge: &PowChallenge) -> deepseek_proxy::Result<Option<u64>> {
        Ok(Some(7))
    }
}

/// 带推理片段的参考响应流
const REFERENCE_BODY: &str = concat!(
    r#"data: {"v":{"response":{"message_id":"m1","fragments":[{"type":"THINK","content":"Let me think"}]}}}"#,
    "\n",
    r#"data: {"p":"response","o":"BATCH","v":[{"p":"fragments","o":"APPEND","v":[{"type":"RESPONSE","content":"The answer is 4"}]},{"p":"status","v":"FINISHED"}]}"#,
    "\n",
);

async fn mock_upstream(completion_body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_session/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "biz_data": { "id": "session-1" } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/create_pow_challenge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "biz_data": {
                    "challenge": {
                        "algorithm": "DeepSeekHashV1",
                        "challenge": "c",
                        "salt": "s",
                        "difficulty": 4,
                        "expire_at": 1_735_689_600i64,
                        "signature": "sig",
                        "target_path": "/api/v0/chat/completion",
                    }
                }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completion"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(completion_body, "text/event-stream"),
        )
        .mount(&server)
        .await;
    server
}

fn gateway_for(server: &MockServer) -> Gateway {
    let config = ProxyConfig {
        credentials: vec!["tok-1".into()],
        upstream_base_url: server.uri(),
        ..ProxyConfig::default()
    };
    Gateway::with_solver(config, Box::new(FixedSolver))
}

fn request(model: &str, stream: bool) -> ChatCompletionRequest {
    serde_json::from_value(json!({
        "model": model,
        "messages": [{"role": "user", "content": "What is 2+2?"}],
        "stream": stream,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_aggregated_completion_with_reasoning_markers() {
    let server = mock_upstream(REFERENCE_BODY).await;
    let gateway = gateway_for(&server);

    let completion = gateway
        .chat_completion(&request("deepseek-r1", false))
        .await
        .unwrap();

    assert_eq!(completion.id, "chatcmpl-m1");
    assert_eq!(completion.model, "deepseek-r1");
    assert_eq!(
        completion.choices[0].message.content,
        "<think>\nLet me think\n</think>\n\nThe answer is 4"
    );
    assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(completion.usage.total_tokens, 0);
}

#[tokio::test]
async fn test_streaming_completion_chunk_sequence() {
    let server = mock_upstream(REFERENCE_BODY).await;
    let gateway = gateway_for(&server);

    let mut stream = gateway
        .chat_completion_stream(&request("deepseek-r1", true))
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        chunks.push(item.unwrap());
    }

    // 开标记、推理、闭标记、回答、终结
    assert_eq!(chunks.len(), 5);
    assert_eq!(
        chunks[0].choices[0].delta.role.as_deref(),
        Some("assistant")
    );
    assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("<think>\n"));
    assert_eq!(
        chunks[1].choices[0].delta.content.as_deref(),
        Some("Let me think")
    );
    assert_eq!(
        chunks[2].choices[0].delta.content.as_deref(),
        Some("\n</think>\n\n")
    );
    assert_eq!(
        chunks[3].choices[0].delta.content.as_deref(),
        Some("The answer is 4")
    );
    let last = chunks.last().unwrap();
    assert!(last.choices[0].delta.content.is_none());
    assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));

    // 同一个流内 id 一致
    let first_id = &chunks[0].id;
    assert!(chunks.iter().all(|c| &c.id == first_id));
}

#[tokio::test]
async fn test_chat_model_gets_no_reasoning_markers() {
    let body = concat!(
        r#"data: {"v":{"response":{"message_id":"m2","fragments":[{"type":"RESPONSE","content":"plain"}]}}}"#,
        "\n",
        r#"data: {"p":"response","o":"BATCH","v":[{"p":"status","v":"FINISHED"}]}"#,
        "\n",
    );
    let server = mock_upstream(body).await;
    let gateway = gateway_for(&server);

    let completion = gateway
        .chat_completion(&request("deepseek-chat", false))
        .await
        .unwrap();

    // 别名归一到规范名
    assert_eq!(completion.model, "deepseek-v3");
    assert_eq!(completion.choices[0].message.content, "plain");
}

#[tokio::test]
async fn test_unknown_model_rejected_before_upstream_call() {
    let server = mock_upstream(REFERENCE_BODY).await;
    let gateway = gateway_for(&server);

    let err = gateway
        .chat_completion(&request("gpt-4", false))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Validation { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_truncated_stream_still_aggregates_partial_text() {
    // 上游中途断流（无 FINISHED、无 finish 事件）
    let body = "data: {\"v\":{\"response\":{\"message_id\":\"m3\",\"fragments\":[{\"type\":\"RESPONSE\",\"content\":\"partial\"}]}}}\n";
    let server = mock_upstream(body).await;
    let gateway = gateway_for(&server);

    let completion = gateway
        .chat_completion(&request("deepseek-v3", false))
        .await
        .unwrap();
    assert_eq!(completion.choices[0].message.content, "partial");
}
