//! # 上游客户端集成测试
//!
//! 用 wiremock 模拟上游端点，验证会话创建、PoW 挑战获取、
//! 补全请求与保活 ping 的请求形态和错误映射。

use deepseek_proxy::error::ProxyError;
use deepseek_proxy::key_pool::CredentialPool;
use deepseek_proxy::pow::{PowChallenge, PowSolver};
use deepseek_proxy::scheduler::Ping;
use deepseek_proxy::upstream::{CompletionParams, UpstreamClient};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 返回固定答案的求解器桩
struct FixedSolver(u64);

impl PowSolver for FixedSolver {
    fn solve(&mut self, _challenge: &PowChallenge) -> deepseek_proxy::Result<Option<u64>> {
        Ok(Some(self.0))
    }
}

fn client_for(server: &MockServer, tokens: &[&str]) -> UpstreamClient {
    let pool = CredentialPool::new();
    for token in tokens {
        pool.add_token((*token).to_string());
    }
    UpstreamClient::new(
        reqwest::Client::new(),
        server.uri(),
        Arc::new(pool),
        Arc::new(Mutex::new(Box::new(FixedSolver(7)) as Box<dyn PowSolver>)),
    )
}

fn challenge_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": {
            "biz_data": {
                "challenge": {
                    "algorithm": "DeepSeekHashV1",
                    "challenge": "c3f0a9",
                    "salt": "salty",
                    "difficulty": 4,
                    "expire_at": 1_735_689_600i64,
                    "signature": "sig",
                    "target_path": "/api/v0/chat/completion",
                }
            }
        }
    }))
}

#[tokio::test]
async fn test_create_session_extracts_id_and_sends_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_session/create"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "biz_data": { "id": "session-42" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &["tok-1"]);
    let id = client.create_session().await.unwrap();
    assert_eq!(id, "session-42");
}

#[tokio::test]
async fn test_fetch_pow_challenge_parses_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/create_pow_challenge"))
        .respond_with(challenge_response())
        .mount(&server)
        .await;

    let client = client_for(&server, &["tok-1"]);
    let challenge = client.fetch_pow_challenge().await.unwrap();
    assert_eq!(challenge.algorithm, "DeepSeekHashV1");
    assert_eq!(challenge.difficulty, 4);
    assert_eq!(challenge.target_path, "/api/v0/chat/completion");
}

#[tokio::test]
async fn test_issue_completion_sends_pow_header_and_streams_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/create_pow_challenge"))
        .respond_with(challenge_response())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completion"))
        .and(header_exists("x-ds-pow-response"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"v\":\"hello\"}\n", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &["tok-1"]);
    let params = CompletionParams {
        session_id: "session-42".into(),
        prompt: "hi".into(),
        thinking_enabled: false,
        search_enabled: false,
        parent_message_id: None,
    };
    let mut stream = client.issue_completion(&params).await.unwrap();

    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"data: {\"v\":\"hello\"}\n");
}

#[tokio::test]
async fn test_credentials_rotate_across_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_session/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "biz_data": { "id": "s" } }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, &["tok-a", "tok-b"]);
    client.create_session().await.unwrap();
    client.create_session().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let tokens: Vec<&str> = requests
        .iter()
        .map(|r| r.headers.get("authorization").unwrap().to_str().unwrap())
        .collect();
    assert_eq!(tokens, vec!["Bearer tok-a", "Bearer tok-b"]);
}

#[tokio::test]
async fn test_non_success_status_maps_to_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_session/create"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = client_for(&server, &["tok-1"]);
    let err = client.create_session().await.unwrap_err();
    match err {
        ProxyError::Upstream { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("expected upstream error, got {other}"),
    }
}

#[tokio::test]
async fn test_empty_pool_fails_before_any_request() {
    let server = MockServer::start().await;
    let client = client_for(&server, &[]);
    let err = client.create_session().await.unwrap_err();
    assert!(matches!(err, ProxyError::Auth { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ping_hits_settings_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/client/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &["tok-1"]);
    client.ping().await.unwrap();
}
