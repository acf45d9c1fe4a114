//! # 上游会话客户端

use crate::error::{ProxyError, Result};
use crate::key_pool::CredentialPool;
use crate::pow::{PowChallenge, PowSolver, encode_solution};
use crate::scheduler::Ping;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use rand::RngCore;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

const ORIGIN: &str = "https://chat.deepseek.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";
const APP_VERSION: &str = "20241129.1";
const CLIENT_VERSION: &str = "1.6.1";
/// PoW 信封头部名
const POW_HEADER: &str = "x-ds-pow-response";
/// 挑战固定绑定的补全目标路径
const COMPLETION_TARGET_PATH: &str = "/api/v0/chat/completion";

/// 上游统一业务信封：`{"data":{"biz_data":{...}}}`
#[derive(Debug, Deserialize)]
struct BizEnvelope<T> {
    data: BizData<T>,
}

#[derive(Debug, Deserialize)]
struct BizData<T> {
    biz_data: T,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChallengeIssued {
    challenge: PowChallenge,
}

/// 一次补全请求的参数
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// 会话 id
    pub session_id: String,
    /// 扁平化后的提示词
    pub prompt: String,
    /// 是否启用推理通道
    pub thinking_enabled: bool,
    /// 是否启用联网搜索
    pub search_enabled: bool,
    /// 续写时挂接的父消息 id
    pub parent_message_id: Option<String>,
}

/// 上游会话客户端
///
/// 每个请求独占一个实例，请求结束或取消时一并丢弃；
/// 凭证在每次 HTTP 调用时从池中轮询选取（而非每个逻辑会话一次）。
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    pool: Arc<CredentialPool>,
    solver: Arc<Mutex<Box<dyn PowSolver>>>,
}

impl UpstreamClient {
    /// 创建客户端
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        pool: Arc<CredentialPool>,
        solver: Arc<Mutex<Box<dyn PowSolver>>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            pool,
            solver,
        }
    }

    /// 构造请求头；每次调用轮询一个凭证
    fn headers(&self, pow_response: Option<&str>) -> Result<HeaderMap> {
        let token = self.pool.next_token()?;

        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert(
            "accept-language",
            HeaderValue::from_static("en,en-US;q=0.9"),
        );
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ProxyError::auth("credential contains invalid header characters"))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("origin", HeaderValue::from_static(ORIGIN));
        headers.insert("referer", HeaderValue::from_static("https://chat.deepseek.com/"));
        headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
        headers.insert("x-app-version", HeaderValue::from_static(APP_VERSION));
        headers.insert("x-client-locale", HeaderValue::from_static("en_US"));
        headers.insert("x-client-platform", HeaderValue::from_static("web"));
        headers.insert("x-client-version", HeaderValue::from_static(CLIENT_VERSION));

        if let Some(pow) = pow_response {
            headers.insert(
                POW_HEADER,
                HeaderValue::from_str(pow).map_err(|_| {
                    ProxyError::internal("pow envelope contains invalid header characters")
                })?,
            );
        }

        Ok(headers)
    }

    /// 创建聊天会话，返回会话 id
    pub async fn create_session(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat_session/create", self.base_url))
            .headers(self.headers(None)?)
            .json(&json!({ "character_id": null }))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let envelope: BizEnvelope<SessionCreated> = response
            .json()
            .await
            .map_err(|e| ProxyError::network_with_source("invalid session create payload", e))?;
        Ok(envelope.data.biz_data.id)
    }

    /// 获取一个单次使用的 PoW 挑战
    pub async fn fetch_pow_challenge(&self) -> Result<PowChallenge> {
        let response = self
            .http
            .post(format!("{}/chat/create_pow_challenge", self.base_url))
            .headers(self.headers(None)?)
            .json(&json!({ "target_path": COMPLETION_TARGET_PATH }))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let envelope: BizEnvelope<ChallengeIssued> = response
            .json()
            .await
            .map_err(|e| ProxyError::network_with_source("invalid pow challenge payload", e))?;
        Ok(envelope.data.biz_data.challenge)
    }

    /// 发起补全请求，返回原始字节流
    ///
    /// 每次调用获取并求解一个新挑战；求解器的暂存内存是进程级
    /// 共享资源，这里通过互斥锁把并发的求解调用串行化。
    pub async fn issue_completion(
        &self,
        params: &CompletionParams,
    ) -> Result<impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + use<>>
    {
        let challenge = self.fetch_pow_challenge().await?;
        let answer = {
            let mut solver = self.solver.lock().await;
            solver.solve(&challenge)?
        }
        .ok_or_else(|| ProxyError::solver("proof-of-work search exhausted without an answer"))?;
        let pow_response = encode_solution(&challenge, answer);

        let body = json!({
            "chat_session_id": params.session_id,
            "parent_message_id": params.parent_message_id,
            "prompt": params.prompt,
            "ref_file_ids": [],
            "thinking_enabled": params.thinking_enabled,
            "search_enabled": params.search_enabled,
            "client_stream_id": client_stream_id(),
        });

        let response = self
            .http
            .post(format!("{}/chat/completion", self.base_url))
            .headers(self.headers(Some(&pow_response))?)
            .json(&body)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.bytes_stream())
    }

    /// 非成功状态原样转为 [`ProxyError::Upstream`]
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ProxyError::upstream(status.as_u16(), message))
    }
}

#[async_trait]
impl Ping for UpstreamClient {
    /// 轻量幂等调用，仅供保活调度器使用；
    /// 复用与补全请求相同的凭证轮询与头部构造
    async fn ping(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/client/settings?did=&scope=banner", self.base_url))
            .headers(self.headers(None)?)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

/// 每请求唯一的流 id：日期戳加随机后缀，仅用于上游侧关联
fn client_stream_id() -> String {
    let mut suffix = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("{}-{}", Utc::now().format("%Y%m%d"), hex::encode(suffix))
}
