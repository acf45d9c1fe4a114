//! # 网关服务对象
//!
//! 显式构造的进程级服务：持有凭证池、PoW 求解器、HTTP 客户端与
//! 保活调度器，以引用传给请求处理器。每个请求独占一个派生的
//! 上游客户端与翻译器/组装器实例，请求结束或取消时随流一并丢弃。

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::key_pool::CredentialPool;
use crate::models;
use crate::openai::assembler::{ResponseAssembler, StreamAssembler};
use crate::openai::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage};
use crate::pow::{HashSearchSolver, PowSolver};
use crate::scheduler::{KeepAliveScheduler, Ping};
use crate::upstream::{CompletionParams, StreamEvent, StreamTranslator, UpstreamClient};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 网关服务
pub struct Gateway {
    config: ProxyConfig,
    pool: Arc<CredentialPool>,
    solver: Arc<Mutex<Box<dyn PowSolver>>>,
    http: reqwest::Client,
    keep_alive: KeepAliveScheduler,
    started_at: DateTime<Utc>,
}

impl Gateway {
    /// 使用内置求解器创建网关
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_solver(config, Box::new(HashSearchSolver::new()))
    }

    /// 使用自定义求解器创建网关（测试时注入桩实现）
    #[must_use]
    pub fn with_solver(config: ProxyConfig, solver: Box<dyn PowSolver>) -> Self {
        let pool = Arc::new(CredentialPool::from_parts(
            &config.credentials,
            &config.api_keys,
        ));
        let http = reqwest::Client::new();
        let solver = Arc::new(Mutex::new(solver));
        let pinger: Arc<dyn Ping> = Arc::new(UpstreamClient::new(
            http.clone(),
            config.upstream_base_url.clone(),
            pool.clone(),
            solver.clone(),
        ));
        let keep_alive = KeepAliveScheduler::new(
            pinger,
            Duration::from_secs(config.keep_alive_minutes * 60),
        );
        Self {
            config,
            pool,
            solver,
            http,
            keep_alive,
            started_at: Utc::now(),
        }
    }

    /// 启动后台子系统（有凭证时开启保活）
    pub async fn startup(&self) {
        if self.pool.has_token() {
            self.keep_alive.start().await;
        } else {
            tracing::warn!("no upstream credentials configured, keep-alive disabled");
        }
    }

    /// 停止后台子系统
    pub async fn shutdown(&self) {
        self.keep_alive.stop().await;
    }

    /// 凭证池引用
    #[must_use]
    pub const fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// 保活调度器引用
    #[must_use]
    pub const fn keep_alive(&self) -> &KeepAliveScheduler {
        &self.keep_alive
    }

    /// 进程启动以来的秒数
    #[must_use]
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// 为当前请求派生一个上游客户端
    fn client(&self) -> UpstreamClient {
        UpstreamClient::new(
            self.http.clone(),
            self.config.upstream_base_url.clone(),
            self.pool.clone(),
            self.solver.clone(),
        )
    }

    /// 聚合模式：完整消费事件序列后返回单个补全结果
    pub async fn chat_completion(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        let model = models::resolve(&request.model)?;
        let mut events = self.open_event_stream(request, model.thinking).await?;

        let mut collected = Vec::new();
        while let Some(event) = events.next().await {
            collected.push(event?);
        }
        Ok(ResponseAssembler::aggregate(model.canonical, &collected))
    }

    /// 流式模式：返回增量分块序列
    ///
    /// 流开始后发生的错误以 `Err` 项就地传递，由服务层转为带内
    /// 错误帧；调用方断开时丢弃返回的流即可释放上游连接。
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<BoxStream<'static, Result<ChatCompletionChunk>>> {
        let model = models::resolve(&request.model)?;
        let events = self.open_event_stream(request, model.thinking).await?;
        let assembler = StreamAssembler::new(model.canonical);

        let chunks = futures::stream::unfold(
            (events, assembler, VecDeque::new(), false),
            |(mut events, mut assembler, mut pending, mut failed)| async move {
                loop {
                    if let Some(chunk) = pending.pop_front() {
                        return Some((Ok(chunk), (events, assembler, pending, failed)));
                    }
                    if failed {
                        return None;
                    }
                    match events.next().await {
                        Some(Ok(event)) => pending.extend(assembler.on_event(&event)),
                        Some(Err(err)) => {
                            failed = true;
                            return Some((Err(err), (events, assembler, pending, failed)));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(chunks.boxed())
    }

    /// 建会话、发补全请求并接上翻译器，返回归一化事件流
    async fn open_event_stream(
        &self,
        request: &ChatCompletionRequest,
        thinking_enabled: bool,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let client = self.client();
        let session_id = client.create_session().await?;

        let params = CompletionParams {
            session_id: session_id.clone(),
            prompt: messages_to_prompt(&request.messages),
            thinking_enabled,
            search_enabled: false,
            parent_message_id: None,
        };
        let bytes = client.issue_completion(&params).await?;
        let translator = StreamTranslator::new(session_id);

        let events = futures::stream::unfold(
            (bytes, translator, VecDeque::new(), false),
            |(mut bytes, mut translator, mut pending, mut finished)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Some((Ok(event), (bytes, translator, pending, finished)));
                    }
                    if finished {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            pending.extend(translator.push_chunk(&chunk));
                            // 终结后停止继续消费上游流
                            if translator.is_done() {
                                finished = true;
                            }
                        }
                        Some(Err(err)) => {
                            finished = true;
                            return Some((
                                Err(err.into()),
                                (bytes, translator, pending, finished),
                            ));
                        }
                        None => {
                            finished = true;
                            pending.extend(translator.finish());
                        }
                    }
                }
            },
        );
        Ok(events.boxed())
    }
}

/// 将 OpenAI 消息列表扁平化为单个上游提示词
///
/// system 消息拼接在最前，assistant 轮次以 `Assistant:`/`User:`
/// 框架保留多轮上下文。
#[must_use]
pub fn messages_to_prompt(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let mut system_prompt = String::new();
    let mut prompt = String::new();

    for message in messages {
        match message.role.as_str() {
            "system" => {
                if !system_prompt.is_empty() {
                    system_prompt.push('\n');
                }
                system_prompt.push_str(&message.content);
            }
            "assistant" => {
                prompt.push_str("\n\nAssistant: ");
                prompt.push_str(&message.content);
                prompt.push_str("\n\nUser: ");
            }
            _ => prompt.push_str(&message.content),
        }
    }

    if system_prompt.is_empty() {
        prompt.trim().to_string()
    } else {
        format!("{system_prompt}\n\n{prompt}").trim().to_string()
    }
}
