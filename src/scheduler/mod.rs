//! # 保活调度器
//!
//! 独立于请求处理的后台定时任务：按配置间隔向上游发送一次轻量
//! ping，防止会话凭证因闲置过期。tick 失败只记录、不上抛，定时器
//! 继续运行。

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// 轻量 ping 能力
///
/// 由上游客户端实现；独立成 trait 便于用可控时钟测试调度器。
#[async_trait]
pub trait Ping: Send + Sync {
    /// 发送一次幂等的保活请求
    async fn ping(&self) -> Result<()>;
}

/// 保活状态查询结果
#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveStatus {
    /// 调度器是否在运行
    pub enabled: bool,
    /// 最近一次成功 ping 的时间
    pub last_ping: Option<DateTime<Utc>>,
    /// 距最近一次成功 ping 的分钟数
    pub minutes_since_last_ping: Option<i64>,
    /// 连续失败次数
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
struct KeepAliveState {
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

/// 保活调度器
///
/// 进程级单例，与请求路径只共享凭证池（经由 ping 实现方）。
/// 重复启动与停止未运行的调度器都是无操作。
pub struct KeepAliveScheduler {
    pinger: Arc<dyn Ping>,
    interval: Duration,
    state: Arc<RwLock<KeepAliveState>>,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl KeepAliveScheduler {
    /// 创建调度器（不启动）
    #[must_use]
    pub fn new(pinger: Arc<dyn Ping>, interval: Duration) -> Self {
        Self {
            pinger,
            interval,
            state: Arc::new(RwLock::new(KeepAliveState::default())),
            handle: RwLock::new(None),
        }
    }

    /// 启动调度器；已在运行时为无操作
    pub async fn start(&self) {
        let mut guard = self.handle.write().await;
        if guard.is_some() {
            tracing::warn!("keep-alive scheduler already running");
            return;
        }
        let task = tokio::spawn(run(
            self.pinger.clone(),
            self.interval,
            self.state.clone(),
        ));
        *guard = Some(task);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "keep-alive scheduler started"
        );
    }

    /// 停止调度器；未运行时为无操作
    pub async fn stop(&self) {
        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            tracing::info!("keep-alive scheduler stopped");
        }
    }

    /// 调度器是否在运行
    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// 获取保活状态快照
    pub async fn status(&self) -> KeepAliveStatus {
        let state = self.state.read().await;
        KeepAliveStatus {
            enabled: self.handle.read().await.is_some(),
            last_ping: state.last_success,
            minutes_since_last_ping: state
                .last_success
                .map(|t| (Utc::now() - t).num_minutes()),
            consecutive_failures: state.consecutive_failures,
        }
    }
}

/// 定时循环：首个 tick 立即触发，之后按固定间隔
async fn run(pinger: Arc<dyn Ping>, interval: Duration, state: Arc<RwLock<KeepAliveState>>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match pinger.ping().await {
            Ok(()) => {
                let mut state = state.write().await;
                state.last_success = Some(Utc::now());
                state.consecutive_failures = 0;
                tracing::debug!("keep-alive ping ok");
            }
            Err(err) => {
                let mut state = state.write().await;
                state.consecutive_failures += 1;
                tracing::warn!(
                    error = %err,
                    failures = state.consecutive_failures,
                    "keep-alive ping failed"
                );
            }
        }
    }
}
