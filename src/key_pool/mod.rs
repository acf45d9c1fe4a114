//! # 上游凭证池
//!
//! 管理上游会话凭证的轮询选择与调用方 API 密钥校验。
//! 游标推进是池内唯一的状态变更，不做任何 I/O。

use crate::error::{ProxyError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;

/// 池状态快照（用于 /health 等状态查询）
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// 池中凭证总数
    pub total_tokens: usize,
    /// 当前轮询游标
    pub current_index: usize,
    /// 已配置的调用方密钥数量
    pub user_api_keys_configured: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    tokens: Vec<String>,
    cursor: usize,
    /// 池为空时的回退凭证（首个入池凭证）
    default_token: Option<String>,
}

/// 凭证池服务
///
/// 进程级单例，由 [`Gateway`](crate::service::Gateway) 显式构造并以引用传递。
/// 游标由互斥锁保护；高并发下轮询公平性为尽力而为（规格允许交错推进）。
#[derive(Debug, Default)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
    api_keys: Mutex<HashSet<String>>,
}

impl CredentialPool {
    /// 创建空凭证池
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用已解析的配置值构建凭证池
    #[must_use]
    pub fn from_parts(credentials: &[String], api_keys: &[String]) -> Self {
        let pool = Self::new();
        for token in credentials {
            pool.add_token(token.clone());
        }
        for key in api_keys {
            pool.add_api_key(key.clone());
        }
        pool
    }

    /// 幂等添加上游凭证；首个凭证同时成为回退默认值
    pub fn add_token(&self, token: String) {
        if token.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.tokens.contains(&token) {
            return;
        }
        if state.default_token.is_none() {
            state.default_token = Some(token.clone());
        }
        state.tokens.push(token);
    }

    /// 轮询获取下一个凭证
    ///
    /// 每个完整周期内每个凭证恰好返回一次。池为空时回退到默认凭证；
    /// 两者皆无则返回 [`ProxyError::Auth`]。
    pub fn next_token(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.tokens.is_empty() {
            return state
                .default_token
                .clone()
                .ok_or_else(|| ProxyError::auth("no upstream credential configured"));
        }
        let token = state.tokens[state.cursor % state.tokens.len()].clone();
        state.cursor = (state.cursor + 1) % state.tokens.len();
        Ok(token)
    }

    /// 是否存在任何可用凭证
    #[must_use]
    pub fn has_token(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        !state.tokens.is_empty() || state.default_token.is_some()
    }

    /// 添加调用方 API 密钥
    pub fn add_api_key(&self, key: String) {
        if key.is_empty() {
            return;
        }
        self.api_keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key);
    }

    /// 校验调用方 API 密钥
    ///
    /// 未配置任何密钥时为开放模式，接受所有调用方；
    /// 否则要求精确匹配。
    #[must_use]
    pub fn validate_api_key(&self, key: Option<&str>) -> bool {
        let keys = self
            .api_keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if keys.is_empty() {
            return true;
        }
        key.is_some_and(|k| keys.contains(k))
    }

    /// 获取池状态快照
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let keys = self
            .api_keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        PoolStatus {
            total_tokens: state.tokens.len(),
            current_index: state.cursor,
            user_api_keys_configured: keys.len(),
        }
    }
}
