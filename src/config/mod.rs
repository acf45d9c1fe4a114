//! # 应用配置结构定义
//!
//! 网关的全部可配置项。核心组件只接收已解析好的值；
//! 环境变量扫描逻辑集中在 `from_env`。

use serde::{Deserialize, Serialize};

/// 默认上游 API 入口
pub const DEFAULT_UPSTREAM_BASE: &str = "https://chat.deepseek.com/api/v0";

/// 应用主配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// 上游会话凭证（有序，轮询使用）
    pub credentials: Vec<String>,
    /// 调用方 API 密钥集合（为空表示开放模式）
    pub api_keys: Vec<String>,
    /// 保活间隔（分钟）
    pub keep_alive_minutes: u64,
    /// 监听端口
    pub port: u16,
    /// 上游 API 基础地址
    pub upstream_base_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            api_keys: Vec::new(),
            keep_alive_minutes: 30,
            port: 3000,
            upstream_base_url: DEFAULT_UPSTREAM_BASE.to_string(),
        }
    }
}

impl ProxyConfig {
    /// 从环境变量加载配置
    ///
    /// 凭证使用编号变量：`DEEPSEEK_AUTHTOKEN`、`DEEPSEEK_AUTHTOKEN1`、
    /// `DEEPSEEK_AUTHTOKEN2`……调用方密钥同理（`API_KEY`、`API_KEY1`……）。
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 使用自定义查找函数加载配置（便于测试）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = scan_numbered_vars("DEEPSEEK_AUTHTOKEN", &lookup);
        let api_keys = scan_numbered_vars("API_KEY", &lookup);

        let keep_alive_minutes = lookup("KEEP_ALIVE_INTERVAL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let port = lookup("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000);

        let upstream_base_url =
            lookup("DEEPSEEK_API_BASE").unwrap_or_else(|| DEFAULT_UPSTREAM_BASE.to_string());

        Self {
            credentials,
            api_keys,
            keep_alive_minutes,
            port,
            upstream_base_url,
        }
    }

    /// 是否配置了任何上游凭证
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }
}

/// 扫描编号变量（`PREFIX`、`PREFIX1`、`PREFIX2`……）
///
/// 编号 1..=10 之内允许空洞；之后遇到第一个缺失即停止扫描。
fn scan_numbered_vars<F>(prefix: &str, lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values = Vec::new();

    if let Some(first) = lookup(prefix)
        && !first.is_empty()
    {
        values.push(first);
    }

    for i in 1..=100u32 {
        match lookup(&format!("{prefix}{i}")) {
            Some(value) if !value.is_empty() => values.push(value),
            _ if i > 10 => break,
            _ => {}
        }
    }

    values
}
