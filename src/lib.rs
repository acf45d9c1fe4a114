//! # DeepSeek Proxy Library
//!
//! 协议翻译网关核心库：管理上游会话凭证池、求解工作量证明门禁、
//! 把上游私有补丁流翻译为 OpenAI 兼容的聊天补全响应。

pub mod config;
pub mod error;
pub mod key_pool;
pub mod logging;
pub mod models;
pub mod openai;
pub mod pow;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod upstream;

// Re-export commonly used types
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use service::Gateway;
