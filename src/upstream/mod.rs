//! # 上游会话客户端与流翻译
//!
//! 对上游聊天后端的三类调用（建会话、取 PoW 挑战、发补全请求）
//! 以及把其私有增量更新协议翻译为归一化事件序列的解析器。

pub mod client;
pub mod stream;

pub use client::{CompletionParams, UpstreamClient};
pub use stream::{Channel, StreamEvent, StreamTranslator};
