//! # 对外协议（OpenAI 兼容）
//!
//! 调用方可见的请求/响应线上形态，以及把归一化事件序列组装成
//! 聚合结果或增量分块序列的组装器。

pub mod assembler;
pub mod types;

pub use assembler::{ResponseAssembler, StreamAssembler};
pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ErrorBody,
};
