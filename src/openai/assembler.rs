//! # 响应组装器
//!
//! 消费归一化事件序列，产出聚合结果或增量分块。推理通道文本以
//! `<think>` 标记包裹后并入回答文本，与上游官方 API 的表示一致。

use super::types::{
    AssistantMessage, ChatChoice, ChatCompletion, ChatCompletionChunk, ChunkChoice, Delta, Usage,
};
use crate::upstream::StreamEvent;
use chrono::Utc;
use rand::RngCore;

/// 推理段开始标记
pub const THINK_OPEN: &str = "<think>\n";
/// 推理段结束标记
pub const THINK_CLOSE: &str = "\n</think>\n\n";

/// 生成补全 id 的随机后缀
fn random_completion_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("chatcmpl-{}", hex::encode(bytes))
}

/// 非流式组装
pub struct ResponseAssembler;

impl ResponseAssembler {
    /// 将完整事件序列聚合为单个补全结果
    ///
    /// 两个通道各自保序拼接后修剪；推理非空时按
    /// 开标记、推理、闭标记、空行、回答的顺序合成单串。
    #[must_use]
    pub fn aggregate(model: &str, events: &[StreamEvent]) -> ChatCompletion {
        let mut reasoning = String::new();
        let mut content = String::new();
        let mut message_id = None;

        for event in events {
            match event {
                StreamEvent::Reasoning(text) => reasoning.push_str(text),
                StreamEvent::Content(text) => content.push_str(text),
                StreamEvent::Done {
                    message_id: id, ..
                } => message_id = id.clone(),
            }
        }

        let reasoning = reasoning.trim();
        let content = content.trim();
        let combined = if reasoning.is_empty() {
            content.to_string()
        } else {
            format!("{THINK_OPEN}{reasoning}{THINK_CLOSE}{content}")
        };

        let id = message_id.map_or_else(random_completion_id, |m| format!("chatcmpl-{m}"));

        ChatCompletion {
            id,
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: combined,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::default(),
        }
    }
}

/// 流式组装状态机
///
/// 每个归一化事件产出一至三个分块。整个流中恰好第一个分块携带
/// 角色标记，恰好最后一个分块携带终结标记。
#[derive(Debug)]
pub struct StreamAssembler {
    id: String,
    created: i64,
    model: String,
    first_chunk: bool,
    in_thinking: bool,
    thinking_started: bool,
}

impl StreamAssembler {
    /// 为一次流式响应创建组装器
    #[must_use]
    pub fn new(model: &str) -> Self {
        Self {
            id: random_completion_id(),
            created: Utc::now().timestamp(),
            model: model.to_string(),
            first_chunk: true,
            in_thinking: false,
            thinking_started: false,
        }
    }

    /// 处理一个归一化事件，返回应立即下发的分块
    pub fn on_event(&mut self, event: &StreamEvent) -> Vec<ChatCompletionChunk> {
        let mut chunks = Vec::new();
        match event {
            StreamEvent::Reasoning(text) => {
                if !self.thinking_started {
                    chunks.push(self.text_chunk(THINK_OPEN));
                    self.thinking_started = true;
                    self.in_thinking = true;
                }
                chunks.push(self.text_chunk(text));
            }
            StreamEvent::Content(text) => {
                if self.in_thinking {
                    chunks.push(self.text_chunk(THINK_CLOSE));
                    self.in_thinking = false;
                }
                chunks.push(self.text_chunk(text));
            }
            StreamEvent::Done { .. } => {
                // 从未产出回答的响应：先闭合推理段
                if self.in_thinking {
                    chunks.push(self.text_chunk(THINK_CLOSE));
                    self.in_thinking = false;
                }
                chunks.push(self.terminal_chunk());
            }
        }
        chunks
    }

    /// 文本分块；整个流的首个分块同时携带角色标记
    fn text_chunk(&mut self, text: &str) -> ChatCompletionChunk {
        let role = if self.first_chunk {
            self.first_chunk = false;
            Some("assistant".to_string())
        } else {
            None
        };
        self.chunk(
            Delta {
                role,
                content: Some(text.to_string()),
            },
            None,
        )
    }

    /// 终结分块：空增量加终止标记，每个流恰好一个
    fn terminal_chunk(&mut self) -> ChatCompletionChunk {
        self.first_chunk = false;
        self.chunk(Delta::default(), Some("stop".to_string()))
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}
