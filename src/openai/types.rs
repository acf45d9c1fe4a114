//! # 对外线上类型定义

use serde::{Deserialize, Serialize};

/// 聊天补全请求（OpenAI 兼容）
///
/// `temperature` 等采样参数仅为兼容而接收，上游不支持、原样忽略。
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// 模型名（默认快速对话模型）
    #[serde(default = "default_model")]
    pub model: String,
    /// 对话消息列表
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// 是否流式返回
    #[serde(default)]
    pub stream: bool,
    /// 候选数量（仅支持 1）
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

fn default_model() -> String {
    crate::models::MODEL_CHAT.to_string()
}

const fn default_n() -> u32 {
    1
}

/// 一条对话消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 角色：system / user / assistant
    pub role: String,
    /// 消息文本
    pub content: String,
}

/// 聚合补全结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    /// 固定为 `chat.completion`
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

/// 聚合结果中的单个候选
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

/// 助手消息体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

/// 用量统计；上游不提供，恒为零
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 增量分块
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    /// 固定为 `chat.completion.chunk`
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// 分块中的单个候选
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// 分块增量：首块携带角色，终结块为空增量
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// `/v1/models` 列表响应
#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    /// 固定为 `list`
    pub object: &'static str,
    pub data: Vec<ModelObject>,
}

/// 单个模型对象
#[derive(Debug, Clone, Serialize)]
pub struct ModelObject {
    pub id: String,
    /// 固定为 `model`
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

impl ModelObject {
    /// 构造模型对象（固定创建时间以保证响应稳定）
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            object: "model",
            created: 1_704_067_200,
            owned_by: "deepseek",
        }
    }
}

/// OpenAI 风格错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// 错误详情
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

impl ErrorBody {
    /// 构造错误响应体
    #[must_use]
    pub fn new(message: impl Into<String>, error_type: &str, code: &str) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.to_string(),
                code: code.to_string(),
            },
        }
    }
}
