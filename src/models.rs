//! # 模型注册表
//!
//! 网关对外暴露的模型集合是固定的：一个快速非推理变体与一个
//! 推理变体，各带一个别名。未知模型在任何上游调用之前即被拒绝。

use crate::error::{ProxyError, Result};

/// 规范模型名：快速对话
pub const MODEL_CHAT: &str = "deepseek-v3";
/// 规范模型名：深度推理
pub const MODEL_REASONER: &str = "deepseek-r1";

/// 单个模型的配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    /// 规范模型名
    pub canonical: &'static str,
    /// 是否启用推理通道
    pub thinking: bool,
    /// 模型描述
    pub description: &'static str,
}

/// 规范模型名列表（不含别名）
#[must_use]
pub const fn canonical_models() -> [&'static str; 2] {
    [MODEL_CHAT, MODEL_REASONER]
}

/// 含别名在内的全部可用模型名
#[must_use]
pub const fn all_model_names() -> [&'static str; 4] {
    [MODEL_CHAT, "deepseek-chat", MODEL_REASONER, "deepseek-reasoner"]
}

/// 解析模型名（大小写不敏感，支持别名）
///
/// 未知模型返回 [`ProxyError::Validation`]，并在消息中列出可用模型。
pub fn resolve(name: &str) -> Result<ModelConfig> {
    match name.to_lowercase().as_str() {
        MODEL_CHAT | "deepseek-chat" => Ok(ModelConfig {
            canonical: MODEL_CHAT,
            thinking: false,
            description: "DeepSeek-V3 - Fast chat",
        }),
        MODEL_REASONER | "deepseek-reasoner" => Ok(ModelConfig {
            canonical: MODEL_REASONER,
            thinking: true,
            description: "DeepSeek-R1 - Deep reasoning",
        }),
        _ => Err(ProxyError::validation(format!(
            "Model '{}' not found. Available models: {}",
            name,
            canonical_models().join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_map_to_canonical_models() {
        assert_eq!(resolve("deepseek-chat").unwrap().canonical, MODEL_CHAT);
        assert_eq!(
            resolve("deepseek-reasoner").unwrap().canonical,
            MODEL_REASONER
        );
    }

    #[test]
    fn test_thinking_flag() {
        assert!(!resolve("deepseek-v3").unwrap().thinking);
        assert!(resolve("deepseek-r1").unwrap().thinking);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(resolve("DeepSeek-R1").unwrap().canonical, MODEL_REASONER);
    }

    #[test]
    fn test_unknown_model_is_rejected_with_model_list() {
        let err = resolve("gpt-4").unwrap_err();
        assert!(matches!(err, ProxyError::Validation { .. }));
        assert!(err.to_string().contains("deepseek-v3"));
        assert!(err.to_string().contains("deepseek-r1"));
    }
}
