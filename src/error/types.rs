//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

use super::ErrorCategory;

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 认证和授权错误（无可用上游凭证 / 调用方密钥无效）
    #[error("认证错误: {message}")]
    Auth { message: String },

    /// 上游服务错误（非成功 HTTP 状态原样透传）
    #[error("上游错误 {status}: {message}")]
    Upstream { status: u16, message: String },

    /// 工作量证明求解失败
    #[error("求解错误: {message}")]
    Solver { message: String },

    /// 调用方输入错误
    #[error("验证错误: {message}")]
    Validation { message: String },

    /// 网络通信错误
    #[error("网络错误: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ProxyError {
    /// 创建认证错误
    pub fn auth<T: Into<String>>(message: T) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// 创建上游错误
    pub fn upstream<T: Into<String>>(status: u16, message: T) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// 创建求解错误
    pub fn solver<T: Into<String>>(message: T) -> Self {
        Self::Solver {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// 创建网络错误
    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的网络错误
    pub fn network_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 错误分类（客户端 / 服务端）
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth { .. } | Self::Validation { .. } => ErrorCategory::Client,
            Self::Upstream { status, .. } => {
                if *status < 500 {
                    ErrorCategory::Client
                } else {
                    ErrorCategory::Server
                }
            }
            Self::Solver { .. } | Self::Network { .. } | Self::Internal { .. } => {
                ErrorCategory::Server
            }
        }
    }

    /// 映射到对外 HTTP 状态码
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Network { .. } => StatusCode::BAD_GATEWAY,
            Self::Solver { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 不含分类前缀的裸错误消息（用于对外错误响应体）
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Auth { message }
            | Self::Upstream { message, .. }
            | Self::Solver { message }
            | Self::Validation { message }
            | Self::Network { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    /// OpenAI 风格错误代码
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "invalid_api_key",
            Self::Validation { .. } => "invalid_request",
            Self::Upstream { .. } => "upstream_error",
            Self::Network { .. } => "network_error",
            Self::Solver { .. } | Self::Internal { .. } => "internal_error",
        }
    }

    /// OpenAI 风格错误类型标签
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "authentication_error",
            StatusCode::BAD_REQUEST => "invalid_request_error",
            StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
            _ => "server_error",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::upstream(status.as_u16(), err.to_string())
        } else {
            Self::network_with_source("upstream request failed", err)
        }
    }
}
