//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    /// 前置检查拒绝，message 为规则作者撰写的字面消息，
    /// 由调用方原样转为面向客户端的校验失败
    #[error("{message}")]
    Denied { message: String },

    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("调用上下文缺少字段: {0}")]
    MissingContext(&'static str),

    #[error("动作参数无效: {action} - {detail}")]
    InvalidActionParams { action: String, detail: String },

    #[error("存储错误: {0}")]
    Store(#[from] arena_shared::ArenaError),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// 是否为前置检查拒绝
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "CHECK_DENIED",
            Self::ParseError(_) => "RULE_PARSE_FAILED",
            Self::MissingContext(_) => "MISSING_CONTEXT",
            Self::InvalidActionParams { .. } => "INVALID_ACTION_PARAMS",
            Self::Store(_) => "STORE_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_displays_literal_message() {
        let err = RuleError::Denied {
            message: "team is already full".to_string(),
        };
        assert_eq!(err.to_string(), "team is already full");
        assert!(err.is_denial());
        assert_eq!(err.code(), "CHECK_DENIED");
    }
}
