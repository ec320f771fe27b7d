//! 统一错误处理模块
//!
//! 定义系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum ArenaError {
    // ==================== 存储错误 ====================
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("记录已存在: {entity} {field}={value}")]
    AlreadyExists {
        entity: String,
        field: String,
        value: String,
    },

    #[error("存储错误: {0}")]
    Storage(String),

    // ==================== 业务逻辑错误 ====================
    #[error("操作被拒绝: {reason}")]
    OperationDenied { reason: String },

    #[error("实体已删除: {entity} id={id}")]
    AlreadyDeleted { entity: String, id: String },

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 通用错误 ====================
    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("{0}")]
    Custom(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, ArenaError>;

impl ArenaError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::OperationDenied { .. } => "OPERATION_DENIED",
            Self::AlreadyDeleted { .. } => "ALREADY_DELETED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Json(_) => "JSON_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Custom(_) => "CUSTOM_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 内存存储不会产生瞬时故障，这里保留分类以便将来接入真实存储。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_))
    }

    /// 构造未找到错误的便捷方法
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = ArenaError::not_found("Post", "123");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ArenaError::Storage("pool exhausted".to_string()).is_retryable());
        assert!(!ArenaError::not_found("Post", "123").is_retryable());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = ArenaError::AlreadyExists {
            entity: "AssociationEdge".to_string(),
            field: "pair".to_string(),
            value: "a->b".to_string(),
        };
        assert!(err.to_string().contains("AssociationEdge"));
    }
}
