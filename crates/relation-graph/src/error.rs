//! 关系图层错误类型
//!
//! 关联约束违规使用固定的字面消息，调用方按字符串匹配区分
//! 三种违规（历史契约，上游按消息文本做分支）。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("cannot associate an entity with itself")]
    SelfReference,

    #[error("association between these entities already exists")]
    DuplicateAssociation,

    #[error("association would create a cycle")]
    CircularAssociation,

    #[error("存储错误: {0}")]
    Store(#[from] arena_shared::ArenaError),
}

pub type Result<T> = std::result::Result<T, RelationError>;

impl RelationError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::SelfReference => "SELF_REFERENCE",
            Self::DuplicateAssociation => "DUPLICATE_ASSOCIATION",
            Self::CircularAssociation => "CIRCULAR_ASSOCIATION",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_messages_are_distinct_literals() {
        let messages = [
            RelationError::SelfReference.to_string(),
            RelationError::DuplicateAssociation.to_string(),
            RelationError::CircularAssociation.to_string(),
        ];
        assert_eq!(messages[0], "cannot associate an entity with itself");
        assert_eq!(messages[1], "association between these entities already exists");
        assert_eq!(messages[2], "association would create a cycle");
    }
}
