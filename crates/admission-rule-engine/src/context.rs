//! 调用上下文
//!
//! 调用方在每次调用前构造：操作用户 id、主体实体 id 以及相关的
//! 次要 id，外加自由格式的 JSON 负载。支持点号路径取值。

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, RuleError};

/// 检查上下文
///
/// 约定键名：`user_id`、`category_id`、`post_id`、`group_id`。
/// 其余键作为自由负载，供 field_match 之外的扩展条件读取。
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    values: Map<String, Value>,
}

impl CheckContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式写入一个键
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// 链式写入 Uuid 键
    pub fn with_id(self, key: &str, id: Uuid) -> Self {
        self.with(key, id.to_string())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// 获取字段值（支持点号分隔的路径，如 "payload.amount"）
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;

        for part in parts {
            match current {
                Value::Object(map) => current = map.get(part)?,
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    fn id_of(&self, key: &'static str) -> Result<Uuid> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(RuleError::MissingContext(key))
    }

    /// 操作用户
    pub fn user_id(&self) -> Result<Uuid> {
        self.id_of("user_id")
    }

    /// 主体赛事
    pub fn category_id(&self) -> Result<Uuid> {
        self.id_of("category_id")
    }

    /// 上下文帖子（投稿场景）
    pub fn post_id(&self) -> Result<Uuid> {
        self.id_of("post_id")
    }

    /// 上下文小组（入队/投稿场景）
    pub fn group_id(&self) -> Result<Uuid> {
        self.id_of("group_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_ids() {
        let user = Uuid::new_v4();
        let ctx = CheckContext::new().with_id("user_id", user);

        assert_eq!(ctx.user_id().unwrap(), user);
        assert!(matches!(
            ctx.group_id(),
            Err(RuleError::MissingContext("group_id"))
        ));
    }

    #[test]
    fn test_get_field_dot_path() {
        let ctx = CheckContext::new().with(
            "payload",
            json!({"amount": 3, "items": [{"name": "entry"}]}),
        );

        assert_eq!(ctx.get_field("payload.amount"), Some(&json!(3)));
        assert_eq!(ctx.get_field("payload.items.0.name"), Some(&json!("entry")));
        assert_eq!(ctx.get_field("payload.missing"), None);
    }
}
