//! 条件评估器
//!
//! 对类型化条件做仓储支撑的求值。计数/存在性/聚合条件查仓储，
//! 字段匹配把实体投影成 JSON 后按点号路径取值比较，
//! 数值比较统一转为浮点数，避免整数和浮点数比较失败。

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use arena_shared::domain::{MembershipStatus, PostStatus};
use arena_shared::rules::{Condition, CountSubject, FieldEntity, MatchOp, RowFilter, Rule};
use arena_shared::store::{
    CategoryRepository, GroupRepository, MembershipRepository, PostRepository, Repositories,
    UserRepository,
};

use crate::context::CheckContext;
use crate::error::{Result, RuleError};

/// 条件评估器
pub struct ConditionEvaluator {
    repos: Repositories,
}

impl ConditionEvaluator {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// 评估单个条件
    ///
    /// 未识别条件恒为通过（向前兼容）；无法解析的 `$rule` 阈值引用
    /// 同样放行并记警告日志。
    pub async fn evaluate(
        &self,
        condition: &Condition,
        rule: &Rule,
        ctx: &CheckContext,
    ) -> Result<bool> {
        match condition {
            Condition::TimeWindow { start, end } => {
                let now = Utc::now();
                Ok(start.is_none_or(|s| now >= s) && end.is_none_or(|e| now <= e))
            }
            Condition::Count {
                subject,
                filter,
                op,
                value,
            } => {
                let Some(rhs) = value.resolve(rule) else {
                    warn!(rule_id = %rule.id, threshold = ?value, "阈值引用无法解析，条件放行");
                    return Ok(true);
                };
                let lhs = self.resolve_count(*subject, filter, ctx).await?;
                Ok(op.compare(lhs, rhs))
            }
            Condition::Exists {
                subject,
                filter,
                require,
            } => {
                let count = self.resolve_count(*subject, filter, ctx).await?;
                Ok((count > 0) == *require)
            }
            Condition::FieldMatch {
                entity,
                field,
                op,
                value,
            } => {
                let Some(projected) = self.load_entity_json(*entity, ctx).await? else {
                    return Ok(false);
                };
                Self::match_values(*op, json_field(&projected, field), value)
            }
            Condition::ResourceFormat {
                formats,
                require_any,
            } => self.eval_resource_format(formats, *require_any, ctx).await,
            Condition::ResourceRequired { min_count, formats } => {
                let count = self.count_resources(formats.as_deref(), ctx).await?;
                Ok(count >= *min_count)
            }
            Condition::Aggregate { filter, op, value } => {
                let Some(rhs) = value.resolve(rule) else {
                    warn!(rule_id = %rule.id, threshold = ?value, "阈值引用无法解析，条件放行");
                    return Ok(true);
                };
                self.eval_each_group(filter, *op, rhs, ctx).await
            }
            Condition::Unknown { kind } => {
                debug!(kind, "未识别的条件类型，按通过处理");
                Ok(true)
            }
        }
    }

    /// 解析计数主体对应的行数
    async fn resolve_count(
        &self,
        subject: CountSubject,
        filter: &RowFilter,
        ctx: &CheckContext,
    ) -> Result<i64> {
        match subject {
            CountSubject::PostsByAuthorInCategory => Ok(self
                .repos
                .categories
                .count_posts_in(ctx.category_id()?, Some(ctx.user_id()?), post_status(filter))
                .await?),
            CountSubject::GroupMembers => Ok(self
                .repos
                .memberships
                .count_for_group(ctx.group_id()?, membership_status(filter))
                .await?),
            CountSubject::PostsInCategory => Ok(self
                .repos
                .categories
                .count_posts_in(ctx.category_id()?, None, post_status(filter))
                .await?),
            CountSubject::GroupsInCategory => Ok(self
                .repos
                .categories
                .groups_in(ctx.category_id()?)
                .await?
                .len() as i64),
            CountSubject::PostResources => self.count_resources(None, ctx).await,
        }
    }

    /// 统计上下文帖子的附件数，可按格式过滤
    async fn count_resources(&self, formats: Option<&[String]>, ctx: &CheckContext) -> Result<i64> {
        let resources = self.repos.posts.resources_of(ctx.post_id()?).await?;
        let count = resources
            .iter()
            .filter(|r| formats.is_none_or(|fs| format_in(&r.format, fs)))
            .count();
        Ok(count as i64)
    }

    /// 附件格式白名单检查
    ///
    /// require_any=false 要求每个附件的扩展名都在白名单内；
    /// require_any=true 只要任意一个命中即可。没有附件时，
    /// 全称量词空集为真，存在量词空集为假。
    async fn eval_resource_format(
        &self,
        formats: &[String],
        require_any: bool,
        ctx: &CheckContext,
    ) -> Result<bool> {
        let resources = self.repos.posts.resources_of(ctx.post_id()?).await?;
        if require_any {
            Ok(resources.iter().any(|r| format_in(&r.format, formats)))
        } else {
            Ok(resources.iter().all(|r| format_in(&r.format, formats)))
        }
    }

    /// 对赛事内每个已报名小组断言成员计数
    async fn eval_each_group(
        &self,
        filter: &RowFilter,
        op: arena_shared::rules::CompareOp,
        rhs: i64,
        ctx: &CheckContext,
    ) -> Result<bool> {
        let groups = self.repos.categories.groups_in(ctx.category_id()?).await?;
        for group_id in groups {
            let count = self
                .repos
                .memberships
                .count_for_group(group_id, membership_status(filter))
                .await?;
            if !op.compare(count, rhs) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 加载字段匹配的目标实体并投影为 JSON
    async fn load_entity_json(
        &self,
        entity: FieldEntity,
        ctx: &CheckContext,
    ) -> Result<Option<Value>> {
        let projected = match entity {
            FieldEntity::Category => self
                .repos
                .categories
                .get(ctx.category_id()?)
                .await?
                .map(|c| serde_json::to_value(c))
                .transpose()?,
            FieldEntity::Post => self
                .repos
                .posts
                .get(ctx.post_id()?)
                .await?
                .map(|p| serde_json::to_value(p))
                .transpose()?,
            FieldEntity::Group => self
                .repos
                .groups
                .get(ctx.group_id()?)
                .await?
                .map(|g| serde_json::to_value(g))
                .transpose()?,
            FieldEntity::User => self
                .repos
                .users
                .get(ctx.user_id()?)
                .await?
                .map(|u| serde_json::to_value(u))
                .transpose()?,
        };
        Ok(projected)
    }

    /// 按操作符比较字段值与期望值
    ///
    /// 字段不存在时所有操作返回 false。
    pub fn match_values(op: MatchOp, field: Option<&Value>, expected: &Value) -> Result<bool> {
        let Some(field) = field else {
            return Ok(false);
        };

        match op {
            MatchOp::Eq => Self::values_eq(field, expected),
            MatchOp::Neq => Self::values_eq(field, expected).map(|r| !r),
            MatchOp::Gt => Self::compare_numeric(field, expected, |a, b| a > b),
            MatchOp::Gte => Self::compare_numeric(field, expected, |a, b| a >= b),
            MatchOp::Lt => Self::compare_numeric(field, expected, |a, b| a < b),
            MatchOp::Lte => Self::compare_numeric(field, expected, |a, b| a <= b),
            MatchOp::In => Self::in_list(field, expected),
            MatchOp::NotIn => Self::in_list(field, expected).map(|r| !r),
            MatchOp::Contains => Self::contains(field, expected),
            MatchOp::Regex => Self::regex_match(field, expected),
        }
    }

    /// 相等比较，数值统一转为浮点数
    fn values_eq(field: &Value, expected: &Value) -> Result<bool> {
        if let (Some(f1), Some(f2)) = (as_f64(field), as_f64(expected)) {
            return Ok((f1 - f2).abs() < f64::EPSILON);
        }
        Ok(field == expected)
    }

    fn compare_numeric<F>(field: &Value, expected: &Value, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let lhs = as_f64(field).ok_or_else(|| type_mismatch("number", field))?;
        let rhs = as_f64(expected).ok_or_else(|| type_mismatch("number", expected))?;
        Ok(cmp(lhs, rhs))
    }

    fn in_list(field: &Value, expected: &Value) -> Result<bool> {
        let arr = expected
            .as_array()
            .ok_or_else(|| type_mismatch("array", expected))?;
        for item in arr {
            if Self::values_eq(field, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn contains(field: &Value, expected: &Value) -> Result<bool> {
        match field {
            Value::String(s) => {
                let substr = expected
                    .as_str()
                    .ok_or_else(|| type_mismatch("string", expected))?;
                Ok(s.contains(substr))
            }
            Value::Array(arr) => {
                for item in arr {
                    if Self::values_eq(item, expected)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(type_mismatch("string or array", field)),
        }
    }

    fn regex_match(field: &Value, expected: &Value) -> Result<bool> {
        let s = field
            .as_str()
            .ok_or_else(|| type_mismatch("string", field))?;
        let pattern = expected
            .as_str()
            .ok_or_else(|| type_mismatch("string (regex pattern)", expected))?;

        let regex = Regex::new(pattern)
            .map_err(|e| RuleError::ParseError(format!("无效的正则表达式 '{}': {}", pattern, e)))?;
        Ok(regex.is_match(s))
    }
}

fn format_in(format: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|f| f.eq_ignore_ascii_case(format))
}

fn post_status(filter: &RowFilter) -> Option<PostStatus> {
    filter
        .get("status")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn membership_status(filter: &RowFilter) -> Option<MembershipStatus> {
    filter
        .get("status")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// 点号路径取值（与 CheckContext::get_field 同一套寻址规则）
pub(crate) fn json_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
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

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(expected: &str, actual: &Value) -> RuleError {
    RuleError::ParseError(format!(
        "类型不匹配: 期望 {}, 实际 {}",
        expected,
        type_name(actual)
    ))
}
