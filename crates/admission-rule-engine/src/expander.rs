//! 检查展开器
//!
//! 把规则的固定便捷字段转换为等价的声明式检查，每个已配置字段
//! 恰好产出一条 on_fail=deny 的隐式检查。展开结果排在规则自定义
//! 检查之前评估。
//!
//! 字段与触发点的对应关系：
//!
//! | 固定字段            | 触发点                            | 条件                      |
//! |---------------------|-----------------------------------|---------------------------|
//! | 投稿窗口            | create_relation(category_post)    | time_window               |
//! | max_submissions     | create_relation(category_post)    | count(作者投稿) < N       |
//! | submission_formats  | create_relation(category_post)    | resource_format           |
//! | min_team_size       | create_relation(category_post)    | count(已通过成员) >= N    |
//! | max_team_size       | create_relation(group_user)       | count(已通过成员) < N     |
//!
//! 注意 max_team_size 挂在入队触发点上，与其余四个字段不同：
//! 满员限制在加人时生效，而不是投稿时。

use serde_json::json;

use arena_shared::rules::{
    CheckDefinition, CheckPhase, CompareOp, Condition, CountSubject, OnFail, RowFilter, Rule,
    Threshold, triggers,
};

/// 检查展开器
pub struct CheckExpander;

impl CheckExpander {
    /// 展开规则的固定字段
    pub fn expand(rule: &Rule) -> Vec<CheckDefinition> {
        let mut checks = Vec::new();

        if rule.submit_start.is_some() || rule.submit_end.is_some() {
            checks.push(deny_check(
                triggers::SUBMISSION_CREATE,
                Condition::TimeWindow {
                    start: rule.submit_start,
                    end: rule.submit_end,
                },
                "submission window is closed",
            ));
        }

        if rule.max_submissions.is_some() {
            checks.push(deny_check(
                triggers::SUBMISSION_CREATE,
                Condition::Count {
                    subject: CountSubject::PostsByAuthorInCategory,
                    filter: RowFilter::new(),
                    op: CompareOp::Lt,
                    value: Threshold::Ref("$rule.max_submissions".to_string()),
                },
                "submission limit reached",
            ));
        }

        if let Some(formats) = &rule.submission_formats {
            checks.push(deny_check(
                triggers::SUBMISSION_CREATE,
                Condition::ResourceFormat {
                    formats: formats.clone(),
                    require_any: false,
                },
                "attachment format not allowed",
            ));
        }

        if rule.min_team_size.is_some() {
            checks.push(deny_check(
                triggers::SUBMISSION_CREATE,
                Condition::Count {
                    subject: CountSubject::GroupMembers,
                    filter: accepted_filter(),
                    op: CompareOp::Gte,
                    value: Threshold::Ref("$rule.min_team_size".to_string()),
                },
                "team has fewer members than required",
            ));
        }

        if rule.max_team_size.is_some() {
            checks.push(deny_check(
                triggers::MEMBERSHIP_CREATE,
                Condition::Count {
                    subject: CountSubject::GroupMembers,
                    filter: accepted_filter(),
                    op: CompareOp::Lt,
                    value: Threshold::Ref("$rule.max_team_size".to_string()),
                },
                "team is already full",
            ));
        }

        checks
    }
}

fn deny_check(trigger: &str, condition: Condition, message: &str) -> CheckDefinition {
    CheckDefinition {
        trigger: trigger.to_string(),
        phase: CheckPhase::Pre,
        condition: Some(condition),
        on_fail: Some(OnFail::Deny),
        action: None,
        action_params: None,
        message: Some(message.to_string()),
    }
}

fn accepted_filter() -> RowFilter {
    let mut filter = RowFilter::new();
    filter.insert("status".to_string(), json!("accepted"));
    filter
}
