//! 规则编译器
//!
//! 在加载期把 JSON 规则文档解码为类型化模型，并收集创作期警告。
//! 警告不阻止加载：运行期对未识别的条件/动作保持放行语义，
//! 编译器只负责让规则作者尽早看到问题。

use std::fmt;

use tracing::warn;

use arena_shared::rules::{
    ActionKind, CheckPhase, Condition, RowFilter, Rule, Threshold, triggers,
};

use crate::error::{Result, RuleError};

/// 创作期警告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoringWarning {
    /// 出问题的位置，如 "checks[2].condition"
    pub path: String,
    pub message: String,
}

impl fmt::Display for AuthoringWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    pub warnings: Vec<AuthoringWarning>,
}

impl CompiledRule {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// 规则编译器
pub struct RuleCompiler {
    /// 编译时是否把警告写入日志
    log_warnings: bool,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self { log_warnings: true }
    }

    /// 静默模式，警告只随 CompiledRule 返回
    pub fn silent() -> Self {
        Self {
            log_warnings: false,
        }
    }

    /// 按引擎配置构造
    pub fn from_config(config: &arena_shared::config::EngineConfig) -> Self {
        Self {
            log_warnings: config.log_authoring_warnings,
        }
    }

    /// 从 JSON 字符串编译规则
    pub fn compile_from_json(&self, json: &str) -> Result<CompiledRule> {
        let rule: Rule = serde_json::from_str(json)?;
        self.compile(rule)
    }

    /// 编译规则：结构校验 + 警告收集
    pub fn compile(&self, rule: Rule) -> Result<CompiledRule> {
        self.validate(&rule)?;

        let warnings = collect_warnings(&rule);
        if self.log_warnings {
            for w in &warnings {
                warn!(rule_id = %rule.id, rule_name = %rule.name, "规则创作警告 {}", w);
            }
        }

        Ok(CompiledRule { rule, warnings })
    }

    /// 硬性结构校验，失败的规则拒绝加载
    fn validate(&self, rule: &Rule) -> Result<()> {
        if rule.name.is_empty() {
            return Err(RuleError::ParseError("规则名称不能为空".to_string()));
        }

        for (i, check) in rule.checks.iter().enumerate() {
            if check.trigger.is_empty() {
                return Err(RuleError::ParseError(format!(
                    "checks[{}] 的触发点不能为空",
                    i
                )));
            }
        }

        Ok(())
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

const KNOWN_TRIGGERS: [&str; 4] = [
    triggers::SUBMISSION_CREATE,
    triggers::MEMBERSHIP_CREATE,
    triggers::REGISTRATION_CREATE,
    triggers::CATEGORY_STATUS_UPDATE,
];

fn collect_warnings(rule: &Rule) -> Vec<AuthoringWarning> {
    let mut warnings = Vec::new();
    let mut push = |path: String, message: String| warnings.push(AuthoringWarning { path, message });

    for (i, check) in rule.checks.iter().enumerate() {
        let path = format!("checks[{}]", i);

        if !KNOWN_TRIGGERS.contains(&check.trigger.as_str()) {
            push(
                path.clone(),
                format!("触发点 '{}' 不在已知触发点列表中，检查永远不会执行", check.trigger),
            );
        }

        match check.phase {
            CheckPhase::Pre => {
                if check.action.is_some() {
                    push(path.clone(), "前置检查的 action 会被忽略".to_string());
                }
                if check.condition.is_none() {
                    push(path.clone(), "无条件的前置检查会被整体跳过".to_string());
                }
            }
            CheckPhase::Post => {
                if check.on_fail.is_some() {
                    push(path.clone(), "后置检查的 on_fail 会被忽略".to_string());
                }
                if check.action.is_none() {
                    push(path.clone(), "后置检查没有配置 action，不产生任何效果".to_string());
                }
            }
        }

        if let Some(condition) = &check.condition {
            warn_condition(rule, condition, &format!("{}.condition", path), &mut push);
        }

        if let Some(ActionKind::Unknown(kind)) = &check.action {
            push(
                path.clone(),
                format!("未识别的动作 '{}'，运行期按空操作处理", kind),
            );
        }
    }

    warn_action_ordering(rule, &mut warnings);
    warnings
}

fn warn_condition(
    rule: &Rule,
    condition: &Condition,
    path: &str,
    push: &mut impl FnMut(String, String),
) {
    match condition {
        Condition::Unknown { kind } => push(
            path.to_string(),
            format!("未识别的条件类型 '{}'，运行期恒为通过", kind),
        ),
        Condition::Count { filter, value, .. } => {
            warn_filter(filter, path, push);
            warn_threshold(rule, value, path, push);
        }
        Condition::Exists { filter, .. } => warn_filter(filter, path, push),
        Condition::Aggregate { filter, value, .. } => {
            warn_filter(filter, path, push);
            warn_threshold(rule, value, path, push);
        }
        _ => {}
    }
}

fn warn_filter(filter: &RowFilter, path: &str, push: &mut impl FnMut(String, String)) {
    for key in filter.keys() {
        if key != "status" {
            push(
                path.to_string(),
                format!("过滤键 '{}' 不受支持，评估时会被忽略", key),
            );
        }
    }
}

fn warn_threshold(
    rule: &Rule,
    value: &Threshold,
    path: &str,
    push: &mut impl FnMut(String, String),
) {
    if let Threshold::Ref(r) = value {
        if value.resolve(rule).is_none() {
            push(
                path.to_string(),
                format!("阈值引用 '{}' 无法在本规则上解析，条件运行期恒为通过", r),
            );
        }
    }
}

/// award_certificate 依赖同一触发点上更早的 compute_ranking 已经写入
/// rank 标签；引擎不强制执行顺序，只在编译期提醒。
fn warn_action_ordering(rule: &Rule, warnings: &mut Vec<AuthoringWarning>) {
    for (i, check) in rule.checks.iter().enumerate() {
        if check.phase != CheckPhase::Post || check.action != Some(ActionKind::AwardCertificate) {
            continue;
        }
        let has_earlier_ranking = rule.checks[..i].iter().any(|c| {
            c.phase == CheckPhase::Post
                && c.trigger == check.trigger
                && c.action == Some(ActionKind::ComputeRanking)
        });
        if !has_earlier_ranking {
            warnings.push(AuthoringWarning {
                path: format!("checks[{}]", i),
                message: "award_certificate 之前没有同触发点的 compute_ranking，\
                          可能读不到 rank 标签"
                    .to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: serde_json::Value) -> CompiledRule {
        RuleCompiler::silent()
            .compile_from_json(&value.to_string())
            .unwrap()
    }

    #[test]
    fn test_compile_clean_rule_has_no_warnings() {
        let compiled = compile(json!({
            "name": "clean",
            "max_submissions": 3,
            "checks": [
                {
                    "trigger": "create_relation(category_post)",
                    "phase": "pre",
                    "condition": {
                        "type": "count",
                        "entity": "post",
                        "scope": "author_in_category",
                        "op": "<",
                        "value": "$rule.max_submissions"
                    },
                    "on_fail": "deny",
                    "message": "submission limit reached"
                }
            ]
        }));

        assert!(!compiled.has_warnings(), "{:?}", compiled.warnings);
    }

    #[test]
    fn test_unknown_condition_kind_warns() {
        let compiled = compile(json!({
            "name": "odd",
            "checks": [
                {
                    "trigger": "create_relation(category_post)",
                    "phase": "pre",
                    "condition": {"type": "moon_phase"},
                    "on_fail": "warn"
                }
            ]
        }));

        assert!(
            compiled
                .warnings
                .iter()
                .any(|w| w.message.contains("moon_phase"))
        );
    }

    #[test]
    fn test_unknown_action_warns() {
        let compiled = compile(json!({
            "name": "odd-action",
            "checks": [
                {
                    "trigger": "update_content(category.status)",
                    "phase": "post",
                    "action": "launch_fireworks"
                }
            ]
        }));

        assert!(
            compiled
                .warnings
                .iter()
                .any(|w| w.message.contains("launch_fireworks"))
        );
    }

    #[test]
    fn test_unresolvable_threshold_ref_warns() {
        let compiled = compile(json!({
            "name": "bad-ref",
            "checks": [
                {
                    "trigger": "create_relation(group_user)",
                    "phase": "pre",
                    "condition": {
                        "type": "count",
                        "entity": "membership",
                        "scope": "group",
                        "op": "<",
                        "value": "$rule.max_team_size"
                    },
                    "on_fail": "deny"
                }
            ]
        }));

        assert!(
            compiled
                .warnings
                .iter()
                .any(|w| w.message.contains("$rule.max_team_size"))
        );
    }

    #[test]
    fn test_award_without_ranking_warns() {
        let compiled = compile(json!({
            "name": "misordered",
            "checks": [
                {
                    "trigger": "update_content(category.status)",
                    "phase": "post",
                    "action": "award_certificate",
                    "action_params": {"awards": [{"rank_range": [1, 3], "title": "Winner"}]}
                }
            ]
        }));

        assert!(
            compiled
                .warnings
                .iter()
                .any(|w| w.message.contains("compute_ranking"))
        );
    }

    #[test]
    fn test_ranking_before_award_is_clean() {
        let compiled = compile(json!({
            "name": "ordered",
            "checks": [
                {
                    "trigger": "update_content(category.status)",
                    "phase": "post",
                    "action": "compute_ranking",
                    "action_params": {"field": "score", "order": "desc"}
                },
                {
                    "trigger": "update_content(category.status)",
                    "phase": "post",
                    "action": "award_certificate",
                    "action_params": {"awards": [{"rank_range": [1, 1], "title": "Gold"}]}
                }
            ]
        }));

        assert!(
            !compiled
                .warnings
                .iter()
                .any(|w| w.message.contains("rank 标签"))
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = RuleCompiler::silent().compile_from_json(
            &json!({
                "name": "",
                "checks": []
            })
            .to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_conditionless_pre_check_warns() {
        let compiled = compile(json!({
            "name": "noop-pre",
            "checks": [
                {
                    "trigger": "create_relation(category_post)",
                    "phase": "pre",
                    "on_fail": "deny"
                }
            ]
        }));

        assert!(
            compiled
                .warnings
                .iter()
                .any(|w| w.message.contains("整体跳过"))
        );
    }
}
