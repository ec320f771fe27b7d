//! 前置检查执行器
//!
//! 在受保护的写入之前评估全部适用的前置检查。调用方必须在与
//! 写入相同的事务内先运行本检查：deny 抛出时不会留下任何部分状态。

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use arena_shared::rules::{CheckDefinition, CheckPhase, OnFail, Rule};
use arena_shared::store::{Repositories, RuleRepository};

use crate::context::CheckContext;
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::expander::CheckExpander;

/// 非阻塞警告
///
/// on_fail 为 warn 或 flag 的检查失败时产生。前置检查层的 flag
/// 不落任何持久化标记，行为与 warn 完全一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub rule_id: Uuid,
    pub trigger: String,
    pub message: String,
}

/// 前置检查执行器
pub struct PreCheckRunner {
    repos: Repositories,
    evaluator: ConditionEvaluator,
    /// 是否以 info 级别记录每条检查的评估明细
    trace_enabled: bool,
}

impl PreCheckRunner {
    pub fn new(repos: Repositories) -> Self {
        let evaluator = ConditionEvaluator::new(repos.clone());
        Self {
            repos,
            evaluator,
            trace_enabled: false,
        }
    }

    /// 启用逐条检查的评估明细日志
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 按引擎配置构造
    pub fn from_config(repos: Repositories, config: &arena_shared::config::EngineConfig) -> Self {
        let runner = Self::new(repos);
        if config.trace_checks {
            runner.with_trace()
        } else {
            runner
        }
    }

    /// 运行触发点上的全部前置检查
    ///
    /// 遍历赛事挂载的规则（按 RuleLink priority 升序），每条规则先评估
    /// 展开的隐式检查、再按列表顺序评估自定义检查。deny 失败立即以
    /// `RuleError::Denied` 返回并中断剩余检查，只有第一条失败消息会被
    /// 呈现；warn/flag 失败累积为警告继续执行。
    #[instrument(skip(self, ctx), fields(trigger = %trigger, category_id = %category_id))]
    pub async fn run(
        &self,
        trigger: &str,
        category_id: Uuid,
        ctx: &CheckContext,
    ) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();

        for link in self.repos.rules.links_for_category(category_id).await? {
            let Some(rule) = self.repos.rules.get(link.rule_id).await? else {
                warn!(rule_id = %link.rule_id, "挂载指向不存在的规则，跳过");
                continue;
            };
            if rule.deleted_at.is_some() {
                continue;
            }

            self.run_rule_checks(trigger, &rule, ctx, &mut warnings)
                .await?;
        }

        info!(warning_count = warnings.len(), "前置检查通过");
        Ok(warnings)
    }

    async fn run_rule_checks(
        &self,
        trigger: &str,
        rule: &Rule,
        ctx: &CheckContext,
        warnings: &mut Vec<Warning>,
    ) -> Result<()> {
        let expanded = CheckExpander::expand(rule);
        let checks = expanded.iter().chain(rule.checks.iter());

        for check in checks {
            if check.trigger != trigger || check.phase != CheckPhase::Pre {
                continue;
            }
            // 无条件的前置检查整体跳过
            let Some(condition) = &check.condition else {
                continue;
            };

            let passed = self.evaluator.evaluate(condition, rule, ctx).await?;
            if self.trace_enabled {
                info!(rule_id = %rule.id, trigger = %check.trigger, passed, "前置检查评估完成");
            } else {
                debug!(rule_id = %rule.id, passed, "前置检查评估完成");
            }
            if passed {
                continue;
            }

            match check.on_fail.unwrap_or_default() {
                OnFail::Deny => {
                    let message = check.message_or_default();
                    warn!(rule_id = %rule.id, %message, "前置检查拒绝");
                    return Err(RuleError::Denied { message });
                }
                OnFail::Warn | OnFail::Flag => {
                    warnings.push(self.warning_for(rule, check));
                }
            }
        }

        Ok(())
    }

    fn warning_for(&self, rule: &Rule, check: &CheckDefinition) -> Warning {
        Warning {
            rule_id: rule.id,
            trigger: check.trigger.clone(),
            message: check.message_or_default(),
        }
    }
}
