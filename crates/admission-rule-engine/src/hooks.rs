//! 后置钩子执行器
//!
//! 在触发写入提交之后运行后置检查。钩子是尽力而为的：提交与钩子
//! 之间不构成原子性，任何一个动作的异常都被捕获转为日志行，
//! 永不向上传播、永不回滚触发写入。

use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use arena_shared::rules::{CheckPhase, Rule};
use arena_shared::store::{Repositories, RuleRepository};

use crate::actions::ActionExecutor;
use crate::context::CheckContext;
use crate::evaluator::ConditionEvaluator;

/// 后置钩子执行器
pub struct PostHookRunner {
    repos: Repositories,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
}

impl PostHookRunner {
    pub fn new(repos: Repositories) -> Self {
        let evaluator = ConditionEvaluator::new(repos.clone());
        let executor = ActionExecutor::new(repos.clone());
        Self {
            repos,
            evaluator,
            executor,
        }
    }

    /// 运行触发点上的全部后置钩子，返回执行日志，永不报错
    ///
    /// 无条件的后置检查总是执行动作；有条件的先评估，不通过则跳过。
    #[instrument(skip(self, ctx), fields(trigger = %trigger, category_id = %category_id))]
    pub async fn run(&self, trigger: &str, category_id: Uuid, ctx: &CheckContext) -> Vec<String> {
        let mut logs = Vec::new();

        let links = match self.repos.rules.links_for_category(category_id).await {
            Ok(links) => links,
            Err(e) => {
                error!(error = %e, "加载规则挂载失败，后置钩子跳过");
                logs.push(format!("failed to load rule links: {}", e));
                return logs;
            }
        };

        for link in links {
            let rule = match self.repos.rules.get(link.rule_id).await {
                Ok(Some(rule)) if rule.deleted_at.is_none() => rule,
                Ok(_) => continue,
                Err(e) => {
                    logs.push(format!("failed to load rule {}: {}", link.rule_id, e));
                    continue;
                }
            };

            self.run_rule_hooks(trigger, &rule, category_id, ctx, &mut logs)
                .await;
        }

        logs
    }

    async fn run_rule_hooks(
        &self,
        trigger: &str,
        rule: &Rule,
        category_id: Uuid,
        ctx: &CheckContext,
        logs: &mut Vec<String>,
    ) {
        for check in &rule.checks {
            if check.trigger != trigger || check.phase != CheckPhase::Post {
                continue;
            }

            if let Some(condition) = &check.condition {
                match self.evaluator.evaluate(condition, rule, ctx).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(rule_id = %rule.id, "后置检查条件不满足，跳过动作");
                        continue;
                    }
                    Err(e) => {
                        warn!(rule_id = %rule.id, error = %e, "后置检查条件评估失败，跳过动作");
                        logs.push(format!("condition evaluation failed: {}", e));
                        continue;
                    }
                }
            }

            let Some(action) = &check.action else {
                continue;
            };

            match self
                .executor
                .execute(action, check.action_params.as_ref(), rule, category_id, ctx)
                .await
            {
                Ok(summary) => logs.push(summary),
                Err(e) => {
                    // 动作失败只记日志，触发写入已经提交，不能回滚
                    error!(rule_id = %rule.id, action = %action, error = %e, "后置动作执行失败");
                    logs.push(format!("action {} failed: {}", action, e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use arena_shared::rules::{ActionKind, CheckDefinition, Condition, triggers};
    use arena_shared::store::{CategoryRepository, PostRepository};
    use arena_shared::test_utils::{sample_category, sample_rule, sample_rule_link, scored_post};

    fn post_check(trigger: &str, action: ActionKind, params: serde_json::Value) -> CheckDefinition {
        CheckDefinition {
            trigger: trigger.to_string(),
            phase: CheckPhase::Post,
            condition: None,
            on_fail: None,
            action: Some(action),
            action_params: Some(params),
            message: None,
        }
    }

    #[tokio::test]
    async fn test_ranking_then_award_pipeline() {
        let (repos, _) = Repositories::in_memory();
        let runner = PostHookRunner::new(repos.clone());

        let category = sample_category("finals");
        repos.categories.insert(&category).await.unwrap();

        let gold = scored_post(Uuid::new_v4(), 92.0);
        let silver = scored_post(Uuid::new_v4(), 88.0);
        for post in [&gold, &silver] {
            repos.posts.insert(post).await.unwrap();
            repos
                .categories
                .link_post(category.id, post.id)
                .await
                .unwrap();
        }

        let mut rule = sample_rule("closing");
        rule.checks.push(post_check(
            triggers::CATEGORY_STATUS_UPDATE,
            ActionKind::ComputeRanking,
            json!({"field": "score", "order": "desc"}),
        ));
        rule.checks.push(post_check(
            triggers::CATEGORY_STATUS_UPDATE,
            ActionKind::AwardCertificate,
            json!({"awards": [{"rank_range": [1, 1], "title": "Champion"}]}),
        ));
        repos.rules.insert(&rule).await.unwrap();
        repos
            .rules
            .link(&sample_rule_link(category.id, rule.id, 0))
            .await
            .unwrap();

        let logs = runner
            .run(
                triggers::CATEGORY_STATUS_UPDATE,
                category.id,
                &CheckContext::new(),
            )
            .await;

        assert_eq!(logs.len(), 2);
        assert!(logs[0].contains("ranked 2 of 2"));
        assert!(logs[1].contains("issued 1"));

        let links = repos.posts.links_to(gold.id).await.unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_action_never_propagates() {
        let (repos, _) = Repositories::in_memory();
        let runner = PostHookRunner::new(repos.clone());

        let category = sample_category("broken");
        repos.categories.insert(&category).await.unwrap();

        let mut rule = sample_rule("bad-params");
        // award_certificate 缺少 awards 参数，动作本身会失败
        rule.checks.push(post_check(
            triggers::CATEGORY_STATUS_UPDATE,
            ActionKind::AwardCertificate,
            json!({}),
        ));
        // 后续动作仍然执行
        rule.checks.push(post_check(
            triggers::CATEGORY_STATUS_UPDATE,
            ActionKind::ComputeRanking,
            json!({"field": "score"}),
        ));
        repos.rules.insert(&rule).await.unwrap();
        repos
            .rules
            .link(&sample_rule_link(category.id, rule.id, 0))
            .await
            .unwrap();

        let logs = runner
            .run(
                triggers::CATEGORY_STATUS_UPDATE,
                category.id,
                &CheckContext::new(),
            )
            .await;

        assert_eq!(logs.len(), 2);
        assert!(logs[0].contains("failed"));
        assert!(logs[1].contains("compute_ranking"));
    }

    #[tokio::test]
    async fn test_conditional_hook_skipped_when_condition_fails() {
        let (repos, _) = Repositories::in_memory();
        let runner = PostHookRunner::new(repos.clone());

        let category = sample_category("conditional");
        repos.categories.insert(&category).await.unwrap();

        let mut rule = sample_rule("guarded");
        let mut check = post_check(
            triggers::CATEGORY_STATUS_UPDATE,
            ActionKind::ComputeRanking,
            json!({"field": "score"}),
        );
        // 赛事仍为 published，条件要求 closed，不执行
        check.condition = Some(Condition::FieldMatch {
            entity: arena_shared::rules::FieldEntity::Category,
            field: "status".to_string(),
            op: arena_shared::rules::MatchOp::Eq,
            value: json!("closed"),
        });
        rule.checks.push(check);
        repos.rules.insert(&rule).await.unwrap();
        repos
            .rules
            .link(&sample_rule_link(category.id, rule.id, 0))
            .await
            .unwrap();

        let ctx = CheckContext::new().with_id("category_id", category.id);
        let logs = runner
            .run(triggers::CATEGORY_STATUS_UPDATE, category.id, &ctx)
            .await;

        assert!(logs.is_empty());
    }
}
