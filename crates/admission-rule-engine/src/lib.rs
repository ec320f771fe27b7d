//! 准入控制规则引擎
//!
//! 提供声明式的生命周期门禁与提交后工作流：
//! - 规则编译：JSON 规则文档 -> 类型化检查列表 + 创作期警告
//! - 检查展开：固定字段 -> 等价的隐式拒绝检查
//! - 前置检查：写入前门禁，拒绝/警告/放行
//! - 后置钩子：提交后执行排名、取消资格标记、证书签发，永不阻塞写入

pub mod actions;
pub mod compiler;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod expander;
pub mod hooks;
pub mod runner;

pub use actions::{ActionExecutor, DISQUALIFIED_TAGS, RANK_TAG_PREFIX};
pub use compiler::{AuthoringWarning, CompiledRule, RuleCompiler};
pub use context::CheckContext;
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use expander::CheckExpander;
pub use hooks::PostHookRunner;
pub use runner::{PreCheckRunner, Warning};

// 规则模型定义在共享库，这里统一再导出，调用方只需要依赖引擎 crate
pub use arena_shared::rules::{
    ActionKind, CheckDefinition, CheckPhase, CompareOp, Condition, CountSubject, FieldEntity,
    MatchOp, OnFail, Rule, RuleLink, RowFilter, Threshold, triggers,
};
