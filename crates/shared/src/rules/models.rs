//! 规则数据模型
//!
//! 规则由固定字段（投稿窗口、人数上下限等）和有序检查列表组成。
//! 固定字段由检查展开器转换为等价的隐式检查；检查列表由规则作者
//! 以 JSON 编写，在加载期解码为类型化条件。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 生命周期触发点
///
/// 触发键为精确匹配的字符串，调用方必须使用字面值。
pub mod triggers {
    /// 投稿：帖子挂入赛事（category_post 关联行创建）
    pub const SUBMISSION_CREATE: &str = "create_relation(category_post)";
    /// 入队：用户加入小组（group_user 关联行创建）
    pub const MEMBERSHIP_CREATE: &str = "create_relation(group_user)";
    /// 报名：小组报名赛事（category_group 关联行创建）
    pub const REGISTRATION_CREATE: &str = "create_relation(category_group)";
    /// 赛事状态变更（如关闭赛事触发排名与颁奖）
    pub const CATEGORY_STATUS_UPDATE: &str = "update_content(category.status)";
}

/// 检查阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPhase {
    /// 写入前门禁，可拒绝操作
    Pre,
    /// 提交后钩子，永不阻塞
    Post,
}

/// 前置检查失败处理方式
///
/// `Flag` 在前置检查层与 `Warn` 行为完全一致（只追加警告，不落任何
/// 标记）；与后置动作 flag_disqualified 的命名重叠系历史遗留，刻意保留。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    /// 拒绝并立即中断后续检查
    #[default]
    Deny,
    /// 追加警告后继续
    Warn,
    /// 同 Warn
    Flag,
}

/// 计数比较操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "!=")]
    Neq,
}

impl CompareOp {
    /// 按操作符比较左右值
    pub fn compare(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Gte => lhs >= rhs,
            Self::Gt => lhs > rhs,
            Self::Neq => lhs != rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Gte => ">=",
            Self::Gt => ">",
            Self::Neq => "!=",
        };
        write!(f, "{}", s)
    }
}

/// 字段匹配操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    Regex,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::Regex => "regex",
        };
        write!(f, "{}", s)
    }
}

/// 计数阈值
///
/// 字面量或 `$rule.<field>` 形式的规则字段引用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Count(i64),
    Ref(String),
}

impl Threshold {
    /// 解析阈值；规则字段引用从当前规则的固定字段取值。
    /// 无法解析（前缀不对或字段未配置）返回 None，由调用方放行。
    pub fn resolve(&self, rule: &Rule) -> Option<i64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Ref(r) => rule.fixed_field(r.strip_prefix("$rule.")?),
        }
    }
}

/// 行过滤器：字段名 -> 期望值，当前支持 status 等值过滤
pub type RowFilter = BTreeMap<String, Value>;

/// 计数主体：(entity, scope) 组合解码后的受支持行集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSubject {
    /// 当前用户在赛事内的投稿（entity=post, scope=author_in_category）
    PostsByAuthorInCategory,
    /// 上下文小组的成员（entity=membership, scope=group）
    GroupMembers,
    /// 赛事内全部投稿（entity=post, scope=category）
    PostsInCategory,
    /// 赛事内已报名小组（entity=group, scope=category）
    GroupsInCategory,
    /// 上下文帖子的附件（entity=resource, scope=post）
    PostResources,
}

impl CountSubject {
    fn from_entity_scope(entity: &str, scope: &str) -> Option<Self> {
        match (entity, scope) {
            ("post", "author_in_category") => Some(Self::PostsByAuthorInCategory),
            ("membership", "group") => Some(Self::GroupMembers),
            ("post", "category") => Some(Self::PostsInCategory),
            ("group", "category") => Some(Self::GroupsInCategory),
            ("resource", "post") => Some(Self::PostResources),
            _ => None,
        }
    }
}

/// 字段匹配的目标实体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEntity {
    Category,
    Post,
    Group,
    User,
}

/// 类型化条件联合体
///
/// 未识别的条件类型解码为 `Unknown`，运行期评估恒为通过（向前兼容，
/// 规则作者新增的条件类型不会让旧引擎拒绝合法操作）。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Condition {
    /// 时间窗口，缺省边界视为该侧不限
    TimeWindow {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// 实体计数比较，阈值可引用规则固定字段
    Count {
        subject: CountSubject,
        filter: RowFilter,
        op: CompareOp,
        value: Threshold,
    },
    /// 过滤行集存在性检查，require=false 取反
    Exists {
        subject: CountSubject,
        filter: RowFilter,
        require: bool,
    },
    /// 实体字段匹配
    FieldMatch {
        entity: FieldEntity,
        field: String,
        op: MatchOp,
        value: Value,
    },
    /// 附件格式白名单，require_any=false 要求全部命中
    ResourceFormat {
        formats: Vec<String>,
        require_any: bool,
    },
    /// 附件数量下限，可按格式过滤
    ResourceRequired {
        min_count: i64,
        formats: Option<Vec<String>>,
    },
    /// 对赛事内每个已报名小组逐一断言成员计数
    Aggregate {
        filter: RowFilter,
        op: CompareOp,
        value: Threshold,
    },
    /// 未识别类型，评估恒为通过
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct TimeWindowDef {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CountDef {
    entity: String,
    scope: String,
    #[serde(default)]
    filter: RowFilter,
    op: CompareOp,
    value: Threshold,
}

#[derive(Deserialize)]
struct ExistsDef {
    entity: String,
    scope: String,
    #[serde(default)]
    filter: RowFilter,
    #[serde(default = "default_true")]
    require: bool,
}

#[derive(Deserialize)]
struct FieldMatchDef {
    entity: FieldEntity,
    field: String,
    op: MatchOp,
    value: Value,
}

#[derive(Deserialize)]
struct ResourceFormatDef {
    formats: Vec<String>,
    #[serde(default)]
    require_any: bool,
}

#[derive(Deserialize)]
struct ResourceRequiredDef {
    min_count: i64,
    formats: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct AggregateDef {
    #[allow(dead_code)]
    entity: String,
    scope: String,
    #[serde(default)]
    filter: RowFilter,
    op: CompareOp,
    value: Threshold,
}

fn default_true() -> bool {
    true
}

impl TryFrom<Value> for Condition {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "条件缺少 type 字段".to_string())?
            .to_string();

        let detail = |e: serde_json::Error| format!("条件 '{}' 解码失败: {}", kind, e);

        match kind.as_str() {
            "time_window" => {
                let def: TimeWindowDef = serde_json::from_value(value).map_err(detail)?;
                Ok(Self::TimeWindow {
                    start: def.start,
                    end: def.end,
                })
            }
            "count" => {
                let def: CountDef = serde_json::from_value(value).map_err(detail)?;
                match CountSubject::from_entity_scope(&def.entity, &def.scope) {
                    Some(subject) => Ok(Self::Count {
                        subject,
                        filter: def.filter,
                        op: def.op,
                        value: def.value,
                    }),
                    None => Ok(Self::Unknown {
                        kind: format!("count:{}/{}", def.entity, def.scope),
                    }),
                }
            }
            "exists" => {
                let def: ExistsDef = serde_json::from_value(value).map_err(detail)?;
                match CountSubject::from_entity_scope(&def.entity, &def.scope) {
                    Some(subject) => Ok(Self::Exists {
                        subject,
                        filter: def.filter,
                        require: def.require,
                    }),
                    None => Ok(Self::Unknown {
                        kind: format!("exists:{}/{}", def.entity, def.scope),
                    }),
                }
            }
            "field_match" => {
                let def: FieldMatchDef = serde_json::from_value(value).map_err(detail)?;
                Ok(Self::FieldMatch {
                    entity: def.entity,
                    field: def.field,
                    op: def.op,
                    value: def.value,
                })
            }
            "resource_format" => {
                let def: ResourceFormatDef = serde_json::from_value(value).map_err(detail)?;
                Ok(Self::ResourceFormat {
                    formats: def.formats,
                    require_any: def.require_any,
                })
            }
            "resource_required" => {
                let def: ResourceRequiredDef = serde_json::from_value(value).map_err(detail)?;
                Ok(Self::ResourceRequired {
                    min_count: def.min_count,
                    formats: def.formats,
                })
            }
            "aggregate" => {
                let def: AggregateDef = serde_json::from_value(value).map_err(detail)?;
                if def.scope != "each_group_in_category" {
                    return Ok(Self::Unknown {
                        kind: format!("aggregate:{}", def.scope),
                    });
                }
                Ok(Self::Aggregate {
                    filter: def.filter,
                    op: def.op,
                    value: def.value,
                })
            }
            _ => Ok(Self::Unknown { kind }),
        }
    }
}

impl Condition {
    /// 未识别条件的类型名（用于创作期警告）
    pub fn unknown_kind(&self) -> Option<&str> {
        match self {
            Self::Unknown { kind } => Some(kind),
            _ => None,
        }
    }
}

/// 后置动作类型
///
/// 未识别的动作名保留原文，运行期按空操作处理并记日志。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ActionKind {
    ComputeRanking,
    FlagDisqualified,
    AwardCertificate,
    Unknown(String),
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "compute_ranking" => Self::ComputeRanking,
            "flag_disqualified" => Self::FlagDisqualified,
            "award_certificate" => Self::AwardCertificate,
            _ => Self::Unknown(s),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ComputeRanking => write!(f, "compute_ranking"),
            Self::FlagDisqualified => write!(f, "flag_disqualified"),
            Self::AwardCertificate => write!(f, "award_certificate"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// 检查定义
///
/// 不变量：无条件的前置检查被整体跳过；无条件的后置检查总是执行动作。
#[derive(Debug, Clone, Deserialize)]
pub struct CheckDefinition {
    pub trigger: String,
    pub phase: CheckPhase,
    #[serde(default)]
    pub condition: Option<Condition>,
    /// 仅前置检查使用
    #[serde(default)]
    pub on_fail: Option<OnFail>,
    /// 仅后置检查使用
    #[serde(default)]
    pub action: Option<ActionKind>,
    #[serde(default)]
    pub action_params: Option<Value>,
    pub message: Option<String>,
}

impl CheckDefinition {
    /// 检查失败时呈现给调用方的消息
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("check failed on trigger {}", self.trigger))
    }
}

/// 规则
///
/// 固定字段是常见限制的便捷写法，由展开器转换为隐式检查；
/// checks 为规则作者的自定义检查，按列表顺序评估。
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub submit_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submit_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_submissions: Option<i64>,
    #[serde(default)]
    pub min_team_size: Option<i64>,
    #[serde(default)]
    pub max_team_size: Option<i64>,
    #[serde(default)]
    pub submission_formats: Option<Vec<String>>,
    #[serde(default)]
    pub allow_direct_publish: bool,
    #[serde(default)]
    pub require_review: bool,
    #[serde(default)]
    pub checks: Vec<CheckDefinition>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            submit_start: None,
            submit_end: None,
            max_submissions: None,
            min_team_size: None,
            max_team_size: None,
            submission_formats: None,
            allow_direct_publish: false,
            require_review: false,
            checks: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// 按名称取整数型固定字段，供 `$rule.<field>` 阈值引用
    pub fn fixed_field(&self, name: &str) -> Option<i64> {
        match name {
            "max_submissions" => self.max_submissions,
            "min_team_size" => self.min_team_size,
            "max_team_size" => self.max_team_size,
            _ => None,
        }
    }
}

/// 规则挂载（category_rule 行）
///
/// 读取按 priority 升序；跨规则的评估次序除此之外未定义。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLink {
    pub category_id: Uuid,
    pub rule_id: Uuid,
    pub priority: i32,
}
