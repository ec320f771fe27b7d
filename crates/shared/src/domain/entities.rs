//! 平台实体定义
//!
//! 包含内容实体（赛事、帖子、小组、用户）、互动实体（点赞/评论/评分）、
//! 多态互动绑定以及各类关联行。关联行按 (源, 目标) 建模，
//! 级联删除时按行整删。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== 内容实体 ====================

/// 赛事/分类状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    /// 草稿 - 配置中，不接受报名和投稿
    #[default]
    Draft,
    /// 已发布 - 正常接受投稿
    Published,
    /// 已结束 - 停止投稿，进入评审/颁奖阶段
    Closed,
}

/// 赛事（分类）
///
/// 规则通过 RuleLink 挂在赛事上，投稿通过 category_post 关联行进入赛事。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub status: CategoryStatus,
    /// 冗余缓存：已报名小组数量，由缓存维护器全量重算
    pub participant_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 帖子状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

/// 帖子类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    /// 普通帖子/投稿
    #[default]
    Regular,
    /// 系统签发的证书帖，通过 post_post 引用行回链到投稿
    Certificate,
}

/// 帖子
///
/// 投稿即挂入赛事的帖子。tags 承载排名（rank_N）与取消资格标记，
/// like_count/comment_count/average_rating 为冗余缓存字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub kind: PostKind,
    pub status: PostStatus,
    /// 评审得分，排名动作按此类数值字段排序；None 的帖子不参与排名
    pub score: Option<f64>,
    pub tags: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// 小组（战队）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 成员状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// 待审核
    #[default]
    Pending,
    /// 已通过 - 计入团队规模
    Accepted,
    /// 已拒绝
    Rejected,
}

/// 小组成员关系（group_user 关联行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
}

/// 用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// 冗余缓存：粉丝数
    pub follower_count: i64,
    /// 冗余缓存：关注数
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 关注关系（user_user 关联行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFollow {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
}

/// 附件资源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub file_name: String,
    /// 小写文件扩展名，如 "pdf"、"zip"
    pub format: String,
    pub created_at: DateTime<Utc>,
}

// ==================== 互动实体 ====================

/// 互动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Comment,
    Rating,
}

/// 互动内容
///
/// 点赞无内容，评论为文本，评分为多维度分数表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionValue {
    None,
    Text(String),
    Scores(BTreeMap<String, f64>),
}

/// 互动
///
/// parent_id 形成评论回复树，级联删除时整棵子树硬删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub author_id: Uuid,
    pub kind: InteractionKind,
    pub value: InteractionValue,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 绑定目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Post,
    Category,
    User,
}

/// 多态绑定目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: Uuid,
}

impl TargetRef {
    pub fn post(id: Uuid) -> Self {
        Self {
            kind: TargetKind::Post,
            id,
        }
    }

    pub fn category(id: Uuid) -> Self {
        Self {
            kind: TargetKind::Category,
            id,
        }
    }

    pub fn user(id: Uuid) -> Self {
        Self {
            kind: TargetKind::User,
            id,
        }
    }
}

/// 多态互动绑定（target_type, target_id, interaction_id）
///
/// 三元组唯一。一条互动可以绑定多个目标，失去全部绑定后被硬删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionBinding {
    pub target: TargetRef,
    pub interaction_id: Uuid,
}

// ==================== 关联行 ====================

/// 投稿关联（category_post 行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPost {
    pub category_id: Uuid,
    pub post_id: Uuid,
}

/// 报名关联（category_group 行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category_id: Uuid,
    pub group_id: Uuid,
}

/// 帖子间关联类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostLinkKind {
    /// 引用 - 证书帖回链投稿
    Reference,
}

/// 帖子间关联（post_post 行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLink {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub kind: PostLinkKind,
}

/// 附件关联（post_resource 行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResource {
    pub post_id: Uuid,
    pub resource_id: Uuid,
}

// ==================== 赛事间关联边 ====================

/// 关联边类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// 阶段 - 有序多阶段赛事，参与环检测
    Stage,
    /// 赛道 - 平行分组，不做环检测
    Track,
    /// 前置 - 参赛资格依赖，参与环检测
    Prerequisite,
}

/// 赛事间关联边（category_category 行）
///
/// (source, target) 对全局唯一，与边类型无关。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationEdge {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub kind: AssociationKind,
    /// 仅 stage 边使用，读取时升序、空值排最后
    pub stage_order: Option<i32>,
    pub created_at: DateTime<Utc>,
}
