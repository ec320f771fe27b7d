//! 仓储接口定义
//!
//! 按实体类型拆分的仓储端口，供规则引擎与关系图层注入使用。
//! 引擎不依赖任何具体存储技术；内存实现见 `memory`，
//! 真实服务可以用同样的接口接到关系型存储上。
//! 接口均为 `Send + Sync` 并支持 mock 测试。

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AssociationEdge, AssociationKind, Category, Group, Interaction, InteractionBinding,
    InteractionKind, Membership, MembershipStatus, Post, PostLink, PostLinkKind, PostStatus,
    Resource, TargetRef, User, UserFollow,
};
use crate::error::Result;
use crate::rules::{Rule, RuleLink};

pub use memory::MemoryStore;

/// 规则仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn insert(&self, rule: &Rule) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Rule>>;
    /// 建立规则挂载（category_rule 行）
    async fn link(&self, link: &RuleLink) -> Result<()>;
    /// 赛事的全部挂载，按 priority 升序
    async fn links_for_category(&self, category_id: Uuid) -> Result<Vec<RuleLink>>;
    async fn remove_links_for_rule(&self, rule_id: Uuid) -> Result<usize>;
    async fn remove_links_for_category(&self, category_id: Uuid) -> Result<usize>;
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// 赛事仓储接口
///
/// 同时管理 category_post（投稿）与 category_group（报名）关联行。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn insert(&self, category: &Category) -> Result<()>;
    /// 软删除的赛事仍可取到，调用方按 deleted_at 判断
    async fn get(&self, id: Uuid) -> Result<Option<Category>>;

    async fn link_post(&self, category_id: Uuid, post_id: Uuid) -> Result<()>;
    async fn posts_in(&self, category_id: Uuid) -> Result<Vec<Uuid>>;
    /// 删除帖子侧的全部投稿行
    async fn remove_post_links(&self, post_id: Uuid) -> Result<usize>;
    /// 删除赛事侧的全部投稿行
    async fn remove_links_of_category(&self, category_id: Uuid) -> Result<usize>;
    /// 统计赛事内投稿，可按作者与状态过滤
    async fn count_posts_in(
        &self,
        category_id: Uuid,
        author_id: Option<Uuid>,
        status: Option<PostStatus>,
    ) -> Result<i64>;

    async fn link_group(&self, category_id: Uuid, group_id: Uuid) -> Result<()>;
    async fn groups_in(&self, category_id: Uuid) -> Result<Vec<Uuid>>;
    async fn categories_of_group(&self, group_id: Uuid) -> Result<Vec<Uuid>>;
    async fn remove_group_links(&self, group_id: Uuid) -> Result<usize>;
    async fn remove_groups_of_category(&self, category_id: Uuid) -> Result<usize>;

    async fn set_participant_count(&self, category_id: Uuid, count: i64) -> Result<()>;
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// 帖子仓储接口
///
/// 同时管理 post_post（引用）与 post_resource（附件）关联行。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert(&self, post: &Post) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Post>>;
    /// 按 id 批量取帖子，缺失的 id 跳过，软删除的照常返回
    async fn list(&self, ids: &[Uuid]) -> Result<Vec<Post>>;

    /// 追加标签，重复标签不叠加
    async fn add_tag(&self, id: Uuid, tag: &str) -> Result<()>;
    async fn remove_tags_with_prefix(&self, id: Uuid, prefix: &str) -> Result<()>;

    async fn set_like_count(&self, id: Uuid, count: i64) -> Result<()>;
    async fn set_comment_count(&self, id: Uuid, count: i64) -> Result<()>;
    async fn set_average_rating(&self, id: Uuid, rating: Option<f64>) -> Result<()>;

    async fn link(&self, source_id: Uuid, target_id: Uuid, kind: PostLinkKind) -> Result<()>;
    async fn links_from(&self, source_id: Uuid) -> Result<Vec<PostLink>>;
    async fn links_to(&self, target_id: Uuid) -> Result<Vec<PostLink>>;
    async fn remove_links_touching(&self, id: Uuid) -> Result<usize>;

    async fn attach_resource(&self, post_id: Uuid, resource_id: Uuid) -> Result<()>;
    async fn resources_of(&self, post_id: Uuid) -> Result<Vec<Resource>>;
    async fn remove_resource_links(&self, post_id: Uuid) -> Result<usize>;

    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// 小组仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn insert(&self, group: &Group) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Group>>;
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// 成员关系仓储接口（group_user 行）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn insert(&self, membership: &Membership) -> Result<()>;
    async fn list_for_group(&self, group_id: Uuid) -> Result<Vec<Membership>>;
    async fn count_for_group(
        &self,
        group_id: Uuid,
        status: Option<MembershipStatus>,
    ) -> Result<i64>;
    async fn remove_for_group(&self, group_id: Uuid) -> Result<usize>;
    async fn remove_for_user(&self, user_id: Uuid) -> Result<usize>;
}

/// 用户仓储接口
///
/// 同时管理 user_user（关注）关联行。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<User>>;
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<()>;
    async fn count_followers(&self, id: Uuid) -> Result<i64>;
    async fn count_following(&self, id: Uuid) -> Result<i64>;
    /// 删除双向关注行，返回被删行以便重算对端缓存
    async fn remove_follows_touching(&self, id: Uuid) -> Result<Vec<UserFollow>>;
    async fn set_follow_counts(&self, id: Uuid, followers: i64, following: i64) -> Result<()>;
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// 附件仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn insert(&self, resource: &Resource) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Resource>>;
}

/// 互动仓储接口
///
/// 互动没有软删除：级联清理时直接硬删除。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    async fn insert(&self, interaction: &Interaction) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Interaction>>;
    /// 直接子回复（仅一层，子树遍历由调用方迭代完成）
    async fn children_of(&self, parent_id: Uuid) -> Result<Vec<Uuid>>;
    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Uuid>>;
    async fn hard_delete(&self, id: Uuid) -> Result<()>;
}

/// 多态绑定仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BindingRepository: Send + Sync {
    /// 三元组唯一，重复绑定返回 AlreadyExists
    async fn bind(&self, binding: &InteractionBinding) -> Result<()>;
    async fn bindings_for_target(&self, target: TargetRef) -> Result<Vec<InteractionBinding>>;
    async fn targets_of(&self, interaction_id: Uuid) -> Result<Vec<TargetRef>>;
    /// 删除互动的全部绑定，返回受影响的目标
    async fn unbind_interaction(&self, interaction_id: Uuid) -> Result<Vec<TargetRef>>;
    /// 删除目标上的全部绑定，返回解绑的互动 id
    async fn unbind_target(&self, target: TargetRef) -> Result<Vec<Uuid>>;
    /// 统计目标上仍然存活的指定类型互动
    async fn count_interactions(&self, target: TargetRef, kind: InteractionKind) -> Result<i64>;
    /// 目标上仍然存活的评分互动
    async fn ratings_of(&self, target: TargetRef) -> Result<Vec<Interaction>>;
}

/// 赛事间关联边仓储接口（category_category 行）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    async fn insert(&self, edge: &AssociationEdge) -> Result<()>;
    /// (source, target) 对是否已有任意类型的边
    async fn exists_between(&self, source_id: Uuid, target_id: Uuid) -> Result<bool>;
    async fn edges_from(
        &self,
        source_id: Uuid,
        kind: Option<AssociationKind>,
    ) -> Result<Vec<AssociationEdge>>;
    async fn remove_touching(&self, id: Uuid) -> Result<usize>;
}

/// 仓储集合
///
/// 引擎各组件按需取用；内存实现用同一个 `MemoryStore` 填满全部端口。
#[derive(Clone)]
pub struct Repositories {
    pub rules: Arc<dyn RuleRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub users: Arc<dyn UserRepository>,
    pub resources: Arc<dyn ResourceRepository>,
    pub interactions: Arc<dyn InteractionRepository>,
    pub bindings: Arc<dyn BindingRepository>,
    pub associations: Arc<dyn AssociationRepository>,
}

impl Repositories {
    /// 以单个内存存储填满全部端口
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            rules: store.clone(),
            categories: store.clone(),
            posts: store.clone(),
            groups: store.clone(),
            memberships: store.clone(),
            users: store.clone(),
            resources: store.clone(),
            interactions: store.clone(),
            bindings: store.clone(),
            associations: store,
        }
    }

    /// 新建内存存储并返回 (集合, 存储句柄)
    pub fn in_memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Self::from_memory(store.clone()), store)
    }
}
