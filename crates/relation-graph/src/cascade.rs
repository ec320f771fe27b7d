//! 级联删除编排器
//!
//! 按内容类型固定的清理顺序：
//! 1. 硬删除双向引用该 id 的全部关联行；
//! 2. 移除指向该实体的多态绑定，硬删除失去全部绑定的互动
//!    （评论连同整棵回复子树），受影响目标各重算一次缓存；
//! 3. 软删除实体本身（打时间戳，不物理移除）。
//!
//! 删除用户时额外遍历其创作的全部互动；删除评论沿 parent_id
//! 迭代遍历整棵回复子树。

use std::collections::HashSet;

use tracing::{info, instrument};
use uuid::Uuid;

use arena_shared::domain::TargetRef;
use arena_shared::store::{
    AssociationRepository, BindingRepository, CategoryRepository, GroupRepository,
    InteractionRepository, MembershipRepository, PostRepository, Repositories, RuleRepository,
    UserRepository,
};

use crate::caches::{CacheMaintainer, CacheRecompute};
use crate::error::Result;

/// 级联删除报告
///
/// 记录本次级联实际清理的行数与重算命令，调用方与测试据此
/// 观察整个删除计划。
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    /// 硬删除的关联行数（含成员、关注、绑定之外的全部关联）
    pub relation_rows_removed: usize,
    /// 硬删除的互动数
    pub interactions_removed: usize,
    /// 已执行的缓存重算命令，每个受影响目标恰好一条
    pub cache_commands: Vec<CacheRecompute>,
}

/// 级联删除编排器
pub struct CascadeDeleter {
    repos: Repositories,
    caches: CacheMaintainer,
}

impl CascadeDeleter {
    pub fn new(repos: Repositories) -> Self {
        let caches = CacheMaintainer::new(repos.clone());
        Self { repos, caches }
    }

    /// 删除规则：清掉全部挂载后软删
    #[instrument(skip(self))]
    pub async fn cascade_delete_rule(&self, id: Uuid) -> Result<CascadeReport> {
        let rows = self.repos.rules.remove_links_for_rule(id).await?;
        self.repos.rules.soft_delete(id).await?;

        info!(rows, "规则级联删除完成");
        Ok(CascadeReport {
            relation_rows_removed: rows,
            ..Default::default()
        })
    }

    /// 删除赛事：规则挂载、投稿行、报名行、关联边、绑定，最后软删
    #[instrument(skip(self))]
    pub async fn cascade_delete_category(&self, id: Uuid) -> Result<CascadeReport> {
        let mut rows = self.repos.rules.remove_links_for_category(id).await?;
        rows += self.repos.categories.remove_links_of_category(id).await?;
        rows += self.repos.categories.remove_groups_of_category(id).await?;
        rows += self.repos.associations.remove_touching(id).await?;

        let (removed, targets) = self.purge_target_bindings(TargetRef::category(id)).await?;
        let commands = CacheMaintainer::plan_for_targets(targets);
        self.caches.apply(&commands).await?;

        self.repos.categories.soft_delete(id).await?;

        info!(rows, removed, "赛事级联删除完成");
        Ok(CascadeReport {
            relation_rows_removed: rows,
            interactions_removed: removed,
            cache_commands: commands,
        })
    }

    /// 删除帖子：投稿行、帖子间引用行、附件行、绑定，最后软删
    #[instrument(skip(self))]
    pub async fn cascade_delete_post(&self, id: Uuid) -> Result<CascadeReport> {
        let mut rows = self.repos.categories.remove_post_links(id).await?;
        rows += self.repos.posts.remove_links_touching(id).await?;
        rows += self.repos.posts.remove_resource_links(id).await?;

        let (removed, targets) = self.purge_target_bindings(TargetRef::post(id)).await?;
        let commands = CacheMaintainer::plan_for_targets(targets);
        self.caches.apply(&commands).await?;

        self.repos.posts.soft_delete(id).await?;

        info!(rows, removed, "帖子级联删除完成");
        Ok(CascadeReport {
            relation_rows_removed: rows,
            interactions_removed: removed,
            cache_commands: commands,
        })
    }

    /// 删除小组：报名行与成员行，重算相关赛事的报名缓存，最后软删
    #[instrument(skip(self))]
    pub async fn cascade_delete_group(&self, id: Uuid) -> Result<CascadeReport> {
        let affected_categories = self.repos.categories.categories_of_group(id).await?;

        let mut rows = self.repos.categories.remove_group_links(id).await?;
        rows += self.repos.memberships.remove_for_group(id).await?;

        let mut seen = HashSet::new();
        let commands: Vec<CacheRecompute> = affected_categories
            .into_iter()
            .filter(|c| seen.insert(*c))
            .map(CacheRecompute::CategoryParticipants)
            .collect();
        self.caches.apply(&commands).await?;

        self.repos.groups.soft_delete(id).await?;

        info!(rows, "小组级联删除完成");
        Ok(CascadeReport {
            relation_rows_removed: rows,
            cache_commands: commands,
            ..Default::default()
        })
    }

    /// 删除用户：关注行、成员行、本人创作的全部互动（连同回复子树）、
    /// 指向本人的绑定，重算对端用户与被触及帖子的缓存，最后软删
    #[instrument(skip(self))]
    pub async fn cascade_delete_user(&self, id: Uuid) -> Result<CascadeReport> {
        let follows = self.repos.users.remove_follows_touching(id).await?;
        let mut counterparties = HashSet::new();
        for follow in &follows {
            let other = if follow.follower_id == id {
                follow.followee_id
            } else {
                follow.follower_id
            };
            counterparties.insert(other);
        }

        let mut rows = follows.len();
        rows += self.repos.memberships.remove_for_user(id).await?;

        let mut removed = 0usize;
        let mut touched_targets = Vec::new();
        for interaction_id in self.repos.interactions.list_by_author(id).await? {
            let (n, targets) = self.delete_interaction_subtree(interaction_id).await?;
            removed += n;
            touched_targets.extend(targets);
        }

        let (unbound, own_targets) = self.purge_target_bindings(TargetRef::user(id)).await?;
        removed += unbound;
        touched_targets.extend(own_targets);

        let mut commands = CacheMaintainer::plan_for_targets(touched_targets);
        commands.extend(
            counterparties
                .into_iter()
                .map(CacheRecompute::UserFollowCounts),
        );
        self.caches.apply(&commands).await?;

        self.repos.users.soft_delete(id).await?;

        info!(rows, removed, "用户级联删除完成");
        Ok(CascadeReport {
            relation_rows_removed: rows,
            interactions_removed: removed,
            cache_commands: commands,
        })
    }

    /// 删除互动：整棵回复子树硬删除，受影响目标各重算一次
    #[instrument(skip(self))]
    pub async fn cascade_delete_interaction(&self, id: Uuid) -> Result<CascadeReport> {
        let (removed, targets) = self.delete_interaction_subtree(id).await?;
        let commands = CacheMaintainer::plan_for_targets(targets);
        self.caches.apply(&commands).await?;

        info!(removed, "互动级联删除完成");
        Ok(CascadeReport {
            interactions_removed: removed,
            cache_commands: commands,
            ..Default::default()
        })
    }

    /// 迭代栈遍历回复子树，解绑并硬删除每个节点，返回
    /// (删除数, 失去绑定的目标列表)
    async fn delete_interaction_subtree(&self, root: Uuid) -> Result<(usize, Vec<TargetRef>)> {
        if self.repos.interactions.get(root).await?.is_none() {
            return Ok((0, Vec::new()));
        }

        let mut stack = vec![root];
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            ordered.push(current);
            stack.extend(self.repos.interactions.children_of(current).await?);
        }

        let mut targets = Vec::new();
        for interaction_id in &ordered {
            targets.extend(self.repos.bindings.unbind_interaction(*interaction_id).await?);
            self.repos.interactions.hard_delete(*interaction_id).await?;
        }

        Ok((ordered.len(), targets))
    }

    /// 移除指向目标的全部绑定，硬删除失去最后一个绑定的互动
    ///
    /// 仍被其他目标绑定的互动保留。返回 (删除数, 受影响目标)，
    /// 目标列表含被清理的目标本身。
    async fn purge_target_bindings(&self, target: TargetRef) -> Result<(usize, Vec<TargetRef>)> {
        let interaction_ids = self.repos.bindings.unbind_target(target).await?;

        let mut removed = 0usize;
        for interaction_id in interaction_ids {
            if self
                .repos
                .bindings
                .targets_of(interaction_id)
                .await?
                .is_empty()
            {
                self.repos.interactions.hard_delete(interaction_id).await?;
                removed += 1;
            }
        }

        Ok((removed, vec![target]))
    }
}
