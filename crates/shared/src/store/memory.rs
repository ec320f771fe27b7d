//! 内存存储实现
//!
//! 使用 DashMap 与 RwLock<Vec> 实现全部仓储端口，供测试和演练
//! （dry-run）使用。语义与关系型实现对齐：实体软删除后仍可寻址，
//! 关联行与互动为硬删除。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{
    AssociationEdge, AssociationKind, Category, CategoryGroup, CategoryPost, Group, Interaction,
    InteractionBinding, InteractionKind, Membership, MembershipStatus, Post, PostLink,
    PostLinkKind, PostResource, PostStatus, Resource, TargetRef, User, UserFollow,
};
use crate::error::{ArenaError, Result};
use crate::rules::{Rule, RuleLink};
use crate::store::{
    AssociationRepository, BindingRepository, CategoryRepository, GroupRepository,
    InteractionRepository, MembershipRepository, PostRepository, ResourceRepository,
    RuleRepository, UserRepository,
};

/// 内存存储
///
/// 实体表用 DashMap 按 id 索引，关联行用整表 Vec 存放并线性扫描，
/// 数据量级为测试场景，无需二级索引。
#[derive(Default)]
pub struct MemoryStore {
    rules: DashMap<Uuid, Rule>,
    categories: DashMap<Uuid, Category>,
    posts: DashMap<Uuid, Post>,
    groups: DashMap<Uuid, Group>,
    users: DashMap<Uuid, User>,
    resources: DashMap<Uuid, Resource>,
    interactions: DashMap<Uuid, Interaction>,

    rule_links: RwLock<Vec<RuleLink>>,
    category_posts: RwLock<Vec<CategoryPost>>,
    category_groups: RwLock<Vec<CategoryGroup>>,
    memberships: RwLock<Vec<Membership>>,
    follows: RwLock<Vec<UserFollow>>,
    post_links: RwLock<Vec<PostLink>>,
    post_resources: RwLock<Vec<PostResource>>,
    bindings: RwLock<Vec<InteractionBinding>>,
    edges: RwLock<Vec<AssociationEdge>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 便捷构造：返回 Arc 包装的存储
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn membership_matches(m: &Membership, status: Option<MembershipStatus>) -> bool {
        status.is_none_or(|s| m.status == s)
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn insert(&self, rule: &Rule) -> Result<()> {
        self.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Rule>> {
        Ok(self.rules.get(&id).map(|r| r.clone()))
    }

    async fn link(&self, link: &RuleLink) -> Result<()> {
        self.rule_links.write().push(link.clone());
        Ok(())
    }

    async fn links_for_category(&self, category_id: Uuid) -> Result<Vec<RuleLink>> {
        let mut links: Vec<RuleLink> = self
            .rule_links
            .read()
            .iter()
            .filter(|l| l.category_id == category_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.priority);
        Ok(links)
    }

    async fn remove_links_for_rule(&self, rule_id: Uuid) -> Result<usize> {
        let mut links = self.rule_links.write();
        let before = links.len();
        links.retain(|l| l.rule_id != rule_id);
        Ok(before - links.len())
    }

    async fn remove_links_for_category(&self, category_id: Uuid) -> Result<usize> {
        let mut links = self.rule_links.write();
        let before = links.len();
        links.retain(|l| l.category_id != category_id);
        Ok(before - links.len())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut rule = self
            .rules
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Rule", id))?;
        rule.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn insert(&self, category: &Category) -> Result<()> {
        self.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.categories.get(&id).map(|c| c.clone()))
    }

    async fn link_post(&self, category_id: Uuid, post_id: Uuid) -> Result<()> {
        self.category_posts.write().push(CategoryPost {
            category_id,
            post_id,
        });
        Ok(())
    }

    async fn posts_in(&self, category_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .category_posts
            .read()
            .iter()
            .filter(|cp| cp.category_id == category_id)
            .map(|cp| cp.post_id)
            .collect())
    }

    async fn remove_post_links(&self, post_id: Uuid) -> Result<usize> {
        let mut rows = self.category_posts.write();
        let before = rows.len();
        rows.retain(|cp| cp.post_id != post_id);
        Ok(before - rows.len())
    }

    async fn remove_links_of_category(&self, category_id: Uuid) -> Result<usize> {
        let mut rows = self.category_posts.write();
        let before = rows.len();
        rows.retain(|cp| cp.category_id != category_id);
        Ok(before - rows.len())
    }

    async fn count_posts_in(
        &self,
        category_id: Uuid,
        author_id: Option<Uuid>,
        status: Option<PostStatus>,
    ) -> Result<i64> {
        let post_ids = CategoryRepository::posts_in(self, category_id).await?;
        let count = post_ids
            .iter()
            .filter_map(|id| self.posts.get(id))
            .filter(|p| p.deleted_at.is_none())
            .filter(|p| author_id.is_none_or(|a| p.author_id == a))
            .filter(|p| status.is_none_or(|s| p.status == s))
            .count();
        Ok(count as i64)
    }

    async fn link_group(&self, category_id: Uuid, group_id: Uuid) -> Result<()> {
        self.category_groups.write().push(CategoryGroup {
            category_id,
            group_id,
        });
        Ok(())
    }

    async fn groups_in(&self, category_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .category_groups
            .read()
            .iter()
            .filter(|cg| cg.category_id == category_id)
            .map(|cg| cg.group_id)
            .collect())
    }

    async fn categories_of_group(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .category_groups
            .read()
            .iter()
            .filter(|cg| cg.group_id == group_id)
            .map(|cg| cg.category_id)
            .collect())
    }

    async fn remove_group_links(&self, group_id: Uuid) -> Result<usize> {
        let mut rows = self.category_groups.write();
        let before = rows.len();
        rows.retain(|cg| cg.group_id != group_id);
        Ok(before - rows.len())
    }

    async fn remove_groups_of_category(&self, category_id: Uuid) -> Result<usize> {
        let mut rows = self.category_groups.write();
        let before = rows.len();
        rows.retain(|cg| cg.category_id != category_id);
        Ok(before - rows.len())
    }

    async fn set_participant_count(&self, category_id: Uuid, count: i64) -> Result<()> {
        let mut category = self
            .categories
            .get_mut(&category_id)
            .ok_or_else(|| ArenaError::not_found("Category", category_id))?;
        category.participant_count = count;
        category.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut category = self
            .categories
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Category", id))?;
        category.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn insert(&self, post: &Post) -> Result<()> {
        self.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.get(&id).map(|p| p.clone()))
    }

    async fn list(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.posts.get(id).map(|p| p.clone()))
            .collect())
    }

    async fn add_tag(&self, id: Uuid, tag: &str) -> Result<()> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Post", id))?;
        if !post.tags.iter().any(|t| t == tag) {
            post.tags.push(tag.to_string());
            post.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_tags_with_prefix(&self, id: Uuid, prefix: &str) -> Result<()> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Post", id))?;
        post.tags.retain(|t| !t.starts_with(prefix));
        Ok(())
    }

    async fn set_like_count(&self, id: Uuid, count: i64) -> Result<()> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Post", id))?;
        post.like_count = count;
        Ok(())
    }

    async fn set_comment_count(&self, id: Uuid, count: i64) -> Result<()> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Post", id))?;
        post.comment_count = count;
        Ok(())
    }

    async fn set_average_rating(&self, id: Uuid, rating: Option<f64>) -> Result<()> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Post", id))?;
        post.average_rating = rating;
        Ok(())
    }

    async fn link(&self, source_id: Uuid, target_id: Uuid, kind: PostLinkKind) -> Result<()> {
        self.post_links.write().push(PostLink {
            source_id,
            target_id,
            kind,
        });
        Ok(())
    }

    async fn links_from(&self, source_id: Uuid) -> Result<Vec<PostLink>> {
        Ok(self
            .post_links
            .read()
            .iter()
            .filter(|l| l.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn links_to(&self, target_id: Uuid) -> Result<Vec<PostLink>> {
        Ok(self
            .post_links
            .read()
            .iter()
            .filter(|l| l.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn remove_links_touching(&self, id: Uuid) -> Result<usize> {
        let mut rows = self.post_links.write();
        let before = rows.len();
        rows.retain(|l| l.source_id != id && l.target_id != id);
        Ok(before - rows.len())
    }

    async fn attach_resource(&self, post_id: Uuid, resource_id: Uuid) -> Result<()> {
        self.post_resources.write().push(PostResource {
            post_id,
            resource_id,
        });
        Ok(())
    }

    async fn resources_of(&self, post_id: Uuid) -> Result<Vec<Resource>> {
        Ok(self
            .post_resources
            .read()
            .iter()
            .filter(|pr| pr.post_id == post_id)
            .filter_map(|pr| self.resources.get(&pr.resource_id).map(|r| r.clone()))
            .collect())
    }

    async fn remove_resource_links(&self, post_id: Uuid) -> Result<usize> {
        let mut rows = self.post_resources.write();
        let before = rows.len();
        rows.retain(|pr| pr.post_id != post_id);
        Ok(before - rows.len())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Post", id))?;
        post.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl GroupRepository for MemoryStore {
    async fn insert(&self, group: &Group) -> Result<()> {
        self.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Group>> {
        Ok(self.groups.get(&id).map(|g| g.clone()))
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut group = self
            .groups
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("Group", id))?;
        group.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn insert(&self, membership: &Membership) -> Result<()> {
        self.memberships.write().push(membership.clone());
        Ok(())
    }

    async fn list_for_group(&self, group_id: Uuid) -> Result<Vec<Membership>> {
        Ok(self
            .memberships
            .read()
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn count_for_group(
        &self,
        group_id: Uuid,
        status: Option<MembershipStatus>,
    ) -> Result<i64> {
        Ok(self
            .memberships
            .read()
            .iter()
            .filter(|m| m.group_id == group_id && Self::membership_matches(m, status))
            .count() as i64)
    }

    async fn remove_for_group(&self, group_id: Uuid) -> Result<usize> {
        let mut rows = self.memberships.write();
        let before = rows.len();
        rows.retain(|m| m.group_id != group_id);
        Ok(before - rows.len())
    }

    async fn remove_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut rows = self.memberships.write();
        let before = rows.len();
        rows.retain(|m| m.user_id != user_id);
        Ok(before - rows.len())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<()> {
        self.follows.write().push(UserFollow {
            follower_id,
            followee_id,
        });
        Ok(())
    }

    async fn count_followers(&self, id: Uuid) -> Result<i64> {
        Ok(self
            .follows
            .read()
            .iter()
            .filter(|f| f.followee_id == id)
            .count() as i64)
    }

    async fn count_following(&self, id: Uuid) -> Result<i64> {
        Ok(self
            .follows
            .read()
            .iter()
            .filter(|f| f.follower_id == id)
            .count() as i64)
    }

    async fn remove_follows_touching(&self, id: Uuid) -> Result<Vec<UserFollow>> {
        let mut rows = self.follows.write();
        let (removed, kept): (Vec<UserFollow>, Vec<UserFollow>) = rows
            .drain(..)
            .partition(|f| f.follower_id == id || f.followee_id == id);
        *rows = kept;
        Ok(removed)
    }

    async fn set_follow_counts(&self, id: Uuid, followers: i64, following: i64) -> Result<()> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("User", id))?;
        user.follower_count = followers;
        user.following_count = following;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("User", id))?;
        user.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for MemoryStore {
    async fn insert(&self, resource: &Resource) -> Result<()> {
        self.resources.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>> {
        Ok(self.resources.get(&id).map(|r| r.clone()))
    }
}

#[async_trait]
impl InteractionRepository for MemoryStore {
    async fn insert(&self, interaction: &Interaction) -> Result<()> {
        self.interactions.insert(interaction.id, interaction.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Interaction>> {
        Ok(self.interactions.get(&id).map(|i| i.clone()))
    }

    async fn children_of(&self, parent_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .interactions
            .iter()
            .filter(|entry| entry.value().parent_id == Some(parent_id))
            .map(|entry| *entry.key())
            .collect())
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .interactions
            .iter()
            .filter(|entry| entry.value().author_id == author_id)
            .map(|entry| *entry.key())
            .collect())
    }

    async fn hard_delete(&self, id: Uuid) -> Result<()> {
        self.interactions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BindingRepository for MemoryStore {
    async fn bind(&self, binding: &InteractionBinding) -> Result<()> {
        let mut rows = self.bindings.write();
        if rows.iter().any(|b| b == binding) {
            return Err(ArenaError::AlreadyExists {
                entity: "InteractionBinding".to_string(),
                field: "triple".to_string(),
                value: format!(
                    "{:?}/{}/{}",
                    binding.target.kind, binding.target.id, binding.interaction_id
                ),
            });
        }
        rows.push(binding.clone());
        Ok(())
    }

    async fn bindings_for_target(&self, target: TargetRef) -> Result<Vec<InteractionBinding>> {
        Ok(self
            .bindings
            .read()
            .iter()
            .filter(|b| b.target == target)
            .cloned()
            .collect())
    }

    async fn targets_of(&self, interaction_id: Uuid) -> Result<Vec<TargetRef>> {
        Ok(self
            .bindings
            .read()
            .iter()
            .filter(|b| b.interaction_id == interaction_id)
            .map(|b| b.target)
            .collect())
    }

    async fn unbind_interaction(&self, interaction_id: Uuid) -> Result<Vec<TargetRef>> {
        let mut rows = self.bindings.write();
        let (removed, kept): (Vec<InteractionBinding>, Vec<InteractionBinding>) = rows
            .drain(..)
            .partition(|b| b.interaction_id == interaction_id);
        *rows = kept;
        Ok(removed.into_iter().map(|b| b.target).collect())
    }

    async fn unbind_target(&self, target: TargetRef) -> Result<Vec<Uuid>> {
        let mut rows = self.bindings.write();
        let (removed, kept): (Vec<InteractionBinding>, Vec<InteractionBinding>) =
            rows.drain(..).partition(|b| b.target == target);
        *rows = kept;
        Ok(removed.into_iter().map(|b| b.interaction_id).collect())
    }

    async fn count_interactions(&self, target: TargetRef, kind: InteractionKind) -> Result<i64> {
        Ok(self
            .bindings
            .read()
            .iter()
            .filter(|b| b.target == target)
            .filter_map(|b| self.interactions.get(&b.interaction_id))
            .filter(|i| i.kind == kind)
            .count() as i64)
    }

    async fn ratings_of(&self, target: TargetRef) -> Result<Vec<Interaction>> {
        Ok(self
            .bindings
            .read()
            .iter()
            .filter(|b| b.target == target)
            .filter_map(|b| self.interactions.get(&b.interaction_id).map(|i| i.clone()))
            .filter(|i| i.kind == InteractionKind::Rating)
            .collect())
    }
}

#[async_trait]
impl AssociationRepository for MemoryStore {
    async fn insert(&self, edge: &AssociationEdge) -> Result<()> {
        self.edges.write().push(edge.clone());
        Ok(())
    }

    async fn exists_between(&self, source_id: Uuid, target_id: Uuid) -> Result<bool> {
        Ok(self
            .edges
            .read()
            .iter()
            .any(|e| e.source_id == source_id && e.target_id == target_id))
    }

    async fn edges_from(
        &self,
        source_id: Uuid,
        kind: Option<AssociationKind>,
    ) -> Result<Vec<AssociationEdge>> {
        Ok(self
            .edges
            .read()
            .iter()
            .filter(|e| e.source_id == source_id && kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect())
    }

    async fn remove_touching(&self, id: Uuid) -> Result<usize> {
        let mut rows = self.edges.write();
        let before = rows.len();
        rows.retain(|e| e.source_id != id && e.target_id != id);
        Ok(before - rows.len())
    }
}
