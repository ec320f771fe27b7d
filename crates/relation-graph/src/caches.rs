//! 冗余缓存维护器
//!
//! 缓存字段一律全量重算，从不增量修补。重算以显式命令
//! （CacheRecompute）建模：级联删除先收集受影响目标，去重后
//! 每个目标恰好重算一次；测试和演练场景可以只取命令不执行。

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use arena_shared::domain::{Interaction, InteractionKind, InteractionValue, TargetKind, TargetRef};
use arena_shared::store::{
    BindingRepository, CategoryRepository, PostRepository, Repositories, UserRepository,
};

use crate::error::Result;

/// 缓存重算命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRecompute {
    /// 帖子的 like_count / comment_count / average_rating
    PostEngagement(Uuid),
    /// 用户的 follower_count / following_count
    UserFollowCounts(Uuid),
    /// 赛事的 participant_count（已报名小组数）
    CategoryParticipants(Uuid),
}

/// 缓存维护器
pub struct CacheMaintainer {
    repos: Repositories,
}

impl CacheMaintainer {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// 互动绑定变化影响到的目标对应的重算命令
    ///
    /// 只有帖子带互动类缓存；赛事与用户的缓存来源是关联行，
    /// 不随绑定变化。
    pub fn plan_for_target(target: TargetRef) -> Option<CacheRecompute> {
        match target.kind {
            TargetKind::Post => Some(CacheRecompute::PostEngagement(target.id)),
            TargetKind::Category | TargetKind::User => None,
        }
    }

    /// 去重后的批量命令
    pub fn plan_for_targets(targets: impl IntoIterator<Item = TargetRef>) -> Vec<CacheRecompute> {
        let mut seen = HashSet::new();
        targets
            .into_iter()
            .filter_map(Self::plan_for_target)
            .filter(|cmd| seen.insert(*cmd))
            .collect()
    }

    /// 执行一批重算命令
    pub async fn apply(&self, commands: &[CacheRecompute]) -> Result<()> {
        for command in commands {
            self.apply_one(*command).await?;
        }
        Ok(())
    }

    /// 执行单条重算命令
    pub async fn apply_one(&self, command: CacheRecompute) -> Result<()> {
        debug!(?command, "重算缓存");
        match command {
            CacheRecompute::PostEngagement(post_id) => {
                self.recompute_post_engagement(post_id).await
            }
            CacheRecompute::UserFollowCounts(user_id) => {
                self.recompute_user_follow_counts(user_id).await
            }
            CacheRecompute::CategoryParticipants(category_id) => {
                self.recompute_category_participants(category_id).await
            }
        }
    }

    /// 全量重算帖子的互动缓存
    async fn recompute_post_engagement(&self, post_id: Uuid) -> Result<()> {
        let target = TargetRef::post(post_id);
        let likes = self
            .repos
            .bindings
            .count_interactions(target, InteractionKind::Like)
            .await?;
        let comments = self
            .repos
            .bindings
            .count_interactions(target, InteractionKind::Comment)
            .await?;
        let ratings = self.repos.bindings.ratings_of(target).await?;

        self.repos.posts.set_like_count(post_id, likes).await?;
        self.repos.posts.set_comment_count(post_id, comments).await?;
        self.repos
            .posts
            .set_average_rating(post_id, average_rating(&ratings))
            .await?;
        Ok(())
    }

    /// 全量重算用户的关注缓存
    async fn recompute_user_follow_counts(&self, user_id: Uuid) -> Result<()> {
        let followers = self.repos.users.count_followers(user_id).await?;
        let following = self.repos.users.count_following(user_id).await?;
        self.repos
            .users
            .set_follow_counts(user_id, followers, following)
            .await?;
        Ok(())
    }

    /// 全量重算赛事的报名缓存
    async fn recompute_category_participants(&self, category_id: Uuid) -> Result<()> {
        let count = self.repos.categories.groups_in(category_id).await?.len() as i64;
        self.repos
            .categories
            .set_participant_count(category_id, count)
            .await?;
        Ok(())
    }
}

/// 平均评分：每条评分先对自身各维度求简单平均，再对所有评分的
/// 均值求平均，保留两位小数。没有评分时为 None，不是零。
pub fn average_rating(ratings: &[Interaction]) -> Option<f64> {
    let per_rating_means: Vec<f64> = ratings
        .iter()
        .filter_map(|rating| match &rating.value {
            InteractionValue::Scores(scores) if !scores.is_empty() => {
                Some(scores.values().sum::<f64>() / scores.len() as f64)
            }
            _ => None,
        })
        .collect();

    if per_rating_means.is_empty() {
        return None;
    }

    let mean = per_rating_means.iter().sum::<f64>() / per_rating_means.len() as f64;
    Some(round2(mean))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
