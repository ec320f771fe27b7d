//! 后置动作实现
//!
//! 排名、取消资格标记与证书签发。动作在触发写入提交后执行，
//! 单个动作的失败由钩子执行器捕获转为日志，不会回滚触发写入。

use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use uuid::Uuid;

use arena_shared::domain::{Post, PostKind, PostLinkKind, PostStatus};
use arena_shared::rules::{ActionKind, Rule};
use arena_shared::store::{
    CategoryRepository, MembershipRepository, PostRepository, Repositories,
};

use crate::context::CheckContext;
use crate::error::{Result, RuleError};
use crate::evaluator::{as_f64, json_field};

/// 排名标签前缀，rank_1 / rank_2 / ...
pub const RANK_TAG_PREFIX: &str = "rank_";

/// 取消资格标签，带任一标签的投稿不参与排名
pub const DISQUALIFIED_TAGS: [&str; 3] = ["team_too_small", "missing_attachment", "disqualified"];

const TAG_TEAM_TOO_SMALL: &str = "team_too_small";
const TAG_MISSING_ATTACHMENT: &str = "missing_attachment";

/// 排序方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SortOrder {
    #[default]
    Desc,
    Asc,
}

#[derive(Debug, Deserialize)]
struct RankingParams {
    #[serde(default = "default_rank_field")]
    field: String,
    #[serde(default)]
    order: SortOrder,
}

fn default_rank_field() -> String {
    "score".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FlagTarget {
    Group,
    Post,
}

#[derive(Debug, Deserialize)]
struct FlagParams {
    target: FlagTarget,
    #[serde(default)]
    formats: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AwardBand {
    /// 闭区间 [最好名次, 最差名次]
    rank_range: [i64; 2],
    title: String,
}

#[derive(Debug, Deserialize)]
struct CertificateParams {
    /// 按声明顺序匹配，每个帖子命中第一个满足的区间
    awards: Vec<AwardBand>,
}

/// 后置动作执行器
pub struct ActionExecutor {
    repos: Repositories,
}

impl ActionExecutor {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// 执行单个动作，返回一行执行摘要
    pub async fn execute(
        &self,
        kind: &ActionKind,
        params: Option<&Value>,
        rule: &Rule,
        category_id: Uuid,
        _ctx: &CheckContext,
    ) -> Result<String> {
        match kind {
            ActionKind::ComputeRanking => {
                let params: RankingParams = decode_params(kind, params)?;
                self.compute_ranking(&params, category_id).await
            }
            ActionKind::FlagDisqualified => {
                let params: FlagParams = decode_params(kind, params)?;
                self.flag_disqualified(&params, rule, category_id).await
            }
            ActionKind::AwardCertificate => {
                let params: CertificateParams = decode_params(kind, params)?;
                self.award_certificate(&params, category_id).await
            }
            ActionKind::Unknown(name) => {
                debug!(action = %name, "未识别的动作，按空操作处理");
                Ok(format!("skipped unknown action '{}'", name))
            }
        }
    }

    /// 计算赛事排名
    ///
    /// 按命名数值字段排序；带取消资格标签或字段为空的投稿不参与；
    /// 并列共享同一名次，下一个不同名次按并列组大小跳号
    /// （两个并列第 1 之后是第 3）。重复执行前先清掉旧的 rank 标签。
    #[instrument(skip(self, params), fields(category_id = %category_id))]
    async fn compute_ranking(&self, params: &RankingParams, category_id: Uuid) -> Result<String> {
        let ids = self.repos.categories.posts_in(category_id).await?;
        let posts: Vec<Post> = self
            .repos
            .posts
            .list(&ids)
            .await?
            .into_iter()
            .filter(|p| p.deleted_at.is_none())
            .collect();

        for post in &posts {
            self.repos
                .posts
                .remove_tags_with_prefix(post.id, RANK_TAG_PREFIX)
                .await?;
        }

        let mut ranked: Vec<(Uuid, f64)> = Vec::new();
        for post in &posts {
            if DISQUALIFIED_TAGS.iter().any(|t| post.has_tag(t)) {
                continue;
            }
            let projected = serde_json::to_value(post)?;
            // 字段为空的投稿整体排除，不授予任何名次
            if let Some(value) = json_field(&projected, &params.field).and_then(as_f64) {
                ranked.push((post.id, value));
            }
        }

        match params.order {
            SortOrder::Desc => ranked.sort_by(|a, b| b.1.total_cmp(&a.1)),
            SortOrder::Asc => ranked.sort_by(|a, b| a.1.total_cmp(&b.1)),
        }

        let mut current_rank = 0usize;
        let mut previous_value = None;
        for (position, (post_id, value)) in ranked.iter().enumerate() {
            if previous_value != Some(*value) {
                current_rank = position + 1;
                previous_value = Some(*value);
            }
            self.repos
                .posts
                .add_tag(*post_id, &format!("{}{}", RANK_TAG_PREFIX, current_rank))
                .await?;
        }

        Ok(format!(
            "compute_ranking: ranked {} of {} submissions",
            ranked.len(),
            posts.len()
        ))
    }

    /// 标记取消资格
    ///
    /// target=group：已通过成员数低于规则 min_team_size 的小组，
    /// 其成员在赛事内的全部投稿打 team_too_small 标签；
    /// target=post：缺少必需附件的投稿打 missing_attachment 标签。
    #[instrument(skip(self, params, rule), fields(category_id = %category_id))]
    async fn flag_disqualified(
        &self,
        params: &FlagParams,
        rule: &Rule,
        category_id: Uuid,
    ) -> Result<String> {
        match params.target {
            FlagTarget::Group => self.flag_small_groups(rule, category_id).await,
            FlagTarget::Post => {
                self.flag_missing_attachments(params, rule, category_id)
                    .await
            }
        }
    }

    async fn flag_small_groups(&self, rule: &Rule, category_id: Uuid) -> Result<String> {
        let Some(min) = rule.min_team_size else {
            return Ok("flag_disqualified: rule has no min_team_size, nothing to flag".to_string());
        };

        let mut undersized_members: HashSet<Uuid> = HashSet::new();
        for group_id in self.repos.categories.groups_in(category_id).await? {
            let accepted = self
                .repos
                .memberships
                .count_for_group(group_id, Some(arena_shared::domain::MembershipStatus::Accepted))
                .await?;
            if accepted >= min {
                continue;
            }
            for membership in self.repos.memberships.list_for_group(group_id).await? {
                undersized_members.insert(membership.user_id);
            }
        }

        let mut flagged = 0usize;
        for post in self.category_posts(category_id).await? {
            if undersized_members.contains(&post.author_id) {
                self.repos
                    .posts
                    .add_tag(post.id, TAG_TEAM_TOO_SMALL)
                    .await?;
                flagged += 1;
            }
        }

        Ok(format!("flag_disqualified: tagged {} posts from undersized teams", flagged))
    }

    async fn flag_missing_attachments(
        &self,
        params: &FlagParams,
        rule: &Rule,
        category_id: Uuid,
    ) -> Result<String> {
        let formats = params
            .formats
            .clone()
            .or_else(|| rule.submission_formats.clone());

        let mut flagged = 0usize;
        for post in self.category_posts(category_id).await? {
            let resources = self.repos.posts.resources_of(post.id).await?;
            let has_required = match &formats {
                Some(fs) => resources
                    .iter()
                    .any(|r| fs.iter().any(|f| f.eq_ignore_ascii_case(&r.format))),
                None => !resources.is_empty(),
            };
            if !has_required {
                self.repos
                    .posts
                    .add_tag(post.id, TAG_MISSING_ATTACHMENT)
                    .await?;
                flagged += 1;
            }
        }

        Ok(format!(
            "flag_disqualified: tagged {} posts missing attachments",
            flagged
        ))
    }

    /// 签发证书
    ///
    /// 读取已有的 rank_N 标签与有序区间表匹配，每个帖子命中第一个
    /// 满足的区间；为投稿作者创建已发布的证书帖，并用 post_post
    /// 引用行回链投稿。依赖同一检查列表中更早的 compute_ranking。
    #[instrument(skip(self, params), fields(category_id = %category_id))]
    async fn award_certificate(
        &self,
        params: &CertificateParams,
        category_id: Uuid,
    ) -> Result<String> {
        let mut issued = 0usize;
        for post in self.category_posts(category_id).await? {
            let Some(rank) = rank_of(&post) else {
                continue;
            };
            let Some(band) = params
                .awards
                .iter()
                .find(|b| rank >= b.rank_range[0] && rank <= b.rank_range[1])
            else {
                continue;
            };

            let certificate = Post {
                id: Uuid::new_v4(),
                author_id: post.author_id,
                title: band.title.clone(),
                kind: PostKind::Certificate,
                status: PostStatus::Published,
                score: None,
                tags: Vec::new(),
                like_count: 0,
                comment_count: 0,
                average_rating: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
            };
            self.repos.posts.insert(&certificate).await?;
            self.repos
                .posts
                .link(certificate.id, post.id, PostLinkKind::Reference)
                .await?;
            issued += 1;
        }

        Ok(format!("award_certificate: issued {} certificates", issued))
    }

    /// 赛事内未删除的投稿
    async fn category_posts(&self, category_id: Uuid) -> Result<Vec<Post>> {
        let ids = self.repos.categories.posts_in(category_id).await?;
        Ok(self
            .repos
            .posts
            .list(&ids)
            .await?
            .into_iter()
            .filter(|p| p.deleted_at.is_none())
            .collect())
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(
    kind: &ActionKind,
    params: Option<&Value>,
) -> Result<T> {
    let value = params.cloned().unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|e| RuleError::InvalidActionParams {
        action: kind.to_string(),
        detail: e.to_string(),
    })
}

/// 帖子当前的 rank 标签值
fn rank_of(post: &Post) -> Option<i64> {
    post.tags
        .iter()
        .find_map(|t| t.strip_prefix(RANK_TAG_PREFIX))
        .and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    use arena_shared::domain::MembershipStatus;
    use arena_shared::store::ResourceRepository;
    use arena_shared::test_utils::{
        sample_category, sample_membership, sample_post, sample_resource, sample_rule, scored_post,
    };

    async fn seed_category(repos: &Repositories) -> Uuid {
        let category = sample_category("ranked");
        repos.categories.insert(&category).await.unwrap();
        category.id
    }

    async fn submit(repos: &Repositories, category_id: Uuid, post: &Post) {
        repos.posts.insert(post).await.unwrap();
        repos.categories.link_post(category_id, post.id).await.unwrap();
    }

    async fn tags_of(repos: &Repositories, post_id: Uuid) -> Vec<String> {
        repos.posts.get(post_id).await.unwrap().unwrap().tags
    }

    fn executor(repos: &Repositories) -> ActionExecutor {
        ActionExecutor::new(repos.clone())
    }

    #[tokio::test]
    async fn test_ranking_desc_assigns_sequential_ranks() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let first = scored_post(Uuid::new_v4(), 90.2);
        let second = scored_post(Uuid::new_v4(), 85.5);
        let third = scored_post(Uuid::new_v4(), 78.0);
        for post in [&first, &second, &third] {
            submit(&repos, category_id, post).await;
        }

        let summary = executor(&repos)
            .compute_ranking(
                &RankingParams {
                    field: "score".to_string(),
                    order: SortOrder::Desc,
                },
                category_id,
            )
            .await
            .unwrap();

        assert!(summary.contains("ranked 3 of 3"));
        assert_eq!(tags_of(&repos, first.id).await, vec!["rank_1"]);
        assert_eq!(tags_of(&repos, second.id).await, vec!["rank_2"]);
        assert_eq!(tags_of(&repos, third.id).await, vec!["rank_3"]);
    }

    #[tokio::test]
    async fn test_ranking_ties_share_rank_and_skip() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let tied_a = scored_post(Uuid::new_v4(), 90.0);
        let tied_b = scored_post(Uuid::new_v4(), 90.0);
        let third = scored_post(Uuid::new_v4(), 80.0);
        for post in [&tied_a, &tied_b, &third] {
            submit(&repos, category_id, post).await;
        }

        executor(&repos)
            .compute_ranking(
                &RankingParams {
                    field: "score".to_string(),
                    order: SortOrder::Desc,
                },
                category_id,
            )
            .await
            .unwrap();

        // 两个并列第 1，下一名是第 3
        assert_eq!(tags_of(&repos, tied_a.id).await, vec!["rank_1"]);
        assert_eq!(tags_of(&repos, tied_b.id).await, vec!["rank_1"]);
        assert_eq!(tags_of(&repos, third.id).await, vec!["rank_3"]);
    }

    #[tokio::test]
    async fn test_ranking_excludes_null_and_disqualified() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let scored = scored_post(Uuid::new_v4(), 70.0);
        let unscored = sample_post(Uuid::new_v4());
        let mut disqualified = scored_post(Uuid::new_v4(), 99.0);
        disqualified.tags.push("team_too_small".to_string());
        for post in [&scored, &unscored, &disqualified] {
            submit(&repos, category_id, post).await;
        }

        executor(&repos)
            .compute_ranking(
                &RankingParams {
                    field: "score".to_string(),
                    order: SortOrder::Desc,
                },
                category_id,
            )
            .await
            .unwrap();

        assert_eq!(tags_of(&repos, scored.id).await, vec!["rank_1"]);
        // 无分数的投稿没有任何 rank 标签
        assert!(tags_of(&repos, unscored.id).await.is_empty());
        // 被取消资格的投稿保留取消标签，但不参与排名
        assert_eq!(tags_of(&repos, disqualified.id).await, vec!["team_too_small"]);
    }

    #[tokio::test]
    async fn test_rerank_strips_stale_tags() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let mut post = scored_post(Uuid::new_v4(), 50.0);
        post.tags.push("rank_7".to_string());
        submit(&repos, category_id, &post).await;

        executor(&repos)
            .compute_ranking(
                &RankingParams {
                    field: "score".to_string(),
                    order: SortOrder::Desc,
                },
                category_id,
            )
            .await
            .unwrap();

        assert_eq!(tags_of(&repos, post.id).await, vec!["rank_1"]);
    }

    #[tokio::test]
    async fn test_flag_small_groups_tags_member_posts() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let lonely_author = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        repos
            .categories
            .link_group(category_id, group_id)
            .await
            .unwrap();
        repos
            .memberships
            .insert(&sample_membership(
                group_id,
                lonely_author,
                MembershipStatus::Accepted,
            ))
            .await
            .unwrap();

        let entry = sample_post(lonely_author);
        let unrelated = sample_post(Uuid::new_v4());
        submit(&repos, category_id, &entry).await;
        submit(&repos, category_id, &unrelated).await;

        let mut rule = sample_rule("teams");
        rule.min_team_size = Some(3);

        executor(&repos)
            .flag_disqualified(
                &FlagParams {
                    target: FlagTarget::Group,
                    formats: None,
                },
                &rule,
                category_id,
            )
            .await
            .unwrap();

        assert_eq!(tags_of(&repos, entry.id).await, vec!["team_too_small"]);
        assert!(tags_of(&repos, unrelated.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_flag_posts_missing_attachment() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let with_pdf = sample_post(Uuid::new_v4());
        let bare = sample_post(Uuid::new_v4());
        submit(&repos, category_id, &with_pdf).await;
        submit(&repos, category_id, &bare).await;

        let pdf = sample_resource("pdf");
        repos.resources.insert(&pdf).await.unwrap();
        repos
            .posts
            .attach_resource(with_pdf.id, pdf.id)
            .await
            .unwrap();

        executor(&repos)
            .flag_disqualified(
                &FlagParams {
                    target: FlagTarget::Post,
                    formats: Some(vec!["pdf".to_string()]),
                },
                &sample_rule("attachments"),
                category_id,
            )
            .await
            .unwrap();

        assert!(tags_of(&repos, with_pdf.id).await.is_empty());
        assert_eq!(tags_of(&repos, bare.id).await, vec!["missing_attachment"]);
    }

    #[tokio::test]
    async fn test_award_certificate_first_band_wins() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let mut winner = scored_post(Uuid::new_v4(), 95.0);
        winner.tags.push("rank_1".to_string());
        let mut runner_up = scored_post(Uuid::new_v4(), 80.0);
        runner_up.tags.push("rank_4".to_string());
        submit(&repos, category_id, &winner).await;
        submit(&repos, category_id, &runner_up).await;

        let summary = executor(&repos)
            .award_certificate(
                &CertificateParams {
                    awards: vec![
                        AwardBand {
                            rank_range: [1, 1],
                            title: "Gold".to_string(),
                        },
                        AwardBand {
                            rank_range: [1, 3],
                            title: "Finalist".to_string(),
                        },
                    ],
                },
                category_id,
            )
            .await
            .unwrap();

        // rank_1 命中第一个区间 Gold；rank_4 不在任何区间内
        assert!(summary.contains("issued 1"));

        // 证书帖通过引用行回链投稿，作者与投稿一致
        let links = repos.posts.links_to(winner.id).await.unwrap();
        assert_eq!(links.len(), 1);
        let cert = repos
            .posts
            .get(links[0].source_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cert.kind, PostKind::Certificate);
        assert_eq!(cert.status, PostStatus::Published);
        assert_eq!(cert.title, "Gold");
        assert_eq!(cert.author_id, winner.author_id);

        assert!(repos.posts.links_to(runner_up.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_is_noop() {
        let (repos, _) = Repositories::in_memory();
        let category_id = seed_category(&repos).await;

        let summary = executor(&repos)
            .execute(
                &ActionKind::Unknown("launch_fireworks".to_string()),
                None,
                &sample_rule("noop"),
                category_id,
                &CheckContext::new(),
            )
            .await
            .unwrap();

        assert!(summary.contains("launch_fireworks"));
    }
}
