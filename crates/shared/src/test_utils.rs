//! 测试工具模块
//!
//! 提供各实体的样例构造函数，用于单元测试与集成测试。
//! 所有构造函数生成随机 id、合理的默认字段，调用方按需覆盖。

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Category, CategoryStatus, Group, Interaction, InteractionKind, InteractionValue, Membership,
    MembershipStatus, Post, PostKind, PostStatus, Resource, User,
};
use crate::rules::{Rule, RuleLink};

/// 样例用户
pub fn sample_user(username: &str) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        follower_count: 0,
        following_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

/// 样例赛事（已发布）
pub fn sample_category(name: &str) -> Category {
    Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
        status: CategoryStatus::Published,
        participant_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

/// 样例帖子（已发布的普通帖）
pub fn sample_post(author_id: Uuid) -> Post {
    Post {
        id: Uuid::new_v4(),
        author_id,
        title: "sample post".to_string(),
        kind: PostKind::Regular,
        status: PostStatus::Published,
        score: None,
        tags: Vec::new(),
        like_count: 0,
        comment_count: 0,
        average_rating: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

/// 带评审得分的样例投稿
pub fn scored_post(author_id: Uuid, score: f64) -> Post {
    Post {
        score: Some(score),
        ..sample_post(author_id)
    }
}

/// 样例小组
pub fn sample_group(owner_id: Uuid) -> Group {
    Group {
        id: Uuid::new_v4(),
        name: "sample group".to_string(),
        owner_id,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

/// 样例成员关系
pub fn sample_membership(group_id: Uuid, user_id: Uuid, status: MembershipStatus) -> Membership {
    Membership {
        id: Uuid::new_v4(),
        group_id,
        user_id,
        status,
        created_at: Utc::now(),
    }
}

/// 样例附件
pub fn sample_resource(format: &str) -> Resource {
    Resource {
        id: Uuid::new_v4(),
        file_name: format!("attachment.{}", format),
        format: format.to_string(),
        created_at: Utc::now(),
    }
}

/// 样例点赞
pub fn sample_like(author_id: Uuid) -> Interaction {
    Interaction {
        id: Uuid::new_v4(),
        author_id,
        kind: InteractionKind::Like,
        value: InteractionValue::None,
        parent_id: None,
        created_at: Utc::now(),
    }
}

/// 样例评论，parent_id 可选用于构造回复树
pub fn sample_comment(author_id: Uuid, text: &str, parent_id: Option<Uuid>) -> Interaction {
    Interaction {
        id: Uuid::new_v4(),
        author_id,
        kind: InteractionKind::Comment,
        value: InteractionValue::Text(text.to_string()),
        parent_id,
        created_at: Utc::now(),
    }
}

/// 样例评分，传入 (维度, 分数) 对
pub fn sample_rating(author_id: Uuid, scores: &[(&str, f64)]) -> Interaction {
    let scores: BTreeMap<String, f64> = scores
        .iter()
        .map(|(dim, score)| (dim.to_string(), *score))
        .collect();
    Interaction {
        id: Uuid::new_v4(),
        author_id,
        kind: InteractionKind::Rating,
        value: InteractionValue::Scores(scores),
        parent_id: None,
        created_at: Utc::now(),
    }
}

/// 样例规则（空检查列表）
pub fn sample_rule(name: &str) -> Rule {
    Rule::new(name)
}

/// 样例规则挂载
pub fn sample_rule_link(category_id: Uuid, rule_id: Uuid, priority: i32) -> RuleLink {
    RuleLink {
        category_id,
        rule_id,
        priority,
    }
}
