//! 关联图管理器
//!
//! 赛事之间的有向带类型边（阶段/赛道/前置）。插入时拒绝自环与
//! 重复的 (source, target) 对，唯一性不区分边类型；stage 与
//! prerequisite 边做同类型可达性环检测，track 边豁免。
//! 环检测每次插入全量扫描，调用间不保留增量状态。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

use arena_shared::domain::{AssociationEdge, AssociationKind};
use arena_shared::store::AssociationRepository;

use crate::error::{RelationError, Result};

/// 关联图管理器
pub struct AssociationGraph {
    repo: Arc<dyn AssociationRepository>,
}

impl AssociationGraph {
    pub fn new(repo: Arc<dyn AssociationRepository>) -> Self {
        Self { repo }
    }

    /// 新建关联边
    ///
    /// 校验顺序：自环 -> 重复对 -> 环。全部通过后落行并返回边。
    #[instrument(skip(self), fields(%source_id, %target_id, ?kind))]
    pub async fn add_edge(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        kind: AssociationKind,
        stage_order: Option<i32>,
    ) -> Result<AssociationEdge> {
        if source_id == target_id {
            return Err(RelationError::SelfReference);
        }

        if self.repo.exists_between(source_id, target_id).await? {
            return Err(RelationError::DuplicateAssociation);
        }

        if cycle_checked(kind) && self.has_cycle(source_id, target_id, kind).await? {
            return Err(RelationError::CircularAssociation);
        }

        let edge = AssociationEdge {
            source_id,
            target_id,
            kind,
            stage_order,
            created_at: Utc::now(),
        };
        self.repo.insert(&edge).await?;
        debug!("关联边已创建");
        Ok(edge)
    }

    /// 判断新边 source -> target 是否成环
    ///
    /// 从 target 出发做迭代 DFS，只走同类型的出边；若能回到 source，
    /// 加入这条边就会构成环。
    pub async fn has_cycle(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        kind: AssociationKind,
    ) -> Result<bool> {
        let mut stack = vec![target_id];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == source_id {
                return Ok(true);
            }
            if !visited.insert(current) {
                continue;
            }
            for edge in self.repo.edges_from(current, Some(kind)).await? {
                if !visited.contains(&edge.target_id) {
                    stack.push(edge.target_id);
                }
            }
        }

        Ok(false)
    }

    /// 阶段边按 stage_order 升序读取，空值排最后
    pub async fn stages_of(&self, source_id: Uuid) -> Result<Vec<AssociationEdge>> {
        let mut edges = self
            .repo
            .edges_from(source_id, Some(AssociationKind::Stage))
            .await?;
        edges.sort_by_key(|e| match e.stage_order {
            Some(order) => (0, order),
            None => (1, 0),
        });
        Ok(edges)
    }

    /// 其余类型的边无定义顺序，按存储顺序返回
    pub async fn edges_of(
        &self,
        source_id: Uuid,
        kind: Option<AssociationKind>,
    ) -> Result<Vec<AssociationEdge>> {
        Ok(self.repo.edges_from(source_id, kind).await?)
    }
}

/// track 边不参与环检测
fn cycle_checked(kind: AssociationKind) -> bool {
    matches!(kind, AssociationKind::Stage | AssociationKind::Prerequisite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::store::MemoryStore;

    fn graph() -> AssociationGraph {
        AssociationGraph::new(MemoryStore::shared())
    }

    #[tokio::test]
    async fn test_self_loop_rejected() {
        let graph = graph();
        let id = Uuid::new_v4();

        let err = graph
            .add_edge(id, id, AssociationKind::Track, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot associate an entity with itself");
    }

    #[tokio::test]
    async fn test_duplicate_pair_rejected_across_kinds() {
        let graph = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        graph
            .add_edge(a, b, AssociationKind::Stage, Some(1))
            .await
            .unwrap();

        // 同一对节点，换一种边类型同样被拒
        let err = graph
            .add_edge(a, b, AssociationKind::Track, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "association between these entities already exists"
        );
    }

    #[tokio::test]
    async fn test_stage_chain_cycle_rejected() {
        let graph = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        graph
            .add_edge(a, b, AssociationKind::Stage, Some(1))
            .await
            .unwrap();
        graph
            .add_edge(b, c, AssociationKind::Stage, Some(2))
            .await
            .unwrap();

        let err = graph
            .add_edge(c, a, AssociationKind::Stage, Some(3))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "association would create a cycle");
    }

    #[tokio::test]
    async fn test_track_edge_exempt_from_cycle_check() {
        let graph = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        graph
            .add_edge(a, b, AssociationKind::Stage, Some(1))
            .await
            .unwrap();
        graph
            .add_edge(b, c, AssociationKind::Stage, Some(2))
            .await
            .unwrap();

        // 阶段链上尚无直连边的节点对，track 边随意建：不做环检测
        graph
            .add_edge(a, c, AssociationKind::Track, None)
            .await
            .unwrap();
        graph
            .add_edge(c, b, AssociationKind::Track, None)
            .await
            .unwrap();
        graph
            .add_edge(b, a, AssociationKind::Track, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prerequisite_cycle_rejected_but_cross_kind_path_ignored() {
        let graph = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        // a -stage-> b -prerequisite-> c：环检测只沿同类型边走
        graph
            .add_edge(a, b, AssociationKind::Stage, Some(1))
            .await
            .unwrap();
        graph
            .add_edge(b, c, AssociationKind::Prerequisite, None)
            .await
            .unwrap();

        // c -stage-> a 不成 stage 环（b->c 是 prerequisite 边）
        graph
            .add_edge(c, a, AssociationKind::Stage, None)
            .await
            .unwrap();

        // 但 c -prerequisite-> b 会构成 prerequisite 环
        let err = graph
            .add_edge(c, b, AssociationKind::Prerequisite, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "association would create a cycle");
    }

    #[tokio::test]
    async fn test_stage_reads_ordered_nulls_last() {
        let graph = graph();
        let root = Uuid::new_v4();

        let unordered = Uuid::new_v4();
        let second = Uuid::new_v4();
        let first = Uuid::new_v4();
        graph
            .add_edge(root, unordered, AssociationKind::Stage, None)
            .await
            .unwrap();
        graph
            .add_edge(root, second, AssociationKind::Stage, Some(2))
            .await
            .unwrap();
        graph
            .add_edge(root, first, AssociationKind::Stage, Some(1))
            .await
            .unwrap();

        let stages = graph.stages_of(root).await.unwrap();
        let targets: Vec<Uuid> = stages.iter().map(|e| e.target_id).collect();
        assert_eq!(targets, vec![first, second, unordered]);
    }
}
