//! 关系图完整性层
//!
//! 维护平台的关系完整性：
//! - 关联图管理：赛事之间带类型的有向边，拒绝自环、重复与成环
//! - 级联删除编排：按固定顺序清理关联行、多态绑定与互动，最后软删实体
//! - 缓存维护：冗余计数与平均评分的全量重算，以显式命令建模

pub mod association;
pub mod caches;
pub mod cascade;
pub mod error;

pub use association::AssociationGraph;
pub use caches::{CacheMaintainer, CacheRecompute};
pub use cascade::{CascadeDeleter, CascadeReport};
pub use error::{RelationError, Result};
