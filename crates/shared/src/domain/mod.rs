//! 领域模型
//!
//! 平台实体定义与关联行。实体只保留规则引擎和关系图层
//! 实际消费的字段，完整的内容管理字段由外部服务负责。

pub mod entities;

pub use entities::*;
