//! 共享库
//!
//! 包含规则引擎与关系图层共用的配置、错误处理、领域模型、
//! 仓储接口以及内存存储实现。

pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod rules;
pub mod store;
pub mod test_utils;

pub use error::{ArenaError, Result};
