//! 规则模块
//!
//! 规则、检查定义与条件联合体的数据模型。条件在加载期解码成
//! 带标签的变体，未识别的类型落入 Unknown 变体并在运行期直接放行。

pub mod models;

pub use models::*;
