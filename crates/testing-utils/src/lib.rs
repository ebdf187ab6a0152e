//! # 测试工具
//!
//! 供工作区内各crate共享的测试构建器与夹具。作为dev-dependency引入：
//!
//! ```toml
//! [dev-dependencies]
//! cluster-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;

pub use builders::*;
pub use helpers::*;
