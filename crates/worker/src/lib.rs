//! # Worker层
//!
//! 消费触发队列的有界Worker池与内置任务类型提供者。

pub mod providers;
pub mod service;

pub use providers::{NoopProvider, ShellProvider};
pub use service::{WorkerService, WorkerServiceBuilder};
