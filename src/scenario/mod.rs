//! 场景配置
//!
//! 外部 CLI/配置装载器只负责填充这里的类型化结构；所有参数在事件循环
//! 开始之前做一次校验，非法配置直接拒绝运行。

mod config;

pub use config::{AttackConfig, ConfigError, LinkConfig, ScenarioConfig};
