//! 共享库
//!
//! 包含通知服务共用的配置、数据库连接、错误处理、可观测性以及进程内 TTL 缓存等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod observability;
