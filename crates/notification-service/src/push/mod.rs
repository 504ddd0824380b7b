//! 推送模块
//!
//! - `gateway`: 推送网关 trait 与消息结构
//! - `fcm`: FCM HTTP v1 实现，以及推送未启用时使用的日志网关
//! - `token`: 推送 token 目录
//! - `dispatcher`: 单发、批量、主题推送与失效 token 清理

pub mod dispatcher;
pub mod fcm;
pub mod gateway;
pub mod token;

pub use dispatcher::{
    BulkPushReport, PushDispatcher, PushFailureReason, PushOptions, PushOutcome, PushPayload,
    TopicOutcome,
};
pub use fcm::{FcmGateway, LoggingPushGateway};
pub use gateway::{
    GatewayError, MulticastResponse, PushGateway, PushMessage, PushTarget, TokenSendResult,
    TopicManagementResponse, WebPushVariant,
};
pub use token::{TokenDirectory, TokenLookup};
