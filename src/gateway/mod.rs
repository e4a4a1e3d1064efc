//! Agent 网关：向远端对话 Agent 提交 prompt 并管理会话
//!
//! - **AgentGateway**: submit / reload / reset_session / rotate_identity
//! - **identity**: 身份池与有界轮换
//! - **session**: 会话内对话历史
//! - **openai**: OpenAI 兼容端点实现（async-openai）
//! - **scripted**: 预置回复的脚本化网关（测试与演练用）

pub mod identity;
pub mod openai;
pub mod scripted;
pub mod session;

use async_trait::async_trait;
use thiserror::Error;

pub use identity::{Identity, IdentityPool, RotationExhausted};
pub use openai::OpenAiGateway;
pub use scripted::{GatewayCall, ScriptedGateway};
pub use session::{Message, Role, SessionHistory};

/// 一次提交的结果（网关正常工作时）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// Agent 完成回复
    Completed(String),
    /// 被内容策略拦截
    Blocked,
    /// 没有拿到回复内容
    NoResponse,
}

/// 网关故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    /// 无法继续（凭据缺失、鉴权失败等），整次运行终止
    #[error("fatal gateway error: {0}")]
    Fatal(String),
}

/// 远端 Agent 的会话式接口；同一时刻只有一个活动会话
#[async_trait]
pub trait AgentGateway: Send {
    /// 在当前会话中提交 prompt 并等待完整回复
    async fn submit(&mut self, prompt: &str) -> Result<Submission, GatewayError>;

    /// 重新建立连接（重试前调用），当前会话丢弃
    async fn reload(&mut self) -> Result<(), GatewayError>;

    /// 开启全新会话
    async fn reset_session(&mut self) -> Result<(), GatewayError>;

    /// 切换到指定身份，并开启全新会话
    async fn rotate_identity(&mut self, identity: &Identity) -> Result<(), GatewayError>;
}

/// 限流提示关键字（小写比较）
pub(crate) const RATE_LIMIT_KEYWORDS: [&str; 6] = [
    "you've reached your rate limit",
    "you have reached your rate limit",
    "rate limit",
    "rate_limit",
    "too many requests",
    "status: 429",
];

pub(crate) fn mentions_rate_limit(text: &str) -> bool {
    let lowered = text.to_lowercase();
    RATE_LIMIT_KEYWORDS.iter().any(|k| lowered.contains(k))
}
