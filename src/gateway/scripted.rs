//! 脚本化网关（用于测试，无需 API）
//!
//! submit 依次弹出预置的结果；脚本用尽后交给 fallback 回调，没有回调则返回 NoResponse。
//! 所有调用按顺序记入 calls()，便于断言交互序列。

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{AgentGateway, GatewayError, Identity, Submission};

/// 网关上发生过的一次调用
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    Submit(String),
    Reload,
    ResetSession,
    Rotate(String),
}

type Fallback = Box<dyn FnMut(&str) -> Result<Submission, GatewayError> + Send>;

#[derive(Default)]
pub struct ScriptedGateway {
    replies: VecDeque<Result<Submission, GatewayError>>,
    reloads: VecDeque<Result<(), GatewayError>>,
    resets: VecDeque<Result<(), GatewayError>>,
    fallback: Option<Fallback>,
    calls: Vec<GatewayCall>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个完成的回复
    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.replies.push_back(Ok(Submission::Completed(text.into())));
        self
    }

    /// 追加任意提交结果
    pub fn then(mut self, outcome: Result<Submission, GatewayError>) -> Self {
        self.replies.push_back(outcome);
        self
    }

    /// 追加一次 reload 结果（用尽后 reload 总是成功）
    pub fn reload_outcome(mut self, outcome: Result<(), GatewayError>) -> Self {
        self.reloads.push_back(outcome);
        self
    }

    /// 追加一次 reset_session 结果（用尽后总是成功）
    pub fn reset_outcome(mut self, outcome: Result<(), GatewayError>) -> Self {
        self.resets.push_back(outcome);
        self
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: FnMut(&str) -> Result<Submission, GatewayError> + Send + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn calls(&self) -> &[GatewayCall] {
        &self.calls
    }

    /// 已提交的 prompt
    pub fn submitted(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Submit(prompt) => Some(prompt.as_str()),
                _ => None,
            })
            .collect()
    }

}

#[async_trait]
impl AgentGateway for ScriptedGateway {
    async fn submit(&mut self, prompt: &str) -> Result<Submission, GatewayError> {
        self.calls.push(GatewayCall::Submit(prompt.to_string()));
        if let Some(outcome) = self.replies.pop_front() {
            return outcome;
        }
        match self.fallback.as_mut() {
            Some(fallback) => fallback(prompt),
            None => Ok(Submission::NoResponse),
        }
    }

    async fn reload(&mut self) -> Result<(), GatewayError> {
        self.calls.push(GatewayCall::Reload);
        self.reloads.pop_front().unwrap_or(Ok(()))
    }

    async fn reset_session(&mut self) -> Result<(), GatewayError> {
        self.calls.push(GatewayCall::ResetSession);
        self.resets.pop_front().unwrap_or(Ok(()))
    }

    async fn rotate_identity(&mut self, identity: &Identity) -> Result<(), GatewayError> {
        self.calls.push(GatewayCall::Rotate(identity.name.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mut gateway = ScriptedGateway::new()
            .reply("một")
            .then(Err(GatewayError::Timeout))
            .with_fallback(|prompt| Ok(Submission::Completed(format!("echo: {prompt}"))));

        assert_eq!(gateway.submit("a").await, Ok(Submission::Completed("một".into())));
        assert_eq!(gateway.submit("b").await, Err(GatewayError::Timeout));
        assert_eq!(gateway.submit("c").await, Ok(Submission::Completed("echo: c".into())));
        assert_eq!(gateway.submitted(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_reload_outcomes_and_log() {
        let mut gateway = ScriptedGateway::new()
            .reload_outcome(Err(GatewayError::Transport("down".into())));
        assert!(gateway.reload().await.is_err());
        assert!(gateway.reload().await.is_ok());
        gateway.reset_session().await.unwrap();
        gateway.rotate_identity(&Identity::new("b", "KEY_B")).await.unwrap();
        assert_eq!(gateway.submit("x").await, Ok(Submission::NoResponse));
        assert_eq!(
            gateway.calls(),
            &[
                GatewayCall::Reload,
                GatewayCall::Reload,
                GatewayCall::ResetSession,
                GatewayCall::Rotate("b".into()),
                GatewayCall::Submit("x".into()),
            ]
        );
    }
}
