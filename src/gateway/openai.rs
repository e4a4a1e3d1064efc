//! OpenAI 兼容端点网关
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。会话即本地保存的对话历史：
//! reset_session 清空历史，reload 重建客户端并清空历史，rotate_identity 切换凭据后重建。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, FinishReason,
};
use async_openai::Client;
use async_trait::async_trait;
use uuid::Uuid;

use super::{mentions_rate_limit, AgentGateway, GatewayError, Identity, Message, Role, SessionHistory, Submission};
use crate::config::GatewaySection;

pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    identity: Identity,
    model: String,
    default_base_url: Option<String>,
    default_model: String,
    system_prompt: Option<String>,
    history: SessionHistory,
    request_timeout: Duration,
    session_id: Uuid,
}

impl OpenAiGateway {
    /// 用初始身份建立网关；身份的凭据环境变量缺失时返回 Fatal
    pub fn new(
        section: &GatewaySection,
        identity: Identity,
        system_prompt: Option<String>,
    ) -> Result<Self, GatewayError> {
        let (client, model) = build_client(&identity, section.base_url.as_deref(), &section.model)?;
        let gateway = Self {
            client,
            identity,
            model,
            default_base_url: section.base_url.clone(),
            default_model: section.model.clone(),
            system_prompt,
            history: SessionHistory::new(section.max_session_turns),
            request_timeout: Duration::from_secs(section.request_timeout_secs),
            session_id: Uuid::new_v4(),
        };
        tracing::info!(
            identity = %gateway.identity.name,
            model = %gateway.model,
            session = %gateway.session_id,
            "OpenAI gateway ready"
        );
        Ok(gateway)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn new_session(&mut self) {
        self.history.clear();
        self.session_id = Uuid::new_v4();
        tracing::debug!(identity = %self.identity.name, session = %self.session_id, "New session");
    }

    fn reconnect(&mut self) -> Result<(), GatewayError> {
        let (client, model) =
            build_client(&self.identity, self.default_base_url.as_deref(), &self.default_model)?;
        self.client = client;
        self.model = model;
        self.new_session();
        Ok(())
    }
}

fn build_client(
    identity: &Identity,
    default_base_url: Option<&str>,
    default_model: &str,
) -> Result<(Client<OpenAIConfig>, String), GatewayError> {
    let api_key = std::env::var(&identity.api_key_env).map_err(|_| {
        GatewayError::Fatal(format!(
            "identity '{}': environment variable {} is not set",
            identity.name, identity.api_key_env
        ))
    })?;

    let config = match identity.base_url.as_deref().or(default_base_url) {
        Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
        None => OpenAIConfig::new().with_api_key(api_key),
    };
    let model = identity.model.clone().unwrap_or_else(|| default_model.to_string());
    Ok((Client::with_config(config), model))
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    messages
        .iter()
        .map(|m| {
            Ok(match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
            })
        })
        .collect()
}

/// 按错误变体归类：HTTP 状态码优先，API 错误看 type 与 message，其余按文本
fn classify_openai_error(err: &OpenAIError) -> GatewayError {
    match err {
        OpenAIError::Reqwest(e) => match e.status().map(|status| status.as_u16()) {
            Some(429) => GatewayError::RateLimited,
            Some(401 | 403) => GatewayError::Fatal(e.to_string()),
            _ => GatewayError::Transport(e.to_string()),
        },
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            classify_error(&format!("{kind}: {}", api.message))
        }
        other => classify_error(&other.to_string()),
    }
}

/// 按错误文本归类（只匹配完整短语，不匹配裸状态码）
fn classify_error(text: &str) -> GatewayError {
    let lowered = text.to_lowercase();
    if mentions_rate_limit(&lowered) {
        GatewayError::RateLimited
    } else if [
        "invalid api key",
        "incorrect api key",
        "invalid_api_key",
        "authentication_error",
        "unauthorized",
        "status: 401",
    ]
    .iter()
    .any(|k| lowered.contains(k))
    {
        GatewayError::Fatal(text.to_string())
    } else {
        GatewayError::Transport(text.to_string())
    }
}

#[async_trait]
impl AgentGateway for OpenAiGateway {
    async fn submit(&mut self, prompt: &str) -> Result<Submission, GatewayError> {
        let messages = self.history.request_messages(self.system_prompt.as_deref(), prompt);
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_openai_messages(&messages).map_err(|e| GatewayError::Fatal(e.to_string()))?)
            .build()
            .map_err(|e| GatewayError::Fatal(e.to_string()))?;

        let response = match tokio::time::timeout(self.request_timeout, self.client.chat().create(request)).await {
            Err(_) => return Err(GatewayError::Timeout),
            Ok(Err(e)) => return Err(classify_openai_error(&e)),
            Ok(Ok(response)) => response,
        };

        let Some(choice) = response.choices.first() else {
            return Ok(Submission::NoResponse);
        };
        if matches!(choice.finish_reason, Some(FinishReason::ContentFilter)) {
            tracing::warn!(identity = %self.identity.name, session = %self.session_id, "Reply blocked by content filter");
            return Ok(Submission::Blocked);
        }
        let content = choice.message.content.clone().unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Submission::NoResponse);
        }

        self.history.record_exchange(prompt, &content);
        Ok(Submission::Completed(content.trim().to_string()))
    }

    async fn reload(&mut self) -> Result<(), GatewayError> {
        tracing::debug!(identity = %self.identity.name, "Reloading gateway client");
        self.reconnect()
    }

    async fn reset_session(&mut self) -> Result<(), GatewayError> {
        self.new_session();
        Ok(())
    }

    async fn rotate_identity(&mut self, identity: &Identity) -> Result<(), GatewayError> {
        tracing::info!(from = %self.identity.name, to = %identity.name, "Rotating identity");
        self.identity = identity.clone();
        self.reconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error("Rate limit reached for requests"),
            GatewayError::RateLimited
        );
        assert!(matches!(
            classify_error("Incorrect API key provided"),
            GatewayError::Fatal(_)
        ));
        assert!(matches!(
            classify_error("error sending request: connection refused"),
            GatewayError::Transport(_)
        ));
    }

    #[test]
    fn test_status_digits_in_urls_are_transport() {
        // 端口或请求 id 中出现 429 / 401 不代表限流或鉴权失败
        assert!(matches!(
            classify_error("error sending request for url (http://localhost:4290/v1/chat/completions)"),
            GatewayError::Transport(_)
        ));
        assert!(matches!(
            classify_error("error sending request for url (http://localhost:4010/v1/chat/completions)"),
            GatewayError::Transport(_)
        ));
        assert_eq!(
            classify_error("rate_limit_exceeded: Rate limit reached"),
            GatewayError::RateLimited
        );
        assert!(matches!(
            classify_openai_error(&OpenAIError::InvalidArgument("bad port 4290".into())),
            GatewayError::Transport(_)
        ));
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let identity = Identity::new("ghost", "FANYI_TEST_KEY_THAT_DOES_NOT_EXIST");
        let err = OpenAiGateway::new(&GatewaySection::default(), identity, None)
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Fatal(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_identity_overrides_model() {
        std::env::set_var("FANYI_TEST_KEY_PRESENT", "sk-test");
        let mut identity = Identity::new("alt", "FANYI_TEST_KEY_PRESENT");
        identity.model = Some("alt-model".into());
        identity.base_url = Some("http://localhost:9/v1".into());
        let gateway = OpenAiGateway::new(&GatewaySection::default(), identity, None).unwrap();
        assert_eq!(gateway.model, "alt-model");
        assert_eq!(gateway.identity().name, "alt");
    }
}
