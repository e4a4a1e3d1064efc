//! 会话历史：一次 Agent 会话内的对话消息
//!
//! 保留最近 N 轮（user/assistant 对），超出时剪枝；reset / reload / 轮换身份时整体清空。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionHistory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl SessionHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    /// 记录一轮完整交换
    pub fn record_exchange(&mut self, prompt: &str, reply: &str) {
        self.messages.push(Message::user(prompt));
        self.messages.push(Message::assistant(reply));
        self.prune();
    }

    /// 本轮请求要发送的消息：system（可选） + 历史 + 新 prompt
    pub fn request_messages(&self, system_prompt: Option<&str>, prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 2);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.extend(self.messages.iter().cloned());
        messages.push(Message::user(prompt));
        messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn prune(&mut self) {
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
