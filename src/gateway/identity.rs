//! 身份池：限流时显式轮换到下一个身份（API 凭据）
//!
//! 连续限流次数有上限，超过即 RotationExhausted；任何一次非限流的响应都会清零计数。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 一个可轮换的身份：凭据从环境变量读取，端点与模型可单独覆盖
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, api_key_env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key_env: api_key_env.into(),
            base_url: None,
            model: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rate limited on {rotations} consecutive rotations across {identities} identities")]
pub struct RotationExhausted {
    pub rotations: usize,
    pub identities: usize,
}

#[derive(Debug, Clone)]
pub struct IdentityPool {
    identities: Vec<Identity>,
    active: usize,
    consecutive: usize,
    max_consecutive: usize,
}

impl IdentityPool {
    /// `identities` 为空时返回 None；`max_consecutive` 缺省为身份数
    pub fn new(identities: Vec<Identity>, max_consecutive: Option<usize>) -> Option<Self> {
        if identities.is_empty() {
            return None;
        }
        let max_consecutive = max_consecutive.unwrap_or(identities.len());
        Some(Self {
            identities,
            active: 0,
            consecutive: 0,
            max_consecutive,
        })
    }

    pub fn active(&self) -> &Identity {
        &self.identities[self.active]
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// 记录一次限流并前进到下一个身份，返回新的活动身份
    pub fn rotate(&mut self) -> Result<Identity, RotationExhausted> {
        self.consecutive += 1;
        if self.consecutive > self.max_consecutive {
            return Err(RotationExhausted {
                rotations: self.consecutive - 1,
                identities: self.identities.len(),
            });
        }
        self.active = (self.active + 1) % self.identities.len();
        Ok(self.active().clone())
    }

    /// 收到非限流响应：清零连续计数
    pub fn mark_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive_rotations(&self) -> usize {
        self.consecutive
    }
}
