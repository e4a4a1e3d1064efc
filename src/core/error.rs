//! 流水线错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 PipelineError 决定 Retry / Rotate / SkipChapter / Abort。

use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::{GatewayError, RotationExhausted};
use crate::protocol::ParseError;
use crate::store::StoreError;

/// 流水线运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Reply blocked by content policy")]
    PolicyBlocked,

    #[error("Rotation exhausted: {0}")]
    RotationExhausted(#[from] RotationExhausted),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Discovery error: {0}")]
    Discovery(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 消耗一次尝试后重试
    Retry,
    /// 轮换身份后以同一尝试序号重试
    Rotate,
    /// 放弃当前章节，继续下一章
    SkipChapter,
    /// 终止整次运行
    Abort,
}
