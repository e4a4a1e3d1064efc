//! 错误恢复引擎
//!
//! 根据 PipelineError 类型返回 RecoveryAction，供章节循环决定重试、轮换、跳过还是终止。

use crate::core::{PipelineError, RecoveryAction};
use crate::gateway::GatewayError;

/// 语义化错误恢复：只有存储错误、轮换耗尽与网关致命错误会终止运行
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &PipelineError) -> RecoveryAction {
        match err {
            PipelineError::Parse(_) => RecoveryAction::Retry,
            PipelineError::Gateway(GatewayError::Transport(_) | GatewayError::Timeout) => {
                RecoveryAction::Retry
            }
            PipelineError::Gateway(GatewayError::RateLimited) => RecoveryAction::Rotate,
            PipelineError::PolicyBlocked => RecoveryAction::SkipChapter,
            PipelineError::Io { .. } | PipelineError::Discovery(_) => RecoveryAction::SkipChapter,
            PipelineError::Gateway(GatewayError::Fatal(_))
            | PipelineError::RotationExhausted(_)
            | PipelineError::Store(_) => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RotationExhausted;
    use crate::protocol::ParseError;
    use crate::store::StoreError;

    #[test]
    fn test_recovery_retryable() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&ParseError::MissingEnvelope.into()),
            RecoveryAction::Retry
        );
        assert_eq!(
            engine.handle(&GatewayError::Timeout.into()),
            RecoveryAction::Retry
        );
        assert_eq!(
            engine.handle(&GatewayError::Transport("reset".into()).into()),
            RecoveryAction::Retry
        );
    }

    #[test]
    fn test_recovery_rate_limit_rotates() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&GatewayError::RateLimited.into()),
            RecoveryAction::Rotate
        );
    }

    #[test]
    fn test_recovery_blocked_skips_chapter() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&PipelineError::PolicyBlocked),
            RecoveryAction::SkipChapter
        );
    }

    #[test]
    fn test_recovery_fatal() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&GatewayError::Fatal("auth".into()).into()),
            RecoveryAction::Abort
        );
        let exhausted = RotationExhausted {
            rotations: 2,
            identities: 2,
        };
        assert_eq!(engine.handle(&exhausted.into()), RecoveryAction::Abort);
        let store = StoreError::Sqlite(rusqlite::Error::InvalidQuery);
        assert_eq!(engine.handle(&store.into()), RecoveryAction::Abort);
    }
}
