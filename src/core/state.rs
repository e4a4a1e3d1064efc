//! 状态定义：运行阶段与单章状态机
//!
//! 单章的重试 / 轮换嵌套被显式化为 ChapterState + transition(state, event)。
//! 限流是一等转换：Submitting{n} --RateLimited--> Rotating{n} --Rotated--> Submitting{n}，不消耗尝试次数。

use std::fmt;

use serde::Serialize;

/// 整次运行的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Init,
    /// 首次为作品建立术语库
    Establishing,
    Translating,
    Done,
    Aborted,
}

/// 章节失败原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    AttemptsExhausted,
    WriteFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::AttemptsExhausted => write!(f, "attempts exhausted"),
            FailureReason::WriteFailed => write!(f, "output write failed"),
        }
    }
}

/// 单章（或一次初始化交换）的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChapterState {
    /// 第 n 次尝试前需要 reload
    Preparing { attempt: u32 },
    Submitting { attempt: u32 },
    Rotating { attempt: u32 },
    /// 已拿到可解析的回复，进入持久化与写出
    Finalizing,
    Done,
    Blocked,
    Failed(FailureReason),
}

/// 驱动状态机的事件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChapterEvent {
    Reloaded,
    ReloadFailed,
    /// 回复完整且解析成功
    Accepted,
    /// 无回复 / 传输错误 / 超时
    NoResponse,
    ParseFailed,
    PolicyBlocked,
    RateLimited,
    Rotated,
    RotateFailed,
    Written,
    WriteFailed,
}

impl ChapterState {
    pub fn start() -> Self {
        ChapterState::Submitting { attempt: 1 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChapterState::Done | ChapterState::Blocked | ChapterState::Failed(_)
        )
    }

    /// 当前尝试序号（非尝试状态返回 None）
    pub fn attempt(&self) -> Option<u32> {
        match self {
            ChapterState::Preparing { attempt }
            | ChapterState::Submitting { attempt }
            | ChapterState::Rotating { attempt } => Some(*attempt),
            _ => None,
        }
    }
}

/// 消耗一次尝试：还有余量则进入下一次的 Preparing，否则失败
fn next_attempt(attempt: u32, max_attempts: u32) -> ChapterState {
    if attempt >= max_attempts {
        ChapterState::Failed(FailureReason::AttemptsExhausted)
    } else {
        ChapterState::Preparing {
            attempt: attempt + 1,
        }
    }
}

/// 纯状态转换；与当前状态不匹配的事件保持状态不变
pub fn transition(state: ChapterState, event: ChapterEvent, max_attempts: u32) -> ChapterState {
    use ChapterEvent as E;
    use ChapterState as S;

    match (state, event) {
        (S::Preparing { attempt }, E::Reloaded) => S::Submitting { attempt },
        (S::Preparing { attempt }, E::ReloadFailed) => next_attempt(attempt, max_attempts),

        (S::Submitting { .. }, E::Accepted) => S::Finalizing,
        (S::Submitting { attempt }, E::NoResponse | E::ParseFailed) => {
            next_attempt(attempt, max_attempts)
        }
        (S::Submitting { .. }, E::PolicyBlocked) => S::Blocked,
        (S::Submitting { attempt }, E::RateLimited) => S::Rotating { attempt },

        (S::Rotating { attempt }, E::Rotated) => S::Submitting { attempt },
        (S::Rotating { attempt }, E::RotateFailed) => next_attempt(attempt, max_attempts),

        (S::Finalizing, E::Written) => S::Done,
        (S::Finalizing, E::WriteFailed) => S::Failed(FailureReason::WriteFailed),

        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 3;

    fn run(events: &[ChapterEvent]) -> ChapterState {
        events
            .iter()
            .fold(ChapterState::start(), |state, event| transition(state, *event, MAX))
    }

    #[test]
    fn test_happy_path() {
        assert_eq!(
            run(&[ChapterEvent::Accepted, ChapterEvent::Written]),
            ChapterState::Done
        );
    }

    #[test]
    fn test_rate_limit_keeps_attempt_number() {
        let state = run(&[ChapterEvent::NoResponse, ChapterEvent::Reloaded]);
        assert_eq!(state, ChapterState::Submitting { attempt: 2 });
        let state = transition(state, ChapterEvent::RateLimited, MAX);
        assert_eq!(state, ChapterState::Rotating { attempt: 2 });
        let state = transition(state, ChapterEvent::Rotated, MAX);
        assert_eq!(state, ChapterState::Submitting { attempt: 2 });
    }

    #[test]
    fn test_reload_failures_exhaust_without_submission() {
        let state = run(&[
            ChapterEvent::NoResponse,
            ChapterEvent::ReloadFailed,
            ChapterEvent::ReloadFailed,
        ]);
        assert_eq!(state, ChapterState::Failed(FailureReason::AttemptsExhausted));
    }

    #[test]
    fn test_blocked_is_terminal() {
        let state = run(&[ChapterEvent::PolicyBlocked]);
        assert_eq!(state, ChapterState::Blocked);
        assert!(state.is_terminal());
        assert_eq!(transition(state, ChapterEvent::Reloaded, MAX), ChapterState::Blocked);
    }

    #[test]
    fn test_parse_failures_consume_attempts() {
        let state = run(&[
            ChapterEvent::ParseFailed,
            ChapterEvent::Reloaded,
            ChapterEvent::ParseFailed,
            ChapterEvent::Reloaded,
            ChapterEvent::ParseFailed,
        ]);
        assert_eq!(state, ChapterState::Failed(FailureReason::AttemptsExhausted));
    }

    #[test]
    fn test_write_failure_fails_chapter() {
        assert_eq!(
            run(&[ChapterEvent::Accepted, ChapterEvent::WriteFailed]),
            ChapterState::Failed(FailureReason::WriteFailed)
        );
    }
}
