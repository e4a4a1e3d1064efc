//! 核心编排层：错误与恢复、单章状态机、作品发现、主控循环与运行报告

pub mod chapter;
pub mod controller;
pub mod error;
pub mod recovery;
pub mod report;
pub mod shutdown;
pub mod state;
pub mod workunit;

pub use chapter::ChapterOutcome;
pub use controller::Controller;
pub use error::{PipelineError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use report::{ChapterFailure, ResidueWarning, RunReport, WorkUnitReport, WorkUnitStatus};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{transition, ChapterEvent, ChapterState, FailureReason, RunPhase};
pub use workunit::{Chapter, WorkUnit};
