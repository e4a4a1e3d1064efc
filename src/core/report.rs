//! 运行报告：每部作品的章节结果，结束时汇总失败与被拦截的章节

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::state::RunPhase;
use crate::store::MaintenanceReport;

/// 作品处理结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum WorkUnitStatus {
    Completed,
    /// 缺少输入目录或章节
    Skipped(String),
    /// 初始化术语库失败
    EstablishFailed(String),
    /// 章节之间无法开启新会话，作品中止
    Halted(String),
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChapterFailure {
    pub chapter: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResidueWarning {
    pub chapter: String,
    pub remaining: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkUnitReport {
    pub name: String,
    pub status: WorkUnitStatus,
    pub established: bool,
    pub placeholders_purged: (usize, usize),
    pub maintenance: Option<MaintenanceReport>,
    pub translated: Vec<String>,
    pub skipped_existing: Vec<String>,
    pub blocked: Vec<String>,
    pub failed: Vec<ChapterFailure>,
    pub residue_warnings: Vec<ResidueWarning>,
    pub glossary_added: usize,
    pub relationships_added: usize,
}

impl WorkUnitReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: WorkUnitStatus::Completed,
            established: false,
            placeholders_purged: (0, 0),
            maintenance: None,
            translated: Vec::new(),
            skipped_existing: Vec::new(),
            blocked: Vec::new(),
            failed: Vec::new(),
            residue_warnings: Vec::new(),
            glossary_added: 0,
            relationships_added: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phase: RunPhase,
    pub work_units: Vec<WorkUnitReport>,
    /// 致命错误信息（运行被终止时）
    pub aborted: Option<String>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            phase: RunPhase::Init,
            work_units: Vec::new(),
            aborted: None,
            cancelled: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        if self.aborted.is_some() {
            self.phase = RunPhase::Aborted;
        } else {
            self.phase = RunPhase::Done;
        }
    }

    pub fn translated_count(&self) -> usize {
        self.work_units.iter().map(|u| u.translated.len()).sum()
    }

    /// (作品, 章节, 原因)：失败与被拦截的章节
    pub fn unfinished_chapters(&self) -> Vec<(String, String, String)> {
        let mut out = Vec::new();
        for unit in &self.work_units {
            for failure in &unit.failed {
                out.push((unit.name.clone(), failure.chapter.clone(), failure.reason.clone()));
            }
            for chapter in &unit.blocked {
                out.push((unit.name.clone(), chapter.clone(), "blocked by content policy".to_string()));
            }
        }
        out
    }

    /// 结束时把失败与被拦截的章节逐条写入日志
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            work_units = self.work_units.len(),
            translated = self.translated_count(),
            phase = ?self.phase,
            "Run finished"
        );
        for (unit, chapter, reason) in self.unfinished_chapters() {
            tracing::warn!(work_unit = %unit, chapter = %chapter, "Chapter not translated: {}", reason);
        }
        if let Some(reason) = &self.aborted {
            tracing::error!(run_id = %self.run_id, "Run aborted: {}", reason);
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfinished_chapters_lists_failed_and_blocked() {
        let mut unit = WorkUnitReport::new("truyen_a");
        unit.translated.push("001.txt".into());
        unit.failed.push(ChapterFailure {
            chapter: "002.txt".into(),
            reason: "attempts exhausted".into(),
        });
        unit.blocked.push("003.txt".into());

        let mut report = RunReport::new();
        report.work_units.push(unit);
        report.finish();

        assert_eq!(report.phase, RunPhase::Done);
        assert_eq!(report.translated_count(), 1);
        let unfinished = report.unfinished_chapters();
        assert_eq!(unfinished.len(), 2);
        assert_eq!(unfinished[0].1, "002.txt");
        assert_eq!(unfinished[1].1, "003.txt");
    }

    #[test]
    fn test_report_serializes() {
        let mut report = RunReport::new();
        report.work_units.push(WorkUnitReport::new("x"));
        report.aborted = Some("fatal".into());
        report.finish();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "Aborted");
        assert_eq!(json["work_units"][0]["status"]["status"], "completed");
    }
}
