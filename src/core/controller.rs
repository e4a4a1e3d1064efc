//! 主控循环：按作品、按章节驱动翻译流水线
//!
//! 负责：发现作品、清理 / 建立术语库、逐章驱动单章状态机、章节之间开启新会话，
//! 并把每章结果汇总进 RunReport。只有存储错误、轮换耗尽与网关致命错误会终止整次运行。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, AppSection, PipelineSection};
use crate::core::chapter::ChapterOutcome;
use crate::core::report::{ChapterFailure, ResidueWarning, RunReport, WorkUnitReport, WorkUnitStatus};
use crate::core::state::{transition, ChapterEvent, ChapterState, RunPhase};
use crate::core::workunit::{Chapter, WorkUnit};
use crate::core::{PipelineError, RecoveryAction, RecoveryEngine};
use crate::gateway::{AgentGateway, IdentityPool, Submission};
use crate::prompt::build_initialisation_prompt;
use crate::protocol::{parse_initialisation_response, ParseError};
use crate::store::KnowledgeStore;

/// 初始化交换的结果
enum Establishment {
    Ready(KnowledgeStore),
    Failed(String),
}

pub struct Controller<G: AgentGateway> {
    pub(crate) gateway: G,
    pub(crate) identities: IdentityPool,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) layout: AppSection,
    pub(crate) pipeline: PipelineSection,
    pub(crate) rotation_backoff: Duration,
    pub(crate) cancel: CancellationToken,
    phase: RunPhase,
}

impl<G: AgentGateway> Controller<G> {
    pub fn new(gateway: G, identities: IdentityPool, config: &AppConfig) -> Self {
        Self {
            gateway,
            identities,
            recovery: RecoveryEngine::new(),
            layout: config.app.clone(),
            pipeline: config.pipeline.clone(),
            rotation_backoff: Duration::from_millis(config.gateway.rotation_backoff_ms),
            cancel: CancellationToken::new(),
            phase: RunPhase::Init,
        }
    }

    /// 使用外部取消 token（Ctrl+C 后在章节之间停止）
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// 处理根目录下所有作品
    pub async fn run(&mut self) -> RunReport {
        let mut report = RunReport::new();
        let root = self.layout.root_dir.clone();
        tracing::info!(run_id = %report.run_id, root = %root.display(), "Run started");

        let units = match WorkUnit::discover(&root, &self.layout) {
            Ok(units) => units,
            Err(e) => {
                report.aborted = Some(e.to_string());
                return self.finish(report);
            }
        };
        if units.is_empty() {
            tracing::warn!(root = %root.display(), "No work-units found");
        }

        for unit in units {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let mut unit_report = WorkUnitReport::new(&unit.name);
            let result = self.run_work_unit(&unit, &mut unit_report).await;
            let cancelled = unit_report.status == WorkUnitStatus::Cancelled;
            report.work_units.push(unit_report);

            if let Err(e) = result {
                tracing::error!(work_unit = %unit.name, "Fatal error, aborting run: {}", e);
                report.aborted = Some(e.to_string());
                break;
            }
            if cancelled {
                report.cancelled = true;
                break;
            }
        }

        self.finish(report)
    }

    fn finish(&mut self, mut report: RunReport) -> RunReport {
        report.finish();
        self.phase = report.phase;
        report.log_summary();
        report
    }

    /// 处理一部作品；返回 Err 表示整次运行需要终止
    pub async fn run_work_unit(
        &mut self,
        unit: &WorkUnit,
        report: &mut WorkUnitReport,
    ) -> Result<(), PipelineError> {
        if !unit.has_input() {
            tracing::info!(work_unit = %unit.name, "Skipping work-unit without input directory");
            report.status = WorkUnitStatus::Skipped(format!("missing {}", unit.input_dir.display()));
            return Ok(());
        }
        if let Err(e) = std::fs::create_dir_all(&unit.output_dir) {
            report.status = WorkUnitStatus::Skipped(PipelineError::io(&unit.output_dir, e).to_string());
            return Ok(());
        }

        let existing = if unit.has_store() {
            let mut store = KnowledgeStore::open(&unit.store_path)?;
            if self.pipeline.maintenance_on_start {
                report.maintenance = Some(store.run_maintenance()?);
            } else {
                report.placeholders_purged = store.purge_placeholders()?;
                let (glossary, relationships) = report.placeholders_purged;
                if glossary + relationships > 0 {
                    tracing::info!(work_unit = %unit.name, glossary, relationships, "Purged placeholder rows");
                }
            }
            Some(store)
        } else {
            None
        };

        let chapters = match unit.chapters() {
            Ok(chapters) if !chapters.is_empty() => chapters,
            Ok(_) => {
                tracing::info!(work_unit = %unit.name, "No chapters found");
                report.status = WorkUnitStatus::Skipped("no chapters".to_string());
                return Ok(());
            }
            Err(e) => {
                report.status = WorkUnitStatus::Skipped(e.to_string());
                return Ok(());
            }
        };

        let mut store = match existing {
            Some(store) => store,
            None => {
                if self.cancel.is_cancelled() {
                    report.status = WorkUnitStatus::Cancelled;
                    return Ok(());
                }
                match self.establish(unit, &chapters).await? {
                    Establishment::Ready(store) => {
                        report.established = true;
                        if !self.fresh_session(&unit.name).await? {
                            report.status =
                                WorkUnitStatus::Halted("could not open a new session after establishing".into());
                            return Ok(());
                        }
                        store
                    }
                    Establishment::Failed(reason) => {
                        tracing::error!(work_unit = %unit.name, "Establishing failed: {}", reason);
                        report.status = WorkUnitStatus::EstablishFailed(reason);
                        return Ok(());
                    }
                }
            }
        };

        self.phase = RunPhase::Translating;
        tracing::info!(work_unit = %unit.name, chapters = chapters.len(), "Translating work-unit");

        for chapter in &chapters {
            if chapter.is_translated() {
                tracing::debug!(work_unit = %unit.name, chapter = %chapter.name, "Output exists, skipping");
                report.skipped_existing.push(chapter.name.clone());
                continue;
            }
            if self.cancel.is_cancelled() {
                tracing::info!(work_unit = %unit.name, "Stop requested, not starting next chapter");
                report.status = WorkUnitStatus::Cancelled;
                return Ok(());
            }

            let outcome = match self.process_chapter(&mut store, &unit.name, chapter).await {
                Ok(outcome) => outcome,
                Err(e) => match self.recovery.handle(&e) {
                    RecoveryAction::Abort => return Err(e),
                    _ => {
                        tracing::error!(work_unit = %unit.name, chapter = %chapter.name, "Chapter failed: {}", e);
                        ChapterOutcome::Failed(e.to_string())
                    }
                },
            };
            record_outcome(report, chapter, outcome);

            self.pause(self.pipeline.chapter_delay_ms).await;
            if !self.fresh_session(&unit.name).await? {
                report.status = WorkUnitStatus::Halted(format!(
                    "could not open a new session after {}",
                    chapter.name
                ));
                return Ok(());
            }
        }

        tracing::info!(
            work_unit = %unit.name,
            translated = report.translated.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            "Work-unit finished"
        );
        Ok(())
    }

    /// 用前几章建立术语库
    async fn establish(
        &mut self,
        unit: &WorkUnit,
        chapters: &[Chapter],
    ) -> Result<Establishment, PipelineError> {
        self.phase = RunPhase::Establishing;
        let selected = &chapters[..chapters.len().min(self.pipeline.init_chapters.max(1))];
        tracing::info!(work_unit = %unit.name, chapters = selected.len(), "Establishing knowledge store");

        let mut sources = Vec::with_capacity(selected.len());
        for chapter in selected {
            match chapter.read() {
                Ok(text) => sources.push((chapter.name.clone(), text)),
                Err(e) => return Ok(Establishment::Failed(e.to_string())),
            }
        }
        let prompt = build_initialisation_prompt(&sources);

        let (state, reply) = self
            .drive_attempts(&unit.name, "init", &prompt, parse_initialisation_response)
            .await?;
        let reply = match (state, reply) {
            (ChapterState::Finalizing, Some(reply)) => reply,
            (ChapterState::Blocked, _) => {
                return Ok(Establishment::Failed("blocked by content policy".into()))
            }
            (ChapterState::Failed(reason), _) => return Ok(Establishment::Failed(reason.to_string())),
            (other, _) => return Ok(Establishment::Failed(format!("unexpected state {other:?}"))),
        };

        if reply.is_empty() {
            tracing::warn!(work_unit = %unit.name, "Initialisation reply carried no data, store starts empty");
        }
        let mut store = KnowledgeStore::open(&unit.store_path)?;
        store.write_metadata(&reply.metadata)?;
        let glossary = store.insert_glossary_entries(&reply.glossary)?;
        let relationships = store.insert_relationship_entries(&reply.relationships)?;
        tracing::info!(
            work_unit = %unit.name,
            metadata = reply.metadata.len(),
            glossary,
            relationships,
            "Knowledge store established"
        );
        Ok(Establishment::Ready(store))
    }

    /// 有界尝试循环：返回 Finalizing（附解析结果）、Blocked 或 Failed
    pub(crate) async fn drive_attempts<T, F>(
        &mut self,
        work_unit: &str,
        label: &str,
        prompt: &str,
        parse: F,
    ) -> Result<(ChapterState, Option<T>), PipelineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        let max_attempts = self.pipeline.max_attempts.max(1);
        let mut state = ChapterState::start();
        let mut accepted = None;

        while !state.is_terminal() && state != ChapterState::Finalizing {
            let event = match state {
                ChapterState::Preparing { attempt } => {
                    tracing::info!(work_unit, chapter = label, attempt, max_attempts, "Retrying after reload");
                    self.pause(self.pipeline.action_delay_ms).await;
                    match self.gateway.reload().await {
                        Ok(()) => ChapterEvent::Reloaded,
                        Err(e) => {
                            let err = PipelineError::from(e);
                            if self.recovery.handle(&err) == RecoveryAction::Abort {
                                return Err(err);
                            }
                            tracing::warn!(work_unit, chapter = label, attempt, "Reload failed: {}", err);
                            ChapterEvent::ReloadFailed
                        }
                    }
                }
                ChapterState::Submitting { attempt } => {
                    tracing::debug!(work_unit, chapter = label, attempt, "Submitting prompt");
                    match self.gateway.submit(prompt).await {
                        Ok(submission) => {
                            self.identities.mark_success();
                            match submission {
                                Submission::Completed(text) if !text.trim().is_empty() => match parse(&text) {
                                    Ok(parsed) => {
                                        accepted = Some(parsed);
                                        ChapterEvent::Accepted
                                    }
                                    Err(e) => {
                                        tracing::warn!(work_unit, chapter = label, attempt, "Unusable reply: {}", e);
                                        ChapterEvent::ParseFailed
                                    }
                                },
                                Submission::Blocked => {
                                    tracing::warn!(work_unit, chapter = label, attempt, "Blocked by content policy");
                                    ChapterEvent::PolicyBlocked
                                }
                                Submission::Completed(_) | Submission::NoResponse => {
                                    tracing::warn!(work_unit, chapter = label, attempt, "No response");
                                    ChapterEvent::NoResponse
                                }
                            }
                        }
                        Err(e) => {
                            let err = PipelineError::from(e);
                            match self.recovery.handle(&err) {
                                RecoveryAction::Rotate => ChapterEvent::RateLimited,
                                RecoveryAction::Abort => return Err(err),
                                _ => {
                                    self.identities.mark_success();
                                    tracing::warn!(work_unit, chapter = label, attempt, "Submission failed: {}", err);
                                    ChapterEvent::NoResponse
                                }
                            }
                        }
                    }
                }
                ChapterState::Rotating { .. } => {
                    if self.rotate_identity().await? {
                        ChapterEvent::Rotated
                    } else {
                        ChapterEvent::RotateFailed
                    }
                }
                _ => break,
            };
            state = transition(state, event, max_attempts);
        }

        if let ChapterState::Failed(reason) = state {
            tracing::error!(work_unit, chapter = label, max_attempts, "Giving up: {}", reason);
        }
        Ok((state, accepted))
    }

    /// 轮换到下一个身份；轮换耗尽或致命错误返回 Err，非致命失败返回 Ok(false)
    pub(crate) async fn rotate_identity(&mut self) -> Result<bool, PipelineError> {
        let identity = self.identities.rotate()?;
        tracing::warn!(
            identity = %identity.name,
            consecutive = self.identities.consecutive_rotations(),
            "Rate limited, rotating identity"
        );
        if !self.rotation_backoff.is_zero() {
            tokio::time::sleep(self.rotation_backoff).await;
        }
        match self.gateway.rotate_identity(&identity).await {
            Ok(()) => Ok(true),
            Err(e) => {
                let err = PipelineError::from(e);
                if self.recovery.handle(&err) == RecoveryAction::Abort {
                    return Err(err);
                }
                tracing::warn!(identity = %identity.name, "Rotation failed: {}", err);
                Ok(false)
            }
        }
    }

    /// 在当前会话中提交；限流时轮换并重提，其它非致命失败返回 None
    pub(crate) async fn submit_rotating(&mut self, prompt: &str) -> Result<Option<Submission>, PipelineError> {
        loop {
            match self.gateway.submit(prompt).await {
                Ok(submission) => {
                    self.identities.mark_success();
                    return Ok(Some(submission));
                }
                Err(e) => {
                    let err = PipelineError::from(e);
                    match self.recovery.handle(&err) {
                        RecoveryAction::Rotate => {
                            if !self.rotate_identity().await? {
                                return Ok(None);
                            }
                        }
                        RecoveryAction::Abort => return Err(err),
                        _ => {
                            self.identities.mark_success();
                            tracing::warn!("Submission failed: {}", err);
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    /// 开启全新会话；非致命失败返回 Ok(false)
    pub(crate) async fn fresh_session(&mut self, work_unit: &str) -> Result<bool, PipelineError> {
        self.pause(self.pipeline.action_delay_ms).await;
        match self.gateway.reset_session().await {
            Ok(()) => Ok(true),
            Err(e) => {
                let err = PipelineError::from(e);
                if self.recovery.handle(&err) == RecoveryAction::Abort {
                    return Err(err);
                }
                tracing::error!(work_unit, "Could not open a new session: {}", err);
                Ok(false)
            }
        }
    }

    pub(crate) async fn pause(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

fn record_outcome(report: &mut WorkUnitReport, chapter: &Chapter, outcome: ChapterOutcome) {
    match outcome {
        ChapterOutcome::Translated {
            residue,
            glossary_added,
            relationships_added,
        } => {
            report.translated.push(chapter.name.clone());
            report.glossary_added += glossary_added;
            report.relationships_added += relationships_added;
            if !residue.is_empty() {
                report.residue_warnings.push(ResidueWarning {
                    chapter: chapter.name.clone(),
                    remaining: residue,
                });
            }
        }
        ChapterOutcome::Blocked => report.blocked.push(chapter.name.clone()),
        ChapterOutcome::Failed(reason) => report.failed.push(ChapterFailure {
            chapter: chapter.name.clone(),
            reason,
        }),
    }
}
