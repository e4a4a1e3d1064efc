//! 单章处理：提交 -> 残留升级 -> 持久化新增条目 -> 残留修补 -> 写出译文

use std::collections::HashSet;

use crate::context::build_context_sections;
use crate::core::controller::Controller;
use crate::core::state::{transition, ChapterEvent, ChapterState};
use crate::core::workunit::Chapter;
use crate::core::{PipelineError, RecoveryAction};
use crate::gateway::{AgentGateway, Submission};
use crate::prompt::{build_repair_prompt, build_translation_prompt};
use crate::protocol::{
    apply_substring_translations, count_source_script_chars, distinct_source_script_runs,
    normalize_punctuation, parse_substring_translations, parse_translation_reply, TranslationReply,
};
use crate::store::KnowledgeStore;

/// 单章结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    Translated {
        /// 修补后仍残留的汉字片段
        residue: Vec<String>,
        glossary_added: usize,
        relationships_added: usize,
    },
    Blocked,
    Failed(String),
}

impl<G: AgentGateway> Controller<G> {
    /// 翻译一章；Err 只在需要上抛时返回（由调用方交给 RecoveryEngine）
    pub async fn process_chapter(
        &mut self,
        store: &mut KnowledgeStore,
        work_unit: &str,
        chapter: &Chapter,
    ) -> Result<ChapterOutcome, PipelineError> {
        tracing::info!(work_unit, chapter = %chapter.name, "Translating chapter");
        let source = chapter.read()?;
        let context = build_context_sections(store, &source)?;
        let prompt = build_translation_prompt(&context, &source);

        let (state, reply) = self
            .drive_attempts(work_unit, &chapter.name, &prompt, parse_translation_reply)
            .await?;
        let reply = match (state, reply) {
            (ChapterState::Finalizing, Some(reply)) => reply,
            (ChapterState::Blocked, _) => return Ok(ChapterOutcome::Blocked),
            (ChapterState::Failed(reason), _) => return Ok(ChapterOutcome::Failed(reason.to_string())),
            (other, _) => return Ok(ChapterOutcome::Failed(format!("unexpected state {other:?}"))),
        };

        let reply = self.escalate_residue(work_unit, &chapter.name, &prompt, reply).await?;

        let (glossary_added, relationships_added) = if reply.has_updates() {
            let glossary_added = store.insert_glossary_entries(&reply.glossary_additions)?;
            let relationships_added = store.insert_relationship_entries(&reply.relationship_additions)?;
            tracing::info!(work_unit, chapter = %chapter.name, glossary_added, relationships_added, "Knowledge store updated");
            (glossary_added, relationships_added)
        } else {
            tracing::debug!(work_unit, chapter = %chapter.name, "Reply carried no knowledge store updates");
            (0, 0)
        };

        let (text, residue) = self.repair_residue(work_unit, &chapter.name, &reply.narrative).await?;

        let max_attempts = self.pipeline.max_attempts;
        let (event, write_error) = match chapter.write_output(&text) {
            Ok(()) => (ChapterEvent::Written, None),
            Err(e) => {
                tracing::error!(work_unit, chapter = %chapter.name, "Failed to write output: {}", e);
                (ChapterEvent::WriteFailed, Some(e.to_string()))
            }
        };
        match transition(ChapterState::Finalizing, event, max_attempts) {
            ChapterState::Done => {
                tracing::info!(work_unit, chapter = %chapter.name, output = %chapter.output.display(), "Chapter translated");
                self.pause(self.pipeline.action_delay_ms).await;
                Ok(ChapterOutcome::Translated {
                    residue,
                    glossary_added,
                    relationships_added,
                })
            }
            state => Ok(ChapterOutcome::Failed(match (state, write_error) {
                (ChapterState::Failed(reason), Some(detail)) => format!("{reason}: {detail}"),
                (state, _) => format!("unexpected state {state:?}"),
            })),
        }
    }

    /// 残留汉字超过阈值：换新会话以同一 prompt 重提一次，只有成功解析才替换原回复
    async fn escalate_residue(
        &mut self,
        work_unit: &str,
        chapter: &str,
        prompt: &str,
        reply: TranslationReply,
    ) -> Result<TranslationReply, PipelineError> {
        let count = count_source_script_chars(&reply.narrative);
        let threshold = self.pipeline.residue_threshold;
        if count <= threshold {
            return Ok(reply);
        }
        tracing::warn!(work_unit, chapter, count, threshold, "Too much source script left, retrying in a new session");

        if let Err(e) = self.gateway.reset_session().await {
            let err = PipelineError::from(e);
            if self.recovery.handle(&err) == RecoveryAction::Abort {
                return Err(err);
            }
            tracing::warn!(work_unit, chapter, "Could not open a new session, keeping first reply: {}", err);
            return Ok(reply);
        }
        self.pause(self.pipeline.action_delay_ms).await;

        match self.submit_rotating(prompt).await? {
            Some(Submission::Completed(text)) if !text.trim().is_empty() => match parse_translation_reply(&text) {
                Ok(retry) => {
                    tracing::info!(
                        work_unit,
                        chapter,
                        remaining = count_source_script_chars(&retry.narrative),
                        "Escalated retry accepted"
                    );
                    Ok(retry)
                }
                Err(e) => {
                    tracing::warn!(work_unit, chapter, "Escalated retry unusable ({}), keeping first reply", e);
                    Ok(reply)
                }
            },
            _ => {
                tracing::warn!(work_unit, chapter, "Escalated retry failed, keeping first reply");
                Ok(reply)
            }
        }
    }

    /// 修补残留汉字：标点归一化后，按轮次请求「原文 --> 译文」并从长到短替换
    ///
    /// 返回修补后的文本与仍残留的片段（非空时只告警）。
    async fn repair_residue(
        &mut self,
        work_unit: &str,
        chapter: &str,
        narrative: &str,
    ) -> Result<(String, Vec<String>), PipelineError> {
        let mut text = normalize_punctuation(narrative);
        let mut processed: HashSet<String> = HashSet::new();

        for round in 1..=self.pipeline.repair_rounds {
            let pending: Vec<String> = distinct_source_script_runs(&text)
                .into_iter()
                .filter(|run| !processed.contains(run))
                .collect();
            if pending.is_empty() {
                break;
            }
            tracing::info!(work_unit, chapter, round, pending = pending.len(), "Repairing leftover source script");

            let reply = match self.submit_rotating(&build_repair_prompt(&pending)).await? {
                Some(Submission::Completed(reply)) if !reply.trim().is_empty() => reply,
                _ => {
                    tracing::warn!(work_unit, chapter, round, "Repair request unusable, keeping current text");
                    break;
                }
            };

            let translations = parse_substring_translations(&reply, &pending);
            if translations.is_empty() {
                tracing::warn!(work_unit, chapter, round, "Repair reply had no usable lines");
                break;
            }
            let replaced = apply_substring_translations(&mut text, &translations);
            processed.extend(translations.into_iter().map(|(source, _)| source));
            tracing::info!(work_unit, chapter, round, replaced, pending = pending.len(), "Repair round finished");
            if replaced == 0 {
                break;
            }
        }

        let remaining = distinct_source_script_runs(&text);
        if !remaining.is_empty() {
            tracing::warn!(work_unit, chapter, remaining = ?remaining, "Source script left in translation");
        }
        Ok((text, remaining))
    }
}
