//! 响应协议层：把 Agent 的自由文本回复解析为结构化记录
//!
//! - **init_reply**: 初始化回复（[START_DATA_BLOCK] 包裹 METADATA / GLOSSARY / RELATIONSHIPS）
//! - **translation_reply**: 翻译回复（正文 + 可选 [DATABASE_UPDATES] 更新块）
//! - **rows**: 两种语法共用的行解析与去重
//! - **residue**: 译文中残留原文字符的检测、标点归一化与「原文 --> 译文」修补回复解析

pub mod init_reply;
pub mod residue;
pub mod rows;
pub mod translation_reply;

use thiserror::Error;

pub use init_reply::{parse_initialisation_response, InitialisationReply};
pub use residue::{
    apply_substring_translations, count_source_script_chars, distinct_source_script_runs,
    normalize_punctuation, parse_substring_translations, source_script_runs,
};
pub use translation_reply::{parse_translation_reply, split_translation_and_updates, TranslationReply};

/// 结构性错误：回复缺少必需的外层结构。行级格式问题只会被跳过，不会产生 ParseError。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no [START_DATA_BLOCK] ... [END_DATA_BLOCK] envelope in reply")]
    MissingEnvelope,

    #[error("reply contains no narrative text")]
    EmptyNarrative,

    #[error("[DATABASE_UPDATES] opened but never closed")]
    UnterminatedUpdates,
}
