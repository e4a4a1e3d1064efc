//! 初始化回复解析
//!
//! ```text
//! [START_DATA_BLOCK]
//! [SECTION:METADATA]
//! story_context: ...
//! [END_SECTION]
//! [SECTION:GLOSSARY]
//! 張三 (Zhāng Sān) | Trương Tam | Nhân vật chính
//! [END_SECTION]
//! [SECTION:RELATIONSHIPS]
//! Trương Tam | Lý Tứ | Bạn bè
//! [END_SECTION]
//! [END_DATA_BLOCK]
//! ```
//!
//! 同名段落出现多次时内容合并；未知段落忽略。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::rows::{parse_glossary_block, parse_metadata_lines, parse_relationship_block};
use super::ParseError;
use crate::model::{GlossaryDraft, Metadata, RelationshipDraft};

static ENVELOPE_RE: OnceLock<Regex> = OnceLock::new();
static SECTION_RE: OnceLock<Regex> = OnceLock::new();

fn envelope_re() -> &'static Regex {
    ENVELOPE_RE.get_or_init(|| Regex::new(r"(?s)\[START_DATA_BLOCK\](.*)\[END_DATA_BLOCK\]").unwrap())
}

fn section_re() -> &'static Regex {
    SECTION_RE.get_or_init(|| Regex::new(r"(?s)\[SECTION:(\w+)\](.*?)\[END_SECTION\]").unwrap())
}

/// 初始化回复的结构化结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InitialisationReply {
    pub metadata: Metadata,
    pub glossary: Vec<GlossaryDraft>,
    pub relationships: Vec<RelationshipDraft>,
}

impl InitialisationReply {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.glossary.is_empty() && self.relationships.is_empty()
    }
}

/// 解析初始化回复；仅在外层 [START_DATA_BLOCK] 包裹缺失时失败
pub fn parse_initialisation_response(text: &str) -> Result<InitialisationReply, ParseError> {
    let envelope = envelope_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .ok_or(ParseError::MissingEnvelope)?
        .as_str();

    let mut metadata = Metadata::new();
    let mut glossary_body = String::new();
    let mut relationship_body = String::new();

    for caps in section_re().captures_iter(envelope) {
        let name = caps[1].to_uppercase();
        let body = &caps[2];
        match name.as_str() {
            "METADATA" => parse_metadata_lines(body, &mut metadata),
            "GLOSSARY" => {
                glossary_body.push_str(body);
                glossary_body.push('\n');
            }
            "RELATIONSHIPS" => {
                relationship_body.push_str(body);
                relationship_body.push('\n');
            }
            other => tracing::debug!(section = other, "Ignoring unknown init section"),
        }
    }

    Ok(InitialisationReply {
        metadata,
        glossary: parse_glossary_block(&glossary_body),
        relationships: parse_relationship_block(&relationship_body),
    })
}
