//! 翻译回复解析：正文 + 可选的 [DATABASE_UPDATES] 更新块

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::rows::{parse_glossary_block, parse_relationship_block};
use super::ParseError;
use crate::model::{GlossaryDraft, RelationshipDraft};

const UPDATES_OPEN: &str = "[DATABASE_UPDATES]";
const GLOSSARY_ADDITIONS: &str = "GLOSSARY_ADDITIONS";
const RELATIONSHIP_ADDITIONS: &str = "RELATIONSHIP_ADDITIONS";

static UPDATES_RE: OnceLock<Regex> = OnceLock::new();
static GLOSSARY_ADDITIONS_RE: OnceLock<Regex> = OnceLock::new();
static RELATIONSHIP_ADDITIONS_RE: OnceLock<Regex> = OnceLock::new();

fn updates_re() -> &'static Regex {
    UPDATES_RE.get_or_init(|| Regex::new(r"(?s)\[DATABASE_UPDATES\](.*)\[/DATABASE_UPDATES\]").unwrap())
}

/// `[NAME] ... [END_NAME]` 子段（regex 不支持反向引用，按名字分别编译）
fn subsection_re(cell: &'static OnceLock<Regex>, name: &str) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?s)\[{name}\](.*?)\[END_{name}\]")).unwrap()
    })
}

/// 翻译回复的结构化结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TranslationReply {
    pub narrative: String,
    pub glossary_additions: Vec<GlossaryDraft>,
    pub relationship_additions: Vec<RelationshipDraft>,
}

impl TranslationReply {
    pub fn has_updates(&self) -> bool {
        !self.glossary_additions.is_empty() || !self.relationship_additions.is_empty()
    }
}

/// 拆分正文与更新块；不会失败
///
/// 没有完整更新块时，整个（trim 后的）文本都是正文，两个列表为空。
pub fn split_translation_and_updates(text: &str) -> TranslationReply {
    let Some(caps) = updates_re().captures(text) else {
        return TranslationReply {
            narrative: text.trim().to_string(),
            ..Default::default()
        };
    };
    let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
        return TranslationReply {
            narrative: text.trim().to_string(),
            ..Default::default()
        };
    };
    let body = body.as_str();

    TranslationReply {
        narrative: text[..whole.start()].trim().to_string(),
        glossary_additions: parse_glossary_block(&collect_subsection(
            subsection_re(&GLOSSARY_ADDITIONS_RE, GLOSSARY_ADDITIONS),
            body,
        )),
        relationship_additions: parse_relationship_block(&collect_subsection(
            subsection_re(&RELATIONSHIP_ADDITIONS_RE, RELATIONSHIP_ADDITIONS),
            body,
        )),
    }
}

fn collect_subsection(re: &Regex, body: &str) -> String {
    re.captures_iter(body)
        .map(|caps| caps[1].to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 严格解析：结构无效（更新块未闭合、没有正文）时返回错误
///
/// 语义上为空（没有任何新增条目）不是错误。
pub fn parse_translation_reply(text: &str) -> Result<TranslationReply, ParseError> {
    if text.contains(UPDATES_OPEN) && !updates_re().is_match(text) {
        return Err(ParseError::UnterminatedUpdates);
    }
    let reply = split_translation_and_updates(text);
    if reply.narrative.is_empty() {
        return Err(ParseError::EmptyNarrative);
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "Trương Tam bước vào khách điếm.\n\n\
[DATABASE_UPDATES]\n\
[GLOSSARY_ADDITIONS]\n\
王五 (Wáng Wǔ) | Vương Ngũ | Chủ quán\n\
N/A | N/A | rác\n\
[END_GLOSSARY_ADDITIONS]\n\
[RELATIONSHIP_ADDITIONS]\n\
Trương Tam | Vương Ngũ | Quen biết\n\
Vương Ngũ | Trương Tam | Trùng\n\
[END_RELATIONSHIP_ADDITIONS]\n\
[/DATABASE_UPDATES]";

    #[test]
    fn test_narrative_only() {
        let reply = split_translation_and_updates("  narrative only, no marker \n");
        assert_eq!(reply.narrative, "narrative only, no marker");
        assert!(reply.glossary_additions.is_empty());
        assert!(reply.relationship_additions.is_empty());
    }

    #[test]
    fn test_split_with_updates() {
        let reply = split_translation_and_updates(REPLY);
        assert_eq!(reply.narrative, "Trương Tam bước vào khách điếm.");
        assert_eq!(reply.glossary_additions.len(), 1);
        assert_eq!(reply.glossary_additions[0].vietnamese_name, "Vương Ngũ");
        assert_eq!(reply.relationship_additions.len(), 1);
        assert_eq!(reply.relationship_additions[0].relationship_type, "Quen biết");
        assert!(reply.has_updates());
    }

    #[test]
    fn test_unterminated_updates() {
        let text = "Chương một.\n[DATABASE_UPDATES]\n[GLOSSARY_ADDITIONS]\n";
        assert_eq!(parse_translation_reply(text).unwrap_err(), ParseError::UnterminatedUpdates);
        // 宽松拆分仍把整段当作正文
        let loose = split_translation_and_updates(text);
        assert!(loose.narrative.starts_with("Chương một."));
    }

    #[test]
    fn test_empty_narrative() {
        let text = "[DATABASE_UPDATES][/DATABASE_UPDATES]";
        assert_eq!(parse_translation_reply(text).unwrap_err(), ParseError::EmptyNarrative);
        assert_eq!(parse_translation_reply("   ").unwrap_err(), ParseError::EmptyNarrative);
    }

    #[test]
    fn test_semantically_empty_is_ok() {
        let reply = parse_translation_reply("Chương hai.\n[DATABASE_UPDATES]\n[/DATABASE_UPDATES]").unwrap();
        assert_eq!(reply.narrative, "Chương hai.");
        assert!(!reply.has_updates());
    }
}
