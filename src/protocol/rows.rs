//! 行语法：术语行与关系行（竖线分隔，带标签 key=value 或三段位置式）
//!
//! 标签匹配采用「小写 key 包含候选词」规则，候选词同时覆盖带/不带声调的越南语写法。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{normalize_field, GlossaryDraft, Metadata, RelationshipDraft};

const ORIGINAL_KEYS: [&str; 2] = ["tên gốc", "ten goc"];
const TRANSLATED_KEYS: [&str; 2] = ["tên dịch", "ten dich"];
const NOTES_KEYS: [&str; 2] = ["ghi chú", "ghi chu"];
const FIRST_CHARACTER_KEYS: [&str; 2] = ["nhân vật 1", "nhan vat 1"];
const SECOND_CHARACTER_KEYS: [&str; 2] = ["nhân vật 2", "nhan vat 2"];
const RELATION_TYPE_KEYS: [&str; 2] = ["loại quan hệ", "loai quan he"];

static PRONUNCIATION_RE: OnceLock<Regex> = OnceLock::new();

/// 「名字 (拼音)」形式：半角或全角括号均可
fn pronunciation_re() -> &'static Regex {
    PRONUNCIATION_RE
        .get_or_init(|| Regex::new(r"^(?P<name>.+?)\s*[(（](?P<pinyin>[^()（）]+)[)）]$").unwrap())
}

/// 去掉空行并 trim 每行
pub fn clean_lines(block: &str) -> Vec<&str> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// METADATA 段：`key: value`，无冒号的行忽略，同 key 后者覆盖
pub fn parse_metadata_lines(body: &str, metadata: &mut Metadata) {
    for line in clean_lines(body) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        metadata.insert(key.to_string(), value.trim().to_string());
    }
}

/// 一行拆分后的字段：带标签的 key=value 与非空片段
struct RowFields<'a> {
    parts: Vec<&'a str>,
    tagged: Vec<(String, &'a str)>,
}

impl<'a> RowFields<'a> {
    fn split(line: &'a str) -> Option<Self> {
        if line.starts_with('#') {
            return None;
        }
        let parts: Vec<&str> = line
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let tagged = parts
            .iter()
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim()))
            .collect();
        Some(Self { parts, tagged })
    }

    fn is_positional(&self) -> bool {
        self.tagged.is_empty() && !self.parts.is_empty()
    }

    /// 第一个 key 包含任一候选词的值
    fn find(&self, candidates: &[&str]) -> Option<&'a str> {
        self.tagged
            .iter()
            .find(|(key, _)| candidates.iter().any(|c| key.contains(c)))
            .map(|(_, value)| *value)
    }

    fn positional(&self, index: usize) -> Option<&'a str> {
        self.parts.get(index).copied()
    }
}

/// 解析一行术语；译名缺失或为占位值时返回 None
pub fn parse_glossary_line(line: &str) -> Option<GlossaryDraft> {
    let fields = RowFields::split(line)?;
    let (original_raw, vietnamese, notes) = if fields.is_positional() {
        (
            normalize_field(fields.positional(0)),
            normalize_field(fields.positional(1)),
            normalize_field(fields.positional(2)),
        )
    } else {
        (
            normalize_field(fields.find(&ORIGINAL_KEYS)),
            normalize_field(fields.find(&TRANSLATED_KEYS)),
            normalize_field(fields.find(&NOTES_KEYS)),
        )
    };
    let vietnamese_name = vietnamese?;

    let (original_name, pinyin) = match original_raw {
        Some(raw) => split_pronunciation(&raw),
        None => (None, None),
    };

    Some(GlossaryDraft {
        original_name,
        pinyin,
        vietnamese_name,
        notes,
    })
}

/// 拆分 `張三 (Zhāng Sān)` 为原名与拼音
fn split_pronunciation(raw: &str) -> (Option<String>, Option<String>) {
    match pronunciation_re().captures(raw) {
        Some(caps) => (
            normalize_field(caps.name("name").map(|m| m.as_str())),
            normalize_field(caps.name("pinyin").map(|m| m.as_str())),
        ),
        None => (Some(raw.to_string()), None),
    }
}

/// 解析一行关系；三个字段任一缺失或为占位值时返回 None
pub fn parse_relationship_line(line: &str) -> Option<RelationshipDraft> {
    let fields = RowFields::split(line)?;
    let (first, second, kind) = if fields.is_positional() {
        (
            normalize_field(fields.positional(0)),
            normalize_field(fields.positional(1)),
            normalize_field(fields.positional(2)),
        )
    } else {
        (
            normalize_field(fields.find(&FIRST_CHARACTER_KEYS)),
            normalize_field(fields.find(&SECOND_CHARACTER_KEYS)),
            normalize_field(fields.find(&RELATION_TYPE_KEYS)),
        )
    };
    Some(RelationshipDraft {
        name1: first?,
        name2: second?,
        relationship_type: kind?,
    })
}

#[derive(Hash, PartialEq, Eq)]
enum GlossaryKey {
    Original(String),
    Translated(String),
}

/// 术语去重：有原名按原名，否则按译名；保留首次出现
pub fn dedup_glossary(entries: Vec<GlossaryDraft>) -> Vec<GlossaryDraft> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            let key = match &entry.original_name {
                Some(original) => GlossaryKey::Original(original.clone()),
                None => GlossaryKey::Translated(entry.vietnamese_name.clone()),
            };
            seen.insert(key)
        })
        .collect()
}

/// 关系去重：按无序人名对；保留首次出现
pub fn dedup_relationships(entries: Vec<RelationshipDraft>) -> Vec<RelationshipDraft> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.unordered_pair()))
        .collect()
}

/// 解析整段术语行并去重
pub fn parse_glossary_block(body: &str) -> Vec<GlossaryDraft> {
    dedup_glossary(clean_lines(body).into_iter().filter_map(parse_glossary_line).collect())
}

/// 解析整段关系行并去重
pub fn parse_relationship_block(body: &str) -> Vec<RelationshipDraft> {
    dedup_relationships(
        clean_lines(body)
            .into_iter()
            .filter_map(parse_relationship_line)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_glossary_line_with_pinyin() {
        let entry = parse_glossary_line(
            "Tên Gốc (Pinyin)=Zhang San (Zhāng Sān) | Tên Dịch=Trương Tam | Ghi Chú=Nhân vật chính",
        )
        .unwrap();
        assert_eq!(entry.original_name.as_deref(), Some("Zhang San"));
        assert_eq!(entry.pinyin.as_deref(), Some("Zhāng Sān"));
        assert_eq!(entry.vietnamese_name, "Trương Tam");
        assert_eq!(entry.notes.as_deref(), Some("Nhân vật chính"));
    }

    #[test]
    fn test_tagged_keys_without_diacritics() {
        let entry = parse_glossary_line("ten goc=李四 | ten dich=Lý Tứ").unwrap();
        assert_eq!(entry.original_name.as_deref(), Some("李四"));
        assert_eq!(entry.vietnamese_name, "Lý Tứ");
        assert_eq!(entry.notes, None);
    }

    #[test]
    fn test_positional_glossary_line_fullwidth_parens() {
        let entry = parse_glossary_line("張三（Zhāng Sān） | Trương Tam | N/A").unwrap();
        assert_eq!(entry.original_name.as_deref(), Some("張三"));
        assert_eq!(entry.pinyin.as_deref(), Some("Zhāng Sān"));
        assert_eq!(entry.notes, None);
    }

    #[test]
    fn test_glossary_line_rejects_placeholder_translation() {
        assert!(parse_glossary_line("張三 | N/A | ghi chú").is_none());
        assert!(parse_glossary_line("張三").is_none());
        assert!(parse_glossary_line("# Định dạng: Tên Gốc | Tên Dịch | Ghi Chú").is_none());
    }

    #[test]
    fn test_original_placeholder_keeps_row_without_original() {
        let entry = parse_glossary_line("N/A | Lão Vương | chủ quán").unwrap();
        assert_eq!(entry.original_name, None);
        assert_eq!(entry.vietnamese_name, "Lão Vương");
    }

    #[test]
    fn test_relationship_lines() {
        let tagged = parse_relationship_line(
            "Nhân vật 1 (Tên dịch)=Trương Tam | Nhân vật 2 (Tên dịch)=Lý Tứ | Loại quan hệ=Bạn bè",
        )
        .unwrap();
        assert_eq!(tagged.name1, "Trương Tam");
        assert_eq!(tagged.relationship_type, "Bạn bè");

        let positional = parse_relationship_line("Trương Tam | Lý Tứ | Đồng đội").unwrap();
        assert_eq!(positional.name2, "Lý Tứ");

        assert!(parse_relationship_line("Trương Tam | Lý Tứ").is_none());
        assert!(parse_relationship_line("Trương Tam | NA | Bạn bè").is_none());
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let glossary = parse_glossary_block("張三 | Trương Tam | a\n張三 | Trương Ba | b\nN/A | Lý Tứ\nN/A | Lý Tứ | c");
        assert_eq!(glossary.len(), 2);
        assert_eq!(glossary[0].vietnamese_name, "Trương Tam");
        assert_eq!(glossary[1].notes, None);

        let relationships =
            parse_relationship_block("Trương Tam | Lý Tứ | Bạn bè\nLý Tứ | Trương Tam | Kẻ thù");
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].relationship_type, "Bạn bè");
    }

    #[test]
    fn test_metadata_lines() {
        let mut metadata = Metadata::new();
        parse_metadata_lines(
            "story_context: Làng ven sông: thập niên 80\nkhông có dấu hai chấm\nnarrative_perspective: Ngôi thứ ba\nnarrative_perspective: Ngôi thứ nhất",
            &mut metadata,
        );
        assert_eq!(metadata["story_context"], "Làng ven sông: thập niên 80");
        assert_eq!(metadata["narrative_perspective"], "Ngôi thứ nhất");
        assert_eq!(metadata.len(), 2);
    }
}
