//! 领域记录：元数据、术语条目、人物关系
//!
//! Draft 为解析器产出、尚未入库的记录；Entry 为术语库中带 id 的行。
//! 占位值（空串、N/A、NA）在每个持久化边界都会被过滤，判定规则集中在 normalize_field。

use std::collections::BTreeMap;

use serde::Serialize;

/// 作品元数据：key -> value，同 key 后写覆盖
pub type Metadata = BTreeMap<String, String>;

/// 表示「未知」的占位值（比较前先 trim，大小写不敏感）
pub const PLACEHOLDER_SENTINELS: [&str; 2] = ["N/A", "NA"];

/// 归一化字段：trim 后为空或等于占位值时返回 None
pub fn normalize_field(value: Option<&str>) -> Option<String> {
    let cleaned = value?.trim();
    if cleaned.is_empty() || is_placeholder(cleaned) {
        return None;
    }
    Some(cleaned.to_string())
}

/// 字段是否有实际内容（非空、非占位）
pub fn is_meaningful(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !is_placeholder(trimmed)
}

fn is_placeholder(trimmed: &str) -> bool {
    let upper = trimmed.to_uppercase();
    PLACEHOLDER_SENTINELS.iter().any(|s| *s == upper)
}

/// 解析出的术语条目（未入库）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GlossaryDraft {
    pub original_name: Option<String>,
    pub pinyin: Option<String>,
    pub vietnamese_name: String,
    pub notes: Option<String>,
}

impl GlossaryDraft {
    pub fn new(vietnamese_name: impl Into<String>) -> Self {
        Self {
            original_name: None,
            pinyin: None,
            vietnamese_name: vietnamese_name.into(),
            notes: None,
        }
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_name = Some(original.into());
        self
    }

    pub fn with_pinyin(mut self, pinyin: impl Into<String>) -> Self {
        self.pinyin = Some(pinyin.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// 解析出的人物关系（未入库）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelationshipDraft {
    pub name1: String,
    pub name2: String,
    pub relationship_type: String,
}

impl RelationshipDraft {
    pub fn new(
        name1: impl Into<String>,
        name2: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            name1: name1.into(),
            name2: name2.into(),
            relationship_type: relationship_type.into(),
        }
    }

    /// 无序人名对：用于同批次去重
    pub fn unordered_pair(&self) -> (String, String) {
        if self.name1 <= self.name2 {
            (self.name1.clone(), self.name2.clone())
        } else {
            (self.name2.clone(), self.name1.clone())
        }
    }
}

/// 术语库中的一行术语
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GlossaryEntry {
    pub id: i64,
    pub original_name: Option<String>,
    pub pinyin: Option<String>,
    pub vietnamese_name: String,
    pub notes: Option<String>,
}

/// 术语库中的一行关系
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelationshipEntry {
    pub id: i64,
    pub name1: String,
    pub name2: String,
    pub relationship_type: String,
}
