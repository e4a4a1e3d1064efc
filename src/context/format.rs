//! 上下文段落渲染

use crate::model::{is_meaningful, GlossaryEntry, Metadata, RelationshipEntry};

/// 段落为空时的占位文本
pub const NO_DATA: &str = "(Không có dữ liệu)";

const ABSENT: &str = "N/A";

fn or_no_data(lines: Vec<String>) -> String {
    if lines.is_empty() {
        NO_DATA.to_string()
    } else {
        lines.join("\n")
    }
}

pub fn format_metadata(metadata: &Metadata) -> String {
    or_no_data(
        metadata
            .iter()
            .map(|(key, value)| format!("- {key}: {value}"))
            .collect(),
    )
}

/// `- 原名 (拼音) => 译名 | Ghi chú: 备注`，缺失字段写 N/A
pub fn format_glossary(entries: &[GlossaryEntry]) -> String {
    or_no_data(
        entries
            .iter()
            .filter(|entry| is_meaningful(&entry.vietnamese_name))
            .map(|entry| {
                format!(
                    "- {} ({}) => {} | Ghi chú: {}",
                    entry.original_name.as_deref().unwrap_or(ABSENT),
                    entry.pinyin.as_deref().unwrap_or(ABSENT),
                    entry.vietnamese_name,
                    entry.notes.as_deref().unwrap_or(ABSENT),
                )
            })
            .collect(),
    )
}

/// `- A ↔ B | Quan hệ: 类型`
pub fn format_relationships(entries: &[RelationshipEntry]) -> String {
    or_no_data(
        entries
            .iter()
            .filter(|entry| {
                is_meaningful(&entry.name1)
                    && is_meaningful(&entry.name2)
                    && is_meaningful(&entry.relationship_type)
            })
            .map(|entry| {
                format!(
                    "- {} ↔ {} | Quan hệ: {}",
                    entry.name1, entry.name2, entry.relationship_type
                )
            })
            .collect(),
    )
}
