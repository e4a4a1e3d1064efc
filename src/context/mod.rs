//! 上下文组装：为一章挑选相关术语与关系并渲染为三个文本段
//!
//! 章节文本命中（原名字面包含，或译名大小写不敏感包含）的术语组成相关子集，
//! 关系只在两端都属于子集时保留；一个都没命中时退回完整上下文。

pub mod format;

use std::collections::HashSet;

use crate::model::is_meaningful;
use crate::store::{KnowledgeStore, StoreResult};

pub use format::{format_glossary, format_metadata, format_relationships, NO_DATA};

/// 上下文范围
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextScope {
    /// 命中的术语条数
    Relevant(usize),
    Full,
}

/// 渲染好的三个上下文段
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSections {
    pub metadata: String,
    pub glossary: String,
    pub relationships: String,
    pub scope: ContextScope,
}

/// 按 id 顺序返回章节文本中出现的术语 id（去重）
pub fn detect_relevant_entries(store: &KnowledgeStore, chapter_text: &str) -> StoreResult<Vec<i64>> {
    if chapter_text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let lowercase_text = chapter_text.to_lowercase();
    let mut seen = HashSet::new();
    let mut matches = Vec::new();

    for entry in store.fetch_glossary(None)? {
        let original_hit = entry
            .original_name
            .as_deref()
            .map(str::trim)
            .filter(|name| is_meaningful(name))
            .is_some_and(|name| chapter_text.contains(name));
        let translated = entry.vietnamese_name.trim();
        let translated_hit =
            is_meaningful(translated) && lowercase_text.contains(&translated.to_lowercase());

        if (original_hit || translated_hit) && seen.insert(entry.id) {
            matches.push(entry.id);
        }
    }
    Ok(matches)
}

pub fn build_context_sections(store: &KnowledgeStore, chapter_text: &str) -> StoreResult<ContextSections> {
    let metadata = store.fetch_metadata()?;
    let relevant_ids = detect_relevant_entries(store, chapter_text)?;

    let (glossary, relationships, scope) = if relevant_ids.is_empty() {
        (
            store.fetch_glossary(None)?,
            store.fetch_relationships(None)?,
            ContextScope::Full,
        )
    } else {
        let glossary = store.fetch_glossary(Some(&relevant_ids))?;
        let names: Vec<String> = glossary
            .iter()
            .map(|entry| entry.vietnamese_name.clone())
            .filter(|name| is_meaningful(name))
            .collect();
        let name_set: HashSet<&str> = names.iter().map(String::as_str).collect();
        let relationships = store
            .fetch_relationships(Some(&names))?
            .into_iter()
            .filter(|rel| name_set.contains(rel.name1.as_str()) && name_set.contains(rel.name2.as_str()))
            .collect::<Vec<_>>();
        (glossary, relationships, ContextScope::Relevant(relevant_ids.len()))
    };

    tracing::debug!(
        scope = ?scope,
        glossary = glossary.len(),
        relationships = relationships.len(),
        "Context assembled"
    );

    Ok(ContextSections {
        metadata: format_metadata(&metadata),
        glossary: format_glossary(&glossary),
        relationships: format_relationships(&relationships),
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlossaryDraft, RelationshipDraft};
    use tempfile::TempDir;

    fn seeded_store() -> (TempDir, KnowledgeStore) {
        let dir = TempDir::new().unwrap();
        let mut store = KnowledgeStore::open(dir.path().join("story_data.sqlite")).unwrap();
        store
            .insert_glossary_entries(&[
                GlossaryDraft::new("Trương Tam").with_original("張三"),
                GlossaryDraft::new("Lý Tứ").with_original("李四"),
                GlossaryDraft::new("Vương Ngũ").with_original("王五"),
            ])
            .unwrap();
        store
            .insert_relationship_entries(&[RelationshipDraft::new("Trương Tam", "Lý Tứ", "Bạn bè")])
            .unwrap();
        (dir, store)
    }

    #[test]
    fn test_detect_by_original_and_translated_name() {
        let (_dir, store) = seeded_store();
        let ids = detect_relevant_entries(&store, "張三走進客棧。").unwrap();
        assert_eq!(ids.len(), 1);
        let hit = store.fetch_glossary(Some(&ids)).unwrap();
        assert_eq!(hit[0].vietnamese_name, "Trương Tam");

        let ids = detect_relevant_entries(&store, "gặp VƯƠNG NGŨ và 張三").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn test_no_match_falls_back_to_full_context() {
        let (_dir, store) = seeded_store();
        assert!(detect_relevant_entries(&store, "không ai cả").unwrap().is_empty());
        assert!(detect_relevant_entries(&store, "   ").unwrap().is_empty());

        let sections = build_context_sections(&store, "không ai cả").unwrap();
        assert_eq!(sections.scope, ContextScope::Full);
        assert_eq!(sections.glossary.lines().count(), 3);
        assert!(sections.relationships.contains("Trương Tam"));
        assert_eq!(sections.metadata, NO_DATA);
    }

    #[test]
    fn test_relationship_requires_both_endpoints() {
        let (_dir, store) = seeded_store();
        // 只提到 A 与 C，关系 (A, B) 不应出现
        let sections = build_context_sections(&store, "張三 và 王五").unwrap();
        assert_eq!(sections.scope, ContextScope::Relevant(2));
        assert_eq!(sections.relationships, NO_DATA);

        let sections = build_context_sections(&store, "張三 và 李四").unwrap();
        assert_eq!(sections.relationships, "- Lý Tứ ↔ Trương Tam | Quan hệ: Bạn bè");
    }
}
