//! 术语库集成测试：初始化回复入库、上下文挑选、维护

#[cfg(test)]
mod tests {
    use fanyi::context::{build_context_sections, ContextScope};
    use fanyi::model::{GlossaryDraft, RelationshipDraft};
    use fanyi::protocol::{parse_initialisation_response, parse_translation_reply};
    use fanyi::store::KnowledgeStore;
    use tempfile::TempDir;

    const INIT_REPLY: &str = "Dữ liệu:\n\
[START_DATA_BLOCK]\n\
[SECTION:METADATA]\n\
story_context: Giang hồ\n\
main_char_pronouns: ta - ngươi\n\
[END_SECTION]\n\
[SECTION:GLOSSARY]\n\
張三 (Zhāng Sān) | Trương Tam | Nhân vật chính\n\
李四 | N/A | không rõ\n\
[END_SECTION]\n\
[SECTION:RELATIONSHIPS]\n\
Trương Tam | Lý Tứ | Sư huynh đệ\n\
[END_SECTION]\n\
[END_DATA_BLOCK]";

    fn open(dir: &TempDir) -> KnowledgeStore {
        KnowledgeStore::open(dir.path().join("story_data.sqlite")).unwrap()
    }

    #[test]
    fn test_initialisation_reply_skips_placeholder_rows() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let reply = parse_initialisation_response(INIT_REPLY).unwrap();

        store.write_metadata(&reply.metadata).unwrap();
        assert_eq!(store.insert_glossary_entries(&reply.glossary).unwrap(), 1);
        assert_eq!(store.insert_relationship_entries(&reply.relationships).unwrap(), 1);

        let glossary = store.fetch_glossary(None).unwrap();
        assert_eq!(glossary.len(), 1);
        assert_eq!(glossary[0].original_name.as_deref(), Some("張三"));
        assert_eq!(glossary[0].pinyin.as_deref(), Some("Zhāng Sān"));
        assert_eq!(glossary[0].vietnamese_name, "Trương Tam");

        let metadata = store.fetch_metadata().unwrap();
        assert_eq!(metadata.get("story_context").map(String::as_str), Some("Giang hồ"));
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_orphaned_relationship_removed_by_maintenance() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let init = parse_initialisation_response(INIT_REPLY).unwrap();
        store.insert_glossary_entries(&init.glossary).unwrap();

        let reply = parse_translation_reply(
            "Trương Tam gặp Triệu Lục.\n[DATABASE_UPDATES]\n[RELATIONSHIP_ADDITIONS]\n\
Trương Tam | Triệu Lục | Kẻ thù\n[END_RELATIONSHIP_ADDITIONS]\n[/DATABASE_UPDATES]",
        )
        .unwrap();
        // 关系原样入库，不检查人名是否在术语表中
        assert_eq!(store.insert_relationship_entries(&reply.relationship_additions).unwrap(), 1);
        assert_eq!(store.counts().unwrap().relationships, 1);

        let report = store.run_maintenance().unwrap();
        assert_eq!(report.orphaned_relationships, 1);
        assert_eq!(report.total(), 1);
        assert_eq!(store.counts().unwrap().relationships, 0);

        // 再次维护无事可做
        assert_eq!(store.run_maintenance().unwrap().total(), 0);
    }

    #[test]
    fn test_translation_updates_feed_next_context() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store
            .insert_glossary_entries(&[
                GlossaryDraft::new("Trương Tam").with_original("張三"),
                GlossaryDraft::new("Lý Tứ").with_original("李四"),
            ])
            .unwrap();
        store
            .insert_relationship_entries(&[
                RelationshipDraft::new("Lý Tứ", "Trương Tam", "Sư huynh đệ"),
                RelationshipDraft::new("Vương Ngũ", "Trương Tam", "Quen biết"),
            ])
            .unwrap();

        let reply = parse_translation_reply(
            "Vương Ngũ mở cửa.\n[DATABASE_UPDATES]\n[GLOSSARY_ADDITIONS]\n\
王五 | Vương Ngũ | Chủ quán\n[END_GLOSSARY_ADDITIONS]\n[/DATABASE_UPDATES]",
        )
        .unwrap();
        assert_eq!(store.insert_glossary_entries(&reply.glossary_additions).unwrap(), 1);
        // 重复提交同一条目不会新增
        assert_eq!(store.insert_glossary_entries(&reply.glossary_additions).unwrap(), 0);

        let sections = build_context_sections(&store, "王五与張三喝酒").unwrap();
        assert_eq!(sections.scope, ContextScope::Relevant(2));
        assert!(sections.glossary.contains("Vương Ngũ"));
        assert!(sections.glossary.contains("Trương Tam"));
        assert!(!sections.glossary.contains("Lý Tứ"));
        // 只保留两端都命中的关系
        assert!(sections.relationships.contains("Quen biết"));
        assert!(!sections.relationships.contains("Sư huynh đệ"));
    }

    #[test]
    fn test_store_reopens_with_data() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open(&dir);
            store
                .insert_glossary_entries(&[GlossaryDraft::new("Trương Tam").with_original("張三")])
                .unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.counts().unwrap().glossary, 1);
    }
}
