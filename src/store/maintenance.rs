//! 术语库维护：占位值清理、重复行去除、孤立关系清理

use rusqlite::Connection;
use serde::Serialize;

use super::{KnowledgeStore, StoreResult};

/// 维护报告：各类删除行数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub placeholder_glossary: usize,
    pub placeholder_relationships: usize,
    pub duplicate_glossary: usize,
    pub duplicate_relationships: usize,
    pub orphaned_relationships: usize,
}

impl MaintenanceReport {
    pub fn total(&self) -> usize {
        self.placeholder_glossary
            + self.placeholder_relationships
            + self.duplicate_glossary
            + self.duplicate_relationships
            + self.orphaned_relationships
    }
}

/// `col` 为空或为占位值
fn is_blank(col: &str) -> String {
    format!("({col} IS NULL OR TRIM({col}) = '' OR UPPER(TRIM({col})) IN ('N/A', 'NA'))")
}

pub(super) fn purge_placeholders(conn: &Connection) -> rusqlite::Result<(usize, usize)> {
    let glossary = conn.execute(
        &format!("DELETE FROM Glossary WHERE {}", is_blank("vietnamese_name")),
        [],
    )?;
    let relationships = conn.execute(
        &format!(
            "DELETE FROM Relationships WHERE {} OR {} OR {}",
            is_blank("char1_vn_name"),
            is_blank("char2_vn_name"),
            is_blank("relationship_type")
        ),
        [],
    )?;
    // 原名为占位值、且同名已有无原名行（或更早的占位原名行）的，置空会撞上唯一索引，直接删除
    let colliding = conn.execute(
        &format!(
            "DELETE FROM Glossary
             WHERE original_name IS NOT NULL AND {}
               AND EXISTS (
                   SELECT 1 FROM Glossary g2
                   WHERE g2.vietnamese_name = Glossary.vietnamese_name
                     AND g2.id <> Glossary.id
                     AND (g2.original_name IS NULL OR ({} AND g2.id < Glossary.id))
               )",
            is_blank("Glossary.original_name"),
            is_blank("g2.original_name")
        ),
        [],
    )?;
    for column in ["original_name", "pinyin", "notes"] {
        conn.execute(
            &format!(
                "UPDATE Glossary SET {column} = NULL
                 WHERE {column} IS NOT NULL AND {}",
                is_blank(column)
            ),
            [],
        )?;
    }
    Ok((glossary + colliding, relationships))
}

fn remove_duplicate_glossary(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM Glossary WHERE id NOT IN (
             SELECT MIN(id) FROM Glossary GROUP BY vietnamese_name
         )",
        [],
    )
}

fn remove_duplicate_relationships(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM Relationships WHERE id NOT IN (
             SELECT MIN(id) FROM Relationships
             GROUP BY MIN(char1_vn_name, char2_vn_name), MAX(char1_vn_name, char2_vn_name)
         )",
        [],
    )
}

fn remove_orphaned_relationships(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM Relationships
         WHERE char1_vn_name NOT IN (SELECT vietnamese_name FROM Glossary WHERE vietnamese_name IS NOT NULL)
            OR char2_vn_name NOT IN (SELECT vietnamese_name FROM Glossary WHERE vietnamese_name IS NOT NULL)",
        [],
    )
}

impl KnowledgeStore {
    /// 按译名去重，保留 id 最小的一行
    pub fn remove_duplicate_glossary(&mut self) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let removed = remove_duplicate_glossary(&tx)?;
        tx.commit()?;
        Ok(removed)
    }

    /// 按无序人名对去重，保留 id 最小的一行
    pub fn remove_duplicate_relationships(&mut self) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let removed = remove_duplicate_relationships(&tx)?;
        tx.commit()?;
        Ok(removed)
    }

    /// 删除任一端不在术语译名中的关系
    pub fn remove_orphaned_relationships(&mut self) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let removed = remove_orphaned_relationships(&tx)?;
        tx.commit()?;
        Ok(removed)
    }

    /// 完整维护：占位值 -> 重复行 -> 孤立关系，单事务
    pub fn run_maintenance(&mut self) -> StoreResult<MaintenanceReport> {
        let tx = self.conn.transaction()?;
        let (placeholder_glossary, placeholder_relationships) = purge_placeholders(&tx)?;
        let duplicate_glossary = remove_duplicate_glossary(&tx)?;
        let duplicate_relationships = remove_duplicate_relationships(&tx)?;
        let orphaned_relationships = remove_orphaned_relationships(&tx)?;
        tx.commit()?;

        let report = MaintenanceReport {
            placeholder_glossary,
            placeholder_relationships,
            duplicate_glossary,
            duplicate_relationships,
            orphaned_relationships,
        };
        tracing::info!(
            path = %self.path.display(),
            removed = report.total(),
            "Knowledge store maintenance finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlossaryDraft, RelationshipDraft};
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, KnowledgeStore) {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(dir.path().join("story_data.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_purge_is_idempotent() {
        let (_dir, mut store) = open_temp();
        // 绕过插入层的归一化，直接写入脏数据
        store
            .conn
            .execute_batch(
                "INSERT INTO Glossary(original_name, vietnamese_name, notes) VALUES('甲', ' n/a ', NULL);
                 INSERT INTO Glossary(original_name, vietnamese_name, notes) VALUES('乙', 'Ất', 'NA');
                 INSERT INTO Relationships(char1_vn_name, char2_vn_name, relationship_type) VALUES('Ất', '', 'x');",
            )
            .unwrap();

        assert_eq!(store.purge_placeholders().unwrap(), (1, 1));
        assert_eq!(store.purge_placeholders().unwrap(), (0, 0));
        let glossary = store.fetch_glossary(None).unwrap();
        assert_eq!(glossary.len(), 1);
        assert_eq!(glossary[0].notes, None);
    }

    #[test]
    fn test_placeholder_original_merges_into_original_less_row() {
        let (_dir, mut store) = open_temp();
        store
            .conn
            .execute_batch(
                "INSERT INTO Glossary(original_name, vietnamese_name) VALUES(NULL, 'Lão Vương');
                 INSERT INTO Glossary(original_name, vietnamese_name) VALUES('N/A', 'Lão Vương');
                 INSERT INTO Glossary(original_name, vietnamese_name) VALUES('na', 'Tiểu Lục');
                 INSERT INTO Glossary(original_name, vietnamese_name) VALUES(' N/A ', 'Tiểu Lục');",
            )
            .unwrap();

        assert_eq!(store.purge_placeholders().unwrap(), (2, 0));
        assert_eq!(store.purge_placeholders().unwrap(), (0, 0));
        let glossary = store.fetch_glossary(None).unwrap();
        assert_eq!(glossary.len(), 2);
        assert!(glossary.iter().all(|entry| entry.original_name.is_none()));
        let leftover: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM Glossary WHERE UPPER(TRIM(original_name)) IN ('N/A', 'NA')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_duplicates_keep_lowest_id() {
        let (_dir, mut store) = open_temp();
        store
            .insert_glossary_entries(&[
                GlossaryDraft::new("Trương Tam").with_original("張三"),
                GlossaryDraft::new("Trương Tam").with_original("张三"),
            ])
            .unwrap();
        store
            .conn
            .execute_batch(
                "INSERT INTO Relationships(char1_vn_name, char2_vn_name, relationship_type) VALUES('A', 'B', 'x');
                 INSERT INTO Relationships(char1_vn_name, char2_vn_name, relationship_type) VALUES('B', 'A', 'y');",
            )
            .unwrap();

        assert_eq!(store.remove_duplicate_glossary().unwrap(), 1);
        assert_eq!(
            store.fetch_glossary(None).unwrap()[0].original_name.as_deref(),
            Some("張三")
        );
        assert_eq!(store.remove_duplicate_relationships().unwrap(), 1);
        assert_eq!(store.fetch_relationships(None).unwrap()[0].relationship_type, "x");
    }

    #[test]
    fn test_orphan_cleanup() {
        let (_dir, mut store) = open_temp();
        store
            .insert_glossary_entries(&[GlossaryDraft::new("A"), GlossaryDraft::new("B")])
            .unwrap();
        store
            .insert_relationship_entries(&[
                RelationshipDraft::new("A", "B", "bạn"),
                RelationshipDraft::new("A", "Z", "thù"),
            ])
            .unwrap();
        assert_eq!(store.remove_orphaned_relationships().unwrap(), 1);
        assert_eq!(store.counts().unwrap().relationships, 1);
    }

    #[test]
    fn test_run_maintenance_report() {
        let (_dir, mut store) = open_temp();
        store.insert_glossary_entries(&[GlossaryDraft::new("A")]).unwrap();
        store
            .insert_relationship_entries(&[RelationshipDraft::new("A", "Ghost", "x")])
            .unwrap();
        let report = store.run_maintenance().unwrap();
        assert_eq!(report.orphaned_relationships, 1);
        assert_eq!(report.total(), 1);
        assert_eq!(store.run_maintenance().unwrap(), MaintenanceReport::default());
    }
}
