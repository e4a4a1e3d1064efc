//! 术语库（Knowledge Store）
//!
//! 每部作品一个 SQLite 文件，保存元数据、术语与人物关系。
//! 单写者；每个批量写入都在一个事务内完成，失败整体回滚并以 StoreError 上抛。

pub mod maintenance;
mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;
use thiserror::Error;

use crate::model::{
    normalize_field, GlossaryDraft, GlossaryEntry, Metadata, RelationshipDraft, RelationshipEntry,
};

pub use maintenance::MaintenanceReport;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 各表行数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub metadata: usize,
    pub glossary: usize,
    pub relationships: usize,
}

pub struct KnowledgeStore {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore").field("path", &self.path).finish()
    }
}

impl KnowledgeStore {
    /// 打开（必要时创建）术语库：创建父目录并幂等建表
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path)?;
        schema::migrate(&conn)?;
        tracing::debug!(path = %path.display(), "Knowledge store opened");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 元数据按 key upsert，后写覆盖
    pub fn write_metadata(&mut self, metadata: &Metadata) -> StoreResult<()> {
        if metadata.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for (key, value) in metadata {
            tx.execute(
                "INSERT INTO Metadata(key, value) VALUES(?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 插入术语，返回新增行数
    ///
    /// 每个字段先归一化；译名不可用的行与原名已存在的行被忽略。
    pub fn insert_glossary_entries(&mut self, entries: &[GlossaryDraft]) -> StoreResult<usize> {
        let prepared: Vec<_> = entries
            .iter()
            .filter_map(|entry| {
                let vietnamese = normalize_field(Some(&entry.vietnamese_name))?;
                Some((
                    normalize_field(entry.original_name.as_deref()),
                    normalize_field(entry.pinyin.as_deref()),
                    vietnamese,
                    normalize_field(entry.notes.as_deref()),
                ))
            })
            .collect();
        if prepared.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO Glossary(original_name, pinyin, vietnamese_name, notes)
                 VALUES(?1, ?2, ?3, ?4)",
            )?;
            for (original, pinyin, vietnamese, notes) in &prepared {
                inserted += stmt.execute(params![original, pinyin, vietnamese, notes])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// 插入关系，返回新增行数
    ///
    /// 两端人名按字典序规范化后入库，(A,B,t) 与 (B,A,t) 为同一行。
    pub fn insert_relationship_entries(
        &mut self,
        entries: &[RelationshipDraft],
    ) -> StoreResult<usize> {
        let prepared: Vec<_> = entries
            .iter()
            .filter_map(|entry| {
                let first = normalize_field(Some(&entry.name1))?;
                let second = normalize_field(Some(&entry.name2))?;
                let kind = normalize_field(Some(&entry.relationship_type))?;
                let (a, b) = if first <= second { (first, second) } else { (second, first) };
                Some((a, b, kind))
            })
            .collect();
        if prepared.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO Relationships(char1_vn_name, char2_vn_name, relationship_type)
                 VALUES(?1, ?2, ?3)",
            )?;
            for (a, b, kind) in &prepared {
                inserted += stmt.execute(params![a, b, kind])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// 删除必填字段为空/占位值的行，返回 (术语删除数, 关系删除数)
    ///
    /// 同时把可选字段中的占位值置为 NULL（不计入返回值）；原名为占位值且与同名无原名行重复的术语行直接删除，计入术语删除数。
    pub fn purge_placeholders(&mut self) -> StoreResult<(usize, usize)> {
        let tx = self.conn.transaction()?;
        let removed = maintenance::purge_placeholders(&tx)?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn fetch_metadata(&self) -> StoreResult<Metadata> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM Metadata ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut metadata = Metadata::new();
        for row in rows {
            let (key, value) = row?;
            metadata.insert(key, value);
        }
        Ok(metadata)
    }

    /// 按 id 升序返回术语；`ids` 为 Some 时只返回这些 id
    pub fn fetch_glossary(&self, ids: Option<&[i64]>) -> StoreResult<Vec<GlossaryEntry>> {
        const COLUMNS: &str = "SELECT id, original_name, pinyin, vietnamese_name, notes FROM Glossary";
        let entries = match ids {
            None => {
                let mut stmt = self.conn.prepare(&format!("{COLUMNS} ORDER BY id"))?;
                let rows = stmt.query_map([], glossary_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some([]) => Vec::new(),
            Some(ids) => {
                let sql = format!("{COLUMNS} WHERE id IN ({}) ORDER BY id", placeholders(ids.len()));
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(ids.iter()), glossary_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(entries)
    }

    /// 按 id 升序返回关系；`names` 为 Some 时只返回任一端在其中的关系
    pub fn fetch_relationships(&self, names: Option<&[String]>) -> StoreResult<Vec<RelationshipEntry>> {
        const COLUMNS: &str =
            "SELECT id, char1_vn_name, char2_vn_name, relationship_type FROM Relationships";
        let entries = match names {
            None => {
                let mut stmt = self.conn.prepare(&format!("{COLUMNS} ORDER BY id"))?;
                let rows = stmt.query_map([], relationship_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some(names) => {
                let names: Vec<&String> = names.iter().filter(|n| !n.is_empty()).collect();
                if names.is_empty() {
                    return Ok(Vec::new());
                }
                let marks = placeholders(names.len());
                let sql = format!(
                    "{COLUMNS} WHERE char1_vn_name IN ({marks}) OR char2_vn_name IN ({marks}) ORDER BY id"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let bound = names.iter().chain(names.iter());
                let rows = stmt.query_map(params_from_iter(bound), relationship_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(entries)
    }

    pub fn counts(&self) -> StoreResult<StoreCounts> {
        let count = |table: &str| -> rusqlite::Result<usize> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        };
        Ok(StoreCounts {
            metadata: count("Metadata")?,
            glossary: count("Glossary")?,
            relationships: count("Relationships")?,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn glossary_from_row(row: &Row<'_>) -> rusqlite::Result<GlossaryEntry> {
    Ok(GlossaryEntry {
        id: row.get(0)?,
        original_name: row.get(1)?,
        pinyin: row.get(2)?,
        vietnamese_name: row.get(3)?,
        notes: row.get(4)?,
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipEntry> {
    Ok(RelationshipEntry {
        id: row.get(0)?,
        name1: row.get(1)?,
        name2: row.get(2)?,
        relationship_type: row.get(3)?,
    })
}
