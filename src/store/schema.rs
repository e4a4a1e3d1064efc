//! 术语库表结构（幂等迁移）

use rusqlite::Connection;

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS Metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Glossary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    original_name TEXT UNIQUE,
    pinyin TEXT,
    vietnamese_name TEXT NOT NULL,
    notes TEXT
);

-- 无原名的术语按译名唯一，重复插入保持幂等
CREATE UNIQUE INDEX IF NOT EXISTS idx_glossary_vn_without_original
    ON Glossary(vietnamese_name) WHERE original_name IS NULL;

CREATE INDEX IF NOT EXISTS idx_glossary_vn ON Glossary(vietnamese_name);

CREATE TABLE IF NOT EXISTS Relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    char1_vn_name TEXT NOT NULL,
    char2_vn_name TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    UNIQUE(char1_vn_name, char2_vn_name, relationship_type)
);
"#;

pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(MIGRATION)
}
