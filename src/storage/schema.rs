//! Database schema definitions
//!
//! Table columns mirror the preferred export columns so the same records can
//! be written to any backend. Every table is keyed by `(platform, id)`.

/// SQL schema for the embedded database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS contents (
    platform TEXT NOT NULL,
    item_id TEXT NOT NULL,
    title TEXT,
    "desc" TEXT,
    create_time INTEGER,
    user_id TEXT,
    sec_uid TEXT,
    nickname TEXT,
    avatar TEXT,
    liked_count INTEGER,
    comment_count INTEGER,
    share_count INTEGER,
    collected_count INTEGER,
    item_type TEXT,
    item_url TEXT,
    cover_url TEXT,
    media_url TEXT,
    image_urls TEXT,
    tags TEXT,
    source_keyword TEXT,
    ip_location TEXT,
    last_modify_ts INTEGER,
    PRIMARY KEY (platform, item_id)
);

CREATE TABLE IF NOT EXISTS comments (
    platform TEXT NOT NULL,
    comment_id TEXT NOT NULL,
    item_title TEXT,
    item_url TEXT,
    content TEXT,
    create_time INTEGER,
    ip_location TEXT,
    like_count INTEGER,
    sub_comment_count INTEGER,
    parent_comment_id TEXT,
    nickname TEXT,
    user_id TEXT,
    sec_uid TEXT,
    avatar TEXT,
    item_id TEXT,
    item_author TEXT,
    item_liked_count INTEGER,
    item_comment_count INTEGER,
    pictures TEXT,
    last_modify_ts INTEGER,
    PRIMARY KEY (platform, comment_id)
);

CREATE INDEX IF NOT EXISTS idx_comments_item ON comments(platform, item_id);

CREATE TABLE IF NOT EXISTS creators (
    platform TEXT NOT NULL,
    user_id TEXT NOT NULL,
    nickname TEXT,
    gender TEXT,
    avatar TEXT,
    "desc" TEXT,
    ip_location TEXT,
    follows INTEGER,
    fans INTEGER,
    interaction INTEGER,
    item_count INTEGER,
    tags TEXT,
    last_modify_ts INTEGER,
    PRIMARY KEY (platform, user_id)
);
"#;

/// Statements for the relational database, executed one at a time
pub const MYSQL_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS contents (
    platform VARCHAR(16) NOT NULL,
    item_id VARCHAR(64) NOT NULL,
    title TEXT,
    `desc` LONGTEXT,
    create_time BIGINT,
    user_id VARCHAR(128),
    sec_uid VARCHAR(128),
    nickname TEXT,
    avatar TEXT,
    liked_count BIGINT,
    comment_count BIGINT,
    share_count BIGINT,
    collected_count BIGINT,
    item_type VARCHAR(32),
    item_url TEXT,
    cover_url TEXT,
    media_url TEXT,
    image_urls LONGTEXT,
    tags TEXT,
    source_keyword VARCHAR(255),
    ip_location VARCHAR(255),
    last_modify_ts BIGINT,
    PRIMARY KEY (platform, item_id)
) DEFAULT CHARSET = utf8mb4"#,
    r#"CREATE TABLE IF NOT EXISTS comments (
    platform VARCHAR(16) NOT NULL,
    comment_id VARCHAR(64) NOT NULL,
    item_title TEXT,
    item_url TEXT,
    content LONGTEXT,
    create_time BIGINT,
    ip_location VARCHAR(255),
    like_count BIGINT,
    sub_comment_count BIGINT,
    parent_comment_id VARCHAR(64),
    nickname TEXT,
    user_id VARCHAR(128),
    sec_uid VARCHAR(128),
    avatar TEXT,
    item_id VARCHAR(64),
    item_author TEXT,
    item_liked_count BIGINT,
    item_comment_count BIGINT,
    pictures TEXT,
    last_modify_ts BIGINT,
    PRIMARY KEY (platform, comment_id),
    KEY idx_comments_item (platform, item_id)
) DEFAULT CHARSET = utf8mb4"#,
    r#"CREATE TABLE IF NOT EXISTS creators (
    platform VARCHAR(16) NOT NULL,
    user_id VARCHAR(128) NOT NULL,
    nickname TEXT,
    gender VARCHAR(16),
    avatar TEXT,
    `desc` LONGTEXT,
    ip_location VARCHAR(255),
    follows BIGINT,
    fans BIGINT,
    interaction BIGINT,
    item_count BIGINT,
    tags TEXT,
    last_modify_ts BIGINT,
    PRIMARY KEY (platform, user_id)
) DEFAULT CHARSET = utf8mb4"#,
];

/// Initializes the embedded database schema
///
/// # Arguments
///
/// * `conn` - SQLite connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::columns::{preferred_columns, key_column};
    use crate::storage::ContentKind;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initialization() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        // idempotent
        initialize_schema(&conn).unwrap();
    }

    #[test]
    fn test_tables_cover_preferred_columns() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for kind in [ContentKind::Contents, ContentKind::Comments, ContentKind::Creators] {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info({})", kind.as_str()))
                .unwrap();
            let names: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();

            assert!(names.contains(&"platform".to_string()));
            assert!(names.contains(&key_column(kind).to_string()));
            for column in preferred_columns(kind) {
                assert!(names.contains(&column.to_string()), "{} missing {}", kind.as_str(), column);
            }
        }
    }
}
