use rusqlite::Connection;

use crate::error::Result;

/// Columns added on top of the original table, each applied only if
/// missing so repeated startups on an older database stay a no-op.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("module", "TEXT"),
    ("source", "TEXT"),
    ("working_directory", "TEXT"),
    ("trust_level", "TEXT"),
    ("workspace_id", "TEXT"),
    ("agent_type", "TEXT"),
    ("parent_session_id", "TEXT"),
    ("bridge_session_id", "TEXT"),
    ("summary", "TEXT"),
    ("archived", "INTEGER NOT NULL DEFAULT 0"),
    ("metadata", "TEXT NOT NULL DEFAULT '{}'"),
    ("external_chat_id", "TEXT"),
    ("platform", "TEXT"),
    // 'ai' (default) or 'user' — gates whether the post-turn observer is
    // allowed to overwrite `title` (spec §4.6: "only if AI-set or unset").
    ("title_source", "TEXT NOT NULL DEFAULT 'ai'"),
];

/// Initialise the sessions table, its index, and any columns added since
/// the original schema.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout, and
/// adds missing columns via `PRAGMA table_info` rather than assuming a
/// fresh database.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            session_key   TEXT NOT NULL UNIQUE,
            user_id       TEXT NOT NULL,
            agent_id      TEXT NOT NULL,
            name          TEXT NOT NULL,
            title         TEXT,
            message_count INTEGER NOT NULL DEFAULT 0,
            total_tokens  INTEGER NOT NULL DEFAULT 0,
            last_model    TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id, updated_at DESC);",
    )?;

    let mut existing = std::collections::HashSet::new();
    {
        let mut stmt = conn.prepare("PRAGMA table_info(sessions)")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in names {
            existing.insert(name?);
        }
    }

    for (column, decl) in ADDED_COLUMNS {
        if !existing.contains(*column) {
            conn.execute_batch(&format!(
                "ALTER TABLE sessions ADD COLUMN {column} {decl};"
            ))?;
        }
    }

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_sessions_workspace
            ON sessions(workspace_id);
         CREATE INDEX IF NOT EXISTS idx_sessions_archived
            ON sessions(archived);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent_and_adds_columns() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(sessions)").unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for (column, _) in ADDED_COLUMNS {
            assert!(names.contains(&column.to_string()), "missing column {column}");
        }
    }
}
