use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::transcript::transcript_exists;
use crate::types::{ResumeInfo, Session, SessionKey};

const SELECT_COLUMNS: &str = "id, session_key, user_id, agent_id, name, title,
        message_count, total_tokens, last_model, module, source,
        working_directory, trust_level, workspace_id, agent_type,
        parent_session_id, bridge_session_id, summary, archived, metadata,
        external_chat_id, platform, created_at, updated_at, title_source";

/// Placeholder id used until the agent runtime reports its real session
/// id. Kept distinct from a UUID so callers can tell a session has not
/// yet been finalized (see `finalize_session`).
pub const PENDING_SESSION_ID: &str = "pending";

/// Thread-safe manager for persisted user sessions.
///
/// Wraps a single SQLite connection in a `Mutex`. For high-concurrency
/// deployments consider a connection pool (e.g. r2d2), but a Mutex is
/// sufficient for the single-node Phase 2 target.
pub struct SessionManager {
    db: Mutex<Connection>,
}

impl SessionManager {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Return an existing session or create a new one (upsert pattern).
    ///
    /// Creating a session is cheap — no LLM call is made. The session is
    /// persisted so stats survive restarts.
    #[instrument(skip(self), fields(key = %key))]
    pub fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        // Fast path: session already exists
        if let Some(session) = self.get(key)? {
            debug!("session cache hit");
            return Ok(session);
        }

        // Slow path: create a new session row
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let key_str = key.format();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO sessions
             (id, session_key, user_id, agent_id, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![id, key_str, key.user_id, key.agent_id, key.name, now],
        )?;

        // Read back — handles the race where two threads insert simultaneously
        let session = db.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE session_key = ?1"),
            rusqlite::params![key_str],
            row_to_session,
        )?;

        Ok(session)
    }

    /// `get_or_create`, plus the continuity decisions the orchestrator
    /// needs before it can build a prompt: whether there's a prior turn
    /// (`is_new`), and — for an existing session — a resume hint.
    ///
    /// Implements the four-way resume decision: a stored row with a
    /// transcript on disk resumes directly; a stored row with no
    /// transcript (e.g. a connector created it before the agent ever
    /// ran) is treated as new rather than handed a `resume_id` the CLI
    /// can't actually resume; a missing row whose key name already has a
    /// transcript at the computed path backfills a placeholder row and
    /// resumes it; otherwise a brand new session is created with the
    /// placeholder id [`PENDING_SESSION_ID`] so the caller can tell a
    /// real agent-runtime session id hasn't been assigned yet — see
    /// `finalize_session`.
    #[instrument(skip(self), fields(key = %key, working_dir))]
    pub fn get_or_create_session(
        &self,
        key: &SessionKey,
        source: Option<&str>,
        workspace_id: Option<&str>,
        working_dir: &str,
        claude_home: &Path,
    ) -> Result<(Session, ResumeInfo, bool)> {
        if let Some(session) = self.get(key)? {
            let resumable = session.id != PENDING_SESSION_ID
                && transcript_exists(claude_home, working_dir, &session.id);
            let resume = ResumeInfo {
                resume_id: if resumable { Some(session.id.clone()) } else { None },
            };
            return Ok((session, resume, false));
        }

        if transcript_exists(claude_home, working_dir, &key.name) {
            return self.backfill_session(key, &key.name, source, workspace_id, working_dir);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let key_str = key.format();
        let metadata = serde_json::Value::Object(Default::default());

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions
             (id, session_key, user_id, agent_id, name, source, workspace_id,
              archived, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?9)",
            rusqlite::params![
                PENDING_SESSION_ID,
                key_str,
                key.user_id,
                key.agent_id,
                key.name,
                source,
                workspace_id,
                metadata.to_string(),
                now,
            ],
        )?;

        let session = db.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE session_key = ?1"),
            rusqlite::params![key_str],
            row_to_session,
        )?;

        Ok((session, ResumeInfo::default(), true))
    }

    /// Backfill a row for a session the SDK already has a transcript for
    /// but this store has no metadata row for yet — spec's "store lacks
    /// the row but a transcript exists at the computed path" branch.
    /// `id` becomes both the row's primary id and the resume id, since
    /// there is no separate placeholder phase here (the SDK already
    /// assigned it).
    fn backfill_session(
        &self,
        key: &SessionKey,
        id: &str,
        source: Option<&str>,
        workspace_id: Option<&str>,
        working_dir: &str,
    ) -> Result<(Session, ResumeInfo, bool)> {
        let now = chrono::Utc::now().to_rfc3339();
        let key_str = key.format();
        let metadata = serde_json::Value::Object(Default::default());

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions
             (id, session_key, user_id, agent_id, name, source, workspace_id,
              working_directory, archived, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10)",
            rusqlite::params![
                id,
                key_str,
                key.user_id,
                key.agent_id,
                key.name,
                source,
                workspace_id,
                working_dir,
                metadata.to_string(),
                now,
            ],
        )?;

        let session = db.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE session_key = ?1"),
            rusqlite::params![key_str],
            row_to_session,
        )?;

        let resume = ResumeInfo {
            resume_id: Some(id.to_string()),
        };
        Ok((session, resume, false))
    }

    /// Rewrite a session's placeholder id to the real id the agent
    /// runtime assigned, once it's known. A no-op if the session was
    /// already finalized (id already real).
    ///
    /// Must run before the `done` event is yielded to the client, so the
    /// client cannot start a second turn against a still-`"pending"` id.
    #[instrument(skip(self), fields(key = %key, real_id))]
    pub fn finalize_session(&self, key: &SessionKey, real_id: &str) -> Result<()> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET id = ?1 WHERE session_key = ?2 AND id = ?3",
            rusqlite::params![real_id, key_str, PENDING_SESSION_ID],
        )?;
        if rows_changed == 0 {
            // Either already finalized, or the session doesn't exist —
            // both are fine; finalize_session is best-effort-idempotent.
            debug!("finalize_session: no pending row to update");
        }
        Ok(())
    }

    /// Retrieve a session by key, returning `None` if it does not exist.
    #[instrument(skip(self), fields(key = %key))]
    pub fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE session_key = ?1"),
            rusqlite::params![key_str],
            row_to_session,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e)),
        }
    }

    /// Retrieve a session by its primary id.
    #[instrument(skip(self), fields(id))]
    pub fn get_by_id(&self, id: &str) -> Result<Session> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1"),
            rusqlite::params![id],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => SessionError::NotFound { key: id.to_string() },
            other => SessionError::Database(other),
        })
    }

    /// List the most-recently-updated sessions for a user, newest first.
    #[instrument(skip(self), fields(user_id, limit))]
    pub fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions
             WHERE user_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// List sessions, optionally scoped to a workspace and/or excluding
    /// archived ones, newest first.
    #[instrument(skip(self), fields(workspace_id, include_archived, limit))]
    pub fn list_sessions(
        &self,
        workspace_id: Option<&str>,
        include_archived: bool,
        limit: usize,
    ) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut clauses = Vec::new();
        if workspace_id.is_some() {
            clauses.push("workspace_id = ?1".to_string());
        }
        if !include_archived {
            clauses.push("archived = 0".to_string());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM sessions {where_clause} ORDER BY updated_at DESC LIMIT ?{n}",
            n = if workspace_id.is_some() { 2 } else { 1 }
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = if let Some(ws) = workspace_id {
            stmt.query_map(rusqlite::params![ws, limit as i64], row_to_session)?
                .filter_map(|r| r.ok())
                .collect()
        } else {
            stmt.query_map(rusqlite::params![limit as i64], row_to_session)?
                .filter_map(|r| r.ok())
                .collect()
        };
        Ok(rows)
    }

    /// Increment `message_count` by 1, add `tokens` to `total_tokens`,
    /// and record the model that was used.
    ///
    /// Also bumps `updated_at` so `list_for_user` ordering stays current.
    #[instrument(skip(self), fields(key = %key, tokens, model))]
    pub fn update_stats(&self, key: &SessionKey, tokens: u64, model: &str) -> Result<()> {
        let key_str = key.format();
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions
             SET message_count = message_count + 1,
                 total_tokens  = total_tokens  + ?1,
                 last_model    = ?2,
                 updated_at    = ?3
             WHERE session_key = ?4",
            rusqlite::params![tokens as i64, model, now, key_str],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: key_str });
        }
        Ok(())
    }

    /// Increment `message_count` by an arbitrary amount — sandboxed turns
    /// count as two messages (user + synthesized assistant transcript
    /// entry) since they never go through `update_stats`'s per-message path.
    #[instrument(skip(self), fields(id, by))]
    pub fn increment_message_count(&self, id: &str, by: u32) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET message_count = message_count + ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![by, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Update a session's trust level, working directory, agent type,
    /// and/or summary in place. `None` leaves a field unchanged.
    #[instrument(skip(self), fields(id))]
    pub fn update_session(
        &self,
        id: &str,
        working_directory: Option<&str>,
        trust_level: Option<&str>,
        agent_type: Option<&str>,
        summary: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions
             SET working_directory = COALESCE(?1, working_directory),
                 trust_level       = COALESCE(?2, trust_level),
                 agent_type        = COALESCE(?3, agent_type),
                 summary           = COALESCE(?4, summary),
                 updated_at        = ?5
             WHERE id = ?6",
            rusqlite::params![working_directory, trust_level, agent_type, summary, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Overwrite a session's title only if it's unset or was last set by
    /// the observer itself (spec §4.6: "only if AI-set or unset"); a
    /// user-chosen title is never clobbered by a later observer pass.
    /// Silently no-ops (not an error) when the title is user-owned, since
    /// this is a best-effort background update.
    #[instrument(skip(self, title), fields(id))]
    pub fn set_title_if_ai_owned(&self, id: &str, title: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE sessions
             SET title = ?1, title_source = 'ai', updated_at = ?2
             WHERE id = ?3 AND (title IS NULL OR title_source = 'ai')",
            rusqlite::params![title, now, id],
        )?;
        Ok(())
    }

    /// Explicitly (re)name a session, marking the title user-owned so the
    /// observer never overwrites it again.
    #[instrument(skip(self, title), fields(id))]
    pub fn set_title_by_user(&self, id: &str, title: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET title = ?1, title_source = 'user', updated_at = ?2 WHERE id = ?3",
            rusqlite::params![title, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Update a session's observer-maintained summary.
    #[instrument(skip(self, summary), fields(id))]
    pub fn set_summary(&self, id: &str, summary: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET summary = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![summary, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Persist the observer's own continuity session id onto the turn's
    /// parent session, so the next post-turn pass resumes a single
    /// long-running observer context per parent session (spec §4.6.4).
    #[instrument(skip(self), fields(id))]
    pub fn set_bridge_session_id(&self, id: &str, bridge_session_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET bridge_session_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![bridge_session_id, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Hide a session from default listings without deleting it.
    #[instrument(skip(self), fields(id))]
    pub fn archive_session(&self, id: &str) -> Result<()> {
        self.set_archived(id, true)
    }

    /// Reverse `archive_session`.
    #[instrument(skip(self), fields(id))]
    pub fn unarchive_session(&self, id: &str) -> Result<()> {
        self.set_archived(id, false)
    }

    fn set_archived(&self, id: &str, archived: bool) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET archived = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![archived as i64, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Permanently delete a session record, by key. Does not touch the
    /// agent-runtime transcript file on disk, only this row.
    #[instrument(skip(self), fields(key = %key))]
    pub fn delete(&self, key: &SessionKey) -> Result<()> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "DELETE FROM sessions WHERE session_key = ?1",
            rusqlite::params![key_str],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: key_str });
        }
        Ok(())
    }

    /// Permanently delete a session record, by id.
    #[instrument(skip(self), fields(id))]
    pub fn delete_session(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id])?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    /// Aggregate counts used by the health/status surface: total sessions,
    /// archived count, and sessions per workspace.
    #[instrument(skip(self))]
    pub fn get_stats(&self) -> Result<SessionStats> {
        let db = self.db.lock().unwrap();
        let total: i64 = db.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
        let archived: i64 = db.query_row(
            "SELECT COUNT(*) FROM sessions WHERE archived = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(SessionStats {
            total: total as u64,
            archived: archived as u64,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub total: u64,
    pub archived: u64,
}

/// Map a SQLite row to a `Session`.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let key_str: String = row.get(1)?;
    // If the stored key is somehow malformed we fall back to a reconstructed key
    // from the individual columns rather than panicking.
    let key = SessionKey::parse(&key_str).unwrap_or_else(|_| SessionKey {
        user_id: row.get::<_, String>(2).unwrap_or_default(),
        agent_id: row.get::<_, String>(3).unwrap_or_default(),
        name: row.get::<_, String>(4).unwrap_or_default(),
    });

    let metadata_raw: String = row.get(19)?;
    let metadata = serde_json::from_str(&metadata_raw)
        .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));

    Ok(Session {
        id: row.get(0)?,
        key,
        title: row.get(5)?,
        message_count: row.get::<_, i64>(6)? as u32,
        total_tokens: row.get::<_, i64>(7)? as u64,
        last_model: row.get(8)?,
        module: row.get(9)?,
        source: row.get(10)?,
        working_directory: row.get(11)?,
        trust_level: row.get(12)?,
        workspace_id: row.get(13)?,
        agent_type: row.get(14)?,
        parent_session_id: row.get(15)?,
        bridge_session_id: row.get(16)?,
        summary: row.get(17)?,
        archived: row.get::<_, i64>(18)? != 0,
        metadata,
        external_chat_id: row.get(20)?,
        platform: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
        title_is_ai_set: row.get::<_, String>(24).map(|v| v == "ai").unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::transcript::write_sandbox_transcript_append;

    fn manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        SessionManager::new(conn)
    }

    /// An empty directory stands in for a `~/.claude` home with no
    /// transcripts, for tests that only care about the no-transcript path.
    fn no_transcripts() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn get_or_create_session_starts_pending() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        let (session, resume, is_new) = mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        assert!(is_new);
        assert_eq!(session.id, PENDING_SESSION_ID);
        assert!(resume.resume_id.is_none());
    }

    #[test]
    fn existing_row_without_transcript_is_treated_as_new() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id-123").unwrap();

        // The row now has a real id, but the SDK never actually wrote a
        // transcript for it (e.g. the runtime crashed before producing
        // one) — resume_id must stay None rather than passing a dead id
        // to `--resume`.
        let (session, resume, is_new) =
            mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        assert_eq!(session.id, "real-id-123");
        assert!(!is_new);
        assert!(resume.resume_id.is_none());
    }

    #[test]
    fn existing_row_with_transcript_resumes() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id-123").unwrap();
        write_sandbox_transcript_append(home.path(), "/vault/demo", "real-id-123", "hi", "hello").unwrap();

        let (session, resume, is_new) =
            mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        assert_eq!(session.id, "real-id-123");
        assert!(!is_new);
        assert_eq!(resume.resume_id.as_deref(), Some("real-id-123"));
    }

    #[test]
    fn missing_row_with_transcript_at_key_name_is_backfilled() {
        let mgr = manager();
        let home = no_transcripts();
        // The key's name plays the role of a previously issued SDK session
        // id the client is resuming with, after the metadata row was lost.
        let key = SessionKey::new("u1", "main", "sdk-session-abc");
        write_sandbox_transcript_append(home.path(), "/vault/demo", "sdk-session-abc", "hi", "hello").unwrap();

        let (session, resume, is_new) =
            mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        assert_eq!(session.id, "sdk-session-abc");
        assert!(!is_new);
        assert_eq!(resume.resume_id.as_deref(), Some("sdk-session-abc"));
    }

    #[test]
    fn finalize_session_rewrites_pending_id() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id-123").unwrap();
        let session = mgr.get(&key).unwrap().unwrap();
        assert_eq!(session.id, "real-id-123");
    }

    #[test]
    fn finalize_session_is_idempotent() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id-123").unwrap();
        // Second finalize with a different id must not clobber the first.
        mgr.finalize_session(&key, "other-id").unwrap();
        let session = mgr.get(&key).unwrap().unwrap();
        assert_eq!(session.id, "real-id-123");
    }

    #[test]
    fn archive_and_unarchive_round_trip() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        let (session, ..) = mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id").unwrap();
        mgr.archive_session("real-id").unwrap();
        let listed = mgr.list_sessions(None, false, 10).unwrap();
        assert!(listed.is_empty());
        let listed_all = mgr.list_sessions(None, true, 10).unwrap();
        assert_eq!(listed_all.len(), 1);
        mgr.unarchive_session("real-id").unwrap();
        let listed = mgr.list_sessions(None, false, 10).unwrap();
        assert_eq!(listed.len(), 1);
        let _ = session;
    }

    #[test]
    fn increment_message_count_by_two_for_sandboxed_turns() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id").unwrap();
        mgr.increment_message_count("real-id", 2).unwrap();
        let session = mgr.get_by_id("real-id").unwrap();
        assert_eq!(session.message_count, 2);
    }

    #[test]
    fn get_stats_counts_archived_separately() {
        let mgr = manager();
        let home = no_transcripts();
        let key = SessionKey::new("u1", "main", "main");
        mgr.get_or_create_session(&key, None, None, "/vault/demo", home.path()).unwrap();
        mgr.finalize_session(&key, "real-id").unwrap();
        mgr.archive_session("real-id").unwrap();
        let stats = mgr.get_stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.archived, 1);
    }
}
