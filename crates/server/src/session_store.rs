//! Session Store — SQLite-backed session persistence.
//!
//! Uses `spawn_blocking` for async-safe SQLite access; every operation
//! opens its own connection (WAL mode tolerates this) and returns only
//! after the write is durable, so callers can sequence "persist, then
//! emit" against the returned ack.
//!
//! Rows: `(id TEXT PK, data TEXT json, expires_at INTEGER unix-secs)`.
//! Expiry is sliding: a live read pushes `expires_at` forward by the TTL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::session::SessionRecord;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub struct SessionStore {
    db_path: PathBuf,
    ttl_secs: u64,
    /// Per-session mutex for read-modify-write sequences. On a
    /// multi-threaded runtime two tasks can interleave get → mutate → save
    /// on the same session; every such sequence must hold `lock` first.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Open (and if needed create) the store at `db_path`.
    pub fn open(db_path: PathBuf, ttl: Duration) -> Result<Self, GatewayError> {
        let conn = open_connection(&db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;

        info!(
            component = "session_store",
            event = "session_store.opened",
            db_path = %db_path.display(),
            ttl_secs = ttl.as_secs(),
            "Session store ready"
        );

        Ok(Self {
            db_path,
            ttl_secs: ttl.as_secs(),
            locks: DashMap::new(),
        })
    }

    /// Serialize read-modify-write sequences against one session. The
    /// guard must be held from the `get` through the final `save`;
    /// adoption's at-most-once guarantee depends on it.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Read a session record. Expired rows are deleted and read as absent;
    /// a live read slides the expiry forward by the TTL.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, GatewayError> {
        let db_path = self.db_path.clone();
        let ttl_secs = self.ttl_secs;
        let id = session_id.to_string();

        let row = tokio::task::spawn_blocking(move || -> Result<Option<String>, rusqlite::Error> {
            let conn = open_connection(&db_path)?;
            let now = unix_now_secs();

            let found: Option<(String, i64)> = conn
                .query_row(
                    "SELECT data, expires_at FROM sessions WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match found {
                Some((_, expires_at)) if expires_at <= now as i64 => {
                    conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
                    Ok(None)
                }
                Some((data, _)) => {
                    conn.execute(
                        "UPDATE sessions SET expires_at = ?2 WHERE id = ?1",
                        params![id, (now + ttl_secs) as i64],
                    )?;
                    Ok(Some(data))
                }
                None => Ok(None),
            }
        })
        .await??;

        match row {
            Some(data) => match serde_json::from_str(&data) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(
                        component = "session_store",
                        event = "session_store.corrupt_record",
                        session_id = %session_id,
                        error = %e,
                        "Session record is not valid JSON, treating as absent"
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Upsert a session record, resetting its expiry. Returns after the
    /// write is durable.
    pub async fn save(
        &self,
        session_id: &str,
        record: &SessionRecord,
    ) -> Result<(), GatewayError> {
        let db_path = self.db_path.clone();
        let id = session_id.to_string();
        let data = serde_json::to_string(record)
            .map_err(|e| GatewayError::SessionPersistence(e.to_string()))?;
        let expires_at = (unix_now_secs() + self.ttl_secs) as i64;

        tokio::task::spawn_blocking(move || -> Result<(), rusqlite::Error> {
            let conn = open_connection(&db_path)?;
            conn.execute(
                "INSERT INTO sessions (id, data, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = ?2, expires_at = ?3",
                params![id, data, expires_at],
            )?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    /// Delete a session record.
    pub async fn destroy(&self, session_id: &str) -> Result<(), GatewayError> {
        let db_path = self.db_path.clone();
        let id = session_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), rusqlite::Error> {
            let conn = open_connection(&db_path)?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await??;

        // Drop the session's lock entry unless someone is mid-sequence.
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);

        Ok(())
    }

    /// Delete all expired rows. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<usize, GatewayError> {
        let db_path = self.db_path.clone();

        let removed = tokio::task::spawn_blocking(move || -> Result<usize, rusqlite::Error> {
            let conn = open_connection(&db_path)?;
            conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![unix_now_secs() as i64],
            )
        })
        .await??;

        Ok(removed)
    }

    /// Spawn the periodic expiry janitor.
    pub fn spawn_janitor(store: Arc<SessionStore>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                match store.sweep_expired().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        debug!(
                            component = "session_store",
                            event = "session_store.swept",
                            removed,
                            "Removed expired sessions"
                        );
                    }
                    Err(e) => {
                        warn!(
                            component = "session_store",
                            event = "session_store.sweep_failed",
                            error = %e,
                            "Expiry sweep failed"
                        );
                    }
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) async fn set_expires_at(&self, session_id: &str, expires_at: i64) {
        let db_path = self.db_path.clone();
        let id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&db_path).unwrap();
            conn.execute(
                "UPDATE sessions SET expires_at = ?2 WHERE id = ?1",
                params![id, expires_at],
            )
            .unwrap();
        })
        .await
        .unwrap();
    }
}

fn open_connection(db_path: &PathBuf) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Milliseconds since the Unix epoch, for wire timestamps.
pub(crate) fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_protocol::{PendingNotification, PendingNotificationData};

    fn record_with_token(token: &str) -> SessionRecord {
        SessionRecord {
            token: Some(token.to_string()),
            ..Default::default()
        }
    }

    fn temp_store(ttl: Duration) -> (tempfile::TempDir, Arc<SessionStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::open(dir.path().join("sessions.db"), ttl).expect("open store");
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));

        store.save("s1", &record_with_token("t1")).await.unwrap();
        let loaded = store.get("s1").await.unwrap().expect("record");
        assert_eq!(loaded.token.as_deref(), Some("t1"));
        assert!(loaded.user.is_none());
    }

    #[tokio::test]
    async fn missing_session_reads_as_absent() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_removes_record() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));
        store.save("s1", &SessionRecord::default()).await.unwrap();
        store.destroy("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_record_reads_as_absent_and_is_deleted() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));
        store.save("s1", &record_with_token("t1")).await.unwrap();
        store.set_expires_at("s1", 1).await;

        assert!(store.get("s1").await.unwrap().is_none());
        // Deleted, not just hidden: even after resurrecting the clock the
        // row is gone.
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_read_slides_expiry_forward() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));
        store.save("s1", &record_with_token("t1")).await.unwrap();

        // Shrink the window, then read: the read must push it back out.
        let near = (unix_now_secs() + 10) as i64;
        store.set_expires_at("s1", near).await;
        assert!(store.get("s1").await.unwrap().is_some());

        store.set_expires_at("s1", near).await;
        let _ = store.get("s1").await.unwrap();
        // Second read still succeeds because the first one slid the expiry.
        assert!(store.get("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn nested_envelope_survives_persistence() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));
        let record = SessionRecord {
            pending_socket_notification: Some(PendingNotification {
                kind: PendingNotification::AUTH_SUCCESS.to_string(),
                data: PendingNotificationData {
                    user: None,
                    token: Some("t1".to_string()),
                    refresh_token: None,
                    timestamp: 7,
                },
            }),
            ..Default::default()
        };

        store.save("s1", &record).await.unwrap();
        let loaded = store.get("s1").await.unwrap().expect("record");
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let (_dir, store) = temp_store(Duration::from_secs(3600));
        store.save("live", &SessionRecord::default()).await.unwrap();
        store.save("dead", &SessionRecord::default()).await.unwrap();
        store.set_expires_at("dead", 1).await;

        let removed = store.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("live").await.unwrap().is_some());
        assert!(store.get("dead").await.unwrap().is_none());
    }
}
