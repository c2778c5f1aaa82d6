//! Embedded event store (libsql local mode)
//!
//! Owns the on-disk schema, the open/close lifecycle, and the rotation
//! policy. The store file lives in the per-user data directory and is opened
//! in WAL mode so readers are never blocked by the single writer. Rotation
//! renames the active file once it crosses the size threshold and prunes the
//! oldest rotated files beyond the retention count; rotation failures are
//! logged and swallowed so they can never abort a write.

use std::path::{Path, PathBuf};

use chrono::Utc;
use libsql::params;

use crate::error::{AuditError, Result};
use crate::event::{
    Activity, AuditEvent, Actor, Category, ProductMetadata, Severity, Status, Target,
};
use crate::query::{build_select, QueryFilter, StoreStats, EVENT_COLUMNS};

const MS_PER_DAY: i64 = 86_400_000;

/// Embedded audit event store
pub(crate) struct EventStore {
    db_path: PathBuf,
    max_size_bytes: u64,
    max_rotated: usize,
    db: Option<libsql::Database>,
}

impl EventStore {
    pub(crate) fn new(db_path: PathBuf, max_size_bytes: u64, max_rotated: usize) -> Self {
        Self {
            db_path,
            max_size_bytes,
            max_rotated,
            db: None,
        }
    }

    /// Open the store, rotating first if the active file is already over the
    /// size threshold, and ensure the schema exists. Idempotent.
    pub(crate) async fn open(&mut self) -> Result<()> {
        if self.db.is_some() {
            return Ok(());
        }

        self.rotate_if_needed().await;

        let db = libsql::Builder::new_local(&self.db_path)
            .build()
            .await
            .map_err(|e| {
                AuditError::Storage(format!(
                    "Failed to open store at '{}': {}",
                    self.db_path.display(),
                    e
                ))
            })?;

        let conn = db.connect()?;

        // WAL is a persistent database property; setting it once at open is
        // enough for every later connection.
        conn.query("PRAGMA journal_mode=WAL", ()).await?;

        ensure_schema(&conn).await?;

        self.db = Some(db);
        tracing::debug!(path = %self.db_path.display(), "Audit store opened");
        Ok(())
    }

    pub(crate) fn is_open(&self) -> bool {
        self.db.is_some()
    }

    fn conn(&self) -> Result<libsql::Connection> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| AuditError::Storage("store is not open".into()))?;
        Ok(db.connect()?)
    }

    /// Insert one event, rotating first if the active file has crossed the
    /// size threshold (rotation closes the handle; the store reopens
    /// transparently).
    pub(crate) async fn insert(&mut self, event: &AuditEvent) -> Result<()> {
        self.rotate_if_needed().await;
        if !self.is_open() {
            self.open().await?;
        }
        let conn = self.conn()?;

        let metadata = serde_json::to_string(&event.metadata)?;
        let target_data = event
            .target
            .as_ref()
            .and_then(|t| t.data.as_ref())
            .map(serde_json::to_string)
            .transpose()?;
        let raw = event.raw.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            &format!(
                "INSERT INTO audit_events ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                EVENT_COLUMNS
            ),
            params![
                event.time,
                event.category.uid() as i64,
                event.activity.id() as i64,
                event.severity.id() as i64,
                event.status.id() as i64,
                event.status_detail.clone(),
                event.message.clone(),
                event.actor.as_ref().and_then(|a| a.user.clone()),
                event.actor.as_ref().and_then(|a| a.process.clone()),
                event.actor.as_ref().and_then(|a| a.session.clone()),
                event.target.as_ref().and_then(|t| t.kind.clone()),
                event.target.as_ref().and_then(|t| t.name.clone()),
                target_data,
                metadata,
                raw,
            ],
        )
        .await?;

        Ok(())
    }

    /// Run a filtered query, newest events first.
    pub(crate) async fn query(&self, filter: &QueryFilter) -> Result<Vec<AuditEvent>> {
        let conn = self.conn()?;
        let (sql, query_params) = build_select(filter);

        let mut rows = conn.query(&sql, query_params).await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Aggregate statistics over the store.
    pub(crate) async fn stats(&self, now_ms: i64) -> Result<StoreStats> {
        let conn = self.conn()?;
        let mut stats = StoreStats::default();

        let mut rows = conn.query("SELECT COUNT(*) FROM audit_events", ()).await?;
        if let Some(row) = rows.next().await? {
            stats.total_events = row.get::<i64>(0)? as u64;
        }

        let mut rows = conn
            .query(
                "SELECT category, COUNT(*) FROM audit_events GROUP BY category",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let uid = row.get::<i64>(0)? as u32;
            let count = row.get::<i64>(1)? as u64;
            if let Some(category) = Category::from_uid(uid) {
                stats.by_category.insert(category.name().to_string(), count);
            }
        }

        let mut rows = conn
            .query(
                "SELECT activity, COUNT(*) FROM audit_events GROUP BY activity",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let id = row.get::<i64>(0)? as u32;
            let count = row.get::<i64>(1)? as u64;
            if let Some(activity) = Activity::from_id(id) {
                stats.by_activity.insert(activity.name().to_string(), count);
            }
        }

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM audit_events WHERE time >= ?1",
                params![now_ms - MS_PER_DAY],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            stats.events_last_24h = row.get::<i64>(0)? as u64;
        }

        stats.db_size_mb = std::fs::metadata(&self.db_path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        Ok(stats)
    }

    /// Close the store, checkpointing the WAL back into the main file.
    /// Safe to call when already closed.
    pub(crate) async fn close(&mut self) {
        if let Ok(conn) = self.conn() {
            if let Err(e) = conn.query("PRAGMA wal_checkpoint(TRUNCATE)", ()).await {
                tracing::warn!(error = %e, "WAL checkpoint on close failed");
            }
        }
        self.db = None;
    }

    /// Rotate the active file if it has crossed the size threshold, then
    /// prune rotated files beyond the retention count. Never fails: every
    /// error is logged and swallowed so writes proceed.
    pub(crate) async fn rotate_if_needed(&mut self) {
        let size = match std::fs::metadata(&self.db_path) {
            Ok(meta) => meta.len(),
            Err(_) => return, // no active file yet
        };
        if size < self.max_size_bytes {
            return;
        }

        tracing::info!(
            size_bytes = size,
            threshold = self.max_size_bytes,
            "Rotating audit store"
        );

        self.close().await;

        let rotated = self.rotated_name();
        if let Err(e) = std::fs::rename(&self.db_path, &rotated) {
            tracing::warn!(error = %e, "Failed to rename audit store for rotation");
            return;
        }

        // The WAL was checkpointed on close; drop any stray sidecar files so
        // the fresh store starts clean.
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(&self.db_path, suffix);
            if sidecar.exists() {
                let _ = std::fs::remove_file(&sidecar);
            }
        }

        self.prune_rotated();
    }

    fn rotated_name(&self) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S");
        let stem = self
            .db_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audit");
        self.db_path
            .with_file_name(format!("{}-{}.db", stem, timestamp))
    }

    /// List rotated store files, newest first.
    pub(crate) fn rotated_files(&self) -> Vec<PathBuf> {
        let stem = self
            .db_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audit");
        let prefix = format!("{}-", stem);
        let dir = match self.db_path.parent() {
            Some(dir) => dir,
            None => return Vec::new(),
        };

        let mut rotated: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(&prefix) && n.ends_with(".db"))
                        .unwrap_or(false)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list rotated audit files");
                return Vec::new();
            }
        };

        // Timestamp-suffixed names sort lexicographically in chronological
        // order, so descending name order is newest-first.
        rotated.sort();
        rotated.reverse();
        rotated
    }

    fn prune_rotated(&self) {
        for stale in self.rotated_files().into_iter().skip(self.max_rotated) {
            match std::fs::remove_file(&stale) {
                Ok(()) => tracing::info!(path = %stale.display(), "Pruned rotated audit store"),
                Err(e) => {
                    tracing::warn!(path = %stale.display(), error = %e, "Failed to prune rotated audit store")
                }
            }
        }
    }
}

async fn ensure_schema(conn: &libsql::Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time INTEGER NOT NULL,
            category INTEGER NOT NULL,
            activity INTEGER NOT NULL,
            severity INTEGER NOT NULL,
            status INTEGER NOT NULL,
            status_detail TEXT,
            message TEXT NOT NULL,
            actor_user TEXT,
            actor_process TEXT,
            actor_session TEXT,
            target_type TEXT,
            target_name TEXT,
            target_data TEXT,
            metadata TEXT NOT NULL,
            raw TEXT
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_events_time ON audit_events (time)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_events_category ON audit_events (category)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_events_activity ON audit_events (activity)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_events_target ON audit_events (target_type)",
        (),
    )
    .await?;

    Ok(())
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audit.db")
        .to_string();
    name.push_str(suffix);
    db_path.with_file_name(name)
}

fn row_to_event(row: &libsql::Row) -> Result<AuditEvent> {
    let time: i64 = row
        .get(0)
        .map_err(|e| AuditError::Storage(format!("Failed to read time: {}", e)))?;

    let category_uid: i64 = row
        .get(1)
        .map_err(|e| AuditError::Storage(format!("Failed to read category: {}", e)))?;
    let category = Category::from_uid(category_uid as u32)
        .ok_or_else(|| AuditError::Storage(format!("Unknown category uid {}", category_uid)))?;

    let activity_id: i64 = row
        .get(2)
        .map_err(|e| AuditError::Storage(format!("Failed to read activity: {}", e)))?;
    let activity = Activity::from_id(activity_id as u32)
        .ok_or_else(|| AuditError::Storage(format!("Unknown activity id {}", activity_id)))?;

    let severity_id: i64 = row
        .get(3)
        .map_err(|e| AuditError::Storage(format!("Failed to read severity: {}", e)))?;
    let severity = Severity::from_id(severity_id as u32)
        .ok_or_else(|| AuditError::Storage(format!("Unknown severity id {}", severity_id)))?;

    let status_id: i64 = row
        .get(4)
        .map_err(|e| AuditError::Storage(format!("Failed to read status: {}", e)))?;
    let status = Status::from_id(status_id as u32)
        .ok_or_else(|| AuditError::Storage(format!("Unknown status id {}", status_id)))?;

    let message: String = row
        .get(6)
        .map_err(|e| AuditError::Storage(format!("Failed to read message: {}", e)))?;

    let metadata_str: String = row
        .get(13)
        .map_err(|e| AuditError::Storage(format!("Failed to read metadata: {}", e)))?;
    let metadata: ProductMetadata = serde_json::from_str(&metadata_str)?;

    let actor = Actor {
        user: row.get(7).ok(),
        process: row.get(8).ok(),
        session: row.get(9).ok(),
    };
    let target = Target {
        kind: row.get(10).ok(),
        name: row.get(11).ok(),
        data: row
            .get::<String>(12)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
    };

    Ok(AuditEvent {
        time,
        category,
        activity,
        severity,
        status,
        status_detail: row.get(5).ok(),
        message,
        actor: (!actor.is_empty()).then_some(actor),
        target: (!target.is_empty()).then_some(target),
        metadata,
        raw: row
            .get::<String>(14)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &Path) -> EventStore {
        EventStore::new(dir.join("audit.db"), 10 * 1024 * 1024, 5)
    }

    fn sample_event(message: &str) -> AuditEvent {
        AuditEvent::new(
            Category::Authentication,
            Activity::Authenticate,
            message,
            ProductMetadata::default(),
        )
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.open().await.unwrap();
        store.open().await.unwrap();
        assert!(store.is_open());
    }

    #[tokio::test]
    async fn insert_and_query_roundtrips_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.open().await.unwrap();

        let event = sample_event("login from laptop")
            .with_severity(Severity::High)
            .with_status(Status::Failure, Some("bad password".into()))
            .with_actor(Actor {
                user: Some("alice".into()),
                process: Some("warden-gw".into()),
                session: Some("sess-1".into()),
            })
            .with_target(Target {
                kind: Some("account".into()),
                name: Some("alice@example.com".into()),
                data: Some(json!({"attempts": 3})),
            })
            .with_raw(json!({"ip": "10.0.0.7"}));

        store.insert(&event).await.unwrap();

        let results = store.query(&QueryFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], event);
        assert_eq!(results[0].severity.id(), 4);
        assert_eq!(results[0].category.name(), "authentication");
    }

    #[tokio::test]
    async fn query_filters_and_orders_descending() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.open().await.unwrap();

        for (i, category) in [
            Category::Authentication,
            Category::System,
            Category::Authentication,
        ]
        .iter()
        .enumerate()
        {
            let mut event = AuditEvent::new(
                *category,
                Activity::Execute,
                format!("event {}", i),
                ProductMetadata::default(),
            );
            event.time = 1_000 + i as i64;
            store.insert(&event).await.unwrap();
        }

        let all = store.query(&QueryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].time > all[1].time && all[1].time > all[2].time);

        let auth = store
            .query(&QueryFilter::default().with_category(Category::Authentication))
            .await
            .unwrap();
        assert_eq!(auth.len(), 2);

        let limited = store
            .query(&QueryFilter::default().with_limit(1).with_offset(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].time, 1_001);
    }

    #[tokio::test]
    async fn stats_aggregates_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.open().await.unwrap();

        let now = Utc::now().timestamp_millis();
        store.insert(&sample_event("a")).await.unwrap();
        store.insert(&sample_event("b")).await.unwrap();
        let mut old = AuditEvent::new(
            Category::System,
            Activity::Execute,
            "ancient",
            ProductMetadata::default(),
        );
        old.time = now - 2 * MS_PER_DAY;
        store.insert(&old).await.unwrap();

        let stats = store.stats(now).await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.by_category.get("authentication"), Some(&2));
        assert_eq!(stats.by_category.get("system"), Some(&1));
        assert_eq!(stats.by_activity.get("authenticate"), Some(&2));
        assert_eq!(stats.events_last_24h, 2);
        assert!(stats.db_size_mb > 0.0);
    }

    #[tokio::test]
    async fn oversized_file_is_rotated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("audit.db");
        std::fs::write(&db_path, vec![0u8; 4096]).unwrap();

        let mut store = EventStore::new(db_path.clone(), 1024, 5);
        store.open().await.unwrap();

        let rotated = store.rotated_files();
        assert_eq!(rotated.len(), 1);
        // The fresh store accepts writes after rotation.
        store.insert(&sample_event("after rotation")).await.unwrap();
        let results = store.query(&QueryFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn pruning_keeps_only_newest_rotated_files() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("audit.db");
        for day in 1..=7 {
            let name = format!("audit-2026010{}T000000.db", day);
            std::fs::write(dir.path().join(name), b"old").unwrap();
        }
        std::fs::write(&db_path, vec![0u8; 4096]).unwrap();

        let mut store = EventStore::new(db_path, 1024, 5);
        store.open().await.unwrap();

        let rotated = store.rotated_files();
        assert_eq!(rotated.len(), 5);
        // The survivors are the newest ones; the fresh rotation is first.
        let names: Vec<String> = rotated
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert!(!names.contains(&"audit-20260101T000000.db".to_string()));
        assert!(!names.contains(&"audit-20260102T000000.db".to_string()));
    }

    #[tokio::test]
    async fn rotation_mid_stream_reopens_transparently() {
        let dir = tempfile::tempdir().unwrap();
        // Any write pushes the file past a 1-byte threshold, so the second
        // insert must rotate, reopen, and still succeed.
        let mut store = EventStore::new(dir.path().join("audit.db"), 1, 5);
        store.open().await.unwrap();

        store.insert(&sample_event("first")).await.unwrap();
        store.insert(&sample_event("second")).await.unwrap();

        assert!(store.is_open());
        assert!(!store.rotated_files().is_empty());
    }

    #[tokio::test]
    async fn close_twice_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.open().await.unwrap();
        store.close().await;
        store.close().await;
        assert!(!store.is_open());
    }
}
