//! Query filters and aggregate statistics
//!
//! [`QueryFilter`] describes a filtered read over the event store: all
//! present fields are ANDed, results are always ordered newest-first, and
//! limit/offset apply after ordering. The SQL fragment builder lives here so
//! it can be unit-tested without a database.

use std::collections::HashMap;

use libsql::Value;
use serde::{Deserialize, Serialize};

use crate::event::{Activity, Category};

/// Column list shared by every event SELECT; the store's row decoder depends
/// on this ordering.
pub(crate) const EVENT_COLUMNS: &str = "time, category, activity, severity, status, \
     status_detail, message, actor_user, actor_process, actor_session, \
     target_type, target_name, target_data, metadata, raw";

/// Filter for querying audit events
///
/// Absent fields impose no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Inclusive lower bound on event time (ms since epoch)
    pub start_time: Option<i64>,
    /// Inclusive upper bound on event time (ms since epoch)
    pub end_time: Option<i64>,
    /// Restrict to one category
    pub category: Option<Category>,
    /// Restrict to one activity
    pub activity: Option<Activity>,
    /// Restrict to one target type
    pub target_kind: Option<String>,
    /// Maximum rows to return
    pub limit: Option<u32>,
    /// Rows to skip (after ordering)
    pub offset: Option<u32>,
}

impl QueryFilter {
    /// Restrict to events at or after the given time
    pub fn since(mut self, start_ms: i64) -> Self {
        self.start_time = Some(start_ms);
        self
    }

    /// Restrict to events at or before the given time
    pub fn until(mut self, end_ms: i64) -> Self {
        self.end_time = Some(end_ms);
        self
    }

    /// Restrict to one category
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Restrict to one activity
    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Restrict to one target type
    pub fn with_target_kind(mut self, kind: impl Into<String>) -> Self {
        self.target_kind = Some(kind.into());
        self
    }

    /// Cap the number of returned rows
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows after ordering
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Build the SELECT statement and positional parameters for a filter.
///
/// Results are always `ORDER BY time DESC`; LIMIT/OFFSET are emitted only
/// when the filter asks for them (`LIMIT -1` is SQLite's "no limit" when an
/// offset is present alone).
pub(crate) fn build_select(filter: &QueryFilter) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT {} FROM audit_events", EVENT_COLUMNS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(start) = filter.start_time {
        clauses.push("time >= ?");
        params.push(Value::Integer(start));
    }
    if let Some(end) = filter.end_time {
        clauses.push("time <= ?");
        params.push(Value::Integer(end));
    }
    if let Some(category) = filter.category {
        clauses.push("category = ?");
        params.push(Value::Integer(category.uid() as i64));
    }
    if let Some(activity) = filter.activity {
        clauses.push("activity = ?");
        params.push(Value::Integer(activity.id() as i64));
    }
    if let Some(ref kind) = filter.target_kind {
        clauses.push("target_type = ?");
        params.push(Value::Text(kind.clone()));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(" ORDER BY time DESC");

    if filter.limit.is_some() || filter.offset.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(
            filter.limit.map(i64::from).unwrap_or(-1),
        ));
        params.push(Value::Integer(
            filter.offset.map(i64::from).unwrap_or(0),
        ));
    }

    (sql, params)
}

/// Aggregate statistics over the event store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total persisted events
    pub total_events: u64,
    /// Event count per category name
    pub by_category: HashMap<String, u64>,
    /// Event count per activity name
    pub by_activity: HashMap<String, u64>,
    /// Events within the trailing 24 hours
    pub events_last_24h: u64,
    /// Active store file size in megabytes
    pub db_size_mb: f64,
}
