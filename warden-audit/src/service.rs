//! Audit service facade
//!
//! [`AuditService`] is the one object the rest of the application sees:
//! construct it once at process start, call `initialize()`, and inject it
//! (behind an `Arc`) into every producer. The producer contract is
//! fire-and-forget — `log()` never returns an error and never blocks on
//! network work; failures surface only through tracing and the shipper
//! statistics on the administration surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::AuditConfig;
use crate::event::{Activity, Actor, AuditEvent, Category, Severity, Status, Target};
use crate::export::{self, EXPORT_ROW_CAP};
use crate::query::{QueryFilter, StoreStats};
use crate::siem::shipper::{Shipper, ShipperContext};
use crate::siem::{ShipperStats, SiemEndpoint};
use crate::store::EventStore;

/// Caller-supplied fields for one audit event
///
/// Category, activity, and message are required; everything else is
/// optional. Severity defaults to informational and status to success.
#[derive(Debug, Clone)]
pub struct LogParams {
    pub category: Category,
    pub activity: Activity,
    pub message: String,
    pub severity: Option<Severity>,
    pub status: Option<Status>,
    pub status_detail: Option<String>,
    pub actor_user: Option<String>,
    pub actor_process: Option<String>,
    pub actor_session: Option<String>,
    pub target_kind: Option<String>,
    pub target_name: Option<String>,
    pub target_data: Option<Value>,
    pub raw: Option<Value>,
}

impl LogParams {
    pub fn new(category: Category, activity: Activity, message: impl Into<String>) -> Self {
        Self {
            category,
            activity,
            message: message.into(),
            severity: None,
            status: None,
            status_detail: None,
            actor_user: None,
            actor_process: None,
            actor_session: None,
            target_kind: None,
            target_name: None,
            target_data: None,
            raw: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_status_detail(mut self, detail: impl Into<String>) -> Self {
        self.status_detail = Some(detail.into());
        self
    }

    pub fn with_actor_user(mut self, user: impl Into<String>) -> Self {
        self.actor_user = Some(user.into());
        self
    }

    pub fn with_actor_process(mut self, process: impl Into<String>) -> Self {
        self.actor_process = Some(process.into());
        self
    }

    pub fn with_actor_session(mut self, session: impl Into<String>) -> Self {
        self.actor_session = Some(session.into());
        self
    }

    pub fn with_target(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.target_kind = Some(kind.into());
        self.target_name = Some(name.into());
        self
    }

    pub fn with_target_data(mut self, data: Value) -> Self {
        self.target_data = Some(data);
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// The audit event store and SIEM shipping service
pub struct AuditService {
    config: AuditConfig,
    store: Mutex<Option<EventStore>>,
    shipper: Shipper,
    initialized: AtomicBool,
}

impl AuditService {
    /// Create the service. No I/O happens until [`initialize`](Self::initialize).
    pub fn new(config: AuditConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        let shipper = Shipper::new(ShipperContext {
            http,
            product: config.product.clone(),
            product_version: config.product_version.clone(),
            app_host: config.product.to_lowercase(),
        });

        Self {
            config,
            store: Mutex::new(None),
            shipper,
            initialized: AtomicBool::new(false),
        }
    }

    /// Open the store, creating the data directory and schema as needed.
    ///
    /// Returns `false` on any failure (permission denied, unwritable disk);
    /// errors never escape to the caller. Idempotent: a second call while
    /// initialized returns `true` without side effects. On first success a
    /// self-describing system event is logged.
    pub async fn initialize(&self) -> bool {
        {
            let mut guard = self.store.lock().await;
            if guard.is_some() {
                return true;
            }

            let db_path = match self.config.resolve_db_path() {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to resolve audit data directory");
                    return false;
                }
            };

            let mut store = EventStore::new(
                db_path,
                self.config.max_db_size_bytes,
                self.config.max_rotated_files,
            );
            if let Err(e) = store.open().await {
                tracing::error!(error = %e, "Failed to initialize audit store");
                return false;
            }

            *guard = Some(store);
            self.initialized.store(true, Ordering::Release);
        }

        tracing::info!("Audit service initialized");
        self.log(LogParams::new(
            Category::System,
            Activity::Execute,
            "audit service initialized",
        ))
        .await;

        true
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Record one audit event (fire-and-forget).
    ///
    /// When the service is not initialized the event is dropped with a
    /// warning. Storage failures are logged and swallowed; the event is then
    /// not forwarded to SIEM endpoints either, so store and endpoints never
    /// disagree.
    pub async fn log(&self, params: LogParams) {
        if !self.is_initialized() {
            tracing::warn!(message = %params.message, "Audit service not initialized; dropping event");
            return;
        }

        let event = self.build_event(params);

        {
            let mut guard = self.store.lock().await;
            let Some(store) = guard.as_mut() else {
                tracing::warn!("Audit store closed; dropping event");
                return;
            };
            if let Err(e) = store.insert(&event).await {
                tracing::error!(error = %e, "Failed to persist audit event");
                return;
            }
        }

        if self.shipper.has_endpoints() {
            self.shipper.enqueue(&event);
        }
    }

    fn build_event(&self, params: LogParams) -> AuditEvent {
        let mut event = AuditEvent::new(
            params.category,
            params.activity,
            params.message,
            self.config.product_metadata(),
        );
        if let Some(severity) = params.severity {
            event.severity = severity;
        }
        if let Some(status) = params.status {
            event.status = status;
        }
        event.status_detail = params.status_detail;

        let actor = Actor {
            user: params.actor_user,
            process: params.actor_process,
            session: params.actor_session,
        };
        if !actor.is_empty() {
            event.actor = Some(actor);
        }

        let target = Target {
            kind: params.target_kind,
            name: params.target_name,
            data: params.target_data,
        };
        if !target.is_empty() {
            event.target = Some(target);
        }

        event.raw = params.raw;
        event
    }

    /// Audit an IPC call dispatched by the gateway.
    pub async fn log_ipc_call(
        &self,
        method: &str,
        user: Option<&str>,
        session: Option<&str>,
        success: bool,
    ) {
        let mut params = LogParams::new(
            Category::Application,
            Activity::Execute,
            format!("IPC call: {}", method),
        )
        .with_status(if success { Status::Success } else { Status::Failure })
        .with_target("ipc_method", method);
        params.actor_user = user.map(str::to_string);
        params.actor_session = session.map(str::to_string);
        self.log(params).await;
    }

    /// Audit access to a stored credential.
    pub async fn log_credential_access(
        &self,
        credential: &str,
        activity: Activity,
        user: Option<&str>,
    ) {
        let mut params = LogParams::new(
            Category::DataAccess,
            activity,
            format!("Credential {}: {}", activity, credential),
        )
        .with_target("credential", credential);
        params.actor_user = user.map(str::to_string);
        self.log(params).await;
    }

    /// Audit generic access to protected data.
    pub async fn log_data_access(
        &self,
        kind: &str,
        name: &str,
        activity: Activity,
        user: Option<&str>,
    ) {
        let mut params = LogParams::new(
            Category::DataAccess,
            activity,
            format!("Data {}: {} '{}'", activity, kind, name),
        )
        .with_target(kind, name);
        params.actor_user = user.map(str::to_string);
        self.log(params).await;
    }

    /// Filtered read over the store, newest events first.
    ///
    /// Returns an empty vec (never an error) when uninitialized or on
    /// storage failure.
    pub async fn query(&self, filter: &QueryFilter) -> Vec<AuditEvent> {
        let guard = self.store.lock().await;
        let Some(store) = guard.as_ref() else {
            return Vec::new();
        };
        match store.query(filter).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "Audit query failed");
                Vec::new()
            }
        }
    }

    /// Aggregate statistics; zeroed when uninitialized.
    pub async fn stats(&self) -> StoreStats {
        let guard = self.store.lock().await;
        let Some(store) = guard.as_ref() else {
            return StoreStats::default();
        };
        match store.stats(Utc::now().timestamp_millis()).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Audit stats failed");
                StoreStats::default()
            }
        }
    }

    /// Export matching events as JSON, capped at [`EXPORT_ROW_CAP`] rows.
    pub async fn export_json(&self, filter: &QueryFilter) -> String {
        let events = self.query(&clamp_export_filter(filter)).await;
        match export::to_json(&events) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Audit JSON export failed");
                String::new()
            }
        }
    }

    /// Export matching events as CSV, capped at [`EXPORT_ROW_CAP`] rows.
    /// Zero matching rows produce exactly the empty string.
    pub async fn export_csv(&self, filter: &QueryFilter) -> String {
        let events = self.query(&clamp_export_filter(filter)).await;
        export::to_csv(&events)
    }

    /// Register (or replace) a SIEM endpoint; returns its id.
    pub fn register_endpoint(&self, endpoint: SiemEndpoint) -> String {
        self.shipper.register(endpoint)
    }

    /// Remove a SIEM endpoint and stop its worker. No-op on unknown ids.
    pub fn unregister_endpoint(&self, id: &str) {
        self.shipper.unregister(id)
    }

    /// Enable or disable a SIEM endpoint. No-op on unknown ids.
    pub fn set_endpoint_enabled(&self, id: &str, enabled: bool) {
        self.shipper.set_enabled(id, enabled)
    }

    /// Snapshot of all registered endpoint configurations.
    pub fn get_endpoints(&self) -> Vec<SiemEndpoint> {
        self.shipper.endpoints_snapshot()
    }

    /// Delivery statistics for one endpoint.
    pub fn get_shipper_stats(&self, id: &str) -> Option<ShipperStats> {
        self.shipper.stats_for(id)
    }

    /// Delivery statistics for every endpoint.
    pub fn all_shipper_stats(&self) -> HashMap<String, ShipperStats> {
        self.shipper.all_stats()
    }

    /// Flush one endpoint now; `false` on unknown id or failed delivery.
    pub async fn flush_endpoint(&self, id: &str) -> bool {
        self.shipper.flush_endpoint(id).await
    }

    /// Sequentially flush every enabled endpoint.
    pub async fn flush_all(&self) {
        self.shipper.flush_all().await
    }

    /// Paths of rotated store files, newest first. Empty when uninitialized.
    pub async fn rotated_files(&self) -> Vec<std::path::PathBuf> {
        let guard = self.store.lock().await;
        guard.as_ref().map(|s| s.rotated_files()).unwrap_or_default()
    }

    /// Shut the service down: log a final system event, cancel every flush
    /// worker, run one best-effort flush, and close the store. Safe to call
    /// more than once.
    pub async fn close(&self) {
        if !self.is_initialized() {
            return;
        }

        self.log(LogParams::new(
            Category::System,
            Activity::Execute,
            "audit service shutting down",
        ))
        .await;

        self.shipper.shutdown().await;

        let mut guard = self.store.lock().await;
        if let Some(store) = guard.as_mut() {
            store.close().await;
        }
        *guard = None;
        self.initialized.store(false, Ordering::Release);
        tracing::info!("Audit service closed");
    }
}

/// Clamp an export filter's limit to the hard row cap.
fn clamp_export_filter(filter: &QueryFilter) -> QueryFilter {
    let mut clamped = filter.clone();
    clamped.limit = Some(clamped.limit.map_or(EXPORT_ROW_CAP, |l| l.min(EXPORT_ROW_CAP)));
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> AuditConfig {
        AuditConfig {
            data_dir: Some(dir.to_path_buf()),
            ..AuditConfig::default()
        }
    }

    #[test]
    fn export_filter_is_clamped_to_cap() {
        let unset = clamp_export_filter(&QueryFilter::default());
        assert_eq!(unset.limit, Some(EXPORT_ROW_CAP));

        let oversized = clamp_export_filter(&QueryFilter::default().with_limit(50_000));
        assert_eq!(oversized.limit, Some(EXPORT_ROW_CAP));

        let small = clamp_export_filter(&QueryFilter::default().with_limit(25));
        assert_eq!(small.limit, Some(25));
    }

    #[tokio::test]
    async fn initialize_is_idempotent_and_logs_a_system_event() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));

        assert!(service.initialize().await);
        assert!(service.initialize().await);

        let events = service.query(&QueryFilter::default()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, Category::System);
        assert!(events[0].message.contains("initialized"));
    }

    #[tokio::test]
    async fn log_before_initialize_drops_silently() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));

        service
            .log(LogParams::new(
                Category::Application,
                Activity::Execute,
                "too early",
            ))
            .await;

        assert!(service.query(&QueryFilter::default()).await.is_empty());
        assert_eq!(service.stats().await.total_events, 0);
    }

    #[tokio::test]
    async fn log_roundtrips_through_query() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));
        service.initialize().await;

        service
            .log(
                LogParams::new(Category::Authorization, Activity::Deny, "blocked")
                    .with_severity(Severity::High)
                    .with_status(Status::Failure)
                    .with_actor_user("mallory")
                    .with_target("ipc_method", "secrets.read"),
            )
            .await;

        let events = service
            .query(&QueryFilter::default().with_category(Category::Authorization))
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(events[0].status, Status::Failure);
        assert_eq!(events[0].actor.as_ref().unwrap().user.as_deref(), Some("mallory"));
        assert_eq!(
            events[0].target.as_ref().unwrap().kind.as_deref(),
            Some("ipc_method")
        );
        assert_eq!(events[0].metadata.product, "Warden");
    }

    #[tokio::test]
    async fn convenience_wrappers_prefill_fields() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));
        service.initialize().await;

        service
            .log_ipc_call("vault.unlock", Some("alice"), Some("sess-1"), false)
            .await;
        service
            .log_credential_access("prod/api-key", Activity::Read, Some("alice"))
            .await;

        let ipc = service
            .query(&QueryFilter::default().with_target_kind("ipc_method"))
            .await;
        assert_eq!(ipc.len(), 1);
        assert_eq!(ipc[0].status, Status::Failure);
        assert_eq!(ipc[0].category, Category::Application);

        let creds = service
            .query(&QueryFilter::default().with_target_kind("credential"))
            .await;
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].activity, Activity::Read);
        assert_eq!(creds[0].category, Category::DataAccess);
    }

    #[tokio::test]
    async fn export_csv_of_no_matches_is_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));
        service.initialize().await;

        let csv = service
            .export_csv(&QueryFilter::default().with_category(Category::Authorization))
            .await;
        assert_eq!(csv, "");
    }

    #[tokio::test]
    async fn export_json_includes_logged_events() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));
        service.initialize().await;

        service
            .log(LogParams::new(
                Category::Configuration,
                Activity::Update,
                "policy changed",
            ))
            .await;

        let json = service
            .export_json(&QueryFilter::default().with_category(Category::Configuration))
            .await;
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["category_name"], "configuration");
        assert_eq!(parsed[0]["activity_id"], 3);
    }

    #[tokio::test]
    async fn close_is_safe_to_call_twice_and_stops_logging() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));
        service.initialize().await;

        service.close().await;
        service.close().await;

        service
            .log(LogParams::new(
                Category::Application,
                Activity::Execute,
                "after close",
            ))
            .await;
        assert!(service.query(&QueryFilter::default()).await.is_empty());

        // The service can be brought back up, and the earlier events
        // (including the shutdown marker) are still on disk.
        assert!(service.initialize().await);
        let events = service.query(&QueryFilter::default()).await;
        assert!(events.iter().any(|e| e.message.contains("shutting down")));
        assert!(!events.iter().any(|e| e.message.contains("after close")));
    }

    #[tokio::test]
    async fn uninitialized_stats_are_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let service = AuditService::new(test_config(dir.path()));
        let stats = service.stats().await;
        assert_eq!(stats.total_events, 0);
        assert!(stats.by_category.is_empty());
        assert_eq!(stats.db_size_mb, 0.0);
    }
}
