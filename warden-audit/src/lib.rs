//! # warden-audit
//!
//! Audit event store and SIEM log-shipping pipeline for the Warden gateway.
//!
//! Durably records structured OCSF-style security events in an embedded
//! libsql store (WAL mode, size-based rotation with retention) and forwards
//! them to registered SIEM endpoints — HTTP webhooks or RFC 5424-flavored
//! syslog over TCP/UDP — with per-endpoint batching, flush timers, and
//! retry with linear backoff. Producers use a fire-and-forget `log()`
//! contract that never fails and never blocks on network work.
//!
//! ## Example
//!
//! ```rust,no_run
//! use warden_audit::{
//!     Activity, AuditConfig, AuditService, Category, LogParams, QueryFilter, SiemEndpoint,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = AuditService::new(AuditConfig::default());
//!     service.initialize().await;
//!
//!     service.register_endpoint(SiemEndpoint::webhook(
//!         "splunk",
//!         "Splunk HEC",
//!         "https://siem.example.com/services/collector",
//!     ));
//!
//!     service
//!         .log(
//!             LogParams::new(Category::Authentication, Activity::Authenticate, "login ok")
//!                 .with_actor_user("alice"),
//!         )
//!         .await;
//!
//!     let recent = service.query(&QueryFilter::default().with_limit(100)).await;
//!     println!("{} events", recent.len());
//!
//!     service.close().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod observability;
pub mod query;
pub mod service;
pub mod siem;

mod store;

// --- primary re-exports ---

pub use config::AuditConfig;
pub use error::{AuditError, Result};
pub use event::{
    Activity, Actor, AuditEvent, Category, ProductMetadata, Severity, Status, Target,
};
pub use export::EXPORT_ROW_CAP;
pub use observability::init_tracing;
pub use query::{QueryFilter, StoreStats};
pub use service::{AuditService, LogParams};
pub use siem::{ShipperStats, SiemEndpoint, SyslogProtocol, Transport};
