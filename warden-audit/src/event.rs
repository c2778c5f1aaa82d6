//! OCSF audit event types
//!
//! Core types for the audit trail: the [`AuditEvent`] record and the closed
//! category/activity/severity/status vocabularies. Every enum carries both a
//! stable numeric code and a display name, so the SIEM wire formats stay
//! stable regardless of variant ordering in source.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// OCSF class identifier for API activity events — the only class this
/// subsystem emits.
pub const CLASS_UID: u32 = 6003;

/// OCSF class name matching [`CLASS_UID`].
pub const CLASS_NAME: &str = "API Activity";

/// OCSF schema version stamped into every event's metadata.
pub const SCHEMA_VERSION: &str = "1.1.0";

/// A single audit trail event
///
/// Events are immutable once persisted: the store only inserts, reads, and
/// deletes rotated files wholesale. Category, activity, severity, status,
/// message, and metadata are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (wall clock, milliseconds since epoch)
    pub time: i64,
    /// Category of the event
    pub category: Category,
    /// Operation the event describes
    pub activity: Activity,
    /// Severity level (0–5)
    pub severity: Severity,
    /// Outcome of the operation
    pub status: Status,
    /// Free-text elaboration of the status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    /// Human-readable description
    pub message: String,
    /// Who performed the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    /// What the operation acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    /// Fixed product metadata injected by the service
    pub metadata: ProductMetadata,
    /// Raw payload kept for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl AuditEvent {
    /// Create a new event with the given category, activity, and message.
    ///
    /// Severity defaults to [`Severity::Informational`] and status to
    /// [`Status::Success`]; timestamp is the current wall clock.
    pub fn new(
        category: Category,
        activity: Activity,
        message: impl Into<String>,
        metadata: ProductMetadata,
    ) -> Self {
        Self {
            time: Utc::now().timestamp_millis(),
            category,
            activity,
            severity: Severity::Informational,
            status: Status::Success,
            status_detail: None,
            message: message.into(),
            actor: None,
            target: None,
            metadata,
            raw: None,
        }
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the status and optional detail
    pub fn with_status(mut self, status: Status, detail: Option<String>) -> Self {
        self.status = status;
        self.status_detail = detail;
        self
    }

    /// Set the actor
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Set the target
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach a raw debugging payload
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Render the event in its OCSF wire form.
    ///
    /// This is the shape shipped to SIEM endpoints and produced by the JSON
    /// export: every enum appears as both its numeric code and its name.
    pub fn to_ocsf(&self) -> Value {
        let mut obj = json!({
            "time": self.time,
            "class_uid": CLASS_UID,
            "class_name": CLASS_NAME,
            "category_uid": self.category.uid(),
            "category_name": self.category.name(),
            "activity_id": self.activity.id(),
            "activity_name": self.activity.name(),
            "severity_id": self.severity.id(),
            "severity": self.severity.name(),
            "status_id": self.status.id(),
            "status": self.status.name(),
            "message": self.message,
            "metadata": self.metadata,
        });
        if let Some(map) = obj.as_object_mut() {
            if let Some(ref detail) = self.status_detail {
                map.insert("status_detail".into(), json!(detail));
            }
            if let Some(ref actor) = self.actor {
                map.insert("actor".into(), json!(actor));
            }
            if let Some(ref target) = self.target {
                map.insert("target".into(), json!(target));
            }
            if let Some(ref raw) = self.raw {
                map.insert("raw_data".into(), raw.clone());
            }
        }
        obj
    }
}

/// Format a millisecond timestamp as ISO-8601 (UTC, millisecond precision).
pub(crate) fn format_timestamp_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Application-level operations (IPC calls, proxy activity)
    Application,
    /// Authentication attempts and session events
    Authentication,
    /// Authorization / permission decisions
    Authorization,
    /// Configuration changes
    Configuration,
    /// Reads and writes of protected data
    DataAccess,
    /// Subsystem lifecycle and internal events
    System,
}

impl Category {
    /// Stable numeric category UID
    pub fn uid(&self) -> u32 {
        match self {
            Self::Application => 1,
            Self::Authentication => 2,
            Self::Authorization => 3,
            Self::Configuration => 4,
            Self::DataAccess => 5,
            Self::System => 6,
        }
    }

    /// Category name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Configuration => "configuration",
            Self::DataAccess => "data_access",
            Self::System => "system",
        }
    }

    /// Look up a category by its numeric UID
    pub fn from_uid(uid: u32) -> Option<Self> {
        match uid {
            1 => Some(Self::Application),
            2 => Some(Self::Authentication),
            3 => Some(Self::Authorization),
            4 => Some(Self::Configuration),
            5 => Some(Self::DataAccess),
            6 => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Event activities (the operation being audited)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Create,
    Read,
    Update,
    Delete,
    Execute,
    Deny,
    Error,
    Authenticate,
    Authorize,
}

impl Activity {
    /// Stable numeric activity id
    pub fn id(&self) -> u32 {
        match self {
            Self::Create => 1,
            Self::Read => 2,
            Self::Update => 3,
            Self::Delete => 4,
            Self::Execute => 5,
            Self::Deny => 6,
            Self::Error => 7,
            Self::Authenticate => 8,
            Self::Authorize => 9,
        }
    }

    /// Activity name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Execute => "execute",
            Self::Deny => "deny",
            Self::Error => "error",
            Self::Authenticate => "authenticate",
            Self::Authorize => "authorize",
        }
    }

    /// Uppercase label, used as the syslog MSGID
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Execute => "EXECUTE",
            Self::Deny => "DENY",
            Self::Error => "ERROR",
            Self::Authenticate => "AUTHENTICATE",
            Self::Authorize => "AUTHORIZE",
        }
    }

    /// Look up an activity by its numeric id
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Create),
            2 => Some(Self::Read),
            3 => Some(Self::Update),
            4 => Some(Self::Delete),
            5 => Some(Self::Execute),
            6 => Some(Self::Deny),
            7 => Some(Self::Error),
            8 => Some(Self::Authenticate),
            9 => Some(Self::Authorize),
            _ => None,
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Event severity levels (OCSF 0–5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Unknown,
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable numeric severity id
    pub fn id(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Informational => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }

    /// Severity name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Informational => "informational",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Map to the RFC 5424 syslog severity value.
    ///
    /// Unknown and informational both map to info(6); low→notice(5),
    /// medium→warning(4), high→err(3), critical→crit(2).
    pub fn syslog_severity(&self) -> u8 {
        match self {
            Self::Unknown | Self::Informational => 6,
            Self::Low => 5,
            Self::Medium => 4,
            Self::High => 3,
            Self::Critical => 2,
        }
    }

    /// Look up a severity by its numeric id
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Unknown),
            1 => Some(Self::Informational),
            2 => Some(Self::Low),
            3 => Some(Self::Medium),
            4 => Some(Self::High),
            5 => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unknown,
    Success,
    Failure,
    Partial,
}

impl Status {
    /// Stable numeric status id
    pub fn id(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Success => 1,
            Self::Failure => 2,
            Self::Partial => 3,
        }
    }

    /// Status name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }

    /// Look up a status by its numeric id
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Unknown),
            1 => Some(Self::Success),
            2 => Some(Self::Failure),
            3 => Some(Self::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Who performed the audited operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    /// User identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Process name or id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    /// Session identifier for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Actor {
    /// True if no identity field is set
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.process.is_none() && self.session.is_none()
    }
}

/// What the audited operation acted on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Target type (e.g. "credential", "ipc_method")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Target name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Structured target payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Target {
    /// True if no descriptor field is set
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.name.is_none() && self.data.is_none()
    }
}

/// Fixed product metadata injected into every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    /// OCSF schema version
    pub version: String,
    /// Product name
    pub product: String,
    /// Product version
    pub product_version: String,
}

impl Default for ProductMetadata {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            product: "Warden".to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
