//! Export encoders for query results
//!
//! Serializes audit events to JSON (OCSF wire form) or CSV. No external CSV
//! crate is used — the format is simple enough to generate directly. Both
//! exports are capped at [`EXPORT_ROW_CAP`] rows by the service regardless
//! of the caller's requested limit.

use serde_json::Value;

use crate::error::Result;
use crate::event::{format_timestamp_ms, AuditEvent};

/// Hard cap on exported rows
pub const EXPORT_ROW_CAP: u32 = 10_000;

const CSV_HEADER: &str = "time,category,activity,severity,status,actor_user,target_type,target_name,message";

/// Encode events as a JSON array in OCSF wire form.
pub(crate) fn to_json(events: &[AuditEvent]) -> Result<String> {
    let values: Vec<Value> = events.iter().map(AuditEvent::to_ocsf).collect();
    Ok(serde_json::to_string_pretty(&values)?)
}

/// Encode events as CSV.
///
/// Returns exactly the empty string when there are no rows — no header-only
/// output. Timestamps are ISO-8601; the message field is always quoted with
/// internal quotes doubled.
pub(crate) fn to_csv(events: &[AuditEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(events.len() * 80);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for event in events {
        let actor_user = event
            .actor
            .as_ref()
            .and_then(|a| a.user.as_deref())
            .unwrap_or("");
        let target_kind = event
            .target
            .as_ref()
            .and_then(|t| t.kind.as_deref())
            .unwrap_or("");
        let target_name = event
            .target
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .unwrap_or("");

        out.push_str(&format_timestamp_ms(event.time));
        out.push(',');
        out.push_str(event.category.name());
        out.push(',');
        out.push_str(event.activity.name());
        out.push(',');
        out.push_str(event.severity.name());
        out.push(',');
        out.push_str(event.status.name());
        out.push(',');
        out.push_str(&csv_field(actor_user));
        out.push(',');
        out.push_str(&csv_field(target_kind));
        out.push(',');
        out.push_str(&csv_field(target_name));
        out.push(',');
        out.push_str(&csv_quote(&event.message));
        out.push('\n');
    }

    out
}

/// Quote a field only when it needs quoting.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        csv_quote(value)
    } else {
        value.to_string()
    }
}

/// Always-quoted form with internal quotes doubled.
fn csv_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
