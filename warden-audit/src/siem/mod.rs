//! SIEM endpoint registry and shipping pipeline
//!
//! - [`endpoint`]: endpoint configuration and per-endpoint delivery statistics
//! - [`shipper`]: per-endpoint queues, flush workers, retry/backoff
//! - [`webhook`]: HTTP/webhook JSON POST adapter
//! - [`syslog`]: RFC 5424-flavored syslog adapter (UDP/TCP)
//!
//! Delivery is at-least-once: a failed batch is re-queued ahead of newer
//! events and retried on the next flush. Each endpoint owns its queue, so a
//! failing endpoint cannot starve or double-ship another endpoint's events.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::AuditEvent;

pub mod endpoint;
pub(crate) mod shipper;
pub(crate) mod syslog;
pub(crate) mod webhook;

pub use endpoint::{ShipperStats, SiemEndpoint, SyslogProtocol, Transport};

/// Protocol adapter seam for batch delivery
///
/// Implementations must deliver the whole batch or report failure; partial
/// delivery counts as failure and the batch will be retried.
#[async_trait]
pub(crate) trait BatchTransport: Send + Sync {
    async fn deliver(&self, events: &[AuditEvent]) -> Result<()>;
}
