//! SIEM endpoint configuration and delivery statistics
//!
//! Loaded from the `[[siem.endpoints]]` section of config or registered at
//! runtime through the administration surface.

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

/// A named SIEM shipping target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiemEndpoint {
    /// Unique endpoint key; generated when registered empty
    #[serde(default)]
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Transport configuration (webhook or syslog)
    #[serde(flatten)]
    pub transport: Transport,

    /// Bearer credential sent with webhook requests
    #[serde(default)]
    pub token: Option<String>,

    /// Whether the endpoint's flush worker runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Queue length that triggers an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Periodic flush interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Delivery attempts per flush
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base retry delay in milliseconds, multiplied by the attempt number
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl SiemEndpoint {
    /// Create a webhook endpoint with default batching and retry policy.
    pub fn webhook(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport: Transport::Webhook { url: url.into() },
            token: None,
            enabled: true,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Create a syslog endpoint with default batching and retry policy.
    pub fn syslog(
        id: impl Into<String>,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        protocol: SyslogProtocol,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport: Transport::Syslog {
                host: host.into(),
                port,
                protocol,
            },
            token: None,
            enabled: true,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Generate an id when the caller supplied none.
    pub(crate) fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
    }

    /// Check the transport configuration is usable.
    ///
    /// The same check runs on every delivery attempt; at registration time a
    /// failure is only a warning, because the source of the config may fix
    /// it before the first flush.
    pub fn validate(&self) -> Result<()> {
        match &self.transport {
            Transport::Webhook { url } => {
                if url.is_empty() {
                    return Err(AuditError::Endpoint(format!(
                        "webhook endpoint '{}' requires a url",
                        self.id
                    )));
                }
            }
            Transport::Syslog { host, port, .. } => {
                if host.is_empty() {
                    return Err(AuditError::Endpoint(format!(
                        "syslog endpoint '{}' requires a host",
                        self.id
                    )));
                }
                if *port == 0 {
                    return Err(AuditError::Endpoint(format!(
                        "syslog endpoint '{}' requires a port",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Transport-specific endpoint address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum Transport {
    /// HTTP webhook receiving JSON batches
    Webhook {
        /// Destination URL for POST requests
        url: String,
    },
    /// Syslog collector (RFC 5424-flavored framing)
    Syslog {
        /// Collector host
        host: String,
        /// Collector port
        port: u16,
        /// Datagram or stream transport
        protocol: SyslogProtocol,
    },
}

/// Syslog transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyslogProtocol {
    Udp,
    Tcp,
}

/// Per-endpoint delivery statistics
///
/// Counters accumulate monotonically and reset only on process restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipperStats {
    /// Events delivered successfully
    pub total_shipped: u64,
    /// Flushes that exhausted their retries
    pub total_failed: u64,
    /// Timestamp of the last successful delivery (ms since epoch)
    pub last_ship_time: Option<i64>,
    /// Error message from the most recent failed flush
    pub last_error: Option<String>,
    /// Events currently queued for this endpoint
    pub queue_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    60_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_defaults() {
        let ep = SiemEndpoint::webhook("wh-1", "Splunk HEC", "https://siem.example.com/hook");
        assert!(ep.enabled);
        assert_eq!(ep.batch_size, 100);
        assert_eq!(ep.flush_interval_ms, 60_000);
        assert_eq!(ep.retry_attempts, 3);
        assert_eq!(ep.retry_delay_ms, 1_000);
        assert!(ep.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let ep = SiemEndpoint::webhook("wh-1", "bad", "");
        assert!(matches!(ep.validate(), Err(AuditError::Endpoint(_))));

        let ep = SiemEndpoint::syslog("sl-1", "bad", "", 514, SyslogProtocol::Udp);
        assert!(ep.validate().is_err());

        let ep = SiemEndpoint::syslog("sl-2", "bad", "siem.example.com", 0, SyslogProtocol::Tcp);
        assert!(ep.validate().is_err());
    }

    #[test]
    fn test_ensure_id_generates_when_empty() {
        let mut ep = SiemEndpoint::webhook("", "anon", "https://x.example.com");
        ep.ensure_id();
        assert_eq!(ep.id.len(), 36);

        let mut ep = SiemEndpoint::webhook("keep-me", "named", "https://x.example.com");
        ep.ensure_id();
        assert_eq!(ep.id, "keep-me");
    }

    #[test]
    fn test_serde_tagged_transport() {
        let ep = SiemEndpoint::syslog("sl-1", "corp syslog", "10.0.0.5", 6514, SyslogProtocol::Tcp);
        let json = serde_json::to_string(&ep).unwrap();
        assert!(json.contains("\"transport\":\"syslog\""));
        assert!(json.contains("\"protocol\":\"tcp\""));

        let back: SiemEndpoint = serde_json::from_str(&json).unwrap();
        match back.transport {
            Transport::Syslog { port, protocol, .. } => {
                assert_eq!(port, 6514);
                assert_eq!(protocol, SyslogProtocol::Tcp);
            }
            _ => panic!("expected syslog transport"),
        }
    }
}
