//! HTTP/webhook delivery adapter
//!
//! Ships a batch as a single JSON POST: `{events, metadata}` where metadata
//! carries the product identity, ship time, and event count. Any non-2xx
//! response is a delivery failure carrying the HTTP status text.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::BatchTransport;
use crate::error::{AuditError, Result};
use crate::event::AuditEvent;

/// Webhook transport for a single endpoint
pub(crate) struct WebhookTransport {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    product: String,
    product_version: String,
}

impl WebhookTransport {
    pub(crate) fn new(
        client: reqwest::Client,
        url: String,
        token: Option<String>,
        product: String,
        product_version: String,
    ) -> Self {
        Self {
            client,
            url,
            token,
            product,
            product_version,
        }
    }
}

/// JSON envelope posted to the webhook
#[derive(Debug, Serialize)]
pub(crate) struct ShipEnvelope {
    pub events: Vec<Value>,
    pub metadata: ShipMetadata,
}

/// Batch metadata inside the envelope (camelCase on the wire)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShipMetadata {
    pub product: String,
    pub version: String,
    pub ship_time: i64,
    pub event_count: usize,
}

impl ShipEnvelope {
    pub(crate) fn new(events: &[AuditEvent], product: &str, version: &str) -> Self {
        Self {
            events: events.iter().map(AuditEvent::to_ocsf).collect(),
            metadata: ShipMetadata {
                product: product.to_string(),
                version: version.to_string(),
                ship_time: Utc::now().timestamp_millis(),
                event_count: events.len(),
            },
        }
    }
}

#[async_trait]
impl BatchTransport for WebhookTransport {
    async fn deliver(&self, events: &[AuditEvent]) -> Result<()> {
        if self.url.is_empty() {
            return Err(AuditError::Endpoint("webhook endpoint requires a url".into()));
        }

        let envelope = ShipEnvelope::new(events, &self.product, &self.product_version);

        let mut request = self.client.post(&self.url).json(&envelope);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AuditError::Delivery(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
