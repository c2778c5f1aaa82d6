//! Shipping pipeline: per-endpoint queues, flush workers, retry/backoff
//!
//! Every registered endpoint owns a bounded queue fed by a fan-out step at
//! log time, plus delivery statistics and (while enabled) one worker task.
//! The worker flushes on a periodic interval, immediately when the queue
//! reaches the endpoint's batch size, and stops via its cancellation token
//! when the endpoint is disabled, replaced, unregistered, or the service
//! shuts down.
//!
//! Queue mutexes are `std::sync` and are never held across an `.await`; all
//! network work happens after the locks are dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::endpoint::{ShipperStats, SiemEndpoint, Transport};
use super::syslog::SyslogTransport;
use super::webhook::WebhookTransport;
use super::BatchTransport;
use crate::error::{AuditError, Result};
use crate::event::AuditEvent;

/// Hard cap on each endpoint's outbound queue
pub(crate) const QUEUE_CAP: usize = 10_000;

/// Shared context handed to flush workers
pub(crate) struct ShipperContext {
    pub http: reqwest::Client,
    pub product: String,
    pub product_version: String,
    /// Hostname field for syslog frames
    pub app_host: String,
}

/// Per-endpoint state: config, queue, stats, and worker handle
pub(crate) struct EndpointEntry {
    config: Mutex<SiemEndpoint>,
    queue: Mutex<VecDeque<AuditEvent>>,
    stats: Mutex<ShipperStats>,
    notify: Notify,
    worker: Mutex<Option<CancellationToken>>,
    /// Serializes concurrent flushes (timer, batch trigger, manual, shutdown)
    flush_lock: tokio::sync::Mutex<()>,
}

impl EndpointEntry {
    fn new(endpoint: SiemEndpoint) -> Self {
        Self {
            config: Mutex::new(endpoint),
            queue: Mutex::new(VecDeque::new()),
            stats: Mutex::new(ShipperStats::default()),
            notify: Notify::new(),
            worker: Mutex::new(None),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn cancel_worker(&self) {
        if let Some(token) = self.worker.lock().unwrap().take() {
            token.cancel();
        }
    }
}

/// Outbound shipping pipeline over all registered endpoints
pub(crate) struct Shipper {
    ctx: Arc<ShipperContext>,
    endpoints: DashMap<String, Arc<EndpointEntry>>,
}

impl Shipper {
    pub(crate) fn new(ctx: ShipperContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            endpoints: DashMap::new(),
        }
    }

    /// Register (or replace) an endpoint. Stats reset to zero; the worker
    /// starts immediately when the endpoint is enabled. Returns the id.
    pub(crate) fn register(&self, mut endpoint: SiemEndpoint) -> String {
        endpoint.ensure_id();
        if let Err(e) = endpoint.validate() {
            tracing::warn!(endpoint = %endpoint.id, error = %e, "Registering endpoint with unusable transport config");
        }

        let id = endpoint.id.clone();
        let enabled = endpoint.enabled;
        let entry = Arc::new(EndpointEntry::new(endpoint));

        if let Some(previous) = self.endpoints.insert(id.clone(), entry.clone()) {
            previous.cancel_worker();
            tracing::info!(endpoint = %id, "Replaced existing SIEM endpoint registration");
        } else {
            tracing::info!(endpoint = %id, "Registered SIEM endpoint");
        }

        if enabled {
            self.start_worker(&entry);
        }
        id
    }

    /// Remove an endpoint and stop its worker. No-op on unknown ids.
    pub(crate) fn unregister(&self, id: &str) {
        if let Some((_, entry)) = self.endpoints.remove(id) {
            entry.cancel_worker();
            tracing::info!(endpoint = %id, "Unregistered SIEM endpoint");
        }
    }

    /// Enable or disable an endpoint's worker. No-op on unknown ids.
    pub(crate) fn set_enabled(&self, id: &str, enabled: bool) {
        let entry = match self.endpoints.get(id) {
            Some(entry) => entry.value().clone(),
            None => return,
        };

        entry.config.lock().unwrap().enabled = enabled;
        if enabled {
            self.start_worker(&entry);
        } else {
            entry.cancel_worker();
        }
        tracing::debug!(endpoint = %id, enabled, "SIEM endpoint toggled");
    }

    pub(crate) fn has_endpoints(&self) -> bool {
        !self.endpoints.is_empty()
    }

    pub(crate) fn endpoints_snapshot(&self) -> Vec<SiemEndpoint> {
        self.endpoints
            .iter()
            .map(|entry| entry.value().config.lock().unwrap().clone())
            .collect()
    }

    pub(crate) fn stats_for(&self, id: &str) -> Option<ShipperStats> {
        let entry = self.endpoints.get(id)?;
        let mut stats = entry.stats.lock().unwrap().clone();
        stats.queue_size = entry.queue.lock().unwrap().len();
        Some(stats)
    }

    pub(crate) fn all_stats(&self) -> HashMap<String, ShipperStats> {
        self.endpoints
            .iter()
            .map(|entry| {
                let mut stats = entry.value().stats.lock().unwrap().clone();
                stats.queue_size = entry.value().queue.lock().unwrap().len();
                (entry.key().clone(), stats)
            })
            .collect()
    }

    /// Fan an event out to every registered endpoint's queue, triggering an
    /// immediate flush wherever the batch size is reached.
    pub(crate) fn enqueue(&self, event: &AuditEvent) {
        for item in self.endpoints.iter() {
            let entry = item.value();
            let queue_len = {
                let mut queue = entry.queue.lock().unwrap();
                if queue.len() >= QUEUE_CAP {
                    queue.pop_front();
                    tracing::warn!(endpoint = %item.key(), "Outbound queue full; dropped oldest event");
                }
                queue.push_back(event.clone());
                queue.len()
            };
            entry.stats.lock().unwrap().queue_size = queue_len;

            let (enabled, batch_size) = {
                let config = entry.config.lock().unwrap();
                (config.enabled, config.batch_size)
            };
            if enabled && queue_len >= batch_size {
                entry.notify.notify_one();
            }
        }
    }

    /// Flush one endpoint now. Returns `false` on unknown id or failed
    /// delivery.
    pub(crate) async fn flush_endpoint(&self, id: &str) -> bool {
        let entry = match self.endpoints.get(id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        flush_entry(&self.ctx, &entry).await
    }

    /// Sequentially flush every enabled endpoint.
    pub(crate) async fn flush_all(&self) {
        let entries: Vec<Arc<EndpointEntry>> = self
            .endpoints
            .iter()
            .filter(|e| e.value().config.lock().unwrap().enabled)
            .map(|e| e.value().clone())
            .collect();
        for entry in entries {
            flush_entry(&self.ctx, &entry).await;
        }
    }

    /// Cancel every worker, then run one best-effort final flush.
    pub(crate) async fn shutdown(&self) {
        for entry in self.endpoints.iter() {
            entry.value().cancel_worker();
        }
        self.flush_all().await;
    }

    fn start_worker(&self, entry: &Arc<EndpointEntry>) {
        // Replacing the token first guarantees at most one worker per
        // endpoint even when enable is called repeatedly.
        entry.cancel_worker();
        let token = CancellationToken::new();
        *entry.worker.lock().unwrap() = Some(token.clone());

        let ctx = self.ctx.clone();
        let entry = entry.clone();
        tokio::spawn(async move {
            worker_loop(ctx, entry, token).await;
        });
    }
}

/// Per-endpoint flush loop: periodic tick, batch-size trigger, cancellation.
async fn worker_loop(ctx: Arc<ShipperContext>, entry: Arc<EndpointEntry>, token: CancellationToken) {
    let interval_ms = entry.config.lock().unwrap().flush_interval_ms.max(1);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
            _ = entry.notify.notified() => {}
        }
        flush_entry(&ctx, &entry).await;
    }
}

/// Snapshot-drain the endpoint's queue and attempt delivery with its retry
/// policy, updating stats and re-queueing the batch on failure.
pub(crate) async fn flush_entry(ctx: &ShipperContext, entry: &EndpointEntry) -> bool {
    let _guard = entry.flush_lock.lock().await;

    let config = entry.config.lock().unwrap().clone();
    let batch: Vec<AuditEvent> = entry.queue.lock().unwrap().drain(..).collect();
    if batch.is_empty() {
        return true;
    }

    tracing::debug!(endpoint = %config.id, batch_len = batch.len(), "Flushing audit batch");

    let transport = make_transport(ctx, &config);
    match deliver_with_retry(transport.as_ref(), &config, &batch).await {
        Ok(()) => {
            let queue_len = entry.queue.lock().unwrap().len();
            let mut stats = entry.stats.lock().unwrap();
            stats.total_shipped += batch.len() as u64;
            stats.last_ship_time = Some(Utc::now().timestamp_millis());
            stats.last_error = None;
            stats.queue_size = queue_len;
            true
        }
        Err(e) => {
            tracing::warn!(endpoint = %config.id, error = %e, "Audit batch delivery failed; re-queueing");
            let queue_len = {
                let mut queue = entry.queue.lock().unwrap();
                for event in batch.into_iter().rev() {
                    queue.push_front(event);
                }
                if queue.len() > QUEUE_CAP {
                    let dropped = queue.len() - QUEUE_CAP;
                    queue.truncate(QUEUE_CAP);
                    tracing::warn!(endpoint = %config.id, dropped, "Outbound queue over capacity; dropped newest events");
                }
                queue.len()
            };
            let mut stats = entry.stats.lock().unwrap();
            stats.total_failed += 1;
            stats.last_error = Some(e.to_string());
            stats.queue_size = queue_len;
            false
        }
    }
}

/// Attempt delivery up to the endpoint's retry count with linear backoff:
/// after failed attempt k (0-based) the worker sleeps `retry_delay * (k+1)`.
pub(crate) async fn deliver_with_retry(
    transport: &dyn BatchTransport,
    config: &SiemEndpoint,
    batch: &[AuditEvent],
) -> Result<()> {
    let attempts = config.retry_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match transport.deliver(batch).await {
            Ok(()) => {
                if attempt > 0 {
                    tracing::debug!(endpoint = %config.id, attempt = attempt + 1, "Delivery succeeded after retry");
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(endpoint = %config.id, attempt = attempt + 1, error = %e, "Delivery attempt failed");
                last_err = Some(e);
                if attempt + 1 < attempts {
                    let delay = Duration::from_millis(config.retry_delay_ms * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| AuditError::Delivery("delivery failed".into())))
}

fn make_transport(ctx: &ShipperContext, config: &SiemEndpoint) -> Box<dyn BatchTransport> {
    match &config.transport {
        Transport::Webhook { url } => Box::new(WebhookTransport::new(
            ctx.http.clone(),
            url.clone(),
            config.token.clone(),
            ctx.product.clone(),
            ctx.product_version.clone(),
        )),
        Transport::Syslog {
            host,
            port,
            protocol,
        } => Box::new(SyslogTransport::new(
            host.clone(),
            *port,
            *protocol,
            ctx.app_host.clone(),
        )),
    }
}
