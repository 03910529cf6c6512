//! Multi-region resource discovery with a background refresh loop.
//!
//! Metric queries against cloud monitoring APIs are scoped per resource
//! instance, so a collector plugin has to know which instances exist
//! before it can ask for their numbers. The [`DiscoveryTool`] keeps that
//! knowledge current: it pages through each configured region's
//! list/describe operation, merges the results into an object-id-keyed
//! inventory, and republishes a snapshot through a single-slot mailbox
//! whenever the inventory actually changes.
//!
//! The refresh worker throttles its own API calls with a fresh
//! [`RateLimiter`] per pass, and a pass that fails in any region is
//! discarded whole; the consumer keeps the last known good inventory and
//! the loop retries on the next tick.

pub mod envelope;
pub mod http;
pub mod request;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DiscoveryError;
use crate::limiter::RateLimiter;

use request::{DiscoveryRequest, PageRequest, RequestDriver};

/// Discovered objects, keyed by their configured id field.
pub type Inventory = HashMap<String, Value>;

const DEFAULT_PAGE_SIZE: usize = 20;

/// How long `stop` keeps draining the mailbox to unblock a stuck publish.
const MAILBOX_DRAIN_GRACE: Duration = Duration::from_secs(3);

/// One published inventory snapshot. Consumers own their copy outright;
/// the refresh worker never touches it again.
#[derive(Debug, Clone, Serialize)]
pub struct InventorySnapshot {
    pub generated_at: DateTime<Utc>,
    pub objects: Inventory,
}

/// One region's discovery endpoint: the describe request to page through
/// and the driver that executes it.
pub struct RegionTarget {
    pub region: String,
    pub request: Box<dyn DiscoveryRequest>,
    pub driver: Arc<dyn RequestDriver>,
}

impl RegionTarget {
    pub fn new(
        region: impl Into<String>,
        request: Box<dyn DiscoveryRequest>,
        driver: Arc<dyn RequestDriver>,
    ) -> Self {
        Self {
            region: region.into(),
            request,
            driver,
        }
    }
}

/// Discovery behavior shared by all regions.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Root key in the response envelope holding the page of objects.
    pub root_key: String,
    /// Field inside each object that uniquely identifies it, e.g.
    /// `InstanceId` (or `BucketName` for object storage).
    pub object_id_key: String,
    /// Requested objects per page.
    pub page_size: usize,
    /// Self-throttling quota: API calls per second during a pass.
    pub rate_quota: usize,
    /// Cadence of the background refresh loop.
    pub interval: Duration,
}

impl DiscoveryConfig {
    pub fn new(root_key: impl Into<String>, object_id_key: impl Into<String>) -> Self {
        Self {
            root_key: root_key.into(),
            object_id_key: object_id_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
            rate_quota: 1,
            interval: Duration::from_secs(60),
        }
    }
}

/// Immutable per-tool state shared with the refresh worker.
struct DiscoverySession {
    targets: Vec<RegionTarget>,
    config: DiscoveryConfig,
}

/// Periodically rediscovers resources across regions and publishes
/// changed inventories. Constructed once at plugin init; regions and
/// requests are fixed from then on.
pub struct DiscoveryTool {
    session: Arc<DiscoverySession>,
    mailbox: mpsc::Receiver<InventorySnapshot>,
    publisher: Option<mpsc::Sender<InventorySnapshot>>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl DiscoveryTool {
    pub fn new(
        targets: Vec<RegionTarget>,
        config: DiscoveryConfig,
    ) -> Result<Self, DiscoveryError> {
        if targets.is_empty() {
            return Err(DiscoveryError::Config(
                "no discovery regions configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.region.as_str()) {
                return Err(DiscoveryError::Config(format!(
                    "region {:?} configured more than once",
                    target.region
                )));
            }
        }
        if config.root_key.is_empty() || config.object_id_key.is_empty() {
            return Err(DiscoveryError::Config(
                "root key and object id key must be set".to_string(),
            ));
        }

        let mut config = config;
        if config.rate_quota == 0 {
            // Can be a rounding case upstream.
            config.rate_quota = 1;
        }
        if config.page_size == 0 {
            config.page_size = DEFAULT_PAGE_SIZE;
        }

        let (publisher, mailbox) = mpsc::channel(1);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            session: Arc::new(DiscoverySession { targets, config }),
            mailbox,
            publisher: Some(publisher),
            shutdown,
            worker: None,
        })
    }

    /// Launch the background refresh worker. Calling this on a running
    /// (or already stopped) tool is a no-op.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            warn!("discovery refresh loop is already running");
            return;
        }
        let Some(publisher) = self.publisher.take() else {
            warn!("discovery tool was stopped and cannot be restarted");
            return;
        };

        let session = Arc::clone(&self.session);
        let shutdown = self.shutdown.subscribe();
        self.worker = Some(tokio::spawn(refresh_loop(session, publisher, shutdown)));
    }

    /// Signal shutdown, drain the mailbox for up to a fixed grace period
    /// so a worker stuck in a publish can finish, then wait for the
    /// worker to exit. Does not interrupt an in-flight provider call.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        self.publisher.take();

        let deadline = time::Instant::now() + MAILBOX_DRAIN_GRACE;
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => break,
                received = self.mailbox.recv() => {
                    if received.is_none() {
                        // Worker exited; every publisher is gone.
                        break;
                    }
                }
            }
        }

        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    /// Non-blocking drain of the mailbox, the Gather-side calling
    /// convention. Returns the pending snapshot, if any.
    pub fn try_recv(&mut self) -> Option<InventorySnapshot> {
        self.mailbox.try_recv().ok()
    }

    /// Wait for the next published snapshot. Returns `None` once the
    /// tool has been stopped.
    pub async fn recv(&mut self) -> Option<InventorySnapshot> {
        self.mailbox.recv().await
    }

    /// Run one paginated discovery over a single configured region.
    ///
    /// Hard failures (transport, status, envelope shape) abort the whole
    /// call: no partial inventory is returned.
    pub async fn discover_region(
        &self,
        region: &str,
        limiter: Option<&mut RateLimiter>,
    ) -> Result<Inventory, DiscoveryError> {
        let target = self
            .session
            .targets
            .iter()
            .find(|t| t.region == region)
            .ok_or_else(|| {
                DiscoveryError::Config(format!("region {:?} is not configured for discovery", region))
            })?;

        self.session.discover_target(target, limiter).await
    }

    /// Run one full discovery pass over every configured region,
    /// sequentially, merging results. The first region-level error aborts
    /// the whole pass.
    pub async fn discover_all_regions(
        &self,
        limiter: Option<&mut RateLimiter>,
    ) -> Result<Inventory, DiscoveryError> {
        self.session.discover_all_regions(limiter).await
    }
}

impl DiscoverySession {
    async fn discover_all_regions(
        &self,
        mut limiter: Option<&mut RateLimiter>,
    ) -> Result<Inventory, DiscoveryError> {
        let mut merged = Inventory::new();
        for target in &self.targets {
            let reborrowed = limiter.as_mut().map(|l| &mut **l);
            let regional = self.discover_target(target, reborrowed).await?;
            debug!(
                region = %target.region,
                objects = regional.len(),
                "region discovery complete"
            );
            merged.extend(regional);
        }
        Ok(merged)
    }

    async fn discover_target(
        &self,
        target: &RegionTarget,
        mut limiter: Option<&mut RateLimiter>,
    ) -> Result<Inventory, DiscoveryError> {
        let config = &self.config;
        let mut items: Vec<Value> = Vec::new();
        let mut page_number = 1usize;

        loop {
            if let Some(limiter) = limiter.as_mut() {
                // A stopped limiter yields None and the pass proceeds
                // unthrottled, same as reading from a closed channel.
                let _ = limiter.acquire().await;
            }

            let page_request = PageRequest::build(target.request.as_ref(), config.page_size, page_number);
            let response = target
                .driver
                .execute(&page_request)
                .await
                .map_err(DiscoveryError::Transport)?;
            if !response.status.is_success() {
                return Err(DiscoveryError::Http {
                    status: response.status,
                    operation: page_request.operation,
                });
            }

            let page = envelope::parse_page(&response.body, &config.root_key)?;
            let empty_page = page.items.is_empty();
            items.extend(page.items);

            if items.len() == page.total_count {
                break;
            }
            if empty_page || items.len() > page.total_count {
                // The reported total can never be reached from here; the
                // original pagination contract would loop forever.
                return Err(DiscoveryError::Schema(format!(
                    "pagination never converges: {} item(s) accumulated against a reported total of {}",
                    items.len(),
                    page.total_count
                )));
            }

            page_number = page.page_number + 1;
        }

        let mut inventory = Inventory::with_capacity(items.len());
        for item in items {
            let object_id = item
                .as_object()
                .ok_or_else(|| {
                    DiscoveryError::Schema("discovered item is not a JSON object".to_string())
                })?
                .get(&config.object_id_key)
                .and_then(Value::as_str)
                .map(str::to_owned);

            match object_id {
                Some(id) => {
                    inventory.insert(id, item);
                }
                None => warn!(
                    region = %target.region,
                    id_key = %config.object_id_key,
                    "discovered object has no usable id field, skipping"
                ),
            }
        }

        Ok(inventory)
    }
}

/// Background refresh worker: tick, discover, diff, publish.
///
/// Discovery errors are logged and swallowed: the last known good
/// inventory stays in place and the loop retries on the next tick. A
/// publish blocks on the single-slot mailbox until the consumer (or a
/// concurrent `stop`) drains the previous snapshot.
async fn refresh_loop(
    session: Arc<DiscoverySession>,
    publisher: mpsc::Sender<InventorySnapshot>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = session.config.interval;
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_inventory: Option<Inventory> = None;

    info!(
        regions = session.targets.len(),
        interval = ?interval,
        "discovery refresh loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("discovery refresh loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let pass_id = Uuid::new_v4();
        let mut limiter = RateLimiter::new(session.config.rate_quota, Duration::from_secs(1));
        let discovered = session.discover_all_regions(Some(&mut limiter)).await;
        limiter.stop().await;

        match discovered {
            Err(e) => {
                error!(pass_id = %pass_id, error = %e, "discovery pass failed");
            }
            Ok(objects) => {
                if last_inventory.as_ref() == Some(&objects) {
                    debug!(
                        pass_id = %pass_id,
                        objects = objects.len(),
                        "inventory unchanged, skipping publish"
                    );
                    continue;
                }

                info!(
                    pass_id = %pass_id,
                    objects = objects.len(),
                    "inventory changed, publishing snapshot"
                );
                last_inventory = Some(objects.clone());
                let snapshot = InventorySnapshot {
                    generated_at: Utc::now(),
                    objects,
                };
                if publisher.send(snapshot).await.is_err() {
                    // Mailbox closed underneath us; nothing left to serve.
                    return;
                }
            }
        }
    }
}
