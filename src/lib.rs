//! Polling and discovery core for cloud-monitoring collector plugins.
//!
//! Cloud monitoring APIs meter metric queries per resource instance, so a
//! collector has to know which instances exist across every region it
//! watches, and it has to find out without blowing through the
//! provider's request quota. This crate packages the two primitives every
//! such plugin otherwise rebuilds:
//!
//! - [`RateLimiter`] — a token-emission gate: at most `quota` tokens per
//!   `interval`, handed off on demand, so blocking on a token right
//!   before an outbound call caps both rate and in-flight concurrency.
//! - [`DiscoveryTool`] — a multi-region, paginated, diff-aware resource
//!   inventory with a background refresh loop. Snapshots are published
//!   through a single-slot mailbox only when the inventory changes; a
//!   slow consumer stalls the loop instead of dropping data.
//!
//! The [`gather`] module carries the consuming side of the pattern:
//! per-cycle throttled fan-out and the lock discipline for the cache
//! that metric workers read while snapshots are drained into it.
//!
//! Provider specifics stay outside: callers supply the describe request
//! metadata per region ([`DiscoveryRequest`]) and something able to
//! execute it ([`RequestDriver`]; [`HttpDriver`] covers unauthenticated
//! RPC-style APIs, and signed transports wrap it).
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cloudscout::{
//!     DiscoveryConfig, DiscoveryTool, GenericDiscoveryRequest, HttpDriver, RegionTarget,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cloudscout::DiscoveryError> {
//!     let driver = Arc::new(HttpDriver::new());
//!     let request = GenericDiscoveryRequest {
//!         method: "GET".to_string(),
//!         scheme: "https".to_string(),
//!         domain: "ecs.eu-central-1.example-cloud.com".to_string(),
//!         version: "2014-05-26".to_string(),
//!         operation: "DescribeInstances".to_string(),
//!         query_params: HashMap::new(),
//!     };
//!     let targets = vec![RegionTarget::new("eu-central-1", Box::new(request), driver)];
//!
//!     let mut config = DiscoveryConfig::new("Instances", "InstanceId");
//!     config.interval = Duration::from_secs(300);
//!     config.rate_quota = 5;
//!
//!     let mut tool = DiscoveryTool::new(targets, config)?;
//!     tool.start();
//!     if let Some(snapshot) = tool.recv().await {
//!         println!("discovered {} object(s)", snapshot.objects.len());
//!     }
//!     tool.stop().await;
//!     Ok(())
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod gather;
pub mod limiter;

pub use discovery::http::HttpDriver;
pub use discovery::request::{
    DiscoveryRequest, DriverResponse, GenericDiscoveryRequest, PageRequest, RequestDriver,
};
pub use discovery::{DiscoveryConfig, DiscoveryTool, Inventory, InventorySnapshot, RegionTarget};
pub use error::{DiscoveryError, DriverError};
pub use gather::{throttled_fan_out, InventoryCache};
pub use limiter::RateLimiter;
