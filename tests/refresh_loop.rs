//! Lifecycle tests for the background refresh loop: change-triggered
//! publishing, backpressure through the single-slot mailbox, and
//! bounded-latency shutdown.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Value};

use cloudscout::{
    DiscoveryConfig, DiscoveryTool, DriverError, DriverResponse, GenericDiscoveryRequest,
    PageRequest, RegionTarget, RequestDriver,
};

/// Run with RUST_LOG=cloudscout=debug to watch the loop under test.
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Serves scripted responses in order; once the script runs dry every
/// further pass fails, which keeps the loop alive without publishing.
struct ScriptedDriver {
    responses: Mutex<VecDeque<Result<DriverResponse, String>>>,
    calls: Mutex<usize>,
}

impl ScriptedDriver {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    fn push_pass(&self, instance_ids: &[&str]) {
        let items: Vec<Value> = instance_ids
            .iter()
            .map(|id| json!({"InstanceId": id, "Status": "Running"}))
            .collect();
        let body = json!({
            "Instances": {"Instance": items},
            "TotalCount": instance_ids.len(),
            "PageSize": instance_ids.len(),
            "PageNumber": 1,
        });
        self.responses.lock().unwrap().push_back(Ok(DriverResponse {
            status: StatusCode::OK,
            body: body.to_string().into_bytes(),
        }));
    }

    fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RequestDriver for ScriptedDriver {
    async fn execute(&self, _request: &PageRequest) -> std::result::Result<DriverResponse, DriverError> {
        *self.calls.lock().unwrap() += 1;
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(message.into()),
            None => Err("script exhausted".into()),
        }
    }
}

fn tool_with(driver: Arc<ScriptedDriver>, interval: Duration) -> Result<DiscoveryTool> {
    let request = GenericDiscoveryRequest {
        method: "GET".to_string(),
        scheme: "https".to_string(),
        domain: "ecs.cn-hongkong.example.com".to_string(),
        version: "2014-05-26".to_string(),
        operation: "DescribeInstances".to_string(),
        query_params: HashMap::new(),
    };
    let targets = vec![RegionTarget::new(
        "cn-hongkong",
        Box::new(request),
        driver as Arc<dyn RequestDriver>,
    )];

    let mut config = DiscoveryConfig::new("Instances", "InstanceId");
    config.interval = interval;
    config.rate_quota = 100;

    DiscoveryTool::new(targets, config).context("building discovery tool")
}

#[tokio::test(start_paused = true)]
async fn identical_passes_publish_once() -> Result<()> {
    init_logs();
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_pass(&["i-1"]);
    driver.push_pass(&["i-1"]); // unchanged, must not publish
    driver.push_pass(&["i-1", "i-2"]);

    let mut tool = tool_with(Arc::clone(&driver), Duration::from_millis(100))?;
    tool.start();

    let first = tool.recv().await.context("first snapshot")?;
    assert_eq!(first.objects.len(), 1);
    assert!(first.objects.contains_key("i-1"));

    // The second snapshot comes from the third pass; the identical second
    // pass was skipped.
    let second = tool.recv().await.context("second snapshot")?;
    assert_eq!(second.objects.len(), 2);
    assert!(second.objects.contains_key("i-2"));

    assert!(tool.try_recv().is_none());
    tool.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_pass_keeps_last_inventory() -> Result<()> {
    init_logs();
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_pass(&["i-1"]);
    driver.push_failure("connection reset by peer");
    // Rediscovering the same set after the failure must not republish:
    // the failed pass left the last inventory in place.
    driver.push_pass(&["i-1"]);
    driver.push_pass(&["i-1", "i-2"]);

    let mut tool = tool_with(Arc::clone(&driver), Duration::from_millis(100))?;
    tool.start();

    let first = tool.recv().await.context("first snapshot")?;
    assert_eq!(first.objects.len(), 1);

    let second = tool.recv().await.context("second snapshot")?;
    assert_eq!(second.objects.len(), 2);

    tool.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn full_mailbox_stalls_the_next_pass() -> Result<()> {
    init_logs();
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_pass(&["i-1"]);
    driver.push_pass(&["i-2"]);
    driver.push_pass(&["i-3"]);
    driver.push_pass(&["i-4"]);

    let mut tool = tool_with(Arc::clone(&driver), Duration::from_millis(100))?;
    tool.start();

    // Pass 1 publishes, pass 2 discovers and then blocks publishing into
    // the full mailbox. Pass 3 must not start while the publish is stuck.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(driver.calls(), 2, "refresh loop ran ahead of the consumer");

    let first = tool.recv().await.context("first snapshot")?;
    assert!(first.objects.contains_key("i-1"));

    // Draining the slot unblocked the stuck publish.
    let second = tool.recv().await.context("second snapshot")?;
    assert!(second.objects.contains_key("i-2"));

    // With the mailbox moving again the loop resumes discovering.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(driver.calls() >= 3);

    tool.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_unblocks_a_stuck_publish() -> Result<()> {
    init_logs();
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_pass(&["i-1"]);
    driver.push_pass(&["i-2"]);

    let mut tool = tool_with(Arc::clone(&driver), Duration::from_millis(100))?;
    tool.start();

    // Let pass 1 publish and pass 2 wedge itself on the full mailbox.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(driver.calls(), 2);

    // Never drained the mailbox; stop has to do it for us.
    tool.stop().await;
    assert!(tool.try_recv().is_none());
    assert_eq!(driver.calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_without_start_returns_promptly() -> Result<()> {
    init_logs();
    let driver = Arc::new(ScriptedDriver::new());
    let mut tool = tool_with(driver, Duration::from_millis(100))?;

    tool.stop().await;
    assert!(tool.try_recv().is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_twice_is_a_noop() -> Result<()> {
    init_logs();
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_pass(&["i-1"]);

    let mut tool = tool_with(Arc::clone(&driver), Duration::from_millis(100))?;
    tool.start();
    tool.start();

    let first = tool.recv().await.context("first snapshot")?;
    assert_eq!(first.objects.len(), 1);
    // A single worker made a single pass.
    assert_eq!(driver.calls(), 1);

    tool.stop().await;
    Ok(())
}
