//! Custom backend example demonstrating how to implement a new connector.
//!
//! This example shows how to:
//! - Implement the Connector trait for a custom backend
//! - Build one connector per job with a ConnectorFactory
//! - Require a service key and react to a rejected one
//!
//! Run with: cargo run --example custom_backend

use async_trait::async_trait;
use scanpoll::core::{EngineVerdict, Infection, ReportSummary};
use scanpoll::prelude::*;
use secrecy::{ExposeSecret, SecretString};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// An in-memory stand-in for a remote scanning service.
///
/// Reports become ready after a few polls and every fifth call is
/// throttled, like a free-tier API key would be.
#[derive(Debug)]
struct SimulatedService {
    api_key: String,
    pending: Mutex<HashMap<String, u32>>,
    calls: AtomicU64,
}

impl SimulatedService {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            pending: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    fn throttled(&self) -> bool {
        (self.calls.fetch_add(1, Ordering::Relaxed) + 1) % 5 == 0
    }
}

/// A connector bound to one job.
#[derive(Debug)]
struct SimulatedConnector {
    service: Arc<SimulatedService>,
    authorized: bool,
}

#[async_trait]
impl Connector for SimulatedConnector {
    fn name(&self) -> &str {
        "simulated"
    }

    fn config(&self, resource_type: ResourceType) -> ConnectorConfig {
        simulated_config(resource_type)
    }

    async fn submit(
        &self,
        resource: &Resource,
        _reuse_last_report: bool,
        progress: &UploadProgress,
    ) -> Result<String, ConnectorError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !self.authorized {
            return Err(ConnectorError::invalid_service_key(self.name()));
        }
        if self.service.throttled() {
            return Err(ConnectorError::rate_limited(self.name()));
        }

        if resource.resource_type == ResourceType::File {
            for sent in [32_768, 65_536] {
                progress.report(sent, 65_536);
            }
        }

        let scan_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(resource = %resource, scan_id = %scan_id, "Simulated submission");
        self.service
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(scan_id.clone(), 2);
        Ok(scan_id)
    }

    async fn retrieve_report(
        &self,
        resource: &Resource,
        scan_id: &str,
    ) -> Result<PollReply, ConnectorError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if self.service.throttled() {
            return Err(ConnectorError::rate_limited(self.name()));
        }

        let mut pending = self
            .service
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(polls_left) = pending.get_mut(scan_id) else {
            return Err(ConnectorError::malformed(self.name(), "unknown scan id"));
        };
        if *polls_left > 0 {
            *polls_left -= 1;
            return Ok(PollReply::NotReady);
        }
        pending.remove(scan_id);

        let summary = ReportSummary::new()
            .with_verdict(EngineVerdict::new("engine-a", Infection::No))
            .with_verdict(EngineVerdict::new("engine-b", Infection::No).with_version("2.1"));
        let report = match resource.resource_type {
            ResourceType::File => Report::File(FileReport {
                summary,
                ..FileReport::default()
            }),
            ResourceType::Url => Report::Url(UrlReport {
                summary,
                url: resource.name.clone(),
                ..UrlReport::default()
            }),
        };
        Ok(PollReply::Ready(report))
    }
}

fn simulated_config(resource_type: ResourceType) -> ConnectorConfig {
    let default_level = match resource_type {
        ResourceType::File => 2,
        ResourceType::Url => 1,
    };
    ConnectorConfig::from_secs(&[1, 2, 3, 5], default_level).with_service_key_required(true)
}

/// Hands every job its own connector, checked against the service's key.
#[derive(Debug)]
struct SimulatedFactory {
    service: Arc<SimulatedService>,
}

impl ConnectorFactory for SimulatedFactory {
    fn name(&self) -> &str {
        "simulated"
    }

    fn create(&self, service_key: Option<&SecretString>) -> ArcConnector {
        let authorized =
            service_key.is_some_and(|key| key.expose_secret() == self.service.api_key);
        Arc::new(SimulatedConnector {
            service: Arc::clone(&self.service),
            authorized,
        })
    }

    fn config(&self, resource_type: ResourceType) -> ConnectorConfig {
        simulated_config(resource_type)
    }
}

/// Prints notifications and signals the end of the job.
struct ConsoleListener {
    label: &'static str,
    done: Arc<Notify>,
}

impl JobListener for ConsoleListener {
    fn queued(&self) {
        println!("[{}] queued", self.label);
    }

    fn scanning_started(&self) {
        println!("[{}] submitting", self.label);
    }

    fn upload_progress(&self, sent: u64, total: u64) {
        println!("[{}] uploaded {sent}/{total} bytes", self.label);
    }

    fn waiting_for_report(&self, delay: Duration) {
        println!("[{}] next poll in {:?}", self.label, delay);
    }

    fn service_limit_reached(&self, delay: Duration) {
        println!("[{}] throttled, waiting {:?}", self.label, delay);
    }

    fn report_ready(&self, report: &Report) {
        println!(
            "[{}] report ready: {}/{} engines flagged it",
            self.label,
            report.positives(),
            report.summary().results.len()
        );
        self.done.notify_one();
    }

    fn aborted(&self) {
        println!("[{}] aborted", self.label);
        self.done.notify_one();
    }

    fn invalid_service_key(&self) {
        println!("[{}] the service rejected the key", self.label);
        self.done.notify_one();
    }

    fn error_occurred(&self, message: &str) {
        println!("[{}] error: {}", self.label, message);
        self.done.notify_one();
    }
}

fn listener(label: &'static str) -> (Arc<ConsoleListener>, Arc<Notify>) {
    let done = Arc::new(Notify::new());
    let listener = Arc::new(ConsoleListener {
        label,
        done: done.clone(),
    });
    (listener, done)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Custom Backend Example ===\n");

    let service = Arc::new(SimulatedService::new("demo-key"));

    // Test 1: No key configured
    println!("=== Test 1: Enqueue without a service key ===");
    let mut keyless = Scheduler::new(
        Arc::new(SimulatedFactory {
            service: service.clone(),
        }),
        SchedulerConfig::default(),
    )?;
    let (quiet, _) = listener("keyless");
    match keyless.try_enqueue_job(Resource::url("http://example.com"), quiet, true) {
        Ok(id) => println!("Unexpectedly enqueued job {id}"),
        Err(error) => println!("Rejected: {error}"),
    }

    // Test 2: Wrong key
    println!("\n=== Test 2: Enqueue with a wrong service key ===");
    let scheduler = Scheduler::new(
        Arc::new(SimulatedFactory {
            service: service.clone(),
        }),
        SchedulerConfig::new().with_service_key("not-the-key"),
    )?;
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run());

    let (rejected, done) = listener("wrong-key");
    handle
        .enqueue(Resource::url("http://example.com"), rejected, true)
        .await?;
    done.notified().await;
    handle.shutdown()?;
    task.await?;

    // Test 3: Correct key, several jobs per queue
    println!("\n=== Test 3: Several jobs with the right key ===");
    let scheduler = Scheduler::new(
        Arc::new(SimulatedFactory { service }),
        SchedulerConfig::new()
            .with_service_key("demo-key")
            .with_max_submission_retries(3),
    )?;
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run());

    let mut waits = Vec::new();
    for (label, resource) in [
        ("url-1", Resource::url("http://example.com/a")),
        ("url-2", Resource::url("http://example.com/b")),
        ("file-1", Resource::file("invoice.pdf")),
    ] {
        let (listener, done) = listener(label);
        let id = handle.enqueue(resource, listener, false).await?;
        println!("Enqueued {label} as job {id}");
        waits.push(done);
    }

    for done in waits {
        done.notified().await;
    }

    let status = handle.status().await?;
    println!(
        "\nDelay levels after draining: file {}, url {}",
        status.file.delay_level, status.url.delay_level
    );

    handle.shutdown()?;
    task.await?;

    println!("\n=== Example Complete ===");
    Ok(())
}
