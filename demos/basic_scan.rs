//! Basic example demonstrating file and URL jobs on one scheduler.
//!
//! This example shows how to:
//! - Wrap a connector in a `SharedConnector`
//! - Run the scheduler on its own task
//! - Enqueue jobs through a `SchedulerHandle` and follow them with a listener
//!
//! Run with: cargo run --example basic_scan

use scanpoll::backends::{MockConnector, MockStep};
use scanpoll::prelude::*;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Prints every notification of one job.
struct PrintingListener {
    label: String,
    done: Arc<Notify>,
}

impl PrintingListener {
    fn new(label: impl Into<String>, done: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            done,
        })
    }
}

impl JobListener for PrintingListener {
    fn queued(&self) {
        println!("[{}] queued", self.label);
    }

    fn scanning_started(&self) {
        println!("[{}] submitting", self.label);
    }

    fn retrieving_report(&self) {
        println!("[{}] retrieving report", self.label);
    }

    fn waiting_for_report(&self, delay: Duration) {
        println!("[{}] next poll in {:?}", self.label, delay);
    }

    fn service_limit_reached(&self, delay: Duration) {
        println!("[{}] service limit reached, waiting {:?}", self.label, delay);
    }

    fn report_ready(&self, report: &Report) {
        println!(
            "[{}] report ready: {} positives, link {:?}",
            self.label,
            report.positives(),
            report.permanent_link()
        );
        self.done.notify_one();
    }

    fn aborted(&self) {
        println!("[{}] aborted", self.label);
        self.done.notify_one();
    }

    fn error_occurred(&self, message: &str) {
        println!("[{}] error: {}", self.label, message);
        self.done.notify_one();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Scanpoll Basic Example ===\n");

    // Short delay tables so the example finishes quickly
    let connector = MockConnector::new()
        .with_name("example-service")
        .with_config(ResourceType::File, ConnectorConfig::from_secs(&[1, 2, 4], 1))
        .with_config(ResourceType::Url, ConnectorConfig::from_secs(&[1, 2, 4], 0))
        .with_latency(Duration::from_millis(200))
        .with_script(
            "document.pdf",
            vec![
                MockStep::scan_id("file-scan-1"),
                MockStep::NotReady,
                MockStep::RateLimited,
                MockStep::Ready,
            ],
        )
        .with_script(
            "http://example.com/download",
            vec![MockStep::scan_id("url-scan-1"), MockStep::NotReady, MockStep::Ready],
        );

    let scheduler = Scheduler::new(
        Arc::new(SharedConnector::new(connector)),
        SchedulerConfig::default(),
    )?;
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run());

    let file_done = Arc::new(Notify::new());
    let url_done = Arc::new(Notify::new());

    let file_job = handle
        .enqueue(
            Resource::file("document.pdf"),
            PrintingListener::new("file", file_done.clone()),
            true,
        )
        .await?;
    let url_job = handle
        .enqueue(
            Resource::url("http://example.com/download"),
            PrintingListener::new("url", url_done.clone()),
            true,
        )
        .await?;
    println!("Enqueued file job {file_job} and url job {url_job}\n");

    let status = handle.status().await?;
    println!(
        "File queue: level {} ({:?}), url queue: level {} ({:?})\n",
        status.file.delay_level, status.file.delay, status.url.delay_level, status.url.delay
    );

    file_done.notified().await;
    url_done.notified().await;

    let status = handle.status().await?;
    println!("\nJobs left: {}", status.job_count());

    handle.shutdown()?;
    task.await?;

    println!("\n=== Example Complete ===");
    Ok(())
}
