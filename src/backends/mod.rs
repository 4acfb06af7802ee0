//! Connector implementations.
//!
//! The wire protocol of a scanning service lives outside this crate: a
//! backend implements the [`Connector`](crate::core::Connector) trait and
//! hands it to the scheduler, usually through a
//! [`SharedConnector`](crate::core::SharedConnector).
//!
//! ## Available Backends
//!
//! - [`mock`] - A scripted connector and a recording listener for testing
//!
//! ## Implementing a Custom Backend
//!
//! ```rust,ignore
//! use scanpoll::core::{
//!     Connector, ConnectorConfig, ConnectorError, PollReply, Resource, ResourceType, UploadProgress,
//! };
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct MyConnector {
//!     // Your transport's configuration
//! }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     fn name(&self) -> &str {
//!         "my-connector"
//!     }
//!
//!     fn config(&self, resource_type: ResourceType) -> ConnectorConfig {
//!         match resource_type {
//!             ResourceType::File => ConnectorConfig::api_file(),
//!             ResourceType::Url => ConnectorConfig::api_url(),
//!         }
//!     }
//!
//!     async fn submit(
//!         &self,
//!         resource: &Resource,
//!         reuse_last_report: bool,
//!         progress: &UploadProgress,
//!     ) -> Result<String, ConnectorError> {
//!         // Send the resource, return the scan id
//!         todo!()
//!     }
//!
//!     async fn retrieve_report(&self, resource: &Resource, scan_id: &str) -> Result<PollReply, ConnectorError> {
//!         // Ask for the report
//!         todo!()
//!     }
//! }
//! ```

pub mod mock;

// Re-exports
pub use mock::{MockConnector, MockStep, Notification, RecordingListener};
