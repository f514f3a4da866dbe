//! Podrelay - cross-post new podcast episodes to social platforms
//!
//! This library holds the automation engine behind the `podrelay-send` and
//! `podrelay-creds` tools: episode sources, platform adapters, the run
//! controller with retries and deduplication, and the persisted activity log.

pub mod activity;
pub mod alerts;
pub mod automation;
pub mod config;
pub mod credentials;
pub mod db;
pub mod dedup;
pub mod error;
pub mod http;
pub mod logging;
pub mod notify;
pub mod platforms;
pub mod registry;
pub mod results;
pub mod retry;
pub mod service;
pub mod source;
pub mod storage;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use automation::{AutomationController, AutomationStatus, RunReport, Scheduler, Trigger};
pub use config::Config;
pub use credentials::CredentialStore;
pub use db::{Database, KvStore, MemoryStore};
pub use error::{PodrelayError, Result};
pub use registry::PlatformRegistry;
pub use service::PodrelayService;
pub use types::{Episode, Level, LogEntry, PlatformId, PostResult};
