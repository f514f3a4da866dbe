//! Service layer for Podrelay
//!
//! `PodrelayService` wires the store, the platform registry, the content
//! source and the notification/storage collaborators into one value the
//! binaries (and integration tests) drive.
//!
//! # Example
//!
//! ```no_run
//! use libpodrelay::service::PodrelayService;
//!
//! # async fn example() -> libpodrelay::Result<()> {
//! let service = PodrelayService::new().await?;
//!
//! let report = service.scheduler().check_now().await?;
//! println!("{} new episode(s) posted", report.runs.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::activity::AutomationLogger;
use crate::alerts::FailureAlerter;
use crate::automation::{AutomationController, RunSettings, Scheduler, StatusStore};
use crate::config::{Config, StorageKind};
use crate::credentials::CredentialStore;
use crate::db::{Database, KvStore};
use crate::dedup::DedupTracker;
use crate::error::{CredentialError, Result};
use crate::http;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::registry::{default_registry, PlatformRegistry, RegistryDeps};
use crate::results::ResultStore;
use crate::source::{self, EpisodeSource};
use crate::storage::{HttpStorage, LocalStorage, ObjectStorage};
use crate::types::{Level, PlatformId, ValidationResult};
use crate::validation::validate_and_store;

/// Collaborators that can be swapped out, mostly for tests
pub struct ServiceParts {
    pub kv: Arc<dyn KvStore>,
    pub registry: PlatformRegistry,
    pub source: Arc<dyn EpisodeSource>,
    pub notifier: Arc<dyn Notifier>,
}

/// Main service facade
pub struct PodrelayService {
    config: Arc<Config>,
    credentials: CredentialStore,
    registry: Arc<PlatformRegistry>,
    controller: Arc<AutomationController>,
    scheduler: Scheduler,
    results: ResultStore,
}

impl PodrelayService {
    /// Load the configuration from the default location and open the database
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build every collaborator from `config`
    pub async fn from_config(config: Config) -> Result<Self> {
        let kv: Arc<dyn KvStore> = Arc::new(Database::new(&config.database_path()).await?);
        let client = http::build_client(config.automation.platform_timeout()?)?;
        let credentials = CredentialStore::new(kv.clone());

        let notifier: Arc<dyn Notifier> = match &config.notifier.url {
            Some(url) => Arc::new(WebhookNotifier::new(
                client.clone(),
                url.clone(),
                config.notifier.token.clone(),
            )),
            None => {
                tracing::debug!("No notifier URL configured, notifications go to the log");
                Arc::new(LogNotifier)
            }
        };

        let registry = default_registry(&RegistryDeps {
            client: client.clone(),
            endpoints: config.endpoints.clone(),
            storage: object_storage(&config, client.clone()),
            notifier: notifier.clone(),
        });
        let source: Arc<dyn EpisodeSource> =
            Arc::from(source::from_config(&config, client, credentials)?);

        Self::assemble(
            config,
            ServiceParts {
                kv,
                registry,
                source,
                notifier,
            },
        )
    }

    /// Build the service around explicit collaborators
    pub fn assemble(config: Config, parts: ServiceParts) -> Result<Self> {
        config.validate()?;
        let settings = RunSettings::from_config(&config.automation)?;
        let interval = config.automation.check_interval()?;

        let credentials = CredentialStore::new(parts.kv.clone());
        let results = ResultStore::new(parts.kv.clone());
        let registry = Arc::new(parts.registry);

        let controller = Arc::new(AutomationController::new(
            registry.clone(),
            credentials.clone(),
            DedupTracker::new(parts.kv.clone()),
            AutomationLogger::new(parts.kv.clone(), &config.logs),
            results.clone(),
            FailureAlerter::new(parts.notifier, &config.alerts),
            settings,
        ));
        let scheduler = Scheduler::new(
            controller.clone(),
            parts.source,
            credentials.clone(),
            StatusStore::new(parts.kv),
            interval,
        );

        Ok(Self {
            config: Arc::new(config),
            credentials,
            registry,
            controller,
            scheduler,
            results,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &AutomationController {
        &self.controller
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn status(&self) -> &StatusStore {
        self.scheduler.status()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn logger(&self) -> &AutomationLogger {
        self.controller.logger()
    }

    pub fn dedup(&self) -> &DedupTracker {
        self.controller.dedup()
    }

    /// Validate `incoming` (may contain mask markers) and save it on success
    pub async fn validate_credentials(
        &self,
        platform: PlatformId,
        incoming: BTreeMap<String, String>,
        enabled: Option<bool>,
    ) -> Result<ValidationResult> {
        let validator = self
            .registry
            .validator(platform)
            .ok_or_else(|| CredentialError::UnknownPlatform(platform.to_string()))?;
        validate_and_store(
            &self.credentials,
            validator.as_ref(),
            platform.level(),
            platform,
            incoming,
            enabled,
        )
        .await
    }

    /// Re-check what is stored for `platform`
    pub async fn revalidate(&self, platform: PlatformId) -> Result<ValidationResult> {
        self.validate_credentials(platform, BTreeMap::new(), None)
            .await
    }

    /// Platforms whose credentials are stored, at both levels
    pub async fn configured_platforms(&self) -> Result<Vec<PlatformId>> {
        let mut platforms = Vec::new();
        for level in [Level::Source, Level::Target] {
            for platform in PlatformId::platforms_at(level) {
                if self.credentials.is_configured(level, platform).await? {
                    platforms.push(platform);
                }
            }
        }
        Ok(platforms)
    }
}

fn object_storage(config: &Config, client: reqwest::Client) -> Arc<dyn ObjectStorage> {
    let storage = &config.storage;
    match storage.kind {
        StorageKind::Http => Arc::new(HttpStorage::new(
            client,
            storage.endpoint.clone().unwrap_or_default(),
            storage.token.clone(),
            storage.public_base_url.clone(),
        )),
        StorageKind::Local => {
            let root = PathBuf::from(shellexpand::tilde(&storage.path).to_string());
            let public_base_url = storage.public_base_url.clone().unwrap_or_else(|| {
                tracing::warn!(
                    "storage.public_base_url is not set; Instagram cannot fetch title cards from {}",
                    root.display()
                );
                format!("file://{}", root.display())
            });
            Arc::new(LocalStorage::new(root, public_base_url))
        }
    }
}
