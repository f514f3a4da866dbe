//! One cross-posting run
//!
//! A run takes an episode and walks the registered targets in order. Each
//! target that is enabled, configured and routed for the episode's source is
//! posted to through the retry policy; every outcome is persisted and
//! logged, and a failure never stops the loop. The video is marked as
//! handled afterwards even when some targets failed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::routing;
use crate::activity::AutomationLogger;
use crate::alerts::FailureAlerter;
use crate::config::AutomationConfig;
use crate::credentials::CredentialStore;
use crate::dedup::DedupTracker;
use crate::error::{PodrelayError, Result};
use crate::platforms::{PlatformPoster, PostOutcome};
use crate::registry::PlatformRegistry;
use crate::results::ResultStore;
use crate::retry::{retry, RetryPolicy};
use crate::types::{
    Episode, Level, LogEntry, LogLevel, LogType, PlatformId, PostContent, PostResult,
};

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// Hourly check while automation is running
    Scheduled,
    /// Operator asked for a check outside the schedule
    CheckNow,
    /// Operator asked to post the latest episode
    PostLatest,
    /// Operator picked the targets explicitly
    Manual,
}

impl Trigger {
    pub fn log_type(self) -> LogType {
        match self {
            Trigger::Scheduled => LogType::Check,
            Trigger::CheckNow | Trigger::Manual => LogType::Manual,
            Trigger::PostLatest => LogType::PostLatest,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trigger::Scheduled => "scheduled",
            Trigger::CheckNow => "check-now",
            Trigger::PostLatest => "post-latest",
            Trigger::Manual => "manual",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub trigger: Trigger,
    /// One entry per attempted platform
    pub results: BTreeMap<PlatformId, PostResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = (&PlatformId, &PostResult)> {
        self.results.iter().filter(|(_, r)| !r.success)
    }
}

/// Time and retry limits of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub retry: RetryPolicy,
    /// Wall-clock ceiling for the whole run
    pub run_timeout: Duration,
    /// Ceiling for one platform, retries included
    pub platform_timeout: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            run_timeout: Duration::from_secs(60),
            platform_timeout: Duration::from_secs(20),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &AutomationConfig) -> Result<Self> {
        Ok(Self {
            retry: RetryPolicy::from_config(config)?,
            run_timeout: config.run_timeout()?,
            platform_timeout: config.platform_timeout()?,
        })
    }
}

/// Which targets a run considers
#[derive(Clone, Copy)]
enum Selection<'a> {
    /// The source's routing table
    Routed,
    /// Exactly these, routing ignored
    Explicit(&'a [PlatformId]),
}

pub struct AutomationController {
    registry: Arc<PlatformRegistry>,
    credentials: CredentialStore,
    dedup: DedupTracker,
    logger: AutomationLogger,
    results: ResultStore,
    alerter: FailureAlerter,
    settings: RunSettings,
    run_lock: Mutex<()>,
}

impl AutomationController {
    pub fn new(
        registry: Arc<PlatformRegistry>,
        credentials: CredentialStore,
        dedup: DedupTracker,
        logger: AutomationLogger,
        results: ResultStore,
        alerter: FailureAlerter,
        settings: RunSettings,
    ) -> Self {
        Self {
            registry,
            credentials,
            dedup,
            logger,
            results,
            alerter,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    pub fn logger(&self) -> &AutomationLogger {
        &self.logger
    }

    /// Post `episode` to every routed target
    ///
    /// # Errors
    ///
    /// `AlreadyPosted` when the video was handled before and `bypass_dedup`
    /// is false; nothing is posted in that case. Per-platform failures are
    /// not errors; they are reported in the [`RunReport`].
    pub async fn run(
        &self,
        episode: &Episode,
        trigger: Trigger,
        bypass_dedup: bool,
    ) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;

        if !bypass_dedup && self.dedup.has_posted_video(&episode.video_id).await? {
            debug!("Video {} already posted, skipping run", episode.video_id);
            return Err(PodrelayError::AlreadyPosted(episode.video_id.clone()));
        }
        if bypass_dedup {
            info!("Posting {} with deduplication bypassed", episode.video_id);
        }

        let report = self.execute(episode, trigger, Selection::Routed).await;

        if let Err(e) = self.dedup.mark_video_as_posted(&episode.video_id).await {
            warn!("Failed to mark {} as posted: {}", episode.video_id, e);
        }
        self.finish(episode, &report).await;
        Ok(report)
    }

    /// Post `episode` to exactly `targets`, ignoring routing and dedup
    ///
    /// Targets must still be enabled and configured. The video is not
    /// marked as posted.
    pub async fn run_targets(&self, episode: &Episode, targets: &[PlatformId]) -> Result<RunReport> {
        if targets.is_empty() {
            return Err(PodrelayError::InvalidInput("No target platforms given".to_string()));
        }
        if let Some(source) = targets.iter().find(|p| self.registry.poster(**p).is_none()) {
            return Err(PodrelayError::InvalidInput(format!(
                "{} is not a posting target",
                source
            )));
        }

        let _guard = self.run_lock.lock().await;
        let report = self
            .execute(episode, Trigger::Manual, Selection::Explicit(targets))
            .await;
        self.finish(episode, &report).await;
        Ok(report)
    }

    async fn execute(&self, episode: &Episode, trigger: Trigger, selection: Selection<'_>) -> RunReport {
        let content = PostContent::from(episode);
        let deadline = Instant::now() + self.settings.run_timeout;
        let mut report = RunReport {
            video_id: episode.video_id.clone(),
            title: episode.title.clone(),
            url: episode.url.clone(),
            trigger,
            results: BTreeMap::new(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };

        info!(
            "Starting {} run for {} video {} ({})",
            trigger, episode.source, episode.video_id, episode.title
        );

        for platform in self.registry.targets() {
            let selected = match selection {
                Selection::Routed => routing::is_routed(episode.source, platform),
                Selection::Explicit(targets) => targets.contains(&platform),
            };
            if !selected {
                debug!("{} is not routed for {}, skipping", platform, episode.source);
                report.skipped += 1;
                continue;
            }
            let Some(poster) = self.registry.poster(platform) else {
                report.skipped += 1;
                continue;
            };

            let result = match self.eligible(platform).await {
                Ok(true) => {
                    self.attempt(platform, poster.as_ref(), &content, deadline)
                        .await
                }
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => PostResult::failed(format!("Could not load credentials: {}", e)),
            };

            if result.success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            self.persist(platform, episode, trigger, &result).await;
            report.results.insert(platform, result);
        }

        report
    }

    /// Enabled and configured
    async fn eligible(&self, platform: PlatformId) -> Result<bool> {
        let enabled = self
            .credentials
            .get(Level::Target, platform)
            .await?
            .map(|record| record.enabled)
            .unwrap_or(false);
        if !enabled {
            debug!("{} is not enabled, skipping", platform);
            return Ok(false);
        }
        if !self.credentials.is_configured(Level::Target, platform).await? {
            debug!("{} is enabled but not configured, skipping", platform);
            return Ok(false);
        }
        Ok(true)
    }

    async fn attempt(
        &self,
        platform: PlatformId,
        poster: &dyn PlatformPoster,
        content: &PostContent,
        deadline: Instant,
    ) -> PostResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PostResult::failed(format!(
                "Timed out: run time limit of {:?} reached before {} was attempted",
                self.settings.run_timeout,
                platform.display_name()
            ));
        }
        let budget = remaining.min(self.settings.platform_timeout);

        let credentials = match self.credentials.resolve(Level::Target, platform).await {
            Ok(credentials) => credentials,
            Err(e) => return PostResult::failed(format!("Could not load credentials: {}", e)),
        };

        let label = format!("Posting to {}", platform);
        let posting = async {
            let learned = retry(self.settings.retry, &label, || poster.prepare(&credentials)).await?;
            let credentials = if learned.is_empty() {
                credentials
            } else {
                let updates = learned.into_field_updates(platform);
                self.store_learned(platform, updates.clone()).await;
                credentials.with_fields(&updates)
            };
            retry(self.settings.retry, &label, || poster.post(&credentials, content)).await
        };

        match tokio::time::timeout(budget, posting).await {
            Ok(Ok(outcome)) => {
                self.remember_derived(platform, &outcome).await;
                PostResult::succeeded(outcome.post_id, outcome.post_url)
            }
            Ok(Err(e)) => PostResult::failed(e.to_string()),
            Err(_) => PostResult::failed(format!(
                "Timed out: {} did not finish within {:?}",
                platform.display_name(),
                budget
            )),
        }
    }

    async fn remember_derived(&self, platform: PlatformId, outcome: &PostOutcome) {
        if outcome.derived.is_empty() {
            return;
        }
        let updates = outcome.derived.clone().into_field_updates(platform);
        self.store_learned(platform, updates).await;
    }

    async fn store_learned(&self, platform: PlatformId, updates: BTreeMap<String, String>) {
        if updates.is_empty() {
            return;
        }
        if let Err(e) = self
            .credentials
            .merge_fields(Level::Target, platform, updates)
            .await
        {
            warn!("Failed to store values learned from {}: {}", platform, e);
        }
    }

    async fn persist(&self, platform: PlatformId, episode: &Episode, trigger: Trigger, result: &PostResult) {
        if let Err(e) = self.results.record(platform, result).await {
            warn!("Failed to record result for {}: {}", platform, e);
        }

        let entry = if result.success {
            let mut entry = LogEntry::new(
                trigger.log_type(),
                LogLevel::Success,
                format!("Posted \"{}\" to {}", episode.title, platform.display_name()),
            );
            if let Some(url) = &result.post_url {
                entry = entry.with_detail("post_url", url.as_str());
            }
            if let Some(id) = &result.post_id {
                entry = entry.with_detail("post_id", id.as_str());
            }
            entry
        } else {
            LogEntry::new(
                trigger.log_type(),
                LogLevel::Error,
                format!(
                    "Failed to post \"{}\" to {}",
                    episode.title,
                    platform.display_name()
                ),
            )
            .with_detail("error", result.error.clone().unwrap_or_default())
        };
        let entry = entry
            .with_detail("platform", platform.as_str())
            .with_detail("video_id", episode.video_id.as_str())
            .at(result.timestamp);

        if let Err(e) = self.logger.append_entry(entry).await {
            warn!("Failed to log result for {}: {}", platform, e);
        }
    }

    async fn finish(&self, episode: &Episode, report: &RunReport) {
        let level = if report.failed > 0 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        let summary = LogEntry::new(
            report.trigger.log_type(),
            level,
            format!(
                "Run for \"{}\" finished: {} succeeded, {} failed, {} skipped",
                episode.title, report.succeeded, report.failed, report.skipped
            ),
        )
        .with_detail("video_id", episode.video_id.as_str())
        .with_detail("source", episode.source.as_str());
        if let Err(e) = self.logger.append_entry(summary).await {
            warn!("Failed to log run summary: {}", e);
        }

        if report.failed > 0 {
            self.alerter.alert(report).await;
        }
    }
}
