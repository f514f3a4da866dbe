//! Periodic checks for new episodes
//!
//! The scheduler polls the persisted [`AutomationStatus`]; while it is
//! RUNNING and a check is due, every enabled source is asked for its latest
//! episode and each one not posted yet goes through the controller. Manual
//! checks run the same path in either state.
//!
//! [`AutomationStatus`]: super::status::AutomationStatus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use super::controller::{AutomationController, RunReport, Trigger};
use super::status::StatusStore;
use crate::credentials::CredentialStore;
use crate::error::{PodrelayError, Result};
use crate::source::EpisodeSource;
use crate::types::{Episode, Level, LogEntry, LogLevel, PlatformId};

/// Outcome of one check across all sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Sources that were asked
    pub sources: Vec<PlatformId>,
    pub runs: Vec<RunReport>,
    /// Latest episodes that had been posted before
    pub already_posted: Vec<String>,
    /// Sources that could not be read
    pub errors: Vec<(PlatformId, String)>,
}

pub struct Scheduler {
    controller: Arc<AutomationController>,
    source: Arc<dyn EpisodeSource>,
    credentials: CredentialStore,
    status: StatusStore,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        controller: Arc<AutomationController>,
        source: Arc<dyn EpisodeSource>,
        credentials: CredentialStore,
        status: StatusStore,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            source,
            credentials,
            status,
            interval,
        }
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    /// Level 1 platforms that are enabled and configured
    pub async fn active_sources(&self) -> Result<Vec<PlatformId>> {
        let mut active = Vec::new();
        for source in PlatformId::platforms_at(Level::Source) {
            let enabled = self
                .credentials
                .get(Level::Source, source)
                .await?
                .is_some_and(|record| record.enabled);
            if enabled && self.credentials.is_configured(Level::Source, source).await? {
                active.push(source);
            }
        }
        Ok(active)
    }

    async fn check(&self, trigger: Trigger) -> Result<CheckReport> {
        let mut report = CheckReport {
            sources: self.active_sources().await?,
            ..Default::default()
        };
        if report.sources.is_empty() {
            info!("No enabled sources to check");
        }

        for source in report.sources.clone() {
            let episode = match self.source.latest(source).await {
                Ok(Some(episode)) => episode,
                Ok(None) => {
                    info!("{} has no episodes", source);
                    continue;
                }
                Err(e) => {
                    error!("Could not read latest episode from {}: {}", source, e);
                    report.errors.push((source, e.to_string()));
                    continue;
                }
            };

            match self.controller.run(&episode, trigger, false).await {
                Ok(run) => report.runs.push(run),
                Err(PodrelayError::AlreadyPosted(video_id)) => {
                    info!("Latest {} episode {} was already posted", source, video_id);
                    report.already_posted.push(video_id);
                }
                Err(e) => {
                    error!("Run for {} failed: {}", source, e);
                    report.errors.push((source, e.to_string()));
                }
            }
        }

        let level = if report.errors.is_empty() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        let entry = LogEntry::new(
            trigger.log_type(),
            level,
            format!(
                "Checked {} source(s): {} new episode(s), {} already posted, {} error(s)",
                report.sources.len(),
                report.runs.len(),
                report.already_posted.len(),
                report.errors.len()
            ),
        )
        .with_detail("trigger", trigger.to_string());
        if let Err(e) = self.controller.logger().append_entry(entry).await {
            error!("Failed to log check: {}", e);
        }

        Ok(report)
    }

    /// Check every source now, whatever the automation state
    pub async fn check_now(&self) -> Result<CheckReport> {
        let report = self.check(Trigger::CheckNow).await?;
        self.status.record_check(Utc::now(), self.interval).await?;
        Ok(report)
    }

    /// Post the newest episode of `source` (or of the first active source)
    pub async fn post_latest(&self, source: Option<PlatformId>, bypass_dedup: bool) -> Result<RunReport> {
        let episode = self.latest_episode(source).await?;
        self.controller
            .run(&episode, Trigger::PostLatest, bypass_dedup)
            .await
    }

    /// Post the newest episode of `source` to exactly `targets`
    pub async fn post_latest_to(&self, source: Option<PlatformId>, targets: &[PlatformId]) -> Result<RunReport> {
        let episode = self.latest_episode(source).await?;
        self.controller.run_targets(&episode, targets).await
    }

    async fn latest_episode(&self, source: Option<PlatformId>) -> Result<Episode> {
        let candidates = match source {
            Some(source) if source.level() != Level::Source => {
                return Err(PodrelayError::InvalidInput(format!(
                    "{} is not an episode source",
                    source
                )))
            }
            Some(source) => vec![source],
            None => self.active_sources().await?,
        };

        for candidate in candidates {
            if let Some(episode) = self.source.latest(candidate).await? {
                return Ok(episode);
            }
        }
        Err(PodrelayError::InvalidInput(
            "No episode found on any enabled source".to_string(),
        ))
    }

    /// Run a scheduled check if one is due at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Option<CheckReport>> {
        let status = self.status.get().await?;
        if !status.is_due(now) {
            return Ok(None);
        }

        info!("Scheduled check due");
        let report = self.check(Trigger::Scheduled).await?;
        let status = self.status.record_check(now, self.interval).await?;
        if let Some(next) = status.next_check {
            info!("Next check at {}", next);
        }
        Ok(Some(report))
    }

    /// Tick every `poll` until `shutdown` is set
    ///
    /// The running flag is re-read on every tick, so start/stop from another
    /// process takes effect without a restart.
    pub async fn run_loop(&self, poll: Duration, shutdown: Arc<AtomicBool>) {
        info!(
            "Scheduler started (check interval {:?}, poll {:?})",
            self.interval, poll
        );
        let poll_secs = poll.as_secs().max(1);

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping scheduler");
                break;
            }

            if let Err(e) = self.tick(Utc::now()).await {
                error!("Scheduled check failed: {}", e);
            }

            // Sleep until next poll (check shutdown every second)
            for _ in 0..poll_secs {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
