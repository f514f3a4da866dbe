//! Persisted automation state: STOPPED or RUNNING, plus check bookkeeping

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{get_json, update_json, KvStore};
use crate::error::{PodrelayError, Result};

const NAMESPACE: &str = "automation";
const KEY: &str = "status";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub running: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    /// Checks performed on `checks_day`
    pub checks_today: u32,
    pub checks_day: Option<NaiveDate>,
}

impl AutomationStatus {
    /// Whether a scheduled check should happen at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.running && self.next_check.map_or(true, |next| now >= next)
    }

    /// Checks counted for the UTC day of `now`
    pub fn checks_on(&self, now: DateTime<Utc>) -> u32 {
        if self.checks_day == Some(now.date_naive()) {
            self.checks_today
        } else {
            0
        }
    }
}

fn after(now: DateTime<Utc>, interval: Duration) -> Result<DateTime<Utc>> {
    let interval = chrono::Duration::from_std(interval)
        .map_err(|e| PodrelayError::InvalidInput(format!("Check interval out of range: {}", e)))?;
    Ok(now + interval)
}

#[derive(Clone)]
pub struct StatusStore {
    kv: Arc<dyn KvStore>,
}

impl StatusStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self) -> Result<AutomationStatus> {
        Ok(get_json(self.kv.as_ref(), NAMESPACE, KEY)
            .await?
            .unwrap_or_default())
    }

    /// STOPPED -> RUNNING; the first check is due immediately
    pub async fn start(&self, now: DateTime<Utc>) -> Result<AutomationStatus> {
        let status = update_json(self.kv.as_ref(), NAMESPACE, KEY, |current: Option<AutomationStatus>| {
            let mut status = current.unwrap_or_default();
            if !status.running {
                status.running = true;
                status.next_check = Some(now);
            }
            Ok(status)
        })
        .await?;
        tracing::info!("Automation started");
        Ok(status)
    }

    /// RUNNING -> STOPPED
    pub async fn stop(&self) -> Result<AutomationStatus> {
        let status = update_json(self.kv.as_ref(), NAMESPACE, KEY, |current: Option<AutomationStatus>| {
            let mut status = current.unwrap_or_default();
            status.running = false;
            status.next_check = None;
            Ok(status)
        })
        .await?;
        tracing::info!("Automation stopped");
        Ok(status)
    }

    /// Flip the running flag atomically
    pub async fn toggle(&self, now: DateTime<Utc>) -> Result<AutomationStatus> {
        let status = update_json(self.kv.as_ref(), NAMESPACE, KEY, |current: Option<AutomationStatus>| {
            let mut status = current.unwrap_or_default();
            status.running = !status.running;
            status.next_check = status.running.then_some(now);
            Ok(status)
        })
        .await?;
        tracing::info!(
            "Automation {}",
            if status.running { "started" } else { "stopped" }
        );
        Ok(status)
    }

    /// Note a completed check; never changes `running`
    ///
    /// `next_check` advances by `interval` only while running.
    pub async fn record_check(&self, now: DateTime<Utc>, interval: Duration) -> Result<AutomationStatus> {
        let next = after(now, interval)?;
        let today = now.date_naive();
        update_json(self.kv.as_ref(), NAMESPACE, KEY, |current: Option<AutomationStatus>| {
            let mut status = current.unwrap_or_default();
            status.last_check = Some(now);
            if status.running {
                status.next_check = Some(next);
            }
            if status.checks_day == Some(today) {
                status.checks_today += 1;
            } else {
                status.checks_day = Some(today);
                status.checks_today = 1;
            }
            Ok(status)
        })
        .await
    }
}
