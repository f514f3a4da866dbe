//! Per-day automation log
//!
//! Entries are grouped by UTC calendar day, one [`DailyLog`] document per
//! day. A day holds at most `max_entries_per_day` entries; appending past
//! the cap evicts the oldest. Days that fall out of the retention window are
//! purged on every append.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::LogsConfig;
use crate::db::{get_json, update_json, KvStore};
use crate::error::Result;
use crate::types::{DailyLog, LogEntry, LogLevel, LogType};

const NAMESPACE: &str = "logs";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn day_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[derive(Clone)]
pub struct AutomationLogger {
    kv: Arc<dyn KvStore>,
    max_entries_per_day: usize,
    retention_days: u32,
}

impl AutomationLogger {
    pub fn new(kv: Arc<dyn KvStore>, config: &LogsConfig) -> Self {
        Self {
            kv,
            max_entries_per_day: config.max_entries_per_day.max(1),
            retention_days: config.retention_days,
        }
    }

    pub async fn append(
        &self,
        log_type: LogType,
        level: LogLevel,
        message: impl Into<String>,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Result<LogEntry> {
        let mut entry = LogEntry::new(log_type, level, message);
        entry.details = details;
        self.append_entry(entry.clone()).await?;
        Ok(entry)
    }

    /// Append a prepared entry to the day of its timestamp
    pub async fn append_entry(&self, entry: LogEntry) -> Result<()> {
        let date = entry.timestamp.date_naive();
        let cap = self.max_entries_per_day;

        match entry.level {
            LogLevel::Error => tracing::error!("{}", entry.message),
            LogLevel::Warn => tracing::warn!("{}", entry.message),
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", entry.message),
        }

        let now = entry.timestamp;
        update_json(
            self.kv.as_ref(),
            NAMESPACE,
            &day_key(date),
            move |current: Option<DailyLog>| {
                let mut log = current.unwrap_or(DailyLog {
                    date,
                    entries: Vec::new(),
                });
                log.entries.push(entry.clone());
                if log.entries.len() > cap {
                    let overflow = log.entries.len() - cap;
                    log.entries.drain(..overflow);
                }
                Ok(log)
            },
        )
        .await?;

        self.purge_expired(now).await?;
        Ok(())
    }

    /// The log for one day; empty when nothing was logged
    pub async fn get_day(&self, date: NaiveDate) -> Result<DailyLog> {
        Ok(get_json(self.kv.as_ref(), NAMESPACE, &day_key(date))
            .await?
            .unwrap_or(DailyLog {
                date,
                entries: Vec::new(),
            }))
    }

    /// Stored days among the last `days` (today included), newest first
    pub async fn recent(&self, days: u32) -> Result<Vec<DailyLog>> {
        let today = Utc::now().date_naive();
        let oldest = today - Duration::days(i64::from(days.max(1)) - 1);

        let mut logs = Vec::new();
        for key in self.kv.keys(NAMESPACE).await?.into_iter().rev() {
            let Ok(date) = NaiveDate::parse_from_str(&key, DATE_FORMAT) else {
                continue;
            };
            if date < oldest || date > today {
                continue;
            }
            if let Some(log) = get_json::<DailyLog>(self.kv.as_ref(), NAMESPACE, &key).await? {
                logs.push(log);
            }
        }
        Ok(logs)
    }

    /// Delete every day; returns how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.kv.keys(NAMESPACE).await? {
            if self.kv.delete(NAMESPACE, &key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete days older than the retention window relative to `now`
    ///
    /// With a 7 day window, `now` and the six days before it are kept.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let window = i64::from(self.retention_days.max(1));
        let keep_from = now.date_naive() - Duration::days(window - 1);
        let mut removed = 0;

        for key in self.kv.keys(NAMESPACE).await? {
            match NaiveDate::parse_from_str(&key, DATE_FORMAT) {
                Ok(date) if date < keep_from => {
                    if self.kv.delete(NAMESPACE, &key).await? {
                        tracing::debug!("Purged automation log for {}", key);
                        removed += 1;
                    }
                }
                Ok(_) => {}
                Err(_) => tracing::warn!("Ignoring log key that is not a date: {}", key),
            }
        }
        Ok(removed)
    }
}
