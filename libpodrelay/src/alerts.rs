//! Failure summary sent after a run in which a platform failed

use std::sync::Arc;

use crate::automation::RunReport;
use crate::config::AlertsConfig;
use crate::notify::{NotificationPayload, Notifier};

#[derive(Clone)]
pub struct FailureAlerter {
    notifier: Arc<dyn Notifier>,
    email: Option<String>,
    sms: Option<String>,
}

/// Subject and body describing every platform outcome of a run
pub fn failure_summary(report: &RunReport) -> NotificationPayload {
    let attempted = report.succeeded + report.failed;
    let subject = format!(
        "Podrelay: {} of {} platforms failed for \"{}\"",
        report.failed, attempted, report.title
    );

    let mut body = format!(
        "Cross-posting {} ({}) finished with {} succeeded, {} failed and {} skipped.\n",
        report.video_id, report.trigger, report.succeeded, report.failed, report.skipped
    );

    body.push_str("\nFailed:\n");
    for (platform, result) in report.failures() {
        body.push_str(&format!(
            "  - {}: {}\n",
            platform.display_name(),
            result.error.as_deref().unwrap_or("unknown error")
        ));
    }

    let successes: Vec<_> = report
        .results
        .iter()
        .filter(|(_, r)| r.success)
        .collect();
    if !successes.is_empty() {
        body.push_str("\nSucceeded:\n");
        for (platform, result) in successes {
            match &result.post_url {
                Some(url) => body.push_str(&format!("  - {}: {}\n", platform.display_name(), url)),
                None => body.push_str(&format!("  - {}\n", platform.display_name())),
            }
        }
    }

    NotificationPayload::new(subject, body).with_link("Episode", report.url.clone())
}

impl FailureAlerter {
    pub fn new(notifier: Arc<dyn Notifier>, config: &AlertsConfig) -> Self {
        Self {
            notifier,
            email: config.email.clone().filter(|e| !e.trim().is_empty()),
            sms: config.sms.clone().filter(|s| !s.trim().is_empty()),
        }
    }

    /// Send the summary by email and SMS; returns how many were delivered
    ///
    /// Delivery failures are logged and otherwise ignored.
    pub async fn alert(&self, report: &RunReport) -> usize {
        if self.email.is_none() && self.sms.is_none() {
            tracing::warn!(
                "{} platform(s) failed but no alert recipients are configured",
                report.failed
            );
            return 0;
        }

        let payload = failure_summary(report);
        let mut delivered = 0;

        if let Some(email) = &self.email {
            match self.notifier.send_email(email, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!("Failed to email failure alert to {}: {}", email, e),
            }
        }
        if let Some(phone) = &self.sms {
            match self.notifier.send_sms(phone, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!("Failed to text failure alert to {}: {}", phone, e),
            }
        }

        tracing::info!(
            "Sent failure alert via {} ({} delivered)",
            self.notifier.name(),
            delivered
        );
        delivered
    }
}
