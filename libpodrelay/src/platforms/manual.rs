//! Targets without a posting API (TikTok, Odysee, Vimeo)
//!
//! Nothing is posted. The configured person gets an email and/or SMS with
//! copy ready to paste and a link to the platform's upload page, and the
//! run records the platform as handled.

use async_trait::async_trait;
use std::sync::Arc;

use super::{PlatformPoster, PostOutcome};
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::notify::{NotificationPayload, Notifier};
use crate::types::{PlatformId, PostContent};

pub fn upload_url(platform: PlatformId) -> Option<&'static str> {
    match platform {
        PlatformId::TikTok => Some("https://www.tiktok.com/upload"),
        PlatformId::Odysee => Some("https://odysee.com/$/upload"),
        PlatformId::Vimeo => Some("https://vimeo.com/upload"),
        _ => None,
    }
}

/// The "please post this" message for one platform
pub fn manual_post_request(
    platform: PlatformId,
    content: &PostContent,
    profile_url: Option<&str>,
) -> NotificationPayload {
    let name = platform.display_name();
    let copy = format!("{}\n\n{}\n\n#podcast #newepisode", content.title, content.url);
    let body = format!(
        "A new episode is out and {name} has to be updated by hand.\n\n\
         Copy to paste:\n\n{copy}\n\nEpisode: {url}",
        name = name,
        copy = copy,
        url = content.url,
    );

    let mut payload = NotificationPayload::new(
        format!("Manual post needed on {}: {}", name, content.title),
        body,
    )
    .with_link("Episode", content.url.clone());
    if let Some(upload) = upload_url(platform) {
        payload = payload.with_link(format!("Upload to {}", name), upload);
    }
    if let Some(profile) = profile_url {
        payload = payload.with_link(format!("{} profile", name), profile);
    }
    payload
}

pub struct ManualPoster {
    notifier: Arc<dyn Notifier>,
}

impl ManualPoster {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl PlatformPoster for ManualPoster {
    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let platform = credentials.platform();
        let email = credentials.get("notify_email");
        let phone = credentials.get("notify_phone");
        if email.is_none() && phone.is_none() {
            return Err(PlatformError::MissingCredential(format!(
                "{}.notify_email or {}.notify_phone",
                platform, platform
            ))
            .into());
        }

        let payload = manual_post_request(platform, content, credentials.get("profile_url"));
        let mut delivered = 0;
        let mut errors = Vec::new();

        if let Some(email) = email {
            match self.notifier.send_email(email, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => errors.push(format!("email: {}", e)),
            }
        }
        if let Some(phone) = phone {
            match self.notifier.send_sms(phone, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => errors.push(format!("sms: {}", e)),
            }
        }

        if delivered == 0 {
            return Err(PlatformError::Unsupported(format!(
                "{} needs a manual post but nobody could be notified ({})",
                platform.display_name(),
                errors.join("; ")
            ))
            .into());
        }
        for error in &errors {
            tracing::warn!("Partial notification failure for {}: {}", platform, error);
        }

        tracing::info!(
            "{} has no posting API; sent {} manual-post notification(s)",
            platform,
            delivered
        );
        Ok(PostOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Channel, RecordingNotifier};

    fn content() -> PostContent {
        PostContent {
            title: "Episode 11".to_string(),
            url: "https://youtu.be/eleven".to_string(),
            thumbnail_url: None,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_notifies_both_channels() {
        let notifier = RecordingNotifier::new();
        let poster = ManualPoster::new(Arc::new(notifier.clone()));
        let creds = ResolvedCredentials::from_pairs(
            PlatformId::TikTok,
            [("notify_email", "social@example.com"), ("notify_phone", "+15550001111")],
        );

        let outcome = poster.post(&creds, &content()).await.unwrap();
        assert_eq!(outcome.post_id, None);
        assert_eq!(outcome.post_url, None);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].channel, Channel::Email);
        assert!(sent[0].payload.subject.contains("TikTok"));
        assert!(sent[0]
            .payload
            .links
            .iter()
            .any(|l| l.url == "https://www.tiktok.com/upload"));
        assert_eq!(sent[1].recipient, "+15550001111");
    }

    #[tokio::test]
    async fn test_fails_only_when_nobody_was_told() {
        let poster = ManualPoster::new(Arc::new(RecordingNotifier::failing()));
        let creds =
            ResolvedCredentials::from_pairs(PlatformId::Vimeo, [("notify_email", "a@b.co")]);
        let err = poster.post(&creds, &content()).await.unwrap_err();
        assert!(err.to_string().contains("nobody could be notified"));
    }

    #[tokio::test]
    async fn test_requires_a_recipient() {
        let poster = ManualPoster::new(Arc::new(RecordingNotifier::new()));
        let creds = ResolvedCredentials::new(PlatformId::Odysee);
        let err = poster.post(&creds, &content()).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_profile_link_included() {
        let payload = manual_post_request(
            PlatformId::Odysee,
            &content(),
            Some("https://odysee.com/@show"),
        );
        let labels: Vec<_> = payload.links.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["Episode", "Upload to Odysee", "Odysee profile"]);
        assert!(payload.body.contains("https://youtu.be/eleven"));
    }
}
