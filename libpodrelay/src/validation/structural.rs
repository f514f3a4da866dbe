//! Presence checks for platforms without an API to ask

use async_trait::async_trait;

use super::CredentialValidator;
use crate::credentials::ResolvedCredentials;
use crate::error::Result;
use crate::types::ValidationResult;

/// Rumble exposes no public API; a channel URL or id is enough
#[derive(Debug, Default, Clone, Copy)]
pub struct RumbleValidator;

#[async_trait]
impl CredentialValidator for RumbleValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        if let Some(channel_url) = credentials.get("channel_url") {
            return Ok(match url::Url::parse(channel_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                    ValidationResult::valid()
                }
                _ => ValidationResult::invalid(format!(
                    "channel_url '{}' is not an http(s) URL",
                    channel_url
                )),
            });
        }
        if credentials.get("channel_id").is_some() || credentials.get("rss_url").is_some() {
            return Ok(ValidationResult::valid());
        }
        Ok(ValidationResult::invalid(
            "Rumble needs a channel_url, channel_id or rss_url",
        ))
    }
}

/// TikTok, Odysee and Vimeo: someone has to be told to post by hand
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTargetValidator;

#[async_trait]
impl CredentialValidator for ManualTargetValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        let email = credentials.get("notify_email");
        let phone = credentials.get("notify_phone");

        if email.is_none() && phone.is_none() {
            return Ok(ValidationResult::invalid(format!(
                "{} cannot be posted to programmatically; set notify_email or notify_phone so someone is told to post it",
                credentials.platform().display_name()
            )));
        }
        if let Some(email) = email {
            if !email.contains('@') {
                return Ok(ValidationResult::invalid(format!(
                    "notify_email '{}' is not an email address",
                    email
                )));
            }
        }
        if let Some(phone) = phone {
            let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
            if digits < 7 {
                return Ok(ValidationResult::invalid(format!(
                    "notify_phone '{}' is not a phone number",
                    phone
                )));
            }
        }
        Ok(ValidationResult::valid())
    }
}
