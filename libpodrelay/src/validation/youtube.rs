//! YouTube Data API key + channel check

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{settle, CredentialValidator};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::types::{PlatformId, ValidationResult};

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

pub struct YouTubeValidator {
    client: Client,
    base: String,
}

impl YouTubeValidator {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.youtube.trim_end_matches('/').to_string(),
        }
    }

    async fn check(
        &self,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<ValidationResult, PlatformError> {
        let api_key = credentials.require("api_key")?;
        let channel_id = credentials.require("channel_id")?;

        let channels: ChannelList = http::send_json(
            PlatformId::YouTube,
            "channel lookup",
            self.client.get(format!("{}/channels", self.base)).query(&[
                ("part", "snippet"),
                ("id", channel_id),
                ("key", api_key),
            ]),
        )
        .await?;

        if channels.items.is_empty() {
            return Ok(ValidationResult::invalid(format!(
                "No YouTube channel with id {}",
                channel_id
            )));
        }
        Ok(ValidationResult::valid())
    }
}

#[async_trait]
impl CredentialValidator for YouTubeValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        settle(self.check(credentials).await)
    }
}
