//! Spotify show credential check
//!
//! A show is read either through the Web API (client credentials plus the
//! show id) or through its RSS feed. Either path is accepted.

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
pub(crate) struct ClientToken {
    pub access_token: String,
}

/// Client-credentials grant
pub(crate) async fn client_token(
    client: &Client,
    accounts_base: &str,
    client_id: &str,
    client_secret: &str,
) -> std::result::Result<ClientToken, PlatformError> {
    http::send_json(
        PlatformId::Spotify,
        "client credentials exchange",
        client
            .post(format!("{}/api/token", accounts_base))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")]),
    )
    .await
}

/// Whether a body looks like an RSS or Atom document
pub fn looks_like_feed(body: &str) -> bool {
    let head: String = body.chars().take(2048).collect::<String>().to_lowercase();
    head.contains("<rss") || head.contains("<feed")
}

pub struct SpotifyValidator {
    client: Client,
    accounts: String,
    api: String,
}

impl SpotifyValidator {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            accounts: endpoints.spotify_accounts.trim_end_matches('/').to_string(),
            api: endpoints.spotify_api.trim_end_matches('/').to_string(),
        }
    }

    async fn check(
        &self,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<ValidationResult, PlatformError> {
        if let (Some(client_id), Some(client_secret)) =
            (credentials.get("client_id"), credentials.get("client_secret"))
        {
            let token = client_token(&self.client, &self.accounts, client_id, client_secret).await?;

            if let Some(show_id) = credentials.get("show_id") {
                let response = http::send(
                    PlatformId::Spotify,
                    "show lookup",
                    self.client
                        .get(format!("{}/v1/shows/{}", self.api, show_id))
                        .query(&[("market", "US")])
                        .bearer_auth(&token.access_token),
                )
                .await?;
                http::check_status(PlatformId::Spotify, "show lookup", response).await?;
            }
            return Ok(ValidationResult::valid());
        }

        let rss_url = credentials.require("rss_url")?;
        let response = http::send(PlatformId::Spotify, "feed fetch", self.client.get(rss_url)).await?;
        let response = http::check_status(PlatformId::Spotify, "feed fetch", response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| http::transport_error(PlatformId::Spotify, "feed fetch", e))?;

        if looks_like_feed(&body) {
            Ok(ValidationResult::valid())
        } else {
            Ok(ValidationResult::invalid(format!(
                "{} is not an RSS or Atom feed",
                rss_url
            )))
        }
    }
}

#[async_trait]
impl CredentialValidator for SpotifyValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        settle(self.check(credentials).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_feed() {
        assert!(looks_like_feed(
            r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#
        ));
        assert!(looks_like_feed(
            r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#
        ));
        assert!(!looks_like_feed("<!DOCTYPE html><html><body>Not found</body></html>"));
    }
}
