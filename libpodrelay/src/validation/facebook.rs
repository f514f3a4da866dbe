//! Facebook Page credential check and token upgrade
//!
//! Page tokens obtained from a long-lived user token do not expire. When the
//! operator pastes a short-lived user token and the app id/secret are
//! known, validation trades it up so the stored token keeps working.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{settle, CredentialValidator};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::types::{DerivedFields, PlatformId, ValidationResult};

pub const NEVER_EXPIRES: &str = "never";

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DebugTokenEnvelope {
    data: DebugToken,
}

#[derive(Debug, Deserialize)]
struct DebugToken {
    #[serde(default)]
    is_valid: bool,
    #[serde(rename = "type", default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_at: i64,
    #[serde(default)]
    error: Option<DebugTokenError>,
}

#[derive(Debug, Deserialize)]
struct DebugTokenError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExchangedToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PageToken {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Accounts {
    #[serde(default)]
    data: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
    access_token: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct FacebookValidator {
    client: Client,
    graph: String,
}

impl FacebookValidator {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            graph: endpoints.facebook.trim_end_matches('/').to_string(),
        }
    }

    async fn check(
        &self,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<ValidationResult, PlatformError> {
        let platform = credentials.platform();
        let token = credentials.require("access_token")?;
        let page_id = credentials.require("page_id")?;

        let me: Me = http::send_json(
            platform,
            "token check",
            self.client
                .get(format!("{}/me", self.graph))
                .query(&[("fields", "id,name"), ("access_token", token)]),
        )
        .await?;
        tracing::debug!("Facebook token belongs to {}", me.id);

        let (Some(app_id), Some(app_secret)) =
            (credentials.get("app_id"), credentials.get("app_secret"))
        else {
            // Without app credentials the token cannot be inspected or upgraded
            return Ok(ValidationResult::valid_with(DerivedFields {
                page_name: if me.id == page_id { me.name } else { None },
                ..Default::default()
            }));
        };

        let app_token = format!("{}|{}", app_id, app_secret);
        let debug: DebugTokenEnvelope = http::send_json(
            platform,
            "token inspection",
            self.client
                .get(format!("{}/debug_token", self.graph))
                .query(&[("input_token", token), ("access_token", app_token.as_str())]),
        )
        .await?;
        let info = debug.data;

        if !info.is_valid {
            let reason = info
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "token is not valid for this app".to_string());
            return Ok(ValidationResult::invalid(format!(
                "Facebook rejected the access token: {}",
                reason
            )));
        }

        match info.token_type.as_deref() {
            Some("USER") if info.expires_at != 0 => {
                let (page_token, page_name) = self
                    .upgrade_user_token(platform, token, app_id, app_secret, page_id)
                    .await?;
                Ok(ValidationResult::valid_with(DerivedFields {
                    long_lived_token: Some(page_token),
                    token_expiry: Some(NEVER_EXPIRES.to_string()),
                    page_name,
                    ..Default::default()
                }))
            }
            Some("PAGE") => Ok(ValidationResult::valid_with(DerivedFields {
                token_expiry: (info.expires_at == 0).then(|| NEVER_EXPIRES.to_string()),
                page_name: me.name,
                ..Default::default()
            })),
            _ => Ok(ValidationResult::valid_with(DerivedFields {
                token_expiry: (info.expires_at == 0).then(|| NEVER_EXPIRES.to_string()),
                ..Default::default()
            })),
        }
    }

    /// Short-lived user token -> long-lived user token -> page token
    async fn upgrade_user_token(
        &self,
        platform: PlatformId,
        short_lived: &str,
        app_id: &str,
        app_secret: &str,
        page_id: &str,
    ) -> std::result::Result<(String, Option<String>), PlatformError> {
        let exchanged: ExchangedToken = http::send_json(
            platform,
            "token exchange",
            self.client
                .get(format!("{}/oauth/access_token", self.graph))
                .query(&[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", app_id),
                    ("client_secret", app_secret),
                    ("fb_exchange_token", short_lived),
                ]),
        )
        .await?;
        let long_lived_user = exchanged.access_token;

        let page: PageToken = http::send_json(
            platform,
            "page token lookup",
            self.client
                .get(format!("{}/{}", self.graph, page_id))
                .query(&[
                    ("fields", "access_token,name"),
                    ("access_token", long_lived_user.as_str()),
                ]),
        )
        .await?;
        if let Some(token) = page.access_token {
            return Ok((token, page.name));
        }

        let accounts: Accounts = http::send_json(
            platform,
            "page token lookup",
            self.client
                .get(format!("{}/me/accounts", self.graph))
                .query(&[("access_token", long_lived_user.as_str())]),
        )
        .await?;
        accounts
            .data
            .into_iter()
            .find(|account| account.id == page_id)
            .map(|account| (account.access_token, account.name))
            .ok_or_else(|| {
                PlatformError::Authentication(format!(
                    "The token's user does not manage page {}. Grant pages_manage_posts for that page and try again",
                    page_id
                ))
            })
    }
}

#[async_trait]
impl CredentialValidator for FacebookValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        settle(self.check(credentials).await)
    }
}
