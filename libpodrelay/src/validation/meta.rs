//! Instagram and Threads credential check
//!
//! Both are Meta Graph APIs answering `GET /{node}?fields=id,username`.

use async_trait::async_trait;
use reqwest::Client;

use super::{settle, CredentialValidator};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::platforms::meta::fetch_profile;
use crate::types::{DerivedFields, PlatformId, ValidationResult};

pub struct MetaProfileValidator {
    client: Client,
    base: String,
}

impl MetaProfileValidator {
    pub fn instagram(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.instagram.trim_end_matches('/').to_string(),
        }
    }

    pub fn threads(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.threads.trim_end_matches('/').to_string(),
        }
    }

    async fn check(
        &self,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<ValidationResult, PlatformError> {
        let platform = credentials.platform();
        let token = credentials.require("access_token")?;
        let node = match platform {
            PlatformId::Instagram => credentials.get("business_account_id").unwrap_or("me"),
            _ => "me",
        };

        let profile = fetch_profile(&self.client, platform, &self.base, node, token).await?;
        Ok(ValidationResult::valid_with(DerivedFields {
            user_id: Some(profile.id),
            username: profile.username,
            ..Default::default()
        }))
    }
}

#[async_trait]
impl CredentialValidator for MetaProfileValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        settle(self.check(credentials).await)
    }
}
