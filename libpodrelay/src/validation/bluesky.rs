//! Bluesky app password check

use async_trait::async_trait;
use reqwest::Client;

use super::{settle, CredentialValidator};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::platforms::bluesky::create_session;
use crate::types::{DerivedFields, ValidationResult};

pub struct BlueskyValidator {
    client: Client,
    pds: String,
}

impl BlueskyValidator {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            pds: endpoints.bluesky.trim_end_matches('/').to_string(),
        }
    }

    async fn check(
        &self,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<ValidationResult, PlatformError> {
        let identifier = credentials.require("identifier")?;
        let password = credentials.require("app_password")?;

        let session = create_session(&self.client, &self.pds, identifier, password).await?;
        Ok(ValidationResult::valid_with(DerivedFields {
            did: Some(session.did),
            handle: Some(session.handle),
            ..Default::default()
        }))
    }
}

#[async_trait]
impl CredentialValidator for BlueskyValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        settle(self.check(credentials).await)
    }
}
