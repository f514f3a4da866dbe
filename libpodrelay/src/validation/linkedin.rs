//! LinkedIn credential check

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{settle, CredentialValidator};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::platforms::linkedin::{fetch_person_urn, SCOPE_HINT};
use crate::types::{DerivedFields, PlatformId, ValidationResult};

#[derive(Debug, Deserialize)]
struct OrganizationAcls {
    #[serde(default)]
    elements: Vec<OrganizationAcl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationAcl {
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    organization_target: Option<String>,
}

pub struct LinkedInValidator {
    client: Client,
    base: String,
}

impl LinkedInValidator {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.linkedin.trim_end_matches('/').to_string(),
        }
    }

    async fn check(
        &self,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<ValidationResult, PlatformError> {
        let token = credentials.require("access_token")?;
        let person_urn = fetch_person_urn(&self.client, &self.base, token)
            .await
            .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;

        if let Some(org_urn) = credentials.get("organization_urn") {
            if !self.is_org_admin(token, org_urn).await? {
                return Ok(ValidationResult::invalid(format!(
                    "The token has no administrator access to {}. {}",
                    org_urn, SCOPE_HINT
                )));
            }
        }

        Ok(ValidationResult::valid_with(DerivedFields {
            person_urn: Some(person_urn),
            ..Default::default()
        }))
    }

    async fn is_org_admin(
        &self,
        token: &str,
        org_urn: &str,
    ) -> std::result::Result<bool, PlatformError> {
        let acls = http::send_json::<OrganizationAcls>(
            PlatformId::LinkedIn,
            "organization access check",
            self.client
                .get(format!("{}/v2/organizationAcls", self.base))
                .bearer_auth(token)
                .query(&[("q", "roleAssignee"), ("role", "ADMINISTRATOR")]),
        )
        .await;

        match acls {
            Ok(acls) => {
                let listed = acls.elements.iter().any(|acl| {
                    acl.organization.as_deref() == Some(org_urn)
                        || acl.organization_target.as_deref() == Some(org_urn)
                });
                if listed {
                    return Ok(true);
                }
            }
            Err(e @ (PlatformError::Network(_) | PlatformError::Timeout(_))) => return Err(e),
            Err(e) => tracing::debug!("organizationAcls lookup failed: {}", e),
        }

        // Tokens without r_organization_admin can still read the organization
        let org_id = org_urn.rsplit(':').next().unwrap_or(org_urn);
        let response = http::send(
            PlatformId::LinkedIn,
            "organization lookup",
            self.client
                .get(format!("{}/v2/organizations/{}", self.base, org_id))
                .bearer_auth(token),
        )
        .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl CredentialValidator for LinkedInValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        settle(self.check(credentials).await)
    }
}
