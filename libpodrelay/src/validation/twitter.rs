//! X (Twitter) credential check
//!
//! The v2 API has no free endpoint to verify OAuth 1.0a user tokens, so this
//! is structural: all four values present and plausibly long.

use async_trait::async_trait;

use super::CredentialValidator;
use crate::credentials::ResolvedCredentials;
use crate::error::Result;
use crate::types::ValidationResult;

const REQUIRED: [&str; 4] = ["api_key", "api_secret", "access_token", "access_token_secret"];
const MIN_LENGTH: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct TwitterValidator;

#[async_trait]
impl CredentialValidator for TwitterValidator {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
        for name in REQUIRED {
            match credentials.get(name) {
                None => return Ok(ValidationResult::invalid(format!("Missing {}", name))),
                Some(value) if value.trim().len() < MIN_LENGTH => {
                    return Ok(ValidationResult::invalid(format!(
                        "{} looks too short (expected at least {} characters)",
                        name, MIN_LENGTH
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(ValidationResult::valid())
    }
}
