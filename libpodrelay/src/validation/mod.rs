//! Credential validation
//!
//! A validator answers "would these credentials work?" for one platform.
//! Expected failures (a missing field, the platform rejecting a token) come
//! back as `Ok(ValidationResult { valid: false, .. })`; only failures to
//! reach the platform at all are `Err`. Validation is never retried.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::credentials::{CredentialStore, ResolvedCredentials};
use crate::error::{PlatformError, Result};
use crate::types::{Level, PlatformId, ValidationResult};

pub mod bluesky;
pub mod facebook;
pub mod linkedin;
pub mod meta;
pub mod spotify;
pub mod structural;
pub mod twitter;
pub mod youtube;

pub use bluesky::BlueskyValidator;
pub use facebook::FacebookValidator;
pub use linkedin::LinkedInValidator;
pub use meta::MetaProfileValidator;
pub use spotify::SpotifyValidator;
pub use structural::{ManualTargetValidator, RumbleValidator};
pub use twitter::TwitterValidator;
pub use youtube::YouTubeValidator;

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult>;
}

/// Fold a platform answer into the validation contract
///
/// Network failures and timeouts propagate; everything else the platform
/// said becomes an invalid result carrying its message.
pub fn settle(outcome: std::result::Result<ValidationResult, PlatformError>) -> Result<ValidationResult> {
    match outcome {
        Ok(result) => Ok(result),
        Err(e @ (PlatformError::Network(_) | PlatformError::Timeout(_))) => Err(e.into()),
        Err(e) => Ok(ValidationResult::invalid(e.to_string())),
    }
}

/// Validate an edited credential set and persist it only if it passes
///
/// `incoming` may contain mask markers; they resolve to the stored values
/// first. On success the derived fields (long-lived tokens, URNs, ids) are
/// merged in and the record is saved as validated. On failure nothing is
/// written.
pub async fn validate_and_store(
    store: &CredentialStore,
    validator: &dyn CredentialValidator,
    level: Level,
    platform: PlatformId,
    incoming: BTreeMap<String, String>,
    enabled: Option<bool>,
) -> Result<ValidationResult> {
    let mut fields = store.unmask(level, platform, incoming).await?;
    let resolved = store.resolve_with(level, platform, &fields).await?;

    let missing = resolved.missing();
    if !missing.is_empty() {
        return Ok(ValidationResult::invalid(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let result = validator.validate(&resolved).await?;
    if !result.valid {
        tracing::info!(
            "{} credentials rejected: {}",
            platform,
            result.error.as_deref().unwrap_or("unknown reason")
        );
        return Ok(result);
    }

    fields.extend(result.derived.clone().into_field_updates(platform));
    store.save(level, platform, fields, enabled, true).await?;
    tracing::info!("{} credentials validated and saved", platform);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MASK_MARKER;
    use crate::db::MemoryStore;
    use crate::types::DerivedFields;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedValidator {
        result: std::result::Result<ValidationResult, PlatformError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialValidator for FixedValidator {
        async fn validate(&self, _credentials: &ResolvedCredentials) -> Result<ValidationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            settle(self.result.clone())
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_settle_propagates_network_only() {
        assert!(settle(Err(PlatformError::Network("reset".into()))).is_err());
        assert!(settle(Err(PlatformError::Timeout("slow".into()))).is_err());

        let invalid = settle(Err(PlatformError::Authentication("bad token".into()))).unwrap();
        assert!(!invalid.valid);
        assert!(invalid.error.unwrap().contains("bad token"));
    }

    #[tokio::test]
    async fn test_success_saves_derived_fields() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        let validator = FixedValidator {
            result: Ok(ValidationResult::valid_with(DerivedFields {
                person_urn: Some("urn:li:person:abc".into()),
                ..Default::default()
            })),
            calls: AtomicUsize::new(0),
        };

        let result = validate_and_store(
            &store,
            &validator,
            Level::Target,
            PlatformId::LinkedIn,
            fields(&[("access_token", "AQV-token")]),
            Some(true),
        )
        .await
        .unwrap();
        assert!(result.valid);

        let record = store
            .get(Level::Target, PlatformId::LinkedIn)
            .await
            .unwrap()
            .unwrap();
        assert!(record.validated);
        assert!(record.enabled);
        assert_eq!(record.fields["person_urn"], "urn:li:person:abc");
        assert_eq!(record.fields["access_token"], "AQV-token");
    }

    #[tokio::test]
    async fn test_failure_saves_nothing() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        store
            .save(
                Level::Target,
                PlatformId::Threads,
                fields(&[("access_token", "old-good")]),
                Some(true),
                true,
            )
            .await
            .unwrap();

        let validator = FixedValidator {
            result: Ok(ValidationResult::invalid("Session has expired")),
            calls: AtomicUsize::new(0),
        };
        let result = validate_and_store(
            &store,
            &validator,
            Level::Target,
            PlatformId::Threads,
            fields(&[("access_token", "new-bad")]),
            None,
        )
        .await
        .unwrap();
        assert!(!result.valid);

        let record = store
            .get(Level::Target, PlatformId::Threads)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.fields["access_token"], "old-good");
        assert!(record.validated);
    }

    #[tokio::test]
    async fn test_masked_values_are_validated_as_stored() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        store
            .save(
                Level::Target,
                PlatformId::Bluesky,
                fields(&[("identifier", "show.bsky.social"), ("app_password", "real-pass")]),
                None,
                false,
            )
            .await
            .unwrap();

        struct ExpectPassword;
        #[async_trait]
        impl CredentialValidator for ExpectPassword {
            async fn validate(&self, credentials: &ResolvedCredentials) -> Result<ValidationResult> {
                if credentials.get("app_password") == Some("real-pass") {
                    Ok(ValidationResult::valid())
                } else {
                    Ok(ValidationResult::invalid("marker leaked to validator"))
                }
            }
        }

        let result = validate_and_store(
            &store,
            &ExpectPassword,
            Level::Target,
            PlatformId::Bluesky,
            fields(&[("identifier", "show.bsky.social"), ("app_password", MASK_MARKER)]),
            None,
        )
        .await
        .unwrap();
        assert!(result.valid, "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_missing_fields_short_circuit() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        let validator = FixedValidator {
            result: Ok(ValidationResult::valid()),
            calls: AtomicUsize::new(0),
        };

        let result = validate_and_store(
            &store,
            &validator,
            Level::Target,
            PlatformId::Facebook,
            fields(&[("page_id", "123")]),
            None,
        )
        .await
        .unwrap();

        assert!(!result.valid);
        assert!(result.error.unwrap().contains("access_token"));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }
}
