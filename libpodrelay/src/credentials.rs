//! Platform credential storage for Podrelay
//!
//! Credentials are stored per `(level, platform)` as a [`PlatformCredential`]
//! record in the key-value store. Every field name is checked against the
//! platform's schema on the way in, so nothing downstream ever sees a field
//! the platform does not define.
//!
//! # Masking
//!
//! Read surfaces use [`CredentialStore::view`], which replaces every secret
//! value with [`MASK_MARKER`]. When an edited view is saved back, any field
//! still holding the marker resolves to the value already stored, so an
//! operator can change one field without re-entering the others.
//!
//! # Resolution
//!
//! The effective value of a field is the stored value when non-empty, else
//! the environment variable `PODRELAY_<PLATFORM>_<FIELD>` (see
//! [`PlatformId::env_var`]). Posters and validators only ever receive
//! [`ResolvedCredentials`], which keep values in [`SecretString`]s.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use libpodrelay::credentials::CredentialStore;
//! use libpodrelay::db::MemoryStore;
//! use libpodrelay::types::{Level, PlatformId};
//!
//! # async fn example() -> libpodrelay::Result<()> {
//! let store = CredentialStore::new(Arc::new(MemoryStore::new()));
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("identifier".to_string(), "show.bsky.social".to_string());
//! fields.insert("app_password".to_string(), "abcd-efgh-ijkl-mnop".to_string());
//! store.save(Level::Target, PlatformId::Bluesky, fields, Some(true), false).await?;
//!
//! assert!(store.is_configured(Level::Target, PlatformId::Bluesky).await?);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{get_json, update_json, KvStore};
use crate::error::{CredentialError, PlatformError, Result};
use crate::types::{Level, PlatformCredential, PlatformId};

/// Displayed in place of a secret value that is set
pub const MASK_MARKER: &str = "••••••••";

fn namespace(level: Level) -> &'static str {
    match level {
        Level::Source => "credentials.l1",
        Level::Target => "credentials.l2",
    }
}

fn check_level(level: Level, platform: PlatformId) -> Result<()> {
    if platform.level() != level {
        return Err(CredentialError::WrongLevel {
            platform: platform.to_string(),
            level: level.number(),
        }
        .into());
    }
    Ok(())
}

fn check_fields(platform: PlatformId, fields: &BTreeMap<String, String>) -> Result<()> {
    for name in fields.keys() {
        if platform.field(name).is_none() {
            return Err(CredentialError::UnknownField {
                platform: platform.to_string(),
                field: name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Replace mask markers in `incoming` with the values in `stored`
///
/// A marker with nothing stored behind it (the value came from the
/// environment) is dropped rather than persisted.
pub fn unmask_fields(
    stored: &BTreeMap<String, String>,
    incoming: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    incoming
        .into_iter()
        .filter_map(|(name, value)| {
            if value == MASK_MARKER {
                stored.get(&name).map(|prior| (name, prior.clone()))
            } else {
                Some((name, value))
            }
        })
        .collect()
}

/// Masked, display-safe rendering of a credential record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialView {
    pub level: Level,
    pub platform: PlatformId,
    /// Every schema field, in schema order of the platform
    pub fields: BTreeMap<String, String>,
    pub enabled: bool,
    pub validated: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub configured: bool,
}

/// Effective credential values handed to validators and posters
pub struct ResolvedCredentials {
    platform: PlatformId,
    values: BTreeMap<String, SecretString>,
}

impl ResolvedCredentials {
    pub fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            values: BTreeMap::new(),
        }
    }

    /// Build from literal pairs; empty values are ignored
    pub fn from_pairs<'a>(
        platform: PlatformId,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut resolved = Self::new(platform);
        for (name, value) in pairs {
            resolved.insert(name, value.to_string());
        }
        resolved
    }

    fn insert(&mut self, name: &str, value: String) {
        if !value.is_empty() {
            self.values
                .insert(name.to_string(), SecretString::from(value));
        }
    }

    pub fn platform(&self) -> PlatformId {
        self.platform
    }

    /// Layer freshly learned values over the resolved ones
    pub fn with_fields(mut self, fields: &BTreeMap<String, String>) -> Self {
        for (name, value) in fields {
            self.insert(name, value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|v| v.expose_secret())
    }

    /// A field the caller cannot proceed without
    pub fn require(&self, name: &str) -> std::result::Result<&str, PlatformError> {
        self.get(name).ok_or_else(|| {
            PlatformError::MissingCredential(format!("{}.{}", self.platform, name))
        })
    }

    /// Names of the required fields without a value, for the first
    /// requirement set that is closest to complete
    pub fn missing(&self) -> Vec<&'static str> {
        self.platform
            .requirement_sets()
            .iter()
            .map(|set| {
                set.iter()
                    .copied()
                    .filter(|name| self.get(name).is_none())
                    .collect::<Vec<_>>()
            })
            .min_by_key(|missing| missing.len())
            .unwrap_or_default()
    }

    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("platform", &self.platform)
            .field("fields", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Credential records backed by a [`KvStore`]
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The raw stored record, secrets included
    pub async fn get(
        &self,
        level: Level,
        platform: PlatformId,
    ) -> Result<Option<PlatformCredential>> {
        check_level(level, platform)?;
        get_json(self.kv.as_ref(), namespace(level), platform.as_str()).await
    }

    /// Masked rendering for display
    pub async fn view(&self, level: Level, platform: PlatformId) -> Result<CredentialView> {
        let record = self
            .get(level, platform)
            .await?
            .unwrap_or_else(|| PlatformCredential::empty(platform));
        let resolved = resolve_record(&record, &BTreeMap::new());

        let fields = platform
            .fields()
            .iter()
            .map(|spec| {
                let value = resolved.get(spec.name).unwrap_or_default();
                let shown = if spec.secret && !value.is_empty() {
                    MASK_MARKER.to_string()
                } else {
                    value.to_string()
                };
                (spec.name.to_string(), shown)
            })
            .collect();

        Ok(CredentialView {
            level,
            platform,
            fields,
            enabled: record.enabled,
            validated: record.validated,
            validated_at: record.validated_at,
            configured: resolved.is_configured(),
        })
    }

    /// Substitute mask markers with the stored values
    pub async fn unmask(
        &self,
        level: Level,
        platform: PlatformId,
        incoming: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        check_fields(platform, &incoming)?;
        let stored = self
            .get(level, platform)
            .await?
            .map(|r| r.fields)
            .unwrap_or_default();
        Ok(unmask_fields(&stored, incoming))
    }

    /// Merge `fields` over the stored record
    ///
    /// Fields absent from `fields` keep their stored value; an empty string
    /// clears a field. `enabled: None` keeps the stored flag. `validated`
    /// replaces the stored flag and stamps `validated_at` when true.
    pub async fn save(
        &self,
        level: Level,
        platform: PlatformId,
        fields: BTreeMap<String, String>,
        enabled: Option<bool>,
        validated: bool,
    ) -> Result<PlatformCredential> {
        check_level(level, platform)?;
        check_fields(platform, &fields)?;

        let saved = update_json(
            self.kv.as_ref(),
            namespace(level),
            platform.as_str(),
            |current: Option<PlatformCredential>| {
                let mut record = current.unwrap_or_else(|| PlatformCredential::empty(platform));
                let incoming = unmask_fields(&record.fields, fields.clone());
                merge_into(&mut record.fields, incoming);
                if let Some(enabled) = enabled {
                    record.enabled = enabled;
                }
                record.validated = validated;
                record.validated_at = if validated { Some(Utc::now()) } else { None };
                Ok(record)
            },
        )
        .await?;

        tracing::debug!(
            "Saved {} credentials for {} (validated: {})",
            level,
            platform,
            validated
        );
        Ok(saved)
    }

    /// Persist values learned while posting without touching the flags
    pub async fn merge_fields(
        &self,
        level: Level,
        platform: PlatformId,
        fields: BTreeMap<String, String>,
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        check_level(level, platform)?;
        check_fields(platform, &fields)?;

        update_json(
            self.kv.as_ref(),
            namespace(level),
            platform.as_str(),
            |current: Option<PlatformCredential>| {
                let mut record = current.unwrap_or_else(|| PlatformCredential::empty(platform));
                merge_into(&mut record.fields, fields.clone());
                Ok(record)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn set_enabled(&self, level: Level, platform: PlatformId, enabled: bool) -> Result<()> {
        check_level(level, platform)?;
        update_json(
            self.kv.as_ref(),
            namespace(level),
            platform.as_str(),
            |current: Option<PlatformCredential>| {
                let mut record = current.unwrap_or_else(|| PlatformCredential::empty(platform));
                record.enabled = enabled;
                Ok(record)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn delete(&self, level: Level, platform: PlatformId) -> Result<bool> {
        check_level(level, platform)?;
        self.kv.delete(namespace(level), platform.as_str()).await
    }

    /// Effective values: stored, else environment
    pub async fn resolve(&self, level: Level, platform: PlatformId) -> Result<ResolvedCredentials> {
        self.resolve_with(level, platform, &BTreeMap::new()).await
    }

    /// Effective values with `overrides` (already unmasked) taking precedence
    /// over the stored record
    pub async fn resolve_with(
        &self,
        level: Level,
        platform: PlatformId,
        overrides: &BTreeMap<String, String>,
    ) -> Result<ResolvedCredentials> {
        check_fields(platform, overrides)?;
        let record = self
            .get(level, platform)
            .await?
            .unwrap_or_else(|| PlatformCredential::empty(platform));
        Ok(resolve_record(&record, overrides))
    }

    pub async fn is_configured(&self, level: Level, platform: PlatformId) -> Result<bool> {
        Ok(self.resolve(level, platform).await?.is_configured())
    }

    /// Every stored record at a level, in platform order
    pub async fn list(&self, level: Level) -> Result<Vec<PlatformCredential>> {
        let mut records = Vec::new();
        for key in self.kv.keys(namespace(level)).await? {
            let platform = match key.parse::<PlatformId>() {
                Ok(platform) if platform.level() == level => platform,
                _ => {
                    tracing::warn!("Ignoring unknown credential record '{}'", key);
                    continue;
                }
            };
            if let Some(record) =
                get_json::<PlatformCredential>(self.kv.as_ref(), namespace(level), platform.as_str())
                    .await?
            {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.platform);
        Ok(records)
    }
}

fn merge_into(target: &mut BTreeMap<String, String>, updates: BTreeMap<String, String>) {
    for (name, value) in updates {
        if value.is_empty() {
            target.remove(&name);
        } else {
            target.insert(name, value);
        }
    }
}

fn resolve_record(
    record: &PlatformCredential,
    overrides: &BTreeMap<String, String>,
) -> ResolvedCredentials {
    let platform = record.platform;
    let mut resolved = ResolvedCredentials::new(platform);

    for spec in platform.fields() {
        let value = overrides
            .get(spec.name)
            .filter(|v| !v.is_empty() && v.as_str() != MASK_MARKER)
            .or_else(|| record.fields.get(spec.name).filter(|v| !v.is_empty()))
            .cloned()
            .or_else(|| {
                std::env::var(platform.env_var(spec.name))
                    .ok()
                    .filter(|v| !v.is_empty())
            });
        if let Some(value) = value {
            resolved.insert(spec.name, value);
        }
    }

    resolved
}
