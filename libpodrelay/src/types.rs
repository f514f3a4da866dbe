//! Core types for Podrelay

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::CredentialError;

/// Credential level: content sources (1) or cross-posting targets (2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    Source,
    Target,
}

impl Level {
    pub fn number(self) -> u8 {
        match self {
            Level::Source => 1,
            Level::Target => 2,
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.number()
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::Source),
            2 => Ok(Level::Target),
            other => Err(format!("credential level must be 1 or 2, got {}", other)),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// One credential field of a platform's schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Masked on read when true
    pub secret: bool,
}

const fn secret(name: &'static str) -> FieldSpec {
    FieldSpec { name, secret: true }
}

const fn plain(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        secret: false,
    }
}

const TWITTER_FIELDS: &[FieldSpec] = &[
    secret("api_key"),
    secret("api_secret"),
    secret("access_token"),
    secret("access_token_secret"),
    plain("hashtag"),
];
const FACEBOOK_FIELDS: &[FieldSpec] = &[
    plain("page_id"),
    secret("access_token"),
    plain("app_id"),
    secret("app_secret"),
    plain("page_name"),
    plain("token_expiry"),
];
const LINKEDIN_FIELDS: &[FieldSpec] = &[
    secret("access_token"),
    plain("person_urn"),
    plain("organization_urn"),
];
const INSTAGRAM_FIELDS: &[FieldSpec] = &[
    secret("access_token"),
    plain("business_account_id"),
    plain("user_id"),
    plain("username"),
];
const THREADS_FIELDS: &[FieldSpec] = &[
    secret("access_token"),
    plain("user_id"),
    plain("username"),
];
const BLUESKY_FIELDS: &[FieldSpec] = &[
    plain("identifier"),
    secret("app_password"),
    plain("did"),
    plain("handle"),
];
const MANUAL_FIELDS: &[FieldSpec] = &[
    plain("notify_email"),
    plain("notify_phone"),
    plain("profile_url"),
];
const YOUTUBE_FIELDS: &[FieldSpec] = &[secret("api_key"), plain("channel_id")];
const SPOTIFY_FIELDS: &[FieldSpec] = &[
    plain("client_id"),
    secret("client_secret"),
    plain("show_id"),
    plain("rss_url"),
];
const RUMBLE_FIELDS: &[FieldSpec] = &[plain("channel_url"), plain("channel_id"), plain("rss_url")];

/// Every platform Podrelay knows about
///
/// The declaration order is the order targets are attempted in a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    // Level 1
    YouTube,
    Spotify,
    Rumble,
    // Level 2
    Twitter,
    Twitter2,
    Facebook,
    Facebook2,
    LinkedIn,
    Instagram,
    Threads,
    Bluesky,
    TikTok,
    Odysee,
    Vimeo,
}

impl PlatformId {
    pub const ALL: [PlatformId; 14] = [
        PlatformId::YouTube,
        PlatformId::Spotify,
        PlatformId::Rumble,
        PlatformId::Twitter,
        PlatformId::Twitter2,
        PlatformId::Facebook,
        PlatformId::Facebook2,
        PlatformId::LinkedIn,
        PlatformId::Instagram,
        PlatformId::Threads,
        PlatformId::Bluesky,
        PlatformId::TikTok,
        PlatformId::Odysee,
        PlatformId::Vimeo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformId::YouTube => "youtube",
            PlatformId::Spotify => "spotify",
            PlatformId::Rumble => "rumble",
            PlatformId::Twitter => "twitter",
            PlatformId::Twitter2 => "twitter2",
            PlatformId::Facebook => "facebook",
            PlatformId::Facebook2 => "facebook2",
            PlatformId::LinkedIn => "linkedin",
            PlatformId::Instagram => "instagram",
            PlatformId::Threads => "threads",
            PlatformId::Bluesky => "bluesky",
            PlatformId::TikTok => "tiktok",
            PlatformId::Odysee => "odysee",
            PlatformId::Vimeo => "vimeo",
        }
    }

    /// Human-facing name used in notifications and logs
    pub fn display_name(self) -> &'static str {
        match self {
            PlatformId::YouTube => "YouTube",
            PlatformId::Spotify => "Spotify",
            PlatformId::Rumble => "Rumble",
            PlatformId::Twitter => "X (account 1)",
            PlatformId::Twitter2 => "X (account 2)",
            PlatformId::Facebook => "Facebook (page 1)",
            PlatformId::Facebook2 => "Facebook (page 2)",
            PlatformId::LinkedIn => "LinkedIn",
            PlatformId::Instagram => "Instagram",
            PlatformId::Threads => "Threads",
            PlatformId::Bluesky => "Bluesky",
            PlatformId::TikTok => "TikTok",
            PlatformId::Odysee => "Odysee",
            PlatformId::Vimeo => "Vimeo",
        }
    }

    pub fn level(self) -> Level {
        match self {
            PlatformId::YouTube | PlatformId::Spotify | PlatformId::Rumble => Level::Source,
            _ => Level::Target,
        }
    }

    pub fn platforms_at(level: Level) -> impl Iterator<Item = PlatformId> {
        Self::ALL.into_iter().filter(move |p| p.level() == level)
    }

    /// The credential fields this platform accepts
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            PlatformId::YouTube => YOUTUBE_FIELDS,
            PlatformId::Spotify => SPOTIFY_FIELDS,
            PlatformId::Rumble => RUMBLE_FIELDS,
            PlatformId::Twitter | PlatformId::Twitter2 => TWITTER_FIELDS,
            PlatformId::Facebook | PlatformId::Facebook2 => FACEBOOK_FIELDS,
            PlatformId::LinkedIn => LINKEDIN_FIELDS,
            PlatformId::Instagram => INSTAGRAM_FIELDS,
            PlatformId::Threads => THREADS_FIELDS,
            PlatformId::Bluesky => BLUESKY_FIELDS,
            PlatformId::TikTok | PlatformId::Odysee | PlatformId::Vimeo => MANUAL_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<FieldSpec> {
        self.fields().iter().copied().find(|f| f.name == name)
    }

    /// Alternative sets of fields; the platform is configured when every
    /// field of at least one set resolves to a non-empty value.
    pub fn requirement_sets(self) -> &'static [&'static [&'static str]] {
        match self {
            PlatformId::YouTube => &[&["api_key", "channel_id"]],
            PlatformId::Spotify => &[&["client_id", "client_secret", "show_id"], &["rss_url"]],
            PlatformId::Rumble => &[&["channel_url"], &["rss_url"]],
            PlatformId::Twitter | PlatformId::Twitter2 => &[&[
                "api_key",
                "api_secret",
                "access_token",
                "access_token_secret",
            ]],
            PlatformId::Facebook | PlatformId::Facebook2 => &[&["page_id", "access_token"]],
            PlatformId::LinkedIn | PlatformId::Instagram | PlatformId::Threads => {
                &[&["access_token"]]
            }
            PlatformId::Bluesky => &[&["identifier", "app_password"]],
            PlatformId::TikTok | PlatformId::Odysee | PlatformId::Vimeo => {
                &[&["notify_email"], &["notify_phone"]]
            }
        }
    }

    /// Environment variable consulted when a field has no stored value
    pub fn env_var(self, field: &str) -> String {
        format!(
            "PODRELAY_{}_{}",
            self.as_str().to_uppercase(),
            field.to_uppercase()
        )
    }

    /// Targets without a programmatic text-post API
    pub fn is_manual_only(self) -> bool {
        matches!(
            self,
            PlatformId::TikTok | PlatformId::Odysee | PlatformId::Vimeo
        )
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        let alias = match wanted.as_str() {
            "x" => "twitter",
            "x2" => "twitter2",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == alias)
            .ok_or_else(|| CredentialError::UnknownPlatform(s.to_string()))
    }
}

/// Stored credential record for one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub level: Level,
    pub platform: PlatformId,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
}

impl PlatformCredential {
    pub fn empty(platform: PlatformId) -> Self {
        Self {
            level: platform.level(),
            platform,
            fields: BTreeMap::new(),
            enabled: false,
            validated: false,
            validated_at: None,
        }
    }
}

/// Values learned from a platform while validating or posting
///
/// On success these are written back into the platform's credential record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub person_urn: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub long_lived_token: Option<String>,
    pub token_expiry: Option<String>,
    pub did: Option<String>,
    pub handle: Option<String>,
    pub page_name: Option<String>,
}

impl DerivedFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Map learned values onto the platform's credential field names
    pub fn into_field_updates(self, platform: PlatformId) -> BTreeMap<String, String> {
        let mut updates = BTreeMap::new();
        let mut put = |name: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                if platform.field(name).is_some() {
                    updates.insert(name.to_string(), value);
                }
            }
        };
        put("person_urn", self.person_urn);
        put("user_id", self.user_id);
        put("username", self.username);
        put("access_token", self.long_lived_token);
        put("token_expiry", self.token_expiry);
        put("did", self.did);
        put("handle", self.handle);
        put("page_name", self.page_name);
        updates
    }
}

/// Outcome of checking a credential set against its platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub derived: DerivedFields,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn valid_with(derived: DerivedFields) -> Self {
        Self {
            valid: true,
            error: None,
            derived,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            derived: DerivedFields::default(),
        }
    }
}

/// Last posting outcome for a platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostResult {
    pub success: bool,
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PostResult {
    pub fn succeeded(post_id: Option<String>, post_url: Option<String>) -> Self {
        Self {
            success: true,
            post_id,
            post_url,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            post_id: None,
            post_url: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedVideoRecord {
    pub video_id: String,
    pub posted_at: DateTime<Utc>,
}

/// A published episode as reported by a content source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub source: PlatformId,
    /// Source-specific id used for deduplication
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Platform-neutral content handed to a poster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContent {
    pub title: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub description: String,
}

impl From<&Episode> for PostContent {
    fn from(episode: &Episode) -> Self {
        Self {
            title: episode.title.clone(),
            url: episode.url.clone(),
            thumbnail_url: episode.thumbnail_url.clone(),
            description: episode.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    Check,
    PostLatest,
    Manual,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl LogEntry {
    pub fn new(log_type: LogType, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            log_type,
            level,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// All log entries for one UTC calendar day, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub date: NaiveDate,
    pub entries: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_id_round_trips_through_str() {
        for platform in PlatformId::ALL {
            assert_eq!(platform.as_str().parse::<PlatformId>().unwrap(), platform);
        }
        assert_eq!("X".parse::<PlatformId>().unwrap(), PlatformId::Twitter);
        assert!("myspace".parse::<PlatformId>().is_err());
    }

    #[test]
    fn test_levels() {
        let sources: Vec<_> = PlatformId::platforms_at(Level::Source).collect();
        assert_eq!(
            sources,
            vec![PlatformId::YouTube, PlatformId::Spotify, PlatformId::Rumble]
        );
        assert_eq!(PlatformId::platforms_at(Level::Target).count(), 11);
    }

    #[test]
    fn test_level_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Level::Target).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Level>("1").unwrap(), Level::Source);
        assert!(serde_json::from_str::<Level>("3").is_err());
    }

    #[test]
    fn test_requirement_sets_reference_schema_fields() {
        for platform in PlatformId::ALL {
            for set in platform.requirement_sets() {
                for name in *set {
                    assert!(
                        platform.field(name).is_some(),
                        "{} requires unknown field {}",
                        platform,
                        name
                    );
                }
            }
        }
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(
            PlatformId::Twitter2.env_var("api_key"),
            "PODRELAY_TWITTER2_API_KEY"
        );
    }

    #[test]
    fn test_derived_fields_map_to_schema() {
        let derived = DerivedFields {
            long_lived_token: Some("EAAlong".to_string()),
            token_expiry: Some("never".to_string()),
            did: Some("did:plc:abc".to_string()),
            ..Default::default()
        };
        let updates = derived.into_field_updates(PlatformId::Facebook);
        assert_eq!(updates.get("access_token").unwrap(), "EAAlong");
        assert_eq!(updates.get("token_expiry").unwrap(), "never");
        // Facebook has no "did" field
        assert!(!updates.contains_key("did"));
    }

    #[test]
    fn test_log_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&LogType::PostLatest).unwrap(),
            "\"post-latest\""
        );
        let entry = LogEntry::new(LogType::Check, LogLevel::Success, "ok");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "check");
        assert_eq!(json["level"], "success");
    }
}
