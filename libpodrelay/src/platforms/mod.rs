//! Posting adapters
//!
//! Each adapter turns a [`PostContent`] into one post on one platform. They
//! are stateless: credentials arrive resolved on every call. Account ids a
//! post depends on (a LinkedIn person URN, a Threads user id) are looked up
//! by [`PlatformPoster::prepare`]; anything learned while posting (a Bluesky
//! DID) is handed back in [`PostOutcome::derived`]. The caller persists both.
//!
//! # Examples
//!
//! ```no_run
//! use libpodrelay::credentials::ResolvedCredentials;
//! use libpodrelay::platforms::{PlatformPoster, mock::MockPoster};
//! use libpodrelay::types::{PlatformId, PostContent};
//!
//! # async fn example() -> libpodrelay::Result<()> {
//! let poster = MockPoster::success();
//! let credentials = ResolvedCredentials::new(PlatformId::Threads);
//! let content = PostContent {
//!     title: "Episode 12".to_string(),
//!     url: "https://youtu.be/abc".to_string(),
//!     thumbnail_url: None,
//!     description: String::new(),
//! };
//! let outcome = poster.post(&credentials, &content).await?;
//! println!("posted as {:?}", outcome.post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::credentials::ResolvedCredentials;
use crate::error::Result;
use crate::types::{DerivedFields, PostContent};

pub mod bluesky;
pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod manual;
pub mod meta;
pub mod oauth1;
pub mod text;
pub mod threads;
pub mod twitter;

// Built outside cfg(test) so tests/ can register it
pub mod mock;

/// What a successful post produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostOutcome {
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    /// Values fetched while posting that belong in the credential record
    pub derived: DerivedFields,
}

impl PostOutcome {
    pub fn new(post_id: impl Into<String>, post_url: Option<String>) -> Self {
        Self {
            post_id: Some(post_id.into()),
            post_url,
            derived: DerivedFields::default(),
        }
    }

    pub fn with_derived(mut self, derived: DerivedFields) -> Self {
        self.derived = derived;
        self
    }
}

#[async_trait]
pub trait PlatformPoster: Send + Sync {
    /// Publish `content`
    ///
    /// # Errors
    ///
    /// - `PlatformError::MissingCredential` if a required field is absent
    /// - `PlatformError::Authentication` when the platform rejects the
    ///   credentials; the message carries a remediation hint when one is known
    /// - `PlatformError::Network` / `Timeout` when the platform is unreachable
    /// - `PlatformError::Posting` / `Validation` / `RateLimit` otherwise
    async fn post(&self, credentials: &ResolvedCredentials, content: &PostContent)
        -> Result<PostOutcome>;

    /// Account values a post needs that the record lacks (a user id, a
    /// person URN), looked up once before the first attempt
    ///
    /// The caller stores what comes back before posting, so a failed post
    /// does not repeat the lookup on the next run.
    async fn prepare(&self, _credentials: &ResolvedCredentials) -> Result<DerivedFields> {
        Ok(DerivedFields::default())
    }
}
