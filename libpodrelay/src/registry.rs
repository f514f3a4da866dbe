//! Platform registry
//!
//! Maps every [`PlatformId`] to what Podrelay can do with it: a validator
//! always, a poster for level 2 targets. Iteration follows [`PlatformId`]
//! declaration order, which is the order targets are attempted in a run.

use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ApiEndpoints;
use crate::notify::Notifier;
use crate::platforms::bluesky::BlueskyPoster;
use crate::platforms::facebook::FacebookPoster;
use crate::platforms::instagram::InstagramPoster;
use crate::platforms::linkedin::LinkedInPoster;
use crate::platforms::manual::ManualPoster;
use crate::platforms::threads::ThreadsPoster;
use crate::platforms::twitter::TwitterPoster;
use crate::platforms::PlatformPoster;
use crate::storage::ObjectStorage;
use crate::types::PlatformId;
use crate::validation::{
    BlueskyValidator, CredentialValidator, FacebookValidator, LinkedInValidator,
    ManualTargetValidator, MetaProfileValidator, RumbleValidator, SpotifyValidator,
    TwitterValidator, YouTubeValidator,
};

#[derive(Clone)]
pub struct Capability {
    pub validator: Arc<dyn CredentialValidator>,
    /// `None` for level 1 sources
    pub poster: Option<Arc<dyn PlatformPoster>>,
}

#[derive(Clone, Default)]
pub struct PlatformRegistry {
    entries: BTreeMap<PlatformId, Capability>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a platform
    pub fn register(
        &mut self,
        platform: PlatformId,
        validator: Arc<dyn CredentialValidator>,
        poster: Option<Arc<dyn PlatformPoster>>,
    ) -> &mut Self {
        self.entries.insert(platform, Capability { validator, poster });
        self
    }

    /// Swap the poster of an already registered platform
    pub fn set_poster(&mut self, platform: PlatformId, poster: Arc<dyn PlatformPoster>) -> &mut Self {
        match self.entries.get_mut(&platform) {
            Some(capability) => capability.poster = Some(poster),
            None => tracing::warn!("Cannot set poster for unregistered platform {}", platform),
        }
        self
    }

    pub fn get(&self, platform: PlatformId) -> Option<&Capability> {
        self.entries.get(&platform)
    }

    pub fn validator(&self, platform: PlatformId) -> Option<Arc<dyn CredentialValidator>> {
        self.entries.get(&platform).map(|c| c.validator.clone())
    }

    pub fn poster(&self, platform: PlatformId) -> Option<Arc<dyn PlatformPoster>> {
        self.entries.get(&platform).and_then(|c| c.poster.clone())
    }

    /// Platforms with a poster, in run order
    pub fn targets(&self) -> impl Iterator<Item = PlatformId> + '_ {
        self.entries
            .iter()
            .filter(|(_, c)| c.poster.is_some())
            .map(|(p, _)| *p)
    }

    pub fn platforms(&self) -> impl Iterator<Item = PlatformId> + '_ {
        self.entries.keys().copied()
    }
}

/// Collaborators the built-in adapters need
#[derive(Clone)]
pub struct RegistryDeps {
    pub client: Client,
    pub endpoints: ApiEndpoints,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn Notifier>,
}

/// Every built-in platform
pub fn default_registry(deps: &RegistryDeps) -> PlatformRegistry {
    let client = &deps.client;
    let endpoints = &deps.endpoints;
    let mut registry = PlatformRegistry::new();

    registry
        .register(
            PlatformId::YouTube,
            Arc::new(YouTubeValidator::new(client.clone(), endpoints)),
            None,
        )
        .register(
            PlatformId::Spotify,
            Arc::new(SpotifyValidator::new(client.clone(), endpoints)),
            None,
        )
        .register(PlatformId::Rumble, Arc::new(RumbleValidator), None);

    let twitter: Arc<dyn PlatformPoster> = Arc::new(TwitterPoster::new(client.clone(), endpoints));
    for platform in [PlatformId::Twitter, PlatformId::Twitter2] {
        registry.register(platform, Arc::new(TwitterValidator), Some(twitter.clone()));
    }

    let facebook_validator: Arc<dyn CredentialValidator> =
        Arc::new(FacebookValidator::new(client.clone(), endpoints));
    let facebook: Arc<dyn PlatformPoster> = Arc::new(FacebookPoster::new(client.clone(), endpoints));
    for platform in [PlatformId::Facebook, PlatformId::Facebook2] {
        registry.register(platform, facebook_validator.clone(), Some(facebook.clone()));
    }

    registry
        .register(
            PlatformId::LinkedIn,
            Arc::new(LinkedInValidator::new(client.clone(), endpoints)),
            Some(Arc::new(LinkedInPoster::new(client.clone(), endpoints))),
        )
        .register(
            PlatformId::Instagram,
            Arc::new(MetaProfileValidator::instagram(client.clone(), endpoints)),
            Some(Arc::new(InstagramPoster::new(
                client.clone(),
                endpoints,
                deps.storage.clone(),
            ))),
        )
        .register(
            PlatformId::Threads,
            Arc::new(MetaProfileValidator::threads(client.clone(), endpoints)),
            Some(Arc::new(ThreadsPoster::new(client.clone(), endpoints))),
        )
        .register(
            PlatformId::Bluesky,
            Arc::new(BlueskyValidator::new(client.clone(), endpoints)),
            Some(Arc::new(BlueskyPoster::new(client.clone(), endpoints))),
        );

    let manual: Arc<dyn PlatformPoster> = Arc::new(ManualPoster::new(deps.notifier.clone()));
    for platform in [PlatformId::TikTok, PlatformId::Odysee, PlatformId::Vimeo] {
        registry.register(platform, Arc::new(ManualTargetValidator), Some(manual.clone()));
    }

    registry
}
