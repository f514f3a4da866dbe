//! Shared setup for the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use libpodrelay::config::ApiEndpoints;
use libpodrelay::db::MemoryStore;
use libpodrelay::notify::RecordingNotifier;
use libpodrelay::registry::{default_registry, PlatformRegistry, RegistryDeps};
use libpodrelay::service::{PodrelayService, ServiceParts};
use libpodrelay::source::StaticSource;
use libpodrelay::storage::MemoryStorage;
use libpodrelay::{Config, CredentialStore, Episode, PlatformId};

pub const ALERT_EMAIL: &str = "host@example.com";

/// Serve `app` on an ephemeral port; returns its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Fast retries and an email alert recipient
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.automation.retry_base_delay = "1ms".to_string();
    config.alerts.email = Some(ALERT_EMAIL.to_string());
    config
}

pub fn registry_at(base: &str, notifier: Arc<RecordingNotifier>) -> PlatformRegistry {
    default_registry(&RegistryDeps {
        client: reqwest::Client::new(),
        endpoints: ApiEndpoints::all_at(base),
        storage: Arc::new(MemoryStorage::new("https://cdn.test")),
        notifier,
    })
}

pub struct Harness {
    pub service: PodrelayService,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    /// Service over an in-memory store with the given registry and episodes
    pub fn new(
        config: Config,
        registry: PlatformRegistry,
        notifier: Arc<RecordingNotifier>,
        episodes: Vec<Episode>,
    ) -> Self {
        let service = PodrelayService::assemble(
            config,
            ServiceParts {
                kv: Arc::new(MemoryStore::new()),
                registry,
                source: Arc::new(StaticSource::new(episodes)),
                notifier: notifier.clone(),
            },
        )
        .unwrap();
        Self { service, notifier }
    }

    pub fn credentials(&self) -> &CredentialStore {
        self.service.credentials()
    }

    /// Store minimal working credentials and enable the platform
    pub async fn configure(&self, platform: PlatformId) {
        self.credentials()
            .save(
                platform.level(),
                platform,
                fields(minimal_fields(platform)),
                Some(true),
                true,
            )
            .await
            .unwrap();
    }
}

pub fn minimal_fields(platform: PlatformId) -> &'static [(&'static str, &'static str)] {
    match platform {
        PlatformId::YouTube => &[("api_key", "yt-key-0123456789"), ("channel_id", "UC123")],
        PlatformId::Spotify => &[("rss_url", "https://anchor.fm/s/show/podcast/rss")],
        PlatformId::Rumble => &[("channel_url", "https://rumble.com/c/show")],
        PlatformId::Twitter | PlatformId::Twitter2 => &[
            ("api_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("api_secret", "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"),
            ("access_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("access_token_secret", "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
        ],
        PlatformId::Facebook | PlatformId::Facebook2 => {
            &[("page_id", "1234"), ("access_token", "EAAB-page-token")]
        }
        PlatformId::LinkedIn | PlatformId::Instagram | PlatformId::Threads => {
            &[("access_token", "token-0123456789")]
        }
        PlatformId::Bluesky => &[
            ("identifier", "show.bsky.social"),
            ("app_password", "abcd-efgh-ijkl-mnop"),
        ],
        PlatformId::TikTok | PlatformId::Odysee | PlatformId::Vimeo => {
            &[("notify_email", "host@example.com")]
        }
    }
}

pub fn episode(source: PlatformId, video_id: &str) -> Episode {
    Episode {
        source,
        video_id: video_id.to_string(),
        title: format!("Episode {}", video_id),
        description: "Show notes".to_string(),
        url: format!("https://example.com/watch/{}", video_id),
        thumbnail_url: None,
        published_at: None,
    }
}
