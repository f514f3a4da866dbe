//! Where new episodes come from
//!
//! A source answers one question: what is the latest episode published on
//! a level 1 platform? YouTube is asked through the Data API, Rumble through
//! its podcast RSS feed, and Spotify through its feed or, when only API
//! credentials are stored, the Web API.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;

use crate::config::{ApiEndpoints, Config, SourceKind};
use crate::credentials::CredentialStore;
use crate::error::{PlatformError, PodrelayError, Result};
use crate::http;
use crate::types::{Episode, Level, PlatformId};
use crate::validation::spotify::client_token;

#[async_trait]
pub trait EpisodeSource: Send + Sync {
    /// Most recent episode on `source`, or `None` when there is nothing to
    /// report (no feed configured, empty channel)
    async fn latest(&self, source: PlatformId) -> Result<Option<Episode>>;
}

fn not_a_source(platform: PlatformId, name: &str) -> PodrelayError {
    PlatformError::Unsupported(format!("{} cannot read episodes from {}", name, platform)).into()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Newest upload of the configured channel via `search?order=date`
pub struct YouTubeSource {
    client: Client,
    base: String,
    credentials: CredentialStore,
}

impl YouTubeSource {
    pub fn new(client: Client, endpoints: &ApiEndpoints, credentials: CredentialStore) -> Self {
        Self {
            client,
            base: endpoints.youtube.trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl EpisodeSource for YouTubeSource {
    async fn latest(&self, source: PlatformId) -> Result<Option<Episode>> {
        if source != PlatformId::YouTube {
            return Err(not_a_source(source, "the YouTube source"));
        }
        let creds = self.credentials.resolve(Level::Source, source).await?;
        let api_key = creds.require("api_key")?;
        let channel_id = creds.require("channel_id")?;

        let response: SearchResponse = http::send_json(
            source,
            "latest video lookup",
            self.client.get(format!("{}/search", self.base)).query(&[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("order", "date"),
                ("type", "video"),
                ("maxResults", "1"),
                ("key", api_key),
            ]),
        )
        .await?;

        let Some(item) = response.items.into_iter().next() else {
            tracing::debug!("YouTube channel {} has no videos", channel_id);
            return Ok(None);
        };
        let Some(video_id) = item.id.video_id else {
            return Ok(None);
        };
        let thumbnails = item.snippet.thumbnails;
        let thumbnail_url = thumbnails
            .high
            .or(thumbnails.medium)
            .or(thumbnails.default)
            .map(|t| t.url);

        Ok(Some(Episode {
            source,
            url: format!("https://www.youtube.com/watch?v={}", video_id),
            video_id,
            title: item.snippet.title,
            description: item.snippet.description,
            thumbnail_url,
            published_at: item.snippet.published_at,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    image: Option<RssImage>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssImage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(default)]
    description: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: String,
}

/// The first `<item>` of a podcast RSS feed
///
/// Feeds list newest first; when publication dates are present the newest
/// by date wins regardless of order.
pub fn latest_from_feed(source: PlatformId, xml: &str) -> Result<Option<Episode>> {
    let rss: Rss = quick_xml::de::from_str(xml).map_err(|e| {
        PlatformError::Posting(format!("{} feed is not valid RSS: {}", source.display_name(), e))
    })?;
    let channel_image = rss.channel.image.and_then(|i| i.url);

    let newest = rss
        .channel
        .items
        .into_iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            let da = a.pub_date.as_deref().and_then(parse_pub_date);
            let db = b.pub_date.as_deref().and_then(parse_pub_date);
            // Equal or missing dates keep feed order (earlier index wins)
            da.cmp(&db).then(ib.cmp(ia))
        })
        .map(|(_, item)| item);

    let Some(item) = newest else {
        return Ok(None);
    };
    let url = item
        .link
        .clone()
        .or_else(|| item.enclosure.as_ref().map(|e| e.url.clone()));
    let Some(url) = url else {
        tracing::warn!("Latest {} feed item has no link, ignoring it", source);
        return Ok(None);
    };
    let video_id = item.guid.map(|g| g.value.trim().to_string()).filter(|g| !g.is_empty());

    Ok(Some(Episode {
        source,
        video_id: video_id.unwrap_or_else(|| url.clone()),
        title: item.title.unwrap_or_default().trim().to_string(),
        description: item.description.unwrap_or_default(),
        url,
        thumbnail_url: channel_image,
        published_at: item.pub_date.as_deref().and_then(parse_pub_date),
    }))
}

fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Latest item of the feed in a source's `rss_url` credential
pub struct RssSource {
    client: Client,
    credentials: CredentialStore,
}

impl RssSource {
    pub fn new(client: Client, credentials: CredentialStore) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl EpisodeSource for RssSource {
    async fn latest(&self, source: PlatformId) -> Result<Option<Episode>> {
        if source.level() != Level::Source {
            return Err(not_a_source(source, "the RSS source"));
        }
        let creds = self.credentials.resolve(Level::Source, source).await?;
        let Some(feed_url) = creds.get("rss_url") else {
            tracing::warn!(
                "{} is enabled as a source but has no rss_url; no episodes can be read",
                source.display_name()
            );
            return Ok(None);
        };

        let response = http::send(source, "feed fetch", self.client.get(feed_url)).await?;
        let response = http::check_status(source, "feed fetch", response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| http::transport_error(source, "feed fetch", e))?;
        latest_from_feed(source, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ShowEpisodes {
    #[serde(default)]
    items: Vec<Option<ShowEpisode>>,
}

#[derive(Debug, Deserialize)]
struct ShowEpisode {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    images: Vec<Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

fn parse_release_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// Newest episode of a show through the Web API (client credentials)
pub struct SpotifyApiSource {
    client: Client,
    accounts: String,
    api: String,
    credentials: CredentialStore,
}

impl SpotifyApiSource {
    pub fn new(client: Client, endpoints: &ApiEndpoints, credentials: CredentialStore) -> Self {
        Self {
            client,
            accounts: endpoints.spotify_accounts.trim_end_matches('/').to_string(),
            api: endpoints.spotify_api.trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl EpisodeSource for SpotifyApiSource {
    async fn latest(&self, source: PlatformId) -> Result<Option<Episode>> {
        if source != PlatformId::Spotify {
            return Err(not_a_source(source, "the Spotify API source"));
        }
        let creds = self.credentials.resolve(Level::Source, source).await?;
        let client_id = creds.require("client_id")?;
        let client_secret = creds.require("client_secret")?;
        let show_id = creds.require("show_id")?;

        let token = client_token(&self.client, &self.accounts, client_id, client_secret).await?;
        let episodes: ShowEpisodes = http::send_json(
            source,
            "latest episode lookup",
            self.client
                .get(format!("{}/v1/shows/{}/episodes", self.api, show_id))
                .query(&[("market", "US"), ("limit", "10")])
                .bearer_auth(&token.access_token),
        )
        .await?;

        // Listed newest first; a later release date still wins
        let newest = episodes
            .items
            .into_iter()
            .flatten()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                let da = a.release_date.as_deref().and_then(parse_release_date);
                let db = b.release_date.as_deref().and_then(parse_release_date);
                da.cmp(&db).then(ib.cmp(ia))
            })
            .map(|(_, episode)| episode);

        let Some(episode) = newest else {
            tracing::debug!("Spotify show {} has no episodes", show_id);
            return Ok(None);
        };
        let url = episode
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/episode/{}", episode.id));

        Ok(Some(Episode {
            source,
            published_at: episode.release_date.as_deref().and_then(parse_release_date),
            thumbnail_url: episode.images.into_iter().next().map(|i| i.url),
            video_id: episode.id,
            title: episode.name,
            description: episode.description,
            url,
        }))
    }
}

/// YouTube through the Data API, Rumble through RSS, Spotify through RSS
/// when a feed is stored and the Web API otherwise
pub struct FeedSources {
    youtube: YouTubeSource,
    spotify: SpotifyApiSource,
    rss: RssSource,
    credentials: CredentialStore,
}

impl FeedSources {
    pub fn new(client: Client, endpoints: &ApiEndpoints, credentials: CredentialStore) -> Self {
        Self {
            youtube: YouTubeSource::new(client.clone(), endpoints, credentials.clone()),
            spotify: SpotifyApiSource::new(client.clone(), endpoints, credentials.clone()),
            rss: RssSource::new(client, credentials.clone()),
            credentials,
        }
    }
}

#[async_trait]
impl EpisodeSource for FeedSources {
    async fn latest(&self, source: PlatformId) -> Result<Option<Episode>> {
        match source {
            PlatformId::YouTube => self.youtube.latest(source).await,
            PlatformId::Spotify => {
                let creds = self.credentials.resolve(Level::Source, source).await?;
                if creds.get("rss_url").is_none() && creds.get("show_id").is_some() {
                    self.spotify.latest(source).await
                } else {
                    self.rss.latest(source).await
                }
            }
            _ => self.rss.latest(source).await,
        }
    }
}

/// Episodes from a JSON file (an array of episodes); for manual runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    episodes: Vec<Episode>,
}

impl StaticSource {
    pub fn new(episodes: Vec<Episode>) -> Self {
        Self { episodes }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PodrelayError::InvalidInput(format!(
                "Cannot read episodes file {}: {}",
                path.display(),
                e
            ))
        })?;
        let episodes = serde_json::from_str(&content).map_err(|e| {
            PodrelayError::InvalidInput(format!(
                "Episodes file {} is not a JSON array of episodes: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::new(episodes))
    }
}

#[async_trait]
impl EpisodeSource for StaticSource {
    async fn latest(&self, source: PlatformId) -> Result<Option<Episode>> {
        // Newest by published_at; undated episodes count as oldest, later
        // entries in the file win ties
        Ok(self
            .episodes
            .iter()
            .filter(|e| e.source == source)
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.published_at.cmp(&b.published_at).then(ia.cmp(ib)))
            .map(|(_, e)| e.clone()))
    }
}

/// The source selected by `[source] kind`
pub fn from_config(
    config: &Config,
    client: Client,
    credentials: CredentialStore,
) -> Result<Box<dyn EpisodeSource>> {
    match config.source.kind {
        SourceKind::Auto => Ok(Box::new(FeedSources::new(
            client,
            &config.endpoints,
            credentials,
        ))),
        SourceKind::Static => {
            let path = config
                .source
                .episodes_file
                .as_deref()
                .ok_or_else(|| PodrelayError::InvalidInput("source.episodes_file is not set".to_string()))?;
            let path = shellexpand::tilde(path).to_string();
            Ok(Box::new(StaticSource::from_file(Path::new(&path))?))
        }
    }
}
