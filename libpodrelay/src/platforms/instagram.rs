//! Instagram poster
//!
//! Instagram has no link or text-only posts. Each episode becomes a square
//! title card built from the episode thumbnail, published at a public URL
//! through [`ObjectStorage`], then created and published as a media object.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::Client;
use std::io::Cursor;
use std::sync::Arc;

use super::meta::{create_node, fetch_permalink, fetch_profile, MetaProfile};
use super::text::{char_length, compose};
use super::{PlatformPoster, PostOutcome};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::storage::{content_key, ObjectStorage};
use crate::types::{DerivedFields, PlatformId, PostContent};

pub const CARD_SIZE: u32 = 1080;
pub const CAPTION_LIMIT: usize = 2200;

const BRAND: Rgba<u8> = Rgba([24, 24, 32, 255]);
const ACCENT: Rgba<u8> = Rgba([229, 72, 77, 255]);
const ACCENT_HEIGHT: u32 = 24;

const SCOPE_HINT: &str = "The token needs instagram_basic and instagram_content_publish, and the account must be an Instagram Business or Creator account linked to a Facebook Page";

/// Render the 1080×1080 PNG card
///
/// The thumbnail is scaled to fit and centred on the brand colour; when it
/// is missing or unreadable the card is the plain brand square.
pub fn render_title_card(thumbnail: Option<&[u8]>) -> std::result::Result<Vec<u8>, PlatformError> {
    let mut canvas = RgbaImage::from_pixel(CARD_SIZE, CARD_SIZE, BRAND);

    if let Some(bytes) = thumbnail {
        match image::load_from_memory(bytes) {
            Ok(thumb) => {
                let fitted = thumb.resize(CARD_SIZE, CARD_SIZE, FilterType::Triangle);
                let x = (CARD_SIZE - fitted.width()) / 2;
                let y = (CARD_SIZE - fitted.height()) / 2;
                image::imageops::overlay(&mut canvas, &fitted.to_rgba8(), x as i64, y as i64);
            }
            Err(e) => tracing::warn!("Thumbnail could not be decoded, using a plain card: {}", e),
        }
    }

    for y in CARD_SIZE - ACCENT_HEIGHT..CARD_SIZE {
        for x in 0..CARD_SIZE {
            canvas.put_pixel(x, y, ACCENT);
        }
    }

    let mut output = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut output, ImageFormat::Png)
        .map_err(|e| PlatformError::Posting(format!("Failed to encode title card: {}", e)))?;
    Ok(output.into_inner())
}

pub fn caption(content: &PostContent) -> String {
    let description = content.description.trim();
    let title = if description.is_empty() {
        format!("🎙️ New episode: {}", content.title)
    } else {
        format!("🎙️ New episode: {}\n\n{}", content.title, description)
    };
    let listen = format!("Listen: {}", content.url);
    compose(
        &title,
        &[listen.as_str(), "#podcast #newepisode"],
        CAPTION_LIMIT,
        char_length,
    )
}

pub struct InstagramPoster {
    client: Client,
    base: String,
    storage: Arc<dyn ObjectStorage>,
}

impl InstagramPoster {
    pub fn new(client: Client, endpoints: &ApiEndpoints, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            client,
            base: endpoints.instagram.trim_end_matches('/').to_string(),
            storage,
        }
    }

    async fn download_thumbnail(&self, url: &str) -> Option<Vec<u8>> {
        let response = http::send(PlatformId::Instagram, "thumbnail download", self.client.get(url))
            .await
            .ok()?;
        let response = http::check_status(PlatformId::Instagram, "thumbnail download", response)
            .await
            .ok()?;
        response.bytes().await.ok().map(|b| b.to_vec())
    }

    async fn fetch_me(&self, platform: PlatformId, token: &str) -> Result<MetaProfile> {
        let profile = fetch_profile(&self.client, platform, &self.base, "me", token)
            .await
            .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;
        tracing::info!("Fetched Instagram account id {}", profile.id);
        Ok(profile)
    }
}

#[async_trait]
impl PlatformPoster for InstagramPoster {
    async fn prepare(&self, credentials: &ResolvedCredentials) -> Result<DerivedFields> {
        if credentials.get("business_account_id").is_some() || credentials.get("user_id").is_some() {
            return Ok(DerivedFields::default());
        }
        let token = credentials.require("access_token")?;
        let profile = self.fetch_me(credentials.platform(), token).await?;
        Ok(DerivedFields {
            user_id: Some(profile.id),
            username: profile.username,
            ..Default::default()
        })
    }

    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let platform = credentials.platform();
        let token = credentials.require("access_token")?;
        let account = match credentials
            .get("business_account_id")
            .or_else(|| credentials.get("user_id"))
        {
            Some(id) => id.to_string(),
            None => self.fetch_me(platform, token).await?.id,
        };

        let thumbnail = match &content.thumbnail_url {
            Some(url) => self.download_thumbnail(url).await,
            None => None,
        };
        if content.thumbnail_url.is_some() && thumbnail.is_none() {
            tracing::warn!("Could not download the episode thumbnail, using a plain card");
        }
        let card = render_title_card(thumbnail.as_deref())?;
        let key = content_key("instagram", &card, "png");
        let image_url = self.storage.put(&key, card, "image/png").await?;
        tracing::debug!("Title card published at {}", image_url);

        let caption = caption(content);
        let container = create_node(
            &self.client,
            platform,
            "creating media container",
            format!("{}/{}/media", self.base, account),
            &[
                ("image_url", image_url.as_str()),
                ("caption", caption.as_str()),
                ("access_token", token),
            ],
        )
        .await
        .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;

        let media_id = create_node(
            &self.client,
            platform,
            "publishing",
            format!("{}/{}/media_publish", self.base, account),
            &[("creation_id", container.as_str()), ("access_token", token)],
        )
        .await?;

        let post_url = fetch_permalink(&self.client, platform, &self.base, &media_id, token).await;
        Ok(PostOutcome::new(media_id, post_url))
    }
}
