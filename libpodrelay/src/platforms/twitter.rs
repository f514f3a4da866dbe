//! X (Twitter) poster
//!
//! Two accounts are supported (`twitter`, `twitter2`); each tags its posts
//! with its own hashtag so the two feeds do not read as duplicates.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::oauth1::{authorization_header_now, OAuth1Keys};
use super::text::{compose, weighted_length};
use super::{PlatformPoster, PostOutcome};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::Result;
use crate::http;
use crate::types::{PlatformId, PostContent};

pub const CHARACTER_LIMIT: usize = 280;

const PERMISSION_HINT: &str = "Make sure the X app has Read and Write permission and regenerate the access token after changing it";

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// Hashtag used when the credential record has none
pub fn default_hashtag(platform: PlatformId) -> &'static str {
    match platform {
        PlatformId::Twitter2 => "#newepisode",
        _ => "#podcast",
    }
}

/// Tweet text: title, link, hashtag, within 280 weighted characters
pub fn tweet_text(content: &PostContent, hashtag: &str) -> String {
    compose(
        &content.title,
        &[content.url.as_str(), hashtag],
        CHARACTER_LIMIT,
        weighted_length,
    )
}

pub struct TwitterPoster {
    client: Client,
    base: String,
}

impl TwitterPoster {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.twitter.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformPoster for TwitterPoster {
    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let platform = credentials.platform();
        let keys = OAuth1Keys {
            consumer_key: credentials.require("api_key")?,
            consumer_secret: credentials.require("api_secret")?,
            token: credentials.require("access_token")?,
            token_secret: credentials.require("access_token_secret")?,
        };
        let hashtag = credentials
            .get("hashtag")
            .unwrap_or_else(|| default_hashtag(platform));
        let text = tweet_text(content, hashtag);

        let url = format!("{}/2/tweets", self.base);
        let authorization = authorization_header_now(&keys, "POST", &url, &[])?;

        tracing::debug!("Posting to {} ({} chars)", platform, text.chars().count());
        let response: TweetResponse = http::send_json(
            platform,
            "posting",
            self.client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, authorization)
                .json(&serde_json::json!({ "text": text })),
        )
        .await
        .map_err(|e| http::with_auth_hint(e, PERMISSION_HINT))?;

        let post_url = format!("https://x.com/i/web/status/{}", response.data.id);
        Ok(PostOutcome::new(response.data.id, Some(post_url)))
    }
}
