//! Facebook Page poster

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{PlatformPoster, PostOutcome};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::Result;
use crate::http;
use crate::types::PostContent;

const PAGE_HINT: &str = "Use a Page access token with pages_manage_posts (re-validate the credentials to exchange a user token for one)";

#[derive(Debug, Deserialize)]
struct FeedResponse {
    id: String,
}

pub fn page_message(content: &PostContent) -> String {
    if content.description.trim().is_empty() {
        format!("🎙️ New episode: {}", content.title)
    } else {
        let teaser = super::text::truncate_chars(content.description.trim(), 500);
        format!("🎙️ New episode: {}\n\n{}", content.title, teaser)
    }
}

pub struct FacebookPoster {
    client: Client,
    graph: String,
}

impl FacebookPoster {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            graph: endpoints.facebook.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformPoster for FacebookPoster {
    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let platform = credentials.platform();
        let page_id = credentials.require("page_id")?;
        let token = credentials.require("access_token")?;

        let message = page_message(content);
        let response: FeedResponse = http::send_json(
            platform,
            "posting",
            self.client
                .post(format!("{}/{}/feed", self.graph, page_id))
                .form(&[
                    ("message", message.as_str()),
                    ("link", content.url.as_str()),
                    ("access_token", token),
                ]),
        )
        .await
        .map_err(|e| http::with_auth_hint(e, PAGE_HINT))?;

        // Feed ids are "{page_id}_{post_id}"
        let post_url = format!("https://www.facebook.com/{}", response.id);
        Ok(PostOutcome::new(response.id, Some(post_url)))
    }
}
