//! Threads poster (text container, then publish)

use async_trait::async_trait;
use reqwest::Client;

use super::meta::{create_node, fetch_permalink, fetch_profile, MetaProfile};
use super::text::{char_length, compose};
use super::{PlatformPoster, PostOutcome};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::Result;
use crate::http;
use crate::types::{DerivedFields, PlatformId, PostContent};

pub const CHARACTER_LIMIT: usize = 500;

const SCOPE_HINT: &str =
    "The token needs the threads_basic and threads_content_publish permissions";

pub fn thread_text(content: &PostContent) -> String {
    compose(
        &format!("🎙️ New episode: {}", content.title),
        &[content.url.as_str()],
        CHARACTER_LIMIT,
        char_length,
    )
}

pub struct ThreadsPoster {
    client: Client,
    base: String,
}

impl ThreadsPoster {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.threads.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_me(&self, platform: PlatformId, token: &str) -> Result<MetaProfile> {
        let profile = fetch_profile(&self.client, platform, &self.base, "me", token)
            .await
            .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;
        tracing::info!("Fetched Threads user id {}", profile.id);
        Ok(profile)
    }
}

#[async_trait]
impl PlatformPoster for ThreadsPoster {
    async fn prepare(&self, credentials: &ResolvedCredentials) -> Result<DerivedFields> {
        if credentials.get("user_id").is_some() {
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
        let user_id = match credentials.get("user_id") {
            Some(id) => id.to_string(),
            None => self.fetch_me(platform, token).await?.id,
        };

        let text = thread_text(content);
        let container = create_node(
            &self.client,
            platform,
            "creating post container",
            format!("{}/{}/threads", self.base, user_id),
            &[
                ("media_type", "TEXT"),
                ("text", text.as_str()),
                ("access_token", token),
            ],
        )
        .await
        .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;

        let post_id = create_node(
            &self.client,
            platform,
            "publishing",
            format!("{}/{}/threads_publish", self.base, user_id),
            &[("creation_id", container.as_str()), ("access_token", token)],
        )
        .await?;

        let post_url = fetch_permalink(&self.client, platform, &self.base, &post_id, token).await;
        Ok(PostOutcome::new(post_id, post_url))
    }
}
