//! Graph API calls shared by the Instagram and Threads adapters

use reqwest::Client;
use serde::Deserialize;

use crate::error::PlatformError;
use crate::http;
use crate::types::PlatformId;

#[derive(Debug, Clone, Deserialize)]
pub struct MetaProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct Permalink {
    #[serde(default)]
    permalink: Option<String>,
}

/// `GET /{node}?fields=id,username`
pub async fn fetch_profile(
    client: &Client,
    platform: PlatformId,
    base: &str,
    node: &str,
    token: &str,
) -> Result<MetaProfile, PlatformError> {
    http::send_json(
        platform,
        "profile lookup",
        client
            .get(format!("{}/{}", base, node))
            .query(&[("fields", "id,username"), ("access_token", token)]),
    )
    .await
}

/// Create-then-publish step shared by both APIs
pub(crate) async fn create_node(
    client: &Client,
    platform: PlatformId,
    context: &str,
    url: String,
    form: &[(&str, &str)],
) -> Result<String, PlatformError> {
    let created: CreatedId =
        http::send_json(platform, context, client.post(url).form(form)).await?;
    Ok(created.id)
}

/// Public link of a published media object, if the API will say
pub async fn fetch_permalink(
    client: &Client,
    platform: PlatformId,
    base: &str,
    media_id: &str,
    token: &str,
) -> Option<String> {
    let lookup = http::send_json::<Permalink>(
        platform,
        "permalink lookup",
        client
            .get(format!("{}/{}", base, media_id))
            .query(&[("fields", "permalink"), ("access_token", token)]),
    )
    .await;

    match lookup {
        Ok(found) => found.permalink,
        Err(e) => {
            tracing::debug!("No permalink for {} media {}: {}", platform, media_id, e);
            None
        }
    }
}
