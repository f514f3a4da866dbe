//! Bluesky platform implementation (AT Protocol XRPC over HTTP)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::text::{char_length, compose, find_urls};
use super::{PlatformPoster, PostOutcome};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::types::{DerivedFields, PlatformId, PostContent};

/// Posts are capped at 300 graphemes; counting chars never exceeds that
pub const CHARACTER_LIMIT: usize = 300;

const PASSWORD_HINT: &str = "Use an app password (Settings > Privacy and security > App passwords), not the account password, and the full handle or account email as identifier";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
}

/// `com.atproto.server.createSession`
pub async fn create_session(
    client: &Client,
    pds: &str,
    identifier: &str,
    password: &str,
) -> std::result::Result<Session, PlatformError> {
    tracing::debug!("Creating Bluesky session for {}", identifier);
    http::send_json(
        PlatformId::Bluesky,
        "authentication",
        client
            .post(format!("{}/xrpc/com.atproto.server.createSession", pds))
            .json(&serde_json::json!({
                "identifier": identifier,
                "password": password,
            })),
    )
    .await
    .map_err(|e| match e {
        // createSession answers bad passwords with 400/401 AuthenticationRequired
        PlatformError::Validation(message) => PlatformError::Authentication(message),
        other => other,
    })
    .map_err(|e| http::with_auth_hint(e, PASSWORD_HINT))
}

pub fn post_text(content: &PostContent) -> String {
    compose(
        &content.title,
        &[content.url.as_str()],
        CHARACTER_LIMIT,
        char_length,
    )
}

/// Rich-text link facets, indexed by UTF-8 byte offsets
pub fn link_facets(text: &str) -> Vec<serde_json::Value> {
    find_urls(text)
        .into_iter()
        .map(|(start, end, url)| {
            serde_json::json!({
                "index": { "byteStart": start, "byteEnd": end },
                "features": [{
                    "$type": "app.bsky.richtext.facet#link",
                    "uri": url,
                }],
            })
        })
        .collect()
}

pub fn post_record(content: &PostContent, created_at: &str) -> serde_json::Value {
    let text = post_text(content);
    let facets = link_facets(&text);
    let description = super::text::truncate_chars(content.description.trim(), 300);

    serde_json::json!({
        "$type": "app.bsky.feed.post",
        "text": text,
        "createdAt": created_at,
        "facets": facets,
        "embed": {
            "$type": "app.bsky.embed.external",
            "external": {
                "uri": content.url,
                "title": content.title,
                "description": description,
            }
        }
    })
}

/// Web URL of a post from its `at://did/collection/rkey` URI
pub fn web_url(handle: &str, uri: &str) -> Option<String> {
    let rkey = uri.rsplit('/').next().filter(|k| !k.is_empty())?;
    Some(format!("https://bsky.app/profile/{}/post/{}", handle, rkey))
}

pub struct BlueskyPoster {
    client: Client,
    pds: String,
}

impl BlueskyPoster {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            pds: endpoints.bluesky.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformPoster for BlueskyPoster {
    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let identifier = credentials.require("identifier")?;
        let password = credentials.require("app_password")?;

        let session = create_session(&self.client, &self.pds, identifier, password).await?;
        let record = post_record(content, &chrono::Utc::now().to_rfc3339());

        let created: CreatedRecord = http::send_json(
            PlatformId::Bluesky,
            "posting",
            self.client
                .post(format!("{}/xrpc/com.atproto.repo.createRecord", self.pds))
                .bearer_auth(&session.access_jwt)
                .json(&serde_json::json!({
                    "repo": session.did,
                    "collection": "app.bsky.feed.post",
                    "record": record,
                })),
        )
        .await?;

        let post_url = web_url(&session.handle, &created.uri);
        let derived = DerivedFields {
            did: (credentials.get("did") != Some(session.did.as_str())).then(|| session.did.clone()),
            handle: (credentials.get("handle") != Some(session.handle.as_str()))
                .then(|| session.handle.clone()),
            ..Default::default()
        };
        Ok(PostOutcome::new(created.uri, post_url).with_derived(derived))
    }
}
