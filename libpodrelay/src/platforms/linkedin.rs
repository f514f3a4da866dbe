//! LinkedIn poster (UGC Posts API)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{PlatformPoster, PostOutcome};
use crate::config::ApiEndpoints;
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::types::{DerivedFields, PlatformId, PostContent};

pub const SCOPE_HINT: &str = "The token needs the w_member_social scope (w_organization_social for company pages), and the LinkedIn app must have the \"Share on LinkedIn\" and \"Sign In with LinkedIn using OpenID Connect\" products enabled";

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Debug, Deserialize)]
struct LegacyProfile {
    id: String,
}

/// `urn:li:person:{id}` of the token's member
///
/// Tries the OpenID Connect `userinfo` endpoint first and falls back to the
/// legacy `/v2/me` profile for tokens issued without `openid`.
pub async fn fetch_person_urn(
    client: &Client,
    base: &str,
    token: &str,
) -> std::result::Result<String, PlatformError> {
    let userinfo = http::send_json::<UserInfo>(
        PlatformId::LinkedIn,
        "profile lookup",
        client.get(format!("{}/v2/userinfo", base)).bearer_auth(token),
    )
    .await;

    match userinfo {
        Ok(info) => return Ok(format!("urn:li:person:{}", info.sub)),
        Err(e @ (PlatformError::Network(_) | PlatformError::Timeout(_))) => return Err(e),
        Err(e) => tracing::debug!("userinfo lookup failed, trying /v2/me: {}", e),
    }

    let profile: LegacyProfile = http::send_json(
        PlatformId::LinkedIn,
        "profile lookup",
        client.get(format!("{}/v2/me", base)).bearer_auth(token),
    )
    .await?;
    Ok(format!("urn:li:person:{}", profile.id))
}

/// The ugcPosts body for an article share
pub fn share_body(author: &str, content: &PostContent) -> serde_json::Value {
    let mut media = serde_json::json!({
        "status": "READY",
        "originalUrl": content.url,
        "title": { "text": content.title },
    });
    if !content.description.trim().is_empty() {
        media["description"] = serde_json::json!({
            "text": super::text::truncate_chars(content.description.trim(), 250)
        });
    }

    serde_json::json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": {
                    "text": format!("New episode: {}\n\n{}", content.title, content.url)
                },
                "shareMediaCategory": "ARTICLE",
                "media": [media]
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}

pub struct LinkedInPoster {
    client: Client,
    base: String,
}

impl LinkedInPoster {
    pub fn new(client: Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            base: endpoints.linkedin.trim_end_matches('/').to_string(),
        }
    }
}

impl LinkedInPoster {
    async fn lookup_person(&self, token: &str) -> Result<String> {
        let person = fetch_person_urn(&self.client, &self.base, token)
            .await
            .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;
        tracing::info!("Fetched LinkedIn person URN {}", person);
        Ok(person)
    }
}

#[async_trait]
impl PlatformPoster for LinkedInPoster {
    async fn prepare(&self, credentials: &ResolvedCredentials) -> Result<DerivedFields> {
        if credentials.get("organization_urn").is_some() || credentials.get("person_urn").is_some() {
            return Ok(DerivedFields::default());
        }
        let token = credentials.require("access_token")?;
        Ok(DerivedFields {
            person_urn: Some(self.lookup_person(token).await?),
            ..Default::default()
        })
    }

    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let token = credentials.require("access_token")?;

        let author = match credentials
            .get("organization_urn")
            .or_else(|| credentials.get("person_urn"))
        {
            Some(urn) => urn.to_string(),
            None => self.lookup_person(token).await?,
        };

        let response = http::send(
            PlatformId::LinkedIn,
            "posting",
            self.client
                .post(format!("{}/v2/ugcPosts", self.base))
                .bearer_auth(token)
                .header("X-Restli-Protocol-Version", "2.0.0")
                .json(&share_body(&author, content)),
        )
        .await?;
        let response = http::check_status(PlatformId::LinkedIn, "posting", response)
            .await
            .map_err(|e| http::with_auth_hint(e, SCOPE_HINT))?;

        // The share URN comes back in a header; the body is usually empty
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let post_id = match header_id {
            Some(id) => id,
            None => response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                .ok_or_else(|| {
                    PlatformError::Posting("LinkedIn accepted the post but returned no id".to_string())
                })?,
        };

        let post_url = format!("https://www.linkedin.com/feed/update/{}/", post_id);
        Ok(PostOutcome::new(post_id, Some(post_url)))
    }
}
