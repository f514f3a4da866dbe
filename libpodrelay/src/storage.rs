//! Publishing generated media at a public URL
//!
//! Instagram only accepts images it can download itself, so title cards are
//! written to an [`ObjectStorage`] and referenced by URL.

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{Result, StoreError};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` and return the URL it is served from
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Content-addressed key: identical cards map to the same object
pub fn content_key(prefix: &str, bytes: &[u8], extension: &str) -> String {
    let digest = Sha256::digest(bytes);
    format!("{}/{:x}.{}", prefix.trim_matches('/'), digest, extension)
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Files in a directory that a web server exposes at `public_base_url`
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(StoreError::Upload(format!("refusing object key '{}'", key)).into());
        }
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::IoError)?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(StoreError::IoError)?;

        tracing::debug!("Wrote {} to {}", key, path.display());
        Ok(join_url(&self.public_base_url, key))
    }
}

/// `PUT {endpoint}/{key}` with an optional bearer token
///
/// The public URL is `{public_base_url}/{key}` when configured, else the
/// `url` field of a JSON response, else the PUT URL itself.
pub struct HttpStorage {
    client: Client,
    endpoint: String,
    token: Option<String>,
    public_base_url: Option<String>,
}

impl HttpStorage {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        token: Option<String>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = join_url(&self.endpoint, key);
        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Upload(format!("PUT {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Upload(format!("PUT {} returned {}: {}", url, status, body)).into());
        }

        if let Some(base) = &self.public_base_url {
            return Ok(join_url(base, key));
        }
        let body = response.text().await.unwrap_or_default();
        let advertised = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("url").and_then(|u| u.as_str()).map(str::to_string));
        Ok(advertised.unwrap_or(url))
    }
}

/// Keeps objects in memory; for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    pub objects: Arc<Mutex<BTreeMap<String, (Vec<u8>, String)>>>,
    pub base_url: String,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::default(),
            base_url: base_url.into(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.objects
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(join_url(&self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_key_is_stable() {
        let a = content_key("cards/", b"png bytes", "png");
        let b = content_key("cards", b"png bytes", "png");
        assert_eq!(a, b);
        assert!(a.starts_with("cards/"));
        assert!(a.ends_with(".png"));
        // 64 hex chars of SHA-256
        assert_eq!(a.len(), "cards/".len() + 64 + ".png".len());
        assert_ne!(a, content_key("cards", b"other bytes", "png"));
    }

    #[tokio::test]
    async fn test_local_storage_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path(), "https://cdn.example.com/media/");

        let url = storage
            .put("cards/abc.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example.com/media/cards/abc.png");
        let written = std::fs::read(temp_dir.path().join("cards/abc.png")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path(), "https://cdn.example.com");
        assert!(storage
            .put("../escape.png", vec![0], "image/png")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_http_storage_puts_with_token() {
        use axum::{http::HeaderMap, routing::put, Router};

        let app = Router::new().route(
            "/{*key}",
            put(|headers: HeaderMap, body: axum::body::Bytes| async move {
                let authorized = headers
                    .get("authorization")
                    .map(|v| v == "Bearer up-token")
                    .unwrap_or(false);
                if authorized && body.to_vec() == vec![9u8, 9, 9] {
                    (axum::http::StatusCode::OK, "{\"url\":\"https://cdn.test/x.png\"}")
                } else {
                    (axum::http::StatusCode::UNAUTHORIZED, "no")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let storage = HttpStorage::new(
            Client::new(),
            format!("http://{}", addr),
            Some("up-token".to_string()),
            None,
        );
        let url = storage
            .put("cards/x.png", vec![9, 9, 9], "image/png")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/x.png");

        let anonymous = HttpStorage::new(Client::new(), format!("http://{}", addr), None, None);
        assert!(anonymous
            .put("cards/x.png", vec![9, 9, 9], "image/png")
            .await
            .is_err());
    }
}
