//! Which source videos have already been cross-posted

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{get_json, KvStore};
use crate::error::{Result, StoreError};
use crate::types::PostedVideoRecord;

const NAMESPACE: &str = "posted_videos";

#[derive(Clone)]
pub struct DedupTracker {
    kv: Arc<dyn KvStore>,
}

impl DedupTracker {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn has_posted_video(&self, video_id: &str) -> Result<bool> {
        Ok(self.kv.get(NAMESPACE, video_id).await?.is_some())
    }

    pub async fn get(&self, video_id: &str) -> Result<Option<PostedVideoRecord>> {
        get_json(self.kv.as_ref(), NAMESPACE, video_id).await
    }

    /// Record `video_id` as handled
    ///
    /// Idempotent: marking again keeps the original `posted_at`, which is
    /// what gets returned.
    pub async fn mark_video_as_posted(&self, video_id: &str) -> Result<PostedVideoRecord> {
        self.mark_at(video_id, Utc::now()).await
    }

    pub async fn mark_at(&self, video_id: &str, posted_at: DateTime<Utc>) -> Result<PostedVideoRecord> {
        let record = PostedVideoRecord {
            video_id: video_id.to_string(),
            posted_at,
        };
        let encoded = serde_json::to_string(&record).map_err(StoreError::Serialization)?;

        if self
            .kv
            .compare_and_swap(NAMESPACE, video_id, None, &encoded)
            .await?
        {
            tracing::debug!("Marked video {} as posted", video_id);
            return Ok(record);
        }

        // Already marked; the first record wins
        Ok(self.get(video_id).await?.unwrap_or(record))
    }

    /// Forget a video so the next run posts it again
    pub async fn clear(&self, video_id: &str) -> Result<bool> {
        self.kv.delete(NAMESPACE, video_id).await
    }

    /// All marked videos, ordered by video id
    pub async fn list(&self) -> Result<Vec<PostedVideoRecord>> {
        let mut records = Vec::new();
        for key in self.kv.keys(NAMESPACE).await? {
            if let Some(record) = self.get(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
