//! Last posting result per platform, overwritten on every run

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{get_json, put_json, KvStore};
use crate::error::Result;
use crate::types::{PlatformId, PostResult};

const NAMESPACE: &str = "results";

#[derive(Clone)]
pub struct ResultStore {
    kv: Arc<dyn KvStore>,
}

impl ResultStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn record(&self, platform: PlatformId, result: &PostResult) -> Result<()> {
        put_json(self.kv.as_ref(), NAMESPACE, platform.as_str(), result).await
    }

    pub async fn get(&self, platform: PlatformId) -> Result<Option<PostResult>> {
        get_json(self.kv.as_ref(), NAMESPACE, platform.as_str()).await
    }

    /// Every platform that has a result, in platform order
    pub async fn all(&self) -> Result<BTreeMap<PlatformId, PostResult>> {
        let mut results = BTreeMap::new();
        for key in self.kv.keys(NAMESPACE).await? {
            let Ok(platform) = key.parse::<PlatformId>() else {
                tracing::warn!("Ignoring result for unknown platform '{}'", key);
                continue;
            };
            if let Some(result) = self.get(platform).await? {
                results.insert(platform, result);
            }
        }
        Ok(results)
    }
}
