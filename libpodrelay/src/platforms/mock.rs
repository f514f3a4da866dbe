//! Mock poster for testing
//!
//! A configurable [`PlatformPoster`] that can succeed, fail, fail a few times
//! before succeeding, or stall. Call counts and posted content are shared
//! behind `Arc<Mutex<_>>` so a clone kept by the test sees what the registry
//! copy did.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{PlatformPoster, PostOutcome};
use crate::credentials::ResolvedCredentials;
use crate::error::{PlatformError, Result};
use crate::types::{DerivedFields, PostContent};

/// Configuration for mock poster behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Error returned once the allowed failures are used up; `None` succeeds
    pub error: Option<PlatformError>,

    /// Number of leading calls that fail with `Network` before the steady state
    pub transient_failures: usize,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    /// Derived fields to hand back on success
    pub derived: DerivedFields,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            error: None,
            transient_failures: 0,
            delay: Duration::ZERO,
            derived: DerivedFields::default(),
        }
    }
}

/// Mock poster for testing
#[derive(Debug, Clone)]
pub struct MockPoster {
    config: MockConfig,
    calls: Arc<Mutex<usize>>,
    posted: Arc<Mutex<Vec<PostContent>>>,
}

impl MockPoster {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            calls: Arc::new(Mutex::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeeds
    pub fn success() -> Self {
        Self::new(MockConfig::default())
    }

    /// Always fails with `error`
    pub fn failure(error: PlatformError) -> Self {
        Self::new(MockConfig {
            error: Some(error),
            ..Default::default()
        })
    }

    /// Fails `n` times with a network error, then succeeds
    pub fn fail_times(n: usize) -> Self {
        Self::new(MockConfig {
            transient_failures: n,
            ..Default::default()
        })
    }

    /// Succeeds after sleeping for `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..Default::default()
        })
    }

    /// Succeeds and reports `derived` as learned values
    pub fn with_derived(derived: DerivedFields) -> Self {
        Self::new(MockConfig {
            derived,
            ..Default::default()
        })
    }

    /// Number of times post was called
    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }

    /// Content of every successful post
    pub fn posted(&self) -> Vec<PostContent> {
        self.posted.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PlatformPoster for MockPoster {
    async fn post(
        &self,
        credentials: &ResolvedCredentials,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        let call = {
            let mut calls = self.calls.lock().map_err(|_| {
                PlatformError::Posting("mock call counter poisoned".to_string())
            })?;
            *calls += 1;
            *calls
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if call <= self.config.transient_failures {
            return Err(PlatformError::Network(format!(
                "mock connection reset (attempt {})",
                call
            ))
            .into());
        }
        if let Some(error) = &self.config.error {
            return Err(error.clone().into());
        }

        if let Ok(mut posted) = self.posted.lock() {
            posted.push(content.clone());
        }
        let post_id = format!("{}:mock-{}", credentials.platform(), uuid::Uuid::new_v4());
        let post_url = format!("https://mock.invalid/{}", post_id);
        Ok(PostOutcome::new(post_id, Some(post_url)).with_derived(self.config.derived.clone()))
    }
}
