//! Sources of warmup values.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::warming::task::WarmupTask;

/// Produces the value a warmup task caches.
#[async_trait]
pub trait WarmupLoader: Send + Sync {
    async fn load(&self, task: &WarmupTask) -> Result<Value>;
}

// == HTTP Loader ==
/// Fetches `base_url + task.target` as JSON. Object params become query
/// parameters.
pub struct HttpWarmupLoader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWarmupLoader {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CacheError::Internal(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, task: &WarmupTask) -> String {
        if task.target.starts_with("http://") || task.target.starts_with("https://") {
            return task.target.clone();
        }
        let path = task.target.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl WarmupLoader for HttpWarmupLoader {
    async fn load(&self, task: &WarmupTask) -> Result<Value> {
        let url = self.url_for(task);
        let mut request = self.client.get(&url);
        if let Value::Object(params) = &task.params {
            let query: Vec<(String, String)> = params
                .iter()
                .map(|(name, value)| match value {
                    Value::String(s) => (name.clone(), s.clone()),
                    other => (name.clone(), other.to_string()),
                })
                .collect();
            request = request.query(&query);
        }

        debug!(task_id = %task.id, url = %url, "Warming request");
        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| CacheError::Loader(format!("{url}: {err}")))?;
        response
            .json::<Value>()
            .await
            .map_err(|err| CacheError::Loader(format!("{url}: invalid JSON body: {err}")))
    }
}
