use std::sync::Arc;

use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{CacheChecker, RateGate, RemoteStorage, error_for_response};
use crate::error::PipelineError;
use crate::models::{DownloadStatus, Submission};
use crate::ranking::CacheAvailability;

const BASE_URL: &str = "https://api.torbox.app/v1/api";

pub const PROVIDER: &str = "torbox";

/// Usenet submissions are tracked under their own id space.
const USENET_ID_PREFIX: &str = "usenet-";

/// Every response is wrapped in `{ success, data, error }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTorrent {
    torrent_id: Option<i64>,
    usenetdownload_id: Option<i64>,
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DownloadEntry {
    name: Option<String>,
    #[serde(default)]
    download_finished: bool,
    #[serde(default)]
    download_present: bool,
    download_state: Option<String>,
}

pub struct TorboxClient {
    client: Client,
    gate: Arc<RateGate>,
    api_key: String,
    base_url: String,
}

impl TorboxClient {
    pub fn new(api_key: &str, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent("Reelarr/1.0")
                .timeout(gate.timeout())
                .build()
                .context("Failed to build HTTP client")?,
            gate,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
    }

    /// Unwraps the envelope. An unsuccessful envelope reads as `None`.
    async fn send<T, F>(&self, build: F) -> Result<Option<T>, PipelineError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        self.gate
            .run(|| async {
                let response = build()
                    .send()
                    .await
                    .map_err(|e| PipelineError::transient(PROVIDER, e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(error_for_response(PROVIDER, response).await);
                }

                let envelope = response.json::<Envelope<T>>().await.map_err(|e| {
                    PipelineError::transient(PROVIDER, format!("invalid payload: {e}"))
                })?;
                if !envelope.success {
                    let reason = envelope
                        .error
                        .or(envelope.detail)
                        .unwrap_or_else(|| "unknown error".to_string());
                    debug!(reason = %reason, "Torbox declined request");
                    return Ok(None);
                }
                Ok(envelope.data)
            })
            .await
    }

    async fn is_cached(&self, hash: &str) -> Result<bool, PipelineError> {
        let cached = self
            .send::<serde_json::Value, _>(|| {
                self.request(Method::GET, "/torrents/checkcached")
                    .query(&[("hash", hash), ("format", "list")])
            })
            .await?;

        Ok(cached.is_some_and(|v| v.as_array().is_some_and(|a| !a.is_empty())))
    }
}

#[async_trait::async_trait]
impl RemoteStorage for TorboxClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn add_by_hash(&self, hash: &str) -> Result<Option<Submission>, PipelineError> {
        let magnet = format!("magnet:?xt=urn:btih:{hash}");
        let created = self
            .send::<CreateTorrent, _>(|| {
                self.request(Method::POST, "/torrents/createtorrent")
                    .form(&[("magnet", magnet.as_str())])
            })
            .await?;

        let Some(id) = created.and_then(|c| c.torrent_id.or(c.id)) else {
            return Ok(None);
        };
        info!(hash = %hash, torrent_id = id, "Added torrent to Torbox");
        Ok(Some(Submission {
            provider: PROVIDER.to_string(),
            provider_id: id.to_string(),
        }))
    }

    async fn add_by_link(&self, link: &str) -> Result<Option<Submission>, PipelineError> {
        let created = self
            .send::<CreateTorrent, _>(|| {
                self.request(Method::POST, "/usenet/createusenetdownload")
                    .form(&[("link", link)])
            })
            .await?;

        let Some(id) = created.and_then(|c| c.usenetdownload_id.or(c.id)) else {
            return Ok(None);
        };
        info!(usenet_id = id, "Added usenet download to Torbox");
        Ok(Some(Submission {
            provider: PROVIDER.to_string(),
            provider_id: format!("{USENET_ID_PREFIX}{id}"),
        }))
    }

    async fn get_status(&self, submission: &Submission) -> Result<DownloadStatus, PipelineError> {
        let (path, id) = match submission.provider_id.strip_prefix(USENET_ID_PREFIX) {
            Some(id) => ("/usenet/mylist", id),
            None => ("/torrents/mylist", submission.provider_id.as_str()),
        };

        let entry = self
            .send::<DownloadEntry, _>(|| {
                self.request(Method::GET, path)
                    .query(&[("id", id), ("bypass_cache", "true")])
            })
            .await?;

        Ok(entry.map_or_else(
            || DownloadStatus::Failed("download not listed".to_string()),
            entry_status,
        ))
    }
}

#[async_trait::async_trait]
impl CacheChecker for TorboxClient {
    async fn check_all(&self, hashes: &[String]) -> Result<CacheAvailability, PipelineError> {
        let mut availability = CacheAvailability::new();
        for hash in hashes {
            let hash = hash.to_lowercase();
            if self.is_cached(&hash).await? {
                availability.insert(hash, vec![PROVIDER.to_string()]);
            }
        }
        debug!(
            cached = availability.len(),
            total = hashes.len(),
            "Torbox cache check"
        );
        Ok(availability)
    }
}

fn entry_status(entry: DownloadEntry) -> DownloadStatus {
    if entry.download_finished || entry.download_present {
        return DownloadStatus::Ready { name: entry.name };
    }
    match entry.download_state.as_deref() {
        Some(state) if state.starts_with("failed") || state == "error" => {
            DownloadStatus::Failed(state.to_string())
        }
        _ => DownloadStatus::Pending,
    }
}
