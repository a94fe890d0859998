use std::sync::Arc;

use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{CacheChecker, RateGate, RemoteStorage, error_for_response};
use crate::error::PipelineError;
use crate::models::{DownloadStatus, Submission};
use crate::ranking::CacheAvailability;

const BASE_URL: &str = "https://api.real-debrid.com/rest/1.0";

pub const PROVIDER: &str = "real_debrid";

#[derive(Debug, Deserialize)]
struct AddMagnetResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    status: String,
    filename: Option<String>,
    #[serde(default)]
    progress: f64,
}

pub struct RealDebridClient {
    client: Client,
    gate: Arc<RateGate>,
    token: String,
    base_url: String,
}

impl RealDebridClient {
    pub fn new(token: &str, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent("Reelarr/1.0")
                .timeout(gate.timeout())
                .build()
                .context("Failed to build HTTP client")?,
            gate,
            token: token.to_string(),
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
            .bearer_auth(&self.token)
    }

    /// Sends a request built by `build`; an empty body reads as `None`.
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

                if !response.status().is_success() {
                    return Err(error_for_response(PROVIDER, response).await);
                }
                let body = response
                    .text()
                    .await
                    .map_err(|e| PipelineError::transient(PROVIDER, e.to_string()))?;
                if body.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&body).map(Some).map_err(|e| {
                    PipelineError::transient(PROVIDER, format!("invalid payload: {e}"))
                })
            })
            .await
    }

    async fn select_all_files(&self, torrent_id: &str) -> Result<(), PipelineError> {
        let path = format!("/torrents/selectFiles/{torrent_id}");
        self.send::<serde_json::Value, _>(|| {
            self.request(Method::POST, &path).form(&[("files", "all")])
        })
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteStorage for RealDebridClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn add_by_hash(&self, hash: &str) -> Result<Option<Submission>, PipelineError> {
        let magnet = format!("magnet:?xt=urn:btih:{hash}");
        let added = self
            .send::<AddMagnetResponse, _>(|| {
                self.request(Method::POST, "/torrents/addMagnet")
                    .form(&[("magnet", magnet.as_str())])
            })
            .await?;

        let Some(added) = added else {
            return Ok(None);
        };

        // Downloads only start once files are selected.
        self.select_all_files(&added.id).await?;

        info!(hash = %hash, torrent_id = %added.id, "Added torrent to Real-Debrid");
        Ok(Some(Submission {
            provider: PROVIDER.to_string(),
            provider_id: added.id,
        }))
    }

    async fn add_by_link(&self, _link: &str) -> Result<Option<Submission>, PipelineError> {
        debug!("Real-Debrid does not accept usenet links");
        Ok(None)
    }

    async fn get_status(&self, submission: &Submission) -> Result<DownloadStatus, PipelineError> {
        let path = format!("/torrents/info/{}", submission.provider_id);
        let info = self
            .send::<TorrentInfo, _>(|| self.request(Method::GET, &path))
            .await?;

        let Some(info) = info else {
            return Ok(DownloadStatus::Failed("empty torrent info".to_string()));
        };
        Ok(torrent_status(info))
    }
}

#[async_trait::async_trait]
impl CacheChecker for RealDebridClient {
    /// The instant-availability endpoint is gone; cached torrents simply
    /// finish on submission, so nothing is reported here.
    async fn check_all(&self, hashes: &[String]) -> Result<CacheAvailability, PipelineError> {
        debug!(count = hashes.len(), "Skipping Real-Debrid cache check");
        Ok(CacheAvailability::new())
    }
}

fn torrent_status(info: TorrentInfo) -> DownloadStatus {
    match info.status.as_str() {
        "downloaded" => DownloadStatus::Ready {
            name: info.filename,
        },
        "magnet_error" | "error" | "virus" | "dead" => {
            warn!(status = %info.status, "Real-Debrid torrent failed");
            DownloadStatus::Failed(info.status)
        }
        _ => {
            debug!(status = %info.status, progress = info.progress, "Real-Debrid torrent pending");
            DownloadStatus::Pending
        }
    }
}
