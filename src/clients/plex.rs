use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Library, RateGate, WatchlistProvider, error_for_response};
use crate::domain::MediaKind;
use crate::error::PipelineError;
use crate::models::WatchlistEntry;

const DISCOVER_URL: &str = "https://discover.provider.plex.tv";

const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct WatchlistResponse {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
struct MediaContainer {
    #[serde(rename = "totalSize", default)]
    total_size: usize,
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexItem>,
}

#[derive(Debug, Deserialize)]
struct PlexItem {
    #[serde(default)]
    title: String,
    year: Option<i32>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "Guid", default)]
    guids: Vec<PlexGuid>,
}

#[derive(Debug, Deserialize)]
struct PlexGuid {
    id: String,
}

pub struct PlexClient {
    client: Client,
    gate: Arc<RateGate>,
    server_url: String,
    token: String,
    discover_url: String,
}

impl PlexClient {
    pub fn new(server_url: &str, token: &str, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent("Reelarr/1.0")
                .timeout(gate.timeout())
                .build()
                .context("Failed to build HTTP client")?,
            gate,
            server_url: server_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            discover_url: DISCOVER_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_discover_url(mut self, url: &str) -> Self {
        self.discover_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn page(&self, offset: usize) -> Result<MediaContainer, PipelineError> {
        let url = format!("{}/library/sections/watchlist/all", self.discover_url);
        let start = offset.to_string();
        let size = PAGE_SIZE.to_string();

        self.gate
            .run(|| async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-Plex-Token", &self.token)
                    .header("Accept", "application/json")
                    .query(&[
                        ("X-Plex-Container-Start", start.as_str()),
                        ("X-Plex-Container-Size", size.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| PipelineError::transient("plex", e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(error_for_response("plex", response).await);
                }
                response
                    .json::<WatchlistResponse>()
                    .await
                    .map(|r| r.container)
                    .map_err(|e| PipelineError::transient("plex", format!("invalid payload: {e}")))
            })
            .await
    }
}

#[async_trait::async_trait]
impl WatchlistProvider for PlexClient {
    async fn list(&self) -> Result<Vec<WatchlistEntry>, PipelineError> {
        if self.token.is_empty() {
            return Err(PipelineError::ConfigurationMissing("plex_token".into()));
        }

        let mut entries = Vec::new();
        loop {
            let page = self.page(entries.len()).await?;
            let fetched = page.metadata.len();
            entries.extend(page.metadata.into_iter().map(into_entry));
            debug!(fetched, total = page.total_size, "Fetched watchlist page");

            if fetched == 0 || fetched < PAGE_SIZE || entries.len() >= page.total_size {
                break;
            }
        }

        info!(count = entries.len(), "Fetched Plex watchlist");
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl Library for PlexClient {
    async fn refresh(&self) -> bool {
        if self.token.is_empty() || self.server_url.is_empty() {
            debug!("Plex not configured, skipping library refresh");
            return false;
        }

        let url = format!("{}/library/sections/all/refresh", self.server_url);
        let result = self
            .gate
            .run(|| async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-Plex-Token", &self.token)
                    .send()
                    .await
                    .map_err(|e| PipelineError::transient("plex", e.to_string()))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(error_for_response("plex", response).await)
                }
            })
            .await;

        match result {
            Ok(()) => {
                info!("Plex library refresh triggered");
                true
            }
            Err(e) => {
                warn!(error = %e, "Plex library refresh failed");
                false
            }
        }
    }
}

fn into_entry(item: PlexItem) -> WatchlistEntry {
    let kind = match item.kind.as_str() {
        "movie" => Some(MediaKind::Movie),
        "show" => Some(MediaKind::Show),
        _ => None,
    };
    WatchlistEntry {
        title: item.title,
        year: item.year,
        kind,
        guids: item.guids.into_iter().map(|g| g.id).collect(),
    }
}
