use std::sync::{Arc, OnceLock};

use anyhow::Context;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{RateGate, Scraper, error_for_response};
use crate::error::PipelineError;
use crate::models::Candidate;
use crate::parser::tags::release_tags;

pub const SCRAPER: &str = "prowlarr";

const MOVIE_CATEGORY: u32 = 2000;
const TV_CATEGORY: u32 = 5000;

/// Usenet has no swarm; it ranks like a healthy torrent.
const USENET_SEEDERS: u32 = 100;

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    title: String,
    info_hash: Option<String>,
    magnet_url: Option<String>,
    download_url: Option<String>,
    size: Option<u64>,
    seeders: Option<u32>,
    protocol: Option<String>,
}

/// Searches every indexer configured in a Prowlarr instance.
pub struct ProwlarrScraper {
    client: Client,
    gate: Arc<RateGate>,
    base_url: String,
    api_key: String,
}

impl ProwlarrScraper {
    pub fn new(base_url: &str, api_key: &str, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent("Reelarr/1.0")
                .timeout(gate.timeout())
                .build()
                .context("Failed to build HTTP client")?,
            gate,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn search(
        &self,
        query: &str,
        kind: &str,
        category: u32,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let url = format!("{}/api/v1/search", self.base_url);
        let category = category.to_string();
        debug!(query = %query, kind, "Searching prowlarr");

        let results = self
            .gate
            .run(|| async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-Api-Key", &self.api_key)
                    .query(&[
                        ("query", query),
                        ("type", kind),
                        ("categories", category.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| PipelineError::transient(SCRAPER, e.to_string()))?;

                if !response.status().is_success() {
                    return Err(error_for_response(SCRAPER, response).await);
                }
                response
                    .json::<Vec<SearchResult>>()
                    .await
                    .map_err(|e| PipelineError::transient(SCRAPER, format!("invalid payload: {e}")))
            })
            .await?;

        let candidates: Vec<Candidate> = results.iter().filter_map(parse_result).collect();
        info!(count = candidates.len(), query = %query, "Prowlarr returned results");
        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl Scraper for ProwlarrScraper {
    fn name(&self) -> &str {
        SCRAPER
    }

    async fn scrape_movie(&self, external_id: &str) -> Result<Vec<Candidate>, PipelineError> {
        if external_id.is_empty() {
            return Ok(Vec::new());
        }
        self.search(&format!("{{ImdbId:{external_id}}}"), "movie", MOVIE_CATEGORY)
            .await
    }

    async fn scrape_episode(
        &self,
        external_id: &str,
        season: i32,
        episode: i32,
        _absolute: Option<i32>,
    ) -> Result<Vec<Candidate>, PipelineError> {
        if external_id.is_empty() {
            return Ok(Vec::new());
        }
        self.search(&episode_query(external_id, season, episode), "tvsearch", TV_CATEGORY)
            .await
    }
}

fn episode_query(external_id: &str, season: i32, episode: i32) -> String {
    format!("{{ImdbId:{external_id}}}{{Season:{season:02}}}{{Episode:{episode:02}}}")
}

/// A torrent needs a hash (given, or read from the magnet link). A result
/// without one but with a download link is treated as usenet.
fn parse_result(result: &SearchResult) -> Option<Candidate> {
    static BTIH: OnceLock<Regex> = OnceLock::new();

    let hash = result
        .info_hash
        .clone()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            let magnet = result.magnet_url.as_deref()?;
            get_regex(&BTIH, r"(?i)btih:([a-f0-9]{32,40})")
                .captures(magnet)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .map(|h| h.to_lowercase());

    let usenet = hash.is_none()
        && (result.protocol.as_deref() == Some("usenet") || result.download_url.is_some());
    let download_url = result.download_url.clone().filter(|_| usenet);
    if hash.is_none() && download_url.is_none() {
        return None;
    }

    let tags = release_tags(&result.title);
    Some(Candidate {
        info_hash: hash,
        title: result.title.clone(),
        source: SCRAPER.to_string(),
        resolution: tags.resolution,
        quality: tags.quality,
        codec: tags.codec,
        audio: None,
        size_bytes: result.size,
        seeders: if usenet {
            Some(USENET_SEEDERS)
        } else {
            result.seeders
        },
        is_dual_audio: tags.is_dual_audio,
        is_dubbed: tags.is_dubbed,
        release_group: tags.release_group,
        download_url,
    })
}
