//! Scrapers for Stremio stream addons (Torrentio, MediaFusion).
//!
//! Both addons answer `/stream/{movie|series}/{id}.json` with the same
//! stream list; they differ in base path and in where the hash is carried.

use std::sync::{Arc, OnceLock};

use anyhow::Context;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use super::{RateGate, Scraper, error_for_response};
use crate::error::PipelineError;
use crate::models::Candidate;
use crate::parser::size::find_size;
use crate::parser::tags::release_tags;

/// Sort by quality then size and drop low-quality releases upstream.
const TORRENTIO_FILTER: &str = "sort=qualitysize|qualityfilter=480p,scr,cam";

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<Stream>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stream {
    info_hash: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    name: String,
    behavior_hints: Option<BehaviorHints>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BehaviorHints {
    info_hash: Option<String>,
}

pub struct StremioScraper {
    name: &'static str,
    client: Client,
    gate: Arc<RateGate>,
    /// Everything before `/stream/...`.
    stream_root: String,
}

impl StremioScraper {
    pub fn torrentio(base_url: &str, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        let root = format!("{}/{TORRENTIO_FILTER}", base_url.trim_end_matches('/'));
        Self::new("torrentio", root, gate)
    }

    pub fn mediafusion(base_url: &str, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        Self::new("mediafusion", base_url.trim_end_matches('/').to_string(), gate)
    }

    fn new(name: &'static str, stream_root: String, gate: Arc<RateGate>) -> anyhow::Result<Self> {
        Ok(Self {
            name,
            client: Client::builder()
                .user_agent("Reelarr/1.0")
                .timeout(gate.timeout())
                .build()
                .context("Failed to build HTTP client")?,
            gate,
            stream_root,
        })
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Candidate>, PipelineError> {
        let url = format!("{}/stream/{path}.json", self.stream_root);
        debug!(scraper = self.name, url = %url, "Scraping stream addon");

        let streams = self
            .gate
            .run(|| async {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| PipelineError::transient(self.name, e.to_string()))?;

                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(Vec::new());
                }
                if !status.is_success() {
                    return Err(error_for_response(self.name, response).await);
                }

                response
                    .json::<StreamsResponse>()
                    .await
                    .map(|r| r.streams)
                    .map_err(|e| PipelineError::transient(self.name, format!("invalid payload: {e}")))
            })
            .await?;

        let candidates: Vec<Candidate> = streams
            .iter()
            .filter_map(|s| parse_stream(s, self.name))
            .collect();
        info!(scraper = self.name, count = candidates.len(), "Stream addon returned streams");
        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl Scraper for StremioScraper {
    fn name(&self) -> &str {
        self.name
    }

    async fn scrape_movie(&self, external_id: &str) -> Result<Vec<Candidate>, PipelineError> {
        if external_id.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(&format!("movie/{external_id}")).await
    }

    /// Addons index by IMDb season and episode; the absolute hint is not used.
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
        self.fetch(&format!("series/{external_id}:{season}:{episode}"))
            .await
    }
}

/// Converts one stream entry. The first line of `title` (or `name`) is the
/// release name; later lines carry seeders (`👤 N`), size (`💾 X GB`) and
/// the indexer.
fn parse_stream(stream: &Stream, source: &str) -> Option<Candidate> {
    static SEEDERS: OnceLock<Regex> = OnceLock::new();

    let hash = stream
        .info_hash
        .as_deref()
        .or_else(|| stream.behavior_hints.as_ref()?.info_hash.as_deref())?
        .to_lowercase();
    let full = if stream.title.trim().is_empty() {
        stream.name.as_str()
    } else {
        stream.title.as_str()
    };
    let title = full.lines().next().unwrap_or_default().trim().to_string();
    if title.is_empty() {
        return None;
    }

    let tags = release_tags(&title);
    Some(Candidate {
        info_hash: Some(hash),
        source: source.to_string(),
        resolution: tags.resolution,
        quality: tags.quality,
        codec: tags.codec,
        audio: None,
        size_bytes: find_size(full),
        seeders: get_regex(&SEEDERS, r"👤\s*(\d+)")
            .captures(full)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        is_dual_audio: tags.is_dual_audio,
        is_dubbed: tags.is_dubbed,
        release_group: tags.release_group,
        download_url: None,
        title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(hash: Option<&str>, title: &str) -> Stream {
        Stream {
            info_hash: hash.map(String::from),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_stream_fields() {
        let s = stream(
            Some("ABCDEF0123"),
            "[SubsPlease] Frieren - 18 (1080p) [Dual Audio] WEB-DL x265\n👤 42 💾 1.4 GB ⚙️ Nyaa",
        );
        let c = parse_stream(&s, "torrentio").unwrap();

        assert_eq!(c.info_hash.as_deref(), Some("abcdef0123"));
        assert_eq!(c.source, "torrentio");
        assert_eq!(
            c.title,
            "[SubsPlease] Frieren - 18 (1080p) [Dual Audio] WEB-DL x265"
        );
        assert_eq!(c.resolution.as_deref(), Some("1080p"));
        assert_eq!(c.quality.as_deref(), Some("WEB-DL"));
        assert_eq!(c.codec.as_deref(), Some("x265"));
        assert_eq!(c.seeders, Some(42));
        assert_eq!(c.size_bytes, Some(1_503_238_553));
        assert_eq!(c.release_group.as_deref(), Some("SubsPlease"));
        assert!(c.is_dual_audio);
    }

    #[test]
    fn test_stream_without_hash_is_skipped() {
        assert!(parse_stream(&stream(None, "Movie 2020 1080p"), "torrentio").is_none());
    }

    #[test]
    fn test_mediafusion_stream_shape() {
        let payload = r#"{"streams":[
            {"name":"MediaFusion 1080p","title":"","description":"x",
             "behaviorHints":{"infoHash":"FEEDBEEF","filename":"x.mkv"}},
            {"name":"Heat.1995.2160p.BluRay.REMUX\n💾 60 GB 👤 12","infoHash":"CAFE"},
            {"title":"No hash here"}
        ]}"#;
        let parsed: StreamsResponse = serde_json::from_str(payload).unwrap();
        let candidates: Vec<_> = parsed
            .streams
            .iter()
            .filter_map(|s| parse_stream(s, "mediafusion"))
            .collect();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].info_hash.as_deref(), Some("feedbeef"));
        assert_eq!(candidates[0].title, "MediaFusion 1080p");
        assert_eq!(candidates[1].info_hash.as_deref(), Some("cafe"));
        assert_eq!(candidates[1].title, "Heat.1995.2160p.BluRay.REMUX");
        assert_eq!(candidates[1].quality.as_deref(), Some("BluRay"));
        assert_eq!(candidates[1].seeders, Some(12));
        assert_eq!(candidates[1].size_bytes, Some(60 * 1024 * 1024 * 1024));
        assert!(candidates.iter().all(|c| c.source == "mediafusion"));
    }

    #[test]
    fn test_stream_roots() {
        let gate = RateGate::new("t", &crate::config::RateLimitConfig::default());
        let torrentio = StremioScraper::torrentio("https://torrentio.strem.fun/", Arc::clone(&gate)).unwrap();
        assert_eq!(
            torrentio.stream_root,
            format!("https://torrentio.strem.fun/{TORRENTIO_FILTER}")
        );
        let mediafusion = StremioScraper::mediafusion("https://mf.example/", gate).unwrap();
        assert_eq!(mediafusion.stream_root, "https://mf.example");
        assert_eq!(mediafusion.name(), "mediafusion");
    }
}
