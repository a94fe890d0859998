//! Collaborators the pipeline talks to.
//!
//! Each trait returns typed payloads so nothing past this boundary inspects
//! raw provider JSON. Implementations are injected into the pipeline as
//! `Arc<dyn Trait>` handles; tests substitute in-memory fakes.

pub mod debrid;
pub mod gate;
pub mod plex;
pub mod prowlarr;
pub mod realdebrid;
pub mod stremio;
pub mod tmdb;
pub mod torbox;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::domain::MediaKind;
use crate::error::PipelineError;
use crate::models::{
    AbsoluteEpisodeMap, Candidate, DownloadStatus, EpisodeMeta, ExternalIds, Metadata,
    Submission, WatchlistEntry,
};
use crate::ranking::CacheAvailability;

pub use debrid::DebridPool;
pub use gate::RateGate;
pub use plex::PlexClient;
pub use prowlarr::ProwlarrScraper;
pub use realdebrid::RealDebridClient;
pub use stremio::StremioScraper;
pub use tmdb::TmdbClient;
pub use torbox::TorboxClient;

#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Resolves an IMDb (`tt…`) or TMDB (numeric) id to full metadata.
    async fn find_by_external_id(
        &self,
        id: &str,
        kind: MediaKind,
    ) -> Result<Option<Metadata>, PipelineError>;

    /// Best matches first.
    async fn search(
        &self,
        title: &str,
        year: Option<i32>,
        kind: MediaKind,
    ) -> Result<Vec<Metadata>, PipelineError>;

    async fn get_episodes(
        &self,
        show_id: i64,
        season_count: i32,
    ) -> Result<Vec<EpisodeMeta>, PipelineError>;

    async fn get_absolute_episode_map(
        &self,
        show_id: i64,
    ) -> Result<AbsoluteEpisodeMap, PipelineError>;
}

#[async_trait::async_trait]
pub trait WatchlistProvider: Send + Sync {
    async fn list(&self) -> Result<Vec<WatchlistEntry>, PipelineError>;

    fn extract_ids(&self, entry: &WatchlistEntry) -> ExternalIds {
        extract_guid_ids(&entry.guids)
    }
}

#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    fn name(&self) -> &str;

    async fn scrape_movie(&self, external_id: &str) -> Result<Vec<Candidate>, PipelineError>;

    async fn scrape_episode(
        &self,
        external_id: &str,
        season: i32,
        episode: i32,
        absolute: Option<i32>,
    ) -> Result<Vec<Candidate>, PipelineError>;
}

#[async_trait::async_trait]
pub trait CacheChecker: Send + Sync {
    /// Lowercased hash -> providers holding it. Hashes nobody holds may be absent.
    async fn check_all(&self, hashes: &[String]) -> Result<CacheAvailability, PipelineError>;
}

#[async_trait::async_trait]
pub trait RemoteStorage: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the provider declined the hash.
    async fn add_by_hash(&self, hash: &str) -> Result<Option<Submission>, PipelineError>;

    async fn add_by_link(&self, link: &str) -> Result<Option<Submission>, PipelineError>;

    async fn get_status(&self, submission: &Submission) -> Result<DownloadStatus, PipelineError>;
}

#[async_trait::async_trait]
pub trait Library: Send + Sync {
    /// Best effort. `false` means the refresh did not go through.
    async fn refresh(&self) -> bool;
}

/// Reads `imdb://`, `tmdb://` and `tvdb://` guids.
#[must_use]
pub fn extract_guid_ids(guids: &[String]) -> ExternalIds {
    let mut ids = ExternalIds::default();
    for guid in guids {
        if let Some(imdb) = guid.strip_prefix("imdb://") {
            ids.imdb = Some(imdb.to_string());
        } else if let Some(tmdb) = guid.strip_prefix("tmdb://") {
            ids.tmdb = tmdb.parse().ok();
        } else if let Some(tvdb) = guid.strip_prefix("tvdb://") {
            ids.tvdb = tvdb.parse().ok();
        }
    }
    ids
}

/// Merges scraper results, keeping the first candidate seen for each hash.
#[must_use]
pub fn dedupe_candidates(batches: Vec<Vec<Candidate>>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for candidate in batches.into_iter().flatten() {
        let key = candidate
            .normalized_hash()
            .or_else(|| candidate.download_url.clone());
        if key.is_some_and(|key| seen.insert(key)) {
            merged.push(candidate);
        }
    }
    merged
}

/// Maps a non-success HTTP status onto the pipeline's error kinds.
///
/// Rate limits, timeouts and server errors are transient. Bad credentials
/// are a configuration problem. Any other 4xx is the provider refusing the
/// request outright, which no amount of retrying will change.
pub(crate) fn status_error(
    service: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> PipelineError {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        PipelineError::rate_limited(service, format!("status={status}"), retry_after)
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        PipelineError::transient(service, format!("status={status}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        PipelineError::ConfigurationMissing(format!("{service} rejected credentials"))
    } else {
        let body = body.trim();
        if body.is_empty() {
            PipelineError::ProviderRejected(format!("{service} request ({status})"))
        } else {
            PipelineError::ProviderRejected(format!("{service} request ({status}): {body}"))
        }
    }
}

/// Builds the error for an unsuccessful response, consuming its body.
pub(crate) async fn error_for_response(service: &str, response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let retry_after = retry_after(response.headers(), Utc::now());
    let body = response.text().await.unwrap_or_default();
    status_error(service, status, retry_after, &body)
}

/// Reads `Retry-After` as either delay seconds or an HTTP date.
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok()
}
