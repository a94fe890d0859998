use std::sync::Arc;

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{MetadataProvider, RateGate, error_for_response};
use crate::domain::MediaKind;
use crate::error::PipelineError;
use crate::models::{AbsoluteEpisodeMap, EpisodeMeta, Metadata};

const BASE_URL: &str = "https://api.themoviedb.org/3";

const ANIMATION_GENRE_ID: i64 = 16;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<SearchResult>,
    #[serde(default)]
    tv_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: i64,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIdsPayload {
    imdb_id: Option<String>,
    tvdb_id: Option<i64>,
}

/// Movie and TV detail payloads share this shape; absent fields default.
#[derive(Debug, Deserialize)]
struct Details {
    id: i64,
    title: Option<String>,
    name: Option<String>,
    original_title: Option<String>,
    original_name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    imdb_id: Option<String>,
    #[serde(default)]
    external_ids: ExternalIdsPayload,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    overview: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    vote_average: Option<f64>,
    number_of_seasons: Option<i32>,
    number_of_episodes: Option<i32>,
    status: Option<String>,
    #[serde(default)]
    in_production: bool,
    #[serde(default)]
    origin_country: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AlternativeTitles {
    #[serde(default)]
    results: Vec<AlternativeTitle>,
    #[serde(default)]
    titles: Vec<AlternativeTitle>,
}

#[derive(Debug, Deserialize)]
struct AlternativeTitle {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Season {
    #[serde(default)]
    episodes: Vec<SeasonEpisode>,
}

#[derive(Debug, Deserialize)]
struct SeasonEpisode {
    season_number: Option<i32>,
    episode_number: i32,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeGroups {
    #[serde(default)]
    results: Vec<EpisodeGroupSummary>,
}

#[derive(Debug, Deserialize)]
struct EpisodeGroupSummary {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct EpisodeGroupDetails {
    #[serde(default)]
    groups: Vec<EpisodeGroup>,
}

#[derive(Debug, Deserialize)]
struct EpisodeGroup {
    #[serde(default)]
    episodes: Vec<GroupedEpisode>,
}

#[derive(Debug, Deserialize)]
struct GroupedEpisode {
    season_number: Option<i32>,
    episode_number: Option<i32>,
    order: Option<i32>,
}

pub struct TmdbClient {
    client: Client,
    gate: Arc<RateGate>,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
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

    /// GET `path`; a 404 reads as `None`.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, PipelineError> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigurationMissing("tmdb_api_key".into()));
        }
        let url = format!("{}{path}", self.base_url);

        self.gate
            .run(|| async {
                let response = self
                    .client
                    .get(&url)
                    .query(&[("api_key", self.api_key.as_str())])
                    .query(query)
                    .send()
                    .await
                    .map_err(|e| PipelineError::transient("tmdb", e.to_string()))?;

                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    return Err(error_for_response("tmdb", response).await);
                }

                response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(|e| PipelineError::transient("tmdb", format!("invalid payload: {e}")))
            })
            .await
    }

    async fn details(&self, id: i64, kind: MediaKind) -> Result<Option<Metadata>, PipelineError> {
        let segment = media_segment(kind);
        let Some(details) = self
            .get::<Details>(
                &format!("/{segment}/{id}"),
                &[("append_to_response", "external_ids".to_string())],
            )
            .await?
        else {
            return Ok(None);
        };

        let mut metadata = into_metadata(details, kind);
        metadata.alternative_titles = self.alternative_titles(id, kind).await?;
        Ok(Some(metadata))
    }

    async fn alternative_titles(&self, id: i64, kind: MediaKind) -> Result<Vec<String>, PipelineError> {
        let segment = media_segment(kind);
        let payload = self
            .get::<AlternativeTitles>(&format!("/{segment}/{id}/alternative_titles"), &[])
            .await?;

        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let mut titles: Vec<String> = Vec::new();
        for entry in payload.results.into_iter().chain(payload.titles) {
            if !entry.title.is_empty() && !titles.contains(&entry.title) {
                titles.push(entry.title);
            }
        }
        debug!(tmdb_id = id, count = titles.len(), "Fetched alternative titles");
        Ok(titles)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbClient {
    async fn find_by_external_id(
        &self,
        id: &str,
        kind: MediaKind,
    ) -> Result<Option<Metadata>, PipelineError> {
        if let Ok(tmdb_id) = id.parse::<i64>() {
            return self.details(tmdb_id, kind).await;
        }

        let Some(found) = self
            .get::<FindResponse>(
                &format!("/find/{id}"),
                &[("external_source", "imdb_id".to_string())],
            )
            .await?
        else {
            return Ok(None);
        };

        let hit = if kind.is_show() {
            found.tv_results.first().or_else(|| found.movie_results.first())
        } else {
            found.movie_results.first().or_else(|| found.tv_results.first())
        };
        match hit {
            Some(hit) => self.details(hit.id, kind).await,
            None => Ok(None),
        }
    }

    async fn search(
        &self,
        title: &str,
        year: Option<i32>,
        kind: MediaKind,
    ) -> Result<Vec<Metadata>, PipelineError> {
        let mut query = vec![("query", title.to_string())];
        if let Some(year) = year {
            let key = if kind.is_show() {
                "first_air_date_year"
            } else {
                "year"
            };
            query.push((key, year.to_string()));
        }

        let path = format!("/search/{}", media_segment(kind));
        let results = self
            .get::<SearchResponse>(&path, &query)
            .await?
            .map(|r| r.results)
            .unwrap_or_default();

        // Only the best hit needs full details.
        match results.first() {
            Some(best) => Ok(self.details(best.id, kind).await?.into_iter().collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn get_episodes(
        &self,
        show_id: i64,
        season_count: i32,
    ) -> Result<Vec<EpisodeMeta>, PipelineError> {
        let mut episodes = Vec::new();
        for season_number in 1..=season_count {
            let Some(season) = self
                .get::<Season>(&format!("/tv/{show_id}/season/{season_number}"), &[])
                .await?
            else {
                continue;
            };
            episodes.extend(season.episodes.into_iter().map(|ep| EpisodeMeta {
                season_number: ep.season_number.unwrap_or(season_number),
                episode_number: ep.episode_number,
                title: ep.name,
                overview: ep.overview,
                air_date: ep.air_date,
            }));
        }

        info!(tmdb_id = show_id, count = episodes.len(), "Fetched show episodes");
        Ok(episodes)
    }

    async fn get_absolute_episode_map(
        &self,
        show_id: i64,
    ) -> Result<AbsoluteEpisodeMap, PipelineError> {
        let groups = self
            .get::<EpisodeGroups>(&format!("/tv/{show_id}/episode_groups"), &[])
            .await?
            .map(|g| g.results)
            .unwrap_or_default();

        let Some(group) = groups
            .iter()
            .find(|g| g.name.to_lowercase().contains("absolute"))
        else {
            debug!(tmdb_id = show_id, "No absolute order episode group");
            return Ok(AbsoluteEpisodeMap::new());
        };

        let details = self
            .get::<EpisodeGroupDetails>(&format!("/tv/episode_group/{}", group.id), &[])
            .await?;

        let map = details.map(|d| absolute_map(&d)).unwrap_or_default();
        info!(tmdb_id = show_id, entries = map.len(), "Built absolute episode map");
        Ok(map)
    }
}

const fn media_segment(kind: MediaKind) -> &'static str {
    if kind.is_show() { "tv" } else { "movie" }
}

/// Japanese origin plus the Animation genre.
fn detect_anime(details: &Details) -> bool {
    details.origin_country.iter().any(|c| c == "JP")
        && details.genres.iter().any(|g| g.id == ANIMATION_GENRE_ID)
}

fn into_metadata(details: Details, kind: MediaKind) -> Metadata {
    let is_anime = detect_anime(&details);
    let (title, original_title, date) = if kind.is_show() {
        (details.name, details.original_name, details.first_air_date)
    } else {
        (details.title, details.original_title, details.release_date)
    };

    Metadata {
        tmdb_id: Some(details.id),
        imdb_id: details.external_ids.imdb_id.or(details.imdb_id),
        tvdb_id: details.external_ids.tvdb_id,
        title: title.unwrap_or_default(),
        original_title,
        alternative_titles: Vec::new(),
        year: date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok()),
        is_anime,
        poster_path: details.poster_path,
        backdrop_path: details.backdrop_path,
        overview: details.overview,
        genres: details.genres.into_iter().map(|g| g.name).collect(),
        vote_average: details.vote_average,
        number_of_seasons: details.number_of_seasons,
        number_of_episodes: details.number_of_episodes,
        is_airing: details.in_production
            || details
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("Returning Series")),
        status: details.status,
    }
}

/// The `order` field inside an absolute-order group is zero-based.
fn absolute_map(details: &EpisodeGroupDetails) -> AbsoluteEpisodeMap {
    let mut map = AbsoluteEpisodeMap::new();
    for episode in details.groups.iter().flat_map(|g| &g.episodes) {
        if let (Some(season), Some(number), Some(order)) =
            (episode.season_number, episode.episode_number, episode.order)
        {
            map.insert((season, number), order + 1);
        }
    }
    map
}
