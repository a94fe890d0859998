//! Typed payloads returned by the external collaborators.

use crate::domain::MediaKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical metadata for a movie or show.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<i64>,
    pub title: String,
    pub original_title: Option<String>,
    pub alternative_titles: Vec<String>,
    pub year: Option<i32>,
    pub is_anime: bool,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub overview: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: Option<f64>,
    pub number_of_seasons: Option<i32>,
    pub number_of_episodes: Option<i32>,
    pub status: Option<String>,
    pub is_airing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeMeta {
    pub season_number: i32,
    pub episode_number: i32,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
}

/// `(season, episode) -> absolute number` for absolute-ordered shows.
pub type AbsoluteEpisodeMap = HashMap<(i32, i32), i32>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub title: String,
    pub year: Option<i32>,
    pub kind: Option<MediaKind>,
    /// Provider guids such as `imdb://tt0111161` or `tmdb://278`.
    pub guids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIds {
    pub imdb: Option<String>,
    pub tmdb: Option<i64>,
    pub tvdb: Option<i64>,
}

impl ExternalIds {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.imdb.is_none() && self.tmdb.is_none() && self.tvdb.is_none()
    }
}

/// Reference returned when a remote-storage provider accepts a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub provider: String,
    pub provider_id: String,
}

impl Submission {
    /// Persisted form, `<provider>:<id>`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}:{}", self.provider, self.provider_id)
    }

    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let (provider, id) = raw.split_once(':')?;
        if provider.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            provider_id: id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Provider is still fetching; check again on a later pass.
    Pending,
    /// Content is available; `name` is the release folder when reported.
    Ready { name: Option<String> },
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_encoding() {
        let submission = Submission {
            provider: "torbox".to_string(),
            provider_id: "usenet-42".to_string(),
        };
        assert_eq!(submission.encode(), "torbox:usenet-42");
        assert_eq!(Submission::decode("torbox:usenet-42"), Some(submission));
        assert_eq!(Submission::decode("torbox"), None);
        assert_eq!(Submission::decode(":1"), None);
    }
}
