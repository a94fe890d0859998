use crate::domain::{ItemId, MediaKind, MediaState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub id: ItemId,

    pub imdb_id: Option<String>,

    pub tmdb_id: Option<i64>,

    pub tvdb_id: Option<i64>,

    pub title: String,

    pub original_title: Option<String>,

    pub alternative_titles: Vec<String>,

    pub year: Option<i32>,

    pub kind: MediaKind,

    pub state: MediaState,

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

    /// Candidate fingerprint before download, resolved file path afterwards.
    pub file_path: Option<String>,

    pub symlink_path: Option<String>,

    /// Release name reported by the remote-storage provider once known.
    pub torrent_name: Option<String>,

    /// Remote-storage submission awaiting completion, as `<provider>:<id>`.
    pub download_id: Option<String>,

    pub last_error: Option<String>,

    pub retry_count: i32,

    pub created_at: String,

    pub updated_at: String,

    pub completed_at: Option<String>,
}

impl MediaItem {
    /// Every title the item may appear under on the mount, primary first.
    #[must_use]
    pub fn search_titles(&self) -> Vec<String> {
        let mut titles = vec![self.title.clone()];
        for title in self.original_title.iter().chain(&self.alternative_titles) {
            if !titles.iter().any(|t| t.eq_ignore_ascii_case(title)) {
                titles.push(title.clone());
            }
        }
        titles
    }
}

/// Fields accepted when a new item is requested.
#[derive(Debug, Clone, Default)]
pub struct NewMediaItem {
    pub title: String,
    pub year: Option<i32>,
    pub kind: Option<MediaKind>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
}

/// Aggregate status of a show derived from its episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    Pending,
    Downloading,
    Partial,
    Completed,
    Running,
    Failed,
}

impl ShowStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    /// A fully linked show that is still airing reports `Running`.
    #[must_use]
    pub const fn from_stats(stats: &EpisodeStats, is_airing: bool) -> Self {
        if stats.total == 0 {
            Self::Pending
        } else if stats.completed == stats.total {
            if is_airing {
                Self::Running
            } else {
                Self::Completed
            }
        } else if stats.completed > 0 {
            Self::Partial
        } else if stats.failed == stats.total {
            Self::Failed
        } else {
            Self::Downloading
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
}

impl EpisodeStats {
    #[must_use]
    pub fn from_states(states: impl IntoIterator<Item = MediaState>) -> Self {
        let mut stats = Self::default();
        for state in states {
            stats.total += 1;
            match state {
                MediaState::Completed => stats.completed += 1,
                MediaState::Failed => stats.failed += 1,
                _ => stats.pending += 1,
            }
        }
        stats
    }
}
