use crate::domain::{EpisodeId, ItemId, MediaState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Episode {
    pub id: EpisodeId,

    pub item_id: ItemId,

    pub season_number: i32,

    pub episode_number: i32,

    /// Show-wide sequential number, used by absolute-ordered anime releases.
    pub absolute_episode_number: Option<i32>,

    pub title: Option<String>,

    pub overview: Option<String>,

    pub air_date: Option<String>,

    pub state: MediaState,

    pub file_path: Option<String>,

    pub symlink_path: Option<String>,

    /// Release folder or torrent name once acquisition reports one.
    pub torrent_name: Option<String>,

    pub download_id: Option<String>,

    pub last_error: Option<String>,

    pub retry_count: i32,

    pub created_at: String,

    pub updated_at: String,
}

impl Episode {
    #[must_use]
    pub fn label(&self) -> String {
        format!("S{:02}E{:02}", self.season_number, self.episode_number)
    }
}

/// One row to insert during episode materialization.
#[derive(Debug, Clone, Default)]
pub struct NewEpisode {
    pub season_number: i32,
    pub episode_number: i32,
    pub absolute_episode_number: Option<i32>,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    /// Pre-resolved file on the mount; such episodes start at `DOWNLOADED`.
    pub file_path: Option<String>,
    pub torrent_name: Option<String>,
}
