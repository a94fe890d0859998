use serde::{Deserialize, Serialize};

/// Fields recovered from a release or folder name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub original_name: String,

    pub title: String,

    pub year: Option<i32>,

    pub season: Option<i32>,

    /// Every episode the name claims, so `S03E01E02` yields `[1, 2]`.
    pub episodes: Vec<i32>,

    pub resolution: Option<String>,

    pub source: Option<String>,

    pub group: Option<String>,
}

impl Release {
    #[must_use]
    pub fn effective_season(&self) -> i32 {
        self.season.unwrap_or(1)
    }

    /// A season marker with no episode number reads as a whole-season pack.
    #[must_use]
    pub fn is_season_pack(&self) -> bool {
        self.season.is_some() && self.episodes.is_empty()
    }

    #[must_use]
    pub fn covers_episode(&self, episode: i32) -> bool {
        self.episodes.contains(&episode)
    }
}
