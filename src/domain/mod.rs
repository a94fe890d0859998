//! Domain primitives for tracked media with strong typing.
//!
//! Identifiers follow the newtype pattern so an item id can never be passed
//! where an episode id is expected. Lifecycle states and media kinds are
//! closed enums that round-trip through their persisted string form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                debug_assert!(id >= 0, "ids should be non-negative");
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self::new(id)
            }
        }
    };
}

id_newtype!(
    /// Unique identifier for a tracked movie or show.
    ///
    /// ```rust
    /// use reelarr::domain::ItemId;
    ///
    /// let id = ItemId::new(42);
    /// assert_eq!(id.value(), 42);
    /// assert_eq!(id.to_string(), "42");
    /// ```
    ItemId
);

id_newtype!(
    /// Unique identifier for a single episode row.
    EpisodeId
);

/// The four kinds of media the pipeline tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Show,
    AnimeMovie,
    AnimeShow,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
            Self::AnimeMovie => "anime_movie",
            Self::AnimeShow => "anime_show",
        }
    }

    #[must_use]
    pub const fn is_show(&self) -> bool {
        matches!(self, Self::Show | Self::AnimeShow)
    }

    #[must_use]
    pub const fn is_anime(&self) -> bool {
        matches!(self, Self::AnimeMovie | Self::AnimeShow)
    }

    /// The anime counterpart of this kind.
    #[must_use]
    pub const fn to_anime(self) -> Self {
        match self {
            Self::Movie | Self::AnimeMovie => Self::AnimeMovie,
            Self::Show | Self::AnimeShow => Self::AnimeShow,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "show" | "tv" => Ok(Self::Show),
            "anime_movie" => Ok(Self::AnimeMovie),
            "anime_show" => Ok(Self::AnimeShow),
            other => anyhow::bail!("Unknown media kind: {other}"),
        }
    }
}

/// Lifecycle state shared by items and episodes.
///
/// `Delegated` is only reachable by shows: it means the show is indexed and
/// its episodes are being tracked individually. `Completed` always means the
/// content is linked and the library was notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaState {
    Requested,
    Indexed,
    Scraped,
    Downloading,
    Downloaded,
    Symlinked,
    Completed,
    Delegated,
    Failed,
    Paused,
}

impl MediaState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Indexed => "INDEXED",
            Self::Scraped => "SCRAPED",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Symlinked => "SYMLINKED",
            Self::Completed => "COMPLETED",
            Self::Delegated => "DELEGATED",
            Self::Failed => "FAILED",
            Self::Paused => "PAUSED",
        }
    }

    /// States the pipeline never advances out of on its own.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Delegated | Self::Failed | Self::Paused
        )
    }

    /// States in which acquisition has started but content is not linked yet.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Scraped | Self::Downloading | Self::Downloaded | Self::Symlinked
        )
    }

    /// Every state the pipeline still has work for.
    pub const ADVANCING: [Self; 6] = [
        Self::Requested,
        Self::Indexed,
        Self::Scraped,
        Self::Downloading,
        Self::Downloaded,
        Self::Symlinked,
    ];

    #[must_use]
    pub const fn has_content(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Symlinked | Self::Completed)
    }
}

impl fmt::Display for MediaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REQUESTED" => Ok(Self::Requested),
            "INDEXED" => Ok(Self::Indexed),
            "SCRAPED" => Ok(Self::Scraped),
            "DOWNLOADING" => Ok(Self::Downloading),
            "DOWNLOADED" => Ok(Self::Downloaded),
            "SYMLINKED" => Ok(Self::Symlinked),
            "COMPLETED" => Ok(Self::Completed),
            "DELEGATED" => Ok(Self::Delegated),
            "FAILED" => Ok(Self::Failed),
            "PAUSED" => Ok(Self::Paused),
            other => anyhow::bail!("Unknown media state: {other}"),
        }
    }
}
