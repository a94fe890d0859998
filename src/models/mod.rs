pub mod candidate;
pub mod episode;
pub mod media;
pub mod metadata;
pub mod release;

pub use candidate::{Candidate, Fingerprint};
pub use episode::{Episode, NewEpisode};
pub use media::{EpisodeStats, MediaItem, NewMediaItem, ShowStatus};
pub use metadata::{
    AbsoluteEpisodeMap, DownloadStatus, EpisodeMeta, ExternalIds, Metadata, Submission,
    WatchlistEntry,
};
pub use release::Release;
