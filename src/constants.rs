pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "mov", "wmv", "flv", "m4v"];

pub mod retry {

    /// Consecutive "file not found" passes tolerated before an item fails.
    pub const MAX_SYMLINK_RETRIES: i32 = 5;
}

pub mod limits {

    pub const ITEM_BATCH: u64 = 10;

    pub const EPISODE_SCRAPE_BATCH: u64 = 20;

    pub const EPISODE_DOWNLOAD_BATCH: u64 = 20;

    pub const EPISODE_SYMLINK_BATCH: u64 = 100;

    /// Cached candidates considered when an episode picks its source.
    pub const CACHED_CANDIDATE_WINDOW: usize = 5;
}

pub mod intervals {
    use std::time::Duration;

    /// Pause between episodes during a background sweep.
    pub const SWEEP_YIELD: Duration = Duration::from_millis(100);
}

pub mod scoring {

    pub const CACHE_BONUS: i64 = 10_000;

    pub const PREFERRED_PROVIDER_BONUS: i64 = 10;

    pub const PREFERRED_PROVIDER: &str = "real_debrid";

    pub const DUAL_AUDIO_BONUS: i64 = 2_000;

    pub const ENGLISH_DUB_BONUS: i64 = 1_500;

    pub const DUBBED_BONUS: i64 = 1_000;

    pub const RAW_PENALTY: i64 = -800;

    pub const TRUSTED_GROUP_BONUS: i64 = 200;

    pub const DUBBED_ONLY_BONUS: i64 = 5_000;

    pub const DUBBED_ONLY_PENALTY: i64 = -10_000;

    pub const FOREIGN_PENALTY: i64 = -500;
}

pub const USENET_PREFIX: &str = "usenet:";
