use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::MediaKind;
use crate::ranking::DEFAULT_TRUSTED_GROUPS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub mount: MountConfig,

    pub library: LibraryConfig,

    pub scheduler: SchedulerConfig,

    pub ranking: RankingConfig,

    pub providers: ProvidersConfig,

    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/reelarr.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Root of the remote-storage mount, read only.
    pub mount_path: String,

    /// Subdirectories of the mount searched for releases, in order.
    pub search_dirs: Vec<String>,

    /// Folder names never treated as releases.
    pub ignored_names: Vec<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_path: "/mnt/zurg".to_string(),
            search_dirs: vec![
                "__all__".to_string(),
                "shows".to_string(),
                "anime".to_string(),
                "movies".to_string(),
            ],
            ignored_names: vec![
                "sample".to_string(),
                "extras".to_string(),
                "featurettes".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the symlink tree the media server reads.
    pub symlink_path: String,

    pub movies_folder: String,

    pub shows_folder: String,

    pub anime_movies_folder: String,

    pub anime_shows_folder: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            symlink_path: "/mnt/media".to_string(),
            movies_folder: "movies".to_string(),
            shows_folder: "tvshows".to_string(),
            anime_movies_folder: "anime_movies".to_string(),
            anime_shows_folder: "anime_shows".to_string(),
        }
    }
}

impl LibraryConfig {
    #[must_use]
    pub fn folder_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Movie => &self.movies_folder,
            MediaKind::Show => &self.shows_folder,
            MediaKind::AnimeMovie => &self.anime_movies_folder,
            MediaKind::AnimeShow => &self.anime_shows_folder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub pending_items_seconds: u64,

    pub episode_scrape_seconds: u64,

    pub episode_download_seconds: u64,

    pub episode_symlink_seconds: u64,

    pub sweep_seconds: u64,

    pub watchlist_seconds: u64,

    /// Overrides `sweep_seconds` when set.
    pub sweep_cron: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_items_seconds: 10,
            episode_scrape_seconds: 15,
            episode_download_seconds: 15,
            episode_symlink_seconds: 30,
            sweep_seconds: 60,
            watchlist_seconds: 300,
            sweep_cron: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Make dub status the deciding factor for anime.
    pub dubbed_only: bool,

    pub preferred_groups: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            dubbed_only: false,
            preferred_groups: DEFAULT_TRUSTED_GROUPS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub tmdb_api_key: String,

    pub real_debrid_token: String,

    pub torbox_api_key: String,

    pub plex_url: String,

    pub plex_token: String,

    pub torrentio_url: String,

    /// MediaFusion addon root. Empty leaves the scraper off.
    pub mediafusion_url: String,

    pub prowlarr_url: String,

    /// Prowlarr is only queried when a key is set.
    pub prowlarr_api_key: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: String::new(),
            real_debrid_token: String::new(),
            torbox_api_key: String::new(),
            plex_url: "http://localhost:32400".to_string(),
            plex_token: String::new(),
            torrentio_url: "https://torrentio.strem.fun".to_string(),
            mediafusion_url: String::new(),
            prowlarr_url: "http://localhost:9696".to_string(),
            prowlarr_api_key: String::new(),
        }
    }
}

impl ProvidersConfig {
    #[must_use]
    pub fn has_real_debrid(&self) -> bool {
        !self.real_debrid_token.is_empty()
    }

    #[must_use]
    pub fn has_torbox(&self) -> bool {
        !self.torbox_api_key.is_empty()
    }

    #[must_use]
    pub fn has_plex(&self) -> bool {
        !self.plex_token.is_empty()
    }

    #[must_use]
    pub fn has_mediafusion(&self) -> bool {
        !self.mediafusion_url.trim().is_empty()
    }

    #[must_use]
    pub fn has_prowlarr(&self) -> bool {
        !self.prowlarr_api_key.is_empty() && !self.prowlarr_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed in flight per collaborator.
    pub max_concurrent: usize,

    pub requests_per_second: u32,

    /// Attempts after the first before a call gives up.
    pub retries: u32,

    pub initial_backoff_seconds: u64,

    pub request_timeout_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            requests_per_second: 4,
            retries: 3,
            initial_backoff_seconds: 2,
            request_timeout_seconds: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("reelarr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".reelarr").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mount.mount_path.trim().is_empty() {
            anyhow::bail!("Mount path cannot be empty");
        }

        if self.library.symlink_path.trim().is_empty() {
            anyhow::bail!("Symlink path cannot be empty");
        }

        let s = &self.scheduler;
        if s.enabled {
            let intervals = [
                ("pending_items_seconds", s.pending_items_seconds),
                ("episode_scrape_seconds", s.episode_scrape_seconds),
                ("episode_download_seconds", s.episode_download_seconds),
                ("episode_symlink_seconds", s.episode_symlink_seconds),
                ("watchlist_seconds", s.watchlist_seconds),
            ];
            if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
                anyhow::bail!("Scheduler interval {name} must be > 0");
            }
            if s.sweep_seconds == 0 && s.sweep_cron.is_none() {
                anyhow::bail!("Sweep interval must be > 0 or sweep_cron must be set");
            }
        }

        if self.rate_limit.max_concurrent == 0 || self.rate_limit.requests_per_second == 0 {
            anyhow::bail!("Rate limit concurrency and requests_per_second must be > 0");
        }

        Ok(())
    }
}
