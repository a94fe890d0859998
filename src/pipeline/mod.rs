//! The acquisition state machines.
//!
//! [`Pipeline`] owns the store, the file resolver and injected collaborator
//! handles. Every step runs against one item or episode, commits its result
//! with a conditional write, and never lets an error escape into the batch.

pub mod episode;
pub mod item;
pub mod outcome;
pub mod sweep;
pub mod watchlist;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::clients::{
    CacheChecker, DebridPool, Library, MetadataProvider, PlexClient, ProwlarrScraper, RateGate,
    RemoteStorage, Scraper, StremioScraper, TmdbClient, WatchlistProvider,
};
use crate::config::{Config, RankingConfig};
use crate::db::Store;
use crate::domain::{ItemId, MediaState};
use crate::error::PipelineError;
use crate::models::{Candidate, DownloadStatus, Fingerprint, MediaItem, Submission};
use crate::ranking::{CacheAvailability, RankingContext};
use crate::resolver::{FileResolver, LinkBuilder};

pub use outcome::StepOutcome;
pub use sweep::SweepReport;

/// External collaborators, injected so tests can swap in fakes.
#[derive(Clone)]
pub struct Services {
    pub metadata: Arc<dyn MetadataProvider>,
    pub scrapers: Vec<Arc<dyn Scraper>>,
    pub cache: Arc<dyn CacheChecker>,
    pub storage: Arc<dyn RemoteStorage>,
    pub library: Arc<dyn Library>,
    pub watchlist: Option<Arc<dyn WatchlistProvider>>,
}

impl Services {
    /// Real HTTP collaborators, one rate gate per remote service.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let providers = &config.providers;
        let limits = &config.rate_limit;

        let metadata = TmdbClient::new(&providers.tmdb_api_key, RateGate::new("tmdb", limits))?;
        let mut scrapers: Vec<Arc<dyn Scraper>> = vec![Arc::new(StremioScraper::torrentio(
            &providers.torrentio_url,
            RateGate::new("torrentio", limits),
        )?)];
        if providers.has_mediafusion() {
            scrapers.push(Arc::new(StremioScraper::mediafusion(
                &providers.mediafusion_url,
                RateGate::new("mediafusion", limits),
            )?));
        }
        if providers.has_prowlarr() {
            scrapers.push(Arc::new(ProwlarrScraper::new(
                &providers.prowlarr_url,
                &providers.prowlarr_api_key,
                RateGate::new("prowlarr", limits),
            )?));
        }
        let debrid = Arc::new(DebridPool::from_config(providers, limits)?);
        let plex = Arc::new(PlexClient::new(
            &providers.plex_url,
            &providers.plex_token,
            RateGate::new("plex", limits),
        )?);

        info!(
            providers = ?debrid.provider_names(),
            scrapers = ?scrapers.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            plex = providers.has_plex(),
            "Collaborators configured"
        );

        Ok(Self {
            metadata: Arc::new(metadata),
            scrapers,
            cache: debrid.clone(),
            storage: debrid,
            library: plex.clone(),
            watchlist: providers
                .has_plex()
                .then(|| plex as Arc<dyn WatchlistProvider>),
        })
    }
}

pub struct Pipeline {
    store: Store,
    resolver: Arc<FileResolver>,
    links: LinkBuilder,
    ranking: RankingConfig,
    services: Services,
    sweeping: AtomicBool,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Store,
        resolver: FileResolver,
        links: LinkBuilder,
        ranking: RankingConfig,
        services: Services,
    ) -> Self {
        Self {
            store,
            resolver: Arc::new(resolver),
            links,
            ranking,
            services,
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, store: Store) -> anyhow::Result<Self> {
        Ok(Self::new(
            store,
            FileResolver::local(&config.mount),
            LinkBuilder::new(config.library.clone()),
            config.ranking.clone(),
            Services::from_config(config)?,
        ))
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn links(&self) -> &LinkBuilder {
        &self.links
    }

    fn ranking_context<'a>(&'a self, is_anime: bool, cache: &'a CacheAvailability) -> RankingContext<'a> {
        RankingContext {
            is_anime,
            dubbed_only: self.ranking.dubbed_only,
            cache,
            trusted_groups: &self.ranking.preferred_groups,
        }
    }

    /// Runs a mount lookup off the async runtime; mount listings can be slow.
    async fn resolve<F>(&self, lookup: F) -> Option<PathBuf>
    where
        F: FnOnce(&FileResolver) -> Option<PathBuf> + Send + 'static,
    {
        let resolver = Arc::clone(&self.resolver);
        match tokio::task::spawn_blocking(move || lookup(&resolver)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Mount lookup task failed");
                None
            }
        }
    }

    async fn mount_available(&self) -> bool {
        let resolver = Arc::clone(&self.resolver);
        tokio::task::spawn_blocking(move || resolver.is_available())
            .await
            .unwrap_or(false)
    }

    /// Cache availability for every torrent candidate. A failed check reads as "nothing cached".
    async fn check_cache(&self, candidates: &[Candidate]) -> CacheAvailability {
        let hashes: Vec<String> = candidates.iter().filter_map(Candidate::normalized_hash).collect();
        if hashes.is_empty() {
            return CacheAvailability::new();
        }
        match self.services.cache.check_all(&hashes).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "Cache check failed, ranking without availability");
                CacheAvailability::new()
            }
        }
    }

    /// Submits a stored fingerprint. Declined everywhere is a terminal rejection.
    async fn submit(&self, fingerprint: &Fingerprint) -> Result<Submission, PipelineError> {
        let submission = match fingerprint {
            Fingerprint::Torrent(hash) => self.services.storage.add_by_hash(hash).await?,
            Fingerprint::Usenet(link) => self.services.storage.add_by_link(link).await?,
        };
        submission.ok_or_else(|| PipelineError::ProviderRejected(fingerprint.to_string()))
    }

    /// Status right after a submission. An error here must not lose the
    /// submission, so it reads as still pending.
    async fn initial_status(&self, submission: &Submission) -> DownloadStatus {
        match self.services.storage.get_status(submission).await {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "Status check after submission failed");
                DownloadStatus::Pending
            }
        }
    }

    /// Status of a recorded submission. Without a record the download is
    /// assumed finished and the mount search decides.
    async fn recorded_status(&self, download_id: Option<&str>) -> Result<DownloadStatus, PipelineError> {
        match download_id.and_then(Submission::decode) {
            Some(submission) => self.services.storage.get_status(&submission).await,
            None => Ok(DownloadStatus::Ready { name: None }),
        }
    }

    // ========================================================================
    // Manual operations
    // ========================================================================

    /// Resets one item for another attempt.
    ///
    /// A full retry goes back to REQUESTED. A link-only retry goes back to
    /// DOWNLOADED so only the mount search runs again. For shows the failed
    /// episodes are reset the same way.
    pub async fn retry_item(&self, id: ItemId, link_only: bool) -> anyhow::Result<bool> {
        let Some(item) = self.store.get_item(id).await? else {
            return Ok(false);
        };
        let target = if link_only {
            MediaState::Downloaded
        } else {
            MediaState::Requested
        };

        if item.kind.is_show() {
            let mut reset = 0;
            if link_only {
                for episode in self.store.list_episodes(id).await? {
                    if episode.state == MediaState::Failed
                        && self.store.reset_episode(episode.id, target).await?
                    {
                        reset += 1;
                    }
                }
            } else {
                reset = self.store.reset_failed_episodes(Some(id)).await?;
            }
            info!(item_id = %id, episodes = reset, link_only, "Reset failed episodes");
            if item.state != MediaState::Failed {
                return Ok(true);
            }
            // A show fails before delegation, so it restarts from the top.
            return self.store.reset_item(id, MediaState::Requested).await;
        }

        let reset = self.store.reset_item(id, target).await?;
        info!(item_id = %id, from = %item.state, to = %target, "Item reset for retry");
        Ok(reset)
    }

    /// Every FAILED item and episode back to REQUESTED.
    pub async fn retry_all_failed(&self) -> anyhow::Result<(u64, u64)> {
        let items = self.store.reset_failed_items().await?;
        let episodes = self.store.reset_failed_episodes(None).await?;
        info!(items, episodes, "Reset failed items and episodes");
        Ok((items, episodes))
    }

    /// Ordered teardown: links first, then episodes, then the item.
    pub async fn remove_item(&self, id: ItemId) -> anyhow::Result<bool> {
        let Some(item) = self.store.get_item(id).await? else {
            return Ok(false);
        };

        if item.kind.is_show() {
            let dir = self.links.title_dir(item.kind, &item.title, item.year);
            self.links.remove_dir(&dir).await?;
        } else if let Some(link) = item.symlink_path.as_deref() {
            let link = std::path::Path::new(link);
            self.links.remove_link(link).await?;
            self.links.prune_empty_parent(link).await?;
        }

        let episodes = self.store.delete_episodes(id).await?;
        let deleted = self.store.delete_item(id).await?;
        info!(item_id = %id, title = %item.title, episodes, "Removed item");
        Ok(deleted)
    }
}

/// Merges results from every scraper. Fails only when every scraper failed.
fn merge_scrapes(
    scrapers: &[Arc<dyn Scraper>],
    results: Vec<Result<Vec<Candidate>, PipelineError>>,
) -> Result<Vec<Candidate>, PipelineError> {
    let mut batches = Vec::new();
    let mut last_error = None;
    for (scraper, result) in scrapers.iter().zip(results) {
        match result {
            Ok(found) => {
                debug!(scraper = scraper.name(), count = found.len(), "Scraper finished");
                batches.push(found);
            }
            Err(e) => {
                warn!(scraper = scraper.name(), error = %e, "Scraper failed");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) if batches.is_empty() => Err(e),
        _ => Ok(crate::clients::dedupe_candidates(batches)),
    }
}

/// Runs every scraper concurrently for a movie.
async fn scrape_movie(
    scrapers: &[Arc<dyn Scraper>],
    external_id: &str,
) -> Result<Vec<Candidate>, PipelineError> {
    let results = join_all(scrapers.iter().map(|s| s.scrape_movie(external_id))).await;
    merge_scrapes(scrapers, results)
}

async fn scrape_episode(
    scrapers: &[Arc<dyn Scraper>],
    external_id: &str,
    season: i32,
    episode: i32,
    absolute: Option<i32>,
) -> Result<Vec<Candidate>, PipelineError> {
    let results = join_all(
        scrapers
            .iter()
            .map(|s| s.scrape_episode(external_id, season, episode, absolute)),
    )
    .await;
    merge_scrapes(scrapers, results)
}

/// Logs a committed transition with the fields dashboards key on.
fn log_transition(kind: &str, id: i32, item: &MediaItem, from: MediaState, to: MediaState) {
    if from == to {
        return;
    }
    info!(
        event = "state_changed",
        entity = kind,
        item_id = %item.id,
        id,
        from = %from,
        to = %to,
        title = %item.title,
        "State changed"
    );
}
