//! End-to-end runs of the item and episode state machines against a temp
//! database, an in-memory mount and hand-written collaborators.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reelarr::clients::debrid::DebridBackend;
use reelarr::clients::{
    CacheChecker, DebridPool, Library, MetadataProvider, RemoteStorage, Scraper,
    WatchlistProvider,
};
use reelarr::config::{LibraryConfig, MountConfig, RankingConfig};
use reelarr::db::Store;
use reelarr::domain::{ItemId, MediaKind, MediaState};
use reelarr::error::PipelineError;
use reelarr::models::{
    AbsoluteEpisodeMap, Candidate, DownloadStatus, EpisodeMeta, Metadata, NewEpisode,
    NewMediaItem, Submission, WatchlistEntry,
};
use reelarr::pipeline::{Pipeline, Services, StepOutcome};
use reelarr::ranking::CacheAvailability;
use reelarr::resolver::{FileResolver, LinkBuilder, MemoryMount};

const GB: u64 = 1024 * 1024 * 1024;

struct FakeMetadata {
    found: Option<Metadata>,
    episodes: Vec<EpisodeMeta>,
}

#[async_trait::async_trait]
impl MetadataProvider for FakeMetadata {
    async fn find_by_external_id(
        &self,
        _id: &str,
        _kind: MediaKind,
    ) -> Result<Option<Metadata>, PipelineError> {
        Ok(self.found.clone())
    }

    async fn search(
        &self,
        _title: &str,
        _year: Option<i32>,
        _kind: MediaKind,
    ) -> Result<Vec<Metadata>, PipelineError> {
        Ok(self.found.clone().into_iter().collect())
    }

    async fn get_episodes(
        &self,
        _show_id: i64,
        _season_count: i32,
    ) -> Result<Vec<EpisodeMeta>, PipelineError> {
        Ok(self.episodes.clone())
    }

    async fn get_absolute_episode_map(
        &self,
        _show_id: i64,
    ) -> Result<AbsoluteEpisodeMap, PipelineError> {
        Ok(AbsoluteEpisodeMap::new())
    }
}

struct FakeScraper {
    candidates: Vec<Candidate>,
}

#[async_trait::async_trait]
impl Scraper for FakeScraper {
    fn name(&self) -> &str {
        "fake"
    }

    async fn scrape_movie(&self, _external_id: &str) -> Result<Vec<Candidate>, PipelineError> {
        Ok(self.candidates.clone())
    }

    async fn scrape_episode(
        &self,
        _external_id: &str,
        _season: i32,
        _episode: i32,
        _absolute: Option<i32>,
    ) -> Result<Vec<Candidate>, PipelineError> {
        Ok(self.candidates.clone())
    }
}

/// Reports hashes as cached on Real-Debrid: all of them, or only the listed ones.
struct FakeCache {
    only: Option<Vec<String>>,
}

#[async_trait::async_trait]
impl CacheChecker for FakeCache {
    async fn check_all(&self, hashes: &[String]) -> Result<CacheAvailability, PipelineError> {
        Ok(hashes
            .iter()
            .filter(|h| self.only.as_ref().is_none_or(|only| only.contains(h)))
            .map(|h| (h.clone(), vec!["real_debrid".to_string()]))
            .collect())
    }
}

/// A provider that turns every hash away with a 400, as Real-Debrid does for
/// infringing content.
struct RejectingProvider {
    attempts: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl RemoteStorage for RejectingProvider {
    fn name(&self) -> &str {
        "real_debrid"
    }

    async fn add_by_hash(&self, _hash: &str) -> Result<Option<Submission>, PipelineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::ProviderRejected(
            "real_debrid request (400 Bad Request): infringing_file".to_string(),
        ))
    }

    async fn add_by_link(&self, _link: &str) -> Result<Option<Submission>, PipelineError> {
        Ok(None)
    }

    async fn get_status(&self, _submission: &Submission) -> Result<DownloadStatus, PipelineError> {
        Ok(DownloadStatus::Pending)
    }
}

#[async_trait::async_trait]
impl CacheChecker for RejectingProvider {
    async fn check_all(&self, _hashes: &[String]) -> Result<CacheAvailability, PipelineError> {
        Ok(CacheAvailability::new())
    }
}

struct FakeStorage {
    release: String,
    submissions: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl RemoteStorage for FakeStorage {
    fn name(&self) -> &str {
        "fake"
    }

    async fn add_by_hash(&self, hash: &str) -> Result<Option<Submission>, PipelineError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Submission {
            provider: "fake".to_string(),
            provider_id: hash.to_string(),
        }))
    }

    async fn add_by_link(&self, _link: &str) -> Result<Option<Submission>, PipelineError> {
        Ok(None)
    }

    async fn get_status(&self, _submission: &Submission) -> Result<DownloadStatus, PipelineError> {
        Ok(DownloadStatus::Ready {
            name: Some(self.release.clone()),
        })
    }
}

struct FakeLibrary {
    refreshes: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Library for FakeLibrary {
    async fn refresh(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        true
    }
}

struct FakeWatchlist {
    entries: Vec<WatchlistEntry>,
}

#[async_trait::async_trait]
impl WatchlistProvider for FakeWatchlist {
    async fn list(&self) -> Result<Vec<WatchlistEntry>, PipelineError> {
        Ok(self.entries.clone())
    }
}

struct Harness {
    pipeline: Pipeline,
    library_root: PathBuf,
    submissions: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
}

struct Setup {
    mount: MemoryMount,
    metadata: FakeMetadata,
    candidates: Vec<Candidate>,
    /// `None` reports every hash as cached.
    cached: Option<Vec<String>>,
    release: String,
    /// Replaces the default accepting storage.
    storage: Option<Arc<dyn RemoteStorage>>,
    ranking: RankingConfig,
    watchlist: Vec<WatchlistEntry>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            mount: MemoryMount::new(),
            metadata: FakeMetadata {
                found: None,
                episodes: vec![],
            },
            candidates: vec![],
            cached: None,
            release: String::new(),
            storage: None,
            ranking: RankingConfig::default(),
            watchlist: vec![],
        }
    }
}

async fn harness(setup: Setup) -> Harness {
    let db_path =
        std::env::temp_dir().join(format!("reelarr-pipeline-test-{}.db", uuid::Uuid::new_v4()));
    let store = Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("Failed to open test database");

    let library_root =
        std::env::temp_dir().join(format!("reelarr-pipeline-library-{}", uuid::Uuid::new_v4()));
    let library = LibraryConfig {
        symlink_path: library_root.display().to_string(),
        ..LibraryConfig::default()
    };
    let mount = MountConfig {
        mount_path: "/mnt".to_string(),
        ..MountConfig::default()
    };

    let submissions = Arc::new(AtomicUsize::new(0));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let services = Services {
        metadata: Arc::new(setup.metadata),
        scrapers: vec![Arc::new(FakeScraper {
            candidates: setup.candidates,
        })],
        cache: Arc::new(FakeCache { only: setup.cached }),
        storage: setup.storage.unwrap_or_else(|| {
            Arc::new(FakeStorage {
                release: setup.release,
                submissions: Arc::clone(&submissions),
            }) as Arc<dyn RemoteStorage>
        }),
        library: Arc::new(FakeLibrary {
            refreshes: Arc::clone(&refreshes),
        }),
        watchlist: (!setup.watchlist.is_empty()).then(|| {
            Arc::new(FakeWatchlist {
                entries: setup.watchlist,
            }) as Arc<dyn WatchlistProvider>
        }),
    };

    let pipeline = Pipeline::new(
        store,
        FileResolver::new(Arc::new(setup.mount), &mount),
        LinkBuilder::new(library),
        setup.ranking,
        services,
    );

    Harness {
        pipeline,
        library_root,
        submissions,
        refreshes,
    }
}

fn matrix() -> Metadata {
    Metadata {
        tmdb_id: Some(603),
        imdb_id: Some("tt0133093".to_string()),
        title: "The Matrix".to_string(),
        year: Some(1999),
        ..Default::default()
    }
}

fn candidate(hash: &str, title: &str) -> Candidate {
    Candidate {
        info_hash: Some(hash.to_string()),
        title: title.to_string(),
        source: "fake".to_string(),
        ..Default::default()
    }
}

async fn add_movie(pipeline: &Pipeline) -> ItemId {
    pipeline
        .store()
        .add_item(&NewMediaItem {
            title: "The Matrix".to_string(),
            year: Some(1999),
            kind: Some(MediaKind::Movie),
            imdb_id: Some("tt0133093".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

/// Advances the stored item once and returns its new state.
async fn step(pipeline: &Pipeline, id: ItemId) -> MediaState {
    let item = pipeline.store().get_item(id).await.unwrap().unwrap();
    pipeline.advance(&item).await.unwrap();
    pipeline.store().get_item(id).await.unwrap().unwrap().state
}

/// A show already handed over to episode tracking, with three unfiled episodes.
async fn delegated_show(pipeline: &Pipeline) -> ItemId {
    delegated(
        pipeline,
        NewMediaItem {
            title: "Breaking Bad".to_string(),
            year: Some(2008),
            kind: Some(MediaKind::Show),
            imdb_id: Some("tt0903747".to_string()),
            tmdb_id: Some(1396),
            ..Default::default()
        },
    )
    .await
}

async fn delegated(pipeline: &Pipeline, show: NewMediaItem) -> ItemId {
    let store = pipeline.store();
    let id = store.add_item(&show).await.unwrap().id;
    store.reset_item(id, MediaState::Delegated).await.unwrap();

    let rows: Vec<NewEpisode> = (1..=3)
        .map(|n| NewEpisode {
            season_number: 1,
            episode_number: n,
            ..Default::default()
        })
        .collect();
    assert_eq!(store.materialize_episodes(id, &rows).await.unwrap(), 3);
    id
}

#[tokio::test]
async fn test_movie_runs_to_completed() {
    let release = "The.Matrix.1999.1080p.BluRay.x264";
    let h = harness(Setup {
        mount: MemoryMount::new().with_file(
            format!("/mnt/__all__/{release}/{release}.mkv"),
            8 * GB,
        ),
        metadata: FakeMetadata {
            found: Some(matrix()),
            episodes: vec![],
        },
        candidates: vec![
            candidate("DEADBEEF", "The.Matrix.1999.480p.CAM"),
            candidate("ABC123", release),
        ],
        release: release.to_string(),
        ..Setup::default()
    })
    .await;
    let id = add_movie(&h.pipeline).await;

    assert_eq!(step(&h.pipeline, id).await, MediaState::Indexed);
    assert_eq!(step(&h.pipeline, id).await, MediaState::Scraped);
    let scraped = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(scraped.file_path.as_deref(), Some("abc123"));

    assert_eq!(step(&h.pipeline, id).await, MediaState::Downloaded);
    assert_eq!(h.submissions.load(Ordering::SeqCst), 1);
    let downloaded = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(downloaded.download_id.as_deref(), Some("fake:abc123"));
    assert_eq!(downloaded.torrent_name.as_deref(), Some(release));

    assert_eq!(step(&h.pipeline, id).await, MediaState::Symlinked);
    assert_eq!(step(&h.pipeline, id).await, MediaState::Completed);
    assert_eq!(h.refreshes.load(Ordering::SeqCst), 1);

    let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert!(item.completed_at.is_some());
    let link = item.symlink_path.expect("symlink path recorded");
    assert_eq!(
        Path::new(&link),
        h.library_root
            .join("movies")
            .join("The Matrix (1999)")
            .join("The Matrix (1999).mkv")
    );
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        PathBuf::from(format!("/mnt/__all__/{release}/{release}.mkv"))
    );

    // Terminal states are left alone.
    assert_eq!(step(&h.pipeline, id).await, MediaState::Completed);

    // Removing the movie takes its now-empty title folder with it.
    assert!(h.pipeline.remove_item(id).await.unwrap());
    assert!(!Path::new(&link).exists());
    assert!(!h.library_root.join("movies").join("The Matrix (1999)").exists());
    assert!(h.library_root.join("movies").is_dir());
}

#[tokio::test]
async fn test_rejected_submission_fails_item() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let rejecting: Arc<dyn DebridBackend> = Arc::new(RejectingProvider {
        attempts: Arc::clone(&attempts),
    });
    let h = harness(Setup {
        metadata: FakeMetadata {
            found: Some(matrix()),
            episodes: vec![],
        },
        candidates: vec![candidate("ABC123", "The.Matrix.1999.1080p.BluRay.x264")],
        storage: Some(Arc::new(DebridPool::new(vec![rejecting]))),
        ..Setup::default()
    })
    .await;
    let id = add_movie(&h.pipeline).await;

    assert_eq!(step(&h.pipeline, id).await, MediaState::Indexed);
    assert_eq!(step(&h.pipeline, id).await, MediaState::Scraped);
    assert_eq!(step(&h.pipeline, id).await, MediaState::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(item.retry_count, 1);
    assert!(item.last_error.unwrap().contains("abc123"));
    assert!(item.download_id.is_none());

    // A failed item is out of the due list, so the provider is not asked again.
    assert!(h.pipeline.process_due_items().await.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_all_failed_requeues_with_fresh_timestamp() {
    let h = harness(Setup::default()).await;
    let id = add_movie(&h.pipeline).await;
    assert_eq!(step(&h.pipeline, id).await, MediaState::Failed);
    let failed = h.pipeline.store().get_item(id).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(h.pipeline.retry_all_failed().await.unwrap(), (1, 0));

    let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(item.state, MediaState::Requested);
    assert_eq!(item.retry_count, 0);
    assert!(item.last_error.is_none());
    let parse = |at: &str| chrono::DateTime::parse_from_rfc3339(at).unwrap();
    assert!(parse(&item.updated_at) > parse(&failed.updated_at));
}

#[tokio::test]
async fn test_unknown_title_fails_with_metadata_error() {
    let h = harness(Setup::default()).await;
    let id = add_movie(&h.pipeline).await;

    assert_eq!(step(&h.pipeline, id).await, MediaState::Failed);
    let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(item.retry_count, 1);
    assert!(item.last_error.unwrap().contains("The Matrix"));
}

#[tokio::test]
async fn test_missing_file_fails_after_retry_ceiling() {
    let h = harness(Setup {
        mount: MemoryMount::new().with_file("/mnt/__all__/Unrelated.Thing/thing.mkv", GB),
        metadata: FakeMetadata {
            found: Some(matrix()),
            episodes: vec![],
        },
        candidates: vec![candidate("ABC123", "The.Matrix.1999.1080p")],
        release: "Never.Arrives".to_string(),
        ..Setup::default()
    })
    .await;
    let id = add_movie(&h.pipeline).await;

    for _ in 0..3 {
        step(&h.pipeline, id).await;
    }
    assert_eq!(
        h.pipeline.store().get_item(id).await.unwrap().unwrap().state,
        MediaState::Downloaded
    );

    for attempt in 1..5 {
        assert_eq!(step(&h.pipeline, id).await, MediaState::Downloaded);
        let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
        assert_eq!(item.retry_count, attempt);
    }

    assert_eq!(step(&h.pipeline, id).await, MediaState::Failed);
    let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(item.retry_count, 5);
    assert!(item.last_error.is_some());

    // A link-only retry goes straight back to the mount search.
    assert!(h.pipeline.retry_item(id, true).await.unwrap());
    let item = h.pipeline.store().get_item(id).await.unwrap().unwrap();
    assert_eq!(item.state, MediaState::Downloaded);
    assert_eq!(item.retry_count, 0);
    assert!(item.last_error.is_none());
}

#[tokio::test]
async fn test_stale_item_does_not_overwrite_newer_state() {
    let h = harness(Setup {
        metadata: FakeMetadata {
            found: Some(matrix()),
            episodes: vec![],
        },
        ..Setup::default()
    })
    .await;
    let id = add_movie(&h.pipeline).await;
    let stale = h.pipeline.store().get_item(id).await.unwrap().unwrap();

    assert_eq!(step(&h.pipeline, id).await, MediaState::Indexed);

    let outcome = h.pipeline.advance(&stale).await.unwrap();
    assert!(matches!(outcome, StepOutcome::Waiting(_)));
    assert_eq!(
        h.pipeline.store().get_item(id).await.unwrap().unwrap().state,
        MediaState::Indexed
    );
}

#[tokio::test]
async fn test_show_delegates_and_materializes_once() {
    let h = harness(Setup {
        mount: MemoryMount::new().with_file(
            "/mnt/__all__/Breaking.Bad.S01E01.1080p/Breaking.Bad.S01E01.1080p.mkv",
            2 * GB,
        ),
        metadata: FakeMetadata {
            found: Some(Metadata {
                tmdb_id: Some(1396),
                imdb_id: Some("tt0903747".to_string()),
                title: "Breaking Bad".to_string(),
                year: Some(2008),
                number_of_seasons: Some(1),
                ..Default::default()
            }),
            episodes: (1..=3)
                .map(|n| EpisodeMeta {
                    season_number: 1,
                    episode_number: n,
                    title: Some(format!("Episode {n}")),
                    ..Default::default()
                })
                .collect(),
        },
        ..Setup::default()
    })
    .await;
    let store = h.pipeline.store();
    let id = store
        .add_item(&NewMediaItem {
            title: "Breaking Bad".to_string(),
            kind: Some(MediaKind::Show),
            imdb_id: Some("tt0903747".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .id;

    assert_eq!(step(&h.pipeline, id).await, MediaState::Indexed);
    assert_eq!(step(&h.pipeline, id).await, MediaState::Delegated);

    let episodes = store.list_episodes(id).await.unwrap();
    assert_eq!(episodes.len(), 3);
    assert_eq!(episodes[0].state, MediaState::Downloaded);
    assert_eq!(
        episodes[0].torrent_name.as_deref(),
        Some("Breaking.Bad.S01E01.1080p")
    );
    assert!(episodes[1..].iter().all(|e| e.state == MediaState::Requested));

    let item = store.get_item(id).await.unwrap().unwrap();
    assert_eq!(h.pipeline.materialize_episodes(&item).await.unwrap(), 0);
    assert_eq!(store.list_episodes(id).await.unwrap().len(), 3);

    // The pre-found episode links and completes in one pass.
    let report = h.pipeline.process_episode_links().await.unwrap();
    assert_eq!(report.advanced, 2);
    assert_eq!(h.refreshes.load(Ordering::SeqCst), 1);
    let first = &store.list_episodes(id).await.unwrap()[0];
    assert_eq!(first.state, MediaState::Completed);
    assert!(
        Path::new(first.symlink_path.as_deref().unwrap())
            .ends_with("Breaking Bad (2008)/Season 01/Breaking Bad - S01E01.mkv")
    );
}

#[tokio::test]
async fn test_season_pack_is_submitted_once() {
    let pack = "Breaking.Bad.S01.1080p.BluRay";
    let mut mount = MemoryMount::new();
    for n in 1..=3 {
        mount.add_file(format!("/mnt/__all__/{pack}/Breaking.Bad.S01E0{n}.mkv"), GB);
    }
    let h = harness(Setup {
        mount,
        candidates: vec![candidate("PACKHASH", pack)],
        release: pack.to_string(),
        ..Setup::default()
    })
    .await;
    let id = delegated_show(&h.pipeline).await;

    let scrapes = h.pipeline.process_episode_scrapes().await.unwrap();
    assert_eq!(scrapes.advanced, 3);

    let downloads = h.pipeline.process_episode_downloads().await.unwrap();
    assert_eq!(downloads.advanced, 3);
    assert_eq!(h.submissions.load(Ordering::SeqCst), 1);

    let episodes = h.pipeline.store().list_episodes(id).await.unwrap();
    assert!(episodes.iter().all(|e| e.state == MediaState::Downloaded));
    assert!(episodes.iter().all(|e| e.torrent_name.as_deref() == Some(pack)));

    h.pipeline.process_episode_links().await.unwrap();
    let episodes = h.pipeline.store().list_episodes(id).await.unwrap();
    for episode in &episodes {
        assert_eq!(episode.state, MediaState::Completed);
        assert_eq!(
            episode.file_path.as_deref(),
            Some(format!("/mnt/__all__/{pack}/Breaking.Bad.S01E0{}.mkv", episode.episode_number).as_str())
        );
    }
    assert_eq!(h.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dubbed_only_keeps_top_ranked_dub_over_cached_raw() {
    let h = harness(Setup {
        candidates: vec![
            Candidate {
                is_dubbed: true,
                seeders: Some(300),
                ..candidate("dubuncached", "[Group] Frieren - 01 (1080p) English Dub")
            },
            Candidate {
                seeders: Some(300),
                ..candidate("cachedraw", "[SubsPlease] Frieren - 01 (1080p)")
            },
        ],
        cached: Some(vec!["cachedraw".to_string()]),
        ranking: RankingConfig {
            dubbed_only: true,
            ..RankingConfig::default()
        },
        ..Setup::default()
    })
    .await;
    let id = delegated(
        &h.pipeline,
        NewMediaItem {
            title: "Frieren".to_string(),
            year: Some(2023),
            kind: Some(MediaKind::AnimeShow),
            imdb_id: Some("tt22248376".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(h.pipeline.store().get_item(id).await.unwrap().unwrap().is_anime);

    let report = h.pipeline.process_episode_scrapes().await.unwrap();
    assert_eq!(report.advanced, 3);

    for episode in h.pipeline.store().list_episodes(id).await.unwrap() {
        assert_eq!(episode.state, MediaState::Scraped);
        assert_eq!(episode.file_path.as_deref(), Some("dubuncached"));
    }
}

#[tokio::test]
async fn test_episode_prefers_cached_release() {
    let h = harness(Setup {
        candidates: vec![
            Candidate {
                seeders: Some(500),
                ..candidate("uncached", "Breaking.Bad.S01E01.2160p.WEB-DL.x265")
            },
            candidate("cached", "Breaking.Bad.S01E01.720p.HDTV.x264"),
        ],
        cached: Some(vec!["cached".to_string()]),
        ..Setup::default()
    })
    .await;
    let id = delegated_show(&h.pipeline).await;

    h.pipeline.process_episode_scrapes().await.unwrap();
    let episodes = h.pipeline.store().list_episodes(id).await.unwrap();
    assert!(episodes.iter().all(|e| e.file_path.as_deref() == Some("cached")));
}

#[tokio::test]
async fn test_sweep_links_episodes_found_on_mount() {
    let h = harness(Setup {
        mount: MemoryMount::new().with_file(
            "/mnt/__all__/Breaking.Bad.S01E02.720p/Breaking.Bad.S01E02.720p.mkv",
            GB,
        ),
        ..Setup::default()
    })
    .await;
    let id = delegated_show(&h.pipeline).await;

    let report = h.pipeline.sweep().await.unwrap();
    assert!(!report.skipped);
    assert_eq!(report.checked, 3);
    assert_eq!(report.linked, 1);
    assert!(!h.pipeline.is_sweeping());

    let episodes = h.pipeline.store().list_episodes(id).await.unwrap();
    assert_eq!(episodes[1].state, MediaState::Symlinked);
    for other in [&episodes[0], &episodes[2]] {
        assert_eq!(other.state, MediaState::Requested);
        assert_eq!(other.retry_count, 0);
    }
}

#[tokio::test]
async fn test_remove_tears_down_links_and_rows() {
    let h = harness(Setup {
        mount: MemoryMount::new().with_file(
            "/mnt/__all__/Breaking.Bad.S01E02.720p/Breaking.Bad.S01E02.720p.mkv",
            GB,
        ),
        ..Setup::default()
    })
    .await;
    let id = delegated_show(&h.pipeline).await;
    h.pipeline.sweep().await.unwrap();

    let show_dir = h
        .library_root
        .join("tvshows")
        .join("Breaking Bad (2008)");
    assert!(show_dir.join("Season 01").exists());

    assert!(h.pipeline.remove_item(id).await.unwrap());
    assert!(!show_dir.exists());
    assert!(h.pipeline.store().get_item(id).await.unwrap().is_none());
    assert!(h.pipeline.store().list_episodes(id).await.unwrap().is_empty());

    assert!(!h.pipeline.remove_item(id).await.unwrap());
}

#[tokio::test]
async fn test_watchlist_sync_skips_known_and_idless_entries() {
    let h = harness(Setup {
        watchlist: vec![
            WatchlistEntry {
                title: "The Matrix".to_string(),
                year: Some(1999),
                kind: Some(MediaKind::Movie),
                guids: vec!["imdb://tt0133093".to_string()],
            },
            WatchlistEntry {
                title: "Breaking Bad".to_string(),
                year: Some(2008),
                kind: Some(MediaKind::Show),
                guids: vec!["tmdb://1396".to_string()],
            },
            WatchlistEntry {
                title: "Mystery".to_string(),
                ..Default::default()
            },
        ],
        ..Setup::default()
    })
    .await;
    add_movie(&h.pipeline).await;

    assert_eq!(h.pipeline.sync_watchlist().await.unwrap(), 1);
    assert_eq!(h.pipeline.sync_watchlist().await.unwrap(), 0);

    let items = h.pipeline.store().list_items().await.unwrap();
    assert_eq!(items.len(), 2);
    let show = items.iter().find(|i| i.title == "Breaking Bad").unwrap();
    assert_eq!(show.kind, MediaKind::Show);
    assert_eq!(show.tmdb_id, Some(1396));
    assert_eq!(show.state, MediaState::Requested);
}
