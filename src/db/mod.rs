use crate::domain::{EpisodeId, ItemId, MediaState};
use crate::models::{
    AbsoluteEpisodeMap, Episode, EpisodeStats, MediaItem, NewEpisode, NewMediaItem, ShowStatus,
};
use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn media_repo(&self) -> repositories::media::MediaRepository {
        repositories::media::MediaRepository::new(self.conn.clone())
    }

    fn episode_repo(&self) -> repositories::episode::EpisodeRepository {
        repositories::episode::EpisodeRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Items
    // ========================================================================

    pub async fn add_item(&self, item: &NewMediaItem) -> Result<MediaItem> {
        self.media_repo().insert(item).await
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Option<MediaItem>> {
        self.media_repo().get(id).await
    }

    pub async fn find_item_by_external(
        &self,
        imdb_id: Option<&str>,
        tmdb_id: Option<i64>,
    ) -> Result<Option<MediaItem>> {
        self.media_repo().find_by_external(imdb_id, tmdb_id).await
    }

    pub async fn list_items(&self) -> Result<Vec<MediaItem>> {
        self.media_repo().list_all().await
    }

    pub async fn list_due_items(&self, limit: u64) -> Result<Vec<MediaItem>> {
        self.media_repo().list_due(limit).await
    }

    /// Conditional write: succeeds only while the row is still in `expected`.
    pub async fn commit_item(&self, item: &MediaItem, expected: MediaState) -> Result<bool> {
        self.media_repo().commit(item, expected).await
    }

    pub async fn reset_item(&self, id: ItemId, state: MediaState) -> Result<bool> {
        self.media_repo().reset(id, state).await
    }

    pub async fn reset_failed_items(&self) -> Result<u64> {
        self.media_repo().reset_all_failed().await
    }

    /// Deletes the item row only. Callers remove links and episodes first.
    pub async fn delete_item(&self, id: ItemId) -> Result<bool> {
        self.media_repo().delete(id).await
    }

    // ========================================================================
    // Episodes
    // ========================================================================

    pub async fn materialize_episodes(&self, item_id: ItemId, rows: &[NewEpisode]) -> Result<u64> {
        self.episode_repo().materialize(item_id, rows).await
    }

    pub async fn list_episodes(&self, item_id: ItemId) -> Result<Vec<Episode>> {
        self.episode_repo().list_for_item(item_id).await
    }

    pub async fn list_due_episodes(
        &self,
        state: MediaState,
        limit: u64,
    ) -> Result<Vec<(Episode, MediaItem)>> {
        self.episode_repo().list_due(state, limit).await
    }

    pub async fn list_unfinished_episodes(&self) -> Result<Vec<(Episode, MediaItem)>> {
        self.episode_repo().list_unfinished().await
    }

    pub async fn find_episode_by_hash(
        &self,
        item_id: ItemId,
        hash: &str,
        exclude: EpisodeId,
    ) -> Result<Option<Episode>> {
        self.episode_repo()
            .find_sibling_with_hash(item_id, hash, exclude)
            .await
    }

    pub async fn set_absolute_numbers(
        &self,
        item_id: ItemId,
        map: &AbsoluteEpisodeMap,
    ) -> Result<u64> {
        self.episode_repo().set_absolute_numbers(item_id, map).await
    }

    pub async fn commit_episode(&self, episode: &Episode, expected: MediaState) -> Result<bool> {
        self.episode_repo().commit(episode, expected).await
    }

    pub async fn reset_episode(&self, id: EpisodeId, state: MediaState) -> Result<bool> {
        self.episode_repo().reset(id, state).await
    }

    pub async fn reset_failed_episodes(&self, item_id: Option<ItemId>) -> Result<u64> {
        self.episode_repo().reset_failed(item_id).await
    }

    pub async fn delete_episodes(&self, item_id: ItemId) -> Result<u64> {
        self.episode_repo().delete_for_item(item_id).await
    }

    pub async fn episode_stats(&self, item_id: ItemId) -> Result<EpisodeStats> {
        self.episode_repo().stats(item_id).await
    }

    /// Aggregate status for listing. Movies have none.
    pub async fn show_status(&self, item: &MediaItem) -> Result<Option<(ShowStatus, EpisodeStats)>> {
        if !item.kind.is_show() {
            return Ok(None);
        }
        let stats = self.episode_stats(item.id).await?;
        Ok(Some((ShowStatus::from_stats(&stats, item.is_airing), stats)))
    }
}
