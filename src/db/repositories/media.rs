use crate::domain::{ItemId, MediaKind, MediaState};
use crate::entities::{media_items, prelude::*};
use crate::models::{MediaItem, NewMediaItem};
use anyhow::Context;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::info;

pub struct MediaRepository {
    conn: DatabaseConnection,
}

impl MediaRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub(crate) fn map_model(m: media_items::Model) -> anyhow::Result<MediaItem> {
        Ok(MediaItem {
            id: ItemId::new(m.id),
            imdb_id: m.imdb_id,
            tmdb_id: m.tmdb_id,
            tvdb_id: m.tvdb_id,
            title: m.title,
            original_title: m.original_title,
            alternative_titles: m
                .alternative_titles
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            year: m.year,
            kind: m
                .kind
                .parse::<MediaKind>()
                .with_context(|| format!("Invalid kind on media item {}", m.id))?,
            state: m
                .state
                .parse::<MediaState>()
                .with_context(|| format!("Invalid state on media item {}", m.id))?,
            is_anime: m.is_anime,
            poster_path: m.poster_path,
            backdrop_path: m.backdrop_path,
            overview: m.overview,
            genres: m
                .genres
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            vote_average: m.vote_average,
            number_of_seasons: m.number_of_seasons,
            number_of_episodes: m.number_of_episodes,
            status: m.status,
            is_airing: m.is_airing,
            file_path: m.file_path,
            symlink_path: m.symlink_path,
            torrent_name: m.torrent_name,
            download_id: m.download_id,
            last_error: m.last_error,
            retry_count: m.retry_count,
            created_at: m.created_at,
            updated_at: m.updated_at,
            completed_at: m.completed_at,
        })
    }

    fn map_all(rows: Vec<media_items::Model>) -> anyhow::Result<Vec<MediaItem>> {
        rows.into_iter().map(Self::map_model).collect()
    }

    /// Every mutable column of `item`, ready for an update.
    fn active_model(item: &MediaItem) -> media_items::ActiveModel {
        media_items::ActiveModel {
            id: NotSet,
            imdb_id: Set(item.imdb_id.clone()),
            tmdb_id: Set(item.tmdb_id),
            tvdb_id: Set(item.tvdb_id),
            title: Set(item.title.clone()),
            original_title: Set(item.original_title.clone()),
            alternative_titles: Set(serde_json::to_string(&item.alternative_titles).ok()),
            year: Set(item.year),
            kind: Set(item.kind.as_str().to_string()),
            state: Set(item.state.as_str().to_string()),
            is_anime: Set(item.is_anime),
            poster_path: Set(item.poster_path.clone()),
            backdrop_path: Set(item.backdrop_path.clone()),
            overview: Set(item.overview.clone()),
            genres: Set(serde_json::to_string(&item.genres).ok()),
            vote_average: Set(item.vote_average),
            number_of_seasons: Set(item.number_of_seasons),
            number_of_episodes: Set(item.number_of_episodes),
            status: Set(item.status.clone()),
            is_airing: Set(item.is_airing),
            file_path: Set(item.file_path.clone()),
            symlink_path: Set(item.symlink_path.clone()),
            torrent_name: Set(item.torrent_name.clone()),
            download_id: Set(item.download_id.clone()),
            last_error: Set(item.last_error.clone()),
            retry_count: Set(item.retry_count),
            created_at: NotSet,
            updated_at: Set(chrono::Utc::now().to_rfc3339()),
            completed_at: Set(item.completed_at.clone()),
        }
    }

    pub async fn insert(&self, new: &NewMediaItem) -> anyhow::Result<MediaItem> {
        let now = chrono::Utc::now().to_rfc3339();
        let kind = new.kind.unwrap_or(MediaKind::Movie);

        let active_model = media_items::ActiveModel {
            imdb_id: Set(new.imdb_id.clone()),
            tmdb_id: Set(new.tmdb_id),
            tvdb_id: Set(new.tvdb_id),
            title: Set(new.title.clone()),
            alternative_titles: Set(Some("[]".to_string())),
            year: Set(new.year),
            kind: Set(kind.as_str().to_string()),
            state: Set(MediaState::Requested.as_str().to_string()),
            is_anime: Set(kind.is_anime()),
            genres: Set(Some("[]".to_string())),
            is_airing: Set(false),
            retry_count: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = MediaItems::insert(active_model)
            .exec_with_returning(&self.conn)
            .await?;

        info!(item_id = model.id, title = %model.title, "Requested media item");
        Self::map_model(model)
    }

    pub async fn get(&self, id: ItemId) -> anyhow::Result<Option<MediaItem>> {
        MediaItems::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .map(Self::map_model)
            .transpose()
    }

    /// An item already tracked under any of the given external ids.
    pub async fn find_by_external(
        &self,
        imdb_id: Option<&str>,
        tmdb_id: Option<i64>,
    ) -> anyhow::Result<Option<MediaItem>> {
        let mut condition = Condition::any();
        if let Some(imdb) = imdb_id {
            condition = condition.add(media_items::Column::ImdbId.eq(imdb));
        }
        if let Some(tmdb) = tmdb_id {
            condition = condition.add(media_items::Column::TmdbId.eq(tmdb));
        }
        if condition.is_empty() {
            return Ok(None);
        }

        MediaItems::find()
            .filter(condition)
            .one(&self.conn)
            .await?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn list_all(&self) -> anyhow::Result<Vec<MediaItem>> {
        let rows = MediaItems::find()
            .order_by_asc(media_items::Column::Id)
            .all(&self.conn)
            .await?;
        Self::map_all(rows)
    }

    /// Items the pipeline still has work for, least recently touched first.
    pub async fn list_due(&self, limit: u64) -> anyhow::Result<Vec<MediaItem>> {
        let states: Vec<&str> = MediaState::ADVANCING.iter().map(MediaState::as_str).collect();

        let rows = MediaItems::find()
            .filter(media_items::Column::State.is_in(states))
            .order_by_asc(media_items::Column::UpdatedAt)
            .order_by_asc(media_items::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;
        Self::map_all(rows)
    }

    /// Writes `item` only if the stored state is still `expected`.
    ///
    /// Returns `false` when another writer moved the item first.
    pub async fn commit(&self, item: &MediaItem, expected: MediaState) -> anyhow::Result<bool> {
        let result = MediaItems::update_many()
            .set(Self::active_model(item))
            .filter(media_items::Column::Id.eq(item.id.value()))
            .filter(media_items::Column::State.eq(expected.as_str()))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Resets an item for another attempt from `state`, clearing its failure record.
    pub async fn reset(&self, id: ItemId, state: MediaState) -> anyhow::Result<bool> {
        let result = MediaItems::update_many()
            .col_expr(
                media_items::Column::State,
                sea_orm::sea_query::Expr::value(state.as_str()),
            )
            .col_expr(
                media_items::Column::RetryCount,
                sea_orm::sea_query::Expr::value(0),
            )
            .col_expr(
                media_items::Column::LastError,
                sea_orm::sea_query::Expr::value(Option::<String>::None),
            )
            .col_expr(
                media_items::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(media_items::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Every FAILED item back to REQUESTED.
    pub async fn reset_all_failed(&self) -> anyhow::Result<u64> {
        let result = MediaItems::update_many()
            .col_expr(
                media_items::Column::State,
                sea_orm::sea_query::Expr::value(MediaState::Requested.as_str()),
            )
            .col_expr(
                media_items::Column::RetryCount,
                sea_orm::sea_query::Expr::value(0),
            )
            .col_expr(
                media_items::Column::LastError,
                sea_orm::sea_query::Expr::value(Option::<String>::None),
            )
            .col_expr(
                media_items::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(media_items::Column::State.eq(MediaState::Failed.as_str()))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn delete(&self, id: ItemId) -> anyhow::Result<bool> {
        let result = MediaItems::delete_by_id(id.value())
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
