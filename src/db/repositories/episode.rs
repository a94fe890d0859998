use crate::db::repositories::media::MediaRepository;
use crate::domain::{EpisodeId, ItemId, MediaState};
use crate::entities::{episodes, media_items, prelude::*};
use crate::models::{AbsoluteEpisodeMap, Episode, EpisodeStats, MediaItem, NewEpisode};
use anyhow::{Context, Result};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::info;

/// Repository for per-episode lifecycle rows
pub struct EpisodeRepository {
    conn: DatabaseConnection,
}

impl EpisodeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: episodes::Model) -> Result<Episode> {
        Ok(Episode {
            id: EpisodeId::new(m.id),
            item_id: ItemId::new(m.item_id),
            season_number: m.season_number,
            episode_number: m.episode_number,
            absolute_episode_number: m.absolute_episode_number,
            title: m.title,
            overview: m.overview,
            air_date: m.air_date,
            state: m
                .state
                .parse::<MediaState>()
                .with_context(|| format!("Invalid state on episode {}", m.id))?,
            file_path: m.file_path,
            symlink_path: m.symlink_path,
            torrent_name: m.torrent_name,
            download_id: m.download_id,
            last_error: m.last_error,
            retry_count: m.retry_count,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }

    fn map_pairs(
        rows: Vec<(episodes::Model, Option<media_items::Model>)>,
    ) -> Result<Vec<(Episode, MediaItem)>> {
        let mut out = Vec::with_capacity(rows.len());
        for (episode, parent) in rows {
            // Cascade keeps this from happening; a dangling row is skipped.
            let Some(parent) = parent else { continue };
            out.push((Self::map_model(episode)?, MediaRepository::map_model(parent)?));
        }
        Ok(out)
    }

    /// Inserts every episode of a show in one transaction.
    ///
    /// Does nothing and returns 0 when the show already has any episode rows.
    /// Rows carrying a pre-resolved file start at `DOWNLOADED`.
    pub async fn materialize(&self, item_id: ItemId, rows: &[NewEpisode]) -> Result<u64> {
        let txn = self.conn.begin().await?;

        let existing = Episodes::find()
            .filter(episodes::Column::ItemId.eq(item_id.value()))
            .count(&txn)
            .await?;
        if existing > 0 {
            txn.commit().await?;
            return Ok(0);
        }
        if rows.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let models = rows.iter().map(|row| {
            let state = if row.file_path.is_some() {
                MediaState::Downloaded
            } else {
                MediaState::Requested
            };
            episodes::ActiveModel {
                id: NotSet,
                item_id: Set(item_id.value()),
                season_number: Set(row.season_number),
                episode_number: Set(row.episode_number),
                absolute_episode_number: Set(row.absolute_episode_number),
                title: Set(row.title.clone()),
                overview: Set(row.overview.clone()),
                air_date: Set(row.air_date.clone()),
                state: Set(state.as_str().to_string()),
                file_path: Set(row.file_path.clone()),
                symlink_path: Set(None),
                torrent_name: Set(row.torrent_name.clone()),
                download_id: Set(None),
                last_error: Set(None),
                retry_count: Set(0),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
            }
        });

        let inserted = Episodes::insert_many(models)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;

        info!(item_id = item_id.value(), count = inserted, "Materialized episodes");
        Ok(inserted)
    }

    pub async fn list_for_item(&self, item_id: ItemId) -> Result<Vec<Episode>> {
        Episodes::find()
            .filter(episodes::Column::ItemId.eq(item_id.value()))
            .order_by_asc(episodes::Column::SeasonNumber)
            .order_by_asc(episodes::Column::EpisodeNumber)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }

    /// Episodes in `state` whose show is not paused, with their parent.
    ///
    /// Scrape order follows air order so early episodes are fetched first;
    /// later stages take the least recently touched rows.
    pub async fn list_due(&self, state: MediaState, limit: u64) -> Result<Vec<(Episode, MediaItem)>> {
        let mut query = Episodes::find()
            .find_also_related(MediaItems)
            .filter(episodes::Column::State.eq(state.as_str()))
            .filter(media_items::Column::State.ne(MediaState::Paused.as_str()));

        query = if state == MediaState::Requested {
            query
                .order_by_asc(episodes::Column::ItemId)
                .order_by_asc(episodes::Column::SeasonNumber)
                .order_by_asc(episodes::Column::EpisodeNumber)
        } else {
            query
                .order_by_asc(episodes::Column::UpdatedAt)
                .order_by_asc(episodes::Column::Id)
        };

        let rows = query.limit(limit).all(&self.conn).await?;
        Self::map_pairs(rows)
    }

    /// Episodes that are neither linked and refreshed nor failed, with their parent.
    pub async fn list_unfinished(&self) -> Result<Vec<(Episode, MediaItem)>> {
        let rows = Episodes::find()
            .find_also_related(MediaItems)
            .filter(
                episodes::Column::State.is_not_in([
                    MediaState::Completed.as_str(),
                    MediaState::Failed.as_str(),
                ]),
            )
            .filter(media_items::Column::State.ne(MediaState::Paused.as_str()))
            .order_by_asc(episodes::Column::ItemId)
            .order_by_asc(episodes::Column::SeasonNumber)
            .order_by_asc(episodes::Column::EpisodeNumber)
            .all(&self.conn)
            .await?;
        Self::map_pairs(rows)
    }

    /// A sibling that already acquired `hash` and knows its release name.
    ///
    /// Used to let every episode of a season pack share one submission.
    pub async fn find_sibling_with_hash(
        &self,
        item_id: ItemId,
        hash: &str,
        exclude: EpisodeId,
    ) -> Result<Option<Episode>> {
        Episodes::find()
            .filter(episodes::Column::ItemId.eq(item_id.value()))
            .filter(episodes::Column::FilePath.eq(hash))
            .filter(episodes::Column::Id.ne(exclude.value()))
            .filter(episodes::Column::State.is_in([
                MediaState::Downloaded.as_str(),
                MediaState::Symlinked.as_str(),
                MediaState::Completed.as_str(),
            ]))
            .filter(episodes::Column::TorrentName.is_not_null())
            .one(&self.conn)
            .await?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn stats(&self, item_id: ItemId) -> Result<EpisodeStats> {
        let states: Vec<String> = Episodes::find()
            .select_only()
            .column(episodes::Column::State)
            .filter(episodes::Column::ItemId.eq(item_id.value()))
            .into_tuple()
            .all(&self.conn)
            .await?;

        Ok(EpisodeStats::from_states(
            states.iter().filter_map(|s| s.parse::<MediaState>().ok()),
        ))
    }

    /// Fills missing absolute numbers from `map`. Returns how many rows changed.
    pub async fn set_absolute_numbers(&self, item_id: ItemId, map: &AbsoluteEpisodeMap) -> Result<u64> {
        if map.is_empty() {
            return Ok(0);
        }

        let txn = self.conn.begin().await?;
        let missing = Episodes::find()
            .filter(episodes::Column::ItemId.eq(item_id.value()))
            .filter(episodes::Column::AbsoluteEpisodeNumber.is_null())
            .all(&txn)
            .await?;

        let mut updated = 0;
        for row in missing {
            let Some(absolute) = map.get(&(row.season_number, row.episode_number)) else {
                continue;
            };
            let result = Episodes::update_many()
                .col_expr(
                    episodes::Column::AbsoluteEpisodeNumber,
                    sea_orm::sea_query::Expr::value(*absolute),
                )
                .filter(episodes::Column::Id.eq(row.id))
                .exec(&txn)
                .await?;
            updated += result.rows_affected;
        }
        txn.commit().await?;

        if updated > 0 {
            info!(item_id = item_id.value(), count = updated, "Filled absolute episode numbers");
        }
        Ok(updated)
    }

    /// Writes `episode` only if the stored state is still `expected`.
    pub async fn commit(&self, episode: &Episode, expected: MediaState) -> Result<bool> {
        let active_model = episodes::ActiveModel {
            id: NotSet,
            item_id: NotSet,
            season_number: NotSet,
            episode_number: NotSet,
            absolute_episode_number: Set(episode.absolute_episode_number),
            title: Set(episode.title.clone()),
            overview: Set(episode.overview.clone()),
            air_date: Set(episode.air_date.clone()),
            state: Set(episode.state.as_str().to_string()),
            file_path: Set(episode.file_path.clone()),
            symlink_path: Set(episode.symlink_path.clone()),
            torrent_name: Set(episode.torrent_name.clone()),
            download_id: Set(episode.download_id.clone()),
            last_error: Set(episode.last_error.clone()),
            retry_count: Set(episode.retry_count),
            created_at: NotSet,
            updated_at: Set(chrono::Utc::now().to_rfc3339()),
        };

        let result = Episodes::update_many()
            .set(active_model)
            .filter(episodes::Column::Id.eq(episode.id.value()))
            .filter(episodes::Column::State.eq(expected.as_str()))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Resets one episode to `state`, clearing its failure record.
    pub async fn reset(&self, id: EpisodeId, state: MediaState) -> Result<bool> {
        let result = Episodes::update_many()
            .col_expr(
                episodes::Column::State,
                sea_orm::sea_query::Expr::value(state.as_str()),
            )
            .col_expr(episodes::Column::RetryCount, sea_orm::sea_query::Expr::value(0))
            .col_expr(
                episodes::Column::LastError,
                sea_orm::sea_query::Expr::value(Option::<String>::None),
            )
            .col_expr(
                episodes::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(episodes::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Moves FAILED episodes back to REQUESTED, for one show or all of them.
    pub async fn reset_failed(&self, item_id: Option<ItemId>) -> Result<u64> {
        let mut update = Episodes::update_many()
            .col_expr(
                episodes::Column::State,
                sea_orm::sea_query::Expr::value(MediaState::Requested.as_str()),
            )
            .col_expr(episodes::Column::RetryCount, sea_orm::sea_query::Expr::value(0))
            .col_expr(
                episodes::Column::LastError,
                sea_orm::sea_query::Expr::value(Option::<String>::None),
            )
            .col_expr(
                episodes::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(episodes::Column::State.eq(MediaState::Failed.as_str()));

        if let Some(item_id) = item_id {
            update = update.filter(episodes::Column::ItemId.eq(item_id.value()));
        }

        Ok(update.exec(&self.conn).await?.rows_affected)
    }

    pub async fn delete_for_item(&self, item_id: ItemId) -> Result<u64> {
        let result = Episodes::delete_many()
            .filter(episodes::Column::ItemId.eq(item_id.value()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
