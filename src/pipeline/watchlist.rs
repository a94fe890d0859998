use tracing::{debug, info, warn};

use super::Pipeline;
use crate::domain::MediaKind;
use crate::models::NewMediaItem;

impl Pipeline {
    /// Imports watchlist entries as REQUESTED items.
    ///
    /// Entries already tracked under their IMDb or TMDB id are skipped, and so
    /// are entries carrying neither.
    /// Returns how many items were added.
    pub async fn sync_watchlist(&self) -> anyhow::Result<usize> {
        let Some(watchlist) = &self.services.watchlist else {
            debug!("No watchlist provider configured");
            return Ok(0);
        };

        let entries = watchlist.list().await?;
        let mut added = 0;

        for entry in &entries {
            let ids = watchlist.extract_ids(entry);
            // Without an id there is no way to tell a repeat from a new entry.
            if ids.imdb.is_none() && ids.tmdb.is_none() {
                warn!(title = %entry.title, "Skipping watchlist entry without IMDb or TMDB id");
                continue;
            }

            if self
                .store
                .find_item_by_external(ids.imdb.as_deref(), ids.tmdb)
                .await?
                .is_some()
            {
                continue;
            }

            let item = self
                .store
                .add_item(&NewMediaItem {
                    title: entry.title.clone(),
                    year: entry.year,
                    kind: Some(entry.kind.unwrap_or(MediaKind::Movie)),
                    imdb_id: ids.imdb,
                    tmdb_id: ids.tmdb,
                    tvdb_id: ids.tvdb,
                })
                .await?;
            debug!(item_id = %item.id, title = %item.title, "Imported from watchlist");
            added += 1;
        }

        info!(entries = entries.len(), added, "Watchlist sync finished");
        Ok(added)
    }
}
