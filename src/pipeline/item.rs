//! Movie and show level steps.

use tracing::{debug, error, info, warn};

use super::outcome::download_outcome;
use super::{Pipeline, StepOutcome, log_transition, scrape_movie};
use crate::constants::{limits, retry};
use crate::domain::MediaState;
use crate::error::PipelineError;
use crate::models::{Fingerprint, MediaItem, Metadata};
use crate::parser::size::format_size;
use crate::ranking;

impl Pipeline {
    /// Runs one step for `item` and commits the result.
    ///
    /// Step errors never escape: retryable ones leave the item where it is,
    /// anything else marks it FAILED with the message recorded. Only store
    /// errors are returned.
    pub async fn advance(&self, item: &MediaItem) -> anyhow::Result<StepOutcome> {
        let from = item.state;
        let mut next = item.clone();

        let outcome = match self.item_step(&mut next).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Partial changes from a failed step are discarded.
                next = item.clone();
                StepOutcome::from_error(e)
            }
        };

        match &outcome {
            StepOutcome::Advanced(state) => next.state = *state,
            StepOutcome::Waiting(reason) => {
                debug!(item_id = %item.id, state = %from, reason = %reason, "Item waiting");
            }
            StepOutcome::Failed(e) => {
                warn!(item_id = %item.id, title = %item.title, state = %from, error = %e, "Item failed");
                next.state = MediaState::Failed;
                next.last_error = Some(e.to_string());
                next.retry_count += 1;
            }
        }

        if !self.store.commit_item(&next, from).await? {
            warn!(item_id = %item.id, expected = %from, "Item changed concurrently, skipping commit");
            return Ok(StepOutcome::Waiting("state changed concurrently".to_string()));
        }
        log_transition("item", item.id.value(), &next, from, next.state);
        Ok(outcome)
    }

    async fn item_step(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        match item.state {
            MediaState::Requested => self.index(item).await,
            MediaState::Indexed if item.kind.is_show() => self.delegate(item).await,
            MediaState::Indexed => self.scrape(item).await,
            MediaState::Scraped => self.download(item).await,
            MediaState::Downloading => self.check_download(item).await,
            MediaState::Downloaded => self.link(item).await,
            MediaState::Symlinked => Ok(self.complete(item).await),
            state => Ok(StepOutcome::Waiting(format!("nothing to do in {state}"))),
        }
    }

    /// REQUESTED -> INDEXED. Looks up by external id first, then by title.
    async fn index(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        let metadata = &self.services.metadata;

        let mut found = None;
        if let Some(imdb) = item.imdb_id.as_deref() {
            found = metadata.find_by_external_id(imdb, item.kind).await?;
        }
        if found.is_none()
            && let Some(tmdb) = item.tmdb_id
        {
            found = metadata
                .find_by_external_id(&tmdb.to_string(), item.kind)
                .await?;
        }
        if found.is_none() {
            found = metadata
                .search(&item.title, item.year, item.kind)
                .await?
                .into_iter()
                .next();
        }

        let Some(meta) = found else {
            return Ok(StepOutcome::Failed(PipelineError::MetadataNotFound(
                item.title.clone(),
            )));
        };

        // External ids are unique; a second request for the same title must not clobber the first.
        if let Some(other) = self
            .store
            .find_item_by_external(meta.imdb_id.as_deref(), meta.tmdb_id)
            .await?
            && other.id != item.id
        {
            return Ok(StepOutcome::Failed(PipelineError::AlreadyTracked(
                other.id.value(),
            )));
        }

        apply_metadata(item, meta);
        info!(
            item_id = %item.id,
            title = %item.title,
            kind = %item.kind,
            imdb_id = ?item.imdb_id,
            "Indexed"
        );
        Ok(StepOutcome::Advanced(MediaState::Indexed))
    }

    /// Shows hand over to per-episode tracking once their episodes exist.
    async fn delegate(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        self.materialize_episodes(item).await?;
        Ok(StepOutcome::Advanced(MediaState::Delegated))
    }

    /// INDEXED -> SCRAPED. Stores the winning candidate's fingerprint.
    async fn scrape(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        let Some(imdb) = item.imdb_id.clone() else {
            return Ok(StepOutcome::Failed(PipelineError::ConfigurationMissing(
                format!("IMDb id for '{}'", item.title),
            )));
        };

        let candidates = scrape_movie(&self.services.scrapers, &imdb).await?;
        if candidates.is_empty() {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(
                item.title.clone(),
            )));
        }

        let cache = self.check_cache(&candidates).await;
        let ctx = self.ranking_context(item.is_anime, &cache);
        let Some((best, fingerprint)) = ranking::select(&candidates, &ctx)
            .and_then(|c| c.fingerprint().map(|f| (c, f)))
        else {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(
                item.title.clone(),
            )));
        };

        info!(
            item_id = %item.id,
            release = %best.title,
            score = ranking::score(best, &ctx),
            size = ?best.size_bytes.map(format_size),
            candidates = candidates.len(),
            "Selected candidate"
        );
        item.file_path = Some(fingerprint.to_string());
        item.torrent_name = None;
        item.download_id = None;
        Ok(StepOutcome::Advanced(MediaState::Scraped))
    }

    /// SCRAPED -> DOWNLOADING or DOWNLOADED.
    async fn download(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        let Some(fingerprint) = item.file_path.as_deref().and_then(Fingerprint::parse) else {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(
                item.title.clone(),
            )));
        };

        let submission = self.submit(&fingerprint).await?;
        item.download_id = Some(submission.encode());
        let status = self.initial_status(&submission).await;
        Ok(download_outcome(status, item.state, &mut item.torrent_name))
    }

    /// DOWNLOADING -> DOWNLOADED once the provider reports completion.
    async fn check_download(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        let status = self.recorded_status(item.download_id.as_deref()).await?;
        Ok(download_outcome(status, item.state, &mut item.torrent_name))
    }

    /// DOWNLOADED -> SYMLINKED. Release name first, then hash, then title search.
    async fn link(&self, item: &mut MediaItem) -> Result<StepOutcome, PipelineError> {
        if !self.mount_available().await {
            return Ok(StepOutcome::Waiting("mount unavailable".to_string()));
        }

        let release = item.torrent_name.clone();
        let hash = item
            .file_path
            .as_deref()
            .and_then(Fingerprint::parse)
            .and_then(|f| f.hash().map(str::to_string));
        let titles = item.search_titles();
        let year = item.year;

        let source = self
            .resolve(move |resolver| {
                release
                    .as_deref()
                    .and_then(|name| resolver.find_by_release_name(name, None))
                    .or_else(|| hash.as_deref().and_then(|h| resolver.find_by_hash(h)))
                    .or_else(|| resolver.find_movie(&titles, year))
            })
            .await;

        let Some(source) = source else {
            return Ok(not_found_yet(
                &mut item.retry_count,
                &mut item.last_error,
                &item.title,
            ));
        };

        let destination = self
            .links
            .movie_destination(item.kind, &item.title, item.year, &source);
        self.links.link(&source, &destination).await?;

        item.file_path = Some(source.display().to_string());
        item.symlink_path = Some(destination.display().to_string());
        item.last_error = None;
        Ok(StepOutcome::Advanced(MediaState::Symlinked))
    }

    /// SYMLINKED -> COMPLETED. The library refresh is best effort.
    async fn complete(&self, item: &mut MediaItem) -> StepOutcome {
        if !self.services.library.refresh().await {
            warn!(item_id = %item.id, "Library refresh did not go through");
        }
        item.completed_at = Some(chrono::Utc::now().to_rfc3339());
        StepOutcome::Advanced(MediaState::Completed)
    }

    /// One bounded pass over due items. Returns how many were processed.
    pub async fn process_due_items(&self) -> anyhow::Result<usize> {
        let items = self.store.list_due_items(limits::ITEM_BATCH).await?;
        if items.is_empty() {
            return Ok(0);
        }
        debug!(count = items.len(), "Processing due items");

        let mut processed = 0;
        for item in &items {
            match self.advance(item).await {
                Ok(_) => processed += 1,
                Err(e) => error!(item_id = %item.id, error = %e, "Failed to commit item step"),
            }
        }
        Ok(processed)
    }
}

/// Outcome of a mount search that found nothing.
///
/// The file may not have materialized yet, so this waits until the retry
/// ceiling is reached and only then fails.
pub(super) fn not_found_yet(
    retry_count: &mut i32,
    last_error: &mut Option<String>,
    target: &str,
) -> StepOutcome {
    let attempts = *retry_count + 1;
    if attempts >= retry::MAX_SYMLINK_RETRIES {
        // The failure path records the final increment.
        return StepOutcome::Failed(PipelineError::FileNotFound {
            target: target.to_string(),
            attempts,
        });
    }
    *retry_count = attempts;
    let err = PipelineError::FileNotYetAvailable(target.to_string());
    *last_error = Some(err.to_string());
    StepOutcome::Waiting(format!(
        "{err} (attempt {attempts}/{})",
        retry::MAX_SYMLINK_RETRIES
    ))
}

/// Copies resolved metadata onto the item, keeping known values the provider left out.
pub(super) fn apply_metadata(item: &mut MediaItem, meta: Metadata) {
    if !meta.title.trim().is_empty() {
        item.title = meta.title;
    }
    item.original_title = meta.original_title.or_else(|| item.original_title.take());
    if !meta.alternative_titles.is_empty() {
        item.alternative_titles = meta.alternative_titles;
    }
    if let Some(original) = item.original_title.clone()
        && !item.alternative_titles.contains(&original)
    {
        item.alternative_titles.push(original);
    }
    item.year = meta.year.or(item.year);
    item.imdb_id = meta.imdb_id.or_else(|| item.imdb_id.take());
    item.tmdb_id = meta.tmdb_id.or(item.tmdb_id);
    item.tvdb_id = meta.tvdb_id.or(item.tvdb_id);
    item.poster_path = meta.poster_path.or_else(|| item.poster_path.take());
    item.backdrop_path = meta.backdrop_path.or_else(|| item.backdrop_path.take());
    item.overview = meta.overview.or_else(|| item.overview.take());
    if !meta.genres.is_empty() {
        item.genres = meta.genres;
    }
    item.vote_average = meta.vote_average.or(item.vote_average);
    item.number_of_seasons = meta.number_of_seasons.or(item.number_of_seasons);
    item.number_of_episodes = meta.number_of_episodes.or(item.number_of_episodes);
    item.status = meta.status.or_else(|| item.status.take());
    item.is_airing = meta.is_airing;
    if meta.is_anime {
        item.is_anime = true;
        item.kind = item.kind.to_anime();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemId, MediaKind};
    use crate::models::Submission;

    fn item() -> MediaItem {
        MediaItem {
            id: ItemId::new(1),
            imdb_id: None,
            tmdb_id: Some(42),
            tvdb_id: None,
            title: "frieren".to_string(),
            original_title: None,
            alternative_titles: vec![],
            year: Some(2023),
            kind: MediaKind::Show,
            state: MediaState::Requested,
            is_anime: false,
            poster_path: Some("/old.jpg".to_string()),
            backdrop_path: None,
            overview: None,
            genres: vec![],
            vote_average: None,
            number_of_seasons: None,
            number_of_episodes: None,
            status: None,
            is_airing: false,
            file_path: None,
            symlink_path: None,
            torrent_name: None,
            download_id: None,
            last_error: None,
            retry_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
            completed_at: None,
        }
    }

    #[test]
    fn test_apply_metadata_marks_anime() {
        let mut target = item();
        apply_metadata(
            &mut target,
            Metadata {
                tmdb_id: Some(209_867),
                imdb_id: Some("tt22248376".to_string()),
                title: "Frieren: Beyond Journey's End".to_string(),
                original_title: Some("葬送のフリーレン".to_string()),
                is_anime: true,
                number_of_seasons: Some(1),
                ..Default::default()
            },
        );

        assert_eq!(target.title, "Frieren: Beyond Journey's End");
        assert_eq!(target.kind, MediaKind::AnimeShow);
        assert!(target.is_anime);
        assert_eq!(target.tmdb_id, Some(209_867));
        assert_eq!(target.imdb_id.as_deref(), Some("tt22248376"));
        assert!(target.alternative_titles.contains(&"葬送のフリーレン".to_string()));
        // Missing fields keep what was already known.
        assert_eq!(target.poster_path.as_deref(), Some("/old.jpg"));
        assert_eq!(target.year, Some(2023));
    }

    #[test]
    fn test_not_found_waits_until_ceiling() {
        let mut retries = 0;
        let mut last_error = None;
        for attempt in 1..retry::MAX_SYMLINK_RETRIES {
            let outcome = not_found_yet(&mut retries, &mut last_error, "Movie");
            assert!(matches!(outcome, StepOutcome::Waiting(_)));
            assert_eq!(retries, attempt);
        }
        assert!(last_error.is_some());

        let outcome = not_found_yet(&mut retries, &mut last_error, "Movie");
        assert!(matches!(
            outcome,
            StepOutcome::Failed(PipelineError::FileNotFound { attempts: 5, .. })
        ));
    }

    #[test]
    fn test_submission_round_trips_through_download_id() {
        let submission = Submission {
            provider: "real_debrid".to_string(),
            provider_id: "ABC123".to_string(),
        };
        assert_eq!(Submission::decode(&submission.encode()), Some(submission));
    }
}
