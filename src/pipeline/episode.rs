//! Per-episode steps and the batch runners that drive them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, error, info, warn};

use super::item::not_found_yet;
use super::outcome::download_outcome;
use super::{Pipeline, StepOutcome, log_transition, scrape_episode};
use crate::constants::limits;
use crate::domain::{ItemId, MediaState};
use crate::error::PipelineError;
use crate::models::{Candidate, Episode, Fingerprint, MediaItem, NewEpisode};
use crate::ranking::{self, CacheAvailability};
use crate::resolver::{EpisodeTarget, MountEntry};

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

/// Anime files already on the mount only count when they carry English audio.
fn has_dub_marker(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"(?i)\b(dub|dual|multi|english|eng)\b").is_match(name)
}

/// Counts from one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub advanced: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &StepOutcome) {
        self.processed += 1;
        match outcome {
            StepOutcome::Advanced(_) => self.advanced += 1,
            StepOutcome::Failed(_) => self.failed += 1,
            StepOutcome::Waiting(_) => {}
        }
    }
}

impl Pipeline {
    /// Creates one episode row per (season, episode) of a show.
    ///
    /// Skipped entirely when the show already has episodes. Episodes whose
    /// file is already on the mount start at DOWNLOADED.
    pub async fn materialize_episodes(&self, item: &MediaItem) -> Result<u64, PipelineError> {
        if !self.store.list_episodes(item.id).await?.is_empty() {
            debug!(item_id = %item.id, "Episodes already materialized");
            return Ok(0);
        }
        let Some(show_id) = item.tmdb_id else {
            return Err(PipelineError::ConfigurationMissing(format!(
                "TMDB id for '{}'",
                item.title
            )));
        };

        let metadata = &self.services.metadata;
        let seasons = item.number_of_seasons.unwrap_or(1).max(1);
        let episodes = metadata.get_episodes(show_id, seasons).await?;
        if episodes.is_empty() {
            return Err(PipelineError::MetadataNotFound(format!(
                "episodes of '{}'",
                item.title
            )));
        }

        let absolute = if item.is_anime {
            metadata
                .get_absolute_episode_map(show_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(item_id = %item.id, error = %e, "Absolute episode map unavailable");
                    HashMap::new()
                })
        } else {
            HashMap::new()
        };

        let on_mount = self.scan_mount_for_show(item).await;

        let rows: Vec<NewEpisode> = episodes
            .into_iter()
            .map(|meta| {
                let key = (meta.season_number, meta.episode_number);
                let found = on_mount.get(&key);
                NewEpisode {
                    season_number: meta.season_number,
                    episode_number: meta.episode_number,
                    absolute_episode_number: absolute.get(&key).copied(),
                    title: meta.title,
                    overview: meta.overview,
                    air_date: meta.air_date,
                    file_path: found.map(|f| f.path.display().to_string()),
                    torrent_name: found.and_then(MountEntry::parent_name),
                }
            })
            .collect();

        let prefilled = rows.iter().filter(|r| r.file_path.is_some()).count();
        let inserted = self.store.materialize_episodes(item.id, &rows).await?;
        info!(
            item_id = %item.id,
            title = %item.title,
            inserted,
            prefilled,
            "Materialized episodes"
        );
        Ok(inserted)
    }

    async fn scan_mount_for_show(&self, item: &MediaItem) -> HashMap<(i32, i32), MountEntry> {
        if !self.mount_available().await {
            return HashMap::new();
        }
        let resolver = std::sync::Arc::clone(&self.resolver);
        let titles = item.search_titles();
        let mut found = tokio::task::spawn_blocking(move || resolver.scan_show(&titles))
            .await
            .unwrap_or_default();

        if item.is_anime {
            found.retain(|_, entry| {
                has_dub_marker(&entry.name)
                    || entry.parent_name().is_some_and(|p| has_dub_marker(&p))
            });
        }
        found
    }

    /// Runs one step for `episode` and commits the result.
    pub async fn advance_episode(
        &self,
        episode: &Episode,
        item: &MediaItem,
    ) -> anyhow::Result<StepOutcome> {
        let mut next = episode.clone();

        let outcome = match self.episode_step(&mut next, item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                next = episode.clone();
                StepOutcome::from_error(e)
            }
        };

        self.commit_episode_outcome(episode, next, item, &outcome).await?;
        Ok(outcome)
    }

    pub(super) async fn commit_episode_outcome(
        &self,
        original: &Episode,
        mut next: Episode,
        item: &MediaItem,
        outcome: &StepOutcome,
    ) -> anyhow::Result<bool> {
        let from = original.state;
        match outcome {
            StepOutcome::Advanced(state) => next.state = *state,
            StepOutcome::Waiting(reason) => {
                debug!(episode_id = %original.id, episode = %original.label(), reason = %reason, "Episode waiting");
            }
            StepOutcome::Failed(e) => {
                warn!(
                    episode_id = %original.id,
                    title = %item.title,
                    episode = %original.label(),
                    error = %e,
                    "Episode failed"
                );
                next.state = MediaState::Failed;
                next.last_error = Some(e.to_string());
                next.retry_count += 1;
            }
        }

        if !self.store.commit_episode(&next, from).await? {
            warn!(episode_id = %original.id, expected = %from, "Episode changed concurrently, skipping commit");
            return Ok(false);
        }
        log_transition("episode", original.id.value(), item, from, next.state);
        Ok(true)
    }

    async fn episode_step(
        &self,
        episode: &mut Episode,
        item: &MediaItem,
    ) -> Result<StepOutcome, PipelineError> {
        match episode.state {
            MediaState::Requested | MediaState::Indexed => self.scrape_episode(episode, item).await,
            MediaState::Scraped => self.download_episode(episode).await,
            MediaState::Downloading => {
                let status = self.recorded_status(episode.download_id.as_deref()).await?;
                Ok(download_outcome(status, episode.state, &mut episode.torrent_name))
            }
            MediaState::Downloaded => self.link_episode(episode, item).await,
            // The library is refreshed once per batch by the caller.
            MediaState::Symlinked => Ok(StepOutcome::Advanced(MediaState::Completed)),
            state => Ok(StepOutcome::Waiting(format!("nothing to do in {state}"))),
        }
    }

    /// Scrapes one episode, preferring an available release near the top.
    async fn scrape_episode(
        &self,
        episode: &mut Episode,
        item: &MediaItem,
    ) -> Result<StepOutcome, PipelineError> {
        let Some(imdb) = item.imdb_id.as_deref() else {
            return Ok(StepOutcome::Failed(PipelineError::ConfigurationMissing(
                format!("IMDb id for '{}'", item.title),
            )));
        };

        let candidates = scrape_episode(
            &self.services.scrapers,
            imdb,
            episode.season_number,
            episode.episode_number,
            episode.absolute_episode_number,
        )
        .await?;
        let label = format!("{} {}", item.title, episode.label());
        if candidates.is_empty() {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(label)));
        }

        let cache = self.check_cache(&candidates).await;
        let ctx = self.ranking_context(item.is_anime, &cache);
        let ranked = ranking::rank(&candidates, &ctx);
        let Some(&(top, top_score)) = ranked.first() else {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(label)));
        };

        // An available release near the top may stand in for the winner, but
        // never one from a different audio class on an anime show.
        let same_audio = |c: &Candidate| {
            !item.is_anime || ranking::has_english_audio(c) == ranking::has_english_audio(top)
        };
        let (chosen, score) = ranked
            .iter()
            .take(limits::CACHED_CANDIDATE_WINDOW)
            .find(|(c, _)| same_audio(c) && is_available(c, &cache))
            .copied()
            .unwrap_or((top, top_score));
        let Some(fingerprint) = chosen.fingerprint() else {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(label)));
        };

        debug!(
            episode_id = %episode.id,
            episode = %episode.label(),
            release = %chosen.title,
            score,
            cached = is_available(chosen, &cache),
            "Selected episode candidate"
        );
        episode.file_path = Some(fingerprint.to_string());
        episode.torrent_name = None;
        episode.download_id = None;
        Ok(StepOutcome::Advanced(MediaState::Scraped))
    }

    /// Submits the chosen release unless a sibling already holds the same season pack.
    async fn download_episode(&self, episode: &mut Episode) -> Result<StepOutcome, PipelineError> {
        let Some(fingerprint) = episode.file_path.as_deref().and_then(Fingerprint::parse) else {
            return Ok(StepOutcome::Failed(PipelineError::NoCandidatesFound(
                episode.label(),
            )));
        };

        if let Some(hash) = fingerprint.hash()
            && let Some(sibling) = self
                .store
                .find_episode_by_hash(episode.item_id, hash, episode.id)
                .await?
            && let Some(name) = sibling.torrent_name
        {
            debug!(
                episode_id = %episode.id,
                sibling = %sibling.id,
                release = %name,
                "Reusing release already acquired for a sibling"
            );
            episode.torrent_name = Some(name);
            return Ok(StepOutcome::Advanced(MediaState::Downloaded));
        }

        let submission = self.submit(&fingerprint).await?;
        episode.download_id = Some(submission.encode());
        let status = self.initial_status(&submission).await;
        Ok(download_outcome(status, episode.state, &mut episode.torrent_name))
    }

    /// Finds the episode's file: recorded path, then release name, then title search.
    pub(super) async fn locate_episode(&self, episode: &Episode, item: &MediaItem) -> Option<PathBuf> {
        let recorded = episode
            .file_path
            .clone()
            .filter(|p| Fingerprint::parse(p).is_none());
        let release = episode.torrent_name.clone();
        let titles = item.search_titles();
        let target = EpisodeTarget {
            season: episode.season_number,
            episode: episode.episode_number,
            absolute: episode.absolute_episode_number,
        };

        self.resolve(move |resolver| {
            recorded
                .as_deref()
                .and_then(|p| resolver.existing_file(p))
                .or_else(|| {
                    release
                        .as_deref()
                        .and_then(|name| resolver.find_by_release_name(name, Some(&target)))
                })
                .or_else(|| resolver.find_episode(&titles, &target))
        })
        .await
    }

    pub(super) async fn link_found_episode(
        &self,
        episode: &mut Episode,
        item: &MediaItem,
        source: PathBuf,
    ) -> Result<(), PipelineError> {
        let destination = self.links.episode_destination(
            item.kind,
            &item.title,
            item.year,
            episode.season_number,
            episode.episode_number,
            &source,
        );
        self.links.link(&source, &destination).await?;

        episode.file_path = Some(source.display().to_string());
        episode.symlink_path = Some(destination.display().to_string());
        episode.last_error = None;
        Ok(())
    }

    /// DOWNLOADED -> SYMLINKED.
    async fn link_episode(
        &self,
        episode: &mut Episode,
        item: &MediaItem,
    ) -> Result<StepOutcome, PipelineError> {
        if episode.torrent_name.is_none() && episode.file_path.is_none() {
            // Nothing to search by; start the acquisition over.
            return Ok(StepOutcome::Advanced(MediaState::Indexed));
        }
        if !self.mount_available().await {
            return Ok(StepOutcome::Waiting("mount unavailable".to_string()));
        }

        let Some(source) = self.locate_episode(episode, item).await else {
            let target = format!("{} {}", item.title, episode.label());
            return Ok(not_found_yet(
                &mut episode.retry_count,
                &mut episode.last_error,
                &target,
            ));
        };

        self.link_found_episode(episode, item, source).await?;
        Ok(StepOutcome::Advanced(MediaState::Symlinked))
    }

    /// Fills missing absolute numbers for anime shows in this batch, once per show.
    async fn fill_absolute_numbers(&self, due: &mut [(Episode, MediaItem)]) {
        let mut shows: HashMap<ItemId, i64> = HashMap::new();
        for (episode, item) in due.iter() {
            if item.is_anime
                && episode.absolute_episode_number.is_none()
                && let Some(tmdb) = item.tmdb_id
            {
                shows.insert(item.id, tmdb);
            }
        }

        for (item_id, show_id) in shows {
            let map = match self.services.metadata.get_absolute_episode_map(show_id).await {
                Ok(map) => map,
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Absolute episode map unavailable");
                    continue;
                }
            };
            match self.store.set_absolute_numbers(item_id, &map).await {
                Ok(updated) => debug!(item_id = %item_id, updated, "Filled absolute episode numbers"),
                Err(e) => warn!(item_id = %item_id, error = %e, "Failed to store absolute numbers"),
            }
            for (episode, _) in due.iter_mut().filter(|(e, _)| e.item_id == item_id) {
                if episode.absolute_episode_number.is_none() {
                    episode.absolute_episode_number = map
                        .get(&(episode.season_number, episode.episode_number))
                        .copied();
                }
            }
        }
    }

    async fn run_episode_batch(&self, due: Vec<(Episode, MediaItem)>) -> BatchReport {
        let mut report = BatchReport::default();
        for (episode, item) in &due {
            match self.advance_episode(episode, item).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => error!(episode_id = %episode.id, error = %e, "Failed to commit episode step"),
            }
        }
        report
    }

    /// Scrapes REQUESTED episodes, then INDEXED ones that were reset.
    pub async fn process_episode_scrapes(&self) -> anyhow::Result<BatchReport> {
        let mut due = self
            .store
            .list_due_episodes(MediaState::Requested, limits::EPISODE_SCRAPE_BATCH)
            .await?;
        let room = limits::EPISODE_SCRAPE_BATCH.saturating_sub(due.len() as u64);
        if room > 0 {
            due.extend(self.store.list_due_episodes(MediaState::Indexed, room).await?);
        }
        if due.is_empty() {
            return Ok(BatchReport::default());
        }

        self.fill_absolute_numbers(&mut due).await;
        let report = self.run_episode_batch(due).await;
        info!(
            processed = report.processed,
            scraped = report.advanced,
            failed = report.failed,
            "Episode scrape batch finished"
        );
        Ok(report)
    }

    /// Submits SCRAPED episodes and re-checks DOWNLOADING ones.
    pub async fn process_episode_downloads(&self) -> anyhow::Result<BatchReport> {
        let mut due = self
            .store
            .list_due_episodes(MediaState::Scraped, limits::EPISODE_DOWNLOAD_BATCH)
            .await?;
        due.extend(
            self.store
                .list_due_episodes(MediaState::Downloading, limits::EPISODE_DOWNLOAD_BATCH)
                .await?,
        );
        if due.is_empty() {
            return Ok(BatchReport::default());
        }

        let report = self.run_episode_batch(due).await;
        info!(
            processed = report.processed,
            advanced = report.advanced,
            failed = report.failed,
            "Episode download batch finished"
        );
        Ok(report)
    }

    /// Links DOWNLOADED episodes, completes SYMLINKED ones, and refreshes the
    /// library once if anything completed.
    pub async fn process_episode_links(&self) -> anyhow::Result<BatchReport> {
        let downloaded = self
            .store
            .list_due_episodes(MediaState::Downloaded, limits::EPISODE_SYMLINK_BATCH)
            .await?;
        let mut report = self.run_episode_batch(downloaded).await;

        let linked = self
            .store
            .list_due_episodes(MediaState::Symlinked, limits::EPISODE_SYMLINK_BATCH)
            .await?;
        if !linked.is_empty() {
            let completed = self.run_episode_batch(linked).await;
            if completed.advanced > 0 && !self.services.library.refresh().await {
                warn!("Library refresh did not go through");
            }
            report.processed += completed.processed;
            report.advanced += completed.advanced;
            report.failed += completed.failed;
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                advanced = report.advanced,
                failed = report.failed,
                "Episode link batch finished"
            );
        }
        Ok(report)
    }
}

fn is_available(candidate: &Candidate, cache: &CacheAvailability) -> bool {
    candidate.is_usenet()
        || candidate
            .normalized_hash()
            .and_then(|h| cache.get(&h))
            .is_some_and(|providers| !providers.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dub_marker() {
        assert!(has_dub_marker("[Group] Show - 01 [Dual Audio].mkv"));
        assert!(has_dub_marker("Show S01E01 1080p ENG"));
        assert!(has_dub_marker("Show.S01E01.English.1080p.mkv"));
        assert!(!has_dub_marker("[SubsPlease] Show - 01 (1080p).mkv"));
        // Words that merely contain a marker do not count.
        assert!(!has_dub_marker("Dublin Murders S01E01.mkv"));
    }

    #[test]
    fn test_availability() {
        let mut cache = CacheAvailability::new();
        cache.insert("aaa".to_string(), vec!["torbox".to_string()]);
        cache.insert("bbb".to_string(), vec![]);

        let cached = Candidate {
            info_hash: Some("AAA".to_string()),
            ..Default::default()
        };
        let listed_nowhere = Candidate {
            info_hash: Some("bbb".to_string()),
            ..Default::default()
        };
        let usenet = Candidate {
            download_url: Some("https://indexer/1.nzb".to_string()),
            ..Default::default()
        };
        assert!(is_available(&cached, &cache));
        assert!(!is_available(&listed_nowhere, &cache));
        assert!(is_available(&usenet, &cache));
    }

    #[test]
    fn test_batch_report_counts() {
        let mut report = BatchReport::default();
        report.record(&StepOutcome::Advanced(MediaState::Scraped));
        report.record(&StepOutcome::Waiting("pending".into()));
        report.record(&StepOutcome::Failed(PipelineError::NoCandidatesFound("x".into())));
        assert_eq!(
            report,
            BatchReport {
                processed: 3,
                advanced: 1,
                failed: 1
            }
        );
    }
}
