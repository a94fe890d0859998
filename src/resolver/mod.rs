//! Locates acquired files on the mount and links them into the library.
//!
//! Matching logic lives in [`matching`] and never touches the filesystem;
//! enumeration goes through [`MountFs`] so tests can use [`MemoryMount`].

pub mod matching;
pub mod mount;
pub mod symlink;

use crate::config::MountConfig;
use crate::parser::filename::strip_video_extension;
use matching::{
    RELEASE_OVERLAP_THRESHOLD, conflicts_with, embedded_episode, episode_matches,
    file_title_conflicts, loose_episode_numbers, mentions_movie, movie_folder_score,
    release_conflicts, season_signal, strict_markers, titles_match, word_overlap,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub use matching::EpisodeTarget;
pub use mount::{LocalMount, MemoryMount, MountEntry, MountFs};
pub use symlink::LinkBuilder;

/// ENOTCONN, reported by a FUSE mount whose backend went away.
const TRANSPORT_NOT_CONNECTED: i32 = 107;

pub struct FileResolver {
    fs: Arc<dyn MountFs>,
    mount_root: PathBuf,
    search_dirs: Vec<String>,
    ignored: Vec<String>,
}

impl FileResolver {
    #[must_use]
    pub fn new(fs: Arc<dyn MountFs>, config: &MountConfig) -> Self {
        Self {
            fs,
            mount_root: PathBuf::from(&config.mount_path),
            search_dirs: config.search_dirs.clone(),
            ignored: config
                .ignored_names
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn local(config: &MountConfig) -> Self {
        Self::new(Arc::new(LocalMount), config)
    }

    #[must_use]
    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Whether the mount answers a listing and has content.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match self.fs.list_dir(&self.mount_root) {
            Ok(entries) => !entries.is_empty(),
            Err(e) if e.raw_os_error() == Some(TRANSPORT_NOT_CONNECTED) => {
                warn!("Mount not available: transport endpoint not connected");
                false
            }
            Err(e) => {
                warn!(path = %self.mount_root.display(), error = %e, "Mount check failed");
                false
            }
        }
    }

    /// A previously recorded path, if it still points at a file.
    #[must_use]
    pub fn existing_file(&self, path: &str) -> Option<PathBuf> {
        self.fs
            .entry(Path::new(path))
            .filter(|e| !e.is_dir)
            .map(|e| e.path)
    }

    fn is_ignored(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.ignored.iter().any(|i| *i == lower)
    }

    /// Top-level releases across every searched subdirectory, deduplicated by name.
    fn releases(&self) -> Vec<MountEntry> {
        let mut seen = HashSet::new();
        let mut releases = Vec::new();

        for dir in &self.search_dirs {
            let path = self.mount_root.join(dir);
            let entries = match self.fs.list_dir(&path) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable mount folder");
                    continue;
                }
            };

            for entry in entries {
                if self.is_ignored(&entry.name) || (!entry.is_dir && !entry.is_video()) {
                    continue;
                }
                if seen.insert(entry.name.clone()) {
                    releases.push(entry);
                }
            }
        }

        releases
    }

    /// Video files of a release, largest first. Samples and ignored folders are skipped.
    fn videos(&self, release: &MountEntry) -> Vec<MountEntry> {
        if !release.is_dir {
            return if release.is_video() {
                vec![release.clone()]
            } else {
                vec![]
            };
        }

        let mut files: Vec<MountEntry> = self
            .fs
            .walk_files(&release.path)
            .into_iter()
            .filter(|f| f.is_video() && !f.name.to_lowercase().contains("sample"))
            .filter(|f| {
                f.path
                    .strip_prefix(&release.path)
                    .map(|rest| {
                        !rest
                            .components()
                            .any(|c| self.is_ignored(&c.as_os_str().to_string_lossy()))
                    })
                    .unwrap_or(true)
            })
            .collect();
        files.sort_by(|a, b| b.size.cmp(&a.size));
        files
    }

    /// Folder names a file inherits season context from.
    fn folder_context(release: &MountEntry, file: &MountEntry) -> Option<String> {
        if !release.is_dir {
            return None;
        }
        match file.parent_name() {
            Some(parent) if parent != release.name => Some(format!("{parent} {}", release.name)),
            _ => Some(release.name.clone()),
        }
    }

    /// Largest file in `release` that is the requested episode.
    fn episode_file(
        &self,
        release: &MountEntry,
        target: &EpisodeTarget,
        titles: Option<&[String]>,
    ) -> Option<MountEntry> {
        let videos = self.videos(release);

        let matched = videos.iter().find(|file| {
            let context = Self::folder_context(release, file);
            episode_matches(&file.name, context.as_deref(), target)
                && titles.is_none_or(|t| !file_title_conflicts(&file.name, t))
        });
        if let Some(file) = matched {
            return Some(file.clone());
        }

        // A single-episode release with generically named files.
        let folder_is_target = release.is_dir
            && embedded_episode(&release.name).is_some_and(|m| {
                m.season == target.season && m.episodes.contains(&target.episode)
            });
        if folder_is_target {
            return videos
                .into_iter()
                .find(|f| strict_markers(&f.name).is_empty() && !mentions_movie(&f.name));
        }

        None
    }

    /// Finds a file by the release name the remote-storage provider reported.
    ///
    /// Exact name first, then the name without its extension, then the best
    /// fuzzy word overlap above half. The fuzzy step refuses folders whose
    /// own episode number contradicts the release or the target.
    #[must_use]
    pub fn find_by_release_name(
        &self,
        release_name: &str,
        target: Option<&EpisodeTarget>,
    ) -> Option<PathBuf> {
        let release_name = release_name.trim();
        if release_name.is_empty() {
            return None;
        }

        let releases = self.releases();
        let stripped = strip_video_extension(release_name);

        let exact = releases
            .iter()
            .find(|e| e.name == release_name)
            .or_else(|| {
                releases
                    .iter()
                    .find(|e| e.name == stripped || strip_video_extension(&e.name) == stripped)
            });

        let chosen = exact.or_else(|| {
            releases
                .iter()
                .filter(|e| !release_conflicts(&e.name, release_name))
                .filter(|e| target.is_none_or(|t| !conflicts_with(&e.name, t)))
                .map(|e| (e, word_overlap(&e.name, release_name)))
                .filter(|(_, overlap)| *overlap > RELEASE_OVERLAP_THRESHOLD)
                .fold(None, |best: Option<(&MountEntry, f64)>, (e, overlap)| match best {
                    Some((_, best_overlap)) if best_overlap >= overlap => best,
                    _ => Some((e, overlap)),
                })
                .map(|(e, overlap)| {
                    debug!(folder = %e.name, overlap, "Fuzzy release match");
                    e
                })
        })?;

        match target {
            Some(target) => self.episode_file(chosen, target, None).map(|f| f.path),
            None => self.videos(chosen).into_iter().next().map(|f| f.path),
        }
    }

    /// Title search for one episode across every release that names the show.
    #[must_use]
    pub fn find_episode(&self, titles: &[String], target: &EpisodeTarget) -> Option<PathBuf> {
        let mut best: Option<MountEntry> = None;

        for release in self.releases() {
            if !titles_match(&release.name, titles) || conflicts_with(&release.name, target) {
                continue;
            }
            if let Some(file) = self.episode_file(&release, target, Some(titles))
                && best.as_ref().is_none_or(|b| file.size > b.size)
            {
                best = Some(file);
            }
        }

        best.map(|f| f.path)
    }

    /// Largest video in the best-scoring folder for a movie.
    #[must_use]
    pub fn find_movie(&self, titles: &[String], year: Option<i32>) -> Option<PathBuf> {
        let mut scored: Vec<(MountEntry, i64)> = self
            .releases()
            .into_iter()
            .filter(|e| embedded_episode(&e.name).is_none())
            .map(|e| {
                let score = movie_folder_score(&e.name, titles, year);
                (e, score)
            })
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        scored.into_iter().find_map(|(release, score)| {
            debug!(folder = %release.name, score, "Movie folder candidate");
            self.videos(&release).into_iter().next().map(|f| f.path)
        })
    }

    /// Release whose name carries the content hash.
    #[must_use]
    pub fn find_by_hash(&self, hash: &str) -> Option<PathBuf> {
        let hash = hash.trim().to_lowercase();
        if hash.is_empty() {
            return None;
        }
        self.releases()
            .into_iter()
            .filter(|e| e.name.to_lowercase().contains(&hash))
            .find_map(|e| self.videos(&e).into_iter().next())
            .map(|f| f.path)
    }

    /// Every episode of a show already present on the mount, keyed by (season, episode).
    ///
    /// When two files claim the same episode the larger one is kept.
    #[must_use]
    pub fn scan_show(&self, titles: &[String]) -> HashMap<(i32, i32), MountEntry> {
        let mut found: HashMap<(i32, i32), MountEntry> = HashMap::new();

        for release in self.releases() {
            if !titles_match(&release.name, titles) {
                continue;
            }
            for file in self.videos(&release) {
                if mentions_movie(&file.name) || file_title_conflicts(&file.name, titles) {
                    continue;
                }
                let context = Self::folder_context(&release, &file);
                for key in episode_keys(&file.name, context.as_deref()) {
                    let keep = found.get(&key).is_none_or(|existing| file.size > existing.size);
                    if keep {
                        found.insert(key, file.clone());
                    }
                }
            }
        }

        found
    }
}

/// Episodes a file name claims, strict markers first, loose numbers otherwise.
fn episode_keys(file_name: &str, folder: Option<&str>) -> Vec<(i32, i32)> {
    let markers = strict_markers(file_name);
    if !markers.is_empty() {
        return markers
            .iter()
            .flat_map(|m| m.episodes.iter().map(move |e| (m.season, *e)))
            .collect();
    }

    let season = season_signal(file_name)
        .or_else(|| folder.and_then(season_signal))
        .unwrap_or(1);
    loose_episode_numbers(file_name)
        .into_iter()
        .map(|n| (season, n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    fn resolver(mount: MemoryMount) -> FileResolver {
        FileResolver::new(
            Arc::new(mount),
            &MountConfig {
                mount_path: "/mnt".to_string(),
                ..MountConfig::default()
            },
        )
    }

    fn titles(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn target(season: i32, episode: i32) -> EpisodeTarget {
        EpisodeTarget {
            season,
            episode,
            absolute: None,
        }
    }

    #[test]
    fn test_single_episode_folder_scenario() {
        let r = resolver(
            MemoryMount::new()
                .with_file(
                    "/mnt/__all__/Show.Name.S02E05.1080p/Show.Name.S02E05.1080p.mkv",
                    2 * GB,
                )
                .with_file("/mnt/__all__/Show.Name.S02E05.1080p/sample.mkv", 10),
        );
        let t = titles(&["Show Name"]);

        assert_eq!(
            r.find_episode(&t, &target(2, 5)),
            Some(PathBuf::from(
                "/mnt/__all__/Show.Name.S02E05.1080p/Show.Name.S02E05.1080p.mkv"
            ))
        );
        assert_eq!(r.find_episode(&t, &target(2, 6)), None);
    }

    #[test]
    fn test_season_pack_picks_matching_episode() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/shows/Show.Name.S03.1080p/Show.Name.S03E01E02.mkv", 3 * GB)
                .with_file("/mnt/shows/Show.Name.S03.1080p/Show.Name.S03E03.mkv", GB),
        );
        let t = titles(&["Show Name"]);

        let double = PathBuf::from("/mnt/shows/Show.Name.S03.1080p/Show.Name.S03E01E02.mkv");
        assert_eq!(r.find_episode(&t, &target(3, 1)), Some(double.clone()));
        assert_eq!(r.find_episode(&t, &target(3, 2)), Some(double));
        assert_eq!(
            r.find_episode(&t, &target(3, 3)),
            Some(PathBuf::from("/mnt/shows/Show.Name.S03.1080p/Show.Name.S03E03.mkv"))
        );
        assert_eq!(r.find_episode(&t, &target(3, 4)), None);
    }

    #[test]
    fn test_other_show_file_rejected_inside_matching_folder() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/__all__/Show Name Collection/Other.Series.S01E01.mkv", GB),
        );
        assert_eq!(
            r.find_episode(&titles(&["Show Name"]), &target(1, 1)),
            None
        );
    }

    #[test]
    fn test_largest_match_wins_across_folders() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/__all__/Show.Name.S01E01.720p/Show.Name.S01E01.720p.mkv", GB)
                .with_file(
                    "/mnt/__all__/Show.Name.S01E01.2160p/Show.Name.S01E01.2160p.mkv",
                    8 * GB,
                ),
        );
        assert_eq!(
            r.find_episode(&titles(&["Show Name"]), &target(1, 1)),
            Some(PathBuf::from(
                "/mnt/__all__/Show.Name.S01E01.2160p/Show.Name.S01E01.2160p.mkv"
            ))
        );
    }

    #[test]
    fn test_anime_absolute_and_folder_season() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/anime/[Group] Show (Season 2)/[Group] Show - 05 [1080p].mkv", GB)
                .with_file("/mnt/anime/[Group] Show - 053 [1080p].mkv", GB),
        );
        let t = titles(&["Show"]);

        assert_eq!(
            r.find_episode(&t, &target(2, 5)),
            Some(PathBuf::from(
                "/mnt/anime/[Group] Show (Season 2)/[Group] Show - 05 [1080p].mkv"
            ))
        );

        let absolute = EpisodeTarget {
            season: 3,
            episode: 1,
            absolute: Some(53),
        };
        assert_eq!(
            r.find_episode(&t, &absolute),
            Some(PathBuf::from("/mnt/anime/[Group] Show - 053 [1080p].mkv"))
        );
    }

    #[test]
    fn test_find_by_release_name_exact_and_stripped() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/__all__/Film.2020.1080p.BluRay/Film.2020.1080p.BluRay.mkv", 4 * GB)
                .with_file("/mnt/__all__/Film.2020.1080p.BluRay/extras/bonus.mkv", 5 * GB),
        );
        let expected = Some(PathBuf::from(
            "/mnt/__all__/Film.2020.1080p.BluRay/Film.2020.1080p.BluRay.mkv",
        ));

        assert_eq!(r.find_by_release_name("Film.2020.1080p.BluRay", None), expected);
        assert_eq!(r.find_by_release_name("Film.2020.1080p.BluRay.mkv", None), expected);
    }

    #[test]
    fn test_find_by_release_name_fuzzy_guard() {
        let r = resolver(
            MemoryMount::new()
                .with_file(
                    "/mnt/__all__/Show.Name.S01E04.1080p.WEB-DL/Show.Name.S01E04.1080p.WEB-DL.mkv",
                    GB,
                )
                .with_file("/mnt/__all__/Show.Name.S01.1080p.WEB-DL/Show.Name.S01E06.mkv", GB),
        );

        let found = r.find_by_release_name("Show Name S01E06 1080p WEB-DL x264", Some(&target(1, 6)));
        assert_eq!(
            found,
            Some(PathBuf::from(
                "/mnt/__all__/Show.Name.S01.1080p.WEB-DL/Show.Name.S01E06.mkv"
            ))
        );

        assert_eq!(r.find_by_release_name("Completely Different Thing", None), None);
    }

    #[test]
    fn test_find_movie_prefers_year() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/movies/The.Matrix.2021.1080p/matrix.mkv", 9 * GB)
                .with_file("/mnt/movies/The.Matrix.1999.1080p/matrix.mkv", 5 * GB)
                .with_file("/mnt/movies/The.Matrix.1999.1080p/matrix-sample.mkv", 1),
        );
        assert_eq!(
            r.find_movie(&titles(&["The Matrix"]), Some(1999)),
            Some(PathBuf::from("/mnt/movies/The.Matrix.1999.1080p/matrix.mkv"))
        );
    }

    #[test]
    fn test_find_by_hash() {
        let r = resolver(
            MemoryMount::new().with_file("/mnt/__all__/abcdef123456/movie.mkv", GB),
        );
        assert_eq!(
            r.find_by_hash("ABCDEF123456"),
            Some(PathBuf::from("/mnt/__all__/abcdef123456/movie.mkv"))
        );
        assert_eq!(r.find_by_hash("ffff"), None);
    }

    #[test]
    fn test_scan_show_keeps_larger_file() {
        let r = resolver(
            MemoryMount::new()
                .with_file("/mnt/__all__/Show.Name.S01.720p/Show.Name.S01E01.mkv", GB)
                .with_file("/mnt/__all__/Show.Name.S01.1080p/Show.Name.S01E01.mkv", 2 * GB)
                .with_file("/mnt/__all__/Show.Name.S01.1080p/Show.Name.S01E02.mkv", 2 * GB)
                .with_file("/mnt/__all__/Other.Show.S01/Other.Show.S01E03.mkv", GB),
        );
        let found = r.scan_show(&titles(&["Show Name"]));

        assert_eq!(found.len(), 2);
        assert_eq!(
            found[&(1, 1)].path,
            PathBuf::from("/mnt/__all__/Show.Name.S01.1080p/Show.Name.S01E01.mkv")
        );
        assert!(!found.contains_key(&(1, 3)));
    }

    #[test]
    fn test_ignored_folders_and_availability() {
        let r = resolver(MemoryMount::new().with_file("/mnt/__all__/Sample/Show.S01E01.mkv", GB));
        assert!(r.is_available());
        assert_eq!(r.find_episode(&titles(&["Show"]), &target(1, 1)), None);

        let empty = resolver(MemoryMount::new());
        assert!(!empty.is_available());
    }

    #[test]
    fn test_existing_file() {
        let r = resolver(MemoryMount::new().with_file("/mnt/__all__/a/b.mkv", 1));
        assert!(r.existing_file("/mnt/__all__/a/b.mkv").is_some());
        assert!(r.existing_file("/mnt/__all__/a").is_none());
        assert!(r.existing_file("/mnt/__all__/c.mkv").is_none());
    }
}
