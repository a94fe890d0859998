use crate::config::LibraryConfig;
use crate::domain::MediaKind;
use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Builds destination paths inside the symlink tree and creates the links.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    config: LibraryConfig,
}

impl LinkBuilder {
    #[must_use]
    pub const fn new(config: LibraryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn kind_dir(&self, kind: MediaKind) -> PathBuf {
        Path::new(&self.config.symlink_path).join(self.config.folder_for(kind))
    }

    /// `<Title> (<Year>)` folder shared by movies and shows.
    #[must_use]
    pub fn title_dir(&self, kind: MediaKind, title: &str, year: Option<i32>) -> PathBuf {
        self.kind_dir(kind).join(titled_folder(title, year))
    }

    /// `<Title> (<Year>)/<Title> (<Year>).<ext>`
    #[must_use]
    pub fn movie_destination(
        &self,
        kind: MediaKind,
        title: &str,
        year: Option<i32>,
        source: &Path,
    ) -> PathBuf {
        let name = titled_folder(title, year);
        self.kind_dir(kind)
            .join(&name)
            .join(with_source_extension(&name, source))
    }

    /// `<Title> (<Year>)/Season <NN>/<Title> - S<NN>E<NN>.<ext>`
    #[must_use]
    pub fn episode_destination(
        &self,
        kind: MediaKind,
        title: &str,
        year: Option<i32>,
        season: i32,
        episode: i32,
        source: &Path,
    ) -> PathBuf {
        let clean = clean_filename(title);
        let file = format!("{clean} - S{season:02}E{episode:02}");
        self.title_dir(kind, title, year)
            .join(format!("Season {season:02}"))
            .join(with_source_extension(&file, source))
    }

    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        for kind in [
            MediaKind::Movie,
            MediaKind::Show,
            MediaKind::AnimeMovie,
            MediaKind::AnimeShow,
        ] {
            let dir = self.kind_dir(kind);
            tokio::fs::create_dir_all(&dir).await?;
            debug!(path = %dir.display(), "Ensured directory");
        }
        Ok(())
    }

    /// Points `destination` at `source`, replacing whatever was there.
    ///
    /// Calling this twice with the same arguments leaves one valid link.
    pub async fn link(&self, source: &Path, destination: &Path) -> Result<(), PipelineError> {
        let failed = |reason: String| PipelineError::SymlinkCreationFailed {
            path: destination.display().to_string(),
            reason,
        };

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(e.to_string()))?;
        }

        // symlink_metadata sees dangling links that exists() would miss.
        if tokio::fs::symlink_metadata(destination).await.is_ok() {
            tokio::fs::remove_file(destination)
                .await
                .map_err(|e| failed(e.to_string()))?;
        }

        create_symlink(source, destination)
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!(
            source = %source.display(),
            destination = %destination.display(),
            "Created symlink"
        );
        Ok(())
    }

    /// Removes a single link. Returns whether anything was removed.
    pub async fn remove_link(&self, path: &Path) -> std::io::Result<bool> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.file_type().is_symlink() || meta.is_file() => {
                tokio::fs::remove_file(path).await?;
                info!(path = %path.display(), "Removed symlink");
                Ok(true)
            }
            Ok(_) => {
                warn!(path = %path.display(), "Refusing to remove non-link path");
                Ok(false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Removes the folder holding `link` once nothing else is left in it.
    ///
    /// Only title folders inside the symlink tree qualify; the tree root and
    /// the per-kind folders are never removed.
    pub async fn prune_empty_parent(&self, link: &Path) -> std::io::Result<bool> {
        let Some(parent) = link.parent() else {
            return Ok(false);
        };
        let depth = parent
            .strip_prefix(&self.config.symlink_path)
            .map_or(0, |rest| rest.components().count());
        if depth < 2 {
            return Ok(false);
        }
        match tokio::fs::remove_dir(parent).await {
            Ok(()) => {
                info!(path = %parent.display(), "Removed empty title folder");
                Ok(true)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Removes a show's whole folder. Only paths inside the symlink tree are touched.
    pub async fn remove_dir(&self, dir: &Path) -> std::io::Result<bool> {
        if !dir.starts_with(&self.config.symlink_path) {
            warn!(path = %dir.display(), "Refusing to remove folder outside the symlink tree");
            return Ok(false);
        }
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {
                info!(path = %dir.display(), "Removed show folder");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
async fn create_symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, destination).await
}

#[cfg(not(unix))]
async fn create_symlink(_source: &Path, _destination: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are only supported on unix",
    ))
}

fn titled_folder(title: &str, year: Option<i32>) -> String {
    let year = year.map_or_else(|| "Unknown".to_string(), |y| y.to_string());
    format!("{} ({year})", clean_filename(title))
}

fn with_source_extension(stem: &str, source: &Path) -> String {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Drops characters that are invalid in file names and collapses whitespace.
#[must_use]
pub fn clean_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
