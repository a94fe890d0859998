//! Thin enumeration layer over the mounted tree.
//!
//! The resolver only ever asks three questions of the mount, so a test can
//! answer them from memory instead of touching disk.

use crate::constants::VIDEO_EXTENSIONS;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

impl MountEntry {
    #[must_use]
    pub fn is_video(&self) -> bool {
        !self.is_dir
            && self
                .path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| {
                    VIDEO_EXTENSIONS
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(ext))
                })
    }

    /// Name of the directory holding this entry.
    #[must_use]
    pub fn parent_name(&self) -> Option<String> {
        self.path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(ToString::to_string)
    }
}

pub trait MountFs: Send + Sync {
    /// Direct children of `dir`.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<MountEntry>>;

    /// Every file below `root`, or `root` itself when it is a file.
    fn walk_files(&self, root: &Path) -> Vec<MountEntry>;

    fn entry(&self, path: &Path) -> Option<MountEntry>;
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// The real mount, read through `std::fs` and `walkdir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMount;

impl MountFs for LocalMount {
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<MountEntry>> {
        let mut entries = Vec::new();
        for item in std::fs::read_dir(dir)? {
            let Ok(item) = item else { continue };
            let path = item.path();
            // Follows links so a mount of symlinked folders still enumerates.
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            entries.push(MountEntry {
                name: entry_name(&path),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                path,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn walk_files(&self, root: &Path) -> Vec<MountEntry> {
        walkdir::WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| MountEntry {
                name: entry_name(entry.path()),
                is_dir: false,
                size: entry.metadata().map(|m| m.len()).unwrap_or(0),
                path: entry.into_path(),
            })
            .collect()
    }

    fn entry(&self, path: &Path) -> Option<MountEntry> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(MountEntry {
            path: path.to_path_buf(),
            name: entry_name(path),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        })
    }
}

/// In-memory tree of files. Directories exist implicitly through their files.
#[derive(Debug, Default, Clone)]
pub struct MemoryMount {
    files: BTreeMap<PathBuf, u64>,
}

impl MemoryMount {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, size: u64) -> &mut Self {
        self.files.insert(path.into(), size);
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, size: u64) -> Self {
        self.add_file(path, size);
        self
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

impl MountFs for MemoryMount {
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<MountEntry>> {
        let mut children: BTreeMap<String, MountEntry> = BTreeMap::new();

        for (file, size) in &self.files {
            let Ok(rest) = file.strip_prefix(dir) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().to_string();
            let is_dir = components.next().is_some();
            children.entry(name.clone()).or_insert_with(|| MountEntry {
                path: dir.join(&name),
                name,
                is_dir,
                size: if is_dir { 0 } else { *size },
            });
        }

        if children.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", dir.display()),
            ));
        }
        Ok(children.into_values().collect())
    }

    fn walk_files(&self, root: &Path) -> Vec<MountEntry> {
        self.files
            .iter()
            .filter(|(file, _)| file.starts_with(root))
            .map(|(file, size)| MountEntry {
                path: file.clone(),
                name: entry_name(file),
                is_dir: false,
                size: *size,
            })
            .collect()
    }

    fn entry(&self, path: &Path) -> Option<MountEntry> {
        if let Some(size) = self.files.get(path) {
            return Some(MountEntry {
                path: path.to_path_buf(),
                name: entry_name(path),
                is_dir: false,
                size: *size,
            });
        }
        self.is_dir(path).then(|| MountEntry {
            path: path.to_path_buf(),
            name: entry_name(path),
            is_dir: true,
            size: 0,
        })
    }
}
