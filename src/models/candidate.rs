use crate::constants::USENET_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One discovered downloadable source for a title.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    /// Torrent content hash. Usenet results carry a `download_url` instead.
    pub info_hash: Option<String>,

    pub title: String,

    /// Name of the scraper that produced this candidate.
    pub source: String,

    pub resolution: Option<String>,

    pub quality: Option<String>,

    pub codec: Option<String>,

    pub audio: Option<String>,

    pub size_bytes: Option<u64>,

    pub seeders: Option<u32>,

    pub is_dual_audio: bool,

    pub is_dubbed: bool,

    pub release_group: Option<String>,

    pub download_url: Option<String>,
}

impl Candidate {
    #[must_use]
    pub fn is_usenet(&self) -> bool {
        self.info_hash.is_none() && self.download_url.is_some()
    }

    #[must_use]
    pub fn normalized_hash(&self) -> Option<String> {
        self.info_hash.as_deref().map(str::to_lowercase)
    }

    /// Stable reference persisted once the candidate wins selection.
    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        if let Some(hash) = self.normalized_hash() {
            return Some(Fingerprint::Torrent(hash));
        }
        self.download_url.clone().map(Fingerprint::Usenet)
    }
}

/// What a selected candidate is remembered by between scrape and download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Torrent(String),
    Usenet(String),
}

impl Fingerprint {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(link) = raw.strip_prefix(USENET_PREFIX) {
            return Some(Self::Usenet(link.to_string()));
        }
        // Resolved paths share the column; anything with a separator is not a hash.
        if raw.contains('/') || raw.contains('\\') {
            return None;
        }
        Some(Self::Torrent(raw.to_lowercase()))
    }

    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Torrent(hash) => Some(hash),
            Self::Usenet(_) => None,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Torrent(hash) => f.write_str(hash),
            Self::Usenet(link) => write!(f, "{USENET_PREFIX}{link}"),
        }
    }
}
