//! Candidate scoring and selection.
//!
//! Scoring is a pure additive function over independent factors. Cache
//! availability outweighs everything else, then anime language preferences,
//! then the quality tiers. `select` is deterministic: ties keep discovery order.

pub mod tiers;

use crate::constants::scoring;
use crate::models::Candidate;
use crate::parser::normalize_for_matching;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Lowercased content hash -> providers reporting it as cached.
pub type CacheAvailability = HashMap<String, Vec<String>>;

pub const DEFAULT_TRUSTED_GROUPS: &[&str] = &[
    "SubsPlease",
    "Erai-raws",
    "ASW",
    "Judas",
    "Ember",
    "Anime Time",
    "Anime Land",
    "HorribleSubs",
];

const FOREIGN_MARKERS: &[&str] = &[
    "ita", "italian", "fra", "french", "ger", "german", "spa", "spanish",
];

const ENGLISH_MARKERS: &[&str] = &["eng", "english", "multi"];

const ENGLISH_DUB_MARKERS: &[&str] = &[
    "english dub",
    "eng dub",
    "english audio",
    "english dubbed",
    "dub[",
    "dubbed",
    "english]",
    "[eng]",
    "(eng)",
    "english.dub",
];

const RAW_TOKENS: &[&str] = &["raw", "raws"];

const RAW_PHRASES: &[&str] = &["japanese only", "jap only", "no subs"];

#[derive(Debug, Clone, Copy)]
pub struct RankingContext<'a> {
    pub is_anime: bool,
    pub dubbed_only: bool,
    pub cache: &'a CacheAvailability,
    pub trusted_groups: &'a [String],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub cache: i64,
    pub anime: i64,
    pub language: i64,
    pub resolution: i64,
    pub source: i64,
    pub codec: i64,
    pub audio: i64,
    pub size: i64,
    pub seeders: i64,
}

impl ScoreBreakdown {
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.cache
            + self.anime
            + self.language
            + self.resolution
            + self.source
            + self.codec
            + self.audio
            + self.size
            + self.seeders
    }
}

#[must_use]
pub fn score(candidate: &Candidate, ctx: &RankingContext<'_>) -> i64 {
    breakdown(candidate, ctx).total()
}

#[must_use]
pub fn breakdown(candidate: &Candidate, ctx: &RankingContext<'_>) -> ScoreBreakdown {
    let title = candidate.title.as_str();
    let cached_on = candidate
        .normalized_hash()
        .and_then(|hash| ctx.cache.get(&hash))
        .filter(|providers| !providers.is_empty());
    let available = cached_on.is_some() || candidate.is_usenet();

    ScoreBreakdown {
        cache: cache_score(cached_on, candidate.is_usenet()),
        anime: if ctx.is_anime {
            anime_score(candidate, ctx)
        } else {
            0
        },
        language: language_penalty(title),
        resolution: tiers::lookup(
            tiers::resolution(),
            &[candidate.resolution.as_deref(), Some(title)],
        ),
        source: tiers::lookup(
            tiers::source(),
            &[candidate.quality.as_deref(), Some(title)],
        ),
        codec: tiers::lookup(tiers::codec(), &[candidate.codec.as_deref(), Some(title)]),
        audio: tiers::lookup(tiers::audio(), &[candidate.audio.as_deref(), Some(title)]),
        size: size_score(candidate.size_bytes),
        seeders: seeder_score(candidate.seeders, available),
    }
}

/// Highest-scoring candidate, or `None` for an empty list.
#[must_use]
pub fn select<'c>(candidates: &'c [Candidate], ctx: &RankingContext<'_>) -> Option<&'c Candidate> {
    rank(candidates, ctx).into_iter().next().map(|(c, _)| c)
}

/// All candidates with their scores, best first. Equal scores keep input order.
#[must_use]
pub fn rank<'c>(candidates: &'c [Candidate], ctx: &RankingContext<'_>) -> Vec<(&'c Candidate, i64)> {
    let mut scored: Vec<_> = candidates.iter().map(|c| (c, score(c, ctx))).collect();
    scored.sort_by_key(|(_, s)| Reverse(*s));
    scored
}

fn cache_score(cached_on: Option<&Vec<String>>, is_usenet: bool) -> i64 {
    match cached_on {
        Some(providers) => {
            let preferred = providers
                .iter()
                .any(|p| p == scoring::PREFERRED_PROVIDER);
            scoring::CACHE_BONUS
                + if preferred {
                    scoring::PREFERRED_PROVIDER_BONUS
                } else {
                    0
                }
        }
        None if is_usenet => scoring::CACHE_BONUS,
        None => 0,
    }
}

fn anime_score(candidate: &Candidate, ctx: &RankingContext<'_>) -> i64 {
    let lower = candidate.title.to_lowercase();
    // Group names like "Erai-raws" must not read as raw markers.
    let scrubbed = candidate
        .release_group
        .as_deref()
        .map_or_else(|| lower.clone(), |g| lower.replace(&g.to_lowercase(), " "));
    let normalized = normalize_for_matching(&scrubbed);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    let mut total = 0;
    let dubbed = has_english_audio(candidate);

    if candidate.is_dual_audio {
        total += scoring::DUAL_AUDIO_BONUS;
    } else if ENGLISH_DUB_MARKERS.iter().any(|m| lower.contains(m)) {
        total += scoring::ENGLISH_DUB_BONUS;
    } else if candidate.is_dubbed {
        total += scoring::DUBBED_BONUS;
    }

    let is_raw = tokens.iter().any(|t| RAW_TOKENS.contains(t))
        || RAW_PHRASES.iter().any(|p| normalized.contains(p));
    if is_raw {
        total += scoring::RAW_PENALTY;
    }

    let trusted = candidate.release_group.as_deref().is_some_and(|group| {
        let group = group.to_lowercase();
        ctx.trusted_groups
            .iter()
            .any(|t| group.contains(&t.to_lowercase()))
    });
    if trusted {
        total += scoring::TRUSTED_GROUP_BONUS;
    }

    if ctx.dubbed_only {
        total += if dubbed {
            scoring::DUBBED_ONLY_BONUS
        } else {
            scoring::DUBBED_ONLY_PENALTY
        };
    }

    total
}

/// Dual audio, an English dub marker in the title, or a dubbed flag.
#[must_use]
pub fn has_english_audio(candidate: &Candidate) -> bool {
    let lower = candidate.title.to_lowercase();
    candidate.is_dual_audio
        || candidate.is_dubbed
        || ENGLISH_DUB_MARKERS.iter().any(|m| lower.contains(m))
}

fn language_penalty(title: &str) -> i64 {
    let normalized = normalize_for_matching(title);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    let foreign = tokens.iter().any(|t| FOREIGN_MARKERS.contains(t));
    let english = tokens.iter().any(|t| ENGLISH_MARKERS.contains(t));
    if foreign && !english {
        scoring::FOREIGN_PENALTY
    } else {
        0
    }
}

fn size_score(size_bytes: Option<u64>) -> i64 {
    const GIB: u64 = 1024 * 1024 * 1024;

    match size_bytes {
        None | Some(0) => 0,
        Some(bytes) if bytes < GIB => 10,
        Some(bytes) if bytes <= 30 * GIB => 50,
        Some(_) => 30,
    }
}

fn seeder_score(seeders: Option<u32>, available: bool) -> i64 {
    match seeders {
        Some(n) if n >= 100 => 200,
        Some(n) if n >= 50 => 150,
        Some(n) if n >= 20 => 100,
        Some(n) if n >= 5 => 50,
        _ if available => 0,
        Some(0) => -1000,
        Some(_) | None => -500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(hash: &str, title: &str) -> Candidate {
        Candidate {
            info_hash: Some(hash.to_string()),
            title: title.to_string(),
            source: "test".to_string(),
            seeders: Some(50),
            ..Default::default()
        }
    }

    fn ctx<'a>(cache: &'a CacheAvailability, groups: &'a [String]) -> RankingContext<'a> {
        RankingContext {
            is_anime: false,
            dubbed_only: false,
            cache,
            trusted_groups: groups,
        }
    }

    #[test]
    fn test_cached_beats_uncached_high_quality() {
        let mut cache = CacheAvailability::new();
        cache.insert("a".to_string(), vec!["torbox".to_string()]);
        let list = vec![
            Candidate {
                resolution: Some("720p".to_string()),
                ..candidate("a", "Movie 720p")
            },
            Candidate {
                resolution: Some("2160p".to_string()),
                seeders: Some(0),
                ..candidate("b", "Movie 2160p BluRay REMUX x265 Atmos")
            },
        ];

        let best = select(&list, &ctx(&cache, &[])).unwrap();
        assert_eq!(best.info_hash.as_deref(), Some("a"));
    }

    #[test]
    fn test_cache_dominates_even_with_penalties() {
        let mut cache = CacheAvailability::new();
        cache.insert("a".to_string(), vec!["real_debrid".to_string()]);
        let groups: Vec<String> = vec![];
        let context = ctx(&cache, &groups);

        let worst_cached = Candidate {
            seeders: Some(0),
            size_bytes: Some(100),
            ..candidate("A", "Film ITA raw")
        };
        let best_uncached = Candidate {
            seeders: Some(500),
            size_bytes: Some(8 * 1024 * 1024 * 1024),
            ..candidate("b", "Film 2160p REMUX x265 Atmos")
        };
        assert!(score(&worst_cached, &context) > score(&best_uncached, &context));
    }

    #[test]
    fn test_preferred_provider_tie_break() {
        let mut cache = CacheAvailability::new();
        cache.insert("a".to_string(), vec!["torbox".to_string()]);
        cache.insert("b".to_string(), vec!["real_debrid".to_string()]);
        let list = vec![candidate("a", "Movie"), candidate("b", "Movie")];

        let best = select(&list, &ctx(&cache, &[])).unwrap();
        assert_eq!(best.info_hash.as_deref(), Some("b"));
    }

    #[test]
    fn test_usenet_counts_as_available() {
        let cache = CacheAvailability::new();
        let usenet = Candidate {
            download_url: Some("https://nzb/1".to_string()),
            title: "Movie 720p".to_string(),
            ..Default::default()
        };
        let context = ctx(&cache, &[]);
        assert_eq!(breakdown(&usenet, &context).cache, scoring::CACHE_BONUS);
        assert_eq!(breakdown(&usenet, &context).seeders, 0);
    }

    #[test]
    fn test_anime_dual_audio_beats_higher_resolution() {
        let cache = CacheAvailability::new();
        let groups: Vec<String> = vec![];
        let context = RankingContext {
            is_anime: true,
            ..ctx(&cache, &groups)
        };
        let list = vec![
            Candidate {
                is_dual_audio: true,
                resolution: Some("720p".to_string()),
                ..candidate("a", "Show 720p Dual Audio")
            },
            Candidate {
                resolution: Some("2160p".to_string()),
                ..candidate("b", "Show 2160p")
            },
        ];

        let best = select(&list, &context).unwrap();
        assert_eq!(best.info_hash.as_deref(), Some("a"));
    }

    #[test]
    fn test_anime_language_ordering() {
        let cache = CacheAvailability::new();
        let groups: Vec<String> = vec![];
        let context = RankingContext {
            is_anime: true,
            ..ctx(&cache, &groups)
        };
        let dual = Candidate {
            is_dual_audio: true,
            ..candidate("a", "Show 1080p")
        };
        let english = candidate("b", "Show 1080p English Dub");
        let dubbed = Candidate {
            is_dubbed: true,
            ..candidate("c", "Show 1080p")
        };
        let plain = candidate("d", "Show 1080p");

        assert!(score(&dual, &context) > score(&english, &context));
        assert!(score(&english, &context) > score(&dubbed, &context));
        assert!(score(&dubbed, &context) > score(&plain, &context));
    }

    #[test]
    fn test_dubbed_only_overrides_cache_and_resolution() {
        let mut cache = CacheAvailability::new();
        cache.insert("b".to_string(), vec!["real_debrid".to_string()]);
        let groups: Vec<String> = vec!["SubsPlease".to_string()];
        let context = RankingContext {
            is_anime: true,
            dubbed_only: true,
            cache: &cache,
            trusted_groups: &groups,
        };
        let list = vec![
            Candidate {
                is_dubbed: true,
                seeders: Some(0),
                ..candidate("a", "Show 480p")
            },
            Candidate {
                resolution: Some("2160p".to_string()),
                release_group: Some("SubsPlease".to_string()),
                seeders: Some(1000),
                ..candidate("b", "Show 2160p BluRay REMUX x265 Atmos")
            },
        ];

        let best = select(&list, &context).unwrap();
        assert_eq!(best.info_hash.as_deref(), Some("a"));
    }

    #[test]
    fn test_english_audio_detection() {
        assert!(has_english_audio(&candidate("a", "[Group] Show - 01 English Dub")));
        assert!(has_english_audio(&Candidate {
            is_dual_audio: true,
            ..candidate("b", "Show - 01")
        }));
        assert!(!has_english_audio(&candidate("c", "[SubsPlease] Show - 01 (1080p)")));
    }

    #[test]
    fn test_raw_penalty_and_trusted_group() {
        let cache = CacheAvailability::new();
        let groups = vec!["Erai-raws".to_string()];
        let context = RankingContext {
            is_anime: true,
            ..ctx(&cache, &groups)
        };
        let raw = candidate("a", "Show - 01 [RAW]");
        let trusted = Candidate {
            release_group: Some("Erai-raws".to_string()),
            ..candidate("b", "[Erai-raws] Show - 01")
        };
        assert_eq!(breakdown(&raw, &context).anime, scoring::RAW_PENALTY);
        assert_eq!(
            breakdown(&trusted, &context).anime,
            scoring::TRUSTED_GROUP_BONUS
        );
    }

    #[test]
    fn test_foreign_penalty() {
        let cache = CacheAvailability::new();
        let context = ctx(&cache, &[]);
        let italian = candidate("a", "Movie 1080p ITA");
        let multi = candidate("b", "Movie 1080p ITA ENG");
        assert_eq!(breakdown(&italian, &context).language, scoring::FOREIGN_PENALTY);
        assert_eq!(breakdown(&multi, &context).language, 0);
    }

    #[test]
    fn test_seeder_bands() {
        assert_eq!(seeder_score(Some(150), false), 200);
        assert_eq!(seeder_score(Some(3), false), -500);
        assert_eq!(seeder_score(Some(0), false), -1000);
        assert_eq!(seeder_score(None, false), -500);
        assert_eq!(seeder_score(Some(0), true), 0);
        assert_eq!(seeder_score(None, true), 0);
    }

    #[test]
    fn test_size_bands() {
        const GIB: u64 = 1024 * 1024 * 1024;
        assert_eq!(size_score(Some(GIB / 2)), 10);
        assert_eq!(size_score(Some(4 * GIB)), 50);
        assert_eq!(size_score(Some(60 * GIB)), 30);
        assert_eq!(size_score(None), 0);
    }

    #[test]
    fn test_select_is_deterministic_and_stable() {
        let cache = CacheAvailability::new();
        let context = ctx(&cache, &[]);
        let list = vec![candidate("first", "Movie"), candidate("second", "Movie")];

        for _ in 0..5 {
            let best = select(&list, &context).unwrap();
            assert_eq!(best.info_hash.as_deref(), Some("first"));
        }
        assert!(select(&[], &context).is_none());
    }
}
