//! Pure name matching used by the file resolver. No filesystem access here.

use crate::parser::filename::{parse_release, strip_video_extension};
use crate::parser::normalize_for_matching;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

/// Minimum share of significant words two titles must have in common.
pub const TITLE_WORD_THRESHOLD: f64 = 0.6;

/// Minimum word overlap when fuzzy-matching a known release name.
pub const RELEASE_OVERLAP_THRESHOLD: f64 = 0.5;

/// The episode a lookup is trying to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeTarget {
    pub season: i32,
    pub episode: i32,
    pub absolute: Option<i32>,
}

/// A season and the episodes a strict marker in a name claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeMarker {
    pub season: i32,
    pub episodes: Vec<i32>,
}

/// Title a name refers to, via the release parser or plain normalization.
#[must_use]
pub fn extract_title(name: &str) -> String {
    parse_release(name).map_or_else(
        || normalize_for_matching(strip_video_extension(name)),
        |release| normalize_for_matching(&release.title),
    )
}

fn significant_words(normalized: &str) -> HashSet<&str> {
    normalized
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect()
}

/// Whether two already-normalized titles refer to the same thing.
#[must_use]
pub fn normalized_titles_match(extracted: &str, target: &str) -> bool {
    if extracted.is_empty() || target.is_empty() {
        return false;
    }
    if extracted == target || contains_words(extracted, target) || contains_words(target, extracted)
    {
        return true;
    }

    let target_words = significant_words(target);
    if target_words.is_empty() {
        return false;
    }
    let extracted_words = significant_words(extracted);
    let shared = target_words.intersection(&extracted_words).count();

    #[allow(clippy::cast_precision_loss)]
    let ratio = shared as f64 / target_words.len() as f64;
    ratio >= TITLE_WORD_THRESHOLD
}

/// Word-aligned containment, so "cars" is not found inside "oscars".
fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Whether a folder or file name refers to any of the target titles.
#[must_use]
pub fn titles_match(name: &str, targets: &[String]) -> bool {
    let extracted = extract_title(name);
    targets
        .iter()
        .map(|t| normalize_for_matching(t))
        .any(|target| normalized_titles_match(&extracted, &target))
}

/// Share of words two names have in common, relative to the longer one.
#[must_use]
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let a_norm = normalize_for_matching(strip_video_extension(a));
    let b_norm = normalize_for_matching(strip_video_extension(b));
    let a_words: HashSet<&str> = a_norm.split_whitespace().collect();
    let b_words: HashSet<&str> = b_norm.split_whitespace().collect();

    let longest = a_words.len().max(b_words.len());
    if longest == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = a_words.intersection(&b_words).count() as f64 / longest as f64;
    ratio
}

fn parse_num(m: Option<regex::Match<'_>>) -> Option<i32> {
    m.and_then(|m| m.as_str().parse().ok())
}

/// Every strict season/episode marker in a name.
///
/// Recognizes `S01E01` (including chains such as `S03E01E02`), `1x01`,
/// `Season 1 Episode 1` and `S1 - 04`. Numbers are compared whole, so
/// `S03E12` never yields episode 1 and `S13E01` never yields season 3.
#[must_use]
pub fn strict_markers(name: &str) -> Vec<EpisodeMarker> {
    static SXXEXX: OnceLock<Regex> = OnceLock::new();
    static CHAIN: OnceLock<Regex> = OnceLock::new();
    static CROSS: OnceLock<Regex> = OnceLock::new();
    static WORDS: OnceLock<Regex> = OnceLock::new();
    static DASHED: OnceLock<Regex> = OnceLock::new();

    let mut markers = Vec::new();

    let sxxexx = get_regex(
        &SXXEXX,
        r"(?i)(?:^|[^a-z0-9])s(\d{1,2})((?:[\s._-]?e\d{1,4})+)(?:[^0-9]|$)",
    );
    let chain = get_regex(&CHAIN, r"(?i)e(\d{1,4})");
    for caps in sxxexx.captures_iter(name) {
        if let Some(season) = parse_num(caps.get(1)) {
            let episodes = caps.get(2).map_or_else(Vec::new, |m| {
                chain
                    .captures_iter(m.as_str())
                    .filter_map(|c| parse_num(c.get(1)))
                    .collect()
            });
            markers.push(EpisodeMarker { season, episodes });
        }
    }

    let cross = get_regex(
        &CROSS,
        r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{1,4})(?:[^0-9a-z]|$)",
    );
    for caps in cross.captures_iter(name) {
        if let (Some(season), Some(episode)) = (parse_num(caps.get(1)), parse_num(caps.get(2))) {
            markers.push(EpisodeMarker {
                season,
                episodes: vec![episode],
            });
        }
    }

    let words = get_regex(
        &WORDS,
        r"(?i)season[\s._-]*(\d{1,2})[\s._-]*episode[\s._-]*(\d{1,4})(?:[^0-9]|$)",
    );
    for caps in words.captures_iter(name) {
        if let (Some(season), Some(episode)) = (parse_num(caps.get(1)), parse_num(caps.get(2))) {
            markers.push(EpisodeMarker {
                season,
                episodes: vec![episode],
            });
        }
    }

    let dashed = get_regex(
        &DASHED,
        r"(?i)(?:^|[^a-z0-9])s(\d{1,2})[\s._]*-[\s._]*(\d{1,4})(?:[^0-9]|$)",
    );
    for caps in dashed.captures_iter(name) {
        if let (Some(season), Some(episode)) = (parse_num(caps.get(1)), parse_num(caps.get(2))) {
            markers.push(EpisodeMarker {
                season,
                episodes: vec![episode],
            });
        }
    }

    markers
}

/// Episode numbers found by the looser anime-style patterns:
/// `Episode 018`, `[018]` and a leading `- 18`.
#[must_use]
pub fn loose_episode_numbers(name: &str) -> Vec<i32> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)\bep(?:isode)?[\s._-]*(\d{1,4})(?:v\d)?\b").expect("Invalid Regex"),
            Regex::new(r"\[(\d{2,4})(?:v\d)?\]").expect("Invalid Regex"),
            Regex::new(r"(?:^|\s)-\s*(\d{1,4})(?:v\d)?(?:[\s._\[(]|$)").expect("Invalid Regex"),
        ]
    });

    let stem = strip_video_extension(name);
    let mut numbers = Vec::new();
    for pattern in patterns {
        for caps in pattern.captures_iter(stem) {
            if let Some(n) = parse_num(caps.get(1))
                && !is_noise_number(n)
                && !numbers.contains(&n)
            {
                numbers.push(n);
            }
        }
    }
    numbers
}

fn is_noise_number(n: i32) -> bool {
    (1900..=2099).contains(&n) || [480, 576, 720, 1080, 2160].contains(&n)
}

/// Season a name declares without an episode, e.g. `Season 2`, `S02`, `2nd Season`.
#[must_use]
pub fn season_signal(name: &str) -> Option<i32> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)(?:^|[^a-z0-9])s(\d{1,2})(?:e\d|[^0-9]|$)").expect("Invalid Regex"),
            Regex::new(r"(?i)\bseason[\s._-]*(\d{1,2})\b").expect("Invalid Regex"),
            Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)[\s._-]+season\b").expect("Invalid Regex"),
        ]
    });

    patterns
        .iter()
        .find_map(|re| re.captures(name).and_then(|caps| parse_num(caps.get(1))))
}

/// A name that looks like a whole-season release rather than one episode.
#[must_use]
pub fn is_season_pack(name: &str) -> bool {
    let normalized = normalize_for_matching(name);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words
        .iter()
        .any(|w| matches!(*w, "season" | "complete" | "batch"))
    {
        return true;
    }

    season_signal(name).is_some() && strict_markers(name).iter().all(|m| m.episodes.is_empty())
}

/// The single-episode claim embedded in a folder or release name, if any.
#[must_use]
pub fn embedded_episode(name: &str) -> Option<EpisodeMarker> {
    strict_markers(name)
        .into_iter()
        .find(|m| !m.episodes.is_empty())
}

/// Whether a folder's own episode number rules it out for `target`.
#[must_use]
pub fn conflicts_with(name: &str, target: &EpisodeTarget) -> bool {
    if is_season_pack(name) {
        return false;
    }
    embedded_episode(name).is_some_and(|m| {
        m.season != target.season || !m.episodes.contains(&target.episode)
    })
}

/// Whether a folder's embedded episode disagrees with the one in a known release name.
#[must_use]
pub fn release_conflicts(folder_name: &str, release_name: &str) -> bool {
    if is_season_pack(folder_name) {
        return false;
    }
    match (embedded_episode(folder_name), embedded_episode(release_name)) {
        (Some(folder), Some(release)) => {
            folder.season != release.season
                || !release.episodes.iter().any(|e| folder.episodes.contains(e))
        }
        _ => false,
    }
}

/// Whether `name` contains the standalone word "movie".
#[must_use]
pub fn mentions_movie(name: &str) -> bool {
    normalize_for_matching(name)
        .split_whitespace()
        .any(|w| w == "movie")
}

/// Decides whether a file is the requested episode.
///
/// Strict markers decide alone when present. Otherwise an absolute number
/// is tried, and the loose anime patterns are only trusted once the season
/// is confirmed by the file or its folder, or for season 1 when neither
/// names a season.
#[must_use]
pub fn episode_matches(file_name: &str, folder_name: Option<&str>, target: &EpisodeTarget) -> bool {
    if mentions_movie(file_name) {
        return false;
    }

    let markers = strict_markers(file_name);
    if !markers.is_empty() {
        return markers
            .iter()
            .any(|m| m.season == target.season && m.episodes.contains(&target.episode));
    }

    let loose = loose_episode_numbers(file_name);
    if let Some(absolute) = target.absolute
        && loose.contains(&absolute)
    {
        return true;
    }

    if !loose.contains(&target.episode) {
        return false;
    }

    let season = season_signal(file_name).or_else(|| folder_name.and_then(season_signal));
    match season {
        Some(season) => season == target.season,
        None => target.season == 1,
    }
}

/// Whether a file carries its own title that points at a different show.
///
/// Names with no title part (`S01E01.mkv`, `Episode 05.mkv`) defer to their folder.
#[must_use]
pub fn file_title_conflicts(file_name: &str, targets: &[String]) -> bool {
    let Some(release) = parse_release(file_name) else {
        return false;
    };
    let extracted = normalize_for_matching(&release.title);
    if extracted.is_empty() || is_generic_title(&extracted) {
        return false;
    }
    !targets
        .iter()
        .map(|t| normalize_for_matching(t))
        .any(|target| normalized_titles_match(&extracted, &target))
}

fn is_generic_title(normalized: &str) -> bool {
    normalized
        .split_whitespace()
        .all(|w| w.chars().all(|c| c.is_ascii_digit()) || matches!(w, "episode" | "ep" | "e"))
}

/// Score of a folder as the home of a movie. Non-positive means no match.
#[must_use]
pub fn movie_folder_score(folder_name: &str, titles: &[String], year: Option<i32>) -> i64 {
    const KEYWORD_HIT: i64 = 10;
    const EXACT_TITLE: i64 = 50;
    const YEAR_MATCH: i64 = 100;
    const YEAR_CONFLICT: i64 = -150;

    if !titles_match(folder_name, titles) {
        return 0;
    }

    let parsed = parse_release(folder_name);
    let extracted = extract_title(folder_name);
    let folder_norm = normalize_for_matching(folder_name);
    let folder_words: HashSet<&str> = folder_norm.split_whitespace().collect();

    let mut best = 0;
    for title in titles {
        let target = normalize_for_matching(title);
        let hits = significant_words(&target)
            .iter()
            .filter(|w| folder_words.contains(*w))
            .count();

        #[allow(clippy::cast_possible_wrap)]
        let mut score = hits as i64 * KEYWORD_HIT;
        if extracted == target {
            score += EXACT_TITLE;
        }
        best = best.max(score);
    }

    // Short titles may have no significant words; a matched title still counts.
    best = best.max(1);

    let folder_year = parsed.and_then(|r| r.year);
    match (year, folder_year) {
        (Some(wanted), Some(found)) if wanted == found => best + YEAR_MATCH,
        (Some(_), Some(_)) => best + YEAR_CONFLICT,
        _ => best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_titles_match_variants() {
        let t = titles(&["Show Name"]);
        assert!(titles_match("Show.Name.S02E05.1080p", &t));
        assert!(titles_match("Show Name (2019)", &t));
        assert!(titles_match("The Show Name Returns", &t));
        assert!(!titles_match("Another Show", &t));
        assert!(!titles_match("Oscars.2020.1080p", &titles(&["Cars"])));
    }

    #[test]
    fn test_titles_match_alternative_titles() {
        let t = titles(&["Attack on Titan", "Shingeki no Kyojin"]);
        assert!(titles_match("[Group] Shingeki no Kyojin - 05 [1080p]", &t));
    }

    #[test]
    fn test_word_overlap_threshold() {
        let overlap = word_overlap(
            "Show.Name.S02E05.1080p.WEB-DL.x264-GROUP",
            "Show Name S02E05 1080p WEB-DL x264-GROUP[rartv]",
        );
        assert!(overlap > RELEASE_OVERLAP_THRESHOLD);
        assert!(word_overlap("Alpha Beta", "Gamma Delta") < RELEASE_OVERLAP_THRESHOLD);
    }

    #[test]
    fn test_double_episode_guard() {
        let name = "Show.Name.S03E01E02.1080p.mkv";
        assert!(episode_matches(name, None, &target(3, 1)));
        assert!(episode_matches(name, None, &target(3, 2)));
        assert!(!episode_matches(name, None, &target(3, 3)));
        assert!(!episode_matches(name, None, &target(1, 2)));
    }

    #[test]
    fn test_single_episode_not_mistaken_for_neighbour() {
        assert!(!episode_matches("Show.S03E01.mkv", None, &target(3, 2)));
        assert!(!episode_matches("Show.S03E12.mkv", None, &target(3, 1)));
        assert!(!episode_matches("Show.S13E01.mkv", None, &target(3, 1)));
    }

    #[test]
    fn test_strict_pattern_variants() {
        assert!(episode_matches("Show 2x07 HDTV.mkv", None, &target(2, 7)));
        assert!(episode_matches(
            "Show Season 1 Episode 4.mkv",
            None,
            &target(1, 4)
        ));
        assert!(episode_matches("Show S1 - 04 [1080p].mkv", None, &target(1, 4)));
        assert!(!episode_matches("Show 1920x1080.mkv", None, &target(20, 1080)));
    }

    #[test]
    fn test_loose_patterns_need_season_confirmation() {
        let file = "[Group] Show - 18 [1080p].mkv";
        assert!(episode_matches(file, None, &target(1, 18)));
        assert!(!episode_matches(file, None, &target(2, 18)));
        assert!(episode_matches(file, Some("Show Season 2"), &target(2, 18)));
        assert!(!episode_matches(file, Some("Show Season 3"), &target(2, 18)));
        assert!(episode_matches("Show Episode 018.mkv", None, &target(1, 18)));
        assert!(episode_matches("Show [018].mkv", None, &target(1, 18)));
    }

    #[test]
    fn test_absolute_number_match() {
        let t = EpisodeTarget {
            season: 3,
            episode: 5,
            absolute: Some(53),
        };
        assert!(episode_matches("[Group] Show - 053 [1080p].mkv", None, &t));
        assert!(!episode_matches("[Group] Show - 054 [1080p].mkv", None, &t));
    }

    #[test]
    fn test_movie_files_excluded() {
        assert!(!episode_matches("Show The Movie S01E01.mkv", None, &target(1, 1)));
    }

    #[test]
    fn test_season_pack_detection() {
        assert!(is_season_pack("Show.Name.S02.1080p.BluRay"));
        assert!(is_season_pack("Show Name Complete Series"));
        assert!(is_season_pack("[Group] Show Name (Batch)"));
        assert!(!is_season_pack("Show.Name.S02E05.1080p"));
    }

    #[test]
    fn test_conflicting_folder_episode() {
        assert!(!conflicts_with("Show.Name.S02E05.1080p", &target(2, 5)));
        assert!(conflicts_with("Show.Name.S02E05.1080p", &target(2, 6)));
        assert!(!conflicts_with("Show.Name.S02.1080p", &target(2, 6)));
        assert!(!conflicts_with("Show Name", &target(2, 6)));
    }

    #[test]
    fn test_release_conflicts() {
        let release = "Show.Name.S01E06.1080p.WEB-DL";
        assert!(release_conflicts("Show.Name.S01E04.1080p.WEB-DL", release));
        assert!(!release_conflicts("Show.Name.S01E06.720p", release));
        assert!(!release_conflicts("Show.Name.S01.COMPLETE.1080p", release));
    }

    #[test]
    fn test_file_title_conflicts() {
        let t = titles(&["Show Name"]);
        assert!(!file_title_conflicts("S01E01.mkv", &t));
        assert!(!file_title_conflicts("Show.Name.S01E01.mkv", &t));
        assert!(file_title_conflicts("Other.Series.S01E01.mkv", &t));
    }

    #[test]
    fn test_movie_folder_score_prefers_year() {
        let t = titles(&["The Matrix"]);
        let right = movie_folder_score("The.Matrix.1999.1080p", &t, Some(1999));
        let wrong = movie_folder_score("The.Matrix.2021.1080p", &t, Some(1999));
        let none = movie_folder_score("Inception.2010.1080p", &t, Some(1999));
        assert!(right > wrong);
        assert!(right > 0);
        assert_eq!(none, 0);
    }
}
