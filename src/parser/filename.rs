use crate::constants::VIDEO_EXTENSIONS;
use crate::models::release::Release;
use regex::Regex;
use std::sync::OnceLock;

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

/// Parses a release, folder, or file name.
///
/// Returns `None` when no usable title can be recovered, in which case
/// callers fall back to plain normalization of the raw name.
#[must_use]
pub fn parse_release(name: &str) -> Option<Release> {
    let stem = strip_video_extension(name.trim());
    let (group, body) = split_leading_group(stem);

    let marker = first_marker(body);
    let raw_title = marker.map_or(body, |idx| &body[..idx]);
    let title = clean_title(raw_title);
    if title.is_empty() {
        return None;
    }

    let (season, episodes) = extract_season_episodes(body);

    Some(Release {
        original_name: name.to_string(),
        title,
        year: extract_year(body),
        season,
        episodes,
        resolution: extract_resolution(body),
        source: extract_source(body),
        group: group.or_else(|| extract_trailing_group(body)),
    })
}

#[must_use]
pub fn strip_video_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => name,
    }
}

fn split_leading_group(name: &str) -> (Option<String>, &str) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"^\s*\[([^\]]+)\]\s*");

    re.captures(name).map_or((None, name), |caps| {
        let whole = caps.get(0).map_or(0, |m| m.end());
        let group = caps.get(1).map(|m| m.as_str().trim().to_string());
        (group, &name[whole..])
    })
}

/// Byte offset of the first token that ends the title portion of a name.
fn first_marker(body: &str) -> Option<usize> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"(?i)\bS\d{1,2}(?:E\d{1,4})?\b",
            r"(?i)\bS\d{1,2}E\d{1,4}",
            r"(?i)\b\d{1,2}x\d{2,4}\b",
            r"(?i)\bSeason[\s._-]*\d{1,2}\b",
            r"(?i)\b(?:2160p|1080p|720p|576p|480p|4K|UHD)\b",
            r"(?i)\b(?:complete|batch)\b",
            r"(?i)\b(?:BluRay|Blu-Ray|WEB-?DL|WEBRip|HDTV|REMUX|BDRip|DVDRip)\b",
            r"\s-\s\d{1,4}\b",
            r"[\[(]",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid Regex"))
        .collect()
    });

    let mut earliest = patterns
        .iter()
        .filter_map(|re| re.find(body).map(|m| m.start()))
        .min();

    // A year ends the title unless it is the whole title, e.g. "2012".
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let year = get_regex(&YEAR, r"[\s._(\[]((?:19|20)\d{2})(?:[\s._)\]]|$)");
    if let Some(m) = year.find(body) {
        earliest = Some(earliest.map_or(m.start(), |e| e.min(m.start())));
    }

    earliest
}

fn extract_year(body: &str) -> Option<i32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"[\s._(\[]((?:19|20)\d{2})(?:[\s._)\]]|$)");

    re.captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_season_episodes(body: &str) -> (Option<i32>, Vec<i32>) {
    static SXXEXX: OnceLock<Regex> = OnceLock::new();
    static EPISODE: OnceLock<Regex> = OnceLock::new();
    static CROSS: OnceLock<Regex> = OnceLock::new();
    static SEASON_WORD: OnceLock<Regex> = OnceLock::new();
    static BARE_SEASON: OnceLock<Regex> = OnceLock::new();

    let sxxexx = get_regex(&SXXEXX, r"(?i)\bS(\d{1,2})((?:[\s._-]?E\d{1,4})+)");
    if let Some(caps) = sxxexx.captures(body) {
        let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let episode_re = get_regex(&EPISODE, r"(?i)E(\d{1,4})");
        let episodes = caps.get(2).map_or_else(Vec::new, |m| {
            episode_re
                .captures_iter(m.as_str())
                .filter_map(|c| c.get(1).and_then(|e| e.as_str().parse().ok()))
                .collect()
        });
        return (season, episodes);
    }

    let cross = get_regex(&CROSS, r"(?i)\b(\d{1,2})x(\d{2,4})\b");
    if let Some(caps) = cross.captures(body) {
        let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        return (season, episode.into_iter().collect());
    }

    let season_word = get_regex(&SEASON_WORD, r"(?i)\bSeason[\s._-]*(\d{1,2})\b");
    if let Some(caps) = season_word.captures(body) {
        return (caps.get(1).and_then(|m| m.as_str().parse().ok()), vec![]);
    }

    let bare = get_regex(&BARE_SEASON, r"(?i)\bS(\d{1,2})\b");
    if let Some(caps) = bare.captures(body) {
        return (caps.get(1).and_then(|m| m.as_str().parse().ok()), vec![]);
    }

    (None, vec![])
}

fn extract_resolution(s: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"(?i)\b(4K|UHD|2160p|1080p|720p|576p|480p)\b");

    re.find(s).map(|m| {
        let res = m.as_str();
        if res.eq_ignore_ascii_case("4K") || res.eq_ignore_ascii_case("UHD") {
            "2160p".to_string()
        } else {
            res.to_lowercase()
        }
    })
}

fn extract_source(s: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(
        &RE,
        r"(?i)\b(REMUX|Blu-?Ray|BDRip|BRRip|WEB-?DL|WEBRip|HDTV|HDRip|DVDRip)\b",
    );

    re.find(s).map(|m| m.as_str().to_string())
}

fn extract_trailing_group(s: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = get_regex(&RE, r"-([A-Za-z0-9]+)\s*$");

    re.captures(s.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|g| extract_resolution(g).is_none() && g.parse::<u32>().is_err())
}

/// Turns separators into spaces and trims dangling punctuation.
#[must_use]
pub fn clean_title(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut last_was_space = true;
    for c in title.chars() {
        let is_sep = c.is_whitespace() || c == '_' || c == '.';
        if is_sep {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            result.push(c);
            last_was_space = false;
        }
    }

    result
        .trim()
        .trim_end_matches(['-', '(', '[', ':', ' '])
        .trim()
        .to_string()
}

/// Lowercase, punctuation-free, single-spaced form used for every comparison.
#[must_use]
pub fn normalize_for_matching(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
