//! Quality and language tags read from a release title.

use std::sync::OnceLock;

use regex::Regex;

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseTags {
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub codec: Option<String>,
    /// First bracketed token, e.g. `SubsPlease` in `[SubsPlease] Show - 01`.
    pub release_group: Option<String>,
    pub is_dual_audio: bool,
    pub is_dubbed: bool,
}

#[must_use]
pub fn release_tags(title: &str) -> ReleaseTags {
    static RESOLUTION: OnceLock<Regex> = OnceLock::new();
    static QUALITY: OnceLock<Regex> = OnceLock::new();
    static CODEC: OnceLock<Regex> = OnceLock::new();
    static GROUP: OnceLock<Regex> = OnceLock::new();

    let first = |re: &Regex| {
        re.captures(title)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    ReleaseTags {
        resolution: first(get_regex(&RESOLUTION, r"(?i)(2160p|1080p|720p|480p|4K|UHD)")),
        quality: first(get_regex(
            &QUALITY,
            r"(?i)(BluRay|BDRip|BRRip|WEB-DL|WEBRip|HDTV|HDRip|DVDRip|REMUX)",
        )),
        codec: first(get_regex(&CODEC, r"(?i)(x265|x264|HEVC|H\.?265|H\.?264|AV1|VP9)")),
        release_group: first(get_regex(&GROUP, r"\[([^\]]+)\]")),
        is_dual_audio: is_dual_audio(title),
        is_dubbed: is_dubbed(title),
    }
}

#[must_use]
pub fn is_dual_audio(title: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(
        &RE,
        r"(?i)(dual[\s\-_]?audio|multi[\s\-_]?audio|japanese\s*\+\s*english|eng?\s*\+\s*jap|jpn?\s*\+\s*eng|multi[\s\-_]?lang|\b(eng|jpn|ita)\s+(eng|jpn|ita)\b)",
    )
    .is_match(title)
}

#[must_use]
pub fn is_dubbed(title: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(
        &RE,
        r"(?i)(\beng(lish)?\s*(dub|audio)|\bdub(bed)?\b|english\s+dub|\bEMBER\b|\beng\s+audio|funimation)",
    )
    .is_match(title)
}
