//! Fixed lookup tables for release attributes. The first matching row wins.

use regex::Regex;
use std::sync::OnceLock;

pub struct Tier {
    pattern: Regex,
    pub points: i64,
}

fn build(rows: &[(&str, i64)]) -> Vec<Tier> {
    rows.iter()
        .map(|(pattern, points)| Tier {
            pattern: Regex::new(&format!("(?i){pattern}")).expect("Invalid tier pattern"),
            points: *points,
        })
        .collect()
}

pub fn resolution() -> &'static [Tier] {
    static TABLE: OnceLock<Vec<Tier>> = OnceLock::new();
    TABLE.get_or_init(|| {
        build(&[
            (r"\b(?:2160p|4k|uhd)\b", 400),
            (r"\b1080p\b", 300),
            (r"\b720p\b", 200),
            (r"\b480p\b", 100),
        ])
    })
}

pub fn source() -> &'static [Tier] {
    static TABLE: OnceLock<Vec<Tier>> = OnceLock::new();
    TABLE.get_or_init(|| {
        build(&[
            (r"\bremux\b", 500),
            (r"\bblu-?ray\b", 400),
            (r"\b(?:bdrip|brrip)\b", 350),
            (r"\bweb-?dl\b", 300),
            (r"\bweb-?rip\b", 250),
            (r"\bhdtv\b", 200),
            (r"\bhdrip\b", 150),
            (r"\bdvdrip\b", 100),
            (r"\b(?:tc|telecine)\b", 30),
            (r"\b(?:ts|telesync|hdts)\b", 20),
            (r"\b(?:cam|camrip|hdcam)\b", 10),
        ])
    })
}

pub fn codec() -> &'static [Tier] {
    static TABLE: OnceLock<Vec<Tier>> = OnceLock::new();
    TABLE.get_or_init(|| {
        build(&[
            (r"\b(?:x265|hevc|h\.?265)\b", 100),
            (r"\bav1\b", 90),
            (r"\b(?:x264|avc|h\.?264)\b", 50),
            (r"\bvp9\b", 40),
        ])
    })
}

pub fn audio() -> &'static [Tier] {
    static TABLE: OnceLock<Vec<Tier>> = OnceLock::new();
    TABLE.get_or_init(|| {
        build(&[
            (r"\batmos\b", 100),
            (r"\bdts-?hd[\s.-]?ma\b", 90),
            (r"\btrue-?hd\b", 85),
            (r"\bdts-?hd\b", 80),
            (r"\bdts\b", 70),
            (r"\bdd\+|\bddp|\be-?ac-?3\b", 60),
            (r"\bac-?3\b|\bdd(?:\d|\b)", 50),
            (r"\baac", 40),
            (r"\bmp3\b", 20),
        ])
    })
}

/// Points for the first row matching any of `texts`, checked in order.
pub fn lookup(table: &[Tier], texts: &[Option<&str>]) -> i64 {
    for text in texts.iter().flatten() {
        if let Some(tier) = table.iter().find(|tier| tier.pattern.is_match(text)) {
            return tier.points;
        }
    }
    0
}
