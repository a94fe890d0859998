use regex::Regex;
use std::sync::OnceLock;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;

/// Finds the first size mentioned anywhere in `text`, e.g. `1.5 GiB` or `700 MB`.
///
/// Indexers label binary sizes with decimal units, so both spellings use
/// powers of 1024.
#[must_use]
pub fn find_size(text: &str) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([KMGT])i?B\b").expect("Invalid regex"));

    let caps = re.captures(text)?;
    to_bytes(caps.get(1)?.as_str(), caps.get(2)?.as_str())
}

fn to_bytes(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    let bytes = match unit.to_ascii_uppercase().as_str() {
        "K" => value * KIB,
        "M" => value * MIB,
        "G" => value * GIB,
        "T" => value * TIB,
        _ => return None,
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(bytes as u64)
}

#[must_use]
pub fn format_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64;

    if value >= TIB {
        format!("{:.2} TiB", value / TIB)
    } else if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_size() {
        assert_eq!(
            find_size("👤 42 💾 2 GB ⚙️ ThePirateBay"),
            Some(2 * 1024 * 1024 * 1024)
        );
        assert_eq!(find_size("1.5 GiB"), Some(1_610_612_736));
        assert_eq!(find_size("no size here"), None);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KiB");
        assert_eq!(format_size(1_610_612_736), "1.50 GiB");
    }
}
