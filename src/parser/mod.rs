pub mod filename;
pub mod size;
pub mod tags;

pub use filename::{clean_title, normalize_for_matching, parse_release};
pub use tags::{ReleaseTags, release_tags};
