pub mod prelude;

pub mod episodes;
pub mod media_items;
