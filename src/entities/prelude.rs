pub use super::episodes::Entity as Episodes;
pub use super::media_items::Entity as MediaItems;
