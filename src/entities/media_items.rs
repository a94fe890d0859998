use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "media_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub imdb_id: Option<String>,
    #[sea_orm(unique)]
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub title: String,
    pub original_title: Option<String>,
    /// JSON array of alternative titles.
    pub alternative_titles: Option<String>,
    pub year: Option<i32>,
    pub kind: String,
    pub state: String,
    pub is_anime: bool,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub overview: Option<String>,
    /// JSON array of genre names.
    pub genres: Option<String>,
    pub vote_average: Option<f64>,
    pub number_of_seasons: Option<i32>,
    pub number_of_episodes: Option<i32>,
    pub status: Option<String>,
    pub is_airing: bool,
    pub file_path: Option<String>,
    pub symlink_path: Option<String>,
    pub torrent_name: Option<String>,
    /// `<provider>:<id>` of the accepted remote-storage submission.
    pub download_id: Option<String>,
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::episodes::Entity")]
    Episodes,
}

impl Related<super::episodes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Episodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
