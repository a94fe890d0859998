use crate::config::Config;
use crate::db::Store;
use crate::domain::MediaKind;
use crate::models::NewMediaItem;

pub async fn cmd_add(
    config: &Config,
    title: &str,
    year: Option<i32>,
    show: bool,
    imdb: Option<String>,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    if let Some(existing) = store.find_item_by_external(imdb.as_deref(), None).await? {
        println!(
            "Already tracked: {} (ID: {}, {})",
            existing.title, existing.id, existing.state
        );
        return Ok(());
    }

    let kind = if show { MediaKind::Show } else { MediaKind::Movie };
    let item = store
        .add_item(&NewMediaItem {
            title: title.to_string(),
            year,
            kind: Some(kind),
            imdb_id: imdb,
            ..Default::default()
        })
        .await?;

    println!("✓ Requested: {} (ID: {}, {})", item.title, item.id, item.kind);
    println!();
    println!("Run 'reelarr check' to start acquiring it.");
    Ok(())
}
