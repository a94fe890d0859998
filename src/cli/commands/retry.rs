use crate::config::Config;
use crate::db::Store;
use crate::domain::ItemId;
use crate::pipeline::Pipeline;

pub async fn cmd_retry(config: &Config, id: Option<i32>, symlink: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let pipeline = Pipeline::from_config(config, store)?;

    let Some(id) = id else {
        let (items, episodes) = pipeline.retry_all_failed().await?;
        println!("✓ Reset {items} items and {episodes} episodes for retry");
        return Ok(());
    };

    let id = ItemId::new(id);
    if pipeline.retry_item(id, symlink).await? {
        let from = if symlink { "the link step" } else { "the start" };
        println!("✓ Item {id} will be retried from {from}");
    } else {
        println!("Item with ID {id} not found.");
    }
    Ok(())
}
