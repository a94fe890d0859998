use crate::config::Config;
use crate::db::Store;
use crate::domain::ItemId;
use crate::pipeline::Pipeline;

pub async fn cmd_remove(config: &Config, id: i32, yes: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let id = ItemId::new(id);

    let Some(item) = store.get_item(id).await? else {
        println!("Item with ID {id} not found.");
        println!("Use 'reelarr list' to see item IDs.");
        return Ok(());
    };

    if !yes {
        println!("Remove '{}' (ID: {}) and its links?", item.title, item.id);
        println!("Enter 'y' to confirm, anything else to cancel:");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let pipeline = Pipeline::from_config(config, store)?;
    if pipeline.remove_item(id).await? {
        println!("✓ Removed: {}", item.title);
    } else {
        println!("Failed to remove item.");
    }
    Ok(())
}
