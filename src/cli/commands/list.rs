use crate::config::Config;
use crate::db::Store;
use crate::domain::MediaState;

pub async fn cmd_list(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let items = store.list_items().await?;

    if items.is_empty() {
        println!("Nothing tracked yet.");
        println!();
        println!("Add something with: reelarr add \"title\" --year 1999");
        return Ok(());
    }

    println!("Tracked Items ({} total)", items.len());
    println!("{:-<70}", "");

    for item in items {
        let indicator = match item.state {
            MediaState::Completed => "✓",
            MediaState::Delegated => "📺",
            MediaState::Failed => "✗",
            MediaState::Paused => "⏸",
            _ => "•",
        };
        let year = item.year.map_or_else(|| "?".to_string(), |y| y.to_string());

        println!("{indicator} {} ({year})", item.title);
        println!(
            "  ID: {} | Kind: {} | State: {}",
            item.id, item.kind, item.state
        );

        if let Some((status, stats)) = store.show_status(&item).await? {
            println!(
                "  Episodes: {}/{} linked, {} failed ({})",
                stats.completed,
                stats.total,
                stats.failed,
                status.as_str()
            );
        }
        if let Some(error) = &item.last_error {
            println!("  Last error: {error} (retries: {})", item.retry_count);
        }
    }

    println!();
    println!("Legend: ✓ Completed | 📺 Episodes tracked | ✗ Failed | ⏸ Paused");

    Ok(())
}
