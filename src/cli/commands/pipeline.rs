use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Store;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;

async fn build_pipeline(config: &Config) -> anyhow::Result<Arc<Pipeline>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;
    let pipeline = Pipeline::from_config(config, store)?;
    if let Err(e) = pipeline.links().ensure_directories().await {
        error!(error = %e, "Failed to create library folders");
    }
    Ok(Arc::new(pipeline))
}

pub async fn cmd_daemon(config: Config) -> anyhow::Result<()> {
    info!(
        "Reelarr v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let pipeline = build_pipeline(&config).await?;
    let scheduler = Arc::new(Scheduler::new(pipeline, config.scheduler.clone()));

    let scheduler_handle = {
        let sched = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = sched.start().await {
                error!("Scheduler error: {}", e);
            }
        })
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler.stop().await;
    scheduler_handle.abort();
    info!("Daemon stopped");

    Ok(())
}

pub async fn cmd_check(config: Config) -> anyhow::Result<()> {
    info!("Running single check...");

    let pipeline = build_pipeline(&config).await?;
    Scheduler::new(pipeline, config.scheduler.clone())
        .run_once()
        .await;

    info!("Check complete");
    Ok(())
}

pub async fn cmd_sweep(config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config).await?;
    let report = pipeline.sweep().await?;
    println!(
        "✓ Sweep checked {} episodes, linked {}",
        report.checked, report.linked
    );
    Ok(())
}

pub async fn cmd_sync(config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config).await?;
    let added = pipeline.sync_watchlist().await?;
    println!("✓ Imported {added} items from the watchlist");
    Ok(())
}
