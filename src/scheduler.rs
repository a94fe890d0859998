use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::pipeline::Pipeline;

/// The periodic jobs that drive the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    PendingItems,
    EpisodeScrape,
    EpisodeDownload,
    EpisodeLinks,
    Sweep,
    Watchlist,
}

impl Task {
    pub const ALL: [Self; 6] = [
        Self::PendingItems,
        Self::EpisodeScrape,
        Self::EpisodeDownload,
        Self::EpisodeLinks,
        Self::Sweep,
        Self::Watchlist,
    ];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PendingItems => "pending_items",
            Self::EpisodeScrape => "episode_scrape",
            Self::EpisodeDownload => "episode_download",
            Self::EpisodeLinks => "episode_links",
            Self::Sweep => "sweep",
            Self::Watchlist => "watchlist",
        }
    }

    #[must_use]
    pub const fn interval_seconds(&self, config: &SchedulerConfig) -> u64 {
        match self {
            Self::PendingItems => config.pending_items_seconds,
            Self::EpisodeScrape => config.episode_scrape_seconds,
            Self::EpisodeDownload => config.episode_download_seconds,
            Self::EpisodeLinks => config.episode_symlink_seconds,
            Self::Sweep => config.sweep_seconds,
            Self::Watchlist => config.watchlist_seconds,
        }
    }
}

/// Runs one job and logs its duration. Errors are logged, never returned.
pub async fn run_task(pipeline: &Pipeline, task: Task) {
    let start = Instant::now();
    info!(event = "job_started", job = task.name(), "Job started");

    let result = match task {
        Task::PendingItems => pipeline.process_due_items().await.map(|n| n as u64),
        Task::EpisodeScrape => pipeline
            .process_episode_scrapes()
            .await
            .map(|r| r.processed as u64),
        Task::EpisodeDownload => pipeline
            .process_episode_downloads()
            .await
            .map(|r| r.processed as u64),
        Task::EpisodeLinks => pipeline
            .process_episode_links()
            .await
            .map(|r| r.processed as u64),
        Task::Sweep => pipeline.sweep().await.map(|r| r.linked as u64),
        Task::Watchlist => pipeline.sync_watchlist().await.map(|n| n as u64),
    };

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    match result {
        Ok(count) => info!(
            event = "job_finished",
            job = task.name(),
            count,
            duration_ms,
            "Job finished"
        ),
        Err(e) => error!(
            event = "job_failed",
            job = task.name(),
            error = %e,
            duration_ms,
            "Job failed"
        ),
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        let cron = match &self.config.sweep_cron {
            Some(expr) => Some(self.start_sweep_cron(expr).await?),
            None => None,
        };

        let result = self.run_with_interval(cron.is_none()).await;

        if let Some(mut sched) = cron {
            sched.shutdown().await?;
        }
        result
    }

    async fn start_sweep_cron(&self, cron_expr: &str) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await?;

        let pipeline = Arc::clone(&self.pipeline);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let pipeline = Arc::clone(&pipeline);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_task(&pipeline, Task::Sweep).await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;
        info!("Sweep running with cron: {}", cron_expr);
        Ok(sched)
    }

    fn ticker(&self, task: Task) -> tokio::time::Interval {
        let mut ticker = interval(Duration::from_secs(task.interval_seconds(&self.config).max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn run_with_interval(&self, with_sweep: bool) -> Result<()> {
        let mut pending = self.ticker(Task::PendingItems);
        let mut scrape = self.ticker(Task::EpisodeScrape);
        let mut download = self.ticker(Task::EpisodeDownload);
        let mut links = self.ticker(Task::EpisodeLinks);
        let mut sweep = self.ticker(Task::Sweep);
        let mut watchlist = self.ticker(Task::Watchlist);

        info!(
            pending_items = self.config.pending_items_seconds,
            episode_scrape = self.config.episode_scrape_seconds,
            episode_download = self.config.episode_download_seconds,
            episode_links = self.config.episode_symlink_seconds,
            watchlist = self.config.watchlist_seconds,
            "Scheduler running"
        );

        loop {
            let task = tokio::select! {
                _ = pending.tick() => Task::PendingItems,
                _ = scrape.tick() => Task::EpisodeScrape,
                _ = download.tick() => Task::EpisodeDownload,
                _ = links.tick() => Task::EpisodeLinks,
                _ = sweep.tick(), if with_sweep => Task::Sweep,
                _ = watchlist.tick() => Task::Watchlist,
            };

            if !*self.running.read().await {
                break;
            }

            if task == Task::Sweep {
                // Sweeps walk the whole mount; the guard inside skips overlaps.
                let pipeline = Arc::clone(&self.pipeline);
                tokio::spawn(async move { run_task(&pipeline, Task::Sweep).await });
            } else {
                run_task(&self.pipeline, task).await;
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Runs every job once, in pipeline order.
    pub async fn run_once(&self) {
        info!("Running manual check...");
        for task in Task::ALL {
            run_task(&self.pipeline, task).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_intervals_follow_config() {
        let config = SchedulerConfig::default();
        assert_eq!(Task::PendingItems.interval_seconds(&config), 10);
        assert_eq!(Task::EpisodeLinks.interval_seconds(&config), 30);
        assert_eq!(Task::Watchlist.interval_seconds(&config), 300);
    }

    #[test]
    fn test_task_names_are_unique() {
        let mut names: Vec<_> = Task::ALL.iter().map(Task::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Task::ALL.len());
    }
}
