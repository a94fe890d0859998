//! Links episodes whose files showed up on the mount on their own.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use super::{Pipeline, StepOutcome};
use crate::constants::intervals;
use crate::domain::MediaState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Another sweep was still running; nothing was checked.
    pub skipped: bool,
    pub checked: usize,
    pub linked: usize,
}

/// Clears the running flag however the sweep exits.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Pipeline {
    /// Checks every unfinished episode against the mount.
    ///
    /// Overlapping calls are skipped, not queued. Episodes that are not on
    /// the mount are left untouched and never count toward their retry limit.
    pub async fn sweep(&self) -> anyhow::Result<SweepReport> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already running, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        }
        let _guard = SweepGuard(&self.sweeping);

        if !self.mount_available().await {
            debug!("Mount unavailable, skipping sweep");
            return Ok(SweepReport::default());
        }

        let unfinished = self.store.list_unfinished_episodes().await?;
        let mut report = SweepReport::default();

        for (episode, item) in &unfinished {
            // Linked ones are completed by the link batch.
            if matches!(episode.state, MediaState::Symlinked | MediaState::Paused) {
                continue;
            }
            report.checked += 1;

            if let Some(source) = self.locate_episode(episode, item).await {
                let mut next = episode.clone();
                let outcome = match self.link_found_episode(&mut next, item, source).await {
                    Ok(()) => StepOutcome::Advanced(MediaState::Symlinked),
                    Err(e) => StepOutcome::from_error(e),
                };
                match self
                    .commit_episode_outcome(episode, next, item, &outcome)
                    .await
                {
                    Ok(true) if matches!(outcome, StepOutcome::Advanced(_)) => report.linked += 1,
                    Ok(_) => {}
                    Err(e) => error!(episode_id = %episode.id, error = %e, "Failed to commit sweep result"),
                }
            }

            tokio::time::sleep(intervals::SWEEP_YIELD).await;
        }

        info!(
            checked = report.checked,
            linked = report.linked,
            "Sweep finished"
        );
        Ok(report)
    }

    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }
}
