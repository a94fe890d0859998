use crate::domain::MediaState;
use crate::error::PipelineError;
use crate::models::DownloadStatus;

/// Result of running one state-machine step.
#[derive(Debug)]
pub enum StepOutcome {
    /// Moved to the given state.
    Advanced(MediaState),
    /// Nothing to do yet; stays put until the next pass.
    Waiting(String),
    /// The attempt is over; the entity is marked FAILED.
    Failed(PipelineError),
}

impl StepOutcome {
    /// Folds a step error into an outcome. Retryable errors only wait.
    #[must_use]
    pub fn from_error(err: PipelineError) -> Self {
        if err.is_retryable() {
            Self::Waiting(err.to_string())
        } else {
            Self::Failed(err)
        }
    }

    #[must_use]
    pub const fn state(&self) -> Option<MediaState> {
        match self {
            Self::Advanced(state) => Some(*state),
            Self::Failed(_) => Some(MediaState::Failed),
            Self::Waiting(_) => None,
        }
    }
}

/// Maps a remote-storage status onto a step outcome.
///
/// A fresh submission that is still pending moves to `DOWNLOADING`; one that
/// was already there waits. `torrent_name` is updated when the provider
/// reports a release name.
pub(crate) fn download_outcome(
    status: DownloadStatus,
    current: MediaState,
    torrent_name: &mut Option<String>,
) -> StepOutcome {
    match status {
        DownloadStatus::Ready { name } => {
            if name.is_some() {
                *torrent_name = name;
            }
            StepOutcome::Advanced(MediaState::Downloaded)
        }
        DownloadStatus::Pending if current == MediaState::Downloading => {
            StepOutcome::Waiting("download in progress".to_string())
        }
        DownloadStatus::Pending => StepOutcome::Advanced(MediaState::Downloading),
        DownloadStatus::Failed(reason) => StepOutcome::Failed(PipelineError::DownloadFailed(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_classification() {
        let waiting = StepOutcome::from_error(PipelineError::transient("tmdb", "429"));
        assert!(matches!(waiting, StepOutcome::Waiting(_)));
        assert_eq!(waiting.state(), None);

        let failed = StepOutcome::from_error(PipelineError::NoCandidatesFound("x".into()));
        assert_eq!(failed.state(), Some(MediaState::Failed));
    }

    #[test]
    fn test_download_outcome() {
        let mut name = None;
        let ready = download_outcome(
            DownloadStatus::Ready {
                name: Some("Movie.2020.1080p".to_string()),
            },
            MediaState::Scraped,
            &mut name,
        );
        assert_eq!(ready.state(), Some(MediaState::Downloaded));
        assert_eq!(name.as_deref(), Some("Movie.2020.1080p"));

        let fresh = download_outcome(DownloadStatus::Pending, MediaState::Scraped, &mut name);
        assert_eq!(fresh.state(), Some(MediaState::Downloading));

        let still = download_outcome(DownloadStatus::Pending, MediaState::Downloading, &mut name);
        assert!(matches!(still, StepOutcome::Waiting(_)));

        let gone = download_outcome(
            DownloadStatus::Failed("dead".into()),
            MediaState::Downloading,
            &mut name,
        );
        assert_eq!(gone.state(), Some(MediaState::Failed));
        // A ready status without a name keeps what was known.
        download_outcome(DownloadStatus::Ready { name: None }, MediaState::Downloading, &mut name);
        assert_eq!(name.as_deref(), Some("Movie.2020.1080p"));
    }
}
