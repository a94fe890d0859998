//! Remote-storage providers combined in priority order.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::{CacheChecker, RateGate, RealDebridClient, RemoteStorage, TorboxClient};
use crate::config::{ProvidersConfig, RateLimitConfig};
use crate::error::PipelineError;
use crate::models::{DownloadStatus, Submission};
use crate::ranking::CacheAvailability;

/// A provider that can both store content and report cache availability.
pub trait DebridBackend: RemoteStorage + CacheChecker {}

impl<T: RemoteStorage + CacheChecker> DebridBackend for T {}

/// Tries each configured provider in order; first success wins.
pub struct DebridPool {
    providers: Vec<Arc<dyn DebridBackend>>,
}

impl DebridPool {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn DebridBackend>>) -> Self {
        Self { providers }
    }

    /// Real-Debrid first, then Torbox, skipping whichever has no credentials.
    pub fn from_config(providers: &ProvidersConfig, limits: &RateLimitConfig) -> anyhow::Result<Self> {
        let mut backends: Vec<Arc<dyn DebridBackend>> = Vec::new();
        if providers.has_real_debrid() {
            let gate = RateGate::new(super::realdebrid::PROVIDER, limits);
            backends.push(Arc::new(RealDebridClient::new(
                &providers.real_debrid_token,
                gate,
            )?));
        }
        if providers.has_torbox() {
            let gate = RateGate::new(super::torbox::PROVIDER, limits);
            backends.push(Arc::new(TorboxClient::new(&providers.torbox_api_key, gate)?));
        }
        if backends.is_empty() {
            warn!("No remote-storage provider configured");
        }
        Ok(Self::new(backends))
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    async fn submit<'a, F, Fut>(&'a self, what: &str, add: F) -> Result<Option<Submission>, PipelineError>
    where
        F: Fn(&'a dyn DebridBackend) -> Fut,
        Fut: std::future::Future<Output = Result<Option<Submission>, PipelineError>>,
    {
        let mut transient = None;
        for provider in &self.providers {
            match add(provider.as_ref()).await {
                Ok(Some(submission)) => {
                    info!(provider = %submission.provider, id = %submission.provider_id, "Submitted {what}");
                    return Ok(Some(submission));
                }
                Ok(None) => {
                    info!(provider = %provider.name(), "Provider declined {what}");
                }
                Err(e) => {
                    warn!(provider = %provider.name(), error = %e, "Submission failed");
                    if e.is_retryable() {
                        transient = Some(e);
                    }
                }
            }
        }
        // Nobody accepted. A transient failure means another pass may still succeed.
        transient.map_or(Ok(None), Err)
    }
}

#[async_trait::async_trait]
impl RemoteStorage for DebridPool {
    fn name(&self) -> &str {
        "debrid"
    }

    async fn add_by_hash(&self, hash: &str) -> Result<Option<Submission>, PipelineError> {
        self.submit("torrent", |p| p.add_by_hash(hash)).await
    }

    async fn add_by_link(&self, link: &str) -> Result<Option<Submission>, PipelineError> {
        self.submit("usenet link", |p| p.add_by_link(link)).await
    }

    async fn get_status(&self, submission: &Submission) -> Result<DownloadStatus, PipelineError> {
        match self
            .providers
            .iter()
            .find(|p| p.name() == submission.provider)
        {
            Some(provider) => provider.get_status(submission).await,
            None => Ok(DownloadStatus::Failed(format!(
                "provider {} is not configured",
                submission.provider
            ))),
        }
    }
}

#[async_trait::async_trait]
impl CacheChecker for DebridPool {
    /// Asks every provider concurrently. A provider that errors is skipped.
    async fn check_all(&self, hashes: &[String]) -> Result<CacheAvailability, PipelineError> {
        let mut merged = CacheAvailability::new();
        if hashes.is_empty() {
            return Ok(merged);
        }

        let results = join_all(self.providers.iter().map(|p| p.check_all(hashes))).await;
        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(found) => {
                    for (hash, names) in found {
                        let entry = merged.entry(hash.to_lowercase()).or_default();
                        for name in names {
                            if !entry.contains(&name) {
                                entry.push(name);
                            }
                        }
                    }
                }
                Err(e) => warn!(provider = %provider.name(), error = %e, "Cache check failed"),
            }
        }

        info!(
            cached = merged.values().filter(|v| !v.is_empty()).count(),
            total = hashes.len(),
            "Cache check finished"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeProvider {
        name: &'static str,
        accept: bool,
        fail: Option<fn() -> PipelineError>,
        cached: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(name: &'static str, accept: bool) -> Self {
            Self {
                name,
                accept,
                fail: None,
                cached: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteStorage for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn add_by_hash(&self, hash: &str) -> Result<Option<Submission>, PipelineError> {
            self.calls.lock().unwrap().push(hash.to_string());
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            Ok(self.accept.then(|| Submission {
                provider: self.name.to_string(),
                provider_id: "1".to_string(),
            }))
        }

        async fn add_by_link(&self, _link: &str) -> Result<Option<Submission>, PipelineError> {
            Ok(None)
        }

        async fn get_status(&self, _s: &Submission) -> Result<DownloadStatus, PipelineError> {
            Ok(DownloadStatus::Ready { name: None })
        }
    }

    #[async_trait::async_trait]
    impl CacheChecker for FakeProvider {
        async fn check_all(&self, _hashes: &[String]) -> Result<CacheAvailability, PipelineError> {
            Ok(self
                .cached
                .iter()
                .map(|h| ((*h).to_string(), vec![self.name.to_string()]))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_first_accepting_provider_wins() {
        let first = Arc::new(FakeProvider::new("real_debrid", false));
        let second = Arc::new(FakeProvider::new("torbox", true));
        let providers: Vec<Arc<dyn DebridBackend>> = vec![first.clone(), second.clone()];
        let pool = DebridPool::new(providers);

        let submission = pool.add_by_hash("abc").await.unwrap().unwrap();
        assert_eq!(submission.provider, "torbox");
        assert_eq!(first.calls.lock().unwrap().len(), 1);
        assert_eq!(second.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nobody_accepts() {
        let providers: Vec<Arc<dyn DebridBackend>> =
            vec![Arc::new(FakeProvider::new("real_debrid", false))];
        let pool = DebridPool::new(providers);
        assert!(pool.add_by_hash("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_is_reported_when_nobody_accepts() {
        let mut flaky = FakeProvider::new("real_debrid", false);
        flaky.fail = Some(|| PipelineError::transient("real_debrid", "503"));
        let providers: Vec<Arc<dyn DebridBackend>> = vec![
            Arc::new(flaky),
            Arc::new(FakeProvider::new("torbox", false)),
        ];
        let pool = DebridPool::new(providers);

        let err = pool.add_by_hash("abc").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cache_results_are_merged() {
        let mut rd = FakeProvider::new("real_debrid", true);
        rd.cached = vec!["aaa"];
        let mut tb = FakeProvider::new("torbox", true);
        tb.cached = vec!["aaa", "bbb"];
        let providers: Vec<Arc<dyn DebridBackend>> = vec![Arc::new(rd), Arc::new(tb)];
        let pool = DebridPool::new(providers);

        let hashes = vec!["aaa".to_string(), "bbb".to_string(), "ccc".to_string()];
        let cache = pool.check_all(&hashes).await.unwrap();

        assert_eq!(cache["aaa"], vec!["real_debrid", "torbox"]);
        assert_eq!(cache["bbb"], vec!["torbox"]);
        assert!(!cache.contains_key("ccc"));
    }
}
