//! Concurrent dispatch of per-city fetches.
//!
//! A batch runs one task per distinct [`CityQuery`], at most
//! `max_concurrency` at a time, through the shared [`FetchCache`]. Failures
//! stay with their city. Results can be awaited as a whole ([`Orchestrator::fetch_many`])
//! or consumed as they complete from a [`BatchHandle`].

use std::{
    collections::{HashMap, HashSet},
    pin::pin,
    sync::Arc,
    time::Duration,
};

use futures::{StreamExt, stream};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    Config,
    cache::FetchCache,
    error::{ConfigError, FetchError},
    model::{CityQuery, FetchResult, UnitSystem},
    provider::{WeatherProvider, provider_from_config},
};

/// Per-city result of a batch. Always holds an entry for every requested city.
pub type BatchResults = HashMap<CityQuery, FetchResult>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_concurrency: usize,
    pub ttl: Duration,
    /// Upper bound for a single attempt, including waiting on a shared fetch.
    pub request_timeout: Duration,
    /// Extra attempts after a `Network` failure.
    pub max_retries: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions::from(&Config::default())
    }
}

impl From<&Config> for BatchOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            ttl: config.ttl(),
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
        }
    }
}

/// Progress notifications from a running batch.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Sent once per city, in completion order.
    Completed { query: CityQuery, result: FetchResult },
    /// Sent last. `cancelled` is set when the batch was aborted.
    Finished { delivered: usize, cancelled: bool },
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    cache: Arc<FetchCache>,
    options: BatchOptions,
}

impl Orchestrator {
    pub fn new(cache: Arc<FetchCache>, mut options: BatchOptions) -> Self {
        options.max_concurrency = options.max_concurrency.max(1);
        Self { cache, options }
    }

    pub fn with_provider(
        provider: Arc<dyn WeatherProvider>,
        unit_system: UnitSystem,
        options: BatchOptions,
    ) -> Self {
        Self::new(Arc::new(FetchCache::new(provider, unit_system)), options)
    }

    /// Wire the OpenWeatherMap provider, cache and batch options from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let provider = provider_from_config(config)?;
        Ok(Self::with_provider(
            provider,
            config.unit_system,
            BatchOptions::from(config),
        ))
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Fetch a single city with the batch timeout and retry policy applied.
    pub async fn fetch_one(&self, query: &CityQuery) -> FetchResult {
        fetch_with_policy(&self.cache, query, &self.options).await
    }

    /// Fetch every city and wait for all of them.
    pub async fn fetch_many<I>(&self, queries: I) -> BatchResults
    where
        I: IntoIterator<Item = CityQuery>,
    {
        let queries = distinct(queries);
        run_batch(
            Arc::clone(&self.cache),
            self.options.clone(),
            queries,
            CancellationToken::new(),
            None,
        )
        .await
    }

    /// Start a batch in the background and return immediately.
    ///
    /// Dropping the handle cancels the batch.
    pub fn spawn_many<I>(&self, queries: I) -> BatchHandle
    where
        I: IntoIterator<Item = CityQuery>,
    {
        let queries = distinct(queries);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_batch(
            Arc::clone(&self.cache),
            self.options.clone(),
            queries.clone(),
            cancel.clone(),
            Some(tx),
        ));

        BatchHandle {
            events: rx,
            guard: cancel.clone().drop_guard(),
            cancel,
            task,
            queries,
        }
    }
}

/// Handle to a batch started with [`Orchestrator::spawn_many`].
#[derive(Debug)]
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    cancel: CancellationToken,
    guard: DropGuard,
    task: JoinHandle<BatchResults>,
    queries: Vec<CityQuery>,
}

impl BatchHandle {
    pub fn queries(&self) -> &[CityQuery] {
        &self.queries
    }

    /// Wait for the next event; `None` once the batch is done and drained.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll for interactive callers.
    pub fn try_next_event(&mut self) -> Option<BatchEvent> {
        self.events.try_recv().ok()
    }

    /// Stop issuing fetches and discard results not yet delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the batch and return the full per-city map.
    pub async fn join(self) -> BatchResults {
        let BatchHandle {
            task,
            queries,
            guard,
            ..
        } = self;

        let results = match task.await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "batch driver stopped unexpectedly");
                queries
                    .into_iter()
                    .map(|q| (q, Err(FetchError::Cancelled)))
                    .collect()
            }
        };
        drop(guard);
        results
    }
}

fn distinct<I>(queries: I) -> Vec<CityQuery>
where
    I: IntoIterator<Item = CityQuery>,
{
    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter(|q| seen.insert(q.clone()))
        .collect()
}

async fn run_batch(
    cache: Arc<FetchCache>,
    options: BatchOptions,
    queries: Vec<CityQuery>,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
) -> BatchResults {
    tracing::info!(
        cities = queries.len(),
        max_concurrency = options.max_concurrency,
        "starting fetch batch"
    );

    let tasks = queries.iter().cloned().map(|query| {
        let cache = Arc::clone(&cache);
        let options = options.clone();
        async move {
            let result = fetch_with_policy(&cache, &query, &options).await;
            (query, result)
        }
    });
    let mut completions = pin!(stream::iter(tasks).buffer_unordered(options.max_concurrency));

    let mut results = BatchResults::with_capacity(queries.len());
    let mut cancelled = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            next = completions.next() => match next {
                Some((query, result)) => {
                    if let Err(err) = &result {
                        tracing::warn!(city = %query, error = %err, "city fetch failed");
                    }
                    if let Some(tx) = &events {
                        let _ = tx.send(BatchEvent::Completed {
                            query: query.clone(),
                            result: result.clone(),
                        });
                    }
                    results.insert(query, result);
                }
                None => break,
            },
        }
    }

    let delivered = results.len();
    if cancelled {
        tracing::info!(delivered, total = queries.len(), "fetch batch cancelled");
        for query in &queries {
            results
                .entry(query.clone())
                .or_insert(Err(FetchError::Cancelled));
        }
    } else {
        tracing::info!(delivered, "fetch batch finished");
    }

    if let Some(tx) = &events {
        let _ = tx.send(BatchEvent::Finished {
            delivered,
            cancelled,
        });
    }

    results
}

/// A provider `Network` failure is retried; a timeout is not, because the
/// detached fetch it gave up on is still running and a retry would only
/// rejoin it.
async fn fetch_with_policy(
    cache: &FetchCache,
    query: &CityQuery,
    options: &BatchOptions,
) -> FetchResult {
    let mut attempt = 0;
    loop {
        let fetch = cache.get_or_fetch(query, options.ttl);
        let result = match tokio::time::timeout(options.request_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    city = %query,
                    timeout = ?options.request_timeout,
                    "city fetch timed out"
                );
                return Err(FetchError::Network(format!(
                    "timed out after {:?}",
                    options.request_timeout
                )));
            }
        };

        match result {
            Err(err) if err.is_retryable() && attempt < options.max_retries => {
                attempt += 1;
                tracing::warn!(city = %query, attempt, error = %err, "retrying city fetch");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, fixtures::ScriptedProvider};

    fn options(max_concurrency: usize) -> BatchOptions {
        BatchOptions {
            max_concurrency,
            ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(60),
            max_retries: 0,
        }
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, opts: BatchOptions) -> Orchestrator {
        Orchestrator::with_provider(provider, UnitSystem::Metric, opts)
    }

    fn cities(names: &[&str]) -> Vec<CityQuery> {
        names.iter().map(|n| CityQuery::new(*n)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_keeps_every_city() {
        let provider = ScriptedProvider::new().with_city("Paris").into_arc();
        let orch = orchestrator(provider, options(4));

        let results = orch.fetch_many(cities(&["Paris", "Atlantis"])).await;

        assert_eq!(results.len(), 2);
        let paris = results[&CityQuery::new("Paris")].as_ref().unwrap();
        assert!(!paris.is_empty());
        let atlantis = results[&CityQuery::new("Atlantis")].as_ref().unwrap_err();
        assert_eq!(atlantis.kind(), ErrorKind::Provider(404));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_queries_are_fetched_once() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_city("Oslo")
            .into_arc();
        let orch = orchestrator(provider.clone(), options(4));

        let results = orch.fetch_many(cities(&["Paris", "Oslo", "Paris"])).await;

        assert_eq!(results.len(), 2);
        assert_eq!(provider.calls_for("Paris"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let names: Vec<String> = (0..10).map(|i| format!("City{i}")).collect();
        let provider = names
            .iter()
            .fold(ScriptedProvider::new(), |p, n| p.with_city(n))
            .with_delay(Duration::from_millis(100))
            .into_arc();
        let orch = orchestrator(provider.clone(), options(3));

        let results = orch
            .fetch_many(names.iter().map(|n| CityQuery::new(n.as_str())))
            .await;

        assert_eq!(results.len(), 10);
        assert!(results.values().all(|r| r.is_ok()));
        assert_eq!(provider.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_batch_reports_each_city_once() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_city("Oslo")
            .with_delay(Duration::from_millis(10))
            .into_arc();
        let orch = orchestrator(provider, options(2));

        let mut handle = orch.spawn_many(cities(&["Paris", "Oslo", "Atlantis"]));
        let mut completed = Vec::new();
        let mut finished = None;

        while let Some(event) = handle.next_event().await {
            match event {
                BatchEvent::Completed { query, .. } => completed.push(query),
                BatchEvent::Finished { delivered, cancelled } => {
                    finished = Some((delivered, cancelled));
                }
            }
        }

        assert_eq!(completed.len(), 3);
        assert_eq!(finished, Some((3, false)));
        assert_eq!(handle.join().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_handle_sees_completion_then_finish() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_delay(Duration::from_millis(50))
            .into_arc();
        let orch = orchestrator(provider, options(1));

        let mut handle = orch.spawn_many(cities(&["Paris"]));
        assert!(handle.try_next_event().is_none());

        let mut seen = Vec::new();
        let mut finished = false;
        while !(finished && handle.is_finished()) {
            while let Some(event) = handle.try_next_event() {
                finished |= matches!(event, BatchEvent::Finished { .. });
                seen.push(event);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], BatchEvent::Completed { result: Ok(_), .. }));
        assert!(matches!(
            seen[1],
            BatchEvent::Finished {
                delivered: 1,
                cancelled: false
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_start_marks_everything_cancelled() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_delay(Duration::from_secs(5))
            .into_arc();
        let orch = orchestrator(provider, options(2));

        let handle = orch.spawn_many(cities(&["Paris", "Oslo"]));
        handle.cancel();
        let results = handle.join().await;

        assert_eq!(results.len(), 2);
        assert!(
            results
                .values()
                .all(|r| matches!(r, Err(FetchError::Cancelled)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_delivered_results_and_leaves_cache_intact() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_city("Oslo")
            .with_delay(Duration::from_secs(1))
            .into_arc();
        let orch = orchestrator(provider.clone(), options(1));

        let mut handle = orch.spawn_many(cities(&["Paris", "Oslo"]));
        let first = match handle.next_event().await {
            Some(BatchEvent::Completed { query, result }) => {
                assert!(result.is_ok());
                query
            }
            other => panic!("expected a completion, got {other:?}"),
        };
        handle.cancel();
        let results = handle.join().await;

        assert!(results[&first].is_ok());
        let second = cities(&["Paris", "Oslo"])
            .into_iter()
            .find(|q| *q != first)
            .unwrap();
        assert!(matches!(results[&second], Err(FetchError::Cancelled)));

        // The abandoned fetch still completes and caches normally.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(orch.cache().entry(&second).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_city_times_out_as_network_error() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_delay(Duration::from_secs(30))
            .into_arc();
        let opts = BatchOptions {
            request_timeout: Duration::from_secs(2),
            ..options(1)
        };
        let orch = orchestrator(provider, opts);

        let started = tokio::time::Instant::now();
        let result = orch.fetch_one(&CityQuery::new("Paris")).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_not_retried_against_the_same_fetch() {
        let provider = ScriptedProvider::new()
            .with_city("Paris")
            .with_delay(Duration::from_secs(30))
            .into_arc();
        let opts = BatchOptions {
            request_timeout: Duration::from_secs(2),
            max_retries: 2,
            ..options(1)
        };
        let orch = orchestrator(provider.clone(), opts);

        let started = tokio::time::Instant::now();
        let result = orch.fetch_one(&CityQuery::new("Paris")).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
        assert_eq!(provider.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_are_retried() {
        let provider = ScriptedProvider::new()
            .with_failure("Paris", FetchError::Network("connection reset".into()))
            .into_arc();
        let opts = BatchOptions {
            max_retries: 2,
            ..options(1)
        };
        let orch = orchestrator(provider.clone(), opts);

        let result = orch.fetch_one(&CityQuery::new("Paris")).await;

        assert!(result.is_err());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failures_are_not_retried() {
        let provider = ScriptedProvider::new().into_arc();
        let opts = BatchOptions {
            max_retries: 3,
            ..options(1)
        };
        let orch = orchestrator(provider.clone(), opts);

        assert!(orch.fetch_one(&CityQuery::new("Atlantis")).await.is_err());
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn options_follow_config() {
        let cfg = Config {
            max_concurrency: 0,
            ttl_seconds: 60,
            ..Config::with_api_key("KEY")
        };
        let opts = BatchOptions::from(&cfg);
        assert_eq!(opts.max_concurrency, 1);
        assert_eq!(opts.ttl, Duration::from_secs(60));
    }

    #[test]
    fn from_config_requires_api_key() {
        assert!(Orchestrator::from_config(&Config::default()).is_err());
    }
}
