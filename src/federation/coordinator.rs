//! Federation coordinator: concurrent fan-out with a shared deadline
//!
//! A request moves through `Idle -> Dispatching -> Awaiting`, passes through
//! `TimedOut` when the deadline cuts collection short, and ends in
//! `Completed` or `AllFailed`. Sources that error, time out or
//! are cancelled contribute nothing; the request fails only when no source
//! succeeded.

use super::{ResponseCache, SearchableSource, SourceRegistry};
use crate::config::{Config, FederationConfig};
use crate::error::{Result, TributaryError};
use crate::merge::{MergeCandidate, MergedPage, ResultMerger, SearchResultItem};
use crate::relations::{RelationshipDetector, RelationshipMap};
use crate::retrieval::{SearchRequest, SourceHit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Lifecycle of one federated request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationState {
    Idle,
    Dispatching,
    Awaiting,
    /// At least one source succeeded
    Completed,
    /// The deadline passed with sources outstanding
    TimedOut,
    /// No source succeeded
    AllFailed,
}

impl FederationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::AllFailed)
    }

    fn can_advance_to(&self, next: FederationState) -> bool {
        use FederationState::*;
        matches!(
            (self, next),
            (Idle, Dispatching)
                | (Idle, AllFailed)
                | (Dispatching, Awaiting)
                | (Awaiting, Completed)
                | (Awaiting, TimedOut)
                | (TimedOut, Completed)
                | (TimedOut, AllFailed)
                | (Awaiting, AllFailed)
        )
    }
}

/// How one source fared for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Error,
    TimedOut,
    Cancelled,
}

/// Per-source diagnostics reported with every response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub status: SourceStatus,
    pub result_count: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceOutcome {
    fn failure_summary(&self) -> String {
        match (&self.status, &self.error) {
            (_, Some(error)) => format!("{}: {}", self.source_id, error),
            (SourceStatus::TimedOut, None) => format!("{}: timed out", self.source_id),
            (SourceStatus::Cancelled, None) => format!("{}: cancelled", self.source_id),
            _ => format!("{}: failed", self.source_id),
        }
    }
}

/// Federated search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query_id: String,
    pub items: Vec<SearchResultItem>,
    /// Unioned, deduplicated results before pagination
    pub total_count: usize,
    pub has_more: bool,
    pub offset: usize,
    pub limit: usize,
    pub query_time_ms: u64,
    pub state: FederationState,
    pub sources: Vec<SourceOutcome>,
    /// Served from the response cache
    #[serde(default)]
    pub cached: bool,
    pub completed_at: DateTime<Utc>,
}

impl SearchResponse {
    /// A response with no results for the given page
    pub fn empty(offset: usize, limit: usize) -> Self {
        Self {
            query_id: String::new(),
            items: Vec::new(),
            total_count: 0,
            has_more: false,
            offset,
            limit,
            query_time_ms: 0,
            state: FederationState::Idle,
            sources: Vec::new(),
            cached: false,
            completed_at: Utc::now(),
        }
    }

    /// Whether any source failed to contribute
    pub fn is_partial(&self) -> bool {
        self.sources.iter().any(|s| s.status != SourceStatus::Ok)
    }
}

/// Execution context for one request
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Overrides the configured deadline
    pub timeout: Option<Duration>,
    pub cancellation: CancellationToken,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// What a source task hands back to the coordinator
struct TaskReport {
    index: usize,
    result: Result<Vec<SourceHit>>,
    elapsed: Duration,
}

/// Records state transitions for one request
struct Run {
    query_id: Uuid,
    state: FederationState,
}

impl Run {
    fn advance(&mut self, next: FederationState) {
        if self.state.can_advance_to(next) {
            debug!("Federation {}: {:?} -> {:?}", self.query_id, self.state, next);
            self.state = next;
        } else {
            warn!(
                "Federation {}: ignored transition {:?} -> {:?}",
                self.query_id, self.state, next
            );
        }
    }
}

/// Fans a query out to every active source and merges the answers
pub struct Federator {
    registry: Arc<dyn SourceRegistry>,
    config: FederationConfig,
    merger: ResultMerger,
    detector: Option<RelationshipDetector>,
    cache: Option<ResponseCache>,
}

impl Federator {
    /// Build a coordinator from the full configuration
    pub fn new(registry: Arc<dyn SourceRegistry>, config: &Config) -> Result<Self> {
        let detector = if config.relations.enabled {
            Some(RelationshipDetector::new(
                &config.relations,
                config.merge.shingle_size,
            )?)
        } else {
            None
        };

        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::new(config.cache.capacity));

        Ok(Self {
            registry,
            config: config.federation.clone(),
            merger: ResultMerger::new(config.merge.clone()),
            detector,
            cache,
        })
    }

    pub fn from_parts(
        registry: Arc<dyn SourceRegistry>,
        config: FederationConfig,
        merger: ResultMerger,
        detector: Option<RelationshipDetector>,
        cache: Option<ResponseCache>,
    ) -> Self {
        Self {
            registry,
            config,
            merger,
            detector,
            cache,
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Search every active source and return the merged page
    pub async fn federate(
        &self,
        request: SearchRequest,
        ctx: &QueryContext,
    ) -> Result<SearchResponse> {
        let sources = self.registry.list_active();
        self.federate_sources(sources, request, ctx).await
    }

    /// Search an explicit source snapshot and return the merged page
    pub async fn federate_sources(
        &self,
        sources: Vec<Arc<dyn SearchableSource>>,
        request: SearchRequest,
        ctx: &QueryContext,
    ) -> Result<SearchResponse> {
        let query_id = Uuid::new_v4();
        let span = info_span!("federate", query_id = %query_id);

        self.run(query_id, sources, request, ctx)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        query_id: Uuid,
        sources: Vec<Arc<dyn SearchableSource>>,
        request: SearchRequest,
        ctx: &QueryContext,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        let mut run = Run {
            query_id,
            state: FederationState::Idle,
        };

        // Input errors surface before any source is contacted
        request.validate()?;
        let offset = request.offset;
        let limit = request.resolved_limit(self.config.default_limit, self.config.max_limit)?;

        if sources.is_empty() {
            run.advance(FederationState::AllFailed);
            warn!("No active sources for query");
            return Err(TributaryError::AllSourcesFailed {
                attempted: 0,
                failures: vec!["no active sources".to_string()],
            });
        }

        let source_ids: Vec<&str> = sources.iter().map(|s| s.id()).collect();
        let cache_key = self
            .cache
            .as_ref()
            .map(|_| ResponseCache::key(&request, &source_ids));

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(mut cached) = cache.get(key) {
                debug!("Serving cached response for {}", key);
                cached.query_id = query_id.to_string();
                cached.cached = true;
                cached.query_time_ms = started.elapsed().as_millis() as u64;
                return Ok(cached);
            }
        }

        // Step 1: Dispatch one task per source
        run.advance(FederationState::Dispatching);

        // Sources rank from the top; paging happens on the merged union
        let mut source_request = request.clone();
        source_request.offset = 0;
        source_request.limit = Some(offset.saturating_add(limit).saturating_add(1));

        let timeout = ctx
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.config.timeout_ms));
        let deadline = Instant::now() + timeout;
        let cancel = ctx.cancellation.child_token();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sources.max(1)));

        let mut tasks = JoinSet::new();
        for (index, source) in sources.iter().enumerate() {
            let source = Arc::clone(source);
            let request = source_request.clone();
            let cancel = cancel.clone();
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let task_started = Instant::now();
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(TributaryError::Source {
                        source_id: source.id().to_string(),
                        message: "cancelled".to_string(),
                    }),
                    result = async {
                        let _permit = permits.acquire_owned().await.map_err(|e| {
                            TributaryError::Source {
                                source_id: source.id().to_string(),
                                message: format!("dispatch failed: {}", e),
                            }
                        })?;
                        source.search(request, cancel.clone()).await
                    } => result,
                };
                TaskReport {
                    index,
                    result,
                    elapsed: task_started.elapsed(),
                }
            });
        }

        debug!(
            "Dispatched {} sources (deadline {}ms, per-source limit {})",
            sources.len(),
            timeout.as_millis(),
            offset + limit + 1
        );

        // Step 2: Collect until every task reports or the deadline passes
        run.advance(FederationState::Awaiting);

        let mut outcomes: Vec<Option<SourceOutcome>> = vec![None; sources.len()];
        let mut hits: Vec<(usize, Vec<SourceHit>)> = Vec::new();
        let mut cut_short: Option<SourceStatus> = None;

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => {
                    cut_short = Some(SourceStatus::Cancelled);
                    break;
                }
                joined = tokio::time::timeout_at(deadline, tasks.join_next()) => match joined {
                    Err(_) => {
                        cut_short = Some(SourceStatus::TimedOut);
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        // The task's source stays without an outcome and is reported below
                        warn!("Source task aborted: {}", e);
                    }
                    Ok(Some(Ok(report))) => {
                        let source_id = sources[report.index].id().to_string();
                        let elapsed_ms = report.elapsed.as_millis() as u64;

                        outcomes[report.index] = Some(match report.result {
                            Ok(source_hits) => {
                                debug!(
                                    "Source '{}' returned {} hits in {}ms",
                                    source_id,
                                    source_hits.len(),
                                    elapsed_ms
                                );
                                let outcome = SourceOutcome {
                                    source_id,
                                    status: SourceStatus::Ok,
                                    result_count: source_hits.len(),
                                    elapsed_ms,
                                    error: None,
                                };
                                hits.push((report.index, source_hits));
                                outcome
                            }
                            Err(e) => {
                                warn!("Source '{}' failed: {}", source_id, e);
                                let status = if cancel.is_cancelled() {
                                    SourceStatus::Cancelled
                                } else {
                                    SourceStatus::Error
                                };
                                SourceOutcome {
                                    source_id,
                                    status,
                                    result_count: 0,
                                    elapsed_ms,
                                    error: Some(e.to_string()),
                                }
                            }
                        });
                    }
                },
            }
        }

        if cut_short.is_some() {
            cancel.cancel();
            tasks.abort_all();
        }

        if cut_short == Some(SourceStatus::TimedOut) {
            run.advance(FederationState::TimedOut);
        }

        let waited_ms = started.elapsed().as_millis() as u64;
        let outcomes: Vec<SourceOutcome> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.unwrap_or_else(|| {
                    let status = cut_short.unwrap_or(SourceStatus::Error);
                    let source_id = sources[index].id().to_string();
                    warn!("Source '{}' did not report: {:?}", source_id, status);
                    SourceOutcome {
                        source_id,
                        status,
                        result_count: 0,
                        elapsed_ms: waited_ms,
                        error: (status == SourceStatus::Error)
                            .then(|| "search task panicked".to_string()),
                    }
                })
            })
            .collect();

        if hits.is_empty() {
            run.advance(FederationState::AllFailed);
            let failures: Vec<String> = outcomes.iter().map(SourceOutcome::failure_summary).collect();
            warn!("All {} sources failed", sources.len());
            return Err(TributaryError::AllSourcesFailed {
                attempted: sources.len(),
                failures,
            });
        }

        let partial = outcomes.iter().any(|o| o.status != SourceStatus::Ok);
        run.advance(FederationState::Completed);

        // Step 3: Union in source order; the merger re-sorts
        hits.sort_by_key(|(index, _)| *index);
        let candidates: Vec<MergeCandidate> = hits
            .into_iter()
            .flat_map(|(index, source_hits)| {
                let source_id = sources[index].id().to_string();
                source_hits.into_iter().map(move |hit| MergeCandidate {
                    source_id: source_id.clone(),
                    document: hit.document,
                    score: hit.score,
                })
            })
            .collect();

        // Step 4: Relationships over the raw union, then merge
        let relationships = match &self.detector {
            Some(detector) => {
                let documents: Vec<_> = candidates.iter().map(|c| Arc::clone(&c.document)).collect();
                detector.detect(&documents)
            }
            None => RelationshipMap::new(),
        };

        let MergedPage {
            items,
            total_count,
            has_more,
        } = self.merger.merge(candidates, &relationships, offset, limit);

        let response = SearchResponse {
            query_id: query_id.to_string(),
            items,
            total_count,
            has_more,
            offset,
            limit,
            query_time_ms: started.elapsed().as_millis() as u64,
            state: run.state,
            sources: outcomes,
            cached: false,
            completed_at: Utc::now(),
        };

        info!(
            "Federated query returned {} of {} results from {} sources in {}ms (state={:?}, partial={})",
            response.items.len(),
            response.total_count,
            response.sources.len(),
            response.query_time_ms,
            response.state,
            partial
        );

        // Partial answers are not cached so recovered sources are seen next time
        if let (Some(cache), Some(key), false) = (&self.cache, cache_key, partial) {
            cache.insert(key, response.clone());
        }

        Ok(response)
    }
}
