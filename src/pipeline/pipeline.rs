//! Content Processing Pipeline
//!
//! Priority-ordered, bounded-concurrency orchestration of
//! validate -> optimize -> package, with an SLA check at the end.
//! Successful results are cached by content hash and by request id.
//! Request ids are scoped to the tenant, and one processing slot is held
//! per running request, whether it came from the queue or a batch.
//! Content-level failures come back as failed `ProcessingResult`s; only
//! capacity, tenant and shutdown problems are returned as errors.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheCluster, SetOptions, TenantCache};
use crate::content::{content_hash, ContentType};
use crate::error::{PipelineError, ValidationError};
use crate::pipeline::optimize::optimize;
use crate::pipeline::package::build_package;
use crate::pipeline::request::{
    FailureKind, ProcessingRequest, ProcessingResult, RequestMetadata, StageMetrics,
};
use crate::pipeline::scheduler::PendingQueue;
use crate::telemetry::Telemetry;
use crate::tenant::{TenantId, TenantProfileRegistry};
use crate::validation::{ContentValidationQueue, ValidationJob};

// == Config ==
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrent_processing: usize,
    pub max_queue_size: usize,
    pub validation_timeout: Duration,
    /// Wall-clock budget for one request
    pub sla_target: Duration,
    pub batch_size: usize,
    pub tick_interval: Duration,
    /// TTL of results cached by request id
    pub result_ttl: Duration,
    /// How long finished results stay in the local map
    pub result_retention: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processing: 5,
            max_queue_size: 1000,
            validation_timeout: Duration::from_secs(30),
            sla_target: Duration::from_secs(60),
            batch_size: 10,
            tick_interval: Duration::from_millis(100),
            result_ttl: Duration::from_secs(600),
            result_retention: Duration::from_secs(600),
        }
    }
}

/// Cache TTL of a successful result keyed by content hash.
pub fn content_class_ttl(metadata: &RequestMetadata) -> Duration {
    if metadata.hotfix {
        return Duration::from_secs(300);
    }
    match metadata.content_type {
        ContentType::Dialogue => Duration::from_secs(1800),
        ContentType::Quiz | ContentType::Scene => Duration::from_secs(3600),
        ContentType::Game => Duration::from_secs(7200),
    }
}

fn content_key(hash: &str) -> String {
    format!("pipeline:content:{}", hash)
}

fn result_key(id: &str) -> String {
    format!("pipeline:result:{}", id)
}

type ResultKey = (TenantId, String);

fn result_slot(tenant: &TenantId, id: &str) -> ResultKey {
    (tenant.clone(), id.to_string())
}

fn millis(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}

// == Reports ==
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub total_requests: u64,
    /// Requests that reached a terminal result, failed ones included
    pub processed_requests: u64,
    pub failed_requests: u64,
    pub average_processing_time_ms: f64,
    /// Share of requests answered from the result cache
    pub cache_efficiency: f64,
    pub active: usize,
    pub queued: usize,
    pub accepting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShutdownReport {
    /// True when every active job finished inside the grace period
    pub drained: bool,
    pub remaining_active: usize,
    /// Queued requests completed as failed without running
    pub cancelled: usize,
}

// == Internal State ==
struct Job {
    request: ProcessingRequest,
    hash: String,
    package_limit: u64,
}

enum Prepared {
    Cached(ProcessingResult),
    Fresh(Job),
}

enum Completion {
    /// Ran the stages while holding a processing slot
    Processed(OwnedSemaphorePermit),
    CacheHit,
    Cancelled,
}

struct StoredResult {
    result: ProcessingResult,
    stored_at: Instant,
}

#[derive(Default)]
struct Counters {
    total_requests: u64,
    processed: u64,
    failed: u64,
    total_time_ms: u64,
    cache_hits: u64,
    cache_misses: u64,
}

struct PipelineState {
    queue: PendingQueue<Job>,
    /// Ids queued or running
    in_flight: HashSet<ResultKey>,
    results: HashMap<ResultKey, StoredResult>,
    accepting: bool,
    counters: Counters,
}

struct Inner {
    cache: Arc<CacheCluster>,
    validation: ContentValidationQueue,
    tenants: Arc<TenantProfileRegistry>,
    config: PipelineConfig,
    telemetry: Telemetry,
    slots: Arc<Semaphore>,
    slot_limit: usize,
    state: Mutex<PipelineState>,
    completed: Notify,
}

// == Content Processing Pipeline ==
#[derive(Clone)]
pub struct ContentProcessingPipeline {
    inner: Arc<Inner>,
}

impl ContentProcessingPipeline {
    pub fn new(
        cache: Arc<CacheCluster>,
        validation: ContentValidationQueue,
        tenants: Arc<TenantProfileRegistry>,
        config: PipelineConfig,
        telemetry: Telemetry,
    ) -> Self {
        let slot_limit = config
            .max_concurrent_processing
            .min(validation.capacity())
            .max(1);
        if slot_limit != config.max_concurrent_processing {
            warn!(
                configured = config.max_concurrent_processing,
                validation_capacity = validation.capacity(),
                slot_limit,
                "Processing concurrency clamped"
            );
        }
        Self {
            inner: Arc::new(Inner {
                cache,
                validation,
                tenants,
                config,
                telemetry,
                slots: Arc::new(Semaphore::new(slot_limit)),
                slot_limit,
                state: Mutex::new(PipelineState {
                    queue: PendingQueue::new(),
                    in_flight: HashSet::new(),
                    results: HashMap::new(),
                    accepting: true,
                    counters: Counters::default(),
                }),
                completed: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn validation(&self) -> &ContentValidationQueue {
        &self.inner.validation
    }

    // == Submit ==
    /// Accepts a request and returns its id. A fresh cached result for the
    /// same content is registered under the new id without running any
    /// stage. An id the tenant already has queued or running is rejected.
    pub async fn submit_content(&self, request: ProcessingRequest) -> Result<String, PipelineError> {
        self.inner.ensure_accepting().await?;
        let id = request.id.clone();
        let tenant = request.metadata.tenant_id.clone();
        self.inner.reserve(&tenant, &id).await?;

        let job = match self.inner.prepare(request).await {
            Ok(Prepared::Cached(result)) => {
                self.inner.count_request().await;
                self.inner.complete(&tenant, result, Completion::CacheHit).await;
                return Ok(id);
            }
            Ok(Prepared::Fresh(job)) => job,
            Err(err) => {
                self.inner.release(&tenant, &id).await;
                return Err(err);
            }
        };

        let dispatch_now = {
            let mut state = self.inner.state.lock().await;
            if !state.accepting {
                state.in_flight.remove(&result_slot(&tenant, &id));
                return Err(PipelineError::ShuttingDown);
            }
            match self.inner.slots.clone().try_acquire_owned() {
                Ok(slot) => {
                    state.counters.total_requests += 1;
                    Some((job, slot))
                }
                Err(_) if state.queue.len() >= self.inner.config.max_queue_size => {
                    state.in_flight.remove(&result_slot(&tenant, &id));
                    self.inner.telemetry.counter("pipeline.rejected", 1, Vec::new());
                    return Err(PipelineError::CapacityExceeded {
                        queued: state.queue.len(),
                        limit: self.inner.config.max_queue_size,
                    });
                }
                Err(_) => {
                    let metadata = &job.request.metadata;
                    let (priority, timestamp) = (metadata.priority, metadata.timestamp);
                    state.queue.push(priority, timestamp, job);
                    state.counters.total_requests += 1;
                    None
                }
            }
        };

        self.inner.telemetry.counter(
            "pipeline.submitted",
            1,
            vec![("tenant", tenant.to_string())],
        );
        match dispatch_now {
            Some((job, slot)) => self.dispatch(job, slot),
            None => debug!(request_id = %id, tenant = %tenant, "Request queued"),
        }
        Ok(id)
    }

    fn dispatch(&self, job: Job, slot: OwnedSemaphorePermit) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = inner.execute(&job).await;
            inner.cache_success(&job, &result).await;
            inner
                .complete(&job.request.metadata.tenant_id, result, Completion::Processed(slot))
                .await;
        });
    }

    // == Scheduler Tick ==
    /// Fills free capacity from the queue in priority order and prunes old
    /// results. Returns the number of requests dispatched.
    pub async fn tick(&self) -> usize {
        let jobs = {
            let mut state = self.inner.state.lock().await;
            let retention = self.inner.config.result_retention;
            state
                .results
                .retain(|_, stored| stored.stored_at.elapsed() < retention);

            let mut jobs = Vec::new();
            while let Ok(slot) = self.inner.slots.clone().try_acquire_owned() {
                match state.queue.pop() {
                    Some(job) => jobs.push((job, slot)),
                    None => break,
                }
            }
            jobs
        };

        let dispatched = jobs.len();
        for (job, slot) in jobs {
            self.dispatch(job, slot);
        }
        dispatched
    }

    // == Batch ==
    /// Processes every request and returns one result per request. Priority
    /// groups run in rank order; each group runs in sub-batches of
    /// `batch_size` whose items run concurrently, each waiting for a
    /// processing slot. A repeated id inside the batch is replaced by a
    /// fresh one and the result carries a warning.
    pub async fn process_batch(
        &self,
        requests: Vec<ProcessingRequest>,
    ) -> HashMap<String, ProcessingResult> {
        let mut seen = HashSet::new();
        let mut renamed = HashMap::new();
        let mut groups: BTreeMap<Reverse<u8>, Vec<ProcessingRequest>> = BTreeMap::new();
        for mut request in requests {
            if !seen.insert(request.id.clone()) {
                let fresh = Uuid::new_v4().to_string();
                warn!(request_id = %request.id, assigned = %fresh, "Duplicate id in batch");
                renamed.insert(fresh.clone(), std::mem::replace(&mut request.id, fresh.clone()));
                seen.insert(fresh);
            }
            groups
                .entry(Reverse(request.metadata.priority.rank()))
                .or_default()
                .push(request);
        }

        let batch_size = self.inner.config.batch_size.max(1);
        let mut results = HashMap::new();
        for (_, group) in groups {
            let mut group = group.into_iter().peekable();
            while group.peek().is_some() {
                let chunk: Vec<_> = group.by_ref().take(batch_size).collect();
                let outcomes = join_all(chunk.into_iter().map(|r| self.process_one(r))).await;
                for mut result in outcomes {
                    if let Some(original) = renamed.get(&result.id) {
                        result.warnings.push(format!(
                            "duplicate id {} in batch; processed as {}",
                            original, result.id
                        ));
                    }
                    results.insert(result.id.clone(), result);
                }
            }
        }
        results
    }

    async fn process_one(&self, request: ProcessingRequest) -> ProcessingResult {
        let id = request.id.clone();
        let tenant = request.metadata.tenant_id.clone();
        if let Err(err) = self.inner.ensure_accepting().await {
            return ProcessingResult::failed(id, FailureKind::ShuttingDown, err.to_string(), StageMetrics::default());
        }
        if let Err(err) = self.inner.reserve(&tenant, &id).await {
            return ProcessingResult::failed(id, FailureKind::DuplicateId, err.to_string(), StageMetrics::default());
        }

        match self.inner.prepare(request).await {
            Err(err) => {
                self.inner.release(&tenant, &id).await;
                ProcessingResult::failed(id, FailureKind::InvalidTenant, err.to_string(), StageMetrics::default())
            }
            Ok(Prepared::Cached(result)) => {
                self.inner.count_request().await;
                self.inner
                    .complete(&tenant, result.clone(), Completion::CacheHit)
                    .await;
                result
            }
            Ok(Prepared::Fresh(job)) => {
                let slot = self.inner.slots.clone().acquire_owned().await;
                let slot = match (slot, self.inner.ensure_accepting().await) {
                    (Ok(slot), Ok(())) => slot,
                    _ => {
                        self.inner.release(&tenant, &id).await;
                        let err = PipelineError::ShuttingDown;
                        return ProcessingResult::failed(id, FailureKind::ShuttingDown, err.to_string(), StageMetrics::default());
                    }
                };
                self.inner.count_request().await;
                let result = self.inner.execute(&job).await;
                self.inner.cache_success(&job, &result).await;
                self.inner
                    .complete(&tenant, result.clone(), Completion::Processed(slot))
                    .await;
                result
            }
        }
    }

    // == Results ==
    /// Result for `id` owned by `tenant`, from memory or the by-id cache.
    pub async fn get_result(&self, tenant: &TenantId, id: &str) -> Option<ProcessingResult> {
        {
            let state = self.inner.state.lock().await;
            if let Some(stored) = state.results.get(&result_slot(tenant, id)) {
                return Some(stored.result.clone());
            }
        }
        TenantCache::new(self.inner.cache.clone(), tenant)
            .get_json(&result_key(id))
            .await
    }

    /// Waits up to `timeout` for `id` to finish.
    pub async fn wait_for_result(
        &self,
        tenant: &TenantId,
        id: &str,
        timeout: Duration,
    ) -> Option<ProcessingResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.get_result(tenant, id).await {
                return Some(result);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get_result(tenant, id).await;
            }
        }
    }

    pub async fn get_stats(&self) -> PipelineStats {
        let state = self.inner.state.lock().await;
        let counters = &state.counters;
        let lookups = counters.cache_hits + counters.cache_misses;
        PipelineStats {
            total_requests: counters.total_requests,
            processed_requests: counters.processed,
            failed_requests: counters.failed,
            average_processing_time_ms: if counters.processed == 0 {
                0.0
            } else {
                counters.total_time_ms as f64 / counters.processed as f64
            },
            cache_efficiency: if lookups == 0 {
                0.0
            } else {
                counters.cache_hits as f64 / lookups as f64
            },
            active: self.inner.active(),
            queued: state.queue.len(),
            accepting: state.accepting,
        }
    }

    // == Shutdown ==
    /// Stops intake, fails queued requests, then waits up to `grace` for
    /// active jobs. Returns either way.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let cancelled = {
            let mut state = self.inner.state.lock().await;
            state.accepting = false;
            state.queue.drain()
        };

        let cancelled_count = cancelled.len();
        for job in cancelled {
            let result = ProcessingResult::failed(
                job.request.id.clone(),
                FailureKind::ShuttingDown,
                PipelineError::ShuttingDown.to_string(),
                StageMetrics::default(),
            );
            self.inner
                .complete(&job.request.metadata.tenant_id, result, Completion::Cancelled)
                .await;
        }

        let drained = tokio::time::timeout(grace, async {
            loop {
                let notified = self.inner.completed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inner.active() == 0 {
                    break;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        let remaining_active = self.inner.active();
        if drained {
            info!(cancelled = cancelled_count, "Pipeline drained");
        } else {
            warn!(
                cancelled = cancelled_count,
                remaining_active, "Pipeline shutdown grace period elapsed"
            );
        }
        ShutdownReport {
            drained,
            remaining_active,
            cancelled: cancelled_count,
        }
    }
}

impl Inner {
    async fn ensure_accepting(&self) -> Result<(), PipelineError> {
        if self.state.lock().await.accepting {
            Ok(())
        } else {
            Err(PipelineError::ShuttingDown)
        }
    }

    async fn count_request(&self) {
        self.state.lock().await.counters.total_requests += 1;
    }

    /// Requests currently holding a processing slot.
    fn active(&self) -> usize {
        self.slot_limit - self.slots.available_permits()
    }

    async fn reserve(&self, tenant: &TenantId, id: &str) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if state.in_flight.insert(result_slot(tenant, id)) {
            Ok(())
        } else {
            Err(PipelineError::DuplicateId(id.to_string()))
        }
    }

    async fn release(&self, tenant: &TenantId, id: &str) {
        self.state.lock().await.in_flight.remove(&result_slot(tenant, id));
    }

    /// Resolves the tenant and looks for a cached result for the content.
    async fn prepare(&self, request: ProcessingRequest) -> Result<Prepared, PipelineError> {
        let metadata = &request.metadata;
        let profile = self.tenants.resolve(metadata.tenant_id.as_str()).await?;
        let hash = content_hash(metadata.content_type, &request.content);

        let cache = TenantCache::new(self.cache.clone(), &metadata.tenant_id);
        if let Some(mut cached) = cache.get_json::<ProcessingResult>(&content_key(&hash)).await {
            cached.id = request.id.clone();
            cached.metrics = StageMetrics {
                cache_hits: 1,
                ..StageMetrics::default()
            };
            cached.completed_at = Utc::now();
            cache
                .set_json(&result_key(&cached.id), &cached, SetOptions::ttl(self.config.result_ttl))
                .await;
            self.telemetry.counter(
                "pipeline.cache_hit",
                1,
                vec![("tenant", metadata.tenant_id.to_string())],
            );
            return Ok(Prepared::Cached(cached));
        }

        Ok(Prepared::Fresh(Job {
            package_limit: profile.package_limit(),
            hash,
            request,
        }))
    }

    /// Runs every stage. Never fails; problems become failed results.
    async fn execute(&self, job: &Job) -> ProcessingResult {
        let started = Instant::now();
        let request = &job.request;
        let metadata = &request.metadata;
        let mut metrics = StageMetrics {
            cache_misses: 1,
            ..StageMetrics::default()
        };

        // Validate
        let stage = Instant::now();
        let validation_job = ValidationJob {
            id: request.id.clone(),
            tenant_id: metadata.tenant_id.clone(),
            content: request.content.clone(),
            content_type: metadata.content_type,
            priority: metadata.priority,
            submitted_at: metadata.timestamp,
        };
        let outcome = self
            .validation
            .validate(validation_job, self.config.validation_timeout)
            .await;
        metrics.validation_time_ms = millis(stage.elapsed());

        let validated = match outcome {
            Ok(response) => {
                if response.cache_hit {
                    metrics.cache_hits += 1;
                }
                match response.result {
                    Some(result) if result.is_valid => result,
                    Some(result) => {
                        let mut warnings = result.errors;
                        warnings.extend(result.warnings);
                        return self
                            .failure(request, FailureKind::Validation, "Content failed validation", metrics, started)
                            .with_warnings(warnings);
                    }
                    None => {
                        let error = response
                            .error
                            .unwrap_or_else(|| "validator returned no result".to_string());
                        return self.failure(request, FailureKind::ValidatorUnavailable, error, metrics, started);
                    }
                }
            }
            Err(err @ ValidationError::TimeoutExceeded { .. }) => {
                return self.failure(request, FailureKind::Timeout, err.to_string(), metrics, started);
            }
            Err(err @ ValidationError::CapacityExceeded { .. }) => {
                return self.failure(request, FailureKind::ValidationCapacity, err.to_string(), metrics, started);
            }
            Err(err @ ValidationError::AlreadyInFlight(_)) => {
                return self.failure(request, FailureKind::DuplicateId, err.to_string(), metrics, started);
            }
            Err(err) => {
                return self.failure(request, FailureKind::ValidatorUnavailable, err.to_string(), metrics, started);
            }
        };

        // Optimize
        let stage = Instant::now();
        let optimized = optimize(&validated.sanitized_content);
        metrics.optimization_time_ms = millis(stage.elapsed());

        // Package
        let stage = Instant::now();
        let package = match build_package(&job.hash, &optimized, job.package_limit, Utc::now()) {
            Ok(package) => package,
            Err(err) => {
                metrics.deployment_time_ms = millis(stage.elapsed());
                let mut warnings = validated.warnings;
                warnings.push(format!(
                    "{}; reduce asset size or move to a higher tier",
                    err
                ));
                return self
                    .failure(request, FailureKind::PackageTooLarge, err.to_string(), metrics, started)
                    .with_warnings(warnings);
            }
        };
        metrics.deployment_time_ms = millis(stage.elapsed());

        // SLA
        let elapsed = started.elapsed();
        metrics.total_time_ms = millis(elapsed);
        let mut result = ProcessingResult {
            id: request.id.clone(),
            success: true,
            validated_content: Some(validated.sanitized_content),
            optimized_assets: Some(optimized),
            deployment_package: Some(package),
            metrics,
            error: None,
            failure_kind: None,
            warnings: validated.warnings,
            completed_at: Utc::now(),
        };
        if elapsed > self.config.sla_target {
            warn!(
                request_id = %request.id,
                elapsed_ms = millis(elapsed),
                sla_ms = millis(self.config.sla_target),
                "Request exceeded SLA"
            );
            result.success = false;
            result.failure_kind = Some(FailureKind::SlaExceeded);
            result.error = Some(format!(
                "Processing took {}ms, over the {}ms target",
                millis(elapsed),
                millis(self.config.sla_target)
            ));
        }
        result
    }

    fn failure(
        &self,
        request: &ProcessingRequest,
        kind: FailureKind,
        error: impl Into<String>,
        mut metrics: StageMetrics,
        started: Instant,
    ) -> ProcessingResult {
        metrics.total_time_ms = millis(started.elapsed());
        let result = ProcessingResult::failed(request.id.clone(), kind, error, metrics);
        debug!(
            request_id = %request.id,
            tenant = %request.metadata.tenant_id,
            ?kind,
            error = ?result.error,
            "Request failed"
        );
        result
    }

    /// Caches a successful result by content hash and by request id.
    async fn cache_success(&self, job: &Job, result: &ProcessingResult) {
        if !result.success {
            return;
        }
        let metadata = &job.request.metadata;
        let cache = TenantCache::new(self.cache.clone(), &metadata.tenant_id);
        let by_content = SetOptions::ttl(content_class_ttl(metadata))
            .with_tags(["pipeline", metadata.content_type.as_str()]);
        cache
            .set_json(&content_key(&job.hash), result, by_content)
            .await;
        cache
            .set_json(
                &result_key(&result.id),
                result,
                SetOptions::ttl(self.config.result_ttl).with_tags(["pipeline"]),
            )
            .await;
    }

    async fn complete(&self, tenant: &TenantId, result: ProcessingResult, completion: Completion) {
        let tags = vec![("tenant", tenant.to_string())];
        if result.success {
            self.telemetry.counter("pipeline.completed", 1, tags.clone());
        } else {
            self.telemetry.counter("pipeline.failed", 1, tags.clone());
        }
        self.telemetry.timing(
            "pipeline.total_time",
            Duration::from_millis(result.metrics.total_time_ms),
            tags,
        );

        {
            let mut state = self.state.lock().await;
            let key = result_slot(tenant, &result.id);
            state.in_flight.remove(&key);
            let counters = &mut state.counters;
            counters.processed += 1;
            counters.total_time_ms += result.metrics.total_time_ms;
            if !result.success {
                counters.failed += 1;
            }
            match completion {
                Completion::Processed(_) => counters.cache_misses += 1,
                Completion::CacheHit => counters.cache_hits += 1,
                Completion::Cancelled => {}
            }
            state.results.insert(
                key,
                StoredResult {
                    result,
                    stored_at: Instant::now(),
                },
            );
        }
        // The slot frees only once the result is visible to readers.
        drop(completion);
        self.completed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PolicySet;
    use crate::content::Priority;
    use crate::error::ValidationError;
    use crate::tenant::{TenantProfile, TenantTier};
    use crate::validation::{
        BuiltinValidators, StructuralReport, StructuralValidator, ValidationConfig,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct SlowValidator(Duration);

    #[async_trait]
    impl StructuralValidator for SlowValidator {
        async fn validate(
            &self,
            content_type: ContentType,
            content: &Value,
        ) -> Result<StructuralReport, ValidationError> {
            tokio::time::sleep(self.0).await;
            BuiltinValidators.validate(content_type, content).await
        }
    }

    fn springfield() -> TenantId {
        TenantId::parse("springfield").unwrap()
    }

    fn build(
        cache: Arc<CacheCluster>,
        validator: Arc<dyn StructuralValidator>,
        profile: TenantProfile,
        config: PipelineConfig,
    ) -> ContentProcessingPipeline {
        let validation = ContentValidationQueue::new(
            cache.clone(),
            validator,
            ValidationConfig::default(),
            Telemetry::disabled(),
        );
        let tenants = Arc::new(TenantProfileRegistry::with_profiles([profile]));
        ContentProcessingPipeline::new(cache, validation, tenants, config, Telemetry::disabled())
    }

    fn shared_cache() -> Arc<CacheCluster> {
        Arc::new(CacheCluster::in_memory(
            "results",
            2,
            10_000,
            PolicySet::new(Duration::from_secs(60)),
        ))
    }

    fn pipeline_with(validator: Arc<dyn StructuralValidator>, config: PipelineConfig) -> ContentProcessingPipeline {
        build(
            shared_cache(),
            validator,
            TenantProfile::for_tier(springfield(), TenantTier::Standard),
            config,
        )
    }

    fn quiz(title: &str) -> Value {
        json!({
            "title": title,
            "questions": [{"prompt": "Which day is recycling?", "options": ["Mon", "Thu"], "answer": 1}],
            "script": "/* score */ award( 10 );"
        })
    }

    fn request(content: Value) -> ProcessingRequest {
        ProcessingRequest::new(springfield(), ContentType::Quiz, content)
    }

    fn spawn_ticker(pipeline: ContentProcessingPipeline) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                pipeline.tick().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    }

    #[tokio::test]
    async fn test_successful_request_produces_package() {
        let pipeline = pipeline_with(Arc::new(BuiltinValidators), PipelineConfig::default());
        let id = pipeline.submit_content(request(quiz("Bins"))).await.unwrap();

        let result = pipeline
            .wait_for_result(&springfield(), &id, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.metrics.cache_misses, 1);
        let package = result.deployment_package.unwrap();
        assert_eq!(package.manifest.len(), 2);
        assert!(result.optimized_assets.unwrap().compression_ratio > 0.0);
    }

    #[tokio::test]
    async fn test_resubmission_served_from_cache() {
        let pipeline = pipeline_with(
            Arc::new(SlowValidator(Duration::from_millis(30))),
            PipelineConfig::default(),
        );
        let started = Instant::now();
        let first_id = pipeline.submit_content(request(quiz("Bins"))).await.unwrap();
        let first = pipeline
            .wait_for_result(&springfield(), &first_id, Duration::from_secs(2))
            .await
            .unwrap();
        let first_elapsed = started.elapsed();

        let started = Instant::now();
        let second_id = pipeline.submit_content(request(quiz("Bins"))).await.unwrap();
        let second = pipeline.get_result(&springfield(), &second_id).await.unwrap();
        assert!(started.elapsed() < first_elapsed);

        assert_ne!(first_id, second_id);
        assert_eq!(second.id, second_id);
        assert_eq!(second.metrics.cache_hits, 1);
        assert_eq!(second.validated_content, first.validated_content);

        let stats = pipeline.get_stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.processed_requests, 2);
        assert!((stats.cache_efficiency - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_content_fails_with_warnings() {
        let pipeline = pipeline_with(Arc::new(BuiltinValidators), PipelineConfig::default());
        let id = pipeline
            .submit_content(request(json!({"title": "No questions"})))
            .await
            .unwrap();
        let result = pipeline
            .wait_for_result(&springfield(), &id, Duration::from_secs(2))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::Validation));
        assert!(result.warnings.contains(&"quiz.questions must be an array".to_string()));
        assert_eq!(pipeline.get_stats().await.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_urgent_overtakes_normal() {
        let config = PipelineConfig {
            max_concurrent_processing: 1,
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(SlowValidator(Duration::from_millis(40))), config);

        pipeline.submit_content(request(quiz("Blocker"))).await.unwrap();
        let normal = pipeline
            .submit_content(request(quiz("Normal")).with_priority(Priority::Normal))
            .await
            .unwrap();
        let urgent = pipeline
            .submit_content(request(quiz("Urgent")).with_priority(Priority::Urgent))
            .await
            .unwrap();
        assert_eq!(pipeline.get_stats().await.queued, 2);

        let ticker = spawn_ticker(pipeline.clone());
        let tenant = springfield();
        let normal = pipeline.wait_for_result(&tenant, &normal, Duration::from_secs(3)).await.unwrap();
        let urgent = pipeline.wait_for_result(&tenant, &urgent, Duration::from_secs(3)).await.unwrap();
        ticker.abort();

        assert!(urgent.completed_at <= normal.completed_at);
    }

    #[tokio::test]
    async fn test_queue_limit_rejects() {
        let config = PipelineConfig {
            max_concurrent_processing: 1,
            max_queue_size: 1,
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(SlowValidator(Duration::from_millis(100))), config);
        pipeline.submit_content(request(quiz("a"))).await.unwrap();
        pipeline.submit_content(request(quiz("b"))).await.unwrap();

        assert_eq!(
            pipeline.submit_content(request(quiz("c"))).await,
            Err(PipelineError::CapacityExceeded { queued: 1, limit: 1 })
        );
    }

    #[tokio::test]
    async fn test_unknown_tenant_rejected() {
        let pipeline = pipeline_with(Arc::new(BuiltinValidators), PipelineConfig::default());
        let other = ProcessingRequest::new(
            TenantId::parse("capital-city").unwrap(),
            ContentType::Quiz,
            quiz("x"),
        );
        assert_eq!(
            pipeline.submit_content(other).await,
            Err(PipelineError::InvalidTenant("capital-city".into()))
        );
    }

    #[tokio::test]
    async fn test_package_over_tier_limit_fails() {
        let pipeline = build(
            shared_cache(),
            Arc::new(BuiltinValidators),
            TenantProfile::for_tier(springfield(), TenantTier::Free).with_max_package_bytes(64),
            PipelineConfig::default(),
        );
        let id = pipeline.submit_content(request(quiz("Large"))).await.unwrap();
        let result = pipeline
            .wait_for_result(&springfield(), &id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(result.failure_kind, Some(FailureKind::PackageTooLarge));
        assert!(result.warnings.iter().any(|w| w.contains("limit is 64 bytes")));
    }

    #[tokio::test]
    async fn test_sla_breach_marks_failure() {
        let config = PipelineConfig {
            sla_target: Duration::from_millis(1),
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(SlowValidator(Duration::from_millis(20))), config);
        let id = pipeline.submit_content(request(quiz("Slow"))).await.unwrap();
        let result = pipeline
            .wait_for_result(&springfield(), &id, Duration::from_secs(2))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::SlaExceeded));
        assert!(result.deployment_package.is_some());
    }

    #[tokio::test]
    async fn test_validation_timeout() {
        let config = PipelineConfig {
            validation_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(SlowValidator(Duration::from_millis(200))), config);
        let id = pipeline.submit_content(request(quiz("Slow"))).await.unwrap();
        let result = pipeline
            .wait_for_result(&springfield(), &id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result.failure_kind, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_batch_keeps_every_item() {
        let config = PipelineConfig {
            batch_size: 2,
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(BuiltinValidators), config);
        let requests = vec![
            request(quiz("One")).with_id("one"),
            request(json!("not an object")).with_id("broken"),
            request(quiz("Two")).with_id("two").with_priority(Priority::High),
            ProcessingRequest::new(TenantId::parse("ogdenville").unwrap(), ContentType::Quiz, quiz("x"))
                .with_id("stranger"),
        ];
        let results = pipeline.process_batch(requests).await;

        assert_eq!(results.len(), 4);
        assert!(results["one"].success);
        assert!(results["two"].success);
        assert_eq!(results["broken"].failure_kind, Some(FailureKind::Validation));
        assert_eq!(results["stranger"].failure_kind, Some(FailureKind::InvalidTenant));
    }

    #[tokio::test]
    async fn test_results_are_tenant_scoped_and_cached_by_id() {
        let cache = shared_cache();
        let profile = TenantProfile::for_tier(springfield(), TenantTier::Standard);
        let first = build(cache.clone(), Arc::new(BuiltinValidators), profile.clone(), PipelineConfig::default());
        let id = first.submit_content(request(quiz("Shared"))).await.unwrap();
        first
            .wait_for_result(&springfield(), &id, Duration::from_secs(2))
            .await
            .unwrap();

        let second = build(cache, Arc::new(BuiltinValidators), profile, PipelineConfig::default());
        assert!(second.get_result(&springfield(), &id).await.is_some());
        let other = TenantId::parse("shelbyville").unwrap();
        assert!(first.get_result(&other, &id).await.is_none());
        assert!(second.get_result(&other, &id).await.is_none());
    }

    #[tokio::test]
    async fn test_same_id_in_two_tenants_keeps_both_results() {
        let shelbyville = TenantId::parse("shelbyville").unwrap();
        let cache = shared_cache();
        let validation = ContentValidationQueue::new(
            cache.clone(),
            Arc::new(SlowValidator(Duration::from_millis(30))),
            ValidationConfig::default(),
            Telemetry::disabled(),
        );
        let tenants = Arc::new(TenantProfileRegistry::with_profiles([
            TenantProfile::for_tier(springfield(), TenantTier::Standard),
            TenantProfile::for_tier(shelbyville.clone(), TenantTier::Standard),
        ]));
        let pipeline = ContentProcessingPipeline::new(
            cache,
            validation,
            tenants,
            PipelineConfig::default(),
            Telemetry::disabled(),
        );

        pipeline
            .submit_content(request(quiz("Ours")).with_id("report-1"))
            .await
            .unwrap();
        let theirs = ProcessingRequest::new(shelbyville.clone(), ContentType::Quiz, quiz("Theirs"))
            .with_id("report-1");
        pipeline.submit_content(theirs).await.unwrap();

        let ours = pipeline
            .wait_for_result(&springfield(), "report-1", Duration::from_secs(2))
            .await
            .unwrap();
        let theirs = pipeline
            .wait_for_result(&shelbyville, "report-1", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(ours.success, "{:?}", ours.error);
        assert!(theirs.success, "{:?}", theirs.error);
        assert_eq!(ours.validated_content.unwrap()["title"], "Ours");
        assert_eq!(theirs.validated_content.unwrap()["title"], "Theirs");

        let ours = pipeline.get_result(&springfield(), "report-1").await.unwrap();
        assert_eq!(ours.validated_content.unwrap()["title"], "Ours");
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_rejected() {
        let pipeline = pipeline_with(
            Arc::new(SlowValidator(Duration::from_millis(50))),
            PipelineConfig::default(),
        );
        pipeline
            .submit_content(request(quiz("First")).with_id("req-1"))
            .await
            .unwrap();
        assert_eq!(
            pipeline.submit_content(request(quiz("Second")).with_id("req-1")).await,
            Err(PipelineError::DuplicateId("req-1".into()))
        );

        let first = pipeline
            .wait_for_result(&springfield(), "req-1", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(first.validated_content.unwrap()["title"], "First");
        assert_eq!(pipeline.get_stats().await.total_requests, 1);

        // Finished ids may be reused.
        pipeline
            .submit_content(request(quiz("Second")).with_id("req-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_with_repeated_ids_keeps_every_item() {
        let pipeline = pipeline_with(Arc::new(BuiltinValidators), PipelineConfig::default());
        let requests = vec![
            request(quiz("One")).with_id("dup"),
            request(quiz("Two")).with_id("dup"),
            request(quiz("Three")).with_id("solo"),
        ];
        let results = pipeline.process_batch(requests).await;

        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.success));
        let renamed: Vec<_> = results
            .values()
            .filter(|r| r.id != "dup" && r.id != "solo")
            .collect();
        assert_eq!(renamed.len(), 1);
        assert!(renamed[0].warnings.iter().any(|w| w.contains("duplicate id dup")));
    }

    #[tokio::test]
    async fn test_batch_beside_submission_stays_within_validation_capacity() {
        let pipeline = pipeline_with(
            Arc::new(SlowValidator(Duration::from_millis(30))),
            PipelineConfig::default(),
        );
        let single = pipeline.submit_content(request(quiz("Single"))).await.unwrap();
        let requests = (0..10)
            .map(|i| request(quiz(&format!("Batch {}", i))))
            .collect();
        let results = pipeline.process_batch(requests).await;

        assert_eq!(results.len(), 10);
        for result in results.values() {
            assert!(result.success, "{:?} {:?}", result.failure_kind, result.error);
        }
        let single = pipeline
            .wait_for_result(&springfield(), &single, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(single.success, "{:?} {:?}", single.failure_kind, single.error);
        assert_eq!(pipeline.get_stats().await.active, 0);
    }

    #[tokio::test]
    async fn test_processing_slots_clamped_to_validation_capacity() {
        let config = PipelineConfig {
            max_concurrent_processing: 50,
            batch_size: 50,
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(SlowValidator(Duration::from_millis(20))), config);
        let requests = (0..20)
            .map(|i| request(quiz(&format!("Item {}", i))))
            .collect();
        let results = pipeline.process_batch(requests).await;

        assert_eq!(results.len(), 20);
        assert!(results
            .values()
            .all(|r| r.failure_kind != Some(FailureKind::ValidationCapacity)));
        assert!(results.values().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_and_rejects_new_work() {
        let config = PipelineConfig {
            max_concurrent_processing: 1,
            ..Default::default()
        };
        let pipeline = pipeline_with(Arc::new(SlowValidator(Duration::from_millis(50))), config);
        let active = pipeline.submit_content(request(quiz("a"))).await.unwrap();
        let queued = pipeline.submit_content(request(quiz("b"))).await.unwrap();

        let report = pipeline.shutdown(Duration::from_secs(2)).await;
        assert_eq!(
            report,
            ShutdownReport {
                drained: true,
                remaining_active: 0,
                cancelled: 1
            }
        );

        let tenant = springfield();
        assert!(pipeline.get_result(&tenant, &active).await.unwrap().success);
        assert_eq!(
            pipeline.get_result(&tenant, &queued).await.unwrap().failure_kind,
            Some(FailureKind::ShuttingDown)
        );
        assert_eq!(
            pipeline.submit_content(request(quiz("c"))).await,
            Err(PipelineError::ShuttingDown)
        );
    }

    #[test]
    fn test_class_ttls() {
        let mut metadata = request(quiz("x")).metadata;
        assert_eq!(content_class_ttl(&metadata), Duration::from_secs(3600));
        metadata.content_type = ContentType::Game;
        assert_eq!(content_class_ttl(&metadata), Duration::from_secs(7200));
        metadata.hotfix = true;
        assert_eq!(content_class_ttl(&metadata), Duration::from_secs(300));
    }
}
