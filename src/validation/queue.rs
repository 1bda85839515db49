//! Content Validation Queue
//!
//! Bounded-concurrency structural validation with a content-hash dedup
//! cache. Jobs over capacity are rejected, never queued. Each job runs on
//! its own task; callers wait on a per-job watch channel. Job ids are
//! scoped to the submitting tenant.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheCluster, SetOptions, TenantCache};
use crate::content::{content_hash, ContentType, Priority};
use crate::error::ValidationError;
use crate::telemetry::Telemetry;
use crate::tenant::TenantId;
use crate::validation::health::{next_state, HealthSample, HealthState, HealthThresholds};
use crate::validation::sanitize::{sanitize, SanitizeLimits};
use crate::validation::validators::StructuralValidator;

/// Outcomes kept for error rate and average time.
const OUTCOME_WINDOW: usize = 100;

// == Config ==
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_concurrent_validations: usize,
    /// TTL of cached results keyed by content hash
    pub result_ttl: Duration,
    /// How long terminal job records stay readable
    pub retention: Duration,
    pub limits: SanitizeLimits,
    pub thresholds: HealthThresholds,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: 10,
            result_ttl: Duration::from_secs(3600),
            retention: Duration::from_secs(600),
            limits: SanitizeLimits::default(),
            thresholds: HealthThresholds::default(),
        }
    }
}

// == Job Types ==
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationJob {
    pub id: String,
    pub tenant_id: TenantId,
    pub content: Value,
    pub content_type: ContentType,
    #[serde(default)]
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
}

impl ValidationJob {
    pub fn new(tenant_id: TenantId, content_type: ContentType, content: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            content,
            content_type,
            priority: Priority::default(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Structural verdict plus the sanitized payload. Invalid content is a
/// completed result with `is_valid == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sanitized_content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: u64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub state: HealthState,
    pub in_flight: usize,
    pub capacity: usize,
    pub occupancy: f64,
    pub average_processing_ms: f64,
    pub error_rate: f64,
    pub retained_jobs: usize,
    pub cache_hits: u64,
}

// == Internal State ==
type JobKey = (TenantId, String);

fn job_key(tenant: &TenantId, id: &str) -> JobKey {
    (tenant.clone(), id.to_string())
}

struct JobRecord {
    status: JobStatus,
    response: Option<ValidationResponse>,
    updates: watch::Sender<Option<ValidationResponse>>,
    finished_at: Option<Instant>,
}

struct Outcome {
    elapsed: Duration,
    failed: bool,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobKey, JobRecord>,
    in_flight: usize,
    outcomes: VecDeque<Outcome>,
    health: HealthState,
    cache_hits: u64,
}

impl QueueState {
    fn sample(&self, capacity: usize) -> HealthSample {
        let count = self.outcomes.len();
        let (total, failed) = self
            .outcomes
            .iter()
            .fold((Duration::ZERO, 0usize), |(total, failed), o| {
                (total + o.elapsed, failed + o.failed as usize)
            });
        HealthSample {
            occupancy: self.in_flight as f64 / capacity.max(1) as f64,
            average_processing: if count == 0 {
                Duration::ZERO
            } else {
                total / count as u32
            },
            error_rate: if count == 0 {
                0.0
            } else {
                failed as f64 / count as f64
            },
        }
    }
}

struct Inner {
    cache: Arc<CacheCluster>,
    validator: Arc<dyn StructuralValidator>,
    config: ValidationConfig,
    telemetry: Telemetry,
    state: Mutex<QueueState>,
}

// == Content Validation Queue ==
#[derive(Clone)]
pub struct ContentValidationQueue {
    inner: Arc<Inner>,
}

impl ContentValidationQueue {
    pub fn new(
        cache: Arc<CacheCluster>,
        validator: Arc<dyn StructuralValidator>,
        config: ValidationConfig,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                validator,
                config,
                telemetry,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Accepts a job for background validation and returns its id.
    pub async fn submit(&self, job: ValidationJob) -> Result<String, ValidationError> {
        let (id, _) = self.enqueue(job).await?;
        Ok(id)
    }

    /// Submits `job` and waits up to `timeout` for its terminal response.
    ///
    /// A timed-out job keeps running and still fills the dedup cache.
    pub async fn validate(
        &self,
        job: ValidationJob,
        timeout: Duration,
    ) -> Result<ValidationResponse, ValidationError> {
        let (id, mut updates) = self.enqueue(job).await?;

        let wait = async {
            updates
                .wait_for(Option::is_some)
                .await
                .map(|response| response.clone())
                .map_err(|_| ValidationError::UnknownJob(id.clone()))
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(Some(response))) => Ok(response),
            Ok(Ok(None)) => Err(ValidationError::UnknownJob(id)),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                self.inner.telemetry.counter("validation.timeout", 1, Vec::new());
                Err(ValidationError::TimeoutExceeded {
                    job_id: id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn enqueue(
        &self,
        job: ValidationJob,
    ) -> Result<(String, watch::Receiver<Option<ValidationResponse>>), ValidationError> {
        let limit = self.inner.config.max_concurrent_validations;
        let receiver = {
            let mut state = self.inner.state.lock().await;
            let key = job_key(&job.tenant_id, &job.id);
            if let Some(existing) = state.jobs.get(&key) {
                if !existing.status.is_terminal() {
                    return Err(ValidationError::AlreadyInFlight(job.id));
                }
            }
            if state.in_flight >= limit {
                self.inner
                    .telemetry
                    .counter("validation.rejected", 1, Vec::new());
                return Err(ValidationError::CapacityExceeded {
                    in_flight: state.in_flight,
                    limit,
                });
            }

            let (updates, receiver) = watch::channel(None);
            state.jobs.insert(
                key,
                JobRecord {
                    status: JobStatus::Pending,
                    response: None,
                    updates,
                    finished_at: None,
                },
            );
            state.in_flight += 1;
            receiver
        };

        let id = job.id.clone();
        debug!(job_id = %id, tenant = %job.tenant_id, content_type = %job.content_type, "Validation job accepted");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run(job).await;
        });
        Ok((id, receiver))
    }

    /// Terminal response for `tenant`'s job `id`; `None` while pending or
    /// unknown.
    pub async fn get_result(&self, tenant: &TenantId, id: &str) -> Option<ValidationResponse> {
        let state = self.inner.state.lock().await;
        state
            .jobs
            .get(&job_key(tenant, id))
            .and_then(|record| record.response.clone())
    }

    pub async fn status(&self, tenant: &TenantId, id: &str) -> Option<JobStatus> {
        let state = self.inner.state.lock().await;
        state.jobs.get(&job_key(tenant, id)).map(|record| record.status)
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.state.lock().await.in_flight
    }

    /// Maximum number of jobs validated at once.
    pub fn capacity(&self) -> usize {
        self.inner.config.max_concurrent_validations
    }

    /// Re-evaluates health and prunes expired job records.
    pub async fn health_tick(&self) -> HealthState {
        let config = &self.inner.config;
        let mut state = self.inner.state.lock().await;

        let retention = config.retention;
        let before = state.jobs.len();
        state.jobs.retain(|_, record| {
            record
                .finished_at
                .map_or(true, |finished| finished.elapsed() < retention)
        });
        let pruned = before - state.jobs.len();

        let sample = state.sample(config.max_concurrent_validations);
        let previous = state.health;
        let current = next_state(previous, &sample, &config.thresholds);
        state.health = current;

        if current != previous {
            match current {
                HealthState::Healthy => {
                    info!(?previous, ?current, ?sample, "Validation queue recovered")
                }
                _ => warn!(?previous, ?current, ?sample, "Validation queue health changed"),
            }
        }
        if pruned > 0 {
            debug!(pruned, "Pruned finished validation jobs");
        }
        current
    }

    pub async fn health(&self) -> QueueHealth {
        let capacity = self.inner.config.max_concurrent_validations;
        let state = self.inner.state.lock().await;
        let sample = state.sample(capacity);
        QueueHealth {
            state: state.health,
            in_flight: state.in_flight,
            capacity,
            occupancy: sample.occupancy,
            average_processing_ms: sample.average_processing.as_secs_f64() * 1000.0,
            error_rate: sample.error_rate,
            retained_jobs: state.jobs.len(),
            cache_hits: state.cache_hits,
        }
    }
}

impl Inner {
    async fn run(&self, job: ValidationJob) {
        let started = Instant::now();
        let key = job_key(&job.tenant_id, &job.id);
        self.set_status(&key, JobStatus::Processing).await;

        let cache = TenantCache::new(self.cache.clone(), &job.tenant_id);
        let result_key = format!("validation:result:{}", content_hash(job.content_type, &job.content));

        let (outcome, cache_hit) = match cache.get_json::<ValidationResult>(&result_key).await {
            Some(cached) => (Ok(cached), true),
            None => {
                let outcome = self.check(&job).await;
                if let Ok(result) = &outcome {
                    let options = SetOptions::ttl(self.config.result_ttl).with_tags(["validation"]);
                    cache.set_json(&result_key, result, options).await;
                }
                (outcome, false)
            }
        };

        let elapsed = started.elapsed();
        let tags = vec![("content_type", job.content_type.to_string())];
        self.telemetry.timing("validation.duration", elapsed, tags.clone());

        let response = match outcome {
            Ok(result) => {
                if !result.is_valid {
                    self.telemetry.counter("validation.invalid", 1, tags);
                }
                ValidationResponse {
                    job_id: job.id.clone(),
                    status: JobStatus::Completed,
                    result: Some(result),
                    error: None,
                    processing_time_ms: elapsed.as_millis() as u64,
                    cache_hit,
                }
            }
            Err(err) => {
                warn!(job_id = %job.id, tenant = %job.tenant_id, error = %err, "Validation failed");
                self.telemetry.error("validation.failed", err.to_string());
                ValidationResponse {
                    job_id: job.id.clone(),
                    status: JobStatus::Failed,
                    result: None,
                    error: Some(err.to_string()),
                    processing_time_ms: elapsed.as_millis() as u64,
                    cache_hit: false,
                }
            }
        };

        self.finish(&key, response, elapsed).await;
    }

    async fn check(&self, job: &ValidationJob) -> Result<ValidationResult, ValidationError> {
        let report = self
            .validator
            .validate(job.content_type, &job.content)
            .await?;
        let sanitized = sanitize(&job.content, &self.config.limits);

        let mut warnings = report.warnings;
        warnings.extend(sanitized.warnings);
        Ok(ValidationResult {
            is_valid: report.errors.is_empty(),
            errors: report.errors,
            warnings,
            sanitized_content: sanitized.content,
        })
    }

    async fn set_status(&self, key: &JobKey, status: JobStatus) {
        if let Some(record) = self.state.lock().await.jobs.get_mut(key) {
            record.status = status;
        }
    }

    async fn finish(&self, key: &JobKey, response: ValidationResponse, elapsed: Duration) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        if response.cache_hit {
            state.cache_hits += 1;
        }
        if state.outcomes.len() == OUTCOME_WINDOW {
            state.outcomes.pop_front();
        }
        state.outcomes.push_back(Outcome {
            elapsed,
            failed: response.status == JobStatus::Failed,
        });

        if let Some(record) = state.jobs.get_mut(key) {
            record.status = response.status;
            record.finished_at = Some(Instant::now());
            record.response = Some(response.clone());
            // Nobody may be waiting; a closed channel is fine.
            let _ = record.updates.send(Some(response));
        }
    }
}
