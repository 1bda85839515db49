//! Validation queue health state machine.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub degraded_occupancy: f64,
    pub slow_processing: Duration,
    pub degraded_error_rate: f64,
    pub unhealthy_error_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_occupancy: 0.9,
            slow_processing: Duration::from_secs(5),
            degraded_error_rate: 0.10,
            unhealthy_error_rate: 0.25,
        }
    }
}

/// Load observed at one health tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSample {
    /// In-flight jobs over capacity, 0.0..=1.0
    pub occupancy: f64,
    pub average_processing: Duration,
    pub error_rate: f64,
}

impl HealthSample {
    fn degraded(&self, thresholds: &HealthThresholds) -> bool {
        self.occupancy > thresholds.degraded_occupancy
            || self.average_processing > thresholds.slow_processing
            || self.error_rate > thresholds.degraded_error_rate
    }

    fn unhealthy(&self, thresholds: &HealthThresholds) -> bool {
        self.occupancy >= 1.0 || self.error_rate > thresholds.unhealthy_error_rate
    }
}

/// Next state after one tick. Healthy only steps down to degraded; the
/// unhealthy state is reachable from degraded.
pub fn next_state(
    current: HealthState,
    sample: &HealthSample,
    thresholds: &HealthThresholds,
) -> HealthState {
    let degraded = sample.degraded(thresholds);
    let unhealthy = sample.unhealthy(thresholds);

    match current {
        HealthState::Healthy if degraded => HealthState::Degraded,
        HealthState::Healthy => HealthState::Healthy,
        _ if unhealthy => HealthState::Unhealthy,
        _ if degraded => HealthState::Degraded,
        _ => HealthState::Healthy,
    }
}
