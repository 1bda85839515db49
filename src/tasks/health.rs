//! Health tick: probes cache nodes and re-evaluates validation queue health.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cache::CacheCluster;
use crate::validation::ContentValidationQueue;

pub fn spawn_health_task(
    clusters: Vec<Arc<CacheCluster>>,
    validation: ContentValidationQueue,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "Starting health task");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            for cluster in &clusters {
                let health = cluster.health_check().await;
                if !health.healthy {
                    let down = health.nodes.iter().filter(|n| !n.healthy).count();
                    warn!(cluster = cluster.name(), down, "Cache cluster degraded");
                }
            }
            validation.health_tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::cache::PolicySet;
    use crate::content::ContentType;
    use crate::telemetry::Telemetry;
    use crate::tenant::TenantId;
    use crate::validation::{
        BuiltinValidators, HealthState, ValidationConfig, ValidationJob,
    };

    #[tokio::test]
    async fn test_health_task_prunes_finished_jobs() {
        let cache = Arc::new(CacheCluster::in_memory(
            "results",
            1,
            100,
            PolicySet::new(Duration::from_secs(60)),
        ));
        let config = ValidationConfig {
            retention: Duration::from_millis(20),
            ..Default::default()
        };
        let validation = ContentValidationQueue::new(
            cache.clone(),
            Arc::new(BuiltinValidators),
            config,
            Telemetry::disabled(),
        );
        let tenant = TenantId::parse("springfield").unwrap();
        let job = ValidationJob::new(
            tenant.clone(),
            ContentType::Scene,
            json!({"id": "lobby", "elements": []}),
        )
        .with_id("lobby");
        validation.validate(job, Duration::from_secs(1)).await.unwrap();

        let handle = spawn_health_task(vec![cache], validation.clone(), Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        assert!(validation.get_result(&tenant, "lobby").await.is_none());
        assert_eq!(validation.health().await.state, HealthState::Healthy);
    }
}
