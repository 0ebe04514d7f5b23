//! Status aggregation
//!
//! The status is recomputed from scratch every pass from the observed
//! workload and the spec. Nothing is carried over from the previous status
//! except the Ready condition's transition time when its status is unchanged.

use k8s_openapi::api::apps::v1::Deployment;

use crate::crd::{Condition, ConditionStatus, Directus, DirectusPhase, DirectusStatus};
use crate::resources::selector_string;
use crate::Error;

/// Condition type reported on every Directus
pub const READY_CONDITION: &str = "Ready";

/// Message used when every desired replica is ready
pub const ALL_READY_MESSAGE: &str = "All replicas are ready";

fn ready_condition(phase: DirectusPhase) -> Condition {
    match phase {
        DirectusPhase::Running => Condition::new(
            READY_CONDITION,
            ConditionStatus::True,
            "Ready",
            "Directus is running",
        ),
        _ => Condition::new(
            READY_CONDITION,
            ConditionStatus::Unknown,
            "Reconciling",
            "Reconciling Directus resources",
        ),
    }
}

/// Derive the status of `directus` from the result of fetching its workload
///
/// `directus` must already be defaulted; its replica count is the desired
/// count the workload is compared against.
pub fn aggregate_status(
    directus: &Directus,
    workload: Result<Option<Deployment>, Error>,
) -> DirectusStatus {
    let desired = directus.spec.replica_count;

    let (mut status, replicas, ready) = match workload {
        Err(e) => (
            DirectusStatus::with_phase(DirectusPhase::Failed)
                .message(format!("Failed to get deployment: {e}")),
            0,
            0,
        ),
        Ok(None) => (
            DirectusStatus::with_phase(DirectusPhase::Failed)
                .message("Failed to get deployment: not found"),
            0,
            0,
        ),
        Ok(Some(deployment)) => {
            let observed = deployment.status.unwrap_or_default();
            let replicas = observed.replicas.unwrap_or(0);
            let ready = observed.ready_replicas.unwrap_or(0);
            let status = if ready == desired {
                DirectusStatus::with_phase(DirectusPhase::Running).message(ALL_READY_MESSAGE)
            } else {
                DirectusStatus::with_phase(DirectusPhase::Pending)
                    .message(format!("Waiting for replicas: {ready}/{desired} ready"))
            };
            (status, replicas, ready)
        }
    };

    let previous = directus
        .status
        .as_ref()
        .and_then(|s| s.get_condition(READY_CONDITION));
    let phase = status.phase;
    status = status.condition(ready_condition(phase).carry_transition_time(previous));

    status.replicas = replicas;
    status.ready_replicas = ready;
    status.selector = Some(selector_string(directus));
    status.database_ready = true;
    status.redis_ready = directus.spec.redis.enabled;
    status.ingress_ready = directus.spec.ingress.enabled;
    status
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use kube::error::ErrorResponse;

    use super::*;
    use crate::crd::{DirectusSpec, IngressSpec, RedisSpec};
    use crate::resources::fixtures::directus;

    fn workload(replicas: i32, ready: i32) -> Result<Option<Deployment>, Error> {
        Ok(Some(Deployment {
            status: Some(DeploymentStatus {
                replicas: Some(replicas),
                ready_replicas: Some(ready),
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    fn scaled(replicas: i32) -> Directus {
        directus(
            "blog",
            DirectusSpec {
                replica_count: replicas,
                ..Default::default()
            },
        )
    }

    // =========================================================================
    // Phase Stories
    // =========================================================================

    /// Story: all desired replicas ready means Running and Ready=True
    #[test]
    fn story_ready_workload_is_running() {
        let status = aggregate_status(&scaled(3), workload(3, 3));

        assert_eq!(status.phase, DirectusPhase::Running);
        assert_eq!(status.message.as_deref(), Some(ALL_READY_MESSAGE));
        assert_eq!((status.replicas, status.ready_replicas), (3, 3));

        let ready = status.get_condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.reason, "Ready");
    }

    /// Story: partially ready workload stays Pending with a progress message
    #[test]
    fn story_partial_workload_is_pending() {
        let status = aggregate_status(&scaled(3), workload(3, 1));

        assert_eq!(status.phase, DirectusPhase::Pending);
        assert_eq!(
            status.message.as_deref(),
            Some("Waiting for replicas: 1/3 ready")
        );
        let ready = status.get_condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::Unknown);
        assert_eq!(ready.reason, "Reconciling");
    }

    /// Story: a workload that cannot be read marks the Directus Failed
    #[test]
    fn story_fetch_failure_is_failed() {
        let err = Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }));
        let status = aggregate_status(&scaled(1), Err(err));

        assert_eq!(status.phase, DirectusPhase::Failed);
        assert!(status.message.as_deref().unwrap().contains("forbidden"));
        assert_eq!(
            status.get_condition(READY_CONDITION).unwrap().status,
            ConditionStatus::Unknown
        );
    }

    #[test]
    fn missing_workload_is_failed() {
        let status = aggregate_status(&scaled(1), Ok(None));
        assert_eq!(status.phase, DirectusPhase::Failed);
        assert_eq!(status.replicas, 0);
    }

    #[test]
    fn phase_law_holds_across_counts() {
        for desired in 1..=4 {
            for ready in 0..=4 {
                let status = aggregate_status(&scaled(desired), workload(desired, ready));
                let expected = if ready == desired {
                    DirectusPhase::Running
                } else {
                    DirectusPhase::Pending
                };
                assert_eq!(status.phase, expected, "desired={desired} ready={ready}");
            }
        }
    }

    #[test]
    fn readiness_flags_mirror_enablement() {
        let d = directus(
            "blog",
            DirectusSpec {
                redis: RedisSpec {
                    enabled: true,
                    ..Default::default()
                },
                ingress: IngressSpec {
                    enabled: false,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let status = aggregate_status(&d, workload(1, 1));

        assert!(status.database_ready);
        assert!(status.redis_ready);
        assert!(!status.ingress_ready);
        assert_eq!(status.selector, Some(selector_string(&d)));
    }

    /// Story: a steady Ready condition keeps its original transition time
    #[test]
    fn story_transition_time_survives_steady_state() {
        let mut d = scaled(1);
        let first = aggregate_status(&d, workload(1, 1));
        let mut earlier = first.clone();
        earlier.conditions[0].last_transition_time = Utc::now() - Duration::hours(1);
        d.status = Some(earlier.clone());

        let steady = aggregate_status(&d, workload(1, 1));
        assert_eq!(
            steady.conditions[0].last_transition_time,
            earlier.conditions[0].last_transition_time
        );
        assert_eq!(steady, earlier);

        let regressed = aggregate_status(&d, workload(1, 0));
        assert_ne!(
            regressed.conditions[0].last_transition_time,
            earlier.conditions[0].last_transition_time
        );
    }
}
