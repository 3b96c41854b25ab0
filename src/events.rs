//! Kubernetes Event recording for the chaos operator
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Reporting component shown on every Event this operator emits
pub const REPORTING_COMPONENT: &str = "chaos-operator";

/// Sink for Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`
    ///
    /// Never fails; implementations log and swallow their own errors.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `component`
    pub fn new(client: Client, component: &str) -> Self {
        let reporter = Reporter {
            controller: component.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish event");
        }
    }
}

/// Publisher that drops everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Finalizer attached and status initialized
    pub const ENGINE_INITIALIZED: &str = "ChaosEngineInitialized";
    /// Runner finished on its own
    pub const ENGINE_COMPLETED: &str = "ChaosEngineCompleted";
    /// Owned resources removed and finalizer released
    pub const ENGINE_STOPPED: &str = "ChaosEngineStopped";
    /// A finished or stopped engine was re-activated
    pub const RESTART_IN_PROGRESS: &str = "RestartInProgress";
    /// Gate, validation or cleanup failure
    pub const RESOURCES_OPERATION_FAILED: &str = "ChaosResourcesOperationFailed";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    /// Standard reconciliation
    pub const RECONCILE: &str = "Reconcile";
    /// Creating the runner
    pub const CREATE: &str = "Create";
    /// Tearing down owned resources
    pub const DELETE: &str = "Delete";
    /// Re-running a finished engine
    pub const RESTART: &str = "Restart";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[test]
    fn reasons_match_what_dashboards_filter_on() {
        assert_eq!(reasons::ENGINE_INITIALIZED, "ChaosEngineInitialized");
        assert_eq!(reasons::RESOURCES_OPERATION_FAILED, "ChaosResourcesOperationFailed");
    }

    #[tokio::test]
    async fn noop_publisher_accepts_anything() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::RESTART_IN_PROGRESS,
                actions::RESTART,
                Some("re-running".to_string()),
            )
            .await;
    }
}
