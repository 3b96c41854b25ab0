//! Side effects on resources owned by a ChaosEngine
//!
//! Owned resources are found only through the `app`/`chaosUID` label pair,
//! never through stored references.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::kube_client::{ChildKind, EngineKubeClient};
use crate::crd::ChaosEngine;
use crate::Error;

/// Finalizer guarding engine removal until owned resources are gone
pub const ENGINE_FINALIZER: &str = "chaosengine.litmuschaos.io/finalizer";

/// Label carrying the owning engine's name
pub const APP_LABEL: &str = "app";

/// Label carrying the owning engine's UID
pub const CHAOS_UID_LABEL: &str = "chaosUID";

/// Ownership labels stamped on every resource an engine creates
pub fn owner_labels(engine_name: &str, engine_uid: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), engine_name.to_string()),
        (CHAOS_UID_LABEL.to_string(), engine_uid.to_string()),
    ])
}

/// Selector for graceful cleanup: both ownership labels
pub fn graceful_selector(engine_name: &str, engine_uid: &str) -> String {
    format!("{APP_LABEL}={engine_name},{CHAOS_UID_LABEL}={engine_uid}")
}

/// Selector for forced cleanup: the run UID alone
pub fn force_selector(engine_uid: &str) -> String {
    format!("{CHAOS_UID_LABEL}={engine_uid}")
}

/// Check if the engine carries our finalizer
pub fn has_finalizer(engine: &ChaosEngine) -> bool {
    engine.finalizers().iter().any(|f| f == ENGINE_FINALIZER)
}

/// Add our finalizer to the in-memory engine; returns whether it changed
pub fn add_finalizer(engine: &mut ChaosEngine) -> bool {
    if has_finalizer(engine) {
        return false;
    }
    engine.finalizers_mut().push(ENGINE_FINALIZER.to_string());
    true
}

/// Remove our finalizer from the in-memory engine; returns whether it changed
pub fn remove_finalizer(engine: &mut ChaosEngine) -> bool {
    if !has_finalizer(engine) {
        return false;
    }
    engine.finalizers_mut().retain(|f| f != ENGINE_FINALIZER);
    true
}

/// Result of [`ensure_present`]
#[derive(Clone, Debug, PartialEq)]
pub enum Presence {
    /// We created the pod
    Created,
    /// A concurrent reconciliation created it between our read and create
    CreatedElsewhere,
    /// The pod was already there and was left untouched
    Existing(Box<Pod>),
}

/// Create `pod` unless a pod with its name already exists
///
/// An existing pod is never patched. Losing a create race is success.
pub async fn ensure_present(client: &dyn EngineKubeClient, pod: &Pod) -> Result<Presence, Error> {
    let name = pod.name_any();
    let namespace = pod.namespace().unwrap_or_default();

    if let Some(existing) = client.get_pod(&namespace, &name).await? {
        debug!(pod = %name, namespace = %namespace, "pod already exists, skipping create");
        return Ok(Presence::Existing(Box::new(existing)));
    }

    match client.create_pod(pod).await {
        Ok(()) => {
            info!(pod = %name, namespace = %namespace, "created pod");
            Ok(Presence::Created)
        }
        Err(Error::AlreadyExists { .. }) => {
            debug!(pod = %name, namespace = %namespace, "pod created concurrently");
            Ok(Presence::CreatedElsewhere)
        }
        Err(e) => Err(e),
    }
}

/// Delete owned pods one at a time; the first failure aborts
///
/// Returns how many pods were deleted. Remaining pods still match the
/// selector, so a retry picks up where this left off.
pub async fn graceful_delete_pods(
    client: &dyn EngineKubeClient,
    namespace: &str,
    engine_name: &str,
    engine_uid: &str,
) -> Result<usize, Error> {
    let selector = graceful_selector(engine_name, engine_uid);
    let pods = client.list_pods(namespace, &selector).await?;
    for pod in &pods {
        client.delete_pod(namespace, &pod.name_any()).await?;
    }
    info!(engine = %engine_name, namespace = %namespace, count = pods.len(), "deleted chaos pods");
    Ok(pods.len())
}

/// Bulk delete everything carrying the run UID, across every owned kind
///
/// Every kind is attempted; failures are collected into
/// [`Error::PartialCleanup`].
pub async fn force_delete_owned(
    client: &dyn EngineKubeClient,
    namespace: &str,
    engine_uid: &str,
) -> Result<(), Error> {
    let selector = force_selector(engine_uid);
    let params = DeleteParams {
        grace_period_seconds: Some(0),
        ..DeleteParams::background()
    };

    let mut failed_kinds = Vec::new();
    let mut failures = Vec::new();
    for kind in ChildKind::ALL {
        if let Err(e) = client.delete_all_of(kind, namespace, &selector, &params).await {
            warn!(kind = %kind, namespace = %namespace, error = %e, "bulk delete failed");
            failed_kinds.push(kind.to_string());
            failures.push(e);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::PartialCleanup {
            failed_kinds,
            failures,
        })
    }
}
