//! ChaosEngine CRD types
//!
//! A `ChaosEngine` names a target application, the experiments to run
//! against it and whether the run should be active. The controller owns the
//! status block; the runner pod it spawns writes per-experiment results into
//! `status.experiments`.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{empty_as_none, CleanUpPolicy, EngineState, EngineStatus, ExperimentStatus, RunnerType};

/// Verdict stamped on experiments cut short by a stop or delete
pub const ABORTED_VERDICT: &str = "Stopped";

// =============================================================================
// Spec building blocks
// =============================================================================

/// Target application selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ApplicationParams {
    /// Namespace of the target application
    #[serde(default)]
    pub appns: String,
    /// `key=value` label selecting the target workload
    #[serde(default)]
    pub applabel: String,
    /// Workload kind (deployment, statefulset, daemonset)
    #[serde(default)]
    pub appkind: String,
}

/// One entry of the runner's environment override list
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RunnerEnv {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

/// Runner container configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerInfo {
    /// Runner image; falls back to the operator-wide image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Runner implementation
    #[serde(
        rename = "type",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub runner_type: Option<RunnerType>,

    /// Container command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Container args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Image pull policy; defaults to IfNotPresent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Extra environment, replacing fixed entries with the same name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<RunnerEnv>,
}

/// Components spawned by the engine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ComponentParams {
    /// The chaos runner
    #[serde(default)]
    pub runner: RunnerInfo,
}

/// Annotation stamped on the native runner pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppAnnotations {
    /// Annotation key; nothing is stamped when empty
    #[serde(default)]
    pub app_annotation_name: String,
    /// Annotation value
    #[serde(default)]
    pub app_annotation_value: String,
}

/// A declared experiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ExperimentList {
    /// ChaosExperiment name
    pub name: String,
}

// =============================================================================
// CRD
// =============================================================================

/// A chaos run against a target application
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosEngine",
    plural = "chaosengines",
    namespaced,
    status = "ChaosEngineStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".spec.engineState"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.engineStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineSpec {
    /// Target application
    #[serde(default)]
    pub appinfo: ApplicationParams,

    /// `"true"` or `"false"`; empty uses the operator default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_check: Option<String>,

    /// Declared run state; unset means active
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub engine_state: Option<EngineState>,

    /// Service account the runner runs as
    #[serde(default)]
    pub chaos_service_account: String,

    /// Spawned component configuration
    #[serde(default)]
    pub components: ComponentParams,

    /// Cleanup after graceful completion
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_clean_up_policy: Option<CleanUpPolicy>,

    /// Experiments to run, in order
    #[serde(default)]
    pub experiments: Vec<ExperimentList>,

    /// Extra application info passed to the runner
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auxiliary_app_info: String,

    /// Whether monitoring is requested
    #[serde(default)]
    pub monitoring: bool,

    /// Annotation stamped on the runner pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_annotations: Option<AppAnnotations>,
}

impl ChaosEngineSpec {
    /// Cleanup policy with the retain default applied
    pub fn clean_up_policy(&self) -> CleanUpPolicy {
        self.job_clean_up_policy.unwrap_or_default()
    }

    /// Names of the declared experiments, in order
    pub fn experiment_names(&self) -> Vec<String> {
        self.experiments.iter().map(|e| e.name.clone()).collect()
    }
}

/// Per-experiment result record
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStatuses {
    /// Experiment name
    #[serde(default)]
    pub name: String,
    /// Runner pod name
    #[serde(default)]
    pub runner: String,
    /// Experiment pod name
    #[serde(default)]
    pub experiment_pod: String,
    /// Execution status
    #[serde(default)]
    pub status: ExperimentStatus,
    /// Verdict string reported by the runner
    #[serde(default)]
    pub verdict: String,
    /// Last time the record changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

/// Status of a ChaosEngine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineStatus {
    /// Lifecycle status; unset until the first reconciliation
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub engine_status: Option<EngineStatus>,

    /// Per-experiment results
    #[serde(default)]
    pub experiments: Vec<ExperimentStatuses>,
}

impl ChaosEngineStatus {
    /// Mark every running or waiting experiment as aborted
    ///
    /// Aborted experiments keep the `Stopped` verdict; already-finished ones
    /// are left alone. Returns how many records changed.
    pub fn abort_active_experiments(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for exp in self.experiments.iter_mut().filter(|e| e.status.is_active()) {
            exp.status = ExperimentStatus::Aborted;
            exp.verdict = ABORTED_VERDICT.to_string();
            exp.last_update_time = Some(now);
            changed += 1;
        }
        changed
    }
}

// =============================================================================
// Tests
// =============================================================================
