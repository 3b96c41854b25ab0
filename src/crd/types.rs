//! Shared enums for the ChaosEngine CRD
//!
//! Wire values follow the strings the chaos runner and existing manifests
//! already use. Enums that arrive as free-form strings in the spec
//! (`annotationCheck`, `appkind`) are parsed at reconcile time so a bad value
//! surfaces as a validation error instead of a watch failure.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Error;

// =============================================================================
// Declared state and observed status
// =============================================================================

/// User intent for an engine run
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Run (or re-run) the declared experiments
    #[default]
    Active,
    /// Stop the run, aborting it if it has not completed
    Stop,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

impl FromStr for EngineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "stop" => Ok(Self::Stop),
            other => Err(format!("unknown engineState '{other}'")),
        }
    }
}

/// Controller's record of where the engine is in its lifecycle
///
/// There is no explicit running value: an initialized engine whose runner
/// exists is running.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Guard attached, runner may be created
    Initialized,
    /// Runner finished on its own
    Completed,
    /// Run was aborted or the engine was deleted
    Stopped,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for EngineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "completed" => Ok(Self::Completed),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown engineStatus '{other}'")),
        }
    }
}

/// Per-experiment status as written by the runner
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExperimentStatus {
    /// Runner has not created the experiment job yet
    #[default]
    #[serde(rename = "Waiting for Job Creation")]
    Waiting,
    /// Experiment job is running
    #[serde(rename = "Running")]
    Running,
    /// Experiment job finished
    #[serde(rename = "Completed")]
    Completed,
    /// The ChaosExperiment resource could not be found
    #[serde(rename = "ChaosExperiment Not Found")]
    NotFound,
    /// Experiment was cut short by a stop or delete
    #[serde(rename = "Forcefully Aborted")]
    Aborted,
}

impl ExperimentStatus {
    /// Whether a stop must abort this experiment
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }
}

// =============================================================================
// Spec enums
// =============================================================================

/// What happens to spawned pods after a run completes on its own
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CleanUpPolicy {
    /// Delete owned pods after graceful completion
    Delete,
    /// Leave owned pods in place
    #[default]
    Retain,
}

impl FromStr for CleanUpPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(Self::Delete),
            "retain" => Ok(Self::Retain),
            other => Err(format!("unknown jobCleanUpPolicy '{other}'")),
        }
    }
}

/// Runner implementation used to execute the experiments
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunnerType {
    /// Native runner binary
    #[default]
    Go,
    /// Script-driven runner invoking an ansible playbook
    Ansible,
}

impl FromStr for RunnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" => Ok(Self::Go),
            "ansible" => Ok(Self::Ansible),
            other => Err(format!("unknown runner type '{other}'")),
        }
    }
}

/// Whether the target application must opt in to chaos via annotation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationCheck {
    /// Target must carry the chaos annotation
    Enabled,
    /// No opt-in required
    Disabled,
}

impl AnnotationCheck {
    /// Resolve the spec value, falling back to the operator default when unset
    pub fn resolve(value: Option<&str>, default: AnnotationCheck) -> Result<Self, Error> {
        match value {
            None | Some("") => Ok(default),
            Some(v) => v.parse().map_err(|_| {
                Error::validation(format!(
                    "annotationCheck '{v}' is not supported, it should be true or false"
                ))
            }),
        }
    }

    /// Whether the gate must run
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl FromStr for AnnotationCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(Self::Enabled),
            "false" => Ok(Self::Disabled),
            other => Err(format!("annotationCheck '{other}' must be true or false")),
        }
    }
}

impl fmt::Display for AnnotationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "true"),
            Self::Disabled => write!(f, "false"),
        }
    }
}

/// Workload kinds the annotation gate knows how to inspect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
    /// apps/v1 DaemonSet
    DaemonSet,
}

impl FromStr for AppKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deployment" | "deployments" => Ok(Self::Deployment),
            "statefulset" | "statefulsets" => Ok(Self::StatefulSet),
            "daemonset" | "daemonsets" => Ok(Self::DaemonSet),
            _ => Err(Error::UnsupportedResourceType {
                kind: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::StatefulSet => write!(f, "statefulset"),
            Self::DaemonSet => write!(f, "daemonset"),
        }
    }
}

/// Deserialize an optional enum, treating an empty string as unset
///
/// Existing manifests commonly carry `engineState: ""`.
pub(crate) fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
