//! Target application info derived from a ChaosEngine
//!
//! Computed fresh on every reconciliation and threaded explicitly through the
//! gate and the runner builder. Nothing here is persisted.

use kube::ResourceExt;
use tracing::debug;

use crate::crd::ChaosEngine;
use crate::Error;

/// What the engine targets, plus the candidate the annotation gate picked
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicationInfo {
    /// Namespace of the target application
    pub namespace: String,
    /// Selector label key
    pub label_key: String,
    /// Selector label value
    pub label_value: String,
    /// Application kind as written in the spec
    pub kind: String,
    /// Declared experiment names, in order
    pub experiments: Vec<String>,
    /// Service account for the runner
    pub service_account: String,
    /// Name of the annotated workload, set by the gate
    pub app_name: String,
    /// UID of the annotated workload, set by the gate
    pub app_uid: String,
}

impl ApplicationInfo {
    /// Derive application info from the engine spec
    ///
    /// Fails when `appinfo.applabel` is not a single `key=value` pair.
    pub fn from_engine(engine: &ChaosEngine) -> Result<Self, Error> {
        let appinfo = &engine.spec.appinfo;
        let (label_key, label_value) = parse_label(&appinfo.applabel).ok_or_else(|| {
            Error::validation_for_field(
                engine.name_any(),
                "spec.appinfo.applabel",
                format!(
                    "applabel '{}' must be of the form key=value",
                    appinfo.applabel
                ),
            )
        })?;

        let info = Self {
            namespace: appinfo.appns.clone(),
            label_key,
            label_value,
            kind: appinfo.appkind.clone(),
            experiments: engine.spec.experiment_names(),
            service_account: engine.spec.chaos_service_account.clone(),
            app_name: String::new(),
            app_uid: String::new(),
        };

        debug!(
            engine = %engine.name_any(),
            label = %info.selector(),
            app_namespace = %info.namespace,
            experiments = ?info.experiments,
            monitoring = engine.spec.monitoring,
            "derived application info"
        );
        Ok(info)
    }

    /// Label selector string for the target workload
    pub fn selector(&self) -> String {
        format!("{}={}", self.label_key, self.label_value)
    }

    /// Record the workload the gate selected
    pub fn set_candidate(&mut self, name: impl Into<String>, uid: impl Into<String>) {
        self.app_name = name.into();
        self.app_uid = uid.into();
    }
}

fn parse_label(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.trim().split_once('=')?;
    if key.is_empty() || value.is_empty() || value.contains('=') {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ApplicationParams, ChaosEngineSpec, ExperimentList};

    fn engine_with_label(label: &str) -> ChaosEngine {
        let mut engine = ChaosEngine::new(
            "nginx-chaos",
            ChaosEngineSpec {
                appinfo: ApplicationParams {
                    appns: "shop".to_string(),
                    applabel: label.to_string(),
                    appkind: "deployment".to_string(),
                },
                chaos_service_account: "nginx-sa".to_string(),
                experiments: vec![
                    ExperimentList {
                        name: "pod-delete".to_string(),
                    },
                    ExperimentList {
                        name: "cpu-hog".to_string(),
                    },
                ],
                ..Default::default()
            },
        );
        engine.metadata.namespace = Some("litmus".to_string());
        engine
    }

    #[test]
    fn derives_selector_and_experiments() {
        let info = ApplicationInfo::from_engine(&engine_with_label("app=nginx")).unwrap();
        assert_eq!(info.label_key, "app");
        assert_eq!(info.label_value, "nginx");
        assert_eq!(info.selector(), "app=nginx");
        assert_eq!(info.namespace, "shop");
        assert_eq!(info.experiments, vec!["pod-delete", "cpu-hog"]);
        assert_eq!(info.service_account, "nginx-sa");
        assert!(info.app_uid.is_empty());
    }

    #[test]
    fn malformed_labels_are_validation_errors() {
        for label in ["", "app", "=nginx", "app=", "a=b=c"] {
            let err = ApplicationInfo::from_engine(&engine_with_label(label)).unwrap_err();
            match err {
                Error::Validation { engine, field, .. } => {
                    assert_eq!(engine, "nginx-chaos");
                    assert_eq!(field.as_deref(), Some("spec.appinfo.applabel"));
                }
                other => panic!("expected validation error for {label:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn candidate_is_recorded() {
        let mut info = ApplicationInfo::from_engine(&engine_with_label("app=nginx")).unwrap();
        info.set_candidate("nginx", "1234-abcd");
        assert_eq!(info.app_name, "nginx");
        assert_eq!(info.app_uid, "1234-abcd");
    }
}
