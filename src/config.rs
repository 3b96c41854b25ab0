//! Process-wide operator configuration
//!
//! Built once in `main` from CLI flags and environment, then shared read-only
//! through the controller context.

use crate::crd::AnnotationCheck;

/// Built-in runner image, used when neither the engine nor the operator names one
pub const DEFAULT_RUNNER_IMAGE: &str = "litmuschaos/chaos-runner:latest";

/// Annotation a target workload must carry to opt in to chaos
pub const DEFAULT_ANNOTATION_KEY: &str = "litmuschaos.io/chaos";

/// Value of the opt-in annotation that allows chaos
pub const ANNOTATION_SENTINEL: &str = "true";

/// Read-only operator settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Built-in runner image
    pub default_runner_image: String,
    /// Operator-wide image override, applied when the engine names none
    pub runner_image_override: Option<String>,
    /// Opt-in annotation key checked by the gate
    pub annotation_key: String,
    /// Annotation check applied when the engine leaves it empty
    pub default_annotation_check: AnnotationCheck,
    /// Analytics client id passed through to the runner
    pub client_uuid: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_runner_image: DEFAULT_RUNNER_IMAGE.to_string(),
            runner_image_override: None,
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
            default_annotation_check: AnnotationCheck::Enabled,
            client_uuid: String::new(),
        }
    }
}

impl OperatorConfig {
    /// Set the operator-wide runner image; blank values are ignored
    pub fn with_runner_image(mut self, image: Option<String>) -> Self {
        self.runner_image_override = image.filter(|i| !i.trim().is_empty());
        self
    }

    /// Set the annotation key; blank values keep the default
    pub fn with_annotation_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.annotation_key = key;
        }
        self
    }
}
