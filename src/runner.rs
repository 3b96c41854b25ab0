//! Runner pod construction
//!
//! [`RunnerSettings`] is the fully-resolved description of the runner for one
//! engine; [`RunnerSettings::into_pod`] turns it into the pod that is created
//! once and never patched.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::app_info::ApplicationInfo;
use crate::config::OperatorConfig;
use crate::controller::lifecycle::owner_labels;
use crate::crd::{AnnotationCheck, ChaosEngine, RunnerType};
use crate::Error;

/// Container name of the runner
pub const RUNNER_CONTAINER: &str = "chaos-runner";

/// Image pull policy when the engine sets none
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

/// Restart policy of the runner pod
pub const RUNNER_RESTART_POLICY: &str = "OnFailure";

const ANSIBLE_COMMAND: &[&str] = &["/bin/bash"];
const ANSIBLE_ARGS: &[&str] = &[
    "-c",
    "ansible-playbook ./executor/test.yml -i /etc/ansible/hosts; exit 0",
];

/// Name of the runner pod for an engine
pub fn runner_name(engine_name: &str) -> String {
    format!("{engine_name}-runner")
}

/// Pick the runner image: engine spec, then operator override, then built-in default
pub fn resolve_image(spec_image: Option<&str>, config: &OperatorConfig) -> String {
    spec_image
        .filter(|i| !i.is_empty())
        .or(config.runner_image_override.as_deref())
        .unwrap_or(config.default_runner_image.as_str())
        .to_string()
}

/// Fixed runner environment followed by the engine's overrides
///
/// An override with the same name as a fixed entry replaces it in place.
pub fn runner_env(engine: &ChaosEngine, experiments: &[String], client_uuid: &str) -> Vec<EnvVar> {
    let spec = &engine.spec;
    let fixed = [
        ("CHAOSENGINE", engine.name_any()),
        ("APP_LABEL", spec.appinfo.applabel.clone()),
        ("APP_NAMESPACE", spec.appinfo.appns.clone()),
        ("EXPERIMENT_LIST", experiments.join(",")),
        ("CHAOS_SVC_ACC", spec.chaos_service_account.clone()),
        ("AUXILIARY_APPINFO", spec.auxiliary_app_info.clone()),
        ("CLIENT_UUID", client_uuid.to_string()),
        ("CHAOS_NAMESPACE", engine.namespace().unwrap_or_default()),
    ];

    let mut env: Vec<EnvVar> = fixed
        .into_iter()
        .map(|(name, value)| env_var(name, value))
        .collect();

    for extra in &spec.components.runner.env {
        match env.iter_mut().find(|e| e.name == extra.name) {
            Some(existing) => existing.value = Some(extra.value.clone()),
            None => env.push(env_var(&extra.name, extra.value.clone())),
        }
    }
    env
}

fn env_var(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        value_from: None,
    }
}

fn to_owned_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Everything needed to build the runner pod
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerSettings {
    /// Pod name, `<engine>-runner`
    pub name: String,
    /// Engine namespace
    pub namespace: String,
    /// Ownership labels
    pub labels: BTreeMap<String, String>,
    /// Pod annotations
    pub annotations: BTreeMap<String, String>,
    /// Runner variant
    pub runner_type: RunnerType,
    /// Resolved image
    pub image: String,
    /// Resolved pull policy
    pub image_pull_policy: String,
    /// Container command, `None` keeps the image entrypoint
    pub command: Option<Vec<String>>,
    /// Container args, `None` keeps the image default
    pub args: Option<Vec<String>>,
    /// Service account the pod runs as
    pub service_account: String,
    /// Container environment
    pub env: Vec<EnvVar>,
}

impl RunnerSettings {
    /// Resolve runner settings for `engine`
    ///
    /// With the annotation check enabled the runner needs a non-empty
    /// experiment list and a target UID picked by the gate.
    pub fn from_engine(
        engine: &ChaosEngine,
        app: &ApplicationInfo,
        check: AnnotationCheck,
        config: &OperatorConfig,
    ) -> Result<Self, Error> {
        if check.is_enabled() && (app.experiments.is_empty() || app.app_uid.is_empty()) {
            return Err(Error::validation_for(
                engine.name_any(),
                "application experiment list or UUID is empty",
            ));
        }

        let spec = &engine.spec;
        let runner = &spec.components.runner;
        let runner_type = runner.runner_type.unwrap_or_default();
        let engine_name = engine.name_any();

        let (command, args) = match runner_type {
            RunnerType::Go => (runner.command.clone(), runner.args.clone()),
            RunnerType::Ansible => (
                Some(runner.command.clone().unwrap_or_else(|| to_owned_vec(ANSIBLE_COMMAND))),
                Some(runner.args.clone().unwrap_or_else(|| to_owned_vec(ANSIBLE_ARGS))),
            ),
        };

        let mut annotations = BTreeMap::new();
        if runner_type == RunnerType::Go {
            if let Some(a) = spec
                .app_annotations
                .as_ref()
                .filter(|a| !a.app_annotation_name.is_empty())
            {
                annotations.insert(a.app_annotation_name.clone(), a.app_annotation_value.clone());
            }
        }

        Ok(Self {
            name: runner_name(&engine_name),
            namespace: engine.namespace().unwrap_or_default(),
            labels: owner_labels(&engine_name, &engine.uid().unwrap_or_default()),
            annotations,
            runner_type,
            image: resolve_image(runner.image.as_deref(), config),
            image_pull_policy: runner
                .image_pull_policy
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PULL_POLICY.to_string()),
            command,
            args,
            service_account: spec.chaos_service_account.clone(),
            env: runner_env(engine, &app.experiments, &config.client_uuid),
        })
    }

    /// Build the runner pod
    pub fn into_pod(self) -> Pod {
        let container = Container {
            name: RUNNER_CONTAINER.to_string(),
            image: Some(self.image),
            image_pull_policy: Some(self.image_pull_policy),
            command: self.command,
            args: self.args,
            env: Some(self.env),
            ..Default::default()
        };

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                labels: Some(self.labels),
                annotations: (!self.annotations.is_empty()).then_some(self.annotations),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![container],
                restart_policy: Some(RUNNER_RESTART_POLICY.to_string()),
                service_account_name: (!self.service_account.is_empty())
                    .then_some(self.service_account),
                ..Default::default()
            }),
            status: None,
        }
    }
}
