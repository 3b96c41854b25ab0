//! Annotation gate: does the target application opt in to chaos?
//!
//! A workload opts in by carrying the configured annotation key set to
//! `"true"`. Exactly one workload matching the engine's selector must opt in.

use std::collections::BTreeMap;

use tracing::info;

use crate::app_info::ApplicationInfo;
use crate::config::ANNOTATION_SENTINEL;
use crate::controller::kube_client::EngineKubeClient;
use crate::crd::AppKind;
use crate::Error;

/// Add one to `candidates` if `annotation_value` enables chaos
pub fn count_chaos_enabled(annotation_value: &str, candidates: usize) -> usize {
    if annotation_value == ANNOTATION_SENTINEL {
        candidates + 1
    } else {
        candidates
    }
}

/// Check that exactly one workload selected by `app` is annotated for chaos
///
/// The first annotated workload is recorded on `app` before any error is
/// returned, so callers that tolerate gate failures still see its UID.
pub async fn check_chaos_annotation(
    client: &dyn EngineKubeClient,
    app: &mut ApplicationInfo,
    annotation_key: &str,
) -> Result<(), Error> {
    let kind: AppKind = app.kind.parse()?;
    let selector = app.selector();

    let workloads = client
        .list_app_workloads(kind, &app.namespace, &selector)
        .await
        .map_err(|e| Error::annotation_gate(kind.to_string(), e.to_string()))?;
    if workloads.is_empty() {
        return Err(Error::annotation_gate(
            kind.to_string(),
            format!("no {kind}s found with matching labels"),
        ));
    }

    let mut candidates = 0;
    for meta in &workloads {
        let value = annotation_value(meta.annotations.as_ref(), annotation_key);
        let counted = count_chaos_enabled(value, candidates);
        if counted > candidates && candidates == 0 {
            app.set_candidate(
                meta.name.clone().unwrap_or_default(),
                meta.uid.clone().unwrap_or_default(),
            );
        }
        candidates = counted;
    }

    match candidates {
        0 => Err(Error::annotation_gate(
            kind.to_string(),
            "no chaos-candidate found",
        )),
        1 => {
            info!(
                kind = %kind,
                app_name = %app.app_name,
                app_uid = %app.app_uid,
                "chaos candidate selected"
            );
            Ok(())
        }
        n => Err(Error::annotation_gate(
            kind.to_string(),
            format!(
                "{n} chaos candidates share label {selector}, either provide unique labels or annotate only the desired app for chaos"
            ),
        )),
    }
}

fn annotation_value<'a>(annotations: Option<&'a BTreeMap<String, String>>, key: &str) -> &'a str {
    annotations
        .and_then(|a| a.get(key))
        .map(String::as_str)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ANNOTATION_KEY;
    use crate::controller::kube_client::MockEngineKubeClient;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn app(kind: &str) -> ApplicationInfo {
        ApplicationInfo {
            namespace: "shop".to_string(),
            label_key: "app".to_string(),
            label_value: "nginx".to_string(),
            kind: kind.to_string(),
            experiments: vec!["pod-delete".to_string()],
            ..Default::default()
        }
    }

    fn workload(name: &str, uid: &str, annotation: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(uid.to_string()),
            annotations: annotation.map(|v| {
                BTreeMap::from([(DEFAULT_ANNOTATION_KEY.to_string(), v.to_string())])
            }),
            ..Default::default()
        }
    }

    fn client_returning(workloads: Vec<ObjectMeta>) -> MockEngineKubeClient {
        let mut mock = MockEngineKubeClient::new();
        mock.expect_list_app_workloads()
            .withf(|kind, ns, selector| {
                *kind == AppKind::Deployment && ns == "shop" && selector == "app=nginx"
            })
            .times(1)
            .returning(move |_, _, _| Ok(workloads.clone()));
        mock
    }

    #[test]
    fn counts_only_the_sentinel() {
        assert_eq!(count_chaos_enabled("true", 0), 1);
        assert_eq!(count_chaos_enabled("true", 2), 3);
        assert_eq!(count_chaos_enabled("True", 1), 1);
        assert_eq!(count_chaos_enabled("", 0), 0);
    }

    /// Story: the one annotated deployment becomes the chaos candidate
    #[tokio::test]
    async fn story_annotated_deployment_passes_and_sets_uid() {
        let client = client_returning(vec![
            workload("nginx-canary", "uid-0", Some("false")),
            workload("nginx", "uid-1", Some("true")),
        ]);
        let mut info = app("Deployment");

        check_chaos_annotation(&client, &mut info, DEFAULT_ANNOTATION_KEY)
            .await
            .unwrap();

        assert_eq!(info.app_name, "nginx");
        assert_eq!(info.app_uid, "uid-1");
    }

    /// Story: a deployment without the annotation is refused, naming the kind
    #[tokio::test]
    async fn story_missing_annotation_fails_the_gate() {
        let client = client_returning(vec![workload("nginx", "uid-1", None)]);
        let mut info = app("deployment");

        let err = check_chaos_annotation(&client, &mut info, DEFAULT_ANNOTATION_KEY)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("resource type 'deployment'"), "{msg}");
        assert!(msg.contains("no chaos-candidate found"), "{msg}");
        assert!(info.app_uid.is_empty());
    }

    #[tokio::test]
    async fn no_matching_workloads_is_reported() {
        let client = client_returning(vec![]);
        let mut info = app("deployments");

        let err = check_chaos_annotation(&client, &mut info, DEFAULT_ANNOTATION_KEY)
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("no deployments found with matching labels"));
    }

    #[tokio::test]
    async fn ambiguous_candidates_fail_but_keep_the_first() {
        let client = client_returning(vec![
            workload("nginx-a", "uid-a", Some("true")),
            workload("nginx-b", "uid-b", Some("true")),
        ]);
        let mut info = app("deployment");

        let err = check_chaos_annotation(&client, &mut info, DEFAULT_ANNOTATION_KEY)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unique labels"));
        assert_eq!(info.app_uid, "uid-a");
    }

    #[tokio::test]
    async fn custom_annotation_key_is_honoured() {
        let mut meta = workload("nginx", "uid-1", None);
        meta.annotations = Some(BTreeMap::from([(
            "example.com/chaos".to_string(),
            "true".to_string(),
        )]));
        let client = client_returning(vec![meta]);
        let mut info = app("deployment");

        check_chaos_annotation(&client, &mut info, "example.com/chaos")
            .await
            .unwrap();
        assert_eq!(info.app_uid, "uid-1");
    }

    #[tokio::test]
    async fn unsupported_kind_never_reaches_the_store() {
        let client = MockEngineKubeClient::new();
        let mut info = app("cronjob");

        let err = check_chaos_annotation(&client, &mut info, DEFAULT_ANNOTATION_KEY)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedResourceType { .. }));
        assert!(err.to_string().contains("resource type 'cronjob'"));
    }
}
