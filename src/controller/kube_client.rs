//! Resource-store interface used by the engine controller
//!
//! Everything the reconciler reads or writes goes through [`EngineKubeClient`]
//! so the state machine can be driven against mocks or an in-memory store.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{AppKind, ChaosEngine};
use crate::Error;

/// Workload kinds the engine may own, in forced-cleanup order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 DaemonSet
    DaemonSet,
    /// batch/v1 Job
    Job,
    /// core/v1 Pod
    Pod,
}

impl ChildKind {
    /// Every kind forced cleanup sweeps
    pub const ALL: [ChildKind; 4] = [
        ChildKind::Deployment,
        ChildKind::DaemonSet,
        ChildKind::Job,
        ChildKind::Pod,
    ];
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "Deployments"),
            Self::DaemonSet => write!(f, "DaemonSets"),
            Self::Job => write!(f, "Jobs"),
            Self::Pod => write!(f, "Pods"),
        }
    }
}

/// Store operations needed to reconcile a ChaosEngine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EngineKubeClient: Send + Sync {
    /// Get an engine, `None` if it does not exist
    async fn get_engine(&self, namespace: &str, name: &str) -> Result<Option<ChaosEngine>, Error>;

    /// Replace the whole engine, status included, guarded by its resourceVersion
    async fn update_engine(&self, engine: &ChaosEngine) -> Result<ChaosEngine, Error>;

    /// Get a pod, `None` if it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error>;

    /// Create a pod; an existing pod of the same name yields [`Error::AlreadyExists`]
    async fn create_pod(&self, pod: &Pod) -> Result<(), Error>;

    /// List pods matching a label selector
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error>;

    /// Delete a single pod; a missing pod is not an error
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Delete every object of `kind` matching a label selector
    async fn delete_all_of(
        &self,
        kind: ChildKind,
        namespace: &str,
        selector: &str,
        params: &DeleteParams,
    ) -> Result<(), Error>;

    /// Metadata of application workloads matching a label selector
    async fn list_app_workloads(
        &self,
        kind: AppKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>, Error>;
}

/// [`EngineKubeClient`] backed by a live cluster
pub struct EngineKubeClientImpl {
    client: Client,
}

impl EngineKubeClientImpl {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn delete_collection<K>(
        &self,
        namespace: &str,
        selector: &str,
        params: &DeleteParams,
    ) -> Result<(), kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete_collection(params, &ListParams::default().labels(selector))
            .await?;
        Ok(())
    }

    async fn list_meta<K>(&self, namespace: &str, selector: &str) -> Result<Vec<ObjectMeta>, kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items.into_iter().map(|o| o.meta().clone()).collect())
    }
}

#[async_trait]
impl EngineKubeClient for EngineKubeClientImpl {
    async fn get_engine(&self, namespace: &str, name: &str) -> Result<Option<ChaosEngine>, Error> {
        let api: Api<ChaosEngine> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(engine) => Ok(Some(engine)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::store("get", "ChaosEngine", e)),
        }
    }

    async fn update_engine(&self, engine: &ChaosEngine) -> Result<ChaosEngine, Error> {
        let name = engine.name_any();
        let namespace = engine.namespace().unwrap_or_default();
        let api: Api<ChaosEngine> = Api::namespaced(self.client.clone(), &namespace);

        let replaced = api
            .replace(&name, &PostParams::default(), engine)
            .await
            .map_err(|e| Error::store("update", "ChaosEngine", e))?;

        let Some(status) = &engine.status else {
            return Ok(replaced);
        };
        if replaced.status.as_ref() == Some(status) {
            return Ok(replaced);
        }

        // With a status subresource the replace above ignored status
        let mut with_status = replaced.clone();
        with_status.status = Some(status.clone());
        let body = serde_json::to_vec(&with_status)
            .map_err(|e| Error::serialization(format!("encode ChaosEngine status: {e}")))?;
        match api.replace_status(&name, &PostParams::default(), body).await {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(engine = %name, "no status subresource, status written with replace");
                Ok(replaced)
            }
            Err(e) => Err(Error::store("update status", "ChaosEngine", e)),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(pod) => Ok(Some(pod)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::store("get", "Pod", e)),
        }
    }

    async fn create_pod(&self, pod: &Pod) -> Result<(), Error> {
        let namespace = pod.namespace().unwrap_or_default();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&PostParams::default(), pod).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(Error::already_exists("Pod", pod.name_any()))
            }
            Err(e) => Err(Error::store("create", "Pod", e)),
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| Error::store("list", "Pod", e))?;
        Ok(list.items)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::store("delete", "Pod", e)),
        }
    }

    async fn delete_all_of(
        &self,
        kind: ChildKind,
        namespace: &str,
        selector: &str,
        params: &DeleteParams,
    ) -> Result<(), Error> {
        let result = match kind {
            ChildKind::Deployment => {
                self.delete_collection::<Deployment>(namespace, selector, params)
                    .await
            }
            ChildKind::DaemonSet => {
                self.delete_collection::<DaemonSet>(namespace, selector, params)
                    .await
            }
            ChildKind::Job => self.delete_collection::<Job>(namespace, selector, params).await,
            ChildKind::Pod => self.delete_collection::<Pod>(namespace, selector, params).await,
        };
        result.map_err(|e| Error::store("delete collection", kind.to_string(), e))
    }

    async fn list_app_workloads(
        &self,
        kind: AppKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>, Error> {
        let result = match kind {
            AppKind::Deployment => self.list_meta::<Deployment>(namespace, selector).await,
            AppKind::StatefulSet => self.list_meta::<StatefulSet>(namespace, selector).await,
            AppKind::DaemonSet => self.list_meta::<DaemonSet>(namespace, selector).await,
        };
        result.map_err(|e| Error::store("list", kind.to_string(), e))
    }
}
