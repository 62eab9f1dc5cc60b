//! Kubernetes-backed buffer client
//!
//! Thin typed wrapper over `kube::Api` handles for everything the
//! controller touches: CapacityBuffers, pod templates, the well-known
//! scalable workload kinds, resource quotas, pods and the `/scale`
//! subresource of arbitrary workloads (resolved via API discovery).

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v1::Scale;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, PodTemplate, ReplicationController, ResourceQuota};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, discovery};
use tracing::debug;

use crate::buffer_trait::BufferClientTrait;
use crate::error::BufferClientError;
use crds::CapacityBuffer;

/// Field manager name used for all writes issued by the controller.
const FIELD_MANAGER: &str = "capacity-buffer-controller";

/// Cluster client scoped to an optional watch namespace.
///
/// With `watch_namespace == None` buffers are listed across all namespaces;
/// object reads and writes are always namespaced by the calling site.
#[derive(Clone)]
pub struct KubeBufferClient {
    client: Client,
    watch_namespace: Option<String>,
}

impl std::fmt::Debug for KubeBufferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBufferClient")
            .field("watch_namespace", &self.watch_namespace)
            .finish_non_exhaustive()
    }
}

impl KubeBufferClient {
    /// Create a client from an already-connected `kube::Client`.
    pub fn new(client: Client, watch_namespace: Option<String>) -> Self {
        Self {
            client,
            watch_namespace,
        }
    }

    /// Create a client using the default kubeconfig/in-cluster config.
    pub async fn try_default(watch_namespace: Option<String>) -> Result<Self, BufferClientError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, watch_namespace))
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + serde::de::DeserializeOwned
            + Clone
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn buffers_api(&self) -> Api<CapacityBuffer> {
        match self.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait::async_trait]
impl BufferClientTrait for KubeBufferClient {
    async fn list_capacity_buffers(&self) -> Result<Vec<CapacityBuffer>, BufferClientError> {
        let list = self.buffers_api().list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn update_capacity_buffer_status(
        &self,
        buffer: &CapacityBuffer,
    ) -> Result<CapacityBuffer, BufferClientError> {
        let name = buffer
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| BufferClientError::InvalidRequest("buffer has no name".to_string()))?;
        let namespace = buffer.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<CapacityBuffer> = self.namespaced(namespace);
        // Status-only merge patch: never clobbers spec or metadata.
        let patch = serde_json::json!({ "status": buffer.status });
        let pp = PatchParams::apply(FIELD_MANAGER);
        let updated = api.patch_status(name, &pp, &Patch::Merge(&patch)).await?;
        debug!("Updated status of CapacityBuffer {}/{}", namespace, name);
        Ok(updated)
    }

    async fn get_pod_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PodTemplate, BufferClientError> {
        Ok(self.namespaced::<PodTemplate>(namespace).get(name).await?)
    }

    async fn create_pod_template(
        &self,
        template: &PodTemplate,
    ) -> Result<PodTemplate, BufferClientError> {
        let namespace = template.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<PodTemplate> = self.namespaced(namespace);
        Ok(api.create(&PostParams::default(), template).await?)
    }

    async fn update_pod_template(
        &self,
        template: &PodTemplate,
    ) -> Result<PodTemplate, BufferClientError> {
        let name = template
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| BufferClientError::InvalidRequest("template has no name".to_string()))?;
        let namespace = template.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<PodTemplate> = self.namespaced(namespace);
        Ok(api.replace(name, &PostParams::default(), template).await?)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, BufferClientError> {
        Ok(self.namespaced::<Deployment>(namespace).get(name).await?)
    }

    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, BufferClientError> {
        Ok(self.namespaced::<ReplicaSet>(namespace).get(name).await?)
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, BufferClientError> {
        Ok(self.namespaced::<StatefulSet>(namespace).get(name).await?)
    }

    async fn get_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, BufferClientError> {
        Ok(self
            .namespaced::<ReplicationController>(namespace)
            .get(name)
            .await?)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, BufferClientError> {
        Ok(self.namespaced::<Job>(namespace).get(name).await?)
    }

    async fn get_scale(
        &self,
        namespace: &str,
        api_group: &str,
        kind: &str,
        name: &str,
    ) -> Result<Scale, BufferClientError> {
        let group = discovery::group(&self.client, api_group)
            .await
            .map_err(|e| BufferClientError::Discovery(format!("group {api_group:?}: {e}")))?;
        let (ar, _caps) = group.recommended_kind(kind).ok_or_else(|| {
            BufferClientError::Discovery(format!("kind {kind:?} not found in group {api_group:?}"))
        })?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let obj = api.get_subresource("scale", name).await?;
        let scale: Scale = serde_json::from_value(serde_json::to_value(&obj)?)?;
        Ok(scale)
    }

    async fn list_pods_by_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Pod>, BufferClientError> {
        let api: Api<Pod> = self.namespaced(namespace);
        let lp = ListParams::default().labels(selector);
        Ok(api.list(&lp).await?.items)
    }

    async fn list_resource_quotas(
        &self,
        namespace: &str,
    ) -> Result<Vec<ResourceQuota>, BufferClientError> {
        let api: Api<ResourceQuota> = self.namespaced(namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn dry_run_create_pod(
        &self,
        namespace: &str,
        pod: &Pod,
    ) -> Result<Pod, BufferClientError> {
        let api: Api<Pod> = self.namespaced(namespace);
        let pp = PostParams {
            dry_run: true,
            field_manager: Some(FIELD_MANAGER.to_string()),
        };
        Ok(api.create(&pp, pod).await?)
    }
}
