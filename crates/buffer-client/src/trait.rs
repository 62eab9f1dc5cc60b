//! BufferClient trait for mocking
//!
//! This trait abstracts cluster access to enable mocking in unit tests.
//! The concrete `KubeBufferClient` implements it against the API server;
//! tests use the in-memory `MockBufferClient`.

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v1::Scale;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, PodTemplate, ReplicationController, ResourceQuota};

use crate::error::BufferClientError;
use crds::CapacityBuffer;

/// Cluster operations the capacity buffer controller depends on.
///
/// All async methods must be `Send` to work with Tokio's work-stealing
/// runtime. Reads are expected to be cheap (cache-backed in production);
/// writes always go to the API server.
#[async_trait::async_trait]
pub trait BufferClientTrait: Send + Sync {
    /// List all CapacityBuffers visible to the controller.
    async fn list_capacity_buffers(&self) -> Result<Vec<CapacityBuffer>, BufferClientError>;

    /// Persist a buffer's status subresource. Spec and unrelated metadata
    /// are left untouched.
    async fn update_capacity_buffer_status(
        &self,
        buffer: &CapacityBuffer,
    ) -> Result<CapacityBuffer, BufferClientError>;

    /// Get a pod template by namespace and name.
    async fn get_pod_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PodTemplate, BufferClientError>;

    /// Create a pod template.
    async fn create_pod_template(
        &self,
        template: &PodTemplate,
    ) -> Result<PodTemplate, BufferClientError>;

    /// Update an existing pod template.
    async fn update_pod_template(
        &self,
        template: &PodTemplate,
    ) -> Result<PodTemplate, BufferClientError>;

    /// Get a Deployment by namespace and name.
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, BufferClientError>;

    /// Get a ReplicaSet by namespace and name.
    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, BufferClientError>;

    /// Get a StatefulSet by namespace and name.
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, BufferClientError>;

    /// Get a ReplicationController by namespace and name.
    async fn get_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, BufferClientError>;

    /// Get a Job by namespace and name.
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, BufferClientError>;

    /// Resolve `(apiGroup, kind)` and fetch the `/scale` subresource of the
    /// named workload.
    async fn get_scale(
        &self,
        namespace: &str,
        api_group: &str,
        kind: &str,
        name: &str,
    ) -> Result<Scale, BufferClientError>;

    /// List pods in a namespace matching a label selector string.
    async fn list_pods_by_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Pod>, BufferClientError>;

    /// List resource quotas in a namespace.
    async fn list_resource_quotas(
        &self,
        namespace: &str,
    ) -> Result<Vec<ResourceQuota>, BufferClientError>;

    /// Run a server-side dry-run create for a pod, returning the defaulted,
    /// webhook-mutated object. Nothing is persisted.
    async fn dry_run_create_pod(
        &self,
        namespace: &str,
        pod: &Pod,
    ) -> Result<Pod, BufferClientError>;
}
