//! Mock buffer client for unit testing
//!
//! In-memory implementation of `BufferClientTrait` that stores all cluster
//! objects in maps and can be primed to fail specific operations. Used by
//! the controller's unit tests; no API server required.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v1::Scale;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    Container, Pod, PodTemplate, ReplicationController, ResourceQuota, Volume, VolumeMount,
};

use crate::buffer_trait::BufferClientTrait;
use crate::error::BufferClientError;
use crds::CapacityBuffer;

type Key = (String, String); // (namespace, name)

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Mock buffer client for testing
///
/// Stores resources in memory. Buffers written through
/// `update_capacity_buffer_status` can be read back with `get_buffer` to
/// assert on persisted status.
#[derive(Clone, Default)]
pub struct MockBufferClient {
    buffers: Arc<Mutex<HashMap<Key, CapacityBuffer>>>,
    pod_templates: Arc<Mutex<HashMap<Key, PodTemplate>>>,
    deployments: Arc<Mutex<HashMap<Key, Deployment>>>,
    replica_sets: Arc<Mutex<HashMap<Key, ReplicaSet>>>,
    stateful_sets: Arc<Mutex<HashMap<Key, StatefulSet>>>,
    replication_controllers: Arc<Mutex<HashMap<Key, ReplicationController>>>,
    jobs: Arc<Mutex<HashMap<Key, Job>>>,
    scales: Arc<Mutex<HashMap<Key, Scale>>>,
    pods: Arc<Mutex<HashMap<String, Vec<Pod>>>>,
    quotas: Arc<Mutex<HashMap<String, Vec<ResourceQuota>>>>,
    status_updates: Arc<Mutex<u64>>,
    fail_template_writes: Arc<Mutex<bool>>,
    fail_scale: Arc<Mutex<bool>>,
    inject_api_access_volume: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockBufferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBufferClient").finish_non_exhaustive()
    }
}

impl MockBufferClient {
    /// Create an empty mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer to the mock store (for test setup).
    pub fn add_buffer(&self, buffer: CapacityBuffer) {
        let ns = buffer.metadata.namespace.clone().unwrap_or_default();
        let name = buffer.metadata.name.clone().unwrap_or_default();
        self.buffers.lock().unwrap().insert((ns, name), buffer);
    }

    /// Add a pod template to the mock store (for test setup).
    pub fn add_pod_template(&self, template: PodTemplate) {
        let ns = template.metadata.namespace.clone().unwrap_or_default();
        let name = template.metadata.name.clone().unwrap_or_default();
        self.pod_templates
            .lock()
            .unwrap()
            .insert((ns, name), template);
    }

    /// Add a Deployment to the mock store.
    pub fn add_deployment(&self, deployment: Deployment) {
        let ns = deployment.metadata.namespace.clone().unwrap_or_default();
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.deployments
            .lock()
            .unwrap()
            .insert((ns, name), deployment);
    }

    /// Add a ReplicaSet to the mock store.
    pub fn add_replica_set(&self, rs: ReplicaSet) {
        let ns = rs.metadata.namespace.clone().unwrap_or_default();
        let name = rs.metadata.name.clone().unwrap_or_default();
        self.replica_sets.lock().unwrap().insert((ns, name), rs);
    }

    /// Add a StatefulSet to the mock store.
    pub fn add_stateful_set(&self, sts: StatefulSet) {
        let ns = sts.metadata.namespace.clone().unwrap_or_default();
        let name = sts.metadata.name.clone().unwrap_or_default();
        self.stateful_sets.lock().unwrap().insert((ns, name), sts);
    }

    /// Add a ReplicationController to the mock store.
    pub fn add_replication_controller(&self, rc: ReplicationController) {
        let ns = rc.metadata.namespace.clone().unwrap_or_default();
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.replication_controllers
            .lock()
            .unwrap()
            .insert((ns, name), rc);
    }

    /// Add a Job to the mock store.
    pub fn add_job(&self, job: Job) {
        let ns = job.metadata.namespace.clone().unwrap_or_default();
        let name = job.metadata.name.clone().unwrap_or_default();
        self.jobs.lock().unwrap().insert((ns, name), job);
    }

    /// Register a `/scale` subresource for a workload name.
    pub fn add_scale(&self, namespace: &str, name: &str, scale: Scale) {
        self.scales.lock().unwrap().insert(key(namespace, name), scale);
    }

    /// Add a pod to a namespace's pod list.
    pub fn add_pod(&self, pod: Pod) {
        let ns = pod.metadata.namespace.clone().unwrap_or_default();
        self.pods.lock().unwrap().entry(ns).or_default().push(pod);
    }

    /// Add a resource quota to a namespace.
    pub fn add_resource_quota(&self, quota: ResourceQuota) {
        let ns = quota.metadata.namespace.clone().unwrap_or_default();
        self.quotas.lock().unwrap().entry(ns).or_default().push(quota);
    }

    /// Replace a previously added resource quota by name.
    pub fn replace_resource_quota(&self, quota: ResourceQuota) {
        let ns = quota.metadata.namespace.clone().unwrap_or_default();
        let mut quotas = self.quotas.lock().unwrap();
        let list = quotas.entry(ns).or_default();
        list.retain(|q| q.metadata.name != quota.metadata.name);
        list.push(quota);
    }

    /// Read back a buffer, including status persisted through the client.
    pub fn get_buffer(&self, namespace: &str, name: &str) -> Option<CapacityBuffer> {
        self.buffers.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Read back a pod template written through the client.
    pub fn get_template(&self, namespace: &str, name: &str) -> Option<PodTemplate> {
        self.pod_templates
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    /// Number of status updates issued so far.
    pub fn status_update_count(&self) -> u64 {
        *self.status_updates.lock().unwrap()
    }

    /// Make pod template create/update fail (for error-path tests).
    pub fn set_fail_template_writes(&self, fail: bool) {
        *self.fail_template_writes.lock().unwrap() = fail;
    }

    /// Make `/scale` lookups fail, forcing the typed-kind fallback path.
    pub fn set_fail_scale(&self, fail: bool) {
        *self.fail_scale.lock().unwrap() = fail;
    }

    /// Make the dry-run resolver inject a `kube-api-access-` projected
    /// volume, mimicking the service-account admission plugin.
    pub fn set_inject_api_access_volume(&self, inject: bool) {
        *self.inject_api_access_volume.lock().unwrap() = inject;
    }
}

/// Container-request defaulting the API server applies on create: requests
/// absent but limits present means requests are copied from limits.
fn default_container_requests(container: &mut Container) {
    let Some(resources) = container.resources.as_mut() else {
        return;
    };
    let Some(limits) = resources.limits.clone() else {
        return;
    };
    let requests = resources.requests.get_or_insert_with(Default::default);
    for (name, quantity) in limits {
        requests.entry(name).or_insert(quantity);
    }
}

#[async_trait::async_trait]
impl BufferClientTrait for MockBufferClient {
    async fn list_capacity_buffers(&self) -> Result<Vec<CapacityBuffer>, BufferClientError> {
        let mut buffers: Vec<CapacityBuffer> =
            self.buffers.lock().unwrap().values().cloned().collect();
        // Deterministic order so tests can rely on allocation order.
        buffers.sort_by(|a, b| {
            (a.metadata.namespace.clone(), a.metadata.name.clone())
                .cmp(&(b.metadata.namespace.clone(), b.metadata.name.clone()))
        });
        Ok(buffers)
    }

    async fn update_capacity_buffer_status(
        &self,
        buffer: &CapacityBuffer,
    ) -> Result<CapacityBuffer, BufferClientError> {
        let ns = buffer.metadata.namespace.clone().unwrap_or_default();
        let name = buffer
            .metadata
            .name
            .clone()
            .ok_or_else(|| BufferClientError::InvalidRequest("buffer has no name".to_string()))?;
        let mut buffers = self.buffers.lock().unwrap();
        let stored = buffers
            .get_mut(&(ns.clone(), name.clone()))
            .ok_or_else(|| BufferClientError::NotFound(format!("buffer {ns}/{name}")))?;
        stored.status = buffer.status.clone();
        *self.status_updates.lock().unwrap() += 1;
        Ok(stored.clone())
    }

    async fn get_pod_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PodTemplate, BufferClientError> {
        self.pod_templates
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| BufferClientError::NotFound(format!("pod template {namespace}/{name}")))
    }

    async fn create_pod_template(
        &self,
        template: &PodTemplate,
    ) -> Result<PodTemplate, BufferClientError> {
        if *self.fail_template_writes.lock().unwrap() {
            return Err(BufferClientError::InvalidRequest(
                "simulated template write failure".to_string(),
            ));
        }
        let ns = template.metadata.namespace.clone().unwrap_or_default();
        let name = template
            .metadata
            .name
            .clone()
            .ok_or_else(|| BufferClientError::InvalidRequest("template has no name".to_string()))?;
        let mut created = template.clone();
        created.metadata.generation = Some(1);
        self.pod_templates
            .lock()
            .unwrap()
            .insert((ns, name), created.clone());
        Ok(created)
    }

    async fn update_pod_template(
        &self,
        template: &PodTemplate,
    ) -> Result<PodTemplate, BufferClientError> {
        if *self.fail_template_writes.lock().unwrap() {
            return Err(BufferClientError::InvalidRequest(
                "simulated template write failure".to_string(),
            ));
        }
        let ns = template.metadata.namespace.clone().unwrap_or_default();
        let name = template
            .metadata
            .name
            .clone()
            .ok_or_else(|| BufferClientError::InvalidRequest("template has no name".to_string()))?;
        let mut templates = self.pod_templates.lock().unwrap();
        let stored = templates
            .get_mut(&(ns.clone(), name.clone()))
            .ok_or_else(|| BufferClientError::NotFound(format!("pod template {ns}/{name}")))?;
        // Generation bumps only when the template payload changes.
        let generation = stored.metadata.generation.unwrap_or(1);
        let changed = stored.template != template.template;
        *stored = template.clone();
        stored.metadata.generation = Some(if changed { generation + 1 } else { generation });
        Ok(stored.clone())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, BufferClientError> {
        self.deployments
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| BufferClientError::NotFound(format!("deployment {namespace}/{name}")))
    }

    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, BufferClientError> {
        self.replica_sets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| BufferClientError::NotFound(format!("replicaset {namespace}/{name}")))
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, BufferClientError> {
        self.stateful_sets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| BufferClientError::NotFound(format!("statefulset {namespace}/{name}")))
    }

    async fn get_replication_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicationController, BufferClientError> {
        self.replication_controllers
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| {
                BufferClientError::NotFound(format!("replicationcontroller {namespace}/{name}"))
            })
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, BufferClientError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| BufferClientError::NotFound(format!("job {namespace}/{name}")))
    }

    async fn get_scale(
        &self,
        namespace: &str,
        _api_group: &str,
        _kind: &str,
        name: &str,
    ) -> Result<Scale, BufferClientError> {
        if *self.fail_scale.lock().unwrap() {
            return Err(BufferClientError::Discovery(
                "simulated scale lookup failure".to_string(),
            ));
        }
        self.scales
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| BufferClientError::NotFound(format!("scale {namespace}/{name}")))
    }

    async fn list_pods_by_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Pod>, BufferClientError> {
        // Selector strings are "k=v" pairs joined by commas; enough for the
        // scale subresource selectors exercised in tests.
        let wanted: Vec<(&str, &str)> = selector
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let pods = self.pods.lock().unwrap();
        let matching = pods
            .get(namespace)
            .map(|list| {
                list.iter()
                    .filter(|pod| {
                        let labels = pod.metadata.labels.clone().unwrap_or_default();
                        wanted
                            .iter()
                            .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matching)
    }

    async fn list_resource_quotas(
        &self,
        namespace: &str,
    ) -> Result<Vec<ResourceQuota>, BufferClientError> {
        Ok(self
            .quotas
            .lock()
            .unwrap()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn dry_run_create_pod(
        &self,
        namespace: &str,
        pod: &Pod,
    ) -> Result<Pod, BufferClientError> {
        let mut defaulted = pod.clone();
        defaulted.metadata.namespace = Some(namespace.to_string());
        if let Some(spec) = defaulted.spec.as_mut() {
            for container in &mut spec.containers {
                default_container_requests(container);
            }
            if let Some(init) = spec.init_containers.as_mut() {
                for container in init {
                    default_container_requests(container);
                }
            }
            if *self.inject_api_access_volume.lock().unwrap() {
                spec.volumes.get_or_insert_with(Vec::new).push(Volume {
                    name: "kube-api-access-x7f2p".to_string(),
                    ..Default::default()
                });
                for container in &mut spec.containers {
                    container
                        .volume_mounts
                        .get_or_insert_with(Vec::new)
                        .push(VolumeMount {
                            name: "kube-api-access-x7f2p".to_string(),
                            mount_path: "/var/run/secrets/kubernetes.io/serviceaccount".to_string(),
                            ..Default::default()
                        });
                }
            }
        }
        Ok(defaulted)
    }
}
