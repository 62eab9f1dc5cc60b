//! Fake pod resolution
//!
//! Buffers are translated into placeholder pods from a pod template spec.
//! Two resolvers exist: a local defaulting resolver used by the quota
//! allocator (fills requests from limits, no I/O) and a dry-run resolver
//! that round-trips the pod through the API server so that admission
//! defaulting and mutating webhooks are reflected in managed templates.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use buffer_client::BufferClientTrait;

use crate::error::ControllerError;
use crate::quantity::{format_milli, quantity_milli};

/// Prefix of the projected service-account token volumes the API server
/// injects on dry-run creates. The volume names carry a random suffix, so
/// they must be stripped before templates are compared or persisted.
pub const API_ACCESS_VOLUME_PREFIX: &str = "kube-api-access-";

/// Build a bare pod from a pod template spec. Node assignment is cleared
/// so the scale-up engine sees the pod as unschedulable.
pub fn pod_from_template_spec(namespace: &str, template: &PodTemplateSpec) -> Pod {
    let meta = template.metadata.clone().unwrap_or_default();
    let mut spec = template.spec.clone().unwrap_or_default();
    spec.node_name = None;
    Pod {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            labels: meta.labels,
            annotations: meta.annotations,
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }
}

fn is_pod_level_resource(name: &str) -> bool {
    name == "cpu" || name == "memory" || name.starts_with("hugepages-")
}

fn default_container_requests(containers: &mut [Container]) {
    for container in containers {
        let Some(resources) = container.resources.as_mut() else {
            continue;
        };
        let Some(limits) = resources.limits.clone() else {
            continue;
        };
        if limits.is_empty() {
            continue;
        }
        let requests = resources.requests.get_or_insert_with(BTreeMap::new);
        for (name, limit) in limits {
            requests.entry(name).or_insert(limit);
        }
    }
}

/// Sum huge-page requests across regular containers. Unparsable values are
/// skipped; defaulting is best effort and quota evaluation will surface the
/// parse error where it matters.
fn aggregate_hugepage_requests(spec: &PodSpec) -> BTreeMap<String, i128> {
    let mut totals = BTreeMap::new();
    for container in &spec.containers {
        let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref())
        else {
            continue;
        };
        for (name, quantity) in requests {
            if !name.starts_with("hugepages-") {
                continue;
            }
            if let Ok(value) = quantity_milli(quantity) {
                *totals.entry(name.clone()).or_insert(0) += value;
            }
        }
    }
    totals
}

fn default_pod_level_requests(spec: &mut PodSpec) {
    let hugepage_totals = aggregate_hugepage_requests(spec);
    let Some(resources) = spec.resources.as_mut() else {
        return;
    };
    let Some(limits) = resources.limits.clone() else {
        return;
    };
    if limits.is_empty() {
        return;
    }
    let requests = resources.requests.get_or_insert_with(BTreeMap::new);
    for (name, total) in hugepage_totals {
        requests
            .entry(name)
            .or_insert_with(|| Quantity(format_milli(total)));
    }
    for (name, limit) in limits {
        if is_pod_level_resource(&name) {
            requests.entry(name).or_insert(limit);
        }
    }
}

/// Local resource defaulting: per-container requests filled from limits,
/// then pod-level requests filled from pod-level limits with container
/// huge-page usage surfaced alongside.
pub fn default_pod_resources(pod: &mut Pod) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    default_container_requests(&mut spec.containers);
    if let Some(init) = spec.init_containers.as_mut() {
        default_container_requests(init);
    }
    default_pod_level_requests(spec);
}

/// Effective pod resource requests in milli-units. Regular containers are
/// summed, each init container acts as a per-resource floor, and pod-level
/// requests override the resources they are allowed to cover.
pub fn pod_requests(pod: &Pod) -> Result<BTreeMap<String, i128>, ControllerError> {
    let mut totals: BTreeMap<String, i128> = BTreeMap::new();
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(totals);
    };
    for container in &spec.containers {
        if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            for (name, quantity) in requests {
                *totals.entry(name.clone()).or_insert(0) += quantity_milli(quantity)?;
            }
        }
    }
    for container in spec.init_containers.iter().flatten() {
        if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            for (name, quantity) in requests {
                let value = quantity_milli(quantity)?;
                let entry = totals.entry(name.clone()).or_insert(0);
                if value > *entry {
                    *entry = value;
                }
            }
        }
    }
    if let Some(requests) = spec.resources.as_ref().and_then(|r| r.requests.as_ref()) {
        for (name, quantity) in requests {
            if is_pod_level_resource(name) {
                totals.insert(name.clone(), quantity_milli(quantity)?);
            }
        }
    }
    Ok(totals)
}

/// Remove API-server-injected service-account token volumes and their
/// mounts from a resolved pod.
pub fn strip_api_access_volumes(pod: &mut Pod) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    if let Some(volumes) = spec.volumes.as_mut() {
        volumes.retain(|v| !v.name.starts_with(API_ACCESS_VOLUME_PREFIX));
        if volumes.is_empty() {
            spec.volumes = None;
        }
    }
    let init = spec.init_containers.iter_mut().flatten();
    for container in spec.containers.iter_mut().chain(init) {
        if let Some(mounts) = container.volume_mounts.as_mut() {
            mounts.retain(|m| !m.name.starts_with(API_ACCESS_VOLUME_PREFIX));
            if mounts.is_empty() {
                container.volume_mounts = None;
            }
        }
    }
}

/// Deterministic, I/O-free resolver used by the quota allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultingPodResolver;

impl DefaultingPodResolver {
    pub fn resolve(&self, namespace: &str, template: &PodTemplateSpec) -> Pod {
        let mut pod = pod_from_template_spec(namespace, template);
        default_pod_resources(&mut pod);
        pod
    }
}

/// Resolver that round-trips the pod through a dry-run create so the
/// returned object carries server-side defaulting and webhook mutations.
pub struct DryRunPodResolver {
    client: Arc<dyn BufferClientTrait>,
}

impl DryRunPodResolver {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        Self { client }
    }

    pub async fn resolve(
        &self,
        namespace: &str,
        template: &PodTemplateSpec,
    ) -> Result<Pod, ControllerError> {
        let pod = pod_from_template_spec(namespace, template);
        let mut resolved = self.client.dry_run_create_pod(namespace, &pod).await?;
        strip_api_access_volumes(&mut resolved);
        Ok(resolved)
    }
}
