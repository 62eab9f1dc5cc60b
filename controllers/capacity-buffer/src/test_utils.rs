//! Shared fixtures for controller unit tests

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v1::{Scale, ScaleSpec, ScaleStatus};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplate, PodTemplateSpec, ResourceQuota, ResourceQuotaStatus,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crds::{CapacityBuffer, CapacityBufferSpec, CapacityBufferStatus, LocalObjectRef};

pub fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

pub fn buffer(namespace: &str, name: &str) -> CapacityBuffer {
    let mut buffer = CapacityBuffer::new(name, CapacityBufferSpec::default());
    buffer.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("{name}-uid")),
        generation: Some(1),
        ..Default::default()
    };
    buffer
}

/// A buffer referencing an existing pod template by name.
pub fn buffer_with_template_ref(
    namespace: &str,
    name: &str,
    template: &str,
    replicas: Option<i32>,
) -> CapacityBuffer {
    let mut buffer = buffer(namespace, name);
    buffer.spec.pod_template_ref = Some(LocalObjectRef::new(template));
    buffer.spec.replicas = replicas;
    buffer
}

/// A buffer whose status is already translated, as the reconciler would
/// leave it after a successful pass.
pub fn translated_buffer(
    namespace: &str,
    name: &str,
    template: &str,
    generation: i64,
    replicas: i32,
) -> CapacityBuffer {
    let mut buffer = buffer_with_template_ref(namespace, name, template, Some(replicas));
    let mut status = CapacityBufferStatus {
        pod_template_ref: Some(LocalObjectRef::new(template)),
        pod_template_generation: Some(generation),
        replicas: Some(replicas),
        provisioning_strategy: Some(crds::ACTIVE_CAPACITY_STRATEGY.to_string()),
        ..Default::default()
    };
    crds::mark_ready_for_provisioning(&mut status);
    buffer.status = Some(status);
    buffer
}

pub fn pod_spec_with_requests(requests: &[(&str, &str)]) -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: "app".to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(quantities(requests)),
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn pod_template(
    namespace: &str,
    name: &str,
    generation: i64,
    requests: &[(&str, &str)],
) -> PodTemplate {
    PodTemplate {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(generation),
            ..Default::default()
        },
        template: Some(PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(
                    [("app".to_string(), name.to_string())].into_iter().collect(),
                ),
                ..Default::default()
            }),
            spec: Some(pod_spec_with_requests(requests)),
        }),
    }
}

/// A quota with `status.hard` / `status.used` populated; scopes left empty.
pub fn resource_quota(
    namespace: &str,
    name: &str,
    hard: &[(&str, &str)],
    used: &[(&str, &str)],
) -> ResourceQuota {
    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-quota-uid")),
            ..Default::default()
        },
        spec: None,
        status: Some(ResourceQuotaStatus {
            hard: Some(quantities(hard)),
            used: Some(quantities(used)),
        }),
    }
}

pub fn scale(namespace: &str, name: &str, replicas: i32, selector: &str) -> Scale {
    Scale {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ScaleSpec {
            replicas: Some(replicas),
        }),
        status: Some(ScaleStatus {
            replicas,
            selector: Some(selector.to_string()),
        }),
    }
}
