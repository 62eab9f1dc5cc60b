//! CapacityBuffer CRD
//!
//! Declares warm headroom for a cluster: a pod shape plus a replica count
//! that the controller turns into placeholder pods for the scale-up engine.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;
use crate::references::{LocalObjectRef, ScalableRef};

/// Provisioning strategy applied when `spec.provisioningStrategy` is empty.
pub const ACTIVE_CAPACITY_STRATEGY: &str = "buffer.x-k8s.io/active-capacity";

/// Annotation key identifying placeholder pods emitted by the controller.
pub const POD_TYPE_ANNOTATION: &str = "podType";

/// Annotation value identifying placeholder pods emitted by the controller.
pub const FAKE_POD_ANNOTATION_VALUE: &str = "capacityBufferFakePod";

/// Cluster-autoscaler annotation marking a pod as safe to evict.
pub const SAFE_TO_EVICT_ANNOTATION: &str = "cluster-autoscaler.kubernetes.io/safe-to-evict";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "autoscaling.x-k8s.io",
    version = "v1beta1",
    kind = "CapacityBuffer",
    namespaced,
    status = "CapacityBufferStatus",
    shortname = "cb"
)]
#[serde(rename_all = "camelCase")]
pub struct CapacityBufferSpec {
    /// Provisioning strategy for this buffer. Empty means the default
    /// active-capacity strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_strategy: Option<String>,

    /// Reference to a PodTemplate in the buffer's namespace.
    /// Mutually exclusive with `scalableRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template_ref: Option<LocalObjectRef>,

    /// Reference to a scalable workload (Deployment, ReplicaSet, ...).
    /// Mutually exclusive with `podTemplateRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalable_ref: Option<ScalableRef>,

    /// Desired number of placeholder replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Headroom as a percentage of the scalable workload's replicas.
    /// Only meaningful together with `scalableRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i32>,

    /// Aggregate resource budget, e.g. `{cpu: "2", memory: "9Gi"}`.
    /// Caps the replica count so summed pod requests stay within the budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Quantity>>,
}

/// Translated view of a buffer: what the controller actually intends to
/// provision, written by the translator chain and quota allocator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityBufferStatus {
    /// Pod template the placeholder pods will be materialised from.
    /// Set together with `podTemplateGeneration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template_ref: Option<LocalObjectRef>,

    /// Number of placeholder pods to emit. Always non-negative when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Generation of the referenced pod template at translation time.
    /// Set together with `podTemplateRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template_generation: Option<i64>,

    /// Resolved provisioning strategy (empty spec value mapped to default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_strategy: Option<String>,

    /// Conditions keyed by type: `ReadyForProvisioning`, `Provisioning`,
    /// `LimitedByQuotas`. At most one entry per type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl CapacityBuffer {
    /// The buffer's spec strategy with empty mapped to the default strategy.
    pub fn effective_strategy(&self) -> &str {
        match self.spec.provisioning_strategy.as_deref() {
            None | Some("") => ACTIVE_CAPACITY_STRATEGY,
            Some(s) => s,
        }
    }
}
