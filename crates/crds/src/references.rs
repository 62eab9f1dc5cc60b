//! Object references used by the CapacityBuffer CRD
//!
//! `LocalObjectRef` points at a PodTemplate in the buffer's own namespace.
//! `ScalableRef` points at any workload exposing the `/scale` subresource,
//! following the Kubernetes `TypedLocalObjectReference` pattern.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to an object in the same namespace as the referencing buffer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectRef {
    /// Name of the referenced object
    pub name: String,
}

impl LocalObjectRef {
    /// Create a reference by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Reference to a scalable workload in the buffer's namespace.
///
/// The `(apiGroup, kind)` pair is resolved through REST discovery to locate
/// the `/scale` subresource; well-known kinds (Deployment, ReplicaSet,
/// StatefulSet, ReplicationController, Job) also have a typed fallback path.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScalableRef {
    /// API group of the referenced workload (e.g. "apps")
    pub api_group: String,

    /// Kind of the referenced workload (e.g. "Deployment")
    pub kind: String,

    /// Name of the referenced workload
    pub name: String,
}

impl ScalableRef {
    /// Create a new scalable reference.
    pub fn new(
        api_group: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}
