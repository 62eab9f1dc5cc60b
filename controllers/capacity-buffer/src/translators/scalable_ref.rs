//! Scalable-ref translator
//!
//! Resolves `spec.scalableRef` into a managed pod template plus a replica
//! count. The live `/scale` subresource is tried first: the template shape
//! is taken from the most recently created pod behind the scale selector,
//! or from the previously managed template when no pods are running. When
//! the scale path fails entirely, a typed dispatch on `(apiGroup, kind)`
//! reads the template straight from the owning workload's spec.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodTemplate, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::debug;

use buffer_client::BufferClientTrait;
use crds::{
    mark_not_ready_for_provisioning, mark_ready_for_provisioning, CapacityBuffer, LocalObjectRef,
    ScalableRef,
};

use crate::error::ControllerError;
use crate::filters::buffer_key;
use crate::quantity::clamp_replicas;
use crate::resolver::{strip_api_access_volumes, DryRunPodResolver};
use crate::translators::BufferTranslator;

const MANAGED_TEMPLATE_PREFIX: &str = "capacitybuffer-";
const MANAGED_TEMPLATE_SUFFIX: &str = "-pod-template";

/// Longest DNS subdomain name accepted by the API server.
const MAX_NAME_LENGTH: usize = 253;

/// Name of the managed pod template owned by a buffer. Long buffer names
/// are truncated so the result stays a valid object name.
pub fn managed_template_name(buffer_name: &str) -> String {
    let budget = MAX_NAME_LENGTH - MANAGED_TEMPLATE_PREFIX.len() - MANAGED_TEMPLATE_SUFFIX.len();
    let truncated = if buffer_name.len() > budget {
        // Floor to a char boundary; names are ASCII in practice but slicing
        // mid-character would panic.
        let mut end = budget;
        while !buffer_name.is_char_boundary(end) {
            end -= 1;
        }
        &buffer_name[..end]
    } else {
        buffer_name
    };
    format!("{MANAGED_TEMPLATE_PREFIX}{truncated}{MANAGED_TEMPLATE_SUFFIX}")
}

enum Resolution {
    LivePod { pod: Pod, replicas: i32 },
    ManagedTemplate { template: PodTemplateSpec, replicas: i32 },
    TypedKind { template: PodTemplateSpec, replicas: i32 },
}

pub struct ScalableRefTranslator {
    client: Arc<dyn BufferClientTrait>,
    resolver: DryRunPodResolver,
}

impl ScalableRefTranslator {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        let resolver = DryRunPodResolver::new(client.clone());
        Self { client, resolver }
    }

    async fn resolve(
        &self,
        namespace: &str,
        buffer: &CapacityBuffer,
        scalable: &ScalableRef,
    ) -> Result<Resolution, ControllerError> {
        match self.resolve_from_scale(namespace, buffer, scalable).await {
            Ok(resolution) => Ok(resolution),
            Err(scale_err) => {
                debug!(
                    buffer = %buffer_key(buffer),
                    error = %scale_err,
                    "scale subresource path failed, trying typed kind"
                );
                self.resolve_from_typed_kind(namespace, scalable).await
            }
        }
    }

    async fn resolve_from_scale(
        &self,
        namespace: &str,
        buffer: &CapacityBuffer,
        scalable: &ScalableRef,
    ) -> Result<Resolution, ControllerError> {
        let name = buffer.metadata.name.as_deref().unwrap_or_default();
        let scale = self
            .client
            .get_scale(namespace, &scalable.api_group, &scalable.kind, &scalable.name)
            .await?;
        let replicas = scale.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        let selector = scale
            .status
            .as_ref()
            .and_then(|s| s.selector.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ControllerError::translation(
                    namespace,
                    name,
                    format!("scale subresource of {} has no selector", scalable.name),
                )
            })?;

        let pods = self.client.list_pods_by_selector(namespace, &selector).await?;
        if let Some(pod) = most_recently_created(pods) {
            return Ok(Resolution::LivePod { pod, replicas });
        }

        // No running pods: reuse the template this buffer managed earlier.
        let managed = managed_template_name(name);
        match self.client.get_pod_template(namespace, &managed).await {
            Ok(template) => {
                let template = template.template.ok_or_else(|| {
                    ControllerError::translation(
                        namespace,
                        name,
                        format!("managed pod template {managed} has no template spec"),
                    )
                })?;
                Ok(Resolution::ManagedTemplate { template, replicas })
            }
            Err(_) => Err(ControllerError::translation(
                namespace,
                name,
                format!(
                    "no running pods behind {} and no previously managed template",
                    scalable.name
                ),
            )),
        }
    }

    async fn resolve_from_typed_kind(
        &self,
        namespace: &str,
        scalable: &ScalableRef,
    ) -> Result<Resolution, ControllerError> {
        let (template, replicas) = match (scalable.api_group.as_str(), scalable.kind.as_str()) {
            ("apps", "Deployment") => {
                let deployment = self.client.get_deployment(namespace, &scalable.name).await?;
                let spec = deployment.spec.ok_or_else(|| {
                    ControllerError::translation(namespace, &scalable.name, "deployment has no spec")
                })?;
                (spec.template, spec.replicas.unwrap_or(0))
            }
            ("apps", "ReplicaSet") => {
                let rs = self.client.get_replica_set(namespace, &scalable.name).await?;
                let spec = rs.spec.ok_or_else(|| {
                    ControllerError::translation(namespace, &scalable.name, "replicaset has no spec")
                })?;
                let template = spec.template.ok_or_else(|| {
                    ControllerError::translation(
                        namespace,
                        &scalable.name,
                        "replicaset has no pod template",
                    )
                })?;
                (template, spec.replicas.unwrap_or(0))
            }
            ("apps", "StatefulSet") => {
                let sts = self.client.get_stateful_set(namespace, &scalable.name).await?;
                let spec = sts.spec.ok_or_else(|| {
                    ControllerError::translation(
                        namespace,
                        &scalable.name,
                        "statefulset has no spec",
                    )
                })?;
                (spec.template, spec.replicas.unwrap_or(0))
            }
            ("", "ReplicationController") => {
                let rc = self
                    .client
                    .get_replication_controller(namespace, &scalable.name)
                    .await?;
                let spec = rc.spec.ok_or_else(|| {
                    ControllerError::translation(
                        namespace,
                        &scalable.name,
                        "replicationcontroller has no spec",
                    )
                })?;
                let template = spec.template.ok_or_else(|| {
                    ControllerError::translation(
                        namespace,
                        &scalable.name,
                        "replicationcontroller has no pod template",
                    )
                })?;
                (template, spec.replicas.unwrap_or(0))
            }
            ("batch", "Job") => {
                let job = self.client.get_job(namespace, &scalable.name).await?;
                let spec = job.spec.ok_or_else(|| {
                    ControllerError::translation(namespace, &scalable.name, "job has no spec")
                })?;
                (spec.template, spec.parallelism.unwrap_or(0))
            }
            (group, kind) => {
                return Err(ControllerError::translation(
                    namespace,
                    &scalable.name,
                    format!("unsupported scalable kind {group}/{kind}"),
                ));
            }
        };
        Ok(Resolution::TypedKind { template, replicas })
    }

    /// Build the template spec to persist from a resolution. Typed-kind
    /// templates go through the dry-run resolver so the persisted shape is
    /// stable across reconciles; live pods are already server-defaulted.
    async fn template_spec_for(
        &self,
        namespace: &str,
        resolution: Resolution,
    ) -> Result<(PodTemplateSpec, i32), ControllerError> {
        match resolution {
            Resolution::LivePod { mut pod, replicas } => {
                strip_api_access_volumes(&mut pod);
                if let Some(spec) = pod.spec.as_mut() {
                    spec.node_name = None;
                }
                let template = PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: pod.metadata.labels,
                        annotations: pod.metadata.annotations,
                        ..Default::default()
                    }),
                    spec: pod.spec,
                };
                Ok((template, replicas))
            }
            Resolution::ManagedTemplate { template, replicas } => Ok((template, replicas)),
            Resolution::TypedKind { template, replicas } => {
                let pod = self.resolver.resolve(namespace, &template).await?;
                let template = PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: pod.metadata.labels,
                        annotations: pod.metadata.annotations,
                        ..Default::default()
                    }),
                    spec: pod.spec,
                };
                Ok((template, replicas))
            }
        }
    }

    async fn persist_managed_template(
        &self,
        namespace: &str,
        buffer: &CapacityBuffer,
        template_spec: PodTemplateSpec,
    ) -> Result<PodTemplate, ControllerError> {
        let buffer_name = buffer.metadata.name.as_deref().unwrap_or_default();
        let name = managed_template_name(buffer_name);
        let owner = OwnerReference {
            api_version: "autoscaling.x-k8s.io/v1beta1".to_string(),
            kind: "CapacityBuffer".to_string(),
            name: buffer_name.to_string(),
            uid: buffer.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: None,
        };
        let mut template = PodTemplate {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            template: Some(template_spec),
        };

        match self.client.get_pod_template(namespace, &name).await {
            Ok(existing) => {
                template.metadata.resource_version = existing.metadata.resource_version;
                Ok(self.client.update_pod_template(&template).await?)
            }
            Err(err) if err.is_not_found() => {
                Ok(self.client.create_pod_template(&template).await?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn most_recently_created(pods: Vec<Pod>) -> Option<Pod> {
    pods.into_iter()
        .max_by_key(|p| p.metadata.creation_timestamp.clone().map(|t| t.0))
}

fn compute_replicas(
    percentage: Option<i32>,
    spec_replicas: Option<i32>,
    scalable_replicas: i32,
) -> Option<i32> {
    let from_percentage = percentage.map(|p| {
        let value = i64::from(p.max(0)) * i64::from(scalable_replicas.max(0)) / 100;
        clamp_replicas(i128::from(value))
    });
    let from_replicas = spec_replicas.map(|r| r.max(0));
    match (from_percentage, from_replicas) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[async_trait]
impl BufferTranslator for ScalableRefTranslator {
    async fn translate(&self, buffers: &mut [CapacityBuffer]) -> Vec<ControllerError> {
        let mut errors = Vec::new();
        for buffer in buffers.iter_mut() {
            let Some(scalable) = buffer.spec.scalable_ref.clone() else {
                continue;
            };
            let namespace = buffer.metadata.namespace.clone().unwrap_or_default();
            let name = buffer.metadata.name.clone().unwrap_or_default();

            let resolved = match self.resolve(&namespace, buffer, &scalable).await {
                Ok(resolution) => self.template_spec_for(&namespace, resolution).await,
                Err(err) => Err(err),
            };
            let (template_spec, scalable_replicas) = match resolved {
                Ok(result) => result,
                Err(err) => {
                    let message = err.to_string();
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_not_ready_for_provisioning(status, &message);
                    errors.push(err);
                    continue;
                }
            };

            let Some(replicas) =
                compute_replicas(buffer.spec.percentage, buffer.spec.replicas, scalable_replicas)
            else {
                let message = "cannot determine replica count: neither replicas nor percentage set";
                let status = buffer.status.get_or_insert_with(Default::default);
                mark_not_ready_for_provisioning(status, message);
                errors.push(ControllerError::translation(&namespace, &name, message));
                continue;
            };

            let template = match self
                .persist_managed_template(&namespace, buffer, template_spec)
                .await
            {
                Ok(template) => template,
                Err(err) => {
                    let message = format!("failed to persist managed pod template: {err}");
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_not_ready_for_provisioning(status, &message);
                    errors.push(ControllerError::translation(&namespace, &name, message));
                    continue;
                }
            };

            let strategy = buffer.effective_strategy().to_string();
            let status = buffer.status.get_or_insert_with(Default::default);
            status.pod_template_ref = template
                .metadata
                .name
                .as_deref()
                .map(LocalObjectRef::new);
            status.pod_template_generation = Some(template.metadata.generation.unwrap_or_default());
            status.replicas = Some(replicas);
            status.provisioning_strategy = Some(strategy);
            mark_ready_for_provisioning(status);
            debug!(buffer = %buffer_key(buffer), replicas, "translated scalable-ref buffer");
        }
        errors
    }
}
