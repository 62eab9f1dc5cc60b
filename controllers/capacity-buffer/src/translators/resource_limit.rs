//! Resource-limit translator: clamps the replica count so summed pod
//! requests stay inside the buffer's aggregate resource budget.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

use buffer_client::BufferClientTrait;
use crds::{mark_not_ready_for_provisioning, mark_ready_for_provisioning, CapacityBuffer};

use crate::error::ControllerError;
use crate::filters::buffer_key;
use crate::quantity::{clamp_replicas, milli_div_floor, quantity_milli};
use crate::resolver::{pod_requests, DefaultingPodResolver};
use crate::translators::BufferTranslator;

pub struct ResourceLimitTranslator {
    client: Arc<dyn BufferClientTrait>,
    resolver: DefaultingPodResolver,
}

impl ResourceLimitTranslator {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        Self {
            client,
            resolver: DefaultingPodResolver,
        }
    }

    async fn max_pods(
        &self,
        namespace: &str,
        name: &str,
        template_name: &str,
        limits: &std::collections::BTreeMap<String, Quantity>,
    ) -> Result<Option<i32>, ControllerError> {
        let template = self.client.get_pod_template(namespace, template_name).await?;
        let template_spec = template.template.ok_or_else(|| {
            ControllerError::translation(
                namespace,
                name,
                format!("pod template {template_name} has no template spec"),
            )
        })?;
        let pod = self.resolver.resolve(namespace, &template_spec);
        let requests = pod_requests(&pod)?;

        let mut max_pods: Option<i128> = None;
        for (resource, limit) in limits {
            let limit = quantity_milli(limit)?;
            if limit < 0 {
                continue;
            }
            let Some(&request) = requests.get(resource) else {
                continue;
            };
            if request <= 0 {
                continue;
            }
            let fit = milli_div_floor(limit, request);
            max_pods = Some(max_pods.map_or(fit, |current| current.min(fit)));
        }
        Ok(max_pods.map(clamp_replicas))
    }
}

#[async_trait]
impl BufferTranslator for ResourceLimitTranslator {
    async fn translate(&self, buffers: &mut [CapacityBuffer]) -> Vec<ControllerError> {
        let mut errors = Vec::new();
        for buffer in buffers.iter_mut() {
            let Some(limits) = buffer.spec.limits.clone() else {
                continue;
            };
            let namespace = buffer.metadata.namespace.clone().unwrap_or_default();
            let name = buffer.metadata.name.clone().unwrap_or_default();

            let Some(template_name) = buffer
                .status
                .as_ref()
                .and_then(|s| s.pod_template_ref.as_ref())
                .map(|r| r.name.clone())
            else {
                let message = "resource limits require a resolved pod template";
                let status = buffer.status.get_or_insert_with(Default::default);
                mark_not_ready_for_provisioning(status, message);
                errors.push(ControllerError::translation(&namespace, &name, message));
                continue;
            };

            match self.max_pods(&namespace, &name, &template_name, &limits).await {
                Ok(Some(max_pods)) => {
                    let status = buffer.status.get_or_insert_with(Default::default);
                    status.replicas = Some(match status.replicas {
                        Some(current) => current.min(max_pods),
                        None => max_pods,
                    });
                    mark_ready_for_provisioning(status);
                    debug!(
                        buffer = %buffer_key(buffer),
                        max_pods,
                        "clamped replicas to resource limits"
                    );
                }
                Ok(None) => {
                    let message = "no resource in limits matched pod template";
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_not_ready_for_provisioning(status, message);
                    errors.push(ControllerError::translation(&namespace, &name, message));
                }
                Err(err) => {
                    let message = err.to_string();
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_not_ready_for_provisioning(status, &message);
                    errors.push(err);
                }
            }
        }
        errors
    }
}
