//! Pod-template translator: the direct `spec.podTemplateRef` case.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use buffer_client::BufferClientTrait;
use crds::{mark_not_ready_for_provisioning, mark_ready_for_provisioning, CapacityBuffer};

use crate::error::ControllerError;
use crate::filters::buffer_key;
use crate::translators::BufferTranslator;

pub struct PodTemplateTranslator {
    client: Arc<dyn BufferClientTrait>,
}

impl PodTemplateTranslator {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BufferTranslator for PodTemplateTranslator {
    async fn translate(&self, buffers: &mut [CapacityBuffer]) -> Vec<ControllerError> {
        let mut errors = Vec::new();
        for buffer in buffers.iter_mut() {
            let Some(template_ref) = buffer.spec.pod_template_ref.clone() else {
                continue;
            };
            let namespace = buffer.metadata.namespace.clone().unwrap_or_default();
            let name = buffer.metadata.name.clone().unwrap_or_default();

            let template = match self.client.get_pod_template(&namespace, &template_ref.name).await
            {
                Ok(template) => template,
                Err(err) => {
                    let message =
                        format!("failed to fetch pod template {}: {err}", template_ref.name);
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_not_ready_for_provisioning(status, &message);
                    errors.push(ControllerError::translation(&namespace, &name, message));
                    continue;
                }
            };

            let Some(replicas) = buffer.spec.replicas.map(|r| r.max(0)) else {
                let message = "cannot determine replica count: spec.replicas is not set";
                let status = buffer.status.get_or_insert_with(Default::default);
                mark_not_ready_for_provisioning(status, message);
                errors.push(ControllerError::translation(&namespace, &name, message));
                continue;
            };

            let strategy = buffer.effective_strategy().to_string();
            let status = buffer.status.get_or_insert_with(Default::default);
            status.pod_template_ref = Some(template_ref);
            status.pod_template_generation = Some(template.metadata.generation.unwrap_or_default());
            status.replicas = Some(replicas);
            status.provisioning_strategy = Some(strategy);
            mark_ready_for_provisioning(status);
            debug!(buffer = %buffer_key(buffer), replicas, "translated pod-template buffer");
        }
        errors
    }
}
