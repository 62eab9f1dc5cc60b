//! Pod-list hook
//!
//! Invoked by the scale-up engine on each scale-up attempt. Ready buffers
//! are materialised into placeholder pods that are appended to the engine's
//! unschedulable-pod list, tricking the autoscaler into provisioning nodes
//! ahead of real demand. The hook also maintains the fake-pod registry that
//! the scale-up status processor later uses to map outcomes back onto
//! buffers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

use buffer_client::BufferClientTrait;
use crds::{
    mark_provisioning, CapacityBuffer, ConditionStatus, FAKE_POD_ANNOTATION_VALUE,
    POD_TYPE_ANNOTATION, READY_FOR_PROVISIONING_CONDITION, SAFE_TO_EVICT_ANNOTATION,
};

use crate::error::ControllerError;
use crate::filters::{buffer_key, BufferFilter, ConditionFilter, StrategyFilter, StrategySource};
use crate::resolver::pod_from_template_spec;

/// Maps emitted fake-pod UIDs back to their owning buffers for the duration
/// of one scale-up cycle.
#[derive(Default)]
pub struct FakePodsRegistry {
    by_uid: HashMap<String, CapacityBuffer>,
}

impl FakePodsRegistry {
    pub fn clear(&mut self) {
        self.by_uid.clear();
    }

    pub fn insert(&mut self, uid: String, buffer: CapacityBuffer) {
        self.by_uid.insert(uid, buffer);
    }

    pub fn buffer_for(&self, uid: &str) -> Option<&CapacityBuffer> {
        self.by_uid.get(uid)
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

/// Whether a pod is a placeholder emitted by this hook.
pub fn is_fake_buffer_pod(pod: &Pod) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(POD_TYPE_ANNOTATION))
        .is_some_and(|v| v == FAKE_POD_ANNOTATION_VALUE)
}

pub struct PodListHook {
    client: Arc<dyn BufferClientTrait>,
    strategy_filter: StrategyFilter,
    readiness_filter: ConditionFilter,
    registry: Arc<Mutex<FakePodsRegistry>>,
    force_safe_to_evict: bool,
}

impl PodListHook {
    pub fn new(
        client: Arc<dyn BufferClientTrait>,
        allowed_strategies: Vec<String>,
        registry: Arc<Mutex<FakePodsRegistry>>,
        force_safe_to_evict: bool,
    ) -> Self {
        let strategy_filter = StrategyFilter::new(allowed_strategies, StrategySource::Status);
        // Buffers the reconciler could not translate are skipped silently;
        // the reconciler already recorded why.
        let readiness_filter = ConditionFilter::excluding(vec![(
            READY_FOR_PROVISIONING_CONDITION.to_string(),
            ConditionStatus::False,
        )]);
        Self {
            client,
            strategy_filter,
            readiness_filter,
            registry,
            force_safe_to_evict,
        }
    }

    /// Append placeholder pods for every ready buffer to the engine's
    /// unschedulable-pod list. Per-buffer failures flip `Provisioning` to
    /// False and are persisted immediately.
    pub async fn process(
        &mut self,
        mut unschedulable: Vec<Pod>,
    ) -> (Vec<Pod>, Vec<ControllerError>) {
        self.registry.lock().expect("registry lock poisoned").clear();

        let buffers = match self.client.list_capacity_buffers().await {
            Ok(buffers) => buffers,
            Err(err) => return (unschedulable, vec![err.into()]),
        };
        let (buffers, _) = self.strategy_filter.filter(buffers).await;
        let (buffers, _) = self.readiness_filter.filter(buffers).await;
        let buffers = self.drop_out_of_sync(buffers).await;

        let mut errors = Vec::new();
        for mut buffer in buffers {
            match self.materialise(&buffer).await {
                Ok(pods) => {
                    let message = format!("emitted {} placeholder pods", pods.len());
                    {
                        let mut registry = self.registry.lock().expect("registry lock poisoned");
                        for pod in &pods {
                            if let Some(uid) = pod.metadata.uid.clone() {
                                registry.insert(uid, buffer.clone());
                            }
                        }
                    }
                    unschedulable.extend(pods);
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_provisioning(status, true, &message);
                }
                Err(err) => {
                    debug!(buffer = %buffer_key(&buffer), error = %err, "buffer not provisioned");
                    let message = err.to_string();
                    let status = buffer.status.get_or_insert_with(Default::default);
                    mark_provisioning(status, false, &message);
                    errors.push(err);
                }
            }
            if let Err(err) = self.client.update_capacity_buffer_status(&buffer).await {
                warn!(buffer = %buffer_key(&buffer), error = %err, "provisioning status not persisted");
                errors.push(ControllerError::StatusUpdate {
                    buffer: buffer_key(&buffer),
                    reason: err.to_string(),
                });
            }
        }
        (unschedulable, errors)
    }

    /// Drop buffers whose recorded pod-template generation no longer
    /// matches the live template: their translated status is stale and the
    /// reconciler has not caught up yet. Fetch failures keep the buffer so
    /// the error is reported on its Provisioning condition.
    async fn drop_out_of_sync(&self, buffers: Vec<CapacityBuffer>) -> Vec<CapacityBuffer> {
        let mut kept = Vec::new();
        for buffer in buffers {
            let recorded = buffer.status.as_ref().and_then(|s| {
                Some((s.pod_template_ref.as_ref()?.name.clone(), s.pod_template_generation?))
            });
            let Some((template_name, recorded_generation)) = recorded else {
                // Emission will fail with a descriptive condition below.
                kept.push(buffer);
                continue;
            };
            let namespace = buffer.metadata.namespace.clone().unwrap_or_default();
            match self.client.get_pod_template(&namespace, &template_name).await {
                Ok(template)
                    if template.metadata.generation.unwrap_or_default()
                        != recorded_generation =>
                {
                    debug!(
                        buffer = %buffer_key(&buffer),
                        "pod template changed since translation, skipping buffer"
                    );
                }
                _ => kept.push(buffer),
            }
        }
        kept
    }

    async fn materialise(&self, buffer: &CapacityBuffer) -> Result<Vec<Pod>, ControllerError> {
        let namespace = buffer.metadata.namespace.clone().unwrap_or_default();
        let name = buffer.metadata.name.clone().unwrap_or_default();
        let uid = buffer.metadata.uid.clone().unwrap_or_default();

        let status = buffer.status.as_ref().ok_or_else(|| {
            ControllerError::translation(&namespace, &name, "buffer has no translated status")
        })?;
        let template_ref = status.pod_template_ref.as_ref().ok_or_else(|| {
            ControllerError::translation(&namespace, &name, "status has no pod template reference")
        })?;
        let replicas = status.replicas.ok_or_else(|| {
            ControllerError::translation(&namespace, &name, "status has no replica count")
        })?;
        if replicas == 0 {
            return Err(ControllerError::translation(&namespace, &name, "empty buffer"));
        }

        let template = self
            .client
            .get_pod_template(&namespace, &template_ref.name)
            .await?;
        let template_spec = template.template.ok_or_else(|| {
            ControllerError::translation(
                &namespace,
                &name,
                format!("pod template {} has no template spec", template_ref.name),
            )
        })?;

        let mut pods = Vec::with_capacity(replicas as usize);
        for i in 1..=replicas {
            let mut pod = pod_from_template_spec(&namespace, &template_spec);
            pod.metadata.name = Some(format!("capacity-buffer-{name}-{i}"));
            pod.metadata.uid = Some(format!("{uid}-{i}"));
            let annotations = pod.metadata.annotations.get_or_insert_with(Default::default);
            annotations.insert(
                POD_TYPE_ANNOTATION.to_string(),
                FAKE_POD_ANNOTATION_VALUE.to_string(),
            );
            if self.force_safe_to_evict {
                annotations.insert(SAFE_TO_EVICT_ANNOTATION.to_string(), "true".to_string());
            }
            pods.push(pod);
        }
        Ok(pods)
    }
}
