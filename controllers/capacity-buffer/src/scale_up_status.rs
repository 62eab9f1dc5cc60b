//! Scale-up status processor
//!
//! Companion to the pod-list hook. After the scale-up engine reports its
//! outcome, placeholder pods are stripped from the engine's pod lists so
//! they never leak into downstream status handling, and each owning buffer
//! gets an event describing whether its placeholders triggered a scale-up.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ObjectReference, Pod};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

use crds::CapacityBuffer;

use crate::hook::{is_fake_buffer_pod, FakePodsRegistry};

pub const TRIGGERED_SCALE_UP_REASON: &str = "TriggeredScaleUp";
pub const NOT_TRIGGER_SCALE_UP_REASON: &str = "NotTriggerScaleUp";

/// Outcome of one scale-up attempt, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleUpResult {
    Successful,
    Error,
    NoOptionsAvailable,
    NotTried,
}

/// One node group the engine decided to grow.
#[derive(Debug, Clone)]
pub struct ScaleUpInfo {
    pub group: String,
    pub current_size: i32,
    pub new_size: i32,
}

/// A pod the engine could not place, with the per-node-group reasons.
#[derive(Debug, Clone)]
pub struct NoScaleUpInfo {
    pub pod: Pod,
    pub reasons: Vec<String>,
}

/// The engine's view of one scale-up attempt.
#[derive(Debug, Clone)]
pub struct ScaleUpStatus {
    pub result: ScaleUpResult,
    pub scale_up_infos: Vec<ScaleUpInfo>,
    pub pods_triggered_scale_up: Vec<Pod>,
    pub pods_awaiting_evaluation: Vec<Pod>,
    pub pods_remain_unschedulable: Vec<NoScaleUpInfo>,
}

/// Destination for per-buffer scale-up events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, buffer: &CapacityBuffer, reason: &str, message: &str);
}

/// Publishes buffer events through the cluster event API.
pub struct RecorderEventSink {
    recorder: Recorder,
}

impl RecorderEventSink {
    pub fn new(client: kube::Client, controller_name: &str) -> Self {
        let recorder = Recorder::new(client, Reporter::from(controller_name.to_string()));
        Self { recorder }
    }
}

#[async_trait]
impl EventSink for RecorderEventSink {
    async fn publish(&self, buffer: &CapacityBuffer, reason: &str, message: &str) {
        let reference = ObjectReference {
            api_version: Some("autoscaling.x-k8s.io/v1beta1".to_string()),
            kind: Some("CapacityBuffer".to_string()),
            name: buffer.metadata.name.clone(),
            namespace: buffer.metadata.namespace.clone(),
            uid: buffer.metadata.uid.clone(),
            ..Default::default()
        };
        let event = Event {
            type_: if reason == TRIGGERED_SCALE_UP_REASON {
                EventType::Normal
            } else {
                EventType::Warning
            },
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "ScaleUp".to_string(),
            secondary: None,
        };
        if let Err(err) = self.recorder.publish(&event, &reference).await {
            warn!(error = %err, reason, "buffer event not published");
        }
    }
}

/// Collects events in memory. Test sink.
#[derive(Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<(String, String)>>,
}

impl CollectingEventSink {
    /// `(buffer name, reason)` pairs in publish order.
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn publish(&self, buffer: &CapacityBuffer, reason: &str, _message: &str) {
        self.events
            .lock()
            .expect("event sink lock poisoned")
            .push((
                buffer.metadata.name.clone().unwrap_or_default(),
                reason.to_string(),
            ));
    }
}

pub struct FakePodsScaleUpStatusProcessor {
    registry: Arc<Mutex<FakePodsRegistry>>,
    events: Arc<dyn EventSink>,
}

impl FakePodsScaleUpStatusProcessor {
    pub fn new(registry: Arc<Mutex<FakePodsRegistry>>, events: Arc<dyn EventSink>) -> Self {
        Self { registry, events }
    }

    /// Strip placeholder pods from the engine's lists and emit one event per
    /// owning buffer. Placeholders whose UID is not in the registry are
    /// stripped without an event.
    pub async fn process(&self, status: &mut ScaleUpStatus) {
        let triggered_fakes = extract_fake_pods(&mut status.pods_triggered_scale_up);
        let _ = extract_fake_pods(&mut status.pods_awaiting_evaluation);
        let mut unschedulable_fakes = Vec::new();
        status.pods_remain_unschedulable.retain(|info| {
            if is_fake_buffer_pod(&info.pod) {
                unschedulable_fakes.push(info.clone());
                false
            } else {
                true
            }
        });

        // An errored attempt says nothing about any buffer's placeholders.
        if status.result == ScaleUpResult::Error {
            return;
        }

        if !status.scale_up_infos.is_empty() {
            let groups = status
                .scale_up_infos
                .iter()
                .map(|info| {
                    format!("{} {}->{}", info.group, info.current_size, info.new_size)
                })
                .collect::<Vec<_>>()
                .join(", ");
            let message = format!("placeholder pods triggered scale-up: {groups}");
            for buffer in self.owning_buffers(triggered_fakes.iter()) {
                self.events
                    .publish(&buffer, TRIGGERED_SCALE_UP_REASON, &message)
                    .await;
            }
        }

        let rejected: Vec<Pod> = unschedulable_fakes.iter().map(|i| i.pod.clone()).collect();
        for buffer in self.owning_buffers(rejected.iter()) {
            let reasons = unschedulable_fakes
                .iter()
                .flat_map(|info| info.reasons.iter().cloned())
                .collect::<Vec<_>>()
                .join("; ");
            let message = if reasons.is_empty() {
                "placeholder pods did not trigger scale-up".to_string()
            } else {
                format!("placeholder pods did not trigger scale-up: {reasons}")
            };
            self.events
                .publish(&buffer, NOT_TRIGGER_SCALE_UP_REASON, &message)
                .await;
        }
    }

    /// Resolve pods to their owning buffers through the registry, one entry
    /// per buffer in first-seen order.
    fn owning_buffers<'a>(&self, pods: impl Iterator<Item = &'a Pod>) -> Vec<CapacityBuffer> {
        let registry = self.registry.lock().expect("registry lock poisoned");
        let mut seen = HashSet::new();
        let mut buffers = Vec::new();
        for pod in pods {
            let Some(uid) = pod.metadata.uid.as_deref() else {
                continue;
            };
            let Some(buffer) = registry.buffer_for(uid) else {
                continue;
            };
            let buffer_uid = buffer.metadata.uid.clone().unwrap_or_default();
            if seen.insert(buffer_uid) {
                buffers.push(buffer.clone());
            }
        }
        buffers
    }
}

fn extract_fake_pods(pods: &mut Vec<Pod>) -> Vec<Pod> {
    let mut fakes = Vec::new();
    pods.retain(|pod| {
        if is_fake_buffer_pod(pod) {
            fakes.push(pod.clone());
            false
        } else {
            true
        }
    });
    fakes
}
