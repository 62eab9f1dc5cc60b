//! Buffer filters
//!
//! Each filter splits a buffer list into `(kept, dropped)` without
//! reordering. The generation filters are stateful; `cleanup` resets their
//! caches so a restarted pipeline observes every buffer as new.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use buffer_client::BufferClientTrait;
use crds::{has_condition, CapacityBuffer, ConditionStatus};

/// `namespace/name` key used by caches and log lines.
pub fn buffer_key(buffer: &CapacityBuffer) -> String {
    format!(
        "{}/{}",
        buffer.metadata.namespace.as_deref().unwrap_or_default(),
        buffer.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Splits buffers into kept and dropped halves, preserving input order.
#[async_trait]
pub trait BufferFilter: Send + Sync {
    async fn filter(
        &mut self,
        buffers: Vec<CapacityBuffer>,
    ) -> (Vec<CapacityBuffer>, Vec<CapacityBuffer>);

    /// Reset any per-buffer state held between passes.
    fn cleanup(&mut self) {}
}

/// Which field the strategy filter reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySource {
    /// `spec.provisioningStrategy`, used by the reconciler.
    Spec,
    /// `status.provisioningStrategy`, used by the pod-list hook.
    Status,
}

/// Keeps buffers whose provisioning strategy is in the allow-list. A missing
/// strategy compares as the empty string; callers that accept the default
/// strategy include `""` in the allow-list.
pub struct StrategyFilter {
    allowed: HashSet<String>,
    source: StrategySource,
}

impl StrategyFilter {
    pub fn new(allowed: impl IntoIterator<Item = String>, source: StrategySource) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            source,
        }
    }

    fn strategy_of<'a>(&self, buffer: &'a CapacityBuffer) -> &'a str {
        match self.source {
            StrategySource::Spec => buffer.spec.provisioning_strategy.as_deref(),
            StrategySource::Status => buffer
                .status
                .as_ref()
                .and_then(|s| s.provisioning_strategy.as_deref()),
        }
        .unwrap_or_default()
    }
}

#[async_trait]
impl BufferFilter for StrategyFilter {
    async fn filter(
        &mut self,
        buffers: Vec<CapacityBuffer>,
    ) -> (Vec<CapacityBuffer>, Vec<CapacityBuffer>) {
        buffers
            .into_iter()
            .partition(|b| self.allowed.contains(self.strategy_of(b)))
    }
}

/// How the condition filter interprets its `(type, status)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionMatch {
    /// Drop a buffer carrying any of the pairs.
    Exclusion,
    /// Keep a buffer only when it carries all of the pairs.
    Inclusion,
}

/// Filters buffers on their status conditions.
pub struct ConditionFilter {
    pairs: Vec<(String, ConditionStatus)>,
    mode: ConditionMatch,
}

impl ConditionFilter {
    /// Drop buffers that carry any of the given `(type, status)` pairs.
    pub fn excluding(pairs: Vec<(String, ConditionStatus)>) -> Self {
        Self {
            pairs,
            mode: ConditionMatch::Exclusion,
        }
    }

    /// Keep only buffers that carry all of the given `(type, status)` pairs.
    pub fn requiring(pairs: Vec<(String, ConditionStatus)>) -> Self {
        Self {
            pairs,
            mode: ConditionMatch::Inclusion,
        }
    }

    fn keeps(&self, buffer: &CapacityBuffer) -> bool {
        let has_pair = |(type_, status): &(String, ConditionStatus)| {
            buffer
                .status
                .as_ref()
                .is_some_and(|s| has_condition(s, type_, *status))
        };
        match self.mode {
            ConditionMatch::Exclusion => !self.pairs.iter().any(has_pair),
            ConditionMatch::Inclusion => self.pairs.iter().all(has_pair),
        }
    }
}

#[async_trait]
impl BufferFilter for ConditionFilter {
    async fn filter(
        &mut self,
        buffers: Vec<CapacityBuffer>,
    ) -> (Vec<CapacityBuffer>, Vec<CapacityBuffer>) {
        buffers.into_iter().partition(|b| self.keeps(b))
    }
}

/// Keeps buffers whose `metadata.generation` changed since the last pass.
#[derive(Default)]
pub struct BufferGenerationFilter {
    seen: HashMap<String, i64>,
}

impl BufferGenerationFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BufferFilter for BufferGenerationFilter {
    async fn filter(
        &mut self,
        buffers: Vec<CapacityBuffer>,
    ) -> (Vec<CapacityBuffer>, Vec<CapacityBuffer>) {
        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        for buffer in buffers {
            let key = buffer_key(&buffer);
            let generation = buffer.metadata.generation.unwrap_or_default();
            let changed = self.seen.insert(key, generation) != Some(generation);
            if changed {
                kept.push(buffer);
            } else {
                dropped.push(buffer);
            }
        }
        (kept, dropped)
    }

    fn cleanup(&mut self) {
        self.seen.clear();
    }
}

/// Keeps buffers whose recorded pod-template generation differs from the
/// live template. Buffers without a recorded template are dropped; there is
/// nothing to compare. Lookup failures keep the buffer so the error surfaces
/// during translation.
pub struct PodTemplateGenerationFilter {
    client: Arc<dyn BufferClientTrait>,
}

impl PodTemplateGenerationFilter {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        Self { client }
    }

    async fn keeps(&self, buffer: &CapacityBuffer) -> bool {
        let Some(status) = buffer.status.as_ref() else {
            return false;
        };
        let (Some(template_ref), Some(recorded)) =
            (status.pod_template_ref.as_ref(), status.pod_template_generation)
        else {
            return false;
        };
        let namespace = buffer.metadata.namespace.as_deref().unwrap_or_default();
        match self.client.get_pod_template(namespace, &template_ref.name).await {
            Ok(template) => template.metadata.generation.unwrap_or_default() != recorded,
            Err(err) => {
                debug!(
                    buffer = %buffer_key(buffer),
                    error = %err,
                    "pod template lookup failed, keeping buffer for re-translation"
                );
                true
            }
        }
    }
}

#[async_trait]
impl BufferFilter for PodTemplateGenerationFilter {
    async fn filter(
        &mut self,
        buffers: Vec<CapacityBuffer>,
    ) -> (Vec<CapacityBuffer>, Vec<CapacityBuffer>) {
        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        for buffer in buffers {
            if self.keeps(&buffer).await {
                kept.push(buffer);
            } else {
                dropped.push(buffer);
            }
        }
        (kept, dropped)
    }
}

/// Union combinator: keeps every buffer kept by at least one sub-filter,
/// preserving the input order.
pub struct AnyFilter {
    filters: Vec<Box<dyn BufferFilter>>,
}

impl AnyFilter {
    pub fn new(filters: Vec<Box<dyn BufferFilter>>) -> Self {
        Self { filters }
    }
}

#[async_trait]
impl BufferFilter for AnyFilter {
    async fn filter(
        &mut self,
        buffers: Vec<CapacityBuffer>,
    ) -> (Vec<CapacityBuffer>, Vec<CapacityBuffer>) {
        let mut keep_keys = HashSet::new();
        for filter in &mut self.filters {
            let (kept, _) = filter.filter(buffers.clone()).await;
            keep_keys.extend(kept.iter().map(buffer_key));
        }
        buffers
            .into_iter()
            .partition(|b| keep_keys.contains(&buffer_key(b)))
    }

    fn cleanup(&mut self) {
        for filter in &mut self.filters {
            filter.cleanup();
        }
    }
}
