//! Reconciler
//!
//! Owns the periodic pass over all buffers: list, strategy filter, change
//! filter (bypassed on full-sweep iterations), translator chain, quota
//! allocation per namespace, status updates. Pass errors are logged and
//! surfaced; nothing is retried within a pass, the next tick re-reconciles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use buffer_client::BufferClientTrait;
use crds::{CapacityBuffer, ConditionStatus, READY_FOR_PROVISIONING_CONDITION};

use crate::error::ControllerError;
use crate::filters::{
    AnyFilter, BufferFilter, BufferGenerationFilter, ConditionFilter,
    PodTemplateGenerationFilter, StrategyFilter, StrategySource,
};
use crate::quota::QuotaAllocator;
use crate::status::StatusUpdater;
use crate::translators::{
    BufferTranslator, PodTemplateTranslator, ResourceLimitTranslator, ScalableRefTranslator,
    TranslatorChain,
};

pub struct Reconciler {
    client: Arc<dyn BufferClientTrait>,
    strategy_filter: StrategyFilter,
    change_filter: AnyFilter,
    translators: TranslatorChain,
    allocator: QuotaAllocator,
    status_updater: StatusUpdater,
    full_sweep_every: u64,
    iteration: u64,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn BufferClientTrait>,
        allowed_strategies: Vec<String>,
        full_sweep_every: u64,
    ) -> Self {
        // A buffer with an empty spec strategy means the default strategy;
        // accept it whenever the default is in the allow-list.
        let mut allowed = allowed_strategies;
        if allowed.iter().any(|s| s == crds::ACTIVE_CAPACITY_STRATEGY)
            && !allowed.iter().any(String::is_empty)
        {
            allowed.push(String::new());
        }

        let strategy_filter = StrategyFilter::new(allowed, StrategySource::Spec);
        let change_filter = AnyFilter::new(vec![
            Box::new(ConditionFilter::requiring(vec![(
                READY_FOR_PROVISIONING_CONDITION.to_string(),
                ConditionStatus::False,
            )])),
            Box::new(BufferGenerationFilter::new()),
            Box::new(PodTemplateGenerationFilter::new(client.clone())),
        ]);
        let translators = TranslatorChain::new(vec![
            Box::new(PodTemplateTranslator::new(client.clone())),
            Box::new(ScalableRefTranslator::new(client.clone())),
            Box::new(ResourceLimitTranslator::new(client.clone())),
        ]);
        let allocator = QuotaAllocator::new(client.clone());
        let status_updater = StatusUpdater::new(client.clone());

        Self {
            client,
            strategy_filter,
            change_filter,
            translators,
            allocator,
            status_updater,
            full_sweep_every,
            iteration: 0,
        }
    }

    /// One reconcile pass. Returns the pass's collected errors.
    pub async fn run_once(&mut self) -> Vec<ControllerError> {
        self.iteration += 1;
        let full_sweep = self.full_sweep_every > 0 && self.iteration % self.full_sweep_every == 0;

        let buffers = match self.client.list_capacity_buffers().await {
            Ok(buffers) => buffers,
            Err(err) => return vec![err.into()],
        };
        let total = buffers.len();

        let (buffers, _) = self.strategy_filter.filter(buffers).await;
        let buffers = if full_sweep {
            // Full sweep bypasses the change filter so drift in scale
            // subresources and templates is eventually reflected.
            buffers
        } else {
            let (changed, _) = self.change_filter.filter(buffers).await;
            changed
        };
        debug!(
            iteration = self.iteration,
            total,
            selected = buffers.len(),
            full_sweep,
            "reconcile pass starting"
        );
        if buffers.is_empty() {
            return Vec::new();
        }

        let mut errors = Vec::new();
        let mut groups = group_by_namespace(buffers);
        for (namespace, group) in &mut groups {
            errors.extend(self.translators.translate(group).await);
            errors.extend(self.allocator.allocate(namespace, group).await);
        }
        for (_, group) in &groups {
            errors.extend(self.status_updater.update(group).await);
        }
        errors
    }

    /// Run passes on a fixed interval until shutdown flips. An in-flight
    /// pass always runs to completion.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let errors = self.run_once().await;
                    for err in &errors {
                        warn!(error = %err, "reconcile pass error");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reconciler stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Group buffers by namespace, preserving the list order inside each group
/// so quota allocation stays deterministic.
fn group_by_namespace(buffers: Vec<CapacityBuffer>) -> Vec<(String, Vec<CapacityBuffer>)> {
    let mut groups: Vec<(String, Vec<CapacityBuffer>)> = Vec::new();
    for buffer in buffers {
        let namespace = buffer.metadata.namespace.clone().unwrap_or_default();
        match groups.iter_mut().find(|(ns, _)| *ns == namespace) {
            Some((_, group)) => group.push(buffer),
            None => groups.push((namespace, vec![buffer])),
        }
    }
    groups
}
