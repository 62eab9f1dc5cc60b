//! Translator chain
//!
//! Translators turn a buffer's spec into its translated status view
//! (`podTemplateRef`, `replicas`, `podTemplateGeneration`). They run in
//! declared order and later translators may overwrite status written by
//! earlier ones: pod-template first as the simple case, scalable-ref for
//! the richer case, resource-limit last to clamp the chosen replica count.
//! Per-buffer failures set `ReadyForProvisioning=False` and never abort
//! the batch.

use async_trait::async_trait;

use crds::CapacityBuffer;

use crate::error::ControllerError;

pub mod pod_template;
pub mod resource_limit;
pub mod scalable_ref;

#[cfg(test)]
mod pod_template_test;
#[cfg(test)]
mod resource_limit_test;

pub use pod_template::PodTemplateTranslator;
pub use resource_limit::ResourceLimitTranslator;
pub use scalable_ref::ScalableRefTranslator;

/// Mutates buffer statuses in place; returns the per-buffer errors.
#[async_trait]
pub trait BufferTranslator: Send + Sync {
    async fn translate(&self, buffers: &mut [CapacityBuffer]) -> Vec<ControllerError>;
}

/// Runs translators in order, collecting every error.
pub struct TranslatorChain {
    translators: Vec<Box<dyn BufferTranslator>>,
}

impl TranslatorChain {
    pub fn new(translators: Vec<Box<dyn BufferTranslator>>) -> Self {
        Self { translators }
    }
}

#[async_trait]
impl BufferTranslator for TranslatorChain {
    async fn translate(&self, buffers: &mut [CapacityBuffer]) -> Vec<ControllerError> {
        let mut errors = Vec::new();
        for translator in &self.translators {
            errors.extend(translator.translate(buffers).await);
        }
        errors
    }
}
