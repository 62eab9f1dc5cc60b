//! Status updater
//!
//! Writes each buffer's status subresource. Failures are collected per
//! buffer and never abort sibling updates; the next reconcile pass retries.

use std::sync::Arc;

use tracing::debug;

use buffer_client::BufferClientTrait;
use crds::CapacityBuffer;

use crate::error::ControllerError;
use crate::filters::buffer_key;

pub struct StatusUpdater {
    client: Arc<dyn BufferClientTrait>,
}

impl StatusUpdater {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        Self { client }
    }

    pub async fn update(&self, buffers: &[CapacityBuffer]) -> Vec<ControllerError> {
        let mut errors = Vec::new();
        for buffer in buffers {
            match self.client.update_capacity_buffer_status(buffer).await {
                Ok(_) => debug!(buffer = %buffer_key(buffer), "status updated"),
                Err(err) => errors.push(ControllerError::StatusUpdate {
                    buffer: buffer_key(buffer),
                    reason: err.to_string(),
                }),
            }
        }
        errors
    }
}
