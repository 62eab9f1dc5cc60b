//! Capacity Buffer Controller
//!
//! Reconciles `CapacityBuffer` CRDs into warm cluster headroom: each buffer
//! is translated into a pod template and a replica count, trimmed against
//! namespace resource quotas, and turned into placeholder pods that make
//! the cluster scale-up engine provision nodes before real workloads need
//! them.
//!
//! The reconcile loop runs in this crate's binary. The [`hook`] and
//! [`scale_up_status`] modules are the integration surface for a scale-up
//! engine embedding this controller.

pub mod controller;
pub mod error;
pub mod filters;
pub mod hook;
pub mod quantity;
pub mod quota;
pub mod reconciler;
pub mod resolver;
pub mod scale_up_status;
pub mod status;
pub mod translators;

#[cfg(test)]
mod filters_test;
#[cfg(test)]
mod scale_up_status_test;
#[cfg(test)]
mod test_utils;
