//! CapacityBuffer CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the capacity buffer controller.

pub mod capacity_buffer;
pub mod conditions;
pub mod references;

pub use capacity_buffer::*;
pub use conditions::*;
pub use references::*;
