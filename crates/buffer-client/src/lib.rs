//! Buffer Client
//!
//! Typed cluster access for the capacity buffer controller. Wraps the
//! Kubernetes API behind `BufferClientTrait` so that the reconciliation
//! pipeline can be unit-tested against an in-memory mock.
//!
//! # Example
//!
//! ```no_run
//! use buffer_client::{BufferClientTrait, KubeBufferClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeBufferClient::try_default(None).await?;
//! let buffers = client.list_capacity_buffers().await?;
//! for buffer in buffers {
//!     println!("{:?}", buffer.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod buffer_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use buffer_trait::BufferClientTrait;
pub use client::KubeBufferClient;
pub use error::BufferClientError;
#[cfg(feature = "test-util")]
pub use mock::MockBufferClient;
