//! # VCP Core
//!
//! Foundational types shared by every layer of the video codec pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        vcp-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Error     │  │   Types     │  │     Resource        │  │
//! │  │ (Collabor-  │  │ (GpuAddr,   │  │  (GPU-visible       │  │
//! │  │  ator)      │  │  ByteSize)  │  │   buffers)          │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod resource;
pub mod types;

// Re-exports for convenience
pub use error::{Collaborator, Error, Result};
pub use resource::{OsResource, ResourceId};
pub use types::*;
