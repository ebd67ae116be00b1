//! # VCP Hardware Abstraction Layer
//!
//! Everything the pipeline needs from the hardware side of the command-buffer
//! boundary.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           HwInterface                             │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐     │
//! │  │ MiInterface  │    │ CommandBuffer│    │   OsInterface    │     │
//! │  │  (encode MI  │───▶│  (dwords +   │───▶│ (submission FIFO │     │
//! │  │   commands)  │    │  patch list) │    │  + soft device)  │     │
//! │  └──────────────┘    └──────────────┘    └────────┬─────────┘     │
//! │                                                   │               │
//! │  ┌──────────────────────────┐            ┌────────▼─────────┐     │
//! │  │ single-pipe scalability  │            │   MediaContext   │     │
//! │  │ slot (exclusively owned) │            │ (engine in use)  │     │
//! │  └──────────────────────────┘            └──────────────────┘     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submission Flow
//!
//! 1. Packets append MI commands into a [`CommandBuffer`]
//! 2. The scalability strategy routes the buffer to its pipe
//! 3. The [`OsInterface`] queues the buffer on the active GPU context
//! 4. The engine retires the buffer later; post-sync writes land in memory

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod cmdbuf;
pub mod context;
pub mod hw;
pub mod mi;
pub mod os;
pub mod scalability;

// Re-exports
pub use cmdbuf::{CommandBuffer, CommandBufferConfig, CommandSize, PatchEntry};
pub use context::{GpuContext, MediaContext};
pub use hw::HwInterface;
pub use mi::{
    FlushFlags, MiCommand, MiCommandKind, MiFlushDwParams, MiInterface, PipeControlParams,
    PostSyncOp, SoftMi, StoreDataImmParams,
};
pub use os::{Component, OsConfig, OsInterface, OsStreamState};
pub use scalability::{EnginePolicy, MediaScalability, ScalabilityComponent, ScalabilityOption};
