//! # VCP Scalability
//!
//! Execution-engine strategies. A strategy decides how many physical pipes
//! take part in a frame and routes the command buffers the packets record.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      HwInterface                             │
//! │   single-pipe slot ──owns──▶ SinglePipeScalability           │
//! │                                 │                            │
//! │            ┌────────────────────┼─────────────────────┐      │
//! │            ▼                    ▼                     ▼      │
//! │   OwnedSlot<Option>     SinglePipe routine     Arc<OsInterface>
//! │   (swap-and-drop)       (engine + buffer)      Arc<dyn MiInterface>
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the single-pipe variant exists; multi-pipe options are rejected
//! with `NotSupported`.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod base;
pub mod single_pipe;
pub mod slot;

pub use base::SinglePipe;
pub use single_pipe::{create_single_pipe, SinglePipeScalability};
pub use slot::OwnedSlot;
