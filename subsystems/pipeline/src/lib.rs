//! # VCP Pipeline
//!
//! Frame-level orchestration: a decode/encode/processing frame is split into
//! packets, each emitting one slice of the command stream, and submitted
//! through the active scalability strategy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CodecPipeline                            │
//! │                                                                 │
//! │  ┌────────────────┐   ┌──────────────────┐   ┌───────────────┐  │
//! │  │ FeatureManager │◀──│    SubPackets    │──▶│ StatusReport  │  │
//! │  │ (marker, ds,   │   │ marker → status  │   │ (tags, FIFO)  │  │
//! │  │  concealment)  │   └────────┬─────────┘   └───────▲───────┘  │
//! │  └────────────────┘            │ CommandBuffer       │          │
//! └────────────────────────────────┼─────────────────────┼──────────┘
//!                                  ▼                     │ device
//!                     HwInterface single-pipe slot ──▶ OsInterface
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod feature;
pub mod marker;
pub mod packet;
pub mod pipeline;
pub mod status;
pub mod status_packet;

pub use feature::{
    DownSamplingFeature, ErrorConcealmentFeature, FeatureId, FeatureManager, FeatureSet,
    FrameParams, MarkerFeature, MediaFeature,
};
pub use marker::{MarkerPacket, MARKER_OFFSET};
pub use packet::{MediaPipeline, SubPacket};
pub use pipeline::{CodecFunction, CodecPipeline, PipelineSettings};
pub use status::{CodecStatus, FrameStatus, StatusReport, StatusReportEntry};
pub use status_packet::StatusReportPacket;
