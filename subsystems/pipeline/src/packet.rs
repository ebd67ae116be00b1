//! # Packet Contract
//!
//! A packet owns one slice of a frame's command stream. The pipeline
//! constructs its packets once, binds them with `init`, then for every frame
//! runs `prepare`, sizes the frame with `calculate_command_size` and records
//! with `execute`.
//!
//! ```text
//!   Created ──init──▶ Initialized ──▶ { prepare ▶ size ▶ execute }*
//!      │
//!      └─ init failed: permanently unusable (InvalidState)
//! ```

use core::fmt;

use vcp_core::Result;
use vcp_hal::{CommandBuffer, CommandSize, HwInterface, MediaContext};

use crate::feature::FeatureManager;
use crate::status::StatusReport;

/// Collaborators a pipeline exposes to its packets
///
/// Handles are valid for the duration of the call they are passed to.
pub trait MediaPipeline {
    /// Hardware interface
    fn hw_interface(&self) -> Option<&HwInterface>;

    /// Feature registry
    fn feature_manager(&self) -> Option<&FeatureManager>;

    /// Media context tracking the engine in use
    fn media_context(&self) -> Option<&MediaContext>;

    /// Completion tracking
    fn status_report(&self) -> Option<&StatusReport>;
}

/// One command-emitting stage of a frame
pub trait SubPacket: fmt::Debug + Send {
    /// Packet name for logs
    fn name(&self) -> &'static str;

    /// Bind collaborators; fails if any is absent
    fn init(&mut self, pipeline: &dyn MediaPipeline) -> Result<()>;

    /// Derive per-frame state
    fn prepare(&mut self, pipeline: &dyn MediaPipeline) -> Result<()>;

    /// Append this packet's commands to `cmd`
    fn execute(&mut self, pipeline: &dyn MediaPipeline, cmd: &mut CommandBuffer) -> Result<()>;

    /// Command and patch space `execute` needs beyond the generic reservation
    fn calculate_command_size(&self) -> Result<CommandSize>;
}
