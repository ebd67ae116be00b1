//! # Scalability Contract
//!
//! An execution-engine strategy decides how many physical pipes execute a
//! frame and routes packet-emitted command buffers to them. Concrete
//! strategies live in `vcp-scalability`; the hardware interface only holds
//! the active one.

use core::fmt;

use vcp_core::{Result, SubmissionId};

use crate::cmdbuf::{CommandBuffer, CommandBufferConfig, CommandSize};
use crate::context::GpuContext;
use crate::os::Component;

// =============================================================================
// COMPONENT
// =============================================================================

/// Component type requesting scalability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalabilityComponent {
    /// Decode pipelines
    Decode,
    /// Encode pipelines
    Encode,
    /// Video processing pipelines
    Vp,
}

impl ScalabilityComponent {
    /// OS stream-state tag for this component
    pub const fn stream_component(self) -> Component {
        match self {
            ScalabilityComponent::Decode => Component::Decode,
            ScalabilityComponent::Encode => Component::Encode,
            ScalabilityComponent::Vp => Component::VpCommon,
        }
    }

    /// Engine the component runs on unless the option overrides it
    pub const fn default_engine(self) -> GpuContext {
        match self {
            ScalabilityComponent::Decode | ScalabilityComponent::Encode => GpuContext::Video,
            ScalabilityComponent::Vp => GpuContext::VideoEnhance,
        }
    }
}

// =============================================================================
// OPTION
// =============================================================================

/// Engine-selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePolicy {
    /// Component's natural engine
    #[default]
    ComponentDefault,
    /// Force a specific engine
    Fixed(GpuContext),
}

impl EnginePolicy {
    /// Resolve the engine for `component`
    pub const fn resolve(self, component: ScalabilityComponent) -> GpuContext {
        match self {
            EnginePolicy::ComponentDefault => component.default_engine(),
            EnginePolicy::Fixed(ctx) => ctx,
        }
    }
}

/// Scalability option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalabilityOption {
    /// Number of cooperating pipes
    pub num_pipes: u8,
    /// Engine-selection policy
    pub engine: EnginePolicy,
    /// Initial command buffer capacities per pipe
    pub cmd_buffer: CommandBufferConfig,
}

impl Default for ScalabilityOption {
    fn default() -> Self {
        Self {
            num_pipes: 1,
            engine: EnginePolicy::ComponentDefault,
            cmd_buffer: CommandBufferConfig::default(),
        }
    }
}

// =============================================================================
// STRATEGY TRAIT
// =============================================================================

/// Execution-engine strategy
pub trait MediaScalability: Send + fmt::Debug {
    /// (Re)initialize from `option`; the held option is replaced
    fn initialize(&mut self, option: &ScalabilityOption) -> Result<()>;

    /// Check if `initialize` has succeeded
    fn is_initialized(&self) -> bool;

    /// Component that requested this strategy
    fn component(&self) -> ScalabilityComponent;

    /// Number of pipes executing each frame
    fn pipe_count(&self) -> u8;

    /// Currently held option
    fn option(&self) -> Option<&ScalabilityOption>;

    /// Check if this strategy already satisfies `option`
    fn is_scalability_mode_matched(&self, option: &ScalabilityOption) -> bool;

    /// Make sure the next command buffer has room for `size`
    fn verify_cmd_buffer(&mut self, size: CommandSize) -> Result<()>;

    /// Hand out the command buffer for the next frame
    fn get_cmd_buffer(&mut self) -> Result<CommandBuffer>;

    /// Take a recorded command buffer back
    fn return_cmd_buffer(&mut self, cmd: CommandBuffer) -> Result<()>;

    /// Drop whatever was recorded and make a fresh buffer available
    fn discard_cmd_buffer(&mut self);

    /// Submit the returned command buffer to the pipe(s)
    fn submit_cmd_buffer(&mut self) -> Result<SubmissionId>;
}
