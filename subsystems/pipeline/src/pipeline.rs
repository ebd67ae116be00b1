//! # Codec Pipeline
//!
//! Owns the feature registry, the status report and the packet list for a
//! frame sequence, installs the single-pipe strategy on the hardware
//! interface and drives the per-frame lifecycle.
//!
//! ## Frame Flow
//!
//! ```text
//!   prepare(params) ─▶ features.update ─▶ packet.prepare*
//!
//!   execute() ─▶ status.begin_frame
//!             ─▶ Σ packet.calculate_command_size ─▶ strategy.verify_cmd_buffer
//!             ─▶ strategy.get_cmd_buffer ─▶ packet.execute* ─▶ return_cmd_buffer
//!             ─▶ strategy.submit_cmd_buffer ─▶ status.record_submission
//! ```
//!
//! A failed frame is discarded; nothing is submitted and its status tag is
//! reused by the next frame.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use vcp_core::error::require;
use vcp_core::{ByteSize, Collaborator, Result, SubmissionId};
use vcp_hal::{
    CommandBufferConfig, CommandSize, EnginePolicy, GpuContext, HwInterface, MediaContext,
    ScalabilityComponent, ScalabilityOption,
};
use vcp_scalability::create_single_pipe;

use crate::feature::{
    DownSamplingFeature, ErrorConcealmentFeature, FeatureManager, FeatureSet, FrameParams,
    MarkerFeature, MediaFeature,
};
use crate::marker::MarkerPacket;
use crate::packet::{MediaPipeline, SubPacket};
use crate::status::{StatusReport, StatusReportEntry};
use crate::status_packet::StatusReportPacket;

// =============================================================================
// SETTINGS
// =============================================================================

/// Codec function a pipeline serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFunction {
    /// Decode
    Decode,
    /// Encode
    Encode,
    /// Video processing
    VideoProcessing,
}

impl CodecFunction {
    /// Component requesting scalability
    pub const fn component(self) -> ScalabilityComponent {
        match self {
            CodecFunction::Decode => ScalabilityComponent::Decode,
            CodecFunction::Encode => ScalabilityComponent::Encode,
            CodecFunction::VideoProcessing => ScalabilityComponent::Vp,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Codec function
    pub function: CodecFunction,
    /// Engine the media context starts on
    pub initial_context: GpuContext,
    /// Engine selection for the strategy
    pub engine: EnginePolicy,
    /// Initial command buffer capacities
    pub cmd_buffer: CommandBufferConfig,
    /// Maximum outstanding frames
    pub status_depth: u32,
    /// Features registered at build time
    pub features: FeatureSet,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            function: CodecFunction::Decode,
            initial_context: GpuContext::Render,
            engine: EnginePolicy::ComponentDefault,
            cmd_buffer: CommandBufferConfig::default(),
            status_depth: 32,
            features: FeatureSet::all(),
        }
    }
}

// =============================================================================
// RESOURCES
// =============================================================================

/// Collaborators handed to packets
#[derive(Debug)]
struct PipelineResources {
    hw: Arc<HwInterface>,
    context: Arc<MediaContext>,
    features: FeatureManager,
    status: StatusReport,
}

impl MediaPipeline for PipelineResources {
    fn hw_interface(&self) -> Option<&HwInterface> {
        Some(&self.hw)
    }

    fn feature_manager(&self) -> Option<&FeatureManager> {
        Some(&self.features)
    }

    fn media_context(&self) -> Option<&MediaContext> {
        Some(&self.context)
    }

    fn status_report(&self) -> Option<&StatusReport> {
        Some(&self.status)
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Frame pipeline for one codec function
#[derive(Debug)]
pub struct CodecPipeline {
    resources: PipelineResources,
    packets: Vec<Box<dyn SubPacket>>,
    settings: PipelineSettings,
    frames: u64,
    /// Install this pipeline's strategy came from
    strategy_generation: u64,
}

impl CodecPipeline {
    /// Build a pipeline on `hw`
    ///
    /// Allocates feature resources, installs and initializes a single-pipe
    /// strategy and binds every packet. Any failure aborts the build.
    pub fn new(hw: Arc<HwInterface>, settings: PipelineSettings) -> Result<Self> {
        let os = require(hw.os_interface(), Collaborator::OsInterface)?.clone();

        let mut features = FeatureManager::new();
        if settings.features.contains(FeatureSet::MARKER) {
            let buffer = os.allocate_resource("marker", ByteSize::KIB_4)?;
            features.register(MediaFeature::Marker(Arc::new(MarkerFeature::new(buffer))))?;
        }
        if settings.features.contains(FeatureSet::DOWN_SAMPLING) {
            features.register(MediaFeature::DownSampling(Arc::new(
                DownSamplingFeature::new(),
            )))?;
        }
        if settings.features.contains(FeatureSet::ERROR_CONCEALMENT) {
            features.register(MediaFeature::ErrorConcealment(Arc::new(
                ErrorConcealmentFeature::new(),
            )))?;
        }

        let status = StatusReport::new(&os, settings.status_depth)?;
        let context = Arc::new(MediaContext::new(settings.initial_context));

        create_single_pipe(Some(&hw), Some(&context), settings.function.component())?;
        let strategy_generation = hw.single_pipe_generation();
        let option = ScalabilityOption {
            num_pipes: 1,
            engine: settings.engine,
            cmd_buffer: settings.cmd_buffer,
        };
        hw.with_single_pipe(|s| s.initialize(&option))??;

        let mut packets: Vec<Box<dyn SubPacket>> = Vec::new();
        if settings.features.contains(FeatureSet::MARKER) {
            packets.push(Box::new(MarkerPacket::new()));
        }
        packets.push(Box::new(StatusReportPacket::new()));

        let resources = PipelineResources {
            hw,
            context,
            features,
            status,
        };
        for packet in packets.iter_mut() {
            packet.init(&resources)?;
        }

        log::debug!(
            "pipeline: {:?} ready on {} with {} packet(s)",
            settings.function,
            resources.context.gpu_context().name(),
            packets.len()
        );
        Ok(Self {
            resources,
            packets,
            settings,
            frames: 0,
            strategy_generation,
        })
    }

    /// Apply per-frame configuration and prepare every packet
    pub fn prepare(&mut self, params: &FrameParams) -> Result<()> {
        self.resources.features.update(params)?;
        let resources = &self.resources;
        self.packets
            .iter_mut()
            .try_for_each(|packet| packet.prepare(resources))
    }

    /// Record and submit one frame
    pub fn execute(&mut self) -> Result<SubmissionId> {
        let frame = self.resources.status.begin_frame()?;

        match self.record_and_submit() {
            Ok(id) => {
                self.resources.status.record_submission(id)?;
                self.frames += 1;
                log::debug!("pipeline: frame {} (tag {}) submitted as {:?}", self.frames, frame.tag, id);
                Ok(id)
            },
            Err(e) => {
                log::warn!("pipeline: frame (tag {}) aborted: {}", frame.tag, e);
                self.resources.status.abort_frame();
                Err(e)
            },
        }
    }

    fn record_and_submit(&mut self) -> Result<SubmissionId> {
        let hw = self.resources.hw.clone();

        let mut size = CommandSize::ZERO;
        for packet in &self.packets {
            size = size.checked_add(packet.calculate_command_size()?)?;
        }
        hw.with_single_pipe(|s| s.verify_cmd_buffer(size))??;

        let mut cmd = hw.with_single_pipe(|s| s.get_cmd_buffer())??;
        let resources = &self.resources;
        let recorded = self.packets.iter_mut().try_for_each(|packet| {
            log::trace!("pipeline: executing {}", packet.name());
            packet.execute(resources, &mut cmd)
        });
        hw.with_single_pipe(|s| s.return_cmd_buffer(cmd))??;

        if let Err(e) = recorded {
            hw.with_single_pipe(|s| s.discard_cmd_buffer())?;
            return Err(e);
        }
        hw.with_single_pipe(|s| s.submit_cmd_buffer())?
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// Drain up to `max` completed reports in submission order
    pub fn get_status_report(&self, out: &mut Vec<StatusReportEntry>, max: usize) -> usize {
        self.resources.status.get_status_report(out, max)
    }

    /// Frames completed and not yet drained
    pub fn get_completed_report(&self) -> u32 {
        self.resources.status.get_completed_report()
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Check if the down-sampling feature is registered
    pub fn is_down_sampling_supported(&self) -> bool {
        self.resources.features.down_sampling().is_some()
    }

    /// Feature registry
    pub fn feature_manager(&self) -> &FeatureManager {
        &self.resources.features
    }

    /// Mutable feature registry; packets re-bind on the next `prepare`
    pub fn feature_manager_mut(&mut self) -> &mut FeatureManager {
        &mut self.resources.features
    }

    /// Media context
    pub fn media_context(&self) -> &Arc<MediaContext> {
        &self.resources.context
    }

    /// Hardware interface
    pub fn hw_interface(&self) -> &Arc<HwInterface> {
        &self.resources.hw
    }

    /// Status report
    pub fn status_report(&self) -> &StatusReport {
        &self.resources.status
    }

    /// Build settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Frames submitted
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Drop for CodecPipeline {
    fn drop(&mut self) {
        // A later pipeline on the same hw may have replaced ours
        if self.resources.hw.release_single_pipe(self.strategy_generation).is_some() {
            log::debug!("pipeline: released single-pipe strategy");
        }
    }
}
