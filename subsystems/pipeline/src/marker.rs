//! # Marker Packet
//!
//! Writes the engine timestamp into the marker feature's buffer when the
//! caller asked for a marker on this frame.
//!
//! The render engine gets a `PIPE_CONTROL`; every other engine gets an
//! `MI_FLUSH_DW`. Both use a timestamp post-sync write so the value lands
//! after preceding work retires.

use alloc::sync::Arc;

use vcp_core::error::require;
use vcp_core::{Collaborator, Error, Result};
use vcp_hal::{
    CommandBuffer, CommandSize, FlushFlags, MiFlushDwParams, MiInterface, PipeControlParams,
    PostSyncOp,
};

use crate::feature::MarkerFeature;
use crate::packet::{MediaPipeline, SubPacket};

/// Byte offset of the timestamp in the marker buffer
pub const MARKER_OFFSET: u32 = 0;

#[derive(Debug)]
struct Bound {
    mi: Arc<dyn MiInterface>,
    feature: Arc<MarkerFeature>,
    /// Registry generation `feature` was looked up under
    generation: u64,
}

/// Timestamp marker packet
#[derive(Debug, Default)]
pub struct MarkerPacket {
    bound: Option<Bound>,
}

impl MarkerPacket {
    /// Create an unbound packet
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(&self) -> Result<&Bound> {
        self.bound.as_ref().ok_or(Error::InvalidState)
    }
}

impl SubPacket for MarkerPacket {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn init(&mut self, pipeline: &dyn MediaPipeline) -> Result<()> {
        let hw = require(pipeline.hw_interface(), Collaborator::HwInterface)?;
        let mi = require(hw.mi_interface(), Collaborator::MiInterface)?;
        let features = require(pipeline.feature_manager(), Collaborator::FeatureManager)?;
        let feature = require(features.marker(), Collaborator::Feature)?;

        self.bound = Some(Bound {
            mi: mi.clone(),
            feature: feature.clone(),
            generation: features.generation(),
        });
        log::debug!("packet: marker bound to {}", feature.buffer().name());
        Ok(())
    }

    fn prepare(&mut self, pipeline: &dyn MediaPipeline) -> Result<()> {
        let bound = self.bound.as_mut().ok_or(Error::InvalidState)?;
        let features = require(pipeline.feature_manager(), Collaborator::FeatureManager)?;

        if features.generation() != bound.generation {
            bound.feature = require(features.marker(), Collaborator::Feature)?.clone();
            bound.generation = features.generation();
            log::trace!("packet: marker re-bound at gen {}", bound.generation);
        }
        Ok(())
    }

    fn execute(&mut self, pipeline: &dyn MediaPipeline, cmd: &mut CommandBuffer) -> Result<()> {
        let bound = self.bound()?;
        if !bound.feature.is_enabled() {
            return Ok(());
        }

        let context = require(pipeline.media_context(), Collaborator::MediaContext)?;
        let dest = Some(bound.feature.buffer().clone());

        if context.is_render_engine_used() {
            bound.mi.add_pipe_control(
                cmd,
                &PipeControlParams {
                    dest,
                    offset: MARKER_OFFSET,
                    post_sync: PostSyncOp::WriteTimestamp,
                    flush: FlushFlags::WRITE_CACHE,
                    ..PipeControlParams::default()
                },
            )
        } else {
            bound.mi.add_mi_flush_dw(
                cmd,
                &MiFlushDwParams {
                    dest,
                    offset: MARKER_OFFSET,
                    post_sync: PostSyncOp::WriteTimestamp,
                    qword_enable: true,
                    ..MiFlushDwParams::default()
                },
            )
        }
    }

    fn calculate_command_size(&self) -> Result<CommandSize> {
        // One flush with post-sync is covered by SinglePipe::frame_reservation
        self.bound()?;
        Ok(CommandSize::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureId, FeatureManager, FrameParams, MediaFeature};
    use crate::status::StatusReport;
    use vcp_core::ByteSize;
    use vcp_hal::{
        CommandBufferConfig, GpuContext, HwInterface, MediaContext, MiCommand, MiCommandKind,
        OsConfig,
    };

    struct Harness {
        hw: Option<HwInterface>,
        features: Option<FeatureManager>,
        context: MediaContext,
    }

    impl MediaPipeline for Harness {
        fn hw_interface(&self) -> Option<&HwInterface> {
            self.hw.as_ref()
        }
        fn feature_manager(&self) -> Option<&FeatureManager> {
            self.features.as_ref()
        }
        fn media_context(&self) -> Option<&MediaContext> {
            Some(&self.context)
        }
        fn status_report(&self) -> Option<&StatusReport> {
            None
        }
    }

    fn harness(engine: GpuContext) -> Harness {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let buffer = hw
            .os_interface()
            .unwrap()
            .allocate_resource("marker", ByteSize::KIB_4)
            .unwrap();
        let mut features = FeatureManager::new();
        features
            .register(MediaFeature::Marker(Arc::new(MarkerFeature::new(buffer))))
            .unwrap();
        Harness {
            hw: Some(hw),
            features: Some(features),
            context: MediaContext::new(engine),
        }
    }

    fn enable(h: &Harness, on: bool) {
        h.features
            .as_ref()
            .unwrap()
            .update(&FrameParams {
                set_marker: on,
                ..FrameParams::default()
            })
            .unwrap();
    }

    fn run(h: &Harness) -> CommandBuffer {
        let mut packet = MarkerPacket::new();
        packet.init(h).unwrap();
        packet.prepare(h).unwrap();
        let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
        packet.execute(h, &mut cmd).unwrap();
        cmd
    }

    #[test]
    fn test_disabled_emits_nothing() {
        let h = harness(GpuContext::Video);
        enable(&h, false);
        assert!(run(&h).commands().is_empty());
    }

    #[test]
    fn test_render_uses_pipe_control() {
        let h = harness(GpuContext::Render);
        enable(&h, true);
        let cmd = run(&h);

        assert_eq!(cmd.commands().len(), 1);
        let MiCommand::PipeControl(params) = &cmd.commands()[0] else {
            panic!("expected PIPE_CONTROL");
        };
        assert_eq!(params.post_sync, PostSyncOp::WriteTimestamp);
        assert!(params.flush.contains(FlushFlags::WRITE_CACHE));
    }

    #[test]
    fn test_video_uses_flush_dw() {
        let h = harness(GpuContext::Video);
        enable(&h, true);
        let cmd = run(&h);
        let marker = h.features.as_ref().unwrap().marker().unwrap().clone();

        assert_eq!(cmd.commands().len(), 1);
        assert_eq!(cmd.commands()[0].kind(), MiCommandKind::FlushDw);
        let (op, dest, offset) = cmd.commands()[0].post_sync().unwrap();
        assert_eq!(op, PostSyncOp::WriteTimestamp);
        assert!(dest.same_as(marker.buffer()));
        assert_eq!(offset, MARKER_OFFSET);
    }

    #[test]
    fn test_size_is_zero_and_stable() {
        let h = harness(GpuContext::Video);
        enable(&h, true);
        let mut packet = MarkerPacket::new();
        assert_eq!(packet.calculate_command_size(), Err(Error::InvalidState));

        packet.init(&h).unwrap();
        assert_eq!(packet.calculate_command_size(), Ok(CommandSize::ZERO));
        let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
        packet.execute(&h, &mut cmd).unwrap();
        assert_eq!(packet.calculate_command_size(), Ok(CommandSize::ZERO));
    }

    #[test]
    fn test_init_missing_collaborators() {
        let mut h = harness(GpuContext::Video);
        h.features.as_mut().unwrap().unregister(FeatureId::Marker);
        assert_eq!(
            MarkerPacket::new().init(&h),
            Err(Error::NullReference(Collaborator::Feature))
        );

        h.features = None;
        assert_eq!(
            MarkerPacket::new().init(&h),
            Err(Error::NullReference(Collaborator::FeatureManager))
        );

        h.hw = Some(HwInterface::new(None, None));
        assert_eq!(
            MarkerPacket::new().init(&h),
            Err(Error::NullReference(Collaborator::MiInterface))
        );

        h.hw = None;
        assert_eq!(
            MarkerPacket::new().init(&h),
            Err(Error::NullReference(Collaborator::HwInterface))
        );
    }

    #[test]
    fn test_unbound_execute_fails() {
        let h = harness(GpuContext::Video);
        let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
        assert_eq!(MarkerPacket::new().execute(&h, &mut cmd), Err(Error::InvalidState));
        assert_eq!(MarkerPacket::new().prepare(&h), Err(Error::InvalidState));
    }

    #[test]
    fn test_prepare_rebinds_after_generation_change() {
        let mut h = harness(GpuContext::Video);
        let mut packet = MarkerPacket::new();
        packet.init(&h).unwrap();

        let os = h.hw.as_ref().unwrap().os_interface().unwrap().clone();
        let fresh = Arc::new(MarkerFeature::new(
            os.allocate_resource("marker-2", ByteSize::KIB_4).unwrap(),
        ));
        let features = h.features.as_mut().unwrap();
        features.unregister(FeatureId::Marker);
        features.register(MediaFeature::Marker(fresh.clone())).unwrap();
        enable(&h, true);

        packet.prepare(&h).unwrap();
        let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
        packet.execute(&h, &mut cmd).unwrap();
        let (_, dest, _) = cmd.commands()[0].post_sync().unwrap();
        assert!(dest.same_as(fresh.buffer()));

        h.features.as_mut().unwrap().unregister(FeatureId::Marker);
        assert_eq!(packet.prepare(&h), Err(Error::NullReference(Collaborator::Feature)));
    }
}
