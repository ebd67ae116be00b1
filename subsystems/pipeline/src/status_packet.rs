//! # Status Report Packet
//!
//! Last packet of every frame. Stores the frame's status payload into its
//! slot, then writes the completion tag with a post-sync immediate so the
//! tag only lands once everything before it has retired.

use alloc::sync::Arc;

use vcp_core::error::require;
use vcp_core::{Collaborator, Error, Result};
use vcp_hal::{
    CommandBuffer, CommandSize, FlushFlags, MiCommandKind, MiFlushDwParams, MiInterface,
    PipeControlParams, PostSyncOp, StoreDataImmParams,
};

use crate::packet::{MediaPipeline, SubPacket};
use crate::status::COMPLETION_OFFSET;

/// Completion tracking packet
#[derive(Debug, Default)]
pub struct StatusReportPacket {
    mi: Option<Arc<dyn MiInterface>>,
}

impl StatusReportPacket {
    /// Create an unbound packet
    pub fn new() -> Self {
        Self::default()
    }

    fn mi(&self) -> Result<&Arc<dyn MiInterface>> {
        self.mi.as_ref().ok_or(Error::InvalidState)
    }
}

impl SubPacket for StatusReportPacket {
    fn name(&self) -> &'static str {
        "status-report"
    }

    fn init(&mut self, pipeline: &dyn MediaPipeline) -> Result<()> {
        let hw = require(pipeline.hw_interface(), Collaborator::HwInterface)?;
        let mi = require(hw.mi_interface(), Collaborator::MiInterface)?;
        require(pipeline.status_report(), Collaborator::StatusReport)?;

        self.mi = Some(mi.clone());
        Ok(())
    }

    fn prepare(&mut self, _pipeline: &dyn MediaPipeline) -> Result<()> {
        self.mi()?;
        Ok(())
    }

    fn execute(&mut self, pipeline: &dyn MediaPipeline, cmd: &mut CommandBuffer) -> Result<()> {
        let mi = self.mi()?;
        let status = require(pipeline.status_report(), Collaborator::StatusReport)?;
        let context = require(pipeline.media_context(), Collaborator::MediaContext)?;
        let frame = status.current_frame().ok_or(Error::InvalidState)?;

        mi.add_store_data_imm(
            cmd,
            &StoreDataImmParams {
                dest: status.buffer().clone(),
                offset: frame.slot_offset,
                value: frame.tag,
            },
        )?;

        let dest = Some(status.buffer().clone());
        if context.is_render_engine_used() {
            mi.add_pipe_control(
                cmd,
                &PipeControlParams {
                    dest,
                    offset: COMPLETION_OFFSET,
                    post_sync: PostSyncOp::WriteImmediate,
                    flush: FlushFlags::WRITE_CACHE | FlushFlags::CS_STALL,
                    immediate: frame.tag as u64,
                },
            )
        } else {
            mi.add_mi_flush_dw(
                cmd,
                &MiFlushDwParams {
                    dest,
                    offset: COMPLETION_OFFSET,
                    post_sync: PostSyncOp::WriteImmediate,
                    qword_enable: false,
                    immediate: frame.tag as u64,
                },
            )
        }
    }

    fn calculate_command_size(&self) -> Result<CommandSize> {
        let mi = self.mi()?;
        let flush = mi
            .command_size(MiCommandKind::PipeControl)
            .max(mi.command_size(MiCommandKind::FlushDw));
        Ok(CommandSize::new(
            mi.command_size(MiCommandKind::StoreDataImm) + flush,
            2,
        ))
    }
}
