//! # Single-Pipe Routine
//!
//! Pipe-count validation, engine selection and primary command buffer
//! routing shared by every strategy that drives exactly one pipe.
//!
//! ## Buffer States
//!
//! ```text
//!   ┌────────┐ get_cmd_buffer ┌────────┐ return_cmd_buffer ┌────────┐
//!   │  Idle  │───────────────▶│ InUse  │──────────────────▶│ Ready  │
//!   └────────┘                └────────┘                   └───┬────┘
//!       ▲                                                      │
//!       └──────────────────── submit / discard ────────────────┘
//! ```

use core::mem;

use vcp_core::{ByteSize, Error, Result, SubmissionId};
use vcp_hal::{
    CommandBuffer, CommandBufferConfig, CommandSize, GpuContext, MediaContext, MiCommandKind,
    MiInterface, OsInterface, ScalabilityComponent, ScalabilityOption,
};

/// Primary command buffer state
#[derive(Debug)]
enum BufferState {
    /// Available for the next frame
    Idle(CommandBuffer),
    /// Handed out to the packets
    InUse,
    /// Recorded and waiting for submission
    Ready(CommandBuffer),
}

/// The one pipe of a single-pipe strategy
#[derive(Debug)]
pub struct SinglePipe {
    /// Engine the pipe submits to
    engine: GpuContext,
    /// Current buffer capacities (grow-only)
    config: CommandBufferConfig,
    /// Primary command buffer
    buffer: BufferState,
    /// Frames submitted through this pipe
    submitted: u64,
}

impl SinglePipe {
    /// Validate `option` and bring the pipe up on the selected engine
    pub fn initialize(
        option: &ScalabilityOption,
        component: ScalabilityComponent,
        context: &MediaContext,
    ) -> Result<Self> {
        match option.num_pipes {
            0 => return Err(Error::InvalidParameter),
            1 => {}
            n => {
                log::warn!("scalability: {} pipes requested from single-pipe routine", n);
                return Err(Error::NotSupported);
            }
        }

        let engine = option.engine.resolve(component);
        context.switch_context(engine);

        log::debug!(
            "scalability: single pipe on {} ({} cmd, {} patches)",
            engine.name(),
            option.cmd_buffer.size,
            option.cmd_buffer.patch_entries
        );

        Ok(Self {
            engine,
            config: option.cmd_buffer,
            buffer: BufferState::Idle(Self::fresh(option.cmd_buffer, engine)),
            submitted: 0,
        })
    }

    fn fresh(config: CommandBufferConfig, engine: GpuContext) -> CommandBuffer {
        let mut cmd = CommandBuffer::new(config);
        cmd.set_gpu_context(engine);
        cmd
    }

    /// Engine the pipe submits to
    pub fn engine(&self) -> GpuContext {
        self.engine
    }

    /// Frames submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Current buffer capacities
    pub fn config(&self) -> CommandBufferConfig {
        self.config
    }

    /// Per-frame headroom on top of the packet sizes: one flush with a
    /// post-sync write and the batch end
    pub fn frame_reservation(mi: &dyn MiInterface) -> CommandSize {
        let flush = mi
            .command_size(MiCommandKind::PipeControl)
            .max(mi.command_size(MiCommandKind::FlushDw));
        CommandSize::new(flush + mi.command_size(MiCommandKind::BatchBufferEnd), 1)
    }

    /// Grow the idle buffer so `size` plus the frame reservation fits
    pub fn verify(&mut self, size: CommandSize, mi: &dyn MiInterface) -> Result<()> {
        let BufferState::Idle(cmd) = &mut self.buffer else {
            return Err(Error::CommandBufferInUse);
        };

        let needed = size.checked_add(Self::frame_reservation(mi))?;
        if cmd.has_room(needed).is_ok() {
            return Ok(());
        }

        let wanted = CommandBufferConfig {
            size: ByteSize::from_bytes(cmd.used_bytes() as u64 + needed.command_bytes as u64)
                .align_up(ByteSize::KIB_4.as_bytes()),
            patch_entries: (cmd.patch_list().len() as u32).saturating_add(needed.patch_entries),
        };
        cmd.grow(wanted);
        self.config = cmd.config();

        log::debug!(
            "scalability: grew primary buffer to {} / {} patches",
            self.config.size,
            self.config.patch_entries
        );
        Ok(())
    }

    /// Hand out the primary buffer
    pub fn get(&mut self) -> Result<CommandBuffer> {
        match mem::replace(&mut self.buffer, BufferState::InUse) {
            BufferState::Idle(cmd) => Ok(cmd),
            other => {
                self.buffer = other;
                Err(Error::CommandBufferInUse)
            }
        }
    }

    /// Take the recorded buffer back
    pub fn give_back(&mut self, cmd: CommandBuffer) -> Result<()> {
        match self.buffer {
            BufferState::InUse => {
                self.buffer = BufferState::Ready(cmd);
                Ok(())
            }
            _ => Err(Error::InvalidState),
        }
    }

    /// Throw away whatever was recorded
    pub fn discard(&mut self) {
        let cmd = match mem::replace(&mut self.buffer, BufferState::InUse) {
            BufferState::Idle(mut cmd) | BufferState::Ready(mut cmd) => {
                cmd.reset();
                cmd.set_gpu_context(self.engine);
                cmd
            }
            BufferState::InUse => Self::fresh(self.config, self.engine),
        };
        self.buffer = BufferState::Idle(cmd);
    }

    /// Terminate and submit the returned buffer
    pub fn submit(&mut self, os: &OsInterface, mi: &dyn MiInterface) -> Result<SubmissionId> {
        let mut cmd = match mem::replace(&mut self.buffer, BufferState::InUse) {
            BufferState::Ready(cmd) => cmd,
            other => {
                self.buffer = other;
                return Err(Error::InvalidState);
            }
        };

        // Fail-fast; the frame is dropped but the pipe stays usable
        let result = mi
            .add_batch_buffer_end(&mut cmd)
            .and_then(|()| os.submit(self.engine, cmd));
        self.buffer = BufferState::Idle(Self::fresh(self.config, self.engine));

        let id = result?;
        self.submitted += 1;
        log::debug!("scalability: submitted {:?} on {}", id, self.engine.name());
        Ok(id)
    }
}
