//! # MI Commands
//!
//! Memory-interface commands every engine understands: flushes with post-sync
//! writes, immediate stores and batch termination.
//!
//! Parameter blocks are plain structs filled by the caller; an
//! [`MiInterface`] appends the matching instruction to a [`CommandBuffer`].
//! The exact instruction encoding belongs to the interface implementation.

use arrayvec::ArrayVec;
use core::fmt;

use vcp_core::{Error, OsResource, Result};

use crate::cmdbuf::{CommandBuffer, PatchEntry};

// =============================================================================
// FLUSH / POST-SYNC
// =============================================================================

bitflags::bitflags! {
    /// Cache flush controls for `PIPE_CONTROL`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlushFlags: u32 {
        /// Write back the render/data caches
        const WRITE_CACHE = 1 << 0;
        /// Invalidate read caches
        const READ_CACHE = 1 << 1;
        /// Stall the command streamer until prior work retires
        const CS_STALL = 1 << 2;
        /// Invalidate the texture cache
        const TEXTURE_INVALIDATE = 1 << 3;
    }
}

/// Operation performed once a flush retires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSyncOp {
    /// No write
    #[default]
    None,
    /// Write the immediate value
    WriteImmediate,
    /// Write the engine timestamp
    WriteTimestamp,
}

impl PostSyncOp {
    const fn encode(self) -> u32 {
        match self {
            PostSyncOp::None => 0,
            PostSyncOp::WriteImmediate => 1,
            PostSyncOp::WriteTimestamp => 3,
        }
    }
}

// =============================================================================
// PARAMETER BLOCKS
// =============================================================================

/// `PIPE_CONTROL` parameters (render-capable engines)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipeControlParams {
    /// Post-sync destination
    pub dest: Option<OsResource>,
    /// Byte offset inside `dest`
    pub offset: u32,
    /// Post-sync operation
    pub post_sync: PostSyncOp,
    /// Flush controls
    pub flush: FlushFlags,
    /// Immediate data for [`PostSyncOp::WriteImmediate`]
    pub immediate: u64,
}

/// `MI_FLUSH_DW` parameters (video, video-enhance, copy and compute engines)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MiFlushDwParams {
    /// Post-sync destination
    pub dest: Option<OsResource>,
    /// Byte offset inside `dest`
    pub offset: u32,
    /// Post-sync operation
    pub post_sync: PostSyncOp,
    /// Write 64 bits instead of 32
    pub qword_enable: bool,
    /// Immediate data for [`PostSyncOp::WriteImmediate`]
    pub immediate: u64,
}

/// `MI_STORE_DATA_IMM` parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDataImmParams {
    /// Destination
    pub dest: OsResource,
    /// Byte offset inside `dest`
    pub offset: u32,
    /// Value to store
    pub value: u32,
}

// =============================================================================
// RECORDED COMMANDS
// =============================================================================

/// Command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiCommandKind {
    /// `PIPE_CONTROL`
    PipeControl,
    /// `MI_FLUSH_DW`
    FlushDw,
    /// `MI_STORE_DATA_IMM`
    StoreDataImm,
    /// `MI_BATCH_BUFFER_END`
    BatchBufferEnd,
}

impl MiCommandKind {
    /// Instruction name
    pub const fn name(self) -> &'static str {
        match self {
            MiCommandKind::PipeControl => "PIPE_CONTROL",
            MiCommandKind::FlushDw => "MI_FLUSH_DW",
            MiCommandKind::StoreDataImm => "MI_STORE_DATA_IMM",
            MiCommandKind::BatchBufferEnd => "MI_BATCH_BUFFER_END",
        }
    }
}

/// A command as recorded in a [`CommandBuffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiCommand {
    /// `PIPE_CONTROL`
    PipeControl(PipeControlParams),
    /// `MI_FLUSH_DW`
    FlushDw(MiFlushDwParams),
    /// `MI_STORE_DATA_IMM`
    StoreDataImm(StoreDataImmParams),
    /// `MI_BATCH_BUFFER_END`
    BatchBufferEnd,
}

impl MiCommand {
    /// Get the command kind
    pub fn kind(&self) -> MiCommandKind {
        match self {
            MiCommand::PipeControl(_) => MiCommandKind::PipeControl,
            MiCommand::FlushDw(_) => MiCommandKind::FlushDw,
            MiCommand::StoreDataImm(_) => MiCommandKind::StoreDataImm,
            MiCommand::BatchBufferEnd => MiCommandKind::BatchBufferEnd,
        }
    }

    /// Post-sync operation and its destination, if any
    pub fn post_sync(&self) -> Option<(PostSyncOp, &OsResource, u32)> {
        let (op, dest, offset) = match self {
            MiCommand::PipeControl(p) => (p.post_sync, p.dest.as_ref(), p.offset),
            MiCommand::FlushDw(p) => (p.post_sync, p.dest.as_ref(), p.offset),
            _ => return None,
        };
        match (op, dest) {
            (PostSyncOp::None, _) | (_, None) => None,
            (op, Some(dest)) => Some((op, dest, offset)),
        }
    }
}

// =============================================================================
// MI INTERFACE
// =============================================================================

/// Hardware command interface: appends MI commands to a command buffer
pub trait MiInterface: Send + Sync + fmt::Debug {
    /// Append `PIPE_CONTROL`
    fn add_pipe_control(&self, cmd: &mut CommandBuffer, params: &PipeControlParams) -> Result<()>;

    /// Append `MI_FLUSH_DW`
    fn add_mi_flush_dw(&self, cmd: &mut CommandBuffer, params: &MiFlushDwParams) -> Result<()>;

    /// Append `MI_STORE_DATA_IMM`
    fn add_store_data_imm(&self, cmd: &mut CommandBuffer, params: &StoreDataImmParams) -> Result<()>;

    /// Append `MI_BATCH_BUFFER_END`
    fn add_batch_buffer_end(&self, cmd: &mut CommandBuffer) -> Result<()>;

    /// Encoded size of one command in bytes
    fn command_size(&self, kind: MiCommandKind) -> u32;
}

// =============================================================================
// SOFTWARE MI ENCODER
// =============================================================================

const PIPE_CONTROL_DWORDS: usize = 6;
const FLUSH_DW_DWORDS: usize = 5;
const STORE_DATA_IMM_DWORDS: usize = 4;

const OPCODE_PIPE_CONTROL: u32 = 0x7A00_0000;
const OPCODE_FLUSH_DW: u32 = 0x26 << 23;
const OPCODE_STORE_DATA_IMM: u32 = 0x20 << 23;
const OPCODE_BATCH_BUFFER_END: u32 = 0x0A << 23;

/// Dword index of the address inside flush commands
const FLUSH_ADDR_DWORD: u32 = 2;
/// Dword index of the address inside `MI_STORE_DATA_IMM`
const STORE_ADDR_DWORD: u32 = 1;

type Dwords = ArrayVec<u32, 8>;

#[cfg(feature = "validation")]
fn check_bounds(dest: &OsResource, offset: u32, width: u64) -> Result<()> {
    if offset as u64 + width > dest.size().as_bytes() {
        return Err(Error::BufferOverflow);
    }
    Ok(())
}

#[cfg(not(feature = "validation"))]
#[inline(always)]
fn check_bounds(_dest: &OsResource, _offset: u32, _width: u64) -> Result<()> {
    Ok(())
}

/// Generation-agnostic MI encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftMi;

impl SoftMi {
    /// Create the encoder
    pub const fn new() -> Self {
        Self
    }

    /// Validate a post-sync destination and build its patch entry
    fn post_sync_patch(
        dest: Option<&OsResource>,
        offset: u32,
        op: PostSyncOp,
        qword: bool,
    ) -> Result<Option<PatchEntry>> {
        if op == PostSyncOp::None {
            return Ok(None);
        }
        let dest = dest.ok_or(Error::InvalidParameter)?;
        let width: u64 = if qword { 8 } else { 4 };
        if !dest.gpu_addr().offset(offset as u64).is_aligned(width) {
            return Err(Error::MisalignedAddress);
        }
        check_bounds(dest, offset, width)?;
        Ok(Some(PatchEntry {
            resource: dest.clone(),
            command_offset: FLUSH_ADDR_DWORD * 4,
            resource_offset: offset,
            write: true,
        }))
    }

    fn push_address(dw: &mut Dwords, dest: Option<&OsResource>, offset: u32) {
        let addr = dest
            .map(|d| d.gpu_addr().offset(offset as u64))
            .unwrap_or_default();
        dw.push(addr.lo());
        dw.push(addr.hi());
    }
}

impl MiInterface for SoftMi {
    fn add_pipe_control(&self, cmd: &mut CommandBuffer, params: &PipeControlParams) -> Result<()> {
        // Timestamps and immediates are always 64-bit on PIPE_CONTROL
        let patch = Self::post_sync_patch(params.dest.as_ref(), params.offset, params.post_sync, true)?;

        let mut dw = Dwords::new();
        dw.push(OPCODE_PIPE_CONTROL | (PIPE_CONTROL_DWORDS as u32 - 2));
        dw.push(params.flush.bits() | (params.post_sync.encode() << 14));
        Self::push_address(&mut dw, params.dest.as_ref(), params.offset);
        dw.push(params.immediate as u32);
        dw.push((params.immediate >> 32) as u32);

        let patches: &[PatchEntry] = patch.as_slice();
        cmd.append(MiCommand::PipeControl(params.clone()), &dw, patches)
    }

    fn add_mi_flush_dw(&self, cmd: &mut CommandBuffer, params: &MiFlushDwParams) -> Result<()> {
        let qword = params.qword_enable || params.post_sync == PostSyncOp::WriteTimestamp;
        let patch = Self::post_sync_patch(params.dest.as_ref(), params.offset, params.post_sync, qword)?;

        let mut dw = Dwords::new();
        dw.push(OPCODE_FLUSH_DW | (FLUSH_DW_DWORDS as u32 - 2));
        dw.push((params.post_sync.encode() << 14) | ((qword as u32) << 21));
        Self::push_address(&mut dw, params.dest.as_ref(), params.offset);
        dw.push(params.immediate as u32);

        let patches: &[PatchEntry] = patch.as_slice();
        cmd.append(MiCommand::FlushDw(params.clone()), &dw, patches)
    }

    fn add_store_data_imm(&self, cmd: &mut CommandBuffer, params: &StoreDataImmParams) -> Result<()> {
        if !params.dest.gpu_addr().offset(params.offset as u64).is_aligned(4) {
            return Err(Error::MisalignedAddress);
        }

        let mut dw = Dwords::new();
        dw.push(OPCODE_STORE_DATA_IMM | (STORE_DATA_IMM_DWORDS as u32 - 2));
        Self::push_address(&mut dw, Some(&params.dest), params.offset);
        dw.push(params.value);

        let patch = PatchEntry {
            resource: params.dest.clone(),
            command_offset: STORE_ADDR_DWORD * 4,
            resource_offset: params.offset,
            write: true,
        };
        cmd.append(MiCommand::StoreDataImm(params.clone()), &dw, &[patch])
    }

    fn add_batch_buffer_end(&self, cmd: &mut CommandBuffer) -> Result<()> {
        cmd.append(MiCommand::BatchBufferEnd, &[OPCODE_BATCH_BUFFER_END], &[])
    }

    fn command_size(&self, kind: MiCommandKind) -> u32 {
        let dwords = match kind {
            MiCommandKind::PipeControl => PIPE_CONTROL_DWORDS,
            MiCommandKind::FlushDw => FLUSH_DW_DWORDS,
            MiCommandKind::StoreDataImm => STORE_DATA_IMM_DWORDS,
            MiCommandKind::BatchBufferEnd => 1,
        };
        (dwords * 4) as u32
    }
}

static_assertions::assert_impl_all!(SoftMi: Send, Sync);
