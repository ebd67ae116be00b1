//! # Command Buffer
//!
//! Ordered dword stream of hardware instructions plus the patch list that
//! relocates the resource addresses those instructions reference.

use alloc::vec::Vec;
use core::ops::Add;

use vcp_core::{ByteSize, Error, OsResource, Result};

use crate::context::GpuContext;
use crate::mi::MiCommand;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Command buffer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBufferConfig {
    /// Command space in bytes
    pub size: ByteSize,
    /// Patch list capacity in entries
    pub patch_entries: u32,
}

impl Default for CommandBufferConfig {
    fn default() -> Self {
        Self {
            size: ByteSize::from_kib(16),
            patch_entries: 64,
        }
    }
}

// =============================================================================
// COMMAND SIZE
// =============================================================================

/// Space a packet needs in the command buffer and patch list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandSize {
    /// Command bytes
    pub command_bytes: u32,
    /// Patch list entries
    pub patch_entries: u32,
}

impl CommandSize {
    /// No extra space
    pub const ZERO: Self = Self {
        command_bytes: 0,
        patch_entries: 0,
    };

    /// Create a size requirement
    pub const fn new(command_bytes: u32, patch_entries: u32) -> Self {
        Self {
            command_bytes,
            patch_entries,
        }
    }

    /// Check if nothing extra is required
    pub const fn is_zero(&self) -> bool {
        self.command_bytes == 0 && self.patch_entries == 0
    }

    /// Add, failing on overflow
    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        Ok(Self {
            command_bytes: self
                .command_bytes
                .checked_add(rhs.command_bytes)
                .ok_or(Error::InvalidParameter)?,
            patch_entries: self
                .patch_entries
                .checked_add(rhs.patch_entries)
                .ok_or(Error::InvalidParameter)?,
        })
    }
}

impl Add for CommandSize {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            command_bytes: self.command_bytes.saturating_add(rhs.command_bytes),
            patch_entries: self.patch_entries.saturating_add(rhs.patch_entries),
        }
    }
}

// =============================================================================
// PATCH ENTRY
// =============================================================================

/// Relocation of one resource address inside the command stream
#[derive(Debug, Clone)]
pub struct PatchEntry {
    /// Referenced resource
    pub resource: OsResource,
    /// Byte offset of the address dword in the command stream
    pub command_offset: u32,
    /// Byte offset inside the resource
    pub resource_offset: u32,
    /// Engine writes through this address
    pub write: bool,
}

// =============================================================================
// COMMAND BUFFER
// =============================================================================

/// A command buffer being recorded for one pipe
#[derive(Debug)]
pub struct CommandBuffer {
    /// Encoded instruction dwords
    dwords: Vec<u32>,
    /// Decoded view of every appended command, in order
    commands: Vec<MiCommand>,
    /// Relocations
    patch_list: Vec<PatchEntry>,
    /// Current capacities
    config: CommandBufferConfig,
    /// Context the buffer is recorded for
    gpu_context: Option<GpuContext>,
}

impl CommandBuffer {
    /// Create an empty command buffer
    pub fn new(config: CommandBufferConfig) -> Self {
        Self {
            dwords: Vec::new(),
            commands: Vec::new(),
            patch_list: Vec::new(),
            config,
            gpu_context: None,
        }
    }

    /// Get configuration (current capacities)
    pub fn config(&self) -> CommandBufferConfig {
        self.config
    }

    /// Bytes already used
    pub fn used_bytes(&self) -> u32 {
        (self.dwords.len() * 4) as u32
    }

    /// Bytes still free
    pub fn remaining_bytes(&self) -> u32 {
        (self.config.size.as_bytes() as u32).saturating_sub(self.used_bytes())
    }

    /// Patch entries still free
    pub fn remaining_patch_entries(&self) -> u32 {
        self.config
            .patch_entries
            .saturating_sub(self.patch_list.len() as u32)
    }

    /// Check if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.dwords.is_empty()
    }

    /// Check there is room for `size` more
    pub fn has_room(&self, size: CommandSize) -> Result<()> {
        if size.command_bytes > self.remaining_bytes() {
            return Err(Error::CommandBufferFull);
        }
        if size.patch_entries > self.remaining_patch_entries() {
            return Err(Error::PatchListFull);
        }
        Ok(())
    }

    /// Append one encoded command
    ///
    /// `patches` carry offsets relative to the start of `dwords`; they are
    /// rebased onto the buffer. Nothing is appended on failure.
    pub fn append(&mut self, command: MiCommand, dwords: &[u32], patches: &[PatchEntry]) -> Result<()> {
        self.has_room(CommandSize::new(
            (dwords.len() * 4) as u32,
            patches.len() as u32,
        ))?;

        let base = self.used_bytes();
        for patch in patches {
            let mut entry = patch.clone();
            entry.command_offset += base;
            self.patch_list.push(entry);
        }
        self.dwords.extend_from_slice(dwords);

        log::trace!("cmdbuf: +{} ({} dwords)", command.kind().name(), dwords.len());
        self.commands.push(command);
        Ok(())
    }

    /// Grow capacities to at least `config` (never shrinks)
    pub fn grow(&mut self, config: CommandBufferConfig) {
        if config.size > self.config.size {
            self.config.size = config.size;
        }
        if config.patch_entries > self.config.patch_entries {
            self.config.patch_entries = config.patch_entries;
        }
    }

    /// Drop recorded content, keep capacities
    pub fn reset(&mut self) {
        self.dwords.clear();
        self.commands.clear();
        self.patch_list.clear();
        self.gpu_context = None;
    }

    /// Encoded dwords
    pub fn dwords(&self) -> &[u32] {
        &self.dwords
    }

    /// Recorded commands
    pub fn commands(&self) -> &[MiCommand] {
        &self.commands
    }

    /// Relocations
    pub fn patch_list(&self) -> &[PatchEntry] {
        &self.patch_list
    }

    /// Context the buffer is recorded for
    pub fn gpu_context(&self) -> Option<GpuContext> {
        self.gpu_context
    }

    /// Bind the buffer to a context
    pub fn set_gpu_context(&mut self, ctx: GpuContext) {
        self.gpu_context = Some(ctx);
    }
}

static_assertions::assert_impl_all!(CommandBuffer: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_core::{GpuAddr, ResourceId};

    fn small() -> CommandBuffer {
        CommandBuffer::new(CommandBufferConfig {
            size: ByteSize::from_bytes(16),
            patch_entries: 1,
        })
    }

    #[test]
    fn test_append_and_rebase() {
        let res = OsResource::new(ResourceId::new(1), "dst", GpuAddr::new(0x1000), ByteSize::KIB_4);
        let mut cmd = small();

        cmd.append(MiCommand::BatchBufferEnd, &[0x0500_0000], &[]).unwrap();
        let patch = PatchEntry {
            resource: res,
            command_offset: 4,
            resource_offset: 0,
            write: true,
        };
        cmd.append(MiCommand::BatchBufferEnd, &[1, 2], &[patch]).unwrap();

        assert_eq!(cmd.used_bytes(), 12);
        assert_eq!(cmd.commands().len(), 2);
        assert_eq!(cmd.patch_list()[0].command_offset, 8);
    }

    #[test]
    fn test_full_buffer_appends_nothing() {
        let mut cmd = small();
        assert_eq!(
            cmd.append(MiCommand::BatchBufferEnd, &[0; 5], &[]),
            Err(Error::CommandBufferFull)
        );
        assert!(cmd.is_empty());
        assert!(cmd.commands().is_empty());
    }

    #[test]
    fn test_grow_never_shrinks() {
        let mut cmd = small();
        cmd.grow(CommandBufferConfig {
            size: ByteSize::from_bytes(8),
            patch_entries: 4,
        });
        assert_eq!(cmd.config().size, ByteSize::from_bytes(16));
        assert_eq!(cmd.config().patch_entries, 4);
    }

    #[test]
    fn test_command_size_add() {
        let a = CommandSize::new(24, 1);
        let b = CommandSize::new(20, 1);
        assert_eq!(a + b, CommandSize::new(44, 2));
        assert!(CommandSize::ZERO.is_zero());
        assert_eq!(
            CommandSize::new(u32::MAX, 0).checked_add(a),
            Err(Error::InvalidParameter)
        );
    }
}
