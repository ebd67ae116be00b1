//! # OS Interface
//!
//! OS abstraction for resource allocation and command-buffer submission.
//!
//! Submissions queue in FIFO order per interface. The engine side is a
//! software device: [`OsInterface::retire`] replays queued buffers against
//! resource memory, which is the moment post-sync writes become visible.
//! Appending a command and retiring it are distinct events; only the latter
//! changes memory.

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use vcp_core::{ByteSize, Error, GpuAddr, OsResource, ResourceId, Result, SubmissionId};

use crate::cmdbuf::CommandBuffer;
use crate::context::GpuContext;
use crate::mi::{MiCommand, PostSyncOp};

// =============================================================================
// STREAM STATE
// =============================================================================

/// Component that owns the submission stream (accounting/diagnostics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Component {
    /// Not yet tagged
    #[default]
    Unknown,
    /// Decode
    Decode,
    /// Encode
    Encode,
    /// Video processing
    VpCommon,
}

/// Per-stream OS state
#[derive(Debug, Clone, Default)]
pub struct OsStreamState {
    /// Owning component
    pub component: Component,
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// OS interface configuration
#[derive(Debug, Clone)]
pub struct OsConfig {
    /// Create a stream state for component accounting
    pub stream_state: bool,
    /// First GPU address handed out
    pub heap_base: GpuAddr,
    /// GPU address space available for resources
    pub heap_size: ByteSize,
    /// Device clock increment per retired timestamp write
    pub clock_step: u64,
    /// Retired submissions kept for inspection
    pub retired_history: usize,
}

impl Default for OsConfig {
    fn default() -> Self {
        Self {
            stream_state: true,
            heap_base: GpuAddr::new(0x0010_0000),
            heap_size: ByteSize::from_kib(64 * 1024),
            clock_step: 1000,
            retired_history: 16,
        }
    }
}

// =============================================================================
// SUBMISSION
// =============================================================================

/// A command buffer queued on an engine
#[derive(Debug)]
struct Submission {
    id: SubmissionId,
    context: GpuContext,
    buffer: CommandBuffer,
}

/// Submission statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    /// Total submissions
    pub submitted: u64,
    /// Total retired, faulted ones included
    pub retired: u64,
    /// Retired with a failed memory write
    pub faulted: u64,
}

// =============================================================================
// OS INTERFACE
// =============================================================================

/// OS abstraction shared by the hardware interface and the scalability layer
#[derive(Debug)]
pub struct OsInterface {
    config: OsConfig,
    stream_state: Option<Mutex<OsStreamState>>,
    next_resource: AtomicU64,
    next_addr: AtomicU64,
    next_submission: AtomicU64,
    device_clock: AtomicU64,
    pending: Mutex<VecDeque<Submission>>,
    retired: Mutex<VecDeque<Submission>>,
    stats: Mutex<SubmitStats>,
}

impl OsInterface {
    /// Create an OS interface
    pub fn new(config: OsConfig) -> Self {
        let stream_state = config
            .stream_state
            .then(|| Mutex::new(OsStreamState::default()));
        let base = config.heap_base.raw();
        Self {
            config,
            stream_state,
            next_resource: AtomicU64::new(1),
            next_addr: AtomicU64::new(base),
            next_submission: AtomicU64::new(1),
            device_clock: AtomicU64::new(0),
            pending: Mutex::new(VecDeque::new()),
            retired: Mutex::new(VecDeque::new()),
            stats: Mutex::new(SubmitStats::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Stream state
    // -------------------------------------------------------------------------

    /// Check if a stream state exists
    pub fn has_stream_state(&self) -> bool {
        self.stream_state.is_some()
    }

    /// Tag the owning component; returns false without a stream state
    pub fn set_component(&self, component: Component) -> bool {
        match &self.stream_state {
            Some(state) => {
                state.lock().component = component;
                true
            },
            None => false,
        }
    }

    /// Get the owning component
    pub fn component(&self) -> Option<Component> {
        self.stream_state.as_ref().map(|s| s.lock().component)
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    /// Allocate a zeroed, page-aligned GPU-visible buffer
    pub fn allocate_resource(&self, name: &'static str, size: ByteSize) -> Result<OsResource> {
        if size == ByteSize::ZERO {
            return Err(Error::InvalidParameter);
        }
        let span = size.align_up(ByteSize::KIB_4.as_bytes()).as_bytes();
        let limit = self.config.heap_base.raw() + self.config.heap_size.as_bytes();

        let addr = self
            .next_addr
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                cur.checked_add(span).filter(|end| *end <= limit)
            })
            .map_err(|_| Error::OutOfMemory)?;

        let id = ResourceId::new(self.next_resource.fetch_add(1, Ordering::Relaxed));
        log::debug!("os: allocated {} ({}) at {}", name, size, GpuAddr::new(addr));
        Ok(OsResource::new(id, name, GpuAddr::new(addr), size))
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Queue a command buffer on `context`
    pub fn submit(&self, context: GpuContext, buffer: CommandBuffer) -> Result<SubmissionId> {
        if buffer.is_empty() {
            return Err(Error::InvalidParameter);
        }
        if let Some(bound) = buffer.gpu_context() {
            if bound != context {
                log::warn!("os: buffer recorded for {} submitted to {}", bound.name(), context.name());
                return Err(Error::SubmissionFailed);
            }
        }

        let id = SubmissionId::new(self.next_submission.fetch_add(1, Ordering::Relaxed));
        log::debug!(
            "os: submit #{} on {} ({} bytes, {} commands)",
            id.id(),
            context.name(),
            buffer.used_bytes(),
            buffer.commands().len()
        );
        self.pending.lock().push_back(Submission { id, context, buffer });
        self.stats.lock().submitted += 1;
        Ok(id)
    }

    /// Number of queued, not yet retired submissions
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Retire up to `max` submissions in order; returns how many retired
    ///
    /// A submission whose replay faults is still retired and counted, then
    /// its error stops the walk. Later submissions stay queued.
    pub fn retire(&self, max: usize) -> Result<usize> {
        let mut done = 0;
        while done < max {
            let Some(sub) = self.pending.lock().pop_front() else {
                break;
            };
            let replayed = self.replay(&sub);
            match &replayed {
                Ok(()) => log::trace!("os: retired #{} on {}", sub.id.id(), sub.context.name()),
                Err(e) => log::warn!("os: #{} on {} faulted: {}", sub.id.id(), sub.context.name(), e),
            }

            let mut retired = self.retired.lock();
            retired.push_back(sub);
            while retired.len() > self.config.retired_history {
                retired.pop_front();
            }
            drop(retired);

            let mut stats = self.stats.lock();
            stats.retired += 1;
            if replayed.is_err() {
                stats.faulted += 1;
            }
            drop(stats);

            replayed?;
            done += 1;
        }
        Ok(done)
    }

    /// Retire everything queued
    pub fn retire_all(&self) -> Result<usize> {
        self.retire(usize::MAX)
    }

    /// Inspect a queued or recently retired submission
    pub fn inspect_submission<R>(&self, id: SubmissionId, f: impl FnOnce(&CommandBuffer) -> R) -> Option<R> {
        if let Some(sub) = self.pending.lock().iter().find(|s| s.id == id) {
            return Some(f(&sub.buffer));
        }
        self.retired
            .lock()
            .iter()
            .find(|s| s.id == id)
            .map(|s| f(&s.buffer))
    }

    /// Submission statistics
    pub fn stats(&self) -> SubmitStats {
        *self.stats.lock()
    }

    /// Current device clock
    pub fn device_clock(&self) -> u64 {
        self.device_clock.load(Ordering::Acquire)
    }

    fn tick(&self) -> u64 {
        self.device_clock
            .fetch_add(self.config.clock_step, Ordering::AcqRel)
            + self.config.clock_step
    }

    /// Execute the memory side effects of one submission
    fn replay(&self, sub: &Submission) -> Result<()> {
        for command in sub.buffer.commands() {
            match command {
                MiCommand::PipeControl(p) => {
                    if let Some(dest) = &p.dest {
                        match p.post_sync {
                            PostSyncOp::None => {},
                            PostSyncOp::WriteImmediate => dest.write_u64(p.offset, p.immediate)?,
                            PostSyncOp::WriteTimestamp => dest.write_u64(p.offset, self.tick())?,
                        }
                    }
                },
                MiCommand::FlushDw(p) => {
                    if let Some(dest) = &p.dest {
                        match p.post_sync {
                            PostSyncOp::None => {},
                            PostSyncOp::WriteImmediate if p.qword_enable => {
                                dest.write_u64(p.offset, p.immediate)?
                            },
                            PostSyncOp::WriteImmediate => dest.write_u32(p.offset, p.immediate as u32)?,
                            PostSyncOp::WriteTimestamp => dest.write_u64(p.offset, self.tick())?,
                        }
                    }
                },
                MiCommand::StoreDataImm(p) => p.dest.write_u32(p.offset, p.value)?,
                MiCommand::BatchBufferEnd => break,
            }
        }
        Ok(())
    }
}

static_assertions::assert_impl_all!(OsInterface: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdbuf::CommandBufferConfig;
    use crate::mi::{MiFlushDwParams, MiInterface, SoftMi, StoreDataImmParams};

    #[test]
    fn test_allocate_page_aligned() {
        let os = OsInterface::new(OsConfig::default());
        let a = os.allocate_resource("a", ByteSize::from_bytes(8)).unwrap();
        let b = os.allocate_resource("b", ByteSize::from_bytes(8)).unwrap();
        assert!(a.gpu_addr().is_aligned(4096));
        assert_eq!(b.gpu_addr().raw() - a.gpu_addr().raw(), 4096);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_allocate_out_of_memory() {
        let os = OsInterface::new(OsConfig {
            heap_size: ByteSize::KIB_4,
            ..OsConfig::default()
        });
        os.allocate_resource("a", ByteSize::from_bytes(16)).unwrap();
        assert_eq!(
            os.allocate_resource("b", ByteSize::from_bytes(16)).unwrap_err(),
            Error::OutOfMemory
        );
    }

    #[test]
    fn test_stream_state_component() {
        let os = OsInterface::new(OsConfig::default());
        assert_eq!(os.component(), Some(Component::Unknown));
        assert!(os.set_component(Component::VpCommon));
        assert_eq!(os.component(), Some(Component::VpCommon));

        let bare = OsInterface::new(OsConfig {
            stream_state: false,
            ..OsConfig::default()
        });
        assert!(!bare.set_component(Component::Decode));
        assert_eq!(bare.component(), None);
    }

    #[test]
    fn test_write_lands_only_on_retire() {
        let os = OsInterface::new(OsConfig::default());
        let mi = SoftMi::new();
        let dst = os.allocate_resource("ts", ByteSize::from_bytes(16)).unwrap();

        let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
        mi.add_store_data_imm(&mut cmd, &StoreDataImmParams {
            dest: dst.clone(),
            offset: 8,
            value: 7,
        })
        .unwrap();
        mi.add_mi_flush_dw(&mut cmd, &MiFlushDwParams {
            dest: Some(dst.clone()),
            offset: 0,
            post_sync: PostSyncOp::WriteTimestamp,
            qword_enable: true,
            ..Default::default()
        })
        .unwrap();

        let id = os.submit(GpuContext::Video, cmd).unwrap();
        assert_eq!(dst.read_u64(0).unwrap(), 0);
        assert_eq!(os.pending_count(), 1);

        assert_eq!(os.retire_all().unwrap(), 1);
        assert_eq!(dst.read_u32(8).unwrap(), 7);
        assert_eq!(dst.read_u64(0).unwrap(), os.device_clock());
        assert!(os.inspect_submission(id, |b| b.commands().len()).is_some());
        assert_eq!(
            os.stats(),
            SubmitStats {
                submitted: 1,
                retired: 1,
                faulted: 0
            }
        );
    }

    #[test]
    fn test_retire_in_order() {
        let os = OsInterface::new(OsConfig::default());
        let mi = SoftMi::new();
        let dst = os.allocate_resource("tag", ByteSize::from_bytes(8)).unwrap();

        for tag in 1..=3u32 {
            let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
            mi.add_store_data_imm(&mut cmd, &StoreDataImmParams {
                dest: dst.clone(),
                offset: 0,
                value: tag,
            })
            .unwrap();
            os.submit(GpuContext::Video, cmd).unwrap();
        }

        assert_eq!(os.retire(2).unwrap(), 2);
        assert_eq!(dst.read_u32(0).unwrap(), 2);
        assert_eq!(os.retire(5).unwrap(), 1);
        assert_eq!(dst.read_u32(0).unwrap(), 3);
    }

    #[test]
    fn test_faulted_submission_is_retired() {
        let os = OsInterface::new(OsConfig::default());
        let mi = SoftMi::new();
        let small = os.allocate_resource("small", ByteSize::from_bytes(8)).unwrap();

        let store = |offset: u32, value: u32| {
            let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
            mi.add_store_data_imm(&mut cmd, &StoreDataImmParams {
                dest: small.clone(),
                offset,
                value,
            })
            .unwrap();
            os.submit(GpuContext::Video, cmd).unwrap()
        };
        let bad = store(16, 1);
        let next = store(0, 2);

        assert_eq!(os.retire_all(), Err(Error::BufferOverflow));
        assert_eq!(os.pending_count(), 1);
        assert_eq!(os.inspect_submission(bad, |b| b.commands().len()), Some(1));
        assert_eq!(
            os.stats(),
            SubmitStats {
                submitted: 2,
                retired: 1,
                faulted: 1
            }
        );

        assert_eq!(os.retire_all(), Ok(1));
        assert_eq!(small.read_u32(0).unwrap(), 2);
        assert!(os.inspect_submission(next, |_| ()).is_some());
        assert_eq!(os.stats().faulted, 1);
    }

    #[test]
    fn test_submit_rejects_empty_and_mismatched() {
        let os = OsInterface::new(OsConfig::default());
        let empty = CommandBuffer::new(CommandBufferConfig::default());
        assert_eq!(os.submit(GpuContext::Video, empty), Err(Error::InvalidParameter));

        let mut cmd = CommandBuffer::new(CommandBufferConfig::default());
        SoftMi::new().add_batch_buffer_end(&mut cmd).unwrap();
        cmd.set_gpu_context(GpuContext::Render);
        assert_eq!(os.submit(GpuContext::Video, cmd), Err(Error::SubmissionFailed));
    }
}
