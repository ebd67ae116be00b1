//! # Media Context
//!
//! Tracks which GPU engine the current frame executes on.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

// =============================================================================
// GPU CONTEXT
// =============================================================================

/// GPU context (engine node) a command buffer is submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuContext {
    /// Render command streamer (3D/media pipe)
    Render,
    /// Compute command streamer
    Compute,
    /// Video decode/encode box
    Video,
    /// Video enhancement box
    VideoEnhance,
    /// Blitter (copy engine)
    Blitter,
}

impl GpuContext {
    /// Check if this context runs on a render-capable engine
    ///
    /// Render-capable engines take `PIPE_CONTROL`; all others take
    /// `MI_FLUSH_DW` for flush and post-sync work.
    pub const fn is_render(self) -> bool {
        matches!(self, GpuContext::Render)
    }

    /// Short engine name for logs
    pub const fn name(self) -> &'static str {
        match self {
            GpuContext::Render => "rcs",
            GpuContext::Compute => "ccs",
            GpuContext::Video => "vcs",
            GpuContext::VideoEnhance => "vecs",
            GpuContext::Blitter => "bcs",
        }
    }
}

// =============================================================================
// MEDIA CONTEXT
// =============================================================================

/// Shared execution context for one frame sequence
#[derive(Debug)]
pub struct MediaContext {
    /// Currently selected GPU context
    current: RwLock<GpuContext>,
    /// Number of context switches
    switches: AtomicU64,
}

impl MediaContext {
    /// Create a context starting on `initial`
    pub fn new(initial: GpuContext) -> Self {
        Self {
            current: RwLock::new(initial),
            switches: AtomicU64::new(0),
        }
    }

    /// Get the current GPU context
    pub fn gpu_context(&self) -> GpuContext {
        *self.current.read()
    }

    /// Switch to another GPU context
    pub fn switch_context(&self, ctx: GpuContext) {
        let mut current = self.current.write();
        if *current != ctx {
            log::debug!("media context: {} -> {}", current.name(), ctx.name());
            *current = ctx;
            self.switches.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Check if the render engine executes the current frame
    pub fn is_render_engine_used(&self) -> bool {
        self.gpu_context().is_render()
    }

    /// Number of effective context switches
    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }
}

static_assertions::assert_impl_all!(MediaContext: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_engine_used() {
        let ctx = MediaContext::new(GpuContext::Video);
        assert!(!ctx.is_render_engine_used());

        ctx.switch_context(GpuContext::Render);
        assert!(ctx.is_render_engine_used());
        assert_eq!(ctx.switch_count(), 1);
    }

    #[test]
    fn test_switch_to_same_context() {
        let ctx = MediaContext::new(GpuContext::Compute);
        ctx.switch_context(GpuContext::Compute);
        assert_eq!(ctx.switch_count(), 0);
        assert!(!ctx.is_render_engine_used());
    }
}
