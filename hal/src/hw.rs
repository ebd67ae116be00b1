//! # Hardware Interface
//!
//! Bundles the collaborators a pipeline borrows from the hardware side and
//! owns the active single-pipe scalability strategy.
//!
//! Collaborators are optional so partially configured interfaces can be
//! built; consumers check presence and fail with `NullReference`.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use spin::Mutex;

use vcp_core::{Collaborator, Error, Result};

use crate::mi::{MiInterface, SoftMi};
use crate::os::{OsConfig, OsInterface};
use crate::scalability::MediaScalability;

/// Hardware interface context
pub struct HwInterface {
    /// OS abstraction (shared)
    os: Option<Arc<OsInterface>>,
    /// MI command interface (shared)
    mi: Option<Arc<dyn MiInterface>>,
    /// Active single-pipe strategy (exclusively owned)
    single_pipe: Mutex<StrategySlot>,
}

/// Installed strategy and the install it came from
#[derive(Default)]
struct StrategySlot {
    strategy: Option<Box<dyn MediaScalability>>,
    /// Bumped on every install
    generation: u64,
}

impl HwInterface {
    /// Create from optional collaborators
    pub fn new(os: Option<Arc<OsInterface>>, mi: Option<Arc<dyn MiInterface>>) -> Self {
        Self {
            os,
            mi,
            single_pipe: Mutex::new(StrategySlot::default()),
        }
    }

    /// Fully configured interface with the software MI encoder
    pub fn with_defaults(config: OsConfig) -> Self {
        Self::new(
            Some(Arc::new(OsInterface::new(config))),
            Some(Arc::new(SoftMi::new())),
        )
    }

    /// OS abstraction
    pub fn os_interface(&self) -> Option<&Arc<OsInterface>> {
        self.os.as_ref()
    }

    /// MI command interface
    pub fn mi_interface(&self) -> Option<&Arc<dyn MiInterface>> {
        self.mi.as_ref()
    }

    /// Install `strategy` as the active single-pipe strategy
    ///
    /// Returns the strategy it replaced.
    pub fn install_single_pipe(
        &self,
        strategy: Box<dyn MediaScalability>,
    ) -> Option<Box<dyn MediaScalability>> {
        let mut slot = self.single_pipe.lock();
        slot.generation += 1;
        let prev = slot.strategy.replace(strategy);
        if prev.is_some() {
            log::debug!("hw: replaced single-pipe strategy (install {})", slot.generation);
        }
        prev
    }

    /// Install count of the current strategy
    ///
    /// Read right after installing to later release only that strategy.
    pub fn single_pipe_generation(&self) -> u64 {
        self.single_pipe.lock().generation
    }

    /// Remove the active strategy if it is still install `generation`
    pub fn release_single_pipe(&self, generation: u64) -> Option<Box<dyn MediaScalability>> {
        let mut slot = self.single_pipe.lock();
        if slot.generation != generation {
            log::trace!(
                "hw: install {} already replaced by {}",
                generation,
                slot.generation
            );
            return None;
        }
        slot.strategy.take()
    }

    /// Check if a single-pipe strategy is installed
    pub fn has_single_pipe(&self) -> bool {
        self.single_pipe.lock().strategy.is_some()
    }

    /// Run `f` against the active single-pipe strategy
    ///
    /// The slot stays locked for the duration of `f`.
    pub fn with_single_pipe<R>(&self, f: impl FnOnce(&mut dyn MediaScalability) -> R) -> Result<R> {
        let mut slot = self.single_pipe.lock();
        match slot.strategy.as_deref_mut() {
            Some(strategy) => Ok(f(strategy)),
            None => Err(Error::NullReference(Collaborator::Scalability)),
        }
    }
}

impl fmt::Debug for HwInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwInterface")
            .field("os", &self.os.is_some())
            .field("mi", &self.mi)
            .field("single_pipe", &self.has_single_pipe())
            .finish()
    }
}

static_assertions::assert_impl_all!(HwInterface: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdbuf::{CommandBuffer, CommandSize};
    use crate::scalability::{ScalabilityComponent, ScalabilityOption};
    use vcp_core::SubmissionId;

    #[derive(Debug)]
    struct NullStrategy(u8);

    impl MediaScalability for NullStrategy {
        fn initialize(&mut self, _option: &ScalabilityOption) -> Result<()> {
            Ok(())
        }
        fn is_initialized(&self) -> bool {
            true
        }
        fn component(&self) -> ScalabilityComponent {
            ScalabilityComponent::Decode
        }
        fn pipe_count(&self) -> u8 {
            self.0
        }
        fn option(&self) -> Option<&ScalabilityOption> {
            None
        }
        fn is_scalability_mode_matched(&self, _option: &ScalabilityOption) -> bool {
            false
        }
        fn verify_cmd_buffer(&mut self, _size: CommandSize) -> Result<()> {
            Ok(())
        }
        fn get_cmd_buffer(&mut self) -> Result<CommandBuffer> {
            Err(Error::NotSupported)
        }
        fn return_cmd_buffer(&mut self, _cmd: CommandBuffer) -> Result<()> {
            Err(Error::NotSupported)
        }
        fn discard_cmd_buffer(&mut self) {}
        fn submit_cmd_buffer(&mut self) -> Result<SubmissionId> {
            Err(Error::NotSupported)
        }
    }

    #[test]
    fn test_empty_slot() {
        let hw = HwInterface::new(None, None);
        assert!(!hw.has_single_pipe());
        assert_eq!(
            hw.with_single_pipe(|s| s.pipe_count()),
            Err(Error::NullReference(Collaborator::Scalability))
        );
    }

    #[test]
    fn test_install_replaces() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        assert!(hw.install_single_pipe(Box::new(NullStrategy(1))).is_none());
        let prev = hw.install_single_pipe(Box::new(NullStrategy(2)));
        assert_eq!(prev.map(|p| p.pipe_count()), Some(1));
        assert_eq!(hw.with_single_pipe(|s| s.pipe_count()), Ok(2));
        assert_eq!(hw.single_pipe_generation(), 2);
        assert!(hw.release_single_pipe(2).is_some());
        assert!(!hw.has_single_pipe());
    }

    #[test]
    fn test_release_only_own_install() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        hw.install_single_pipe(Box::new(NullStrategy(1)));
        let first = hw.single_pipe_generation();
        hw.install_single_pipe(Box::new(NullStrategy(2)));

        assert!(hw.release_single_pipe(first).is_none());
        assert_eq!(hw.with_single_pipe(|s| s.pipe_count()), Ok(2));

        let second = hw.single_pipe_generation();
        assert_eq!(hw.release_single_pipe(second).map(|s| s.pipe_count()), Some(2));
        assert!(hw.release_single_pipe(second).is_none());
    }
}
