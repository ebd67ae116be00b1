//! # Single-Pipe Scalability
//!
//! Strategy that routes every packet-emitted command to one hardware pipe.
//! The strategy keeps shared handles to the OS and MI interfaces of the
//! hardware interface it was built from and exclusively owns its option.

use alloc::boxed::Box;
use alloc::sync::Arc;

use vcp_core::error::require;
use vcp_core::{Collaborator, Error, Result, SubmissionId};
use vcp_hal::{
    CommandBuffer, CommandSize, HwInterface, MediaContext, MediaScalability, MiInterface,
    OsInterface, ScalabilityComponent, ScalabilityOption,
};

use crate::base::SinglePipe;
use crate::slot::OwnedSlot;

// =============================================================================
// BINDING
// =============================================================================

/// Collaborators borrowed from the hardware interface
#[derive(Debug)]
enum Binding {
    /// Built without a hardware interface; every operation fails
    Detached,
    /// Handles retained from the hardware interface
    Bound {
        os: Option<Arc<OsInterface>>,
        mi: Option<Arc<dyn MiInterface>>,
    },
}

impl Binding {
    fn os(&self) -> Result<&Arc<OsInterface>> {
        match self {
            Binding::Detached => Err(Error::NullReference(Collaborator::HwInterface)),
            Binding::Bound { os, .. } => require(os.as_ref(), Collaborator::OsInterface),
        }
    }

    fn mi(&self) -> Result<&Arc<dyn MiInterface>> {
        match self {
            Binding::Detached => Err(Error::NullReference(Collaborator::HwInterface)),
            Binding::Bound { mi, .. } => require(mi.as_ref(), Collaborator::MiInterface),
        }
    }
}

// =============================================================================
// STRATEGY
// =============================================================================

/// Single-pipe execution-engine strategy
#[derive(Debug)]
pub struct SinglePipeScalability {
    binding: Binding,
    context: Arc<MediaContext>,
    component: ScalabilityComponent,
    option: OwnedSlot<ScalabilityOption>,
    pipe: Option<SinglePipe>,
}

impl SinglePipeScalability {
    /// Create a strategy; without `hw` the strategy is detached
    pub fn new(
        hw: Option<&HwInterface>,
        context: Arc<MediaContext>,
        component: ScalabilityComponent,
    ) -> Self {
        let binding = match hw {
            Some(hw) => Binding::Bound {
                os: hw.os_interface().cloned(),
                mi: hw.mi_interface().cloned(),
            },
            None => {
                log::warn!("scalability: {:?} strategy built without hardware interface", component);
                Binding::Detached
            },
        };
        Self {
            binding,
            context,
            component,
            option: OwnedSlot::empty(),
            pipe: None,
        }
    }

    /// Check if the strategy was built without a hardware interface
    pub fn is_detached(&self) -> bool {
        matches!(self.binding, Binding::Detached)
    }

    /// MI interface retained from the hardware interface
    pub fn mi_interface(&self) -> Option<&Arc<dyn MiInterface>> {
        self.binding.mi().ok()
    }

    fn pipe_mut(&mut self) -> Result<&mut SinglePipe> {
        self.binding.os()?;
        self.pipe.as_mut().ok_or(Error::InvalidState)
    }
}

impl MediaScalability for SinglePipeScalability {
    fn initialize(&mut self, option: &ScalabilityOption) -> Result<()> {
        let os = self.binding.os()?.clone();

        self.option.replace(Box::new(option.clone()));
        if !os.set_component(self.component.stream_component()) {
            log::trace!("scalability: no stream state to tag");
        }

        self.pipe = None;
        self.pipe = Some(SinglePipe::initialize(option, self.component, &self.context)?);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.pipe.is_some()
    }

    fn component(&self) -> ScalabilityComponent {
        self.component
    }

    fn pipe_count(&self) -> u8 {
        1
    }

    fn option(&self) -> Option<&ScalabilityOption> {
        self.option.get()
    }

    fn is_scalability_mode_matched(&self, option: &ScalabilityOption) -> bool {
        option.num_pipes == 1 && self.is_initialized() && self.option.get() == Some(option)
    }

    fn verify_cmd_buffer(&mut self, size: CommandSize) -> Result<()> {
        let mi = self.binding.mi()?.clone();
        self.pipe_mut()?.verify(size, mi.as_ref())
    }

    fn get_cmd_buffer(&mut self) -> Result<CommandBuffer> {
        self.pipe_mut()?.get()
    }

    fn return_cmd_buffer(&mut self, cmd: CommandBuffer) -> Result<()> {
        self.pipe_mut()?.give_back(cmd)
    }

    fn discard_cmd_buffer(&mut self) {
        if let Some(pipe) = self.pipe.as_mut() {
            pipe.discard();
        }
    }

    fn submit_cmd_buffer(&mut self) -> Result<SubmissionId> {
        let os = self.binding.os()?.clone();
        let mi = self.binding.mi()?.clone();
        self.pipe_mut()?.submit(&os, mi.as_ref())
    }
}

impl Drop for SinglePipeScalability {
    fn drop(&mut self) {
        log::debug!(
            "scalability: dropping {:?} strategy (option held: {})",
            self.component,
            self.option.is_occupied()
        );
    }
}

static_assertions::assert_impl_all!(SinglePipeScalability: Send);

// =============================================================================
// FACTORY
// =============================================================================

/// Build a single-pipe strategy and install it on `hw`
///
/// The previously installed strategy is dropped. Nothing is installed when
/// either input is absent.
pub fn create_single_pipe(
    hw: Option<&HwInterface>,
    context: Option<&Arc<MediaContext>>,
    component: ScalabilityComponent,
) -> Result<()> {
    let hw = require(hw, Collaborator::HwInterface)?;
    let context = require(context, Collaborator::MediaContext)?;

    let strategy = SinglePipeScalability::new(Some(hw), context.clone(), component);
    if hw.install_single_pipe(Box::new(strategy)).is_some() {
        log::debug!("scalability: previous single-pipe strategy released");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_hal::{Component, EnginePolicy, GpuContext, OsConfig, SoftMi};

    fn context() -> Arc<MediaContext> {
        Arc::new(MediaContext::new(GpuContext::Render))
    }

    #[test]
    fn test_detached_is_inert() {
        let ctx = context();
        let mut strategy = SinglePipeScalability::new(None, ctx.clone(), ScalabilityComponent::Decode);
        let hw_missing = Error::NullReference(Collaborator::HwInterface);

        assert!(strategy.is_detached());
        assert_eq!(strategy.initialize(&ScalabilityOption::default()), Err(hw_missing));
        assert_eq!(strategy.verify_cmd_buffer(CommandSize::ZERO), Err(hw_missing));
        assert_eq!(strategy.get_cmd_buffer().unwrap_err(), hw_missing);
        assert_eq!(strategy.submit_cmd_buffer(), Err(hw_missing));
        strategy.discard_cmd_buffer();

        assert!(strategy.option().is_none());
        assert!(!strategy.is_initialized());
        assert!(strategy.mi_interface().is_none());
        assert_eq!(ctx.switch_count(), 0);
    }

    #[test]
    fn test_initialize_requires_os() {
        let hw = HwInterface::new(None, Some(Arc::new(SoftMi::new())));
        let ctx = context();
        let mut strategy = SinglePipeScalability::new(Some(&hw), ctx.clone(), ScalabilityComponent::Decode);

        assert_eq!(
            strategy.initialize(&ScalabilityOption::default()),
            Err(Error::NullReference(Collaborator::OsInterface))
        );
        assert!(strategy.option().is_none());
        assert!(!strategy.is_initialized());
        assert_eq!(ctx.gpu_context(), GpuContext::Render);
    }

    #[test]
    fn test_initialize_tags_component_and_engine() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let ctx = context();
        let mut strategy = SinglePipeScalability::new(Some(&hw), ctx.clone(), ScalabilityComponent::Encode);

        strategy.initialize(&ScalabilityOption::default()).unwrap();
        assert!(strategy.is_initialized());
        assert_eq!(strategy.pipe_count(), 1);
        assert_eq!(hw.os_interface().unwrap().component(), Some(Component::Encode));
        assert_eq!(ctx.gpu_context(), GpuContext::Video);
    }

    #[test]
    fn test_reinitialize_replaces_option() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let mut strategy = SinglePipeScalability::new(Some(&hw), context(), ScalabilityComponent::Decode);

        let first = ScalabilityOption::default();
        let second = ScalabilityOption {
            engine: EnginePolicy::Fixed(GpuContext::Render),
            ..ScalabilityOption::default()
        };
        strategy.initialize(&first).unwrap();
        strategy.initialize(&second).unwrap();

        assert_eq!(strategy.option(), Some(&second));
        assert!(strategy.is_scalability_mode_matched(&second));
        assert!(!strategy.is_scalability_mode_matched(&first));
    }

    #[test]
    fn test_reinitialize_holds_one_option() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let mut strategy = SinglePipeScalability::new(Some(&hw), context(), ScalabilityComponent::Decode);
        assert!(!strategy.option.is_occupied());

        let options = [
            ScalabilityOption::default(),
            ScalabilityOption {
                engine: EnginePolicy::Fixed(GpuContext::VideoEnhance),
                ..ScalabilityOption::default()
            },
            ScalabilityOption {
                num_pipes: 2,
                ..ScalabilityOption::default()
            },
            ScalabilityOption::default(),
        ];
        for option in &options {
            let _ = strategy.initialize(option);
            assert!(strategy.option.is_occupied());
            assert_eq!(strategy.option(), Some(option));
        }
        assert!(strategy.is_initialized());

        assert!(strategy.option.take().is_some());
        assert!(!strategy.option.is_occupied());
    }

    #[test]
    fn test_multi_pipe_not_supported() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let mut strategy = SinglePipeScalability::new(Some(&hw), context(), ScalabilityComponent::Decode);
        let option = ScalabilityOption {
            num_pipes: 2,
            ..ScalabilityOption::default()
        };

        assert_eq!(strategy.initialize(&option), Err(Error::NotSupported));
        assert!(!strategy.is_initialized());
        assert_eq!(strategy.get_cmd_buffer().unwrap_err(), Error::InvalidState);
    }

    #[test]
    fn test_factory_rejects_missing_inputs() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let ctx = context();

        assert_eq!(
            create_single_pipe(None, Some(&ctx), ScalabilityComponent::Decode),
            Err(Error::NullReference(Collaborator::HwInterface))
        );
        assert_eq!(
            create_single_pipe(Some(&hw), None, ScalabilityComponent::Decode),
            Err(Error::NullReference(Collaborator::MediaContext))
        );
        assert!(!hw.has_single_pipe());
    }

    #[test]
    fn test_factory_replaces_strategy() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let ctx = context();

        create_single_pipe(Some(&hw), Some(&ctx), ScalabilityComponent::Decode).unwrap();
        create_single_pipe(Some(&hw), Some(&ctx), ScalabilityComponent::Vp).unwrap();

        assert_eq!(hw.with_single_pipe(|s| s.component()), Ok(ScalabilityComponent::Vp));
        assert_eq!(hw.with_single_pipe(|s| s.is_initialized()), Ok(false));
    }

    #[test]
    fn test_submit_through_strategy() {
        let hw = HwInterface::with_defaults(OsConfig::default());
        let mut strategy = SinglePipeScalability::new(Some(&hw), context(), ScalabilityComponent::Decode);
        strategy.initialize(&ScalabilityOption::default()).unwrap();

        strategy.verify_cmd_buffer(CommandSize::ZERO).unwrap();
        let cmd = strategy.get_cmd_buffer().unwrap();
        strategy.return_cmd_buffer(cmd).unwrap();
        strategy.submit_cmd_buffer().unwrap();

        assert_eq!(hw.os_interface().unwrap().pending_count(), 1);
    }
}
