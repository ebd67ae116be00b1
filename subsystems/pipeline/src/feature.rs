//! # Feature Registry
//!
//! Optional per-frame capabilities keyed by [`FeatureId`]. Every feature is
//! a shared handle whose enable flag is atomic, so a packet holding a handle
//! sees caller updates without looking the feature up again.
//!
//! Packets that cache a handle also cache the registry generation it was
//! found under and look it up again once the generation moves.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;

use vcp_core::{Error, OsResource, Result};

// =============================================================================
// FEATURE IDS
// =============================================================================

/// Stable feature key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureId {
    /// Timestamp marker
    Marker,
    /// Down-sampled output surface
    DownSampling,
    /// Error concealment on corrupt input
    ErrorConcealment,
}

impl FeatureId {
    /// Feature name
    pub const fn name(self) -> &'static str {
        match self {
            FeatureId::Marker => "marker",
            FeatureId::DownSampling => "down-sampling",
            FeatureId::ErrorConcealment => "error-concealment",
        }
    }
}

bitflags::bitflags! {
    /// Features a pipeline registers at build time
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureSet: u8 {
        /// Register the marker feature
        const MARKER = 1 << 0;
        /// Register the down-sampling feature
        const DOWN_SAMPLING = 1 << 1;
        /// Register the error-concealment feature
        const ERROR_CONCEALMENT = 1 << 2;
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        FeatureSet::all()
    }
}

/// Per-frame caller configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameParams {
    /// Write a timestamp marker for this frame
    pub set_marker: bool,
    /// Produce the down-sampled surface
    pub down_sampling: bool,
    /// Conceal errors instead of failing the frame
    pub error_concealment: bool,
}

// =============================================================================
// FEATURES
// =============================================================================

/// Timestamp marker
///
/// Owns the GPU-visible buffer the marker packet writes its timestamp to.
#[derive(Debug)]
pub struct MarkerFeature {
    enabled: AtomicBool,
    buffer: OsResource,
}

impl MarkerFeature {
    /// Create a disabled marker writing into `buffer`
    pub fn new(buffer: OsResource) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            buffer,
        }
    }

    /// Timestamp buffer
    pub fn buffer(&self) -> &OsResource {
        &self.buffer
    }

    /// Check if a marker is requested for the current frame
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Down-sampled output
#[derive(Debug, Default)]
pub struct DownSamplingFeature {
    enabled: AtomicBool,
}

impl DownSamplingFeature {
    /// Create a disabled feature
    pub fn new() -> Self {
        Self::default()
    }
}

/// Error concealment
#[derive(Debug, Default)]
pub struct ErrorConcealmentFeature {
    enabled: AtomicBool,
}

impl ErrorConcealmentFeature {
    /// Create a disabled feature
    pub fn new() -> Self {
        Self::default()
    }
}

/// A registered feature
#[derive(Debug, Clone)]
pub enum MediaFeature {
    /// Timestamp marker
    Marker(Arc<MarkerFeature>),
    /// Down-sampled output
    DownSampling(Arc<DownSamplingFeature>),
    /// Error concealment
    ErrorConcealment(Arc<ErrorConcealmentFeature>),
}

impl MediaFeature {
    /// Registry key
    pub fn id(&self) -> FeatureId {
        match self {
            MediaFeature::Marker(_) => FeatureId::Marker,
            MediaFeature::DownSampling(_) => FeatureId::DownSampling,
            MediaFeature::ErrorConcealment(_) => FeatureId::ErrorConcealment,
        }
    }

    fn flag(&self) -> &AtomicBool {
        match self {
            MediaFeature::Marker(f) => &f.enabled,
            MediaFeature::DownSampling(f) => &f.enabled,
            MediaFeature::ErrorConcealment(f) => &f.enabled,
        }
    }

    /// Check if the feature is enabled
    pub fn is_enabled(&self) -> bool {
        self.flag().load(Ordering::Acquire)
    }

    /// Enable or disable the feature
    pub fn set_enabled(&self, enabled: bool) {
        self.flag().store(enabled, Ordering::Release);
    }

    /// Apply the caller's per-frame configuration
    pub fn update(&self, params: &FrameParams) {
        let enabled = match self {
            MediaFeature::Marker(_) => params.set_marker,
            MediaFeature::DownSampling(_) => params.down_sampling,
            MediaFeature::ErrorConcealment(_) => params.error_concealment,
        };
        self.set_enabled(enabled);
    }
}

// =============================================================================
// FEATURE MANAGER
// =============================================================================

/// Feature registry
#[derive(Default)]
pub struct FeatureManager {
    features: HashMap<FeatureId, MediaFeature>,
    generation: u64,
}

impl FeatureManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `feature`; rejects a duplicate key
    pub fn register(&mut self, feature: MediaFeature) -> Result<()> {
        let id = feature.id();
        if self.features.contains_key(&id) {
            return Err(Error::AlreadyExists);
        }
        self.features.insert(id, feature);
        self.generation += 1;
        log::debug!("features: registered {} (gen {})", id.name(), self.generation);
        Ok(())
    }

    /// Remove a feature
    pub fn unregister(&mut self, id: FeatureId) -> Option<MediaFeature> {
        let removed = self.features.remove(&id);
        if removed.is_some() {
            self.generation += 1;
            log::debug!("features: unregistered {} (gen {})", id.name(), self.generation);
        }
        removed
    }

    /// Look up a feature
    pub fn get(&self, id: FeatureId) -> Option<&MediaFeature> {
        self.features.get(&id)
    }

    /// Registry generation; moves on every register/unregister
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of registered features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Marker feature
    pub fn marker(&self) -> Option<&Arc<MarkerFeature>> {
        match self.get(FeatureId::Marker)? {
            MediaFeature::Marker(f) => Some(f),
            _ => None,
        }
    }

    /// Down-sampling feature
    pub fn down_sampling(&self) -> Option<&Arc<DownSamplingFeature>> {
        match self.get(FeatureId::DownSampling)? {
            MediaFeature::DownSampling(f) => Some(f),
            _ => None,
        }
    }

    /// Forward per-frame configuration to every registered feature
    ///
    /// Requesting a feature that is not registered is `NotSupported`; no
    /// feature is touched in that case.
    pub fn update(&self, params: &FrameParams) -> Result<()> {
        let requested = [
            (FeatureId::Marker, params.set_marker),
            (FeatureId::DownSampling, params.down_sampling),
            (FeatureId::ErrorConcealment, params.error_concealment),
        ];
        if let Some((id, _)) = requested
            .iter()
            .find(|(id, on)| *on && !self.features.contains_key(id))
        {
            log::warn!("features: {} requested but not registered", id.name());
            return Err(Error::NotSupported);
        }

        for feature in self.features.values() {
            feature.update(params);
        }
        Ok(())
    }
}

impl fmt::Debug for FeatureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureManager")
            .field("features", &self.features.keys().collect::<alloc::vec::Vec<_>>())
            .field("generation", &self.generation)
            .finish()
    }
}

static_assertions::assert_impl_all!(FeatureManager: Send, Sync);
