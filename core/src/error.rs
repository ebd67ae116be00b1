//! # VCP Error Handling
//!
//! Error types for the video codec pipeline.
//!
//! Errors fall into two families:
//! - Configuration errors: a required collaborator is absent. These are
//!   always fatal to the operation in progress and never retried.
//! - Operational errors: capacity, state and support failures raised while
//!   building or submitting a frame.

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// VCP Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// VCP unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A required collaborator is absent
    NullReference(Collaborator),
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation called in the wrong lifecycle state
    InvalidState,
    /// Key already registered
    AlreadyExists,
    /// Operation not supported by this strategy or hardware
    NotSupported,

    // =========================================================================
    // Memory Errors
    // =========================================================================
    /// Out of GPU-visible memory
    OutOfMemory,
    /// Access outside a resource's bounds
    BufferOverflow,
    /// Address not aligned for the requested write
    MisalignedAddress,

    // =========================================================================
    // Command Submission Errors
    // =========================================================================
    /// Command buffer has no room for the command
    CommandBufferFull,
    /// Patch list has no room for the relocation
    PatchListFull,
    /// Command buffer already handed out
    CommandBufferInUse,
    /// Too many frames outstanding
    Busy,
    /// Submission to the engine failed
    SubmissionFailed,
}

impl Error {
    /// Check if this is a configuration error (absent collaborator)
    pub const fn is_null_reference(&self) -> bool {
        matches!(self, Self::NullReference(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Configuration
            Self::NullReference(c) => write!(f, "null reference: {} is absent", c),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::NotSupported => write!(f, "operation not supported"),

            // Memory
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::BufferOverflow => write!(f, "buffer overflow"),
            Self::MisalignedAddress => write!(f, "misaligned address"),

            // Command
            Self::CommandBufferFull => write!(f, "command buffer full"),
            Self::PatchListFull => write!(f, "patch list full"),
            Self::CommandBufferInUse => write!(f, "command buffer in use"),
            Self::Busy => write!(f, "too many frames outstanding"),
            Self::SubmissionFailed => write!(f, "submission failed"),
        }
    }
}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// Collaborators whose absence is reported as [`Error::NullReference`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    /// Hardware interface
    HwInterface,
    /// OS abstraction
    OsInterface,
    /// MI (memory interface) command emitter
    MiInterface,
    /// Media (GPU) context
    MediaContext,
    /// Feature registry
    FeatureManager,
    /// A specific feature in the registry
    Feature,
    /// Status report
    StatusReport,
    /// Scalability strategy
    Scalability,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HwInterface => "hardware interface",
            Self::OsInterface => "OS interface",
            Self::MiInterface => "MI interface",
            Self::MediaContext => "media context",
            Self::FeatureManager => "feature manager",
            Self::Feature => "feature",
            Self::StatusReport => "status report",
            Self::Scalability => "scalability",
        };
        f.write_str(name)
    }
}

impl From<Collaborator> for Error {
    fn from(c: Collaborator) -> Self {
        Error::NullReference(c)
    }
}

/// Unwrap an optional collaborator or fail with [`Error::NullReference`]
#[inline]
pub fn require<T>(value: Option<T>, who: Collaborator) -> Result<T> {
    match value {
        Some(v) => Ok(v),
        None => {
            log::warn!("required {} is absent", who);
            Err(Error::NullReference(who))
        },
    }
}
