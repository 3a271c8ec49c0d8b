//! Error types for twintrap

use thiserror::Error;

/// Result type alias for attack operations
pub type Result<T> = std::result::Result<T, AttackError>;

/// Main error type for the attack core
#[derive(Error, Debug)]
pub enum AttackError {
    /// A required external tool is not installed
    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    /// Another process would interfere with the attack
    #[error("Conflicting process: {0}")]
    ConflictingProcess(String),

    /// A setup stage failed; the attack cannot continue
    #[error("Setup failed during {stage}: {reason}")]
    SetupFailure { stage: String, reason: String },

    /// Credential validation did not produce a verdict in time
    #[error("Validation timed out after {0:.1}s")]
    ValidationTimeout(f64),

    /// Validation suppressed while the anti-detection lockout is active
    #[error("Validation locked out for {remaining_secs}s to avoid detection")]
    ValidationLockedOut { remaining_secs: u64 },

    /// The submitted credential failed authentication
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// One or more cleanup steps failed; the rest still ran
    #[error("Cleanup completed with {} error(s)", .errors.len())]
    CleanupPartialFailure { errors: Vec<String> },

    /// Attack cancelled by an external stop signal
    #[error("Attack cancelled")]
    Cancelled,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by an external tool or collaborator
    #[error("External error: {0}")]
    External(String),
}

impl AttackError {
    pub fn setup(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SetupFailure {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }

    /// Check if this is the cancellation sentinel
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error came from credential validation and should be
    /// recorded without ending the attack loop
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationTimeout(_) | Self::ValidationLockedOut { .. } | Self::InvalidCredential(_)
        )
    }
}
