use std::fmt;

use thiserror::Error;

use crate::promotion::PromotionPolicyType;

/// Main error type for blockcache engine operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid value {value} for parameter {param}")]
    InvalidParameter { param: &'static str, value: i64 },

    #[error("Unknown parameter id {id} for {policy} promotion policy")]
    UnknownParameter { policy: PromotionPolicyType, id: u8 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Allocator name must not be empty")]
    InvalidAllocatorName,

    #[error("Allocator name is {len} bytes, must be shorter than {max}")]
    AllocatorNameTooLong { len: usize, max: usize },

    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}

/// Error class, used by callers to decide how to surface a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid parameter id, out-of-domain value or bad configuration
    Configuration,
    /// Memory could not be obtained or an allocator could not be built
    Allocation,
}

impl CacheError {
    /// Get the error class for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter { .. } | Self::UnknownParameter { .. } | Self::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            Self::InvalidAllocatorName | Self::AllocatorNameTooLong { .. } | Self::OutOfMemory(_) => {
                ErrorKind::Allocation
            }
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_allocation(&self) -> bool {
        self.kind() == ErrorKind::Allocation
    }
}

/// Non-fatal report produced when an allocator is torn down with live objects.
///
/// Never returned as an `Err`: teardown always completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityWarning {
    pub allocator: String,
    pub outstanding: usize,
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cleanup problem: allocator '{}' destroyed with {} object(s) not deallocated",
            self.allocator, self.outstanding
        )
    }
}

/// Result type alias for blockcache engine operations
pub type Result<T> = std::result::Result<T, CacheError>;
