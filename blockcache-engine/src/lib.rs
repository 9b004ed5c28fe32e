pub mod allocator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod promotion;
pub mod request;

// Re-export commonly used types
pub use allocator::{ALLOCATOR_NAME_MAX, Allocator, ItemHeader, PoolItem};
pub use config::{CacheConfig, EngineConfig, LoggingConfig, NhitConfig, PromotionConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, TRACE_DEPTH, TracingSink, crc32, stack_trace};
pub use error::{CacheError, ErrorKind, IntegrityWarning, Result};
pub use promotion::{
    NhitParam, OccurrenceEntry, OccurrenceKey, OccurrenceTable, PromotionPolicy,
    PromotionPolicyType, PromotionStats, Touch,
};
pub use request::Request;
