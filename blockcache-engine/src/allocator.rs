//! Named fixed-size object allocator
//!
//! Every allocator hands out zero-initialized items of one size and keeps an
//! atomic count of outstanding items. Tearing an allocator down while items
//! are still outstanding is reported through the [`DiagnosticSink`] as a leak
//! and never blocks or fails.
//!
//! # Layout
//! ```text
//! PoolItem
//!   ├─ ItemHeader { flags, cpu, pool }
//!   └─ payload: Box<[u8]>   (exactly item_size bytes)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{CacheError, IntegrityWarning, Result};

/// Allocator names must be strictly shorter than this many bytes
pub const ALLOCATOR_NAME_MAX: usize = 128;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Per-item bookkeeping kept next to the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    flags: u32,
    /// Worker/NUMA hint for local free-list routing; always 0 for now.
    cpu: u32,
    pool: u64,
}

impl ItemHeader {
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }
}

/// Item handed out by [`Allocator::new_item`].
///
/// The caller owns it exclusively until it is passed back to
/// [`Allocator::delete`]. Dropping it instead frees the memory but leaves the
/// allocator's live count raised, which is reported as a leak on teardown.
pub struct PoolItem {
    header: ItemHeader,
    payload: Box<[u8]>,
}

impl PoolItem {
    pub fn header(&self) -> &ItemHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.payload
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.payload
    }
}

impl fmt::Debug for PoolItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolItem")
            .field("header", &self.header)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Named pool of fixed-size items
pub struct Allocator {
    id: u64,
    name: String,
    item_size: usize,
    live: AtomicUsize,
    sink: Arc<dyn DiagnosticSink>,
    destroyed: bool,
}

impl Allocator {
    /// Create an allocator whose diagnostics go to `tracing`.
    ///
    /// `name` accepts anything `Display`, so callers can pass
    /// `format_args!("req_{}", core)` without building a `String` first.
    pub fn create(item_size: usize, name: impl fmt::Display) -> Result<Self> {
        Self::with_sink(item_size, name, Arc::new(TracingSink))
    }

    /// Create an allocator reporting to a caller-provided sink
    pub fn with_sink(
        item_size: usize,
        name: impl fmt::Display,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let formatted = name.to_string();
        if formatted.is_empty() {
            return Err(CacheError::InvalidAllocatorName);
        }
        if formatted.len() >= ALLOCATOR_NAME_MAX {
            return Err(CacheError::AllocatorNameTooLong {
                len: formatted.len(),
                max: ALLOCATOR_NAME_MAX,
            });
        }

        let mut name = String::new();
        name.try_reserve_exact(formatted.len()).map_err(|e| {
            CacheError::OutOfMemory(format!("allocator '{}' metadata: {}", formatted, e))
        })?;
        name.push_str(&formatted);

        debug!("Created allocator '{}' (item_size={})", name, item_size);

        Ok(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name,
            item_size,
            live: AtomicUsize::new(0),
            sink,
            destroyed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Usable payload bytes per item
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of items handed out and not yet deleted
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Allocate one zeroed item
    pub fn new_item(&self) -> Result<PoolItem> {
        let mut payload = Vec::new();
        payload.try_reserve_exact(self.item_size).map_err(|e| {
            CacheError::OutOfMemory(format!("allocator '{}' item: {}", self.name, e))
        })?;
        payload.resize(self.item_size, 0);

        self.live.fetch_add(1, Ordering::AcqRel);

        Ok(PoolItem {
            header: ItemHeader {
                flags: 0,
                cpu: 0,
                pool: self.id,
            },
            payload: payload.into_boxed_slice(),
        })
    }

    /// Return an item to the allocator.
    ///
    /// The item must come from `new_item` on this same allocator. Handing in
    /// an item from another allocator is a caller bug: it is caught by a debug
    /// assertion and otherwise skews both allocators' live counts.
    pub fn delete(&self, item: PoolItem) {
        debug_assert_eq!(
            item.header.pool, self.id,
            "item returned to allocator '{}' it was not allocated from",
            self.name
        );
        self.live.fetch_sub(1, Ordering::AcqRel);
        drop(item);
    }

    /// Tear the allocator down.
    ///
    /// Returns the leak report when items are still outstanding; the report
    /// has already been emitted to the sink exactly once.
    pub fn destroy(mut self) -> Option<IntegrityWarning> {
        self.destroyed = true;
        self.check_leaks()
    }

    fn check_leaks(&self) -> Option<IntegrityWarning> {
        let outstanding = self.live_count();
        if outstanding == 0 {
            debug!("Destroyed allocator '{}'", self.name);
            return None;
        }

        let warning = IntegrityWarning {
            allocator: self.name.clone(),
            outstanding,
        };
        self.sink.emit(Diagnostic::Leak(warning.clone()));
        Some(warning)
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        if !self.destroyed {
            self.check_leaks();
        }
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("name", &self.name)
            .field("item_size", &self.item_size)
            .field("live_count", &self.live_count())
            .finish()
    }
}
