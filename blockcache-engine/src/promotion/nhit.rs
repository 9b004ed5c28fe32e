//! N-hit promotion policy
//!
//! A line is promoted on its N-th miss. Misses are counted per
//! [`OccurrenceKey`] in a bounded [`OccurrenceTable`]; reaching the
//! threshold retires the counter together with the promote decision, and a
//! purge drops the counter so reused address space starts from zero.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::{CacheError, IntegrityWarning, Result};
use crate::request::Request;

use super::PromotionPolicyType;
use super::occurrence::{OccurrenceKey, OccurrenceTable, Touch};

/// Tunable parameters, addressed by their numeric id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NhitParam {
    InsertionThreshold = 0,
}

impl NhitParam {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InsertionThreshold => "insertion_threshold",
        }
    }
}

impl TryFrom<u8> for NhitParam {
    type Error = CacheError;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::InsertionThreshold),
            _ => Err(CacheError::UnknownParameter {
                policy: PromotionPolicyType::Nhit,
                id,
            }),
        }
    }
}

pub struct NhitPolicy {
    table: OccurrenceTable,
    insertion_threshold: AtomicU64,
    line_size: u64,
}

impl NhitPolicy {
    /// Build the policy and its occurrence table from configuration
    pub fn init(config: &EngineConfig, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        config.validate()?;

        let capacity = config.occurrence_capacity();
        let table = OccurrenceTable::with_sink(capacity, sink)?;
        let threshold = config.promotion.nhit.insertion_threshold;

        info!(
            "Initialized nhit promotion (threshold={}, table_capacity={})",
            threshold, capacity
        );

        Ok(Self {
            table,
            insertion_threshold: AtomicU64::new(threshold),
            line_size: config.cache.line_size,
        })
    }

    /// Tear down the occurrence table
    pub fn deinit(self) -> Option<IntegrityWarning> {
        self.table.destroy()
    }

    pub fn insertion_threshold(&self) -> u64 {
        self.insertion_threshold.load(Ordering::Acquire)
    }

    pub fn table(&self) -> &OccurrenceTable {
        &self.table
    }

    pub fn set_param(&self, param_id: u8, value: i64) -> Result<()> {
        match NhitParam::try_from(param_id)? {
            NhitParam::InsertionThreshold => {
                let threshold = u64::try_from(value)
                    .ok()
                    .filter(|&t| t >= 1)
                    .ok_or(CacheError::InvalidParameter {
                        param: NhitParam::InsertionThreshold.name(),
                        value,
                    })?;
                self.insertion_threshold.store(threshold, Ordering::Release);
                info!("nhit insertion_threshold set to {}", threshold);
                Ok(())
            }
        }
    }

    pub fn get_param(&self, param_id: u8) -> Result<i64> {
        match NhitParam::try_from(param_id)? {
            NhitParam::InsertionThreshold => {
                Ok(i64::try_from(self.insertion_threshold()).unwrap_or(i64::MAX))
            }
        }
    }

    pub fn should_promote(&self, request: &Request) -> bool {
        let key = OccurrenceKey::for_request(request, self.line_size);
        match self.table.touch(key, self.insertion_threshold()) {
            Touch::Promote => {
                debug!("Promote core={} bucket={}", key.core_id, key.bucket);
                true
            }
            Touch::Defer { counter } => {
                debug!(
                    "Defer core={} bucket={} occurrences={}",
                    key.core_id, key.bucket, counter
                );
                false
            }
        }
    }

    /// Drop any pending count for the request's line
    pub fn req_purge(&self, request: &Request) -> bool {
        let key = OccurrenceKey::for_request(request, self.line_size);
        self.table.remove(&key)
    }
}
