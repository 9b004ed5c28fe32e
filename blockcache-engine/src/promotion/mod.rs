//! Promotion (cache admission) policies
//!
//! Decides, once per cache miss, whether the missed data is worth copying
//! into the cache device:
//! - Always: every miss is promoted
//! - NHit: a line is promoted on its N-th miss
//!
//! One [`PromotionPolicy`] exists per cache. The active policy is chosen at
//! init and can be switched at runtime with [`PromotionPolicy::set_policy`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{IntegrityWarning, Result};
use crate::request::Request;

pub mod always;
pub mod nhit;
pub mod occurrence;

pub use always::AlwaysPolicy;
pub use nhit::{NhitParam, NhitPolicy};
pub use occurrence::{OccurrenceEntry, OccurrenceKey, OccurrenceTable, Touch};

/// Available promotion policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPolicyType {
    /// Promote on every miss
    #[default]
    Always,
    /// Promote after N misses on the same line
    Nhit,
}

impl fmt::Display for PromotionPolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Nhit => f.write_str("nhit"),
        }
    }
}

enum ActivePolicy {
    Always(AlwaysPolicy),
    Nhit(NhitPolicy),
}

impl ActivePolicy {
    fn init(
        kind: PromotionPolicyType,
        config: &EngineConfig,
        sink: &Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        match kind {
            PromotionPolicyType::Always => Ok(Self::Always(AlwaysPolicy)),
            PromotionPolicyType::Nhit => Ok(Self::Nhit(NhitPolicy::init(config, sink.clone())?)),
        }
    }

    fn kind(&self) -> PromotionPolicyType {
        match self {
            Self::Always(_) => PromotionPolicyType::Always,
            Self::Nhit(_) => PromotionPolicyType::Nhit,
        }
    }

    fn deinit(self) -> Option<IntegrityWarning> {
        match self {
            Self::Always(_) => None,
            Self::Nhit(nhit) => nhit.deinit(),
        }
    }
}

/// Point-in-time promotion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionStats {
    /// `should_promote` calls
    pub decisions: u64,
    pub promoted: u64,
    pub deferred: u64,
    /// Purges that removed pending state
    pub purged: u64,
    /// Occurrence entries evicted for space by the active table
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    decisions: AtomicU64,
    promoted: AtomicU64,
    deferred: AtomicU64,
    purged: AtomicU64,
}

/// Per-cache promotion policy
pub struct PromotionPolicy {
    active: ActivePolicy,
    config: EngineConfig,
    sink: Arc<dyn DiagnosticSink>,
    counters: Counters,
}

impl PromotionPolicy {
    /// Create the policy selected by `config.promotion.policy`
    pub fn init(config: &EngineConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create the policy, routing diagnostics to `sink`
    pub fn with_sink(config: &EngineConfig, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        config.validate()?;
        let active = ActivePolicy::init(config.promotion.policy, config, &sink)?;
        info!("Promotion policy '{}' active", config.promotion.policy);

        Ok(Self {
            active,
            config: config.clone(),
            sink,
            counters: Counters::default(),
        })
    }

    /// Release all policy state
    pub fn deinit(self) -> Option<IntegrityWarning> {
        let kind = self.active.kind();
        let report = self.active.deinit();
        if let Some(warning) = &report {
            warn!("Promotion policy '{}' deinit: {}", kind, warning);
        }
        report
    }

    pub fn policy_type(&self) -> PromotionPolicyType {
        self.active.kind()
    }

    /// Switch to another policy.
    ///
    /// The new policy is built before the old one is released, so on failure
    /// the current policy stays in effect. Parameters set on the outgoing
    /// policy are kept and reused if it is selected again.
    pub fn set_policy(&mut self, kind: PromotionPolicyType) -> Result<()> {
        if kind == self.active.kind() {
            return Ok(());
        }

        if let ActivePolicy::Nhit(nhit) = &self.active {
            self.config.promotion.nhit.insertion_threshold = nhit.insertion_threshold();
        }

        let next = ActivePolicy::init(kind, &self.config, &self.sink)?;
        let previous = std::mem::replace(&mut self.active, next);
        info!("Promotion policy switched from '{}' to '{}'", previous.kind(), kind);

        self.config.promotion.policy = kind;
        if let Some(warning) = previous.deinit() {
            warn!("Previous promotion policy left state behind: {}", warning);
        }
        Ok(())
    }

    /// Set a parameter of the active policy; the old value stays on error
    pub fn set_param(&self, param_id: u8, value: i64) -> Result<()> {
        match &self.active {
            ActivePolicy::Always(always) => always.set_param(param_id, value),
            ActivePolicy::Nhit(nhit) => nhit.set_param(param_id, value),
        }
    }

    pub fn get_param(&self, param_id: u8) -> Result<i64> {
        match &self.active {
            ActivePolicy::Always(always) => always.get_param(param_id),
            ActivePolicy::Nhit(nhit) => nhit.get_param(param_id),
        }
    }

    /// Admission decision for one cache miss
    pub fn should_promote(&self, request: &Request) -> bool {
        let promote = match &self.active {
            ActivePolicy::Always(always) => always.should_promote(request),
            ActivePolicy::Nhit(nhit) => nhit.should_promote(request),
        };

        self.counters.decisions.fetch_add(1, Ordering::Relaxed);
        if promote {
            self.counters.promoted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.deferred.fetch_add(1, Ordering::Relaxed);
        }
        promote
    }

    /// Drop tracking state for the request's range (invalidation/flush hook)
    pub fn req_purge(&self, request: &Request) {
        let removed = match &self.active {
            ActivePolicy::Always(_) => false,
            ActivePolicy::Nhit(nhit) => nhit.req_purge(request),
        };
        if removed {
            self.counters.purged.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> PromotionStats {
        let evictions = match &self.active {
            ActivePolicy::Always(_) => 0,
            ActivePolicy::Nhit(nhit) => nhit.table().evictions(),
        };

        PromotionStats {
            decisions: self.counters.decisions.load(Ordering::Relaxed),
            promoted: self.counters.promoted.load(Ordering::Relaxed),
            deferred: self.counters.deferred.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
            evictions,
        }
    }

    /// Occurrence table of the active policy, if it keeps one
    pub fn occurrence_table(&self) -> Option<&OccurrenceTable> {
        match &self.active {
            ActivePolicy::Always(_) => None,
            ActivePolicy::Nhit(nhit) => Some(nhit.table()),
        }
    }
}
