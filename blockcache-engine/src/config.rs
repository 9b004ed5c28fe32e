use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CacheError, Result};
use crate::promotion::PromotionPolicyType;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub promotion: PromotionConfig,
    pub logging: LoggingConfig,
}

/// Geometry of the cache device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of cache lines on the cache device
    pub cache_lines: u64,
    /// Cache line size in bytes (power of two)
    pub line_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub policy: PromotionPolicyType,
    pub nhit: NhitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NhitConfig {
    /// Misses on a line required before it is promoted
    pub insertion_threshold: u64,
    /// Occurrence table capacity; defaults to the number of cache lines
    pub table_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_lines: 262_144,
            line_size: 4096,
        }
    }
}

impl Default for NhitConfig {
    fn default() -> Self {
        Self {
            insertion_threshold: 3,
            table_capacity: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value domains that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.cache.cache_lines == 0 {
            return Err(CacheError::InvalidConfig(
                "cache.cache_lines must be at least 1".to_string(),
            ));
        }
        if !self.cache.line_size.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "cache.line_size must be a non-zero power of two, got {}",
                self.cache.line_size
            )));
        }
        if self.promotion.nhit.insertion_threshold == 0 {
            return Err(CacheError::InvalidConfig(
                "promotion.nhit.insertion_threshold must be at least 1".to_string(),
            ));
        }
        if self.promotion.nhit.table_capacity == Some(0) {
            return Err(CacheError::InvalidConfig(
                "promotion.nhit.table_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Occurrence table size: explicit capacity or one slot per cache line
    pub fn occurrence_capacity(&self) -> usize {
        self.promotion
            .nhit
            .table_capacity
            .unwrap_or_else(|| usize::try_from(self.cache.cache_lines).unwrap_or(usize::MAX))
    }
}
