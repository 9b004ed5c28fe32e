use crate::error::{CacheError, Result};
use crate::request::Request;

use super::PromotionPolicyType;

/// Promote every miss. Has no parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPolicy;

impl AlwaysPolicy {
    pub fn should_promote(&self, _request: &Request) -> bool {
        true
    }

    pub fn set_param(&self, param_id: u8, _value: i64) -> Result<()> {
        Err(CacheError::UnknownParameter {
            policy: PromotionPolicyType::Always,
            id: param_id,
        })
    }

    pub fn get_param(&self, param_id: u8) -> Result<i64> {
        Err(CacheError::UnknownParameter {
            policy: PromotionPolicyType::Always,
            id: param_id,
        })
    }
}
