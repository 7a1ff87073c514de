//! Plan fingerprints.
//!
//! A fingerprint is a SHA-256 over the serialized resolved plan. Two runs
//! producing the same fingerprint for a node will issue the same actions.

use sha2::{Digest, Sha256};

use crate::error::{ClusterError, Result};
use crate::roles::ResolvedPlan;

/// Length of the abbreviated fingerprint shown in tables.
const SHORT_LEN: usize = 12;

/// Hasher for resolved plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanHasher;

impl PlanHasher {
    /// Creates a new plan hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a resolved plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be serialized.
    pub fn hash_plan(&self, plan: &ResolvedPlan) -> Result<String> {
        let bytes = serde_json::to_vec(plan)
            .map_err(|e| ClusterError::internal(format!("Cannot serialize plan: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Returns the abbreviated form of a fingerprint.
    #[must_use]
    pub fn short(fingerprint: &str) -> &str {
        fingerprint.get(..SHORT_LEN).unwrap_or(fingerprint)
    }
}
