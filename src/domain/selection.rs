//! Betable outcome selection.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::id::{ConditionId, OutcomeId};

/// One betable outcome.
///
/// `core_address` tells live markets apart from prematch ones. Equality and
/// hashing only look at `(condition_id, outcome_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub condition_id: ConditionId,
    pub outcome_id: OutcomeId,
    pub core_address: String,
}

impl Selection {
    pub fn new(
        condition_id: impl Into<ConditionId>,
        outcome_id: impl Into<OutcomeId>,
        core_address: impl Into<String>,
    ) -> Self {
        Self {
            condition_id: condition_id.into(),
            outcome_id: outcome_id.into(),
            core_address: core_address.into(),
        }
    }

    /// True when this selection belongs to the live core.
    ///
    /// Addresses are compared case-insensitively since checksummed and
    /// lowercase hex forms both appear on the wire.
    #[must_use]
    pub fn is_live(&self, live_core_address: &str) -> bool {
        self.core_address.eq_ignore_ascii_case(live_core_address)
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.condition_id == other.condition_id && self.outcome_id == other.outcome_id
    }
}

impl Eq for Selection {}

impl Hash for Selection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.condition_id.hash(state);
        self.outcome_id.hash(state);
    }
}
