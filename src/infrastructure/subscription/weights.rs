//! Reference counts of upstream interest per identifier.

use std::collections::HashMap;

/// Identifiers whose weight crossed zero during one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    /// Went from zero to positive.
    pub subscribe: Vec<String>,
    /// Went from positive to zero.
    pub unsubscribe: Vec<String>,
}

impl SubscriptionDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Per-identifier interest counts.
///
/// Weights never go below zero, and an identifier at zero is removed rather
/// than kept around.
#[derive(Debug, Default)]
pub struct WeightTable {
    weights: HashMap<String, u32>,
}

impl WeightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply signed deltas in order and report threshold crossings.
    pub fn apply(&mut self, deltas: impl IntoIterator<Item = (String, i64)>) -> SubscriptionDelta {
        let mut crossed = SubscriptionDelta::default();

        for (id, delta) in deltas {
            if delta == 0 {
                continue;
            }
            let current = self.weight(&id);
            let next = (i64::from(current) + delta).max(0);

            if next == 0 {
                if current > 0 {
                    self.weights.remove(&id);
                    crossed.unsubscribe.push(id);
                }
                continue;
            }

            let next = u32::try_from(next).unwrap_or(u32::MAX);
            if current == 0 {
                crossed.subscribe.push(id.clone());
            }
            self.weights.insert(id, next);
        }

        crossed
    }

    #[must_use]
    pub fn weight(&self, id: &str) -> u32 {
        self.weights.get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn clear(&mut self) {
        self.weights.clear();
    }
}
