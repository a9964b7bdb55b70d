//! Feed snapshot types.
//!
//! - [`OddsFeedSnapshot`] - Full odds state of one condition as posted by the feed
//! - [`OutcomeQuote`] - Posted and clear price of one outcome
//! - [`ConditionStatus`] - Trading status of a condition
//! - [`LiveStatistics`] - Free-form live match statistics for one game
//!
//! Snapshots are immutable. A newer message for the same condition replaces
//! the previous snapshot wholesale; fields are never merged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::PricingError;
use super::id::{ConditionId, GameId, OutcomeId};

/// Posted quote for a single outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeQuote {
    pub outcome_id: OutcomeId,
    /// Displayed, margin-applied decimal odds.
    pub odds: f64,
    /// Zero-margin fair odds.
    pub clear_odds: f64,
    /// Largest stake the house accepts at the posted price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stake: Option<Decimal>,
}

impl OutcomeQuote {
    pub fn new(outcome_id: impl Into<OutcomeId>, odds: f64, clear_odds: f64) -> Self {
        Self {
            outcome_id: outcome_id.into(),
            odds,
            clear_odds,
            max_stake: None,
        }
    }

    #[must_use]
    pub fn with_max_stake(mut self, max_stake: Decimal) -> Self {
        self.max_stake = Some(max_stake);
        self
    }
}

/// Odds state of one condition.
///
/// Construct with [`OddsFeedSnapshot::try_new`], which enforces:
/// - at least one outcome
/// - `margin` in `[0, 1)`
/// - `winning_outcomes_count >= 1`
/// - `clear_odds > 1` and `odds >= 1` for every outcome
/// - non-negative reinforcement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsFeedSnapshot {
    condition_id: ConditionId,
    margin: f64,
    reinforcement: Decimal,
    winning_outcomes_count: u32,
    outcomes: Vec<OutcomeQuote>,
}

impl OddsFeedSnapshot {
    /// Build a validated snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidInput`] when an invariant above is violated.
    pub fn try_new(
        condition_id: impl Into<ConditionId>,
        margin: f64,
        reinforcement: Decimal,
        winning_outcomes_count: u32,
        outcomes: Vec<OutcomeQuote>,
    ) -> Result<Self, PricingError> {
        if outcomes.is_empty() {
            return Err(PricingError::invalid("snapshot has no outcomes"));
        }
        if !margin.is_finite() || !(0.0..1.0).contains(&margin) {
            return Err(PricingError::invalid(format!(
                "margin {margin} outside [0, 1)"
            )));
        }
        if winning_outcomes_count == 0 {
            return Err(PricingError::invalid("winning outcomes count must be >= 1"));
        }
        if reinforcement.is_sign_negative() {
            return Err(PricingError::invalid(format!(
                "negative reinforcement {reinforcement}"
            )));
        }
        for quote in &outcomes {
            if !quote.clear_odds.is_finite() || quote.clear_odds <= 1.0 {
                return Err(PricingError::invalid(format!(
                    "clear odds {} for outcome {} must be > 1",
                    quote.clear_odds, quote.outcome_id
                )));
            }
            if !quote.odds.is_finite() || quote.odds < 1.0 {
                return Err(PricingError::invalid(format!(
                    "odds {} for outcome {} must be >= 1",
                    quote.odds, quote.outcome_id
                )));
            }
        }

        Ok(Self {
            condition_id: condition_id.into(),
            margin,
            reinforcement,
            winning_outcomes_count,
            outcomes,
        })
    }

    #[must_use]
    pub const fn condition_id(&self) -> &ConditionId {
        &self.condition_id
    }

    #[must_use]
    pub const fn margin(&self) -> f64 {
        self.margin
    }

    #[must_use]
    pub const fn reinforcement(&self) -> Decimal {
        self.reinforcement
    }

    #[must_use]
    pub const fn winning_outcomes_count(&self) -> u32 {
        self.winning_outcomes_count
    }

    /// Quotes in feed order.
    #[must_use]
    pub fn outcomes(&self) -> &[OutcomeQuote] {
        &self.outcomes
    }

    /// Quote for a single outcome.
    #[must_use]
    pub fn quote(&self, outcome_id: &OutcomeId) -> Option<&OutcomeQuote> {
        self.outcomes.iter().find(|q| &q.outcome_id == outcome_id)
    }
}

/// Trading status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    Active,
    Stopped,
    Paused,
    Resolved,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl ConditionStatus {
    /// Whether bets can currently be accepted.
    #[must_use]
    pub const fn accepts_bets(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Live match statistics for one game, passed through as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveStatistics {
    pub game_id: GameId,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LiveStatistics {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}
