//! Live odds for a single selection.
//!
//! The feed's clear odds imply how reinforcement is spread across outcomes.
//! A candidate stake shifts that spread towards the priced outcome, the
//! solver re-applies the condition margin, and the result is capped at the
//! posted odds: the house never quotes better than its posted price.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::solver::LiveOddsSolver;
use crate::domain::error::PricingError;
use crate::domain::id::OutcomeId;
use crate::domain::selection::Selection;
use crate::domain::snapshot::OddsFeedSnapshot;

/// Per-outcome funds backing a condition, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct FundDistribution {
    funds: Vec<(OutcomeId, f64)>,
}

impl FundDistribution {
    /// `fund[o] = reinforcement / clear_odds[o]`, with `stake` added to `priced`.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidInput`] for a negative stake and
    /// [`PricingError::UnknownOutcome`] when `priced` is not quoted.
    pub fn from_snapshot(
        snapshot: &OddsFeedSnapshot,
        priced: &OutcomeId,
        stake: Decimal,
    ) -> Result<Self, PricingError> {
        if stake.is_sign_negative() && !stake.is_zero() {
            return Err(PricingError::invalid(format!("negative stake {stake}")));
        }
        if snapshot.quote(priced).is_none() {
            return Err(PricingError::UnknownOutcome {
                condition_id: snapshot.condition_id().to_string(),
                outcome_id: priced.to_string(),
            });
        }

        let reinforcement = to_f64(snapshot.reinforcement(), "reinforcement")?;
        let stake = to_f64(stake, "stake")?;

        let funds = snapshot
            .outcomes()
            .iter()
            .map(|quote| {
                let mut fund = reinforcement / quote.clear_odds;
                if &quote.outcome_id == priced {
                    fund += stake;
                }
                (quote.outcome_id.clone(), fund)
            })
            .collect();

        Ok(Self { funds })
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.funds.iter().map(|(_, f)| f).sum()
    }

    #[must_use]
    pub fn fund(&self, outcome_id: &OutcomeId) -> Option<f64> {
        self.funds
            .iter()
            .find(|(id, _)| id == outcome_id)
            .map(|(_, f)| *f)
    }

    /// Normalise funds into shares summing to 1.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidInput`] when no funds back the condition.
    pub fn probabilities(&self) -> Result<ProbabilityDistribution, PricingError> {
        let total = self.total();
        if !total.is_finite() || total <= 0.0 {
            return Err(PricingError::invalid("condition has no funds"));
        }
        Ok(ProbabilityDistribution {
            shares: self
                .funds
                .iter()
                .map(|(id, f)| (id.clone(), f / total))
                .collect(),
        })
    }
}

/// Fund shares per outcome, summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityDistribution {
    shares: Vec<(OutcomeId, f64)>,
}

impl ProbabilityDistribution {
    #[must_use]
    pub fn get(&self, outcome_id: &OutcomeId) -> Option<f64> {
        self.shares
            .iter()
            .find(|(id, _)| id == outcome_id)
            .map(|(_, p)| *p)
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.shares.iter().map(|(_, p)| p).sum()
    }

    /// Win probabilities for a market paying `winning_outcomes_count` outcomes.
    ///
    /// Each share is scaled by the count, so with more than one winner a
    /// heavily backed outcome can reach 1 or more (for two winners, any share
    /// of at least 0.5). Such a distribution has no price: the solver rejects
    /// it as [`PricingError::InvalidInput`] and the outcome is unavailable
    /// until the funds rebalance.
    #[must_use]
    pub fn win_probabilities(&self, winning_outcomes_count: u32) -> Vec<f64> {
        let scale = f64::from(winning_outcomes_count);
        self.shares.iter().map(|(_, p)| p * scale).collect()
    }

    fn position(&self, outcome_id: &OutcomeId) -> Option<usize> {
        self.shares.iter().position(|(id, _)| id == outcome_id)
    }
}

/// Prices live selections from feed snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveOddsCalculator {
    solver: LiveOddsSolver,
}

impl LiveOddsCalculator {
    #[must_use]
    pub const fn new(solver: LiveOddsSolver) -> Self {
        Self { solver }
    }

    /// Live odds for `selection` if `stake` were placed on it.
    ///
    /// Never exceeds the snapshot's posted odds for the outcome.
    ///
    /// # Errors
    ///
    /// Any [`PricingError`]; callers should treat it as "odds unavailable".
    pub fn calc_live_odds(
        &self,
        selection: &Selection,
        stake: Decimal,
        snapshot: &OddsFeedSnapshot,
    ) -> Result<f64, PricingError> {
        if &selection.condition_id != snapshot.condition_id() {
            return Err(PricingError::invalid(format!(
                "selection condition {} does not match snapshot {}",
                selection.condition_id,
                snapshot.condition_id()
            )));
        }

        let posted = snapshot
            .quote(&selection.outcome_id)
            .map(|q| q.odds)
            .ok_or_else(|| PricingError::UnknownOutcome {
                condition_id: selection.condition_id.to_string(),
                outcome_id: selection.outcome_id.to_string(),
            })?;

        let funds = FundDistribution::from_snapshot(snapshot, &selection.outcome_id, stake)?;
        let distribution = funds.probabilities()?;
        let index = distribution
            .position(&selection.outcome_id)
            .ok_or_else(|| PricingError::invalid("priced outcome missing from distribution"))?;
        let win_probabilities = distribution.win_probabilities(snapshot.winning_outcomes_count());

        let solved = if snapshot.margin() == 0.0 {
            let probability = win_probabilities[index];
            if probability >= 1.0 {
                return Err(PricingError::invalid(format!(
                    "win probability {probability} of outcome {} leaves no price",
                    selection.outcome_id
                )));
            }
            1.0 / probability
        } else {
            let odds = self.solver.solve(
                &win_probabilities,
                snapshot.margin(),
                snapshot.winning_outcomes_count(),
            )?;
            odds[index]
        };

        let price = solved.min(posted);
        debug!(
            condition_id = %selection.condition_id,
            outcome_id = %selection.outcome_id,
            %stake,
            solved,
            posted,
            price,
            "Computed live odds"
        );
        Ok(price)
    }

    /// Odds for any selection: posted odds for prematch markets, live odds otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`calc_live_odds`](Self::calc_live_odds), plus
    /// [`PricingError::UnknownOutcome`] for prematch selections.
    pub fn quote(
        &self,
        selection: &Selection,
        stake: Decimal,
        snapshot: &OddsFeedSnapshot,
        live_core_address: &str,
    ) -> Result<f64, PricingError> {
        if selection.is_live(live_core_address) {
            return self.calc_live_odds(selection, stake, snapshot);
        }
        snapshot
            .quote(&selection.outcome_id)
            .map(|q| q.odds)
            .ok_or_else(|| PricingError::UnknownOutcome {
                condition_id: selection.condition_id.to_string(),
                outcome_id: selection.outcome_id.to_string(),
            })
    }
}

/// Lowest acceptable odds after slippage: `1 + (odds - 1) * (100 - slippage) / 100`.
///
/// Slippage is a percentage and is clamped to `[0, 100]`.
#[must_use]
pub fn calc_min_odds(total_odds: Decimal, slippage_percent: Decimal) -> Decimal {
    let slippage = slippage_percent.clamp(Decimal::ZERO, dec!(100));
    Decimal::ONE + (total_odds - Decimal::ONE) * (dec!(100) - slippage) / dec!(100)
}

fn to_f64(value: Decimal, field: &str) -> Result<f64, PricingError> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PricingError::invalid(format!("{field} {value} is not representable")))
}
