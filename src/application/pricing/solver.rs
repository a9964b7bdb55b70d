//! Fixed-point margin solver for live odds.
//!
//! Given win probabilities and a target margin, find per-outcome spreads
//! `s[o]` such that the odds `(1 - s[o]) / p[o]` carry exactly that margin:
//!
//! ```text
//! observed = 1 - winning_outcomes_count / sum(1 / odds[o])
//! ```
//!
//! Each iteration nudges every spread towards its ceiling `1 - p[o]` by a
//! sigmoid-damped fraction of the residual `margin - observed`, so spreads
//! grow monotonically and odds never drop below 1.

use tracing::trace;

use crate::domain::error::PricingError;

/// Iteration budget before giving up.
pub const MAX_ITERATIONS: usize = 10;

/// Relative tolerance on `margin / observed - 1`.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-4;

/// Residual change below which the iteration is considered stalled.
pub const STALL_EPSILON: f64 = 1e-12;

/// Tolerance on the probability sum.
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// Outcome of checking one iteration against the target margin.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Assessment {
    Converged,
    Infeasible,
    Continue { error: f64 },
}

fn assess(margin: f64, observed: f64, tolerance: f64) -> Assessment {
    if (margin / observed - 1.0).abs() < tolerance {
        Assessment::Converged
    } else if margin <= observed {
        Assessment::Infeasible
    } else {
        Assessment::Continue {
            error: margin - observed,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    x / (x + 1.0)
}

fn observed_spread(odds: &[f64], winning_outcomes_count: u32) -> f64 {
    let implied: f64 = odds.iter().map(|o| 1.0 / o).sum();
    1.0 - f64::from(winning_outcomes_count) / implied
}

/// Converts win probabilities into odds carrying a fixed margin.
#[derive(Debug, Clone, Copy)]
pub struct LiveOddsSolver {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for LiveOddsSolver {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            tolerance: CONVERGENCE_TOLERANCE,
        }
    }
}

impl LiveOddsSolver {
    #[must_use]
    pub const fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Solve for odds.
    ///
    /// `probabilities` are win probabilities, index-aligned with the outcomes,
    /// each in `(0, 1)` and summing to `winning_outcomes_count`. For
    /// single-winner markets that is an ordinary distribution summing to 1.
    ///
    /// # Errors
    ///
    /// - [`PricingError::InvalidInput`] for malformed probabilities or margin
    /// - [`PricingError::Infeasible`] when the observed spread reaches the margin
    /// - [`PricingError::Stalled`] when the residual stops moving short of the target
    /// - [`PricingError::NotConverged`] when the iteration budget runs out
    pub fn solve(
        &self,
        probabilities: &[f64],
        margin: f64,
        winning_outcomes_count: u32,
    ) -> Result<Vec<f64>, PricingError> {
        validate(probabilities, margin, winning_outcomes_count)?;

        let mut spreads: Vec<f64> = probabilities.iter().map(|p| (1.0 - p) * margin).collect();
        let mut previous_error: Option<f64> = None;

        for iteration in 0..self.max_iterations {
            let odds: Vec<f64> = spreads
                .iter()
                .zip(probabilities)
                .map(|(s, p)| (1.0 - s) / p)
                .collect();
            let observed = observed_spread(&odds, winning_outcomes_count);

            trace!(iteration, observed, margin, "Solver iteration");

            let error = match assess(margin, observed, self.tolerance) {
                Assessment::Converged => return Ok(odds),
                Assessment::Infeasible => {
                    return Err(PricingError::Infeasible { margin, observed });
                }
                Assessment::Continue { error } => error,
            };

            if let Some(previous) = previous_error {
                if (error - previous).abs() < STALL_EPSILON {
                    if margin / observed - 1.0 < self.tolerance {
                        return Ok(odds);
                    }
                    return Err(PricingError::Stalled {
                        iterations: iteration + 1,
                        observed,
                    });
                }
            }
            previous_error = Some(error);

            for ((spread, p), o) in spreads.iter_mut().zip(probabilities).zip(&odds) {
                let step = error * *spread / (1.0 - 1.0 / o) / (1.0 - margin) / observed;
                *spread += (1.0 - *spread - p) * sigmoid(step);
            }
        }

        Err(PricingError::NotConverged {
            iterations: self.max_iterations,
        })
    }
}

fn validate(
    probabilities: &[f64],
    margin: f64,
    winning_outcomes_count: u32,
) -> Result<(), PricingError> {
    if probabilities.is_empty() {
        return Err(PricingError::invalid("no probabilities"));
    }
    if !margin.is_finite() || margin <= 0.0 || margin >= 1.0 {
        return Err(PricingError::invalid(format!("margin {margin} outside (0, 1)")));
    }
    if winning_outcomes_count == 0 {
        return Err(PricingError::invalid("winning outcomes count must be >= 1"));
    }
    if let Some(p) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p <= 0.0 || **p >= 1.0)
    {
        return Err(PricingError::invalid(format!(
            "probability {p} outside (0, 1)"
        )));
    }

    let sum: f64 = probabilities.iter().sum();
    let expected = f64::from(winning_outcomes_count);
    if (sum - expected).abs() > PROBABILITY_SUM_TOLERANCE * expected {
        return Err(PricingError::invalid(format!(
            "probabilities sum to {sum}, expected {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overround(odds: &[f64]) -> f64 {
        odds.iter().map(|o| 1.0 / o).sum()
    }

    #[test]
    fn two_way_market_converges_to_margin() {
        let odds = LiveOddsSolver::default().solve(&[0.6, 0.4], 0.05, 1).unwrap();

        assert_eq!(odds.len(), 2);
        assert!(odds[0] < odds[1]);
        let expected = 1.0 / (1.0 - 0.05);
        assert!((overround(&odds) / expected - 1.0).abs() < 1e-4);
    }

    #[test]
    fn converged_odds_are_priced_below_fair() {
        let probabilities = [0.5, 0.3, 0.2];
        let odds = LiveOddsSolver::default().solve(&probabilities, 0.08, 1).unwrap();

        for (o, p) in odds.iter().zip(probabilities) {
            assert!(*o >= 1.0);
            assert!(*o < 1.0 / p, "odds {o} should carry margin vs fair {}", 1.0 / p);
        }
    }

    #[test]
    fn multi_winner_market_scales_overround() {
        let odds = LiveOddsSolver::default().solve(&[0.8, 0.7, 0.5], 0.05, 2).unwrap();

        let expected = 2.0 / (1.0 - 0.05);
        assert!((overround(&odds) / expected - 1.0).abs() < 1e-4);
    }

    #[test]
    fn unreachable_margin_fails_instead_of_returning_garbage() {
        // Two even outcomes cannot carry a 90% margin with odds >= 1.
        let result = LiveOddsSolver::default().solve(&[0.5, 0.5], 0.9, 1);
        assert!(matches!(
            result,
            Err(PricingError::Stalled { .. } | PricingError::NotConverged { .. })
        ));
    }

    #[test]
    fn iteration_budget_is_enforced() {
        let solver = LiveOddsSolver::new(1, CONVERGENCE_TOLERANCE);
        let result = solver.solve(&[0.6, 0.4], 0.05, 1);
        assert_eq!(result, Err(PricingError::NotConverged { iterations: 1 }));
    }

    #[test]
    fn assess_flags_overshoot_as_infeasible() {
        assert_eq!(assess(0.05, 0.06, 1e-4), Assessment::Infeasible);
        assert_eq!(assess(0.05, 0.05, 1e-4), Assessment::Converged);
        assert!(matches!(
            assess(0.05, 0.04, 1e-4),
            Assessment::Continue { error } if (error - 0.01).abs() < 1e-12
        ));
    }

    #[test]
    fn rejects_invalid_inputs() {
        let solver = LiveOddsSolver::default();
        assert!(solver.solve(&[], 0.05, 1).is_err());
        assert!(solver.solve(&[0.6, 0.4], 0.0, 1).is_err());
        assert!(solver.solve(&[0.6, 0.4], 1.0, 1).is_err());
        assert!(solver.solve(&[0.6, 0.4], 0.05, 0).is_err());
        assert!(solver.solve(&[0.7, 0.4], 0.05, 1).is_err());
        assert!(solver.solve(&[1.0, 0.0], 0.05, 1).is_err());
    }

    #[test]
    fn converges_across_a_grid_of_distributions() {
        let solver = LiveOddsSolver::default();
        for margin in [0.01, 0.03, 0.05, 0.1, 0.2] {
            for n in [2_usize, 3, 5, 10] {
                // Skewed but deterministic distribution.
                let weights: Vec<f64> = (1..=n).map(|i| i as f64).collect();
                let total: f64 = weights.iter().sum();
                let probabilities: Vec<f64> = weights.iter().map(|w| w / total).collect();

                let odds = solver
                    .solve(&probabilities, margin, 1)
                    .unwrap_or_else(|e| panic!("margin {margin} n {n}: {e}"));
                let expected = 1.0 / (1.0 - margin);
                assert!((overround(&odds) / expected - 1.0).abs() < 1e-4);
            }
        }
    }
}
