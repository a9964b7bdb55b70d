//! Builders for domain primitives used across tests.
//!
//! Provides concise factory functions for [`OddsFeedSnapshot`] and
//! [`Selection`] so tests focus on assertions rather than construction
//! boilerplate.

use rust_decimal::Decimal;

use crate::domain::{OddsFeedSnapshot, OutcomeQuote, Selection};

/// Core address used for live selections in tests.
pub const LIVE_CORE: &str = "0xL1VE";

/// Core address used for prematch selections in tests.
pub const PREMATCH_CORE: &str = "0xPREMATCH";

/// Generate `n` condition ids named `c0`, `c1`, ..., `c{n-1}`.
pub fn make_condition_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("c{i}")).collect()
}

/// Build an outcome quote from `(id, odds, clear_odds)`.
pub fn quote(id: &str, odds: f64, clear_odds: f64) -> OutcomeQuote {
    OutcomeQuote::new(id, odds, clear_odds)
}

/// Snapshot for `condition` with the given margin and reinforcement.
///
/// # Panics
///
/// Panics when the inputs violate a snapshot invariant.
pub fn snapshot(
    condition: &str,
    margin: f64,
    reinforcement: Decimal,
    outcomes: Vec<OutcomeQuote>,
) -> OddsFeedSnapshot {
    OddsFeedSnapshot::try_new(condition, margin, reinforcement, 1, outcomes)
        .expect("valid test snapshot")
}

/// Two-way market: clear odds 1.5 / 3.0, 5% margin, 1000 reinforcement.
pub fn two_way_snapshot(condition: &str) -> OddsFeedSnapshot {
    snapshot(
        condition,
        0.05,
        Decimal::new(1000, 0),
        vec![quote("1", 1.42, 1.5), quote("2", 2.75, 3.0)],
    )
}

/// Three-way market: clear odds 2.5 / 3.4 / 3.2, 6% margin, 5000 reinforcement.
pub fn three_way_snapshot(condition: &str) -> OddsFeedSnapshot {
    snapshot(
        condition,
        0.06,
        Decimal::new(5000, 0),
        vec![
            quote("home", 2.32, 2.5),
            quote("draw", 3.14, 3.4),
            quote("away", 2.96, 3.2),
        ],
    )
}

/// Live selection of `outcome` on `condition`.
pub fn live_selection(condition: &str, outcome: &str) -> Selection {
    Selection::new(condition, outcome, LIVE_CORE)
}

/// Prematch selection of `outcome` on `condition`.
pub fn prematch_selection(condition: &str, outcome: &str) -> Selection {
    Selection::new(condition, outcome, PREMATCH_CORE)
}
