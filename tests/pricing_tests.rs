//! Integration tests for live odds pricing.

use oddsync::application::pricing::{calc_min_odds, LiveOddsCalculator};
use oddsync::domain::{OddsFeedSnapshot, OutcomeQuote, PricingError};
use oddsync::testkit::domain::{
    live_selection, prematch_selection, two_way_snapshot, LIVE_CORE,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[test]
fn live_odds_fall_as_stake_grows() {
    let calculator = LiveOddsCalculator::default();
    let snapshot = two_way_snapshot("c1");
    let selection = live_selection("c1", "2");

    let mut previous = f64::INFINITY;
    for stake in [0, 25, 100, 400, 1_600] {
        let odds = calculator
            .calc_live_odds(&selection, Decimal::from(stake), &snapshot)
            .unwrap();
        assert!(odds > 1.0, "stake {stake}: {odds}");
        assert!(odds <= previous, "stake {stake}: {odds} > {previous}");
        previous = odds;
    }
}

#[test]
fn quote_routes_by_core_address() {
    let calculator = LiveOddsCalculator::default();
    let snapshot = two_way_snapshot("c1");

    let prematch = calculator
        .quote(&prematch_selection("c1", "2"), dec!(500), &snapshot, LIVE_CORE)
        .unwrap();
    let live = calculator
        .quote(&live_selection("c1", "2"), dec!(500), &snapshot, LIVE_CORE)
        .unwrap();

    assert_eq!(prematch, 2.75);
    assert!(live < prematch);
}

#[test]
fn zero_margin_multi_winner_uses_scaled_probabilities() {
    let snapshot = OddsFeedSnapshot::try_new(
        "c1",
        0.0,
        dec!(900),
        2,
        vec![
            OutcomeQuote::new("a", 1.5, 3.0),
            OutcomeQuote::new("b", 1.5, 3.0),
            OutcomeQuote::new("c", 1.5, 3.0),
        ],
    )
    .unwrap();

    let odds = LiveOddsCalculator::default()
        .calc_live_odds(&live_selection("c1", "a"), Decimal::ZERO, &snapshot)
        .unwrap();
    assert!((odds - 1.5).abs() < 1e-9, "got {odds}");
}

#[test]
fn unknown_outcome_is_unavailable_not_a_panic() {
    let result = LiveOddsCalculator::default().calc_live_odds(
        &live_selection("c1", "missing"),
        dec!(10),
        &two_way_snapshot("c1"),
    );
    assert!(matches!(result, Err(PricingError::UnknownOutcome { .. })));
}

#[test]
fn min_odds_of_live_price() {
    let live = LiveOddsCalculator::default()
        .calc_live_odds(&live_selection("c1", "1"), dec!(100), &two_way_snapshot("c1"))
        .unwrap();
    let live = Decimal::from_f64(live).unwrap();

    let min = calc_min_odds(live, dec!(5));
    assert!(min < live);
    assert!(min > Decimal::ONE);
    assert_eq!(calc_min_odds(live, Decimal::ZERO), live);
}
