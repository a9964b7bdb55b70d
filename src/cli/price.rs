//! Handlers for `price` and `min-odds`.

use std::path::Path;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::adapter::protocol::ConditionRecord;
use crate::application::pricing::{calc_min_odds, LiveOddsCalculator};
use crate::cli::{output, MinOddsArgs, PriceArgs};
use crate::domain::{OddsFeedSnapshot, Selection};
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::PricingConfig;
use crate::infrastructure::config::Config;

/// Read one condition record from `path` and build its snapshot.
///
/// # Errors
///
/// Fails when the file is unreadable, the record is malformed, or its odds
/// fields are incomplete or invalid.
pub fn load_snapshot(path: &Path) -> Result<OddsFeedSnapshot> {
    let content = std::fs::read_to_string(path)?;
    let record: ConditionRecord = serde_json::from_str(&content)?;
    let snapshot = record
        .snapshot()
        .ok_or_else(|| Error::Parse(format!("condition {} has incomplete odds", record.id)))??;
    Ok(snapshot)
}

/// Pricing settings from `config`, or the built-in defaults without one.
fn pricing_config(config: Option<&Path>) -> Result<PricingConfig> {
    match config {
        Some(path) => Ok(Config::load(path)?.pricing),
        None => Ok(PricingConfig::default()),
    }
}

/// Quote `args.stake` on `args.outcome` against a snapshot file.
///
/// Selections on the configured live core (the default) are repriced for the
/// stake; any other core gets the posted odds.
pub fn execute_price(args: &PriceArgs) -> Result<()> {
    let pricing = pricing_config(args.config.as_deref())?;
    let snapshot = load_snapshot(&args.snapshot)?;
    let core = args
        .core
        .clone()
        .unwrap_or_else(|| pricing.live_core_address.clone());
    let selection = Selection::new(snapshot.condition_id().clone(), args.outcome.as_str(), core);

    let posted = snapshot
        .quote(&selection.outcome_id)
        .map(|quote| quote.odds)
        .ok_or_else(|| Error::Parse(format!("unknown outcome {}", args.outcome)))?;
    let quoted = LiveOddsCalculator::default().quote(
        &selection,
        args.stake,
        &snapshot,
        &pricing.live_core_address,
    )?;
    let market = if selection.is_live(&pricing.live_core_address) {
        "live"
    } else {
        "prematch"
    };

    let slippage = args.slippage.unwrap_or(pricing.default_slippage_percent);
    let quoted_decimal = Decimal::from_f64(quoted)
        .ok_or_else(|| Error::Parse(format!("odds {quoted} are not representable")))?;

    output::section(&format!("Condition {}", snapshot.condition_id()));
    output::key_value("Outcome", &args.outcome);
    output::key_value("Market", market);
    output::key_value("Stake", args.stake);
    output::key_value("Posted odds", format!("{posted:.4}"));
    output::key_value("Quoted odds", format!("{quoted:.4}"));
    output::key_value(
        "Min odds",
        format!(
            "{} ({slippage}% slippage)",
            calc_min_odds(quoted_decimal, slippage).round_dp(4).normalize()
        ),
    );
    Ok(())
}

/// Print the minimum acceptable odds for `args.odds` after slippage.
pub fn execute_min_odds(args: &MinOddsArgs) -> Result<()> {
    let slippage = match args.slippage {
        Some(slippage) => slippage,
        None => pricing_config(args.config.as_deref())?.default_slippage_percent,
    };
    let min = calc_min_odds(args.odds, slippage);
    println!("{}", min.normalize());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn temp_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_snapshot_from_feed_record() {
        let file = temp_file(
            r#"{"id": "c1", "margin": 0.05, "reinforcement": 1000,
                "outcomes": [{"id": "1", "price": 1.42, "clearPrice": 1.5},
                             {"id": "2", "price": 2.75, "clearPrice": 3.0}]}"#,
        );
        let snapshot = load_snapshot(file.path()).unwrap();
        assert_eq!(snapshot.condition_id().as_str(), "c1");
        assert_eq!(snapshot.outcomes().len(), 2);
    }

    #[test]
    fn incomplete_record_is_rejected() {
        let file = temp_file(r#"{"id": "c1", "status": "Active"}"#);
        assert!(matches!(load_snapshot(file.path()), Err(Error::Parse(_))));
    }

    #[test]
    fn invalid_record_is_a_pricing_error() {
        let file = temp_file(
            r#"{"id": "c1", "margin": 1.5, "reinforcement": 1000,
                "outcomes": [{"id": "1", "price": 1.42, "clearPrice": 1.5}]}"#,
        );
        assert!(matches!(load_snapshot(file.path()), Err(Error::Pricing(_))));
    }

    #[test]
    fn pricing_defaults_come_from_config_file() {
        let file = temp_file(
            r#"
            [feeds.conditions]
            ws_url = "wss://feed.example/conditions"
            [feeds.statistics]
            ws_url = "wss://feed.example/statistics"
            [pricing]
            live_core_address = "0xLive"
            default_slippage_percent = 10
            "#,
        );
        let pricing = pricing_config(Some(file.path())).unwrap();
        assert_eq!(pricing.live_core_address, "0xLive");
        assert_eq!(pricing.default_slippage_percent, dec!(10));

        assert_eq!(pricing_config(None).unwrap().default_slippage_percent, dec!(5));
    }
}
