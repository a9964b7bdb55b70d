//! Handler for `check config`.

use std::path::Path;

use crate::cli::output;
use crate::error::Result;
use crate::infrastructure::config::Config;

/// Validate configuration file without connecting anywhere.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    output::section(&format!("Checking configuration: {}", path.display()));

    let config = Config::load(path)?;
    output::ok("Configuration file is valid");

    output::section("Summary");
    output::key_value("Conditions feed", &config.feeds.conditions.ws_url);
    output::key_value("Statistics feed", &config.feeds.statistics.ws_url);
    if config.api.base_url.is_empty() {
        output::key_value("API", "not configured");
    } else {
        output::key_value("API", &config.api.base_url);
    }
    if let Some(graphql_url) = &config.api.graphql_url {
        output::key_value("GraphQL", graphql_url);
    }
    output::key_value(
        "Windows (ms)",
        format!(
            "watch {} / batch {} / subscribe {}",
            config.timing.watcher_quiet_ms,
            config.timing.batch_window_ms,
            config.timing.subscription_window_ms
        ),
    );
    output::key_value(
        "Slippage",
        format!("{}%", config.pricing.default_slippage_percent),
    );

    if config.pricing.live_core_address.is_empty() {
        println!();
        output::warn("No live core address configured; only selections without a core price as live");
    }
    Ok(())
}
