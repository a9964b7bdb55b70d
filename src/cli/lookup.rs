//! Handler for the `lookup` command.

use futures_util::future::join_all;

use crate::adapter::http::FetchScope;
use crate::cli::{output, LookupArgs};
use crate::error::Result;
use crate::infrastructure::config::Config;
use crate::infrastructure::lookup::ConditionLookup;

/// Fetch every requested condition; concurrent lookups share one request.
pub async fn execute(args: &LookupArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let lookup = ConditionLookup::from_config(&config)?;
    let scope = args
        .environment
        .clone()
        .map(FetchScope::environment)
        .unwrap_or_default();

    let records = join_all(
        args.conditions
            .iter()
            .map(|id| lookup.condition(id, scope.clone())),
    )
    .await;

    output::section("Conditions");
    for (id, record) in args.conditions.iter().zip(records) {
        match record {
            Some(record) => output::key_value(id, record),
            None => output::warn(&format!("{id}: not found")),
        }
    }
    Ok(())
}
