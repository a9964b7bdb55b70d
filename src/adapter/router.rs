//! Inbound frame routing for both feeds.
//!
//! A single frame may update several registries: one condition record can
//! carry new odds and a new status, and each goes to its own watcher.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::protocol::{statistics_record, ConditionRecord};
use crate::domain::{ConditionId, ConditionStatus, GameId, LiveStatistics, OddsFeedSnapshot};
use crate::error::Result;
use crate::infrastructure::dispatch::KeyedWatcher;
use crate::port::{FeedRouter, RouteSummary};

/// Watcher of condition odds snapshots.
pub type OddsWatcher = KeyedWatcher<ConditionId, Arc<OddsFeedSnapshot>>;
/// Watcher of condition status changes.
pub type StatusWatcher = KeyedWatcher<ConditionId, ConditionStatus>;
/// Watcher of live statistics.
pub type StatisticsWatcher = KeyedWatcher<GameId, Arc<LiveStatistics>>;

/// Parse a frame into its records. Non-array frames carry no records.
fn records(text: &str) -> Result<Option<Vec<Value>>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(records) => Ok(Some(records)),
        other => {
            trace!(kind = json_kind(&other), "Ignoring non-array frame");
            Ok(None)
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Routes condition feed frames to the odds and status watchers.
pub struct ConditionFeedRouter {
    odds: OddsWatcher,
    status: StatusWatcher,
}

impl ConditionFeedRouter {
    #[must_use]
    pub const fn new(odds: OddsWatcher, status: StatusWatcher) -> Self {
        Self { odds, status }
    }
}

impl FeedRouter for ConditionFeedRouter {
    fn route(&self, text: &str) -> Result<RouteSummary> {
        let mut summary = RouteSummary::default();
        let Some(records) = records(text)? else {
            return Ok(summary);
        };

        for value in records {
            summary.records += 1;
            let record = match serde_json::from_value::<ConditionRecord>(value) {
                Ok(record) => record,
                Err(error) => {
                    debug!(error = %error, "Skipping malformed condition record");
                    summary.skipped += 1;
                    continue;
                }
            };
            let condition_id = ConditionId::from(record.id.as_str());

            match record.snapshot() {
                Some(Ok(snapshot)) => {
                    self.odds.dispatch(condition_id.clone(), Arc::new(snapshot));
                    summary.dispatched += 1;
                }
                Some(Err(error)) => {
                    warn!(condition_id = %condition_id, error = %error, "Rejected odds update");
                    summary.skipped += 1;
                }
                None => {}
            }

            if let Some(status) = record.status() {
                self.status.dispatch(condition_id, status);
                summary.dispatched += 1;
            }
        }

        trace!(
            records = summary.records,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            "Routed condition frame"
        );
        Ok(summary)
    }
}

/// Routes statistics feed frames to the statistics watcher.
pub struct LiveStatisticsRouter {
    statistics: StatisticsWatcher,
}

impl LiveStatisticsRouter {
    #[must_use]
    pub const fn new(statistics: StatisticsWatcher) -> Self {
        Self { statistics }
    }
}

impl FeedRouter for LiveStatisticsRouter {
    fn route(&self, text: &str) -> Result<RouteSummary> {
        let mut summary = RouteSummary::default();
        let Some(records) = records(text)? else {
            return Ok(summary);
        };

        for value in records {
            summary.records += 1;
            match statistics_record(value) {
                Ok(Some(statistics)) => {
                    self.statistics
                        .dispatch(statistics.game_id.clone(), Arc::new(statistics));
                    summary.dispatched += 1;
                }
                Ok(None) => {}
                Err(reason) => {
                    debug!(reason = %reason, "Skipping malformed statistics record");
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}
