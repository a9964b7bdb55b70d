//! Feed wire formats.
//!
//! Outbound control frames:
//!
//! ```json
//! {"action": "subscribe", "conditionIds": ["c1", "c2"]}
//! {"action": "unsubscribe", "gameIds": ["g1"]}
//! ```
//!
//! Inbound frames are JSON arrays of per-identifier records. Numbers may
//! arrive as JSON numbers or numeric strings, and several fields have
//! alternate names depending on the producer.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    ConditionStatus, GameId, LiveStatistics, OddsFeedSnapshot, OutcomeQuote, PricingError,
};
use crate::error::Result;
use crate::port::{SubscriptionAction, SubscriptionCommand};

/// The two independent real-time feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Condition odds and status updates.
    Conditions,
    /// Live match statistics.
    Statistics,
}

impl FeedKind {
    /// Field carrying identifiers in control frames.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::Conditions => "conditionIds",
            Self::Statistics => "gameIds",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Conditions => "conditions",
            Self::Statistics => "statistics",
        }
    }
}

/// Subscribe or unsubscribe frame for one feed.
#[derive(Debug, Clone, Copy)]
pub struct ControlMessage<'a> {
    pub kind: FeedKind,
    pub action: SubscriptionAction,
    pub ids: &'a [String],
}

impl<'a> ControlMessage<'a> {
    #[must_use]
    pub fn from_command(kind: FeedKind, command: &'a SubscriptionCommand) -> Self {
        Self {
            kind,
            action: command.action,
            ids: &command.ids,
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for ControlMessage<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("action", self.action.as_str())?;
        map.serialize_entry(self.kind.id_field(), self.ids)?;
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Lenient scalars
// ---------------------------------------------------------------------------

fn parse_scalar<T, E>(value: Value) -> std::result::Result<Option<T>, E>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: de::Error,
{
    let text = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        other => return Err(E::custom(format!("expected number or string, got {other}"))),
    };
    text.parse::<T>()
        .map(Some)
        .map_err(|e| E::custom(format!("invalid number {text:?}: {e}")))
}

/// Optional number given as a JSON number or numeric string.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_scalar(Value::deserialize(deserializer)?)
}

/// Identifier given as a string or a bare number.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!("invalid identifier {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Condition feed
// ---------------------------------------------------------------------------

/// One outcome inside a condition record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    #[serde(alias = "outcomeId", deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, alias = "odds", deserialize_with = "lenient")]
    pub price: Option<f64>,
    #[serde(default, alias = "clearOdds", deserialize_with = "lenient")]
    pub clear_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub max_stake: Option<Decimal>,
}

/// One record of a condition feed frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRecord {
    #[serde(alias = "conditionId", deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub margin: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub reinforcement: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient")]
    pub winning_outcomes_count: Option<u32>,
    #[serde(default, alias = "odds")]
    pub outcomes: Option<Vec<OutcomeRecord>>,
    #[serde(default, alias = "state")]
    pub status: Option<String>,
}

impl ConditionRecord {
    /// Odds snapshot carried by this record.
    ///
    /// `None` when the record carries no complete odds data (status-only
    /// records, or records missing margin, reinforcement or a price).
    /// `Some(Err)` when the data is complete but violates snapshot
    /// invariants.
    #[must_use]
    pub fn snapshot(&self) -> Option<std::result::Result<OddsFeedSnapshot, PricingError>> {
        let outcomes = self.outcomes.as_ref()?;
        let margin = self.margin?;
        let reinforcement = self.reinforcement?;

        let quotes = outcomes
            .iter()
            .map(|outcome| {
                let quote = OutcomeQuote::new(
                    outcome.id.as_str(),
                    outcome.price?,
                    outcome.clear_price?,
                );
                Some(match outcome.max_stake {
                    Some(max_stake) => quote.with_max_stake(max_stake),
                    None => quote,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(OddsFeedSnapshot::try_new(
            self.id.as_str(),
            margin,
            reinforcement,
            self.winning_outcomes_count.unwrap_or(1),
            quotes,
        ))
    }

    /// Status carried by this record, if any.
    #[must_use]
    pub fn status(&self) -> Option<ConditionStatus> {
        self.status.as_deref().map(parse_status)
    }
}

/// Map a wire status name to [`ConditionStatus`], ignoring case.
#[must_use]
pub fn parse_status(raw: &str) -> ConditionStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "active" | "created" => ConditionStatus::Active,
        "stopped" => ConditionStatus::Stopped,
        "paused" => ConditionStatus::Paused,
        "resolved" => ConditionStatus::Resolved,
        "canceled" | "cancelled" => ConditionStatus::Canceled,
        _ => ConditionStatus::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Statistics feed
// ---------------------------------------------------------------------------

/// Parse one statistics record.
///
/// Returns `Ok(None)` when the record has no fields besides its identifier.
///
/// # Errors
///
/// Returns an error when the record is not an object or has no usable id.
pub fn statistics_record(value: Value) -> std::result::Result<Option<LiveStatistics>, String> {
    let Value::Object(mut fields) = value else {
        return Err("record is not an object".into());
    };

    let id = fields
        .remove("id")
        .or_else(|| fields.remove("gameId"))
        .ok_or_else(|| "record has no id".to_string())?;
    let game_id = match id {
        Value::String(id) if !id.is_empty() => id,
        Value::Number(id) => id.to_string(),
        other => return Err(format!("invalid game id {other}")),
    };
    // Both spellings present: drop the duplicate.
    fields.remove("gameId");

    if fields.is_empty() {
        return Ok(None);
    }
    Ok(Some(LiveStatistics {
        game_id: GameId::from(game_id),
        fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record(value: Value) -> ConditionRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn control_message_uses_feed_specific_id_field() {
        let command = SubscriptionCommand {
            action: SubscriptionAction::Subscribe,
            ids: vec!["c1".into(), "c2".into()],
            epoch: 3,
        };
        let json = ControlMessage::from_command(FeedKind::Conditions, &command)
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"action":"subscribe","conditionIds":["c1","c2"]}"#);

        let command = SubscriptionCommand {
            action: SubscriptionAction::Unsubscribe,
            ids: vec!["g1".into()],
            epoch: 0,
        };
        let json = ControlMessage::from_command(FeedKind::Statistics, &command)
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"action":"unsubscribe","gameIds":["g1"]}"#);
    }

    #[test]
    fn parses_price_record() {
        let record = record(json!({
            "id": "c1",
            "margin": 0.05,
            "reinforcement": "1000",
            "winningOutcomesCount": 1,
            "outcomes": [
                {"id": "1", "price": 1.42, "clearPrice": 1.5},
                {"id": "2", "price": "2.75", "clearPrice": "3.0", "maxStake": "250"}
            ]
        }));

        let snapshot = record.snapshot().unwrap().unwrap();
        assert_eq!(snapshot.condition_id().as_str(), "c1");
        assert_eq!(snapshot.reinforcement(), dec!(1000));
        assert_eq!(snapshot.outcomes().len(), 2);
        assert_eq!(snapshot.outcomes()[1].clear_odds, 3.0);
        assert_eq!(snapshot.outcomes()[1].max_stake, Some(dec!(250)));
        assert!(record.status().is_none());
    }

    #[test]
    fn accepts_alternate_field_names() {
        let record = record(json!({
            "conditionId": 42,
            "margin": "0.1",
            "reinforcement": 500,
            "odds": [
                {"outcomeId": 7, "odds": 1.8, "clearOdds": 2.0},
                {"outcomeId": 8, "odds": 1.8, "clearOdds": 2.0}
            ],
            "state": "Paused"
        }));

        let snapshot = record.snapshot().unwrap().unwrap();
        assert_eq!(snapshot.condition_id().as_str(), "42");
        assert_eq!(snapshot.outcomes()[0].outcome_id.as_str(), "7");
        assert_eq!(snapshot.winning_outcomes_count(), 1);
        assert_eq!(record.status(), Some(ConditionStatus::Paused));
    }

    #[test]
    fn status_only_record_has_no_snapshot() {
        let record = record(json!({"id": "c1", "status": "Stopped"}));
        assert!(record.snapshot().is_none());
        assert_eq!(record.status(), Some(ConditionStatus::Stopped));
    }

    #[test]
    fn incomplete_odds_are_not_an_update() {
        let missing_margin = record(json!({
            "id": "c1",
            "reinforcement": 1000,
            "outcomes": [{"id": "1", "price": 1.4, "clearPrice": 1.5}]
        }));
        assert!(missing_margin.snapshot().is_none());

        let missing_clear = record(json!({
            "id": "c1",
            "margin": 0.05,
            "reinforcement": 1000,
            "outcomes": [{"id": "1", "price": 1.4}]
        }));
        assert!(missing_clear.snapshot().is_none());
    }

    #[test]
    fn complete_but_invalid_odds_are_reported() {
        let record = record(json!({
            "id": "c1",
            "margin": 0.05,
            "reinforcement": 1000,
            "outcomes": [{"id": "1", "price": 1.4, "clearPrice": 0.9}]
        }));
        assert!(matches!(record.snapshot(), Some(Err(PricingError::InvalidInput { .. }))));
    }

    #[test]
    fn malformed_numbers_fail_the_record() {
        let result = serde_json::from_value::<ConditionRecord>(json!({
            "id": "c1",
            "margin": "lots"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn status_names_are_case_insensitive() {
        assert_eq!(parse_status("ACTIVE"), ConditionStatus::Active);
        assert_eq!(parse_status("cancelled"), ConditionStatus::Canceled);
        assert_eq!(parse_status("Resolved"), ConditionStatus::Resolved);
        assert_eq!(parse_status("something-new"), ConditionStatus::Unknown);
    }

    #[test]
    fn statistics_record_splits_id_from_fields() {
        let stats = statistics_record(json!({"gameId": 9, "score": "1:0", "minute": 37}))
            .unwrap()
            .unwrap();
        assert_eq!(stats.game_id.as_str(), "9");
        assert_eq!(stats.field("minute"), Some(&json!(37)));
        assert!(stats.field("gameId").is_none());
    }

    #[test]
    fn statistics_record_without_fields_is_not_an_update() {
        assert!(statistics_record(json!({"id": "g1"})).unwrap().is_none());
        assert!(statistics_record(json!({"score": "1:0"})).is_err());
        assert!(statistics_record(json!("g1")).is_err());
    }
}
