//! Feed-agnostic domain types.

pub mod error;
pub mod id;
pub mod selection;
pub mod snapshot;

pub use error::PricingError;
pub use id::{ConditionId, GameId, OutcomeId};
pub use selection::Selection;
pub use snapshot::{ConditionStatus, LiveStatistics, OddsFeedSnapshot, OutcomeQuote};
