//! Handler for the `watch` command.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::{output, WatchArgs};
use crate::domain::{ConditionId, GameId};
use crate::error::Result;
use crate::infrastructure::config::{Config, LogFormat};
use crate::infrastructure::connection::ConnectionState;
use crate::infrastructure::feed::{ConditionFeed, LiveStatisticsFeed};

/// Execute the watch command.
pub async fn execute(args: &WatchArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }
    config.init_logging();

    if args.conditions.is_empty() && args.games.is_empty() {
        output::warn("Nothing to watch; pass --conditions and/or --games");
        return Ok(());
    }

    let conditions = ConditionFeed::from_config(&config)?;
    let statistics = LiveStatisticsFeed::from_config(&config)?;

    let mut subscriptions = Vec::new();
    for id in &args.conditions {
        let key = id.clone();
        subscriptions.push(
            conditions.watch_odds(ConditionId::from(id.as_str()), move |snapshot| {
                let odds: Vec<String> = snapshot
                    .outcomes()
                    .iter()
                    .map(|quote| format!("{}={:.3}", quote.outcome_id, quote.odds))
                    .collect();
                output::update(&key, "odds", odds.join(" "));
            }),
        );
    }
    let mut status_subscriptions = Vec::new();
    for id in &args.conditions {
        let key = id.clone();
        status_subscriptions.push(conditions.watch_status(
            ConditionId::from(id.as_str()),
            move |status| output::update(&key, "status", format!("{status:?}")),
        ));
    }
    let mut statistics_subscriptions = Vec::new();
    for id in &args.games {
        let key = id.clone();
        statistics_subscriptions.push(statistics.watch_statistics(
            GameId::from(id.as_str()),
            move |stats| output::update(&key, "stats", serde_json::Value::Object(stats.fields.clone())),
        ));
    }

    info!(
        conditions = args.conditions.len(),
        games = args.games.len(),
        "oddsync watching"
    );

    let conditions = Arc::new(conditions);
    let statistics = Arc::new(statistics);
    if !args.conditions.is_empty() {
        conditions.subscribe_to_updates(args.conditions.iter().cloned());
    }
    if !args.games.is_empty() {
        statistics.subscribe_to_updates(args.games.iter().cloned());
    }

    let condition_ids = args.conditions.clone();
    let game_ids = args.games.clone();
    let condition_states = conditions.manager().watch_state();
    let statistics_states = statistics.manager().watch_state();
    let resubscribe_conditions = {
        let feed = Arc::clone(&conditions);
        resubscribe_on_reconnect(condition_states, move || {
            feed.subscribe_to_updates(condition_ids.iter().cloned());
        })
    };
    let resubscribe_statistics = {
        let feed = Arc::clone(&statistics);
        resubscribe_on_reconnect(statistics_states, move || {
            feed.subscribe_to_updates(game_ids.iter().cloned());
        })
    };

    tokio::select! {
        () = resubscribe_conditions => warn!("Condition feed stopped"),
        () = resubscribe_statistics => warn!("Statistics feed stopped"),
        _ = signal::ctrl_c() => info!("Shutdown signal received"),
    }

    drop((subscriptions, status_subscriptions, statistics_subscriptions));
    tokio::join!(conditions.manager().shutdown(), statistics.manager().shutdown());
    info!("oddsync stopped");
    Ok(())
}

/// Re-register interest every time the feed becomes ready again.
///
/// Interest is dropped whenever a ready connection ends, so each `Ready`
/// after the first one needs a fresh subscription. Returns once the feed's
/// manager is gone.
async fn resubscribe_on_reconnect(
    mut states: watch::Receiver<ConnectionState>,
    resubscribe: impl Fn(),
) {
    let mut connected_before = false;
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        if state == ConnectionState::Ready {
            if connected_before {
                resubscribe();
            }
            connected_before = true;
        }
    }
}
