//! Feed facades.
//!
//! Each facade wires one [`ConnectionManager`] to the watchers its router
//! feeds, and is the surface consumers use: register interest, then watch
//! keys for debounced updates.

use std::sync::Arc;

use crate::adapter::protocol::FeedKind;
use crate::adapter::router::{
    ConditionFeedRouter, LiveStatisticsRouter, OddsWatcher, StatisticsWatcher, StatusWatcher,
};
use crate::adapter::websocket::WebSocketTransport;
use crate::domain::{ConditionId, ConditionStatus, GameId, LiveStatistics, OddsFeedSnapshot};
use crate::error::Result;
use crate::infrastructure::config::settings::TimingConfig;
use crate::infrastructure::config::Config;
use crate::infrastructure::connection::{ConnectionManager, ConnectionState};
use crate::infrastructure::dispatch::WatchSubscription;
use crate::infrastructure::timer::{Scheduler, TokioScheduler};
use crate::port::FeedTransport;

/// Odds and status updates for conditions.
pub struct ConditionFeed {
    manager: ConnectionManager,
    odds: OddsWatcher,
    status: StatusWatcher,
}

impl ConditionFeed {
    pub fn new(
        transport: impl FeedTransport + 'static,
        scheduler: Arc<dyn Scheduler>,
        timing: &TimingConfig,
    ) -> Self {
        let odds = OddsWatcher::new(Arc::clone(&scheduler), timing.quiet_period());
        let status = StatusWatcher::new(Arc::clone(&scheduler), timing.quiet_period());
        let router = Arc::new(ConditionFeedRouter::new(odds.clone(), status.clone()));
        let manager = ConnectionManager::new(
            FeedKind::Conditions,
            transport,
            router,
            scheduler,
            timing.subscription_window(),
        );
        Self {
            manager,
            odds,
            status,
        }
    }

    /// Condition feed over WebSocket on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = WebSocketTransport::new(config.feeds.conditions.ws_url.clone());
        Ok(Self::new(transport, Arc::new(TokioScheduler::try_current()?), &config.timing))
    }

    pub fn subscribe_to_updates<I, S>(&self, condition_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manager.subscribe_to_updates(condition_ids);
    }

    pub fn unsubscribe_to_updates<I, S>(&self, condition_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manager.unsubscribe_to_updates(condition_ids);
    }

    #[must_use]
    pub fn is_socket_ready(&self) -> bool {
        self.manager.is_socket_ready()
    }

    /// Watch debounced odds snapshots of one condition.
    pub fn watch_odds(
        &self,
        condition_id: ConditionId,
        callback: impl Fn(&Arc<OddsFeedSnapshot>) + Send + Sync + 'static,
    ) -> WatchSubscription<ConditionId, Arc<OddsFeedSnapshot>> {
        self.odds.subscribe(condition_id, callback)
    }

    /// Watch debounced status changes of one condition.
    pub fn watch_status(
        &self,
        condition_id: ConditionId,
        callback: impl Fn(&ConditionStatus) + Send + Sync + 'static,
    ) -> WatchSubscription<ConditionId, ConditionStatus> {
        self.status.subscribe(condition_id, callback)
    }

    /// Drop the connection for a venue or chain switch, along with any
    /// updates still waiting out their quiet period.
    pub fn switch_context(&self) {
        self.odds.cancel_pending();
        self.status.cancel_pending();
        self.manager.switch_context();
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

/// Live match statistics per game.
pub struct LiveStatisticsFeed {
    manager: ConnectionManager,
    statistics: StatisticsWatcher,
}

impl LiveStatisticsFeed {
    pub fn new(
        transport: impl FeedTransport + 'static,
        scheduler: Arc<dyn Scheduler>,
        timing: &TimingConfig,
    ) -> Self {
        let statistics = StatisticsWatcher::new(Arc::clone(&scheduler), timing.quiet_period());
        let router = Arc::new(LiveStatisticsRouter::new(statistics.clone()));
        let manager = ConnectionManager::new(
            FeedKind::Statistics,
            transport,
            router,
            scheduler,
            timing.subscription_window(),
        );
        Self {
            manager,
            statistics,
        }
    }

    /// Statistics feed over WebSocket on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = WebSocketTransport::new(config.feeds.statistics.ws_url.clone());
        Ok(Self::new(transport, Arc::new(TokioScheduler::try_current()?), &config.timing))
    }

    pub fn subscribe_to_updates<I, S>(&self, game_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manager.subscribe_to_updates(game_ids);
    }

    pub fn unsubscribe_to_updates<I, S>(&self, game_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manager.unsubscribe_to_updates(game_ids);
    }

    #[must_use]
    pub fn is_socket_ready(&self) -> bool {
        self.manager.is_socket_ready()
    }

    pub fn watch_statistics(
        &self,
        game_id: GameId,
        callback: impl Fn(&Arc<LiveStatistics>) + Send + Sync + 'static,
    ) -> WatchSubscription<GameId, Arc<LiveStatistics>> {
        self.statistics.subscribe(game_id, callback)
    }

    pub fn switch_context(&self) {
        self.statistics.cancel_pending();
        self.manager.switch_context();
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    use crate::testkit::transport::scripted_transport;

    const ODDS_FRAME: &str = r#"[{"id": "c1", "margin": 0.05, "reinforcement": 1000,
        "outcomes": [{"id": "1", "price": 1.42, "clearPrice": 1.5},
                     {"id": "2", "price": 2.75, "clearPrice": 3.0}],
        "status": "Active"}]"#;

    fn scheduler() -> Arc<dyn Scheduler> {
        Arc::new(TokioScheduler::current())
    }

    #[tokio::test(start_paused = true)]
    async fn condition_feed_delivers_debounced_updates() {
        let (transport, handle) = scripted_transport();
        let feed = ConditionFeed::new(transport, scheduler(), &TimingConfig::default());

        let odds_seen = Arc::new(Mutex::new(Vec::new()));
        let status_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&odds_seen);
        let _odds = feed.watch_odds(ConditionId::from("c1"), move |snapshot| {
            sink.lock().push(snapshot.margin());
        });
        let sink = Arc::clone(&status_seen);
        let _status = feed.watch_status(ConditionId::from("c1"), move |status| {
            sink.lock().push(*status);
        });

        feed.subscribe_to_updates(["c1"]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(feed.is_socket_ready());
        assert_eq!(
            handle.sent(),
            vec![r#"{"action":"subscribe","conditionIds":["c1"]}"#.to_string()]
        );

        handle.push_text(ODDS_FRAME);
        handle.push_text(ODDS_FRAME);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(odds_seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*odds_seen.lock(), vec![0.05]);
        assert_eq!(*status_seen.lock(), vec![ConditionStatus::Active]);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_context_drops_pending_updates() {
        let (transport, handle) = scripted_transport();
        let feed = ConditionFeed::new(transport, scheduler(), &TimingConfig::default());
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let _odds = feed.watch_odds(ConditionId::from("c1"), move |_| *sink.lock() += 1);

        feed.subscribe_to_updates(["c1"]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.push_text(ODDS_FRAME);
        tokio::time::sleep(Duration::from_millis(10)).await;
        feed.switch_context();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(*seen.lock(), 0);
        assert_eq!(feed.state(), ConnectionState::Disconnected);
        assert_eq!(handle.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn statistics_feed_uses_game_ids() {
        let (transport, handle) = scripted_transport();
        let feed = LiveStatisticsFeed::new(transport, scheduler(), &TimingConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _stats = feed.watch_statistics(GameId::from("g1"), move |stats| {
            sink.lock().push(stats.field("score").cloned());
        });

        feed.subscribe_to_updates(["g1"]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        feed.unsubscribe_to_updates(["g1"]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            handle.sent(),
            vec![
                r#"{"action":"subscribe","gameIds":["g1"]}"#.to_string(),
                r#"{"action":"unsubscribe","gameIds":["g1"]}"#.to_string(),
            ]
        );

        handle.push_text(r#"[{"gameId": "g1", "score": "0:1"}]"#);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(*seen.lock(), vec![Some(serde_json::json!("0:1"))]);
    }

    #[test]
    fn from_config_needs_a_runtime() {
        let config = Config::parse_with_env(
            r#"
            [feeds.conditions]
            ws_url = "wss://feed.example/conditions"
            [feeds.statistics]
            ws_url = "wss://feed.example/statistics"
            "#,
            |_| None,
        )
        .unwrap();
        assert!(ConditionFeed::from_config(&config).is_err());
        assert!(LiveStatisticsFeed::from_config(&config).is_err());
    }
}
