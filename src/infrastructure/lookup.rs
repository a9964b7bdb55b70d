//! Batched condition lookups against the configured API.
//!
//! Point lookups from many callers collapse into one upstream request per
//! batch window; each caller picks its own record out of the shared result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::http::{FetchScope, GraphqlBatchFetcher, HttpBatchFetcher};
use crate::error::{ConfigError, Result};
use crate::infrastructure::batch::RequestBatcher;
use crate::infrastructure::config::settings::ApiConfig;
use crate::infrastructure::config::Config;
use crate::infrastructure::timer::{Scheduler, TokioScheduler};
use crate::port::BatchFetch;

const CONDITIONS_RESOURCE: &str = "conditions";

/// Upstream used for condition lookups.
pub enum ApiFetcher {
    Http(HttpBatchFetcher),
    Graphql(GraphqlBatchFetcher),
}

impl ApiFetcher {
    /// Pick the GraphQL endpoint when configured, else the REST base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no API endpoint is set.
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        if let (Some(url), Some(query)) = (&api.graphql_url, &api.graphql_query) {
            return Ok(Self::Graphql(GraphqlBatchFetcher::new(
                url.as_str(),
                query.as_str(),
                CONDITIONS_RESOURCE,
            )));
        }
        if api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "api.base_url",
            }
            .into());
        }
        Ok(Self::Http(HttpBatchFetcher::new(&api.base_url, CONDITIONS_RESOURCE)))
    }
}

#[async_trait]
impl BatchFetch<String, FetchScope> for ApiFetcher {
    type Output = Vec<Value>;

    async fn fetch(&self, ids: Vec<String>, scope: FetchScope) -> Result<Vec<Value>> {
        match self {
            Self::Http(fetcher) => fetcher.fetch(ids, scope).await,
            Self::Graphql(fetcher) => fetcher.fetch(ids, scope).await,
        }
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record
        .get("id")
        .or_else(|| record.get("conditionId"))
        .and_then(Value::as_str)
}

/// Coalescing lookup of condition records.
pub struct ConditionLookup<F = ApiFetcher>
where
    F: BatchFetch<String, FetchScope, Output = Vec<Value>> + 'static,
{
    batcher: RequestBatcher<String, FetchScope, F>,
}

impl<F> ConditionLookup<F>
where
    F: BatchFetch<String, FetchScope, Output = Vec<Value>> + 'static,
{
    pub fn new(fetcher: Arc<F>, scheduler: Arc<dyn Scheduler>, window: Duration) -> Self {
        Self {
            batcher: RequestBatcher::new(CONDITIONS_RESOURCE, fetcher, scheduler, window),
        }
    }

    /// Record for `condition_id`, or `None` when the batch failed or did not
    /// contain it.
    pub async fn condition(&self, condition_id: &str, scope: FetchScope) -> Option<Value> {
        let batch = self.batcher.request(condition_id.to_string(), scope).await?;
        batch
            .iter()
            .find(|record| record_id(record) == Some(condition_id))
            .cloned()
    }
}

impl ConditionLookup<ApiFetcher> {
    /// Lookup over the configured API, batched with `timing.batch_window_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error when no API endpoint is configured or when called
    /// outside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = ApiFetcher::from_config(&config.api)?;
        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(TokioScheduler::try_current()?),
            config.timing.batch_window(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use serde_json::json;

    struct CannedFetcher {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl BatchFetch<String, FetchScope> for CannedFetcher {
        type Output = Vec<Value>;

        async fn fetch(&self, ids: Vec<String>, _scope: FetchScope) -> Result<Vec<Value>> {
            self.calls.lock().push(ids.clone());
            Ok(ids
                .into_iter()
                .filter(|id| id != "missing")
                .map(|id| json!({"conditionId": id, "margin": 0.05}))
                .collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_caller_gets_its_own_record_from_one_batch() {
        let fetcher = Arc::new(CannedFetcher {
            calls: Mutex::new(Vec::new()),
        });
        let lookup = ConditionLookup::new(
            Arc::clone(&fetcher),
            Arc::new(TokioScheduler::current()),
            Duration::from_millis(20),
        );

        let (c1, c2, missing) = tokio::join!(
            lookup.condition("c1", FetchScope::default()),
            lookup.condition("c2", FetchScope::default()),
            lookup.condition("missing", FetchScope::default()),
        );

        assert_eq!(c1.unwrap()["conditionId"], "c1");
        assert_eq!(c2.unwrap()["conditionId"], "c2");
        assert!(missing.is_none());
        assert_eq!(
            *fetcher.calls.lock(),
            vec![vec!["c1".to_string(), "c2".to_string(), "missing".to_string()]]
        );
    }

    #[test]
    fn graphql_endpoint_takes_precedence() {
        let api = ApiConfig {
            base_url: "https://api.example/v1".into(),
            graphql_url: Some("https://api.example/graphql".into()),
            graphql_query: Some("query($ids: [String!]!) { conditions(ids: $ids) { id } }".into()),
        };
        assert!(matches!(ApiFetcher::from_config(&api), Ok(ApiFetcher::Graphql(_))));

        let rest = ApiConfig {
            graphql_url: None,
            ..api
        };
        assert!(matches!(ApiFetcher::from_config(&rest), Ok(ApiFetcher::Http(_))));
    }

    #[test]
    fn lookup_needs_an_endpoint() {
        let result = ApiFetcher::from_config(&ApiConfig::default());
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingField {
                field: "api.base_url"
            }))
        ));
    }
}
