//! HTTP and GraphQL batch fetchers.
//!
//! Both plug into [`RequestBatcher`](crate::infrastructure::batch::RequestBatcher)
//! through [`BatchFetch`]. A 404 or any other non-success status is "no
//! data" and yields an empty result rather than an error; transport and
//! decoding failures are errors.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::port::BatchFetch;

/// Per-call context shared by every id of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchScope {
    /// Environment or chain the ids belong to.
    pub environment: Option<String>,
}

impl FetchScope {
    #[must_use]
    pub fn environment(environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
        }
    }
}

#[derive(Serialize)]
struct BatchBody<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a str>,
}

/// Pull the record list out of a response body.
///
/// Accepts a bare array or an object wrapping it in `data`.
fn records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// `POST <base>/<resource>` with `{"ids": [...]}`.
pub struct HttpBatchFetcher {
    client: Client,
    endpoint: String,
}

impl HttpBatchFetcher {
    #[must_use]
    pub fn new(base_url: &str, resource: &str) -> Self {
        Self::with_client(Client::new(), base_url, resource)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: &str, resource: &str) -> Self {
        let endpoint = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        );
        Self { client, endpoint }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BatchFetch<String, FetchScope> for HttpBatchFetcher {
    type Output = Vec<Value>;

    async fn fetch(&self, ids: Vec<String>, scope: FetchScope) -> Result<Vec<Value>> {
        debug!(url = %self.endpoint, ids = ids.len(), "Fetching batch");

        let body = BatchBody {
            ids: &ids,
            environment: scope.environment.as_deref(),
        };
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %self.endpoint, "Batch endpoint has no data");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            warn!(url = %self.endpoint, status = %status, "Batch endpoint returned an error status");
            return Ok(Vec::new());
        }

        let items = records(response.json().await?);
        debug!(url = %self.endpoint, records = items.len(), "Fetched batch");
        Ok(items)
    }
}

#[derive(Serialize)]
struct GraphqlBody<'a> {
    query: &'a str,
    variables: GraphqlVariables<'a>,
}

#[derive(Serialize)]
struct GraphqlVariables<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a str>,
}

/// GraphQL query taking `$ids`, answered from `data.<field>`.
pub struct GraphqlBatchFetcher {
    client: Client,
    endpoint: String,
    query: String,
    field: String,
}

impl GraphqlBatchFetcher {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, query: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            query: query.into(),
            field: field.into(),
        }
    }

    fn extract(&self, mut body: Value) -> Vec<Value> {
        if let Some(errors) = body.get("errors") {
            warn!(endpoint = %self.endpoint, errors = %errors, "GraphQL batch returned errors");
        }
        match body.get_mut("data").and_then(|data| data.get_mut(&self.field)) {
            Some(Value::Array(items)) => std::mem::take(items),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl BatchFetch<String, FetchScope> for GraphqlBatchFetcher {
    type Output = Vec<Value>;

    async fn fetch(&self, ids: Vec<String>, scope: FetchScope) -> Result<Vec<Value>> {
        debug!(endpoint = %self.endpoint, field = %self.field, ids = ids.len(), "Fetching GraphQL batch");

        let body = GraphqlBody {
            query: &self.query,
            variables: GraphqlVariables {
                ids: &ids,
                environment: scope.environment.as_deref(),
            },
        };
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, status = %status, "GraphQL endpoint returned an error status");
            return Ok(Vec::new());
        }
        Ok(self.extract(response.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 8192];
            let _ = socket.read(&mut buffer).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{address}")
    }

    #[test]
    fn endpoint_joins_base_and_resource() {
        let fetcher = HttpBatchFetcher::new("https://api.example/v1/", "/conditions");
        assert_eq!(fetcher.endpoint(), "https://api.example/v1/conditions");
    }

    #[test]
    fn records_accepts_bare_and_wrapped_arrays() {
        assert_eq!(records(json!([1, 2])).len(), 2);
        assert_eq!(records(json!({"data": [1]})).len(), 1);
        assert!(records(json!({"data": null})).is_empty());
        assert!(records(json!("nope")).is_empty());
    }

    #[test]
    fn batch_body_omits_missing_environment() {
        let ids = vec!["c1".to_string()];
        let body = BatchBody {
            ids: &ids,
            environment: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"ids":["c1"]}"#);
    }

    #[test]
    fn graphql_extracts_named_field() {
        let fetcher = GraphqlBatchFetcher::new("http://gql", "query($ids: [ID!]) { x }", "conditions");
        let items = fetcher.extract(json!({"data": {"conditions": [{"id": "c1"}]}}));
        assert_eq!(items, vec![json!({"id": "c1"})]);
        assert!(fetcher.extract(json!({"errors": [{"message": "boom"}]})).is_empty());
    }

    #[tokio::test]
    async fn http_success_returns_records() {
        let base = serve_once("200 OK", r#"[{"id":"c1"},{"id":"c2"}]"#).await;
        let fetcher = HttpBatchFetcher::new(&base, "conditions");

        let items = fetcher
            .fetch(vec!["c1".into(), "c2".into()], FetchScope::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn http_not_found_is_empty_not_an_error() {
        let base = serve_once("404 Not Found", "").await;
        let fetcher = HttpBatchFetcher::new(&base, "conditions");

        let items = fetcher
            .fetch(vec!["c1".into()], FetchScope::environment("polygon"))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn http_server_error_is_empty() {
        let base = serve_once("503 Service Unavailable", "").await;
        let fetcher = HttpBatchFetcher::new(&base, "conditions");
        assert!(fetcher
            .fetch(vec!["c1".into()], FetchScope::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn graphql_missing_data_is_empty() {
        let base = serve_once("200 OK", r#"{"data":null}"#).await;
        let fetcher = GraphqlBatchFetcher::new(base, "query { x }", "conditions");
        assert!(fetcher
            .fetch(vec!["c1".into()], FetchScope::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let fetcher = HttpBatchFetcher::new("http://127.0.0.1:1", "conditions");
        assert!(fetcher.fetch(vec!["c1".into()], FetchScope::default()).await.is_err());
    }
}
