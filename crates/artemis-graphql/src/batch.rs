//! Groups concurrently issued operations into a single HTTP request
//!
//! Operations handed to a [`BatchService`] are queued to a worker task. The
//! worker waits up to [`BatchConfig::interval`] after the first queued
//! operation (or until [`BatchConfig::max_size`] are queued), then POSTs the
//! JSON array of their bodies in one request. The response must be a JSON
//! array with one element per request, in request order.

use std::{sync::Arc, time::Duration};

use artemis_http::{HttpRequest, HttpResponse};
use artemis_tower::{ResponseFuture, default_poll_ready};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use tower::{Layer, Service};
use url::Url;

use crate::{GraphQLRequest, GraphQLResponse, GraphQLServiceError, json_post, read_response, send};

const DEFAULT_MAX_SIZE: usize = 10;
/// Default batching window, in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 10;
const DEFAULT_INTERVAL: Duration = Duration::from_millis(DEFAULT_INTERVAL_MS);

/// How each element of a batched response body is shaped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchResponseFormat {
    /// Each element is a GraphQL response: `[{"data": ..}, ..]`
    #[default]
    Plain,
    /// Each element wraps its GraphQL response: `[{"payload": {"data": ..}}, ..]`
    Payload,
}

/// Tuning for a [`BatchService`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Most operations sent in one request
    pub max_size: usize,
    /// How long to wait for more operations once one is queued
    pub interval: Duration,
    /// Shape of the elements of the response body
    pub format: BatchResponseFormat,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_size: DEFAULT_MAX_SIZE,
            interval: DEFAULT_INTERVAL,
            format: BatchResponseFormat::default(),
        }
    }
}

type Outcome = Result<GraphQLResponse, GraphQLServiceError>;

struct PendingExecution {
    request: GraphQLRequest,
    responder: oneshot::Sender<Outcome>,
}

/// [`Layer`] that wraps an HTTP service with batching GraphQL middleware.
///
/// Layering spawns the batching worker on the runtime the layer was created in.
pub struct BatchLayer {
    endpoint: Url,
    config: BatchConfig,
    runtime: Handle,
}

impl BatchLayer {
    /// Constructs a new [`BatchLayer`], failing outside a tokio runtime
    pub fn new(endpoint: Url, config: BatchConfig) -> Result<BatchLayer, GraphQLServiceError> {
        let runtime = Handle::try_current().map_err(GraphQLServiceError::NoRuntime)?;
        Ok(BatchLayer {
            endpoint,
            config,
            runtime,
        })
    }
}

impl<S> Layer<S> for BatchLayer
where
    S: Service<HttpRequest, Response = HttpResponse> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    type Service = BatchService;
    fn layer(&self, inner: S) -> Self::Service {
        BatchService::new(
            &self.runtime,
            self.endpoint.clone(),
            self.config.clone(),
            inner,
        )
    }
}

/// Middleware that queues each [`GraphQLRequest`] for a shared batched HTTP request
#[derive(Clone, Debug)]
pub struct BatchService {
    queue: mpsc::UnboundedSender<PendingExecution>,
}

impl BatchService {
    /// Spawns the batching worker in front of `inner` on `runtime`
    pub fn new<S>(runtime: &Handle, endpoint: Url, config: BatchConfig, inner: S) -> BatchService
    where
        S: Service<HttpRequest, Response = HttpResponse> + Clone + Send + 'static,
        S::Future: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let (queue, pending) = mpsc::unbounded_channel();
        runtime.spawn(collect_batches(pending, inner, endpoint, config));
        BatchService { queue }
    }
}

impl Service<GraphQLRequest> for BatchService {
    type Response = GraphQLResponse;
    type Error = GraphQLServiceError;
    type Future = ResponseFuture<Outcome>;

    default_poll_ready!();

    fn call(&mut self, request: GraphQLRequest) -> Self::Future {
        // queued here rather than in the future so that operations issued
        // together land in the same window
        let (responder, outcome) = oneshot::channel();
        let queued = self
            .queue
            .send(PendingExecution { request, responder })
            .is_ok();
        Box::pin(async move {
            if !queued {
                return Err(GraphQLServiceError::BatchClosed);
            }
            outcome
                .await
                .unwrap_or(Err(GraphQLServiceError::BatchClosed))
        })
    }
}

async fn collect_batches<S>(
    mut pending: mpsc::UnboundedReceiver<PendingExecution>,
    inner: S,
    endpoint: Url,
    config: BatchConfig,
) where
    S: Service<HttpRequest, Response = HttpResponse> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let max_size = config.max_size.max(1);
    while let Some(first) = pending.recv().await {
        let mut batch = vec![first];
        let window = tokio::time::sleep(config.interval);
        tokio::pin!(window);
        while batch.len() < max_size {
            tokio::select! {
                _ = &mut window => break,
                next = pending.recv() => match next {
                    Some(execution) => batch.push(execution),
                    None => break,
                },
            }
        }
        tracing::debug!(size = batch.len(), %endpoint, "dispatching batch");
        tokio::spawn(dispatch(
            batch,
            inner.clone(),
            endpoint.clone(),
            config.format,
        ));
    }
    tracing::trace!(%endpoint, "batching worker stopped");
}

async fn dispatch<S>(
    batch: Vec<PendingExecution>,
    client: S,
    endpoint: Url,
    format: BatchResponseFormat,
) where
    S: Service<HttpRequest, Response = HttpResponse>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let (requests, responders): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .map(|execution| (execution.request, execution.responder))
        .unzip();

    match send_batch(&requests, client, &endpoint, format).await {
        Ok(outcomes) => {
            for (responder, outcome) in responders.into_iter().zip(outcomes) {
                // the caller may have stopped waiting
                let _ = responder.send(outcome);
            }
        }
        Err(err) => {
            tracing::error!(%endpoint, size = requests.len(), "batch failed: {err}");
            let err = Arc::new(err);
            for responder in responders {
                let _ = responder.send(Err(GraphQLServiceError::BatchFailed(err.clone())));
            }
        }
    }
}

async fn send_batch<S>(
    requests: &[GraphQLRequest],
    client: S,
    endpoint: &Url,
    format: BatchResponseFormat,
) -> Result<Vec<Outcome>, GraphQLServiceError>
where
    S: Service<HttpRequest, Response = HttpResponse>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let req = json_post(Some(endpoint), requests)?;
    let (status_code, body) = read_response(send(client, req).await?).await;
    let entries = serde_json::from_slice::<Vec<serde_json::Value>>(&body).map_err(|error| {
        GraphQLServiceError::Deserialization {
            error,
            data: body.clone(),
            status_code,
        }
    })?;
    if entries.len() != requests.len() {
        return Err(GraphQLServiceError::BatchSizeMismatch {
            expected: requests.len(),
            actual: entries.len(),
        });
    }

    Ok(entries
        .into_iter()
        .map(|entry| {
            let entry = match format {
                BatchResponseFormat::Plain => entry,
                BatchResponseFormat::Payload => match entry {
                    serde_json::Value::Object(mut wrapper) => wrapper
                        .remove("payload")
                        .unwrap_or(serde_json::Value::Null),
                    other => other,
                },
            };
            serde_json::from_value::<GraphQLResponse>(entry.clone()).map_err(|error| {
                GraphQLServiceError::Deserialization {
                    error,
                    data: Bytes::from(entry.to_string()),
                    status_code,
                }
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use artemis_http::{
        HttpRequest, HttpResponse, HttpServiceError, body::body_to_bytes, test::MockHttpService,
    };
    use artemis_tower::test::MockCloneService;
    use bytes::Bytes;
    use futures::future::join_all;
    use http_body_util::Full;
    use rstest::rstest;
    use serde_json::{Value, json};
    use speculoos::prelude::*;
    use tokio::task;
    use tower::{ServiceBuilder, ServiceExt};
    use tower_test::mock;
    use url::Url;

    use super::{BatchConfig, BatchLayer, BatchResponseFormat};
    use crate::{GraphQLRequest, GraphQLServiceError, Variables};

    fn named(name: &str) -> GraphQLRequest {
        GraphQLRequest::new(format!("query {name} {{ {name} {{ id }} }}"), None, Variables::new())
    }

    fn endpoint() -> Url {
        Url::parse("http://localhost:3000/graphql").unwrap()
    }

    fn respond_with(body: Value) -> HttpResponse {
        http::Response::builder()
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    #[rstest]
    #[case::plain(
        BatchResponseFormat::Plain,
        json!([{ "data": { "products": [] } }, { "data": { "brands": [] } }])
    )]
    #[case::payload(
        BatchResponseFormat::Payload,
        json!([
            { "payload": { "data": { "products": [] } } },
            { "payload": { "data": { "brands": [] } } }
        ])
    )]
    #[tokio::test]
    async fn concurrent_requests_share_one_http_request(
        #[case] format: BatchResponseFormat,
        #[case] response: Value,
    ) -> Result<()> {
        let (mock_service, mut handle) = mock::pair::<HttpRequest, HttpResponse>();
        let config = BatchConfig {
            format,
            ..BatchConfig::default()
        };
        let service = ServiceBuilder::new()
            .layer(BatchLayer::new(endpoint(), config)?)
            .map_err(HttpServiceError::Unexpected)
            .service(mock_service);

        let server = task::spawn(async move {
            let (mut actual, send_response) = handle.next_request().await.unwrap();
            let body = body_to_bytes(actual.body_mut()).await.unwrap();
            let sent: Value = serde_json::from_slice(&body).unwrap();
            let expected = serde_json::to_value(vec![named("products"), named("brands")]).unwrap();
            assert_that!(sent).is_equal_to(expected);
            send_response.send_response(respond_with(response));
            // nothing else may arrive for this window
            assert!(tokio::time::timeout(Duration::from_millis(50), handle.next_request())
                .await
                .is_err());
        });

        let results = join_all(vec![
            service.clone().oneshot(named("products")),
            service.clone().oneshot(named("brands")),
        ])
        .await;
        server.await?;

        let results = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        assert_that!(results[0].data)
            .is_some()
            .is_equal_to(json!({ "products": [] }));
        assert_that!(results[1].data)
            .is_some()
            .is_equal_to(json!({ "brands": [] }));
        Ok(())
    }

    #[tokio::test]
    async fn network_failure_fails_every_pending_execution_alike() {
        let mut mock = MockHttpService::new();
        mock.expect_poll_ready()
            .returning(|_| std::task::Poll::Ready(Ok(())));
        mock.expect_call().times(1).returning(|_| {
            futures::future::ready(Err(HttpServiceError::Connect(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))))
        });
        let service = ServiceBuilder::new()
            .layer(BatchLayer::new(endpoint(), BatchConfig::default()).unwrap())
            .service(MockCloneService::new(mock));

        let results = join_all(vec![
            service.clone().oneshot(named("products")),
            service.clone().oneshot(named("product")),
        ])
        .await;

        let messages = results
            .iter()
            .map(|result| match result {
                Err(err @ GraphQLServiceError::BatchFailed(_)) => err.to_string(),
                other => panic!("expected a shared batch failure, got {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_that!(messages).has_length(2);
        assert_that!(messages[0]).is_equal_to(&messages[1]);
        assert_that!(messages[0]).contains("connection refused");
    }

    #[tokio::test]
    async fn a_short_response_fails_the_whole_batch() -> Result<()> {
        let (mock_service, mut handle) = mock::pair::<HttpRequest, HttpResponse>();
        let service = ServiceBuilder::new()
            .layer(BatchLayer::new(endpoint(), BatchConfig::default())?)
            .map_err(HttpServiceError::Unexpected)
            .service(mock_service);

        task::spawn(async move {
            let (_, send_response) = handle.next_request().await.unwrap();
            send_response.send_response(respond_with(json!([{ "data": {} }])));
        });

        let results = join_all(vec![
            service.clone().oneshot(named("products")),
            service.clone().oneshot(named("brands")),
        ])
        .await;

        for result in results {
            assert_that!(result).is_err().matches(|err| match err {
                GraphQLServiceError::BatchFailed(inner) => matches!(
                    inner.as_ref(),
                    GraphQLServiceError::BatchSizeMismatch {
                        expected: 2,
                        actual: 1
                    }
                ),
                _ => false,
            });
        }
        Ok(())
    }

    #[tokio::test]
    async fn batches_are_capped_at_max_size() -> Result<()> {
        let (mock_service, mut handle) = mock::pair::<HttpRequest, HttpResponse>();
        let config = BatchConfig {
            max_size: 2,
            interval: Duration::from_millis(50),
            ..BatchConfig::default()
        };
        let service = ServiceBuilder::new()
            .layer(BatchLayer::new(endpoint(), config)?)
            .map_err(HttpServiceError::Unexpected)
            .service(mock_service);

        let server = task::spawn(async move {
            let mut sizes = Vec::new();
            for _ in 0..2 {
                let (mut actual, send_response) = handle.next_request().await.unwrap();
                let body = body_to_bytes(actual.body_mut()).await.unwrap();
                let sent: Vec<Value> = serde_json::from_slice(&body).unwrap();
                sizes.push(sent.len());
                let answers = sent.iter().map(|_| json!({ "data": {} })).collect::<Vec<_>>();
                send_response.send_response(respond_with(Value::Array(answers)));
            }
            sizes
        });

        let results = join_all(
            ["a", "b", "c"]
                .into_iter()
                .map(|name| service.clone().oneshot(named(name))),
        )
        .await;

        assert_that!(server.await?).is_equal_to(vec![2, 1]);
        assert_that!(results.iter().all(|result| result.is_ok())).is_true();
        Ok(())
    }

    #[test]
    fn a_layer_needs_a_running_runtime() {
        assert_that!(BatchLayer::new(endpoint(), BatchConfig::default()).map(|_| ()))
            .is_err()
            .matches(|err| matches!(err, GraphQLServiceError::NoRuntime(_)));
    }
}
