#![warn(missing_docs)]

//! GraphQL-over-HTTP middleware for [`HttpService`](artemis_http::HttpService)s
//!
//! Provides a direct transport that sends one POST per operation, a batching
//! transport that groups concurrent operations into a single POST, and a
//! [`TransportSelector`] that picks between them for the side of the
//! application the client runs on.

use std::{future::Future, pin::Pin, str::FromStr, sync::Arc};

use artemis_http::{HttpRequest, HttpResponse};
use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode, Uri, uri::InvalidUri};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use tower::{Layer, Service, ServiceExt};
use url::Url;

mod batch;
mod transport;

pub use batch::{
    BatchConfig, BatchLayer, BatchResponseFormat, BatchService, DEFAULT_INTERVAL_MS,
};
pub use transport::{GraphQLTransport, Side, TransportSelector};

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

/// Variables sent alongside a GraphQL document
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Re-export / renamed type alias for [`graphql_client::Response`] over untyped data
pub type GraphQLResponse = graphql_client::Response<serde_json::Value>;

/// A single GraphQL operation, as it travels over the wire
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// The document source, including any fragments it spreads
    pub query: String,
    /// Selects the operation to run when the document holds several
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,
    /// Variables for the operation
    #[serde(default)]
    pub variables: Variables,
}

impl GraphQLRequest {
    /// Constructs a new [`GraphQLRequest`]
    pub fn new(
        query: impl Into<String>,
        operation_name: Option<String>,
        variables: Variables,
    ) -> GraphQLRequest {
        GraphQLRequest {
            query: query.into(),
            operation_name,
            variables,
        }
    }
}

/// Errors that keep a [`GraphQLRequest`] from producing a [`GraphQLResponse`].
///
/// GraphQL errors reported by the server are not represented here; they come
/// back inside the response.
#[derive(thiserror::Error, Debug)]
pub enum GraphQLServiceError {
    /// Data serialization error
    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),
    /// Data deserialization error
    #[error("Could not decode the response (status {status_code}): {error}")]
    Deserialization {
        /// The source error
        error: serde_json::Error,
        /// The data that was attempted to be deserialized
        data: Bytes,
        /// The [`StatusCode`] of the response
        status_code: StatusCode,
    },
    /// [`http`]-related error, probably from header-related tasks
    #[error("HTTP error: {:?}", .0)]
    Http(#[from] http::Error),
    /// Error that occurs from a failure to parse a [`Uri`] from a [`Url`]
    #[error("Unable to convert URL to URI.")]
    InvalidUri(#[from] InvalidUri),
    /// Errors that occur as a result of the underlying HTTP service failing
    #[error("Upstream service error: {}", .0)]
    UpstreamService(Box<dyn std::error::Error + Send + Sync>),
    /// A batched response did not hold one entry per batched request
    #[error("Batched response held {actual} entries for {expected} requests")]
    BatchSizeMismatch {
        /// How many requests were sent
        expected: usize,
        /// How many responses came back
        actual: usize,
    },
    /// The batch this request was part of failed as a whole
    #[error("{}", .0)]
    BatchFailed(Arc<GraphQLServiceError>),
    /// The task collecting batched requests is gone
    #[error("The batching worker has shut down")]
    BatchClosed,
    /// The batching worker can only be spawned inside a tokio runtime
    #[error("Batching needs a running tokio runtime")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),
}

/// Serializes `body` and wraps it in a JSON POST to `endpoint`
pub(crate) fn json_post<T: Serialize + ?Sized>(
    endpoint: Option<&Url>,
    body: &T,
) -> Result<HttpRequest, GraphQLServiceError> {
    let body_bytes =
        Bytes::from(serde_json::to_vec(body).map_err(GraphQLServiceError::Serialization)?);
    let req = http::Request::builder();
    let req = if let Some(url) = endpoint {
        req.uri(Uri::from_str(url.as_ref())?)
    } else {
        req
    };
    let req = req
        .method(Method::POST)
        .header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        )
        .body(Full::new(body_bytes))?;
    Ok(req)
}

/// Sends `req` through `client`, collapsing its error into [`GraphQLServiceError::UpstreamService`]
pub(crate) async fn send<S>(
    client: S,
    req: HttpRequest,
) -> Result<HttpResponse, GraphQLServiceError>
where
    S: Service<HttpRequest, Response = HttpResponse>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    client
        .oneshot(req)
        .await
        .map_err(|err| GraphQLServiceError::UpstreamService(Box::new(err)))
}

/// Splits a response into its status and collected body
pub(crate) async fn read_response(resp: HttpResponse) -> (StatusCode, Bytes) {
    let (parts, mut body) = resp.into_parts();
    match artemis_http::body::body_to_bytes(&mut body).await {
        Ok(bytes) => (parts.status, bytes),
        Err(never) => match never {},
    }
}

/// [`Layer`] that wraps an HTTP service with direct (one POST per operation) GraphQL middleware
#[derive(Default)]
pub struct GraphQLLayer {
    endpoint: Option<Url>,
}

impl GraphQLLayer {
    /// Constructs a new [`GraphQLLayer`]
    pub fn new(endpoint: Url) -> GraphQLLayer {
        GraphQLLayer {
            endpoint: Some(endpoint),
        }
    }
}

impl<S> Layer<S> for GraphQLLayer {
    type Service = GraphQLService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        GraphQLService::new(self.endpoint.clone(), inner)
    }
}

/// Middleware that sends each [`GraphQLRequest`] as its own HTTP request
#[derive(Clone, Debug)]
pub struct GraphQLService<S> {
    inner: S,
    endpoint: Option<Url>,
}

impl<S> GraphQLService<S> {
    /// Constructs a new [`GraphQLService`]
    pub fn new(endpoint: Option<Url>, inner: S) -> GraphQLService<S> {
        GraphQLService { endpoint, inner }
    }
}

impl<S> Service<GraphQLRequest> for GraphQLService<S>
where
    S: Service<HttpRequest, Response = HttpResponse> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = GraphQLResponse;
    type Error = GraphQLServiceError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        tower::Service::poll_ready(&mut self.inner, cx)
            .map_err(|err| GraphQLServiceError::UpstreamService(Box::new(err)))
    }

    fn call(&mut self, req: GraphQLRequest) -> Self::Future {
        let client = artemis_tower::service::take_ready_service::<_, HttpRequest>(&mut self.inner);
        let url = self.endpoint.clone();

        let fut = async move {
            let req = json_post(url.as_ref(), &req)?;
            let (status_code, body) = read_response(send(client, req).await?).await;
            serde_json::from_slice::<GraphQLResponse>(&body).map_err(|error| {
                GraphQLServiceError::Deserialization {
                    error,
                    data: body,
                    status_code,
                }
            })
        };
        Box::pin(fut)
    }
}
