use artemis_http::{HttpService, extend_headers::ExtendHeadersLayer};
use buildstructor::buildstructor;
use derive_getters::Getters;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tower::{ServiceBuilder, util::BoxCloneSyncService};
use url::Url;

use crate::{
    BatchConfig, BatchLayer, GraphQLLayer, GraphQLRequest, GraphQLResponse, GraphQLServiceError,
};

/// Ease-of-use synonym for the transport a client executes documents with
pub type GraphQLTransport =
    BoxCloneSyncService<GraphQLRequest, GraphQLResponse, GraphQLServiceError>;

/// Which side of the application a client is constructed on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Rendering on the server, talking to the GraphQL server directly
    Server,
    /// Running in the client application, talking to its local endpoint
    #[default]
    Client,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Server => write!(f, "server"),
            Side::Client => write!(f, "client"),
        }
    }
}

/// Chooses the transport for a [`Side`].
///
/// The server side always sends each operation directly to `server_endpoint`.
/// The client side talks to `client_endpoint`, batching when a [`BatchConfig`]
/// is present.
#[derive(Clone, Debug, Getters)]
pub struct TransportSelector {
    server_endpoint: Url,
    client_endpoint: Url,
    batch: Option<BatchConfig>,
    headers: HeaderMap,
}

#[buildstructor]
impl TransportSelector {
    /// Constructs a new [`TransportSelector`]
    #[builder]
    pub fn new(
        server_endpoint: Url,
        client_endpoint: Url,
        batch: Option<BatchConfig>,
        headers: Option<HeaderMap>,
    ) -> TransportSelector {
        TransportSelector {
            server_endpoint,
            client_endpoint,
            batch,
            headers: headers.unwrap_or_default(),
        }
    }

    /// Builds the transport for `side` on top of `http`.
    ///
    /// A batching transport spawns its worker, so selecting one outside a tokio
    /// runtime fails with [`GraphQLServiceError::NoRuntime`].
    pub fn select(
        &self,
        side: Side,
        http: HttpService,
    ) -> Result<GraphQLTransport, GraphQLServiceError> {
        let http = ServiceBuilder::new()
            .layer(ExtendHeadersLayer::new(self.headers.clone()))
            .service(http);
        let transport = match (side, &self.batch) {
            (Side::Server, _) => {
                tracing::info!(endpoint = %self.server_endpoint, %side, "using direct transport");
                GraphQLTransport::new(
                    ServiceBuilder::new()
                        .layer(GraphQLLayer::new(self.server_endpoint.clone()))
                        .service(http),
                )
            }
            (Side::Client, Some(batch)) => {
                tracing::info!(
                    endpoint = %self.client_endpoint,
                    %side,
                    max_size = batch.max_size,
                    "using batching transport"
                );
                GraphQLTransport::new(
                    ServiceBuilder::new()
                        .layer(BatchLayer::new(self.client_endpoint.clone(), batch.clone())?)
                        .service(http),
                )
            }
            (Side::Client, None) => {
                tracing::info!(endpoint = %self.client_endpoint, %side, "using direct transport");
                GraphQLTransport::new(
                    ServiceBuilder::new()
                        .layer(GraphQLLayer::new(self.client_endpoint.clone()))
                        .service(http),
                )
            }
        };
        Ok(transport)
    }
}
