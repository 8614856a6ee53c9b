use std::{fmt, sync::Arc};

use artemis_graphql::{GraphQLTransport, Side};
use artemis_http::{HttpServiceFactory, ReqwestServiceFactory};
use buildstructor::buildstructor;
use serde_json::{Map, Value};

use crate::{
    ArtemisConfig, ArtemisError,
    dispatch::{CallOutcome, CallRequest, Dispatcher, ErrorObserver, ErrorReporter, ValidationState},
    registry::{DocumentRegistry, OperationKind},
};

/// Executes registered queries and mutations by name.
///
/// Cloning is cheap and clones share the transport, so concurrent calls from
/// clones of one client batch together.
#[derive(Clone)]
pub struct ArtemisClient {
    dispatcher: Arc<Dispatcher>,
    reporter: ErrorReporter,
}

#[buildstructor]
impl ArtemisClient {
    /// Assembles a client for `side` from `config`.
    ///
    /// Documents are loaded from `config.graphql_folder` unless a `registry`
    /// is given, and requests go over HTTP unless a `transport` is given.
    /// Building a batching transport spawns its worker, so outside a tokio
    /// runtime this fails with [`ArtemisError::Transport`].
    #[builder]
    pub fn new(
        config: ArtemisConfig,
        side: Option<Side>,
        registry: Option<DocumentRegistry>,
        transport: Option<GraphQLTransport>,
        observer: Option<Arc<dyn ErrorObserver>>,
        validation: Option<Arc<dyn ValidationState>>,
    ) -> Result<ArtemisClient, ArtemisError> {
        let side = side.unwrap_or_default();
        let registry = match registry {
            Some(registry) => registry,
            None => DocumentRegistry::from_folder(&config.graphql_folder)?,
        };
        let transport = match transport {
            Some(transport) => transport,
            None => {
                tracing::info!(
                    server_uri = %config.server_uri,
                    browser_uri = %config.browser_uri,
                    %side,
                    "creating client"
                );
                let http = ReqwestServiceFactory::new(config.http_config())?.create()?;
                config.transport_selector()?.select(side, http)?
            }
        };

        let mut reporter = ErrorReporter::new().reset_validation(config.reset_validation);
        if let Some(observer) = observer {
            reporter = reporter.with_observer(observer);
        }
        if let Some(validation) = validation {
            reporter = reporter.with_validation(validation);
        }

        Ok(ArtemisClient {
            dispatcher: Arc::new(
                Dispatcher::new(Arc::new(registry), transport)
                    .with_error_policy(config.error_policy),
            ),
            reporter,
        })
    }

    /// Runs the queries `request` names, one result per query
    pub async fn query(&self, request: impl Into<CallRequest>) -> CallOutcome {
        self.dispatcher
            .call(OperationKind::Query, request.into())
            .await
    }

    /// Runs the queries `request` names and returns their data, merged when
    /// there are several. Errors of a single query go to the observer.
    pub async fn q(&self, request: impl Into<CallRequest>) -> Map<String, Value> {
        self.dispatcher
            .call_aggregated(OperationKind::Query, request.into(), &self.reporter)
            .await
    }

    /// Runs the mutations `request` names, one result per mutation
    pub async fn mutate(&self, request: impl Into<CallRequest>) -> CallOutcome {
        self.dispatcher
            .call(OperationKind::Mutation, request.into())
            .await
    }

    /// Runs the mutations `request` names and returns their data, see [`ArtemisClient::q`]
    pub async fn m(&self, request: impl Into<CallRequest>) -> Map<String, Value> {
        self.dispatcher
            .call_aggregated(OperationKind::Mutation, request.into(), &self.reporter)
            .await
    }

    pub fn registry(&self) -> &DocumentRegistry {
        self.dispatcher.registry()
    }
}

impl fmt::Debug for ArtemisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtemisClient")
            .field("queries", &self.registry().len(OperationKind::Query))
            .field("mutations", &self.registry().len(OperationKind::Mutation))
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}
