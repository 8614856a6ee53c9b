use std::sync::Arc;

use artemis_graphql::{GraphQLRequest, GraphQLResponse, GraphQLTransport, Variables};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;

use super::{
    CallOutcome, CallRequest, CallResult, ErrorInfo, ErrorReporter, merge_data, request::Entries,
};
use crate::registry::{DocumentRegistry, OperationKind};

/// What happens to `data` when a response also carries GraphQL errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Drop the data; the result only holds the errors
    #[default]
    None,
    /// Keep whatever partial data came back next to the errors
    All,
}

/// Runs registered documents through a transport.
///
/// Never fails: lookup, transport and GraphQL failures all come back as
/// [`CallResult::errors`]. Nothing is retried and nothing is cached; every
/// call executes again.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DocumentRegistry>,
    transport: GraphQLTransport,
    error_policy: ErrorPolicy,
}

impl Dispatcher {
    pub fn new(registry: Arc<DocumentRegistry>, transport: GraphQLTransport) -> Dispatcher {
        Dispatcher {
            registry,
            transport,
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Dispatcher {
        self.error_policy = error_policy;
        self
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Executes the document `name` of `kind`
    pub async fn execute_one(
        &self,
        kind: OperationKind,
        name: &str,
        variables: Variables,
    ) -> CallResult {
        let Some(document) = self.registry.get(kind, name) else {
            tracing::error!(%kind, document = name, "no such document");
            return CallResult::failure(vec![ErrorInfo::lookup(kind, name)]);
        };
        let request = GraphQLRequest::new(
            document.source(),
            document.operation_name().map(str::to_string),
            variables,
        );

        tracing::debug!(%kind, document = name, "executing");
        match self.transport.clone().oneshot(request).await {
            Ok(response) => {
                let result = self.shape(response);
                if !result.is_ok() {
                    tracing::error!(
                        %kind,
                        document = name,
                        errors = ?result.errors,
                        "{kind} returned errors"
                    );
                }
                result
            }
            Err(err) => {
                tracing::error!(%kind, document = name, "{kind} failed: {err}");
                CallResult::failure(vec![ErrorInfo::transport(&err)])
            }
        }
    }

    /// Executes every entry concurrently. `result[i]` answers `entries[i]`.
    pub async fn execute_many(
        &self,
        kind: OperationKind,
        entries: Vec<(String, Variables)>,
    ) -> Vec<CallResult> {
        join_all(
            entries
                .into_iter()
                .map(|(name, variables)| async move {
                    self.execute_one(kind, &name, variables).await
                }),
        )
        .await
    }

    /// Executes whatever `request` names
    pub async fn call(&self, kind: OperationKind, request: CallRequest) -> CallOutcome {
        match request.into_entries() {
            Entries::One(name, variables) => {
                CallOutcome::Single(self.execute_one(kind, &name, variables).await)
            }
            Entries::Many(entries) => CallOutcome::Many(self.execute_many(kind, entries).await),
        }
    }

    /// Executes `request` and returns only data: merged across documents for
    /// lists and maps, as-is for a single document. Single-document results
    /// are also handed to `reporter`.
    pub async fn call_aggregated(
        &self,
        kind: OperationKind,
        request: CallRequest,
        reporter: &ErrorReporter,
    ) -> serde_json::Map<String, Value> {
        match self.call(kind, request).await {
            CallOutcome::Many(results) => merge_data(&results),
            CallOutcome::Single(result) => {
                reporter.report(&result);
                result.data.unwrap_or_default()
            }
        }
    }

    fn shape(&self, response: GraphQLResponse) -> CallResult {
        let errors = response
            .errors
            .unwrap_or_default()
            .into_iter()
            .map(ErrorInfo::from)
            .collect::<Vec<_>>();
        let data = match response.data {
            Some(Value::Object(data)) => Some(data),
            _ => None,
        };
        match self.error_policy {
            ErrorPolicy::None if !errors.is_empty() => CallResult::failure(errors),
            _ => CallResult { data, errors },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use artemis_graphql::{
        GraphQLRequest, GraphQLResponse, GraphQLServiceError, GraphQLTransport, Variables,
    };
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::{Map, Value, json};
    use speculoos::prelude::*;
    use tower::service_fn;

    use super::{Dispatcher, ErrorPolicy};
    use crate::{
        dispatch::{CallOutcome, CallRequest, ErrorKind, ErrorReporter, ErrorState},
        registry::{DocumentRegistry, OperationKind},
    };

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    fn data(value: Value) -> Map<String, Value> {
        vars(value)
    }

    #[fixture]
    fn registry() -> Arc<DocumentRegistry> {
        Arc::new(
            DocumentRegistry::builder()
                .source("products", "query Products { products { id name } }")
                .and_then(|b| {
                    b.source(
                        "product",
                        "query Product($id: Int!) { product(id: $id) { id name } }",
                    )
                })
                .and_then(|b| b.source("brands", "query Brands { brands { id name } }"))
                .and_then(|b| b.source("broken", "query Broken { broken }"))
                .and_then(|b| b.source("down", "query Down { down }"))
                .and_then(|b| {
                    b.source(
                        "addToCart",
                        "mutation AddToCart($id: Int!) { addToCart(id: $id) { id } }",
                    )
                })
                .unwrap()
                .build(),
        )
    }

    /// A stand-in server. `Products` answers slowly so that completion order
    /// differs from request order.
    fn answer(request: GraphQLRequest) -> Result<GraphQLResponse, GraphQLServiceError> {
        let id = request.variables.get("id").cloned().unwrap_or(Value::Null);
        let response = match request.operation_name.as_deref() {
            Some("Products") => {
                json!({ "data": { "products": [{ "id": 1, "name": "iPhone 8" }] } })
            }
            Some("Product") => json!({ "data": { "product": { "id": id, "name": "iPhone 8" } } }),
            Some("Brands") => json!({
                "data": { "brands": [{ "id": 1, "name": "Apple" }], "products": "from brands" }
            }),
            Some("AddToCart") => json!({ "data": { "addToCart": { "id": id } } }),
            Some("Broken") => json!({
                "data": { "broken": null },
                "errors": [
                    { "message": "E1", "path": ["broken"] },
                    { "message": "E2" }
                ]
            }),
            _ => {
                return Err(GraphQLServiceError::UpstreamService(
                    "connection refused".into(),
                ))
            }
        };
        Ok(serde_json::from_value(response).unwrap())
    }

    fn mock_transport(calls: Arc<AtomicUsize>) -> GraphQLTransport {
        GraphQLTransport::new(service_fn(move |request: GraphQLRequest| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if request.operation_name.as_deref() == Some("Products") {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                answer(request)
            }
        }))
    }

    #[fixture]
    fn dispatcher(registry: Arc<DocumentRegistry>) -> Dispatcher {
        Dispatcher::new(registry, mock_transport(Arc::default()))
    }

    #[rstest]
    #[tokio::test]
    async fn a_successful_call_has_no_errors(dispatcher: Dispatcher) {
        let result = dispatcher
            .execute_one(OperationKind::Query, "product", vars(json!({ "id": 7 })))
            .await;

        assert_that!(result.errors).is_empty();
        assert_that!(result.data)
            .is_some()
            .is_equal_to(data(json!({ "product": { "id": 7, "name": "iPhone 8" } })));
    }

    #[rstest]
    #[tokio::test]
    async fn transport_failures_resolve_to_errors(dispatcher: Dispatcher) {
        let result = dispatcher
            .execute_one(OperationKind::Query, "down", Variables::new())
            .await;

        assert_that!(result.data).is_none();
        assert_that!(result.errors).has_length(1);
        assert_that!(result.errors[0].kind).is_equal_to(ErrorKind::Transport);
        assert_that!(result.root_error())
            .is_some()
            .contains("connection refused");
    }

    #[rstest]
    #[case::unknown_query(OperationKind::Query, "telcos")]
    #[case::wrong_kind(OperationKind::Mutation, "products")]
    #[tokio::test]
    async fn unknown_documents_fail_without_a_request(
        registry: Arc<DocumentRegistry>,
        #[case] kind: OperationKind,
        #[case] name: &str,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(registry, mock_transport(calls.clone()));

        let result = dispatcher.execute_one(kind, name, Variables::new()).await;

        assert_that!(result.data).is_none();
        assert_that!(result.errors[0].kind).is_equal_to(ErrorKind::Lookup);
        assert_that!(calls.load(Ordering::SeqCst)).is_equal_to(0);
    }

    #[rstest]
    #[case::policy_none(ErrorPolicy::None, None)]
    #[case::policy_all(ErrorPolicy::All, Some(json!({ "broken": null })))]
    #[tokio::test]
    async fn graphql_errors_pass_through(
        dispatcher: Dispatcher,
        #[case] policy: ErrorPolicy,
        #[case] expected_data: Option<Value>,
    ) {
        let result = dispatcher
            .with_error_policy(policy)
            .execute_one(OperationKind::Query, "broken", Variables::new())
            .await;

        assert_that!(result.data.map(Value::Object)).is_equal_to(expected_data);
        let messages = result.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>();
        assert_that!(messages).is_equal_to(vec!["E1", "E2"]);
        assert_that!(result.errors.iter().all(|e| e.kind == ErrorKind::GraphQL)).is_true();
    }

    #[rstest]
    #[tokio::test]
    async fn list_results_keep_request_order(dispatcher: Dispatcher) {
        // `products` finishes after `product`
        let outcome = dispatcher
            .call(
                OperationKind::Query,
                CallRequest::list_with_variables(
                    ["products", "product"],
                    vec![Variables::new(), vars(json!({ "id": 1 }))],
                ),
            )
            .await;

        let results = outcome.into_many().unwrap();
        assert_that!(results).has_length(2);
        assert_eq!(
            results[0].data,
            Some(data(json!({ "products": [{ "id": 1, "name": "iPhone 8" }] })))
        );
        assert_eq!(
            results[1].data,
            Some(data(json!({ "product": { "id": 1, "name": "iPhone 8" } })))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn many_never_fails_as_a_whole(dispatcher: Dispatcher) {
        let results = dispatcher
            .execute_many(
                OperationKind::Query,
                vec![
                    ("down".to_string(), Variables::new()),
                    ("nope".to_string(), Variables::new()),
                    ("brands".to_string(), Variables::new()),
                ],
            )
            .await;

        let kinds = results
            .iter()
            .map(|result| result.errors.first().map(|error| error.kind))
            .collect::<Vec<_>>();
        assert_that!(kinds).is_equal_to(vec![
            Some(ErrorKind::Transport),
            Some(ErrorKind::Lookup),
            None,
        ]);
    }

    #[rstest]
    #[tokio::test]
    async fn single_names_give_a_single_outcome(dispatcher: Dispatcher) {
        let outcome = dispatcher
            .call(
                OperationKind::Mutation,
                CallRequest::with_variables("addToCart", vars(json!({ "id": 3 }))),
            )
            .await;

        assert_that!(outcome).is_equal_to(CallOutcome::Single(
            crate::dispatch::CallResult::success(data(json!({ "addToCart": { "id": 3 } }))),
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn aggregation_merges_and_later_documents_win(dispatcher: Dispatcher) {
        let state = ErrorState::new();
        let reporter = ErrorReporter::new().with_observer(Arc::new(state.clone()));

        let merged = dispatcher
            .call_aggregated(
                OperationKind::Query,
                CallRequest::named([
                    ("products", Variables::new()),
                    ("brands", Variables::new()),
                ]),
                &reporter,
            )
            .await;

        assert_eq!(
            Value::Object(merged),
            json!({
                "products": "from brands",
                "brands": [{ "id": 1, "name": "Apple" }]
            })
        );
        // only single-document calls report
        assert_that!(state.errors()).is_empty();
    }

    #[rstest]
    #[tokio::test]
    async fn single_aggregation_reports_errors(dispatcher: Dispatcher) {
        let state = ErrorState::new();
        let reporter = ErrorReporter::new().with_observer(Arc::new(state.clone()));

        let merged = dispatcher
            .call_aggregated(OperationKind::Query, CallRequest::single("broken"), &reporter)
            .await;

        assert_that!(merged.is_empty()).is_true();
        assert_that!(state.errors()).has_length(2);
        assert_that!(state.root_message()).is_equal_to(Some("E2".to_string()));
    }

    #[rstest]
    #[tokio::test]
    async fn repeated_calls_execute_again(registry: Arc<DocumentRegistry>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(registry, mock_transport(calls.clone()));

        let first = dispatcher.call(OperationKind::Query, "brands".into()).await;
        let second = dispatcher.call(OperationKind::Query, "brands".into()).await;

        assert_that!(first).is_equal_to(second);
        assert_that!(calls.load(Ordering::SeqCst)).is_equal_to(2);
    }

    #[rstest]
    fn dispatchers_can_be_shared_across_tasks(dispatcher: Dispatcher) {
        fn is_send_sync<T: Send + Sync>(_: &T) {}
        fn is_send<T: Send>(_: T) {}

        is_send_sync(&dispatcher);
        is_send(dispatcher.call(OperationKind::Query, CallRequest::list(["products", "brands"])));
    }
}
