use std::collections::HashMap;

use artemis_graphql::GraphQLServiceError;
use graphql_client::{Location, PathFragment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::OperationKind;

/// Where an error came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The named document is not registered. A programming error.
    #[serde(rename = "lookup")]
    Lookup,
    /// No GraphQL response came back. Worth retrying.
    #[serde(rename = "transport")]
    Transport,
    /// The server answered with a GraphQL error
    #[serde(rename = "graphql")]
    GraphQL,
}

/// One error attached to a [`CallResult`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    /// Field the error belongs to. Errors without one are root errors.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<Vec<PathFragment>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub locations: Option<Vec<Location>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extensions: Option<HashMap<String, Value>>,
    pub kind: ErrorKind,
}

impl ErrorInfo {
    pub(crate) fn lookup(kind: OperationKind, name: &str) -> ErrorInfo {
        ErrorInfo::root(
            format!("No {kind} named '{name}' is registered."),
            ErrorKind::Lookup,
        )
    }

    pub(crate) fn transport(error: &GraphQLServiceError) -> ErrorInfo {
        ErrorInfo::root(error.to_string(), ErrorKind::Transport)
    }

    fn root(message: String, kind: ErrorKind) -> ErrorInfo {
        ErrorInfo {
            message,
            path: None,
            locations: None,
            extensions: None,
            kind,
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_none()
    }
}

impl From<graphql_client::Error> for ErrorInfo {
    fn from(error: graphql_client::Error) -> Self {
        ErrorInfo {
            message: error.message,
            path: error.path,
            locations: error.locations,
            extensions: error.extensions,
            kind: ErrorKind::GraphQL,
        }
    }
}

/// The outcome of executing one document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub data: Option<Map<String, Value>>,
    pub errors: Vec<ErrorInfo>,
}

impl CallResult {
    pub fn success(data: Map<String, Value>) -> CallResult {
        CallResult {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<ErrorInfo>) -> CallResult {
        CallResult { data: None, errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The message of the first root error, see [`root_error`]
    pub fn root_error(&self) -> Option<&str> {
        root_error(&self.errors)
    }
}

/// What a call produced: one result for a single document, one per document otherwise
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallOutcome {
    Single(CallResult),
    Many(Vec<CallResult>),
}

impl CallOutcome {
    pub fn into_single(self) -> Option<CallResult> {
        match self {
            CallOutcome::Single(result) => Some(result),
            CallOutcome::Many(_) => None,
        }
    }

    pub fn into_many(self) -> Option<Vec<CallResult>> {
        match self {
            CallOutcome::Many(results) => Some(results),
            CallOutcome::Single(_) => None,
        }
    }
}

/// The message of the first error without a path, if any
pub fn root_error(errors: &[ErrorInfo]) -> Option<&str> {
    errors
        .iter()
        .find(|error| error.is_root())
        .map(|error| error.message.as_str())
}

/// Shallow-merges the data of `results` in order. On a key collision the
/// later result wins. Results without data contribute nothing.
pub fn merge_data(results: &[CallResult]) -> Map<String, Value> {
    let mut merged = Map::new();
    for data in results.iter().filter_map(|result| result.data.as_ref()) {
        for (key, value) in data {
            if merged.insert(key.clone(), value.clone()).is_some() {
                tracing::warn!(key = %key, "merged results share a key, keeping the later value");
            }
        }
    }
    merged
}
