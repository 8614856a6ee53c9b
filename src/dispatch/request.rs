use artemis_graphql::Variables;
use indexmap::IndexMap;

/// Which documents a call runs, and with what variables
#[derive(Clone, Debug, PartialEq)]
pub enum CallRequest {
    /// One document
    Single { name: String, variables: Variables },
    /// Several documents with index-aligned variables. Names without a
    /// matching entry run with no variables; surplus entries are ignored.
    List {
        names: Vec<String>,
        variables: Vec<Variables>,
    },
    /// Several documents keyed by name, run in insertion order
    Named(IndexMap<String, Variables>),
}

/// A [`CallRequest`] flattened for execution
#[derive(Debug, PartialEq)]
pub(crate) enum Entries {
    One(String, Variables),
    Many(Vec<(String, Variables)>),
}

impl CallRequest {
    /// One document without variables
    pub fn single(name: impl Into<String>) -> CallRequest {
        CallRequest::with_variables(name, Variables::new())
    }

    /// One document with `variables`
    pub fn with_variables(name: impl Into<String>, variables: Variables) -> CallRequest {
        CallRequest::Single {
            name: name.into(),
            variables,
        }
    }

    /// Several documents, none with variables
    pub fn list<I, N>(names: I) -> CallRequest
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        CallRequest::list_with_variables(names, Vec::new())
    }

    /// Several documents with index-aligned `variables`
    pub fn list_with_variables<I, N>(names: I, variables: Vec<Variables>) -> CallRequest
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        CallRequest::List {
            names: names.into_iter().map(Into::into).collect(),
            variables,
        }
    }

    /// Several documents, each with its own variables
    pub fn named<I, N>(entries: I) -> CallRequest
    where
        I: IntoIterator<Item = (N, Variables)>,
        N: Into<String>,
    {
        CallRequest::Named(
            entries
                .into_iter()
                .map(|(name, variables)| (name.into(), variables))
                .collect(),
        )
    }

    pub(crate) fn into_entries(self) -> Entries {
        match self {
            CallRequest::Single { name, variables } => Entries::One(name, variables),
            CallRequest::List { names, variables } => {
                if variables.len() > names.len() {
                    tracing::debug!(
                        names = names.len(),
                        variables = variables.len(),
                        "ignoring surplus variables"
                    );
                }
                let mut variables = variables.into_iter();
                Entries::Many(
                    names
                        .into_iter()
                        .map(|name| (name, variables.next().unwrap_or_default()))
                        .collect(),
                )
            }
            CallRequest::Named(entries) => Entries::Many(entries.into_iter().collect()),
        }
    }
}

impl From<&str> for CallRequest {
    fn from(name: &str) -> Self {
        CallRequest::single(name)
    }
}

impl From<String> for CallRequest {
    fn from(name: String) -> Self {
        CallRequest::single(name)
    }
}
