use std::io;

use artemis_graphql::GraphQLServiceError;
use artemis_http::HttpServiceError;
use camino::Utf8PathBuf;
use thiserror::Error;

use crate::registry::OperationKind;

/// Errors raised while assembling a client. Executing documents never fails
/// with one of these; call failures are reported inside `CallResult`.
#[derive(Error, Debug)]
pub enum ArtemisError {
    /// The configuration file could not be read
    #[error("Could not read configuration from '{path}'.")]
    ConfigRead {
        /// where we looked
        path: Utf8PathBuf,
        /// why it failed
        source: io::Error,
    },

    /// The configuration file is not valid TOML for [`ArtemisConfig`](crate::ArtemisConfig)
    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An environment override held a value that could not be used
    #[error("The value of ${key} is invalid: {reason}")]
    InvalidEnvValue {
        /// the variable name
        key: String,
        /// what was wrong with it
        reason: String,
    },

    /// A configured header name or value is not valid HTTP
    #[error("Invalid header '{name}'.")]
    InvalidHeader {
        /// the configured name
        name: String,
    },

    /// A document file could not be read
    #[error("Could not read GraphQL document '{path}'.")]
    DocumentRead {
        /// the file
        path: Utf8PathBuf,
        /// why it failed
        source: io::Error,
    },

    /// A document file does not parse as GraphQL
    #[error("'{path}' is not valid GraphQL: {message}")]
    InvalidDocument {
        /// the file
        path: Utf8PathBuf,
        /// parser diagnostics
        message: String,
    },

    /// A document file holds no operation to execute
    #[error("'{path}' does not define an operation.")]
    NoOperation {
        /// the file
        path: Utf8PathBuf,
    },

    /// A document was filed under the wrong kind
    #[error("'{path}' defines a {found} but is registered as a {expected}.")]
    KindMismatch {
        /// the file
        path: Utf8PathBuf,
        /// the kind of its folder
        expected: OperationKind,
        /// the kind of its first operation
        found: OperationKind,
    },

    /// Two documents of the same kind share a name
    #[error("More than one {kind} is named '{name}'.")]
    DuplicateDocument {
        /// the kind both documents share
        kind: OperationKind,
        /// the shared name
        name: String,
    },

    /// The HTTP client could not be built
    #[error(transparent)]
    Http(#[from] HttpServiceError),

    /// The selected transport could not be started
    #[error(transparent)]
    Transport(#[from] GraphQLServiceError),
}
