#![warn(missing_docs)]

//! Provides [`tower`] implementations for the HTTP requests artemis sends

use std::{fmt::Debug, str::Utf8Error, time::Duration};

/// Installs ring as the default rustls crypto provider in every binary that
/// links artemis-http
#[ctor::ctor]
fn install_ring_crypto_provider() {
    // already installed is the only failure case
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();
}

use buildstructor::Builder;
use bytes::Bytes;
use derive_getters::Getters;
pub use http_body::Body;
pub use http_body_util::{BodyExt, Empty, Full};
use tower::{timeout::error::Elapsed, util::BoxCloneSyncService};

pub mod body;
mod error;
pub mod extend_headers;
mod reqwest;

pub use error::HttpServiceError;
pub use reqwest::{ReqwestService, ReqwestServiceFactory};

/// Ease-of-use synonym for the request type this crate operates on
pub type HttpRequest = http::Request<Full<Bytes>>;
/// Ease-of-use synonym for the response type this crate operates on
pub type HttpResponse<T = Full<Bytes>> = http::Response<T>;
/// Ease-of-use synonym for the [`tower::Service`] type this crate provides
pub type HttpService = BoxCloneSyncService<HttpRequest, HttpResponse, HttpServiceError>;

/// Creates [`HttpService`]s on demand.
///
/// Services must be `mut` to be called, so consumers hold a factory and
/// produce a fresh service per transport rather than sharing one client.
pub trait HttpServiceFactory {
    /// Produces an [`HttpService`]
    #[allow(clippy::result_large_err)]
    fn create(&self) -> Result<HttpService, HttpServiceError>;
}

/// Configuration object for constructing an [`HttpService`].
/// This is agnostic to the underlying implementation
#[derive(Clone, Debug, Builder, Default, Getters)]
pub struct HttpServiceConfig {
    accept_invalid_certificates: Option<bool>,
    accept_invalid_hostnames: Option<bool>,
    /// No timeout is applied when this is `None`
    timeout: Option<Duration>,
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HttpServiceError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        match err.downcast::<Elapsed>() {
            Ok(elapsed) => HttpServiceError::TimedOut(elapsed),
            Err(err) => match err.downcast::<HttpServiceError>() {
                Ok(err) => *err,
                Err(err) => match err.downcast::<::reqwest::Error>() {
                    Ok(err) => HttpServiceError::from(*err),
                    Err(err) => HttpServiceError::Unexpected(err),
                },
            },
        }
    }
}

impl From<Utf8Error> for HttpServiceError {
    fn from(value: Utf8Error) -> Self {
        HttpServiceError::Decode(Box::new(value))
    }
}
