use std::pin::Pin;

use buildstructor::buildstructor;
use futures::Future;
use http_body_util::Full;
use reqwest::ClientBuilder;
use tower::{Service, ServiceBuilder, timeout::TimeoutLayer, util::BoxCloneSyncService};

use crate::{
    HttpRequest, HttpResponse, HttpService, HttpServiceConfig, HttpServiceError, HttpServiceFactory,
    body::body_to_bytes,
};

/// Constructs [`HttpService`]s that share one [`reqwest::Client`]
#[derive(Clone, Debug)]
pub struct ReqwestServiceFactory {
    config: HttpServiceConfig,
    client: reqwest::Client,
}

impl ReqwestServiceFactory {
    /// Builds the shared client from `config`
    pub fn new(config: HttpServiceConfig) -> Result<ReqwestServiceFactory, HttpServiceError> {
        let client = client_from_config(&config)?;
        Ok(ReqwestServiceFactory { config, client })
    }
}

impl HttpServiceFactory for ReqwestServiceFactory {
    fn create(&self) -> Result<HttpService, HttpServiceError> {
        let service = ReqwestService::builder()
            .config(self.config.clone())
            .client(self.client.clone())
            .build()
            .map_err(HttpServiceError::from)?;
        Ok(HttpService::new(service))
    }
}

fn client_from_config(config: &HttpServiceConfig) -> Result<reqwest::Client, reqwest::Error> {
    ClientBuilder::new()
        .danger_accept_invalid_certs(config.accept_invalid_certificates().unwrap_or_default())
        .danger_accept_invalid_hostnames(config.accept_invalid_hostnames().unwrap_or_default())
        .build()
}

/// A [`Service`] that wraps a [`reqwest`] client and uses [`http`] constructs for requests and
/// responses
#[derive(Clone, Debug)]
pub struct ReqwestService {
    client: BoxCloneSyncService<reqwest::Request, reqwest::Response, HttpServiceError>,
}

#[buildstructor]
impl ReqwestService {
    /// Constructs a new [`ReqwestService`]
    #[builder]
    pub fn new(
        config: Option<HttpServiceConfig>,
        client: Option<reqwest::Client>,
    ) -> Result<ReqwestService, reqwest::Error> {
        let config = config.unwrap_or_default();
        let client = match client {
            Some(client) => client,
            None => client_from_config(&config)?,
        };
        let client = BoxCloneSyncService::new(
            ServiceBuilder::new()
                .map_err(HttpServiceError::from)
                .option_layer((*config.timeout()).map(TimeoutLayer::new))
                .map_err(|err: reqwest::Error| -> tower::BoxError { err.into() })
                .service(client),
        );
        Ok(ReqwestService { client })
    }
}

impl From<reqwest::Error> for HttpServiceError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_body() {
            HttpServiceError::Body(value.into())
        } else if value.is_connect() {
            HttpServiceError::Connect(value.into())
        } else if value.is_timeout() {
            HttpServiceError::TimedOut(value.into())
        } else if value.is_decode() {
            HttpServiceError::Decode(value.into())
        } else {
            HttpServiceError::Unexpected(value.into())
        }
    }
}

impl Service<HttpRequest> for ReqwestService {
    type Response = HttpResponse;
    type Error = HttpServiceError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.client.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        let mut client =
            artemis_tower::service::take_ready_service::<_, reqwest::Request>(&mut self.client);
        let fut = async move {
            let bytes = body_to_bytes(&mut req)
                .await
                .map_err(|err| HttpServiceError::Body(Box::new(err)))?;
            let body = reqwest::Body::from(bytes);
            let req = reqwest::Request::try_from(req.map(move |_| body))?;
            tracing::trace!(method = %req.method(), url = %req.url(), "sending request");
            let mut resp = http::Response::from(client.call(req).await?);
            let bytes = body_to_bytes(&mut resp)
                .await
                .map_err(|err| HttpServiceError::Body(Box::new(err)))?;
            Ok(resp.map(|_| Full::new(bytes)))
        };
        Box::pin(fut)
    }
}

impl From<ReqwestService> for HttpService {
    fn from(value: ReqwestService) -> Self {
        HttpService::new(value)
    }
}
