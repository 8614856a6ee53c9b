/// Errors produced while sending a request over HTTP
#[derive(thiserror::Error, Debug)]
pub enum HttpServiceError {
    /// The request could not be assembled
    #[error("HTTP error: {:?}", .0)]
    Http(#[from] http::Error),
    /// The request did not complete within the configured timeout
    #[error("Request timed out: {:?}", .0)]
    TimedOut(Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The response body could not be decoded
    #[error("Decode error: {:?}", .0)]
    Decode(Box<dyn std::error::Error + Send + Sync + 'static>),
    /// Reading or writing a body failed
    #[error("Body error: {:?}", .0)]
    Body(Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The connection to the server could not be established
    #[error("Connect error: {:?}", .0)]
    Connect(Box<dyn std::error::Error + Send + Sync + 'static>),
    /// Anything else the underlying client reported
    #[error("Unexpected HTTP error: {:?}", .0)]
    Unexpected(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl HttpServiceError {
    /// Whether the server could not be reached at all
    pub fn is_connect(&self) -> bool {
        matches!(self, HttpServiceError::Connect(_))
    }
    /// Whether the request ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpServiceError::TimedOut(_))
    }
    /// Whether the response could not be decoded
    pub fn is_decode(&self) -> bool {
        matches!(self, HttpServiceError::Decode(_))
    }
}
