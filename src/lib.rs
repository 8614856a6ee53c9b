//! Named GraphQL documents over a batched or direct HTTP transport.
//!
//! ```no_run
//! # async fn demo() -> Result<(), artemis::ArtemisError> {
//! use artemis::{ArtemisClient, ArtemisConfig, CallRequest, Side};
//! use url::Url;
//!
//! let config = ArtemisConfig::new(
//!     Url::parse("http://api.internal:4000/graphql").unwrap(),
//!     Url::parse("http://localhost:3000/graphql").unwrap(),
//! );
//! let client = ArtemisClient::builder()
//!     .config(config)
//!     .side(Side::Client)
//!     .build()?;
//! let _data = client.q(CallRequest::list(["products", "brands"])).await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod client;
mod config;
pub mod dispatch;
pub mod env;
mod error;
mod output;
pub mod registry;

pub use artemis_graphql::{BatchResponseFormat, Side, Variables};
pub use client::ArtemisClient;
pub use config::{ArtemisConfig, BatchSettings, CONFIG_FILE_NAME};
pub use dispatch::{CallOutcome, CallRequest, CallResult, ErrorInfo, ErrorKind, ErrorPolicy};
pub use error::ArtemisError;
pub use output::ArtemisOutput;

pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
