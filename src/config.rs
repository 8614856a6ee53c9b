use std::{collections::BTreeMap, fs, str::FromStr, time::Duration};

use artemis_graphql::{BatchConfig, BatchResponseFormat, DEFAULT_INTERVAL_MS, TransportSelector};
use artemis_http::HttpServiceConfig;
use camino::{Utf8Path, Utf8PathBuf};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ArtemisError, ErrorPolicy,
    env::{ArtemisEnv, ArtemisEnvKey},
};

/// Default name of the configuration file
pub const CONFIG_FILE_NAME: &str = "artemis.toml";

const DEFAULT_GRAPHQL_FOLDER: &str = "graphql";

/// Everything needed to construct an [`ArtemisClient`](crate::ArtemisClient)
///
/// ```toml
/// server_uri = "http://api.internal:4000/graphql"
/// browser_uri = "http://localhost:3000/graphql"
/// graphql_folder = "graphql"
/// batching = true
///
/// [batch]
/// max_size = 10
/// interval_ms = 10
/// format = "payload"
///
/// [headers]
/// x-client-name = "storefront"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtemisConfig {
    /// Endpoint used when running on the server side
    pub server_uri: Url,
    /// Endpoint used when running on the client side
    #[serde(alias = "local_uri")]
    pub browser_uri: Url,
    /// Folder holding the `queries/` and `mutations/` documents
    #[serde(default = "default_graphql_folder")]
    pub graphql_folder: Utf8PathBuf,
    /// Whether the client side batches concurrent operations
    #[serde(default = "default_batching")]
    pub batching: bool,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Touch then reset the attached validation state when a call fails
    #[serde(default)]
    pub reset_validation: bool,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-request HTTP timeout; requests never time out when unset
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// The `[batch]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BatchSettings {
    pub max_size: usize,
    pub interval_ms: u64,
    pub format: BatchResponseFormat,
}

impl Default for BatchSettings {
    fn default() -> Self {
        let defaults = BatchConfig::default();
        BatchSettings {
            max_size: defaults.max_size,
            interval_ms: DEFAULT_INTERVAL_MS,
            format: defaults.format,
        }
    }
}

fn default_graphql_folder() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_GRAPHQL_FOLDER)
}

const fn default_batching() -> bool {
    true
}

impl ArtemisConfig {
    /// A configuration with every optional setting at its default
    pub fn new(server_uri: Url, browser_uri: Url) -> ArtemisConfig {
        ArtemisConfig {
            server_uri,
            browser_uri,
            graphql_folder: default_graphql_folder(),
            batching: default_batching(),
            batch: BatchSettings::default(),
            error_policy: ErrorPolicy::default(),
            reset_validation: false,
            headers: BTreeMap::new(),
            timeout_ms: None,
        }
    }

    /// Reads `path` and applies environment overrides from `env`
    pub fn load(path: &Utf8Path, env: &ArtemisEnv) -> Result<ArtemisConfig, ArtemisError> {
        tracing::debug!(%path, "loading configuration");
        let contents = fs::read_to_string(path).map_err(|source| ArtemisError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = ArtemisConfig::from_str(&contents)?;
        config.apply_env(env)?;
        Ok(config)
    }

    /// Replaces values that have an `ARTEMIS_*` override set
    pub fn apply_env(&mut self, env: &ArtemisEnv) -> Result<(), ArtemisError> {
        if let Some(uri) = read_env(env, ArtemisEnvKey::ServerUri)? {
            self.server_uri = parse_env(ArtemisEnvKey::ServerUri, &uri)?;
        }
        if let Some(uri) = read_env(env, ArtemisEnvKey::BrowserUri)? {
            self.browser_uri = parse_env(ArtemisEnvKey::BrowserUri, &uri)?;
        }
        if let Some(folder) = read_env(env, ArtemisEnvKey::GraphqlFolder)? {
            self.graphql_folder = Utf8PathBuf::from(folder);
        }
        if let Some(batching) = read_env(env, ArtemisEnvKey::Batching)? {
            self.batching = parse_env(ArtemisEnvKey::Batching, &batching)?;
        }
        Ok(())
    }

    /// The batching tuning, or `None` when batching is off
    pub fn batch_config(&self) -> Option<BatchConfig> {
        self.batching.then(|| BatchConfig {
            max_size: self.batch.max_size,
            interval: Duration::from_millis(self.batch.interval_ms),
            format: self.batch.format,
        })
    }

    /// The configured headers as a [`HeaderMap`]
    pub fn header_map(&self) -> Result<HeaderMap, ArtemisError> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let invalid = || ArtemisError::InvalidHeader { name: name.clone() };
                Ok((
                    HeaderName::from_str(name).map_err(|_| invalid())?,
                    HeaderValue::from_str(value).map_err(|_| invalid())?,
                ))
            })
            .collect()
    }

    pub fn http_config(&self) -> HttpServiceConfig {
        HttpServiceConfig::builder()
            .and_timeout(self.timeout_ms.map(Duration::from_millis))
            .build()
    }

    /// The transport selector for these endpoints
    pub fn transport_selector(&self) -> Result<TransportSelector, ArtemisError> {
        Ok(TransportSelector::builder()
            .server_endpoint(self.server_uri.clone())
            .client_endpoint(self.browser_uri.clone())
            .and_batch(self.batch_config())
            .headers(self.header_map()?)
            .build())
    }
}

impl FromStr for ArtemisConfig {
    type Err = ArtemisError;
    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(contents)?)
    }
}

fn read_env(env: &ArtemisEnv, key: ArtemisEnvKey) -> Result<Option<String>, ArtemisError> {
    env.get(key).map_err(|err| ArtemisError::InvalidEnvValue {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

fn parse_env<T>(key: ArtemisEnvKey, value: &str) -> Result<T, ArtemisError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ArtemisError::InvalidEnvValue {
        key: key.to_string(),
        reason: err.to_string(),
    })
}
