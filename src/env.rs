use std::collections::HashMap;
use std::{env, fmt, io};

use heck::ToShoutySnakeCase;

/// ArtemisEnv reads the environment variables artemis respects. Tests use a
/// private store instead of the process environment so they can run in
/// parallel without leaking into each other.
#[derive(Debug, Clone)]
pub struct ArtemisEnv {
    mock_store: Option<HashMap<String, String>>,
}

impl Default for ArtemisEnv {
    fn default() -> ArtemisEnv {
        ArtemisEnv::new()
    }
}

impl ArtemisEnv {
    /// creates a new environment variable store
    pub fn new() -> ArtemisEnv {
        let mock_store = if cfg!(test) {
            Some(HashMap::new())
        } else {
            None
        };

        ArtemisEnv { mock_store }
    }

    /// returns the value of the environment variable if it exists
    pub fn get(&self, key: ArtemisEnvKey) -> io::Result<Option<String>> {
        let key_str = key.to_string();
        tracing::trace!("Checking for ${}", &key_str);
        let result = match &self.mock_store {
            Some(mock_store) => Ok(mock_store.get(&key_str).cloned()),
            None => match env::var(&key_str) {
                Ok(data) => Ok(Some(data)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(env::VarError::NotUnicode(_)) => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "The value of the environment variable \"{}\" is not valid Unicode.",
                        &key_str
                    ),
                )),
            },
        }?;

        match &result {
            Some(value) => tracing::debug!("read environment variable ${} = {}", &key_str, value),
            None => tracing::trace!("could not find ${}", &key_str),
        }

        Ok(result)
    }

    /// sets a variable in the mock store; only available in tests
    #[cfg(test)]
    pub fn insert(&mut self, key: ArtemisEnvKey, value: &str) {
        if let Some(mock_store) = &mut self.mock_store {
            mock_store.insert(key.to_string(), value.into());
        }
    }
}

/// ArtemisEnvKey defines the environment variables that override values from
/// `artemis.toml`. Each is prefixed with `ARTEMIS_` and the suffix is the
/// variant name in SHOUTY_SNAKE_CASE, so `ArtemisEnvKey::ServerUri` reads
/// `ARTEMIS_SERVER_URI`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArtemisEnvKey {
    ServerUri,
    BrowserUri,
    GraphqlFolder,
    Batching,
}

impl fmt::Display for ArtemisEnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dbg = format!("{:?}", self).to_shouty_snake_case();
        write!(f, "ARTEMIS_{}", &dbg)
    }
}
