use std::sync::Arc;

use anyhow::{Context, Result};
use artemis_graphql::{Side, Variables};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use timber::LogLevel;

use crate::{
    ArtemisClient, ArtemisConfig, ArtemisOutput, CONFIG_FILE_NAME, PKG_NAME, PKG_VERSION,
    dispatch::{CallRequest, ErrorObserver, ErrorState},
    env::ArtemisEnv,
};

#[derive(Debug, Parser)]
#[command(
    name = PKG_NAME,
    version = PKG_VERSION,
    about = "
Artemis - run named GraphQL documents

Documents live in the `queries/` and `mutations/` folders of the configured
graphql folder and are run by file name:

    $ artemis query products
    $ artemis q product --variables '{\"id\": 1}'
    $ artemis q --named '{\"brand\": {\"id\": 1}, \"telco\": {\"id\": 2}}'
"
)]
pub struct Artemis {
    #[command(subcommand)]
    pub command: Command,

    /// Specify artemis's log level
    #[arg(long = "log", short = 'l', global = true, value_enum, ignore_case = true)]
    pub log_level: Option<LogLevel>,

    /// Path to the configuration file
    #[arg(long, short = 'c', global = true, default_value = CONFIG_FILE_NAME)]
    pub config: Utf8PathBuf,

    /// Talk to `server_uri` directly instead of the batched `browser_uri`
    #[arg(long, global = true)]
    pub server: bool,

    #[arg(skip)]
    pub env_store: ArtemisEnv,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run queries and print one result per query
    Query(Execute),

    /// Run queries and print their merged data
    Q(Execute),

    /// Run mutations and print one result per mutation
    Mutate(Execute),

    /// Run mutations and print their merged data
    M(Execute),
}

/// Names the documents to run
#[derive(Debug, Args)]
pub struct Execute {
    /// Documents to run, by file name
    #[arg(required_unless_present = "named")]
    names: Vec<String>,

    /// JSON object of variables, given once per name in the same order
    #[arg(long, short = 'v', value_parser = parse_variables)]
    variables: Vec<Variables>,

    /// JSON object mapping document names to their variables
    #[arg(long, value_parser = parse_named, conflicts_with_all = ["names", "variables"])]
    named: Option<IndexMap<String, Variables>>,
}

impl Execute {
    fn request(&self) -> CallRequest {
        if let Some(named) = &self.named {
            return CallRequest::Named(named.clone());
        }
        match self.names.as_slice() {
            [name] if self.variables.len() <= 1 => CallRequest::with_variables(
                name,
                self.variables.first().cloned().unwrap_or_default(),
            ),
            names => {
                CallRequest::list_with_variables(names.iter().cloned(), self.variables.clone())
            }
        }
    }
}

fn parse_variables(value: &str) -> std::result::Result<Variables, String> {
    serde_json::from_str(value).map_err(|err| format!("expected a JSON object: {err}"))
}

fn parse_named(value: &str) -> std::result::Result<IndexMap<String, Variables>, String> {
    serde_json::from_str(value)
        .map_err(|err| format!("expected a JSON object of JSON objects: {err}"))
}

impl Artemis {
    pub async fn run(&self) -> Result<ArtemisOutput> {
        let config = ArtemisConfig::load(&self.config, &self.env_store)
            .with_context(|| format!("could not load '{}'", self.config))?;
        let side = if self.server {
            Side::Server
        } else {
            Side::Client
        };
        let errors = ErrorState::new();
        let client = ArtemisClient::builder()
            .config(config)
            .side(side)
            .observer(Arc::new(errors.clone()) as Arc<dyn ErrorObserver>)
            .build()?;

        let output = match &self.command {
            Command::Query(execute) => {
                ArtemisOutput::Results(client.query(execute.request()).await)
            }
            Command::Mutate(execute) => {
                ArtemisOutput::Results(client.mutate(execute.request()).await)
            }
            Command::Q(execute) => ArtemisOutput::Data {
                data: client.q(execute.request()).await,
                root_error: errors.root_message(),
            },
            Command::M(execute) => ArtemisOutput::Data {
                data: client.m(execute.request()).await,
                root_error: errors.root_message(),
            },
        };
        Ok(output)
    }
}
