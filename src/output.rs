use serde_json::{Map, Value};

use crate::dispatch::CallOutcome;

/// ArtemisOutput is everything a command prints. JSON goes to `stdout`,
/// anything meant for a person reading the terminal goes to `stderr`.
#[derive(Clone, PartialEq, Debug)]
pub enum ArtemisOutput {
    /// One result per document, as returned by `query` and `mutate`
    Results(CallOutcome),
    /// Aggregated data from `q` and `m`, plus the root error of a
    /// single-document call
    Data {
        data: Map<String, Value>,
        root_error: Option<String>,
    },
}

impl ArtemisOutput {
    pub fn print(&self) -> serde_json::Result<()> {
        match self {
            ArtemisOutput::Results(outcome) => {
                println!("{}", serde_json::to_string_pretty(outcome)?);
            }
            ArtemisOutput::Data { data, root_error } => {
                println!("{}", serde_json::to_string_pretty(data)?);
                if let Some(message) = root_error {
                    eprintln!("error: {message}");
                }
            }
        }
        Ok(())
    }
}
