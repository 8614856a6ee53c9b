use std::process;

use anyhow::Result;
use artemis::cli::Artemis;
use clap::Parser;

fn main() {
    if let Err(error) = run() {
        tracing::debug!(?error);
        eprintln!("error: {error:#}");
        process::exit(1)
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let app = Artemis::parse();
    timber::init(app.log_level);
    tracing::trace!(command_structure = ?app);

    let output = app.run().await?;
    output.print()?;
    Ok(())
}
