use clap::Parser;
use infrastructure::config::Config;
use presentation::cli::{Cli, CliApp};
use shared::telemetry::init_tracing;
use shared::types::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load()?;
    if let Some(url) = &cli.backend_url {
        config = config.with_backend_url(url.as_str());
    }

    let mut app = CliApp::new(config, &cli)?;
    app.run(cli).await?;
    Ok(())
}
