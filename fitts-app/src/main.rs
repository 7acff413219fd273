mod app;
mod cli;

use app::App;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.session_config()?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    tracing::info!(
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        seed = config.seed,
        targets = config.total_experiment_targets(),
        "starting Fitts' law session"
    );

    let app = App::new(config)?;
    app.run()
}
