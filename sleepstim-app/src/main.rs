mod app;
mod cli;
mod outputs;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use app::App;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --verbose wins over RUST_LOG
    let filter = match cli.verbose.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = App::new(cli)?;
    app.run()?;

    Ok(())
}
