mod app;
mod config;
mod plugins;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use utils::version;

use crate::config::Cli;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = utils::logging::init(cli.log_file.as_deref()).context("initialize logging")?;

    tracing::info!("Starting bolt client {}", &**version::VERSION);

    app::run(cli).await
}
