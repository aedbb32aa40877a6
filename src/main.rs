mod actions;
mod ai;
mod app;
mod auth;
mod config;
mod console;
mod domain;
mod gmail;
mod infrastructure;
mod sync;
mod tasks;
#[cfg(test)]
mod testing;

use anyhow::Result;
use infrastructure::{directories, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (shutdown, _) = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let app = app::SpamSnifferApp::initialize(config, shutdown.clone()).await?;
    app.run().await
}
