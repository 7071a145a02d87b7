use clap::Parser;
use commands::Command;

pub use color_eyre::Result;

mod auth;
mod commands;
mod http_server;
pub mod state;

pub(crate) use state::{AppConfig, AppState};

const DEFAULT_LOG_FILTER: &str = "warn,mealplan=debug,db=debug,tower_http=debug";

#[derive(Parser)]
#[command(author, version, about)]
struct CliArgs {
    #[clap(subcommand)]
    command: Option<Command>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?
        .block_on(run_cli())
}

async fn run_cli() -> Result<()> {
    tracing_common::setup_tracing(DEFAULT_LOG_FILTER)?;

    let cli = CliArgs::parse();
    let command = cli.command.unwrap_or_default();

    command.run().await
}
