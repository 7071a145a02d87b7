use clap::Subcommand;

use crate::{AppConfig, AppState, Result};

pub(crate) mod info;

#[derive(Subcommand, Debug, Default, PartialEq, Eq)]
pub(crate) enum Command {
    /// Run the HTTP API.
    #[default]
    Serve,
    /// Apply database migrations and exit.
    Migrate,
    /// Print the resolved configuration.
    Info,
}

impl Command {
    pub(crate) async fn run(&self) -> Result<()> {
        let config = AppConfig::from_env()?;

        match self {
            Command::Serve => {
                let state = AppState::from_config(config).await?;
                crate::http_server::run_server(state).await
            }
            Command::Migrate => migrate(&config).await,
            Command::Info => {
                info::print_info(&config);
                Ok(())
            }
        }
    }
}

#[tracing::instrument(skip(config), err)]
async fn migrate(config: &AppConfig) -> Result<()> {
    let Some(database_url) = &config.database_url else {
        return Err(color_eyre::eyre::eyre!(
            "DATABASE_URL must be set to run migrations"
        ));
    };

    db::setup_db_pool(database_url).await?;
    tracing::info!("Migrations applied");

    Ok(())
}
