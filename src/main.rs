//! crmsync CLI binary entry point.

use clap::Parser;
use crmsync::cli::{AuthCommands, Cli, Commands};
use crmsync::config::CrmConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crmsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match CrmConfig::from_env() {
        Ok(config) => match cli.command {
            Commands::Auth(auth_args) => match auth_args.command {
                AuthCommands::Bootstrap(args) => {
                    crmsync::cli::auth::handle_bootstrap(&config, args).await
                }
                AuthCommands::Status => crmsync::cli::auth::handle_status(&config).await,
                AuthCommands::Logout => crmsync::cli::auth::handle_logout(&config),
            },
            Commands::Reconcile(args) => {
                crmsync::cli::reconcile::handle_reconcile(&config, args).await
            }
        },
        Err(err) => Err(err),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        if let Some(hint) = e.recovery_suggestion().hint() {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}
