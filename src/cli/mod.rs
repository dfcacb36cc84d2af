//! CLI entry point for crmsync.

pub mod auth;
pub mod reconcile;

use clap::{Parser, Subcommand};

pub use crate::service::Services;

/// crmsync CLI
#[derive(Parser, Debug)]
#[command(name = "crmsync", version, about = "Keep CRM contacts in sync with customer records")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Credential management
    Auth(AuthArgs),
    /// Create or update the contact for one customer
    Reconcile(ReconcileArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands for bootstrap, status, and logout.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Exchange an authorization code for the initial token pair
    Bootstrap(BootstrapArgs),
    /// Show credential status
    Status,
    /// Forget the stored credential
    Logout,
}

/// Arguments for `crmsync auth bootstrap`.
#[derive(Parser, Debug)]
pub struct BootstrapArgs {
    /// Authorization code from the integration settings page
    #[arg(long)]
    pub code: String,

    /// Redirect URI registered for the integration (defaults to CRM_REDIRECT_URI)
    #[arg(long)]
    pub redirect_uri: Option<String>,
}

/// Arguments for `crmsync reconcile`.
#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub phone: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
