//! crmsync: OAuth credential lifecycle and contact reconciliation for the
//! amoCRM contacts API.
//!
//! A single [`auth::CredentialManager`] owns the token pair for the process.
//! It refreshes lazily on cache expiry, persists every rotated pair, and
//! collapses concurrent refreshes into one request. [`crm::CrmClient`] injects
//! its bearer token into contact API calls, and [`reconcile::Reconciler`]
//! creates or updates one contact per customer email.
//!
//! # Quick Start
//!
//! ```no_run
//! use crmsync::prelude::*;
//! use crmsync::service::Services;
//!
//! # async fn example() -> crmsync::error::Result<()> {
//! let config = CrmConfig::from_env()?;
//! let services = Services::connect(&config)?;
//! services.manager.initialize().await?;
//!
//! let customer = CustomerRecord::new("Ann", "ann@example.com", "+79990001122")?;
//! let outcome = Reconciler::new(services.client).reconcile(&customer).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod crm;
pub mod error;
pub mod prelude;
pub mod reconcile;
pub mod service;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
