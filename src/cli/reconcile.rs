//! CLI handler for `crmsync reconcile`.

use crate::config::CrmConfig;
use crate::error::Result;
use crate::reconcile::{CustomerRecord, Reconciler};

use super::{ReconcileArgs, Services};

pub async fn handle_reconcile(config: &CrmConfig, args: ReconcileArgs) -> Result<()> {
    let customer = CustomerRecord::new(args.name, args.email, args.phone)?;
    let services = Services::connect(config)?;
    services.manager.initialize().await?;

    let outcome = Reconciler::new(services.client).reconcile(&customer).await?;
    println!("{outcome}");
    Ok(())
}
