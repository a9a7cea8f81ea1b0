//! Runs an extender until Ctrl-C or a fatal error, then shuts it down.

use std::future::Future;

use tracing::{error, info};

use chainextender_core::error::ExtenderError;

use crate::extender::Extender;

/// Run `extender` until Ctrl-C or a fatal error.
pub async fn supervise(extender: Extender) -> Result<(), ExtenderError> {
    supervise_until(extender, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run `extender` until `shutdown` resolves or the loop fails.
///
/// Workers are always drained before returning. A loop error takes
/// precedence over a fault reported while draining.
pub async fn supervise_until<S>(mut extender: Extender, shutdown: S) -> Result<(), ExtenderError>
where
    S: Future<Output = ()>,
{
    let outcome = tokio::select! {
        res = extender.run() => res,
        _ = shutdown => Ok(()),
    };
    match &outcome {
        Ok(()) => info!(height = extender.next_height(), "shutdown requested"),
        Err(e) => error!(error = %e, height = extender.next_height(), "extender stopped"),
    }
    let drained = extender.shutdown().await;
    outcome.and(drained)
}
