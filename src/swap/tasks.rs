use anyhow::{Context as _, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lightning::IncomingPayment;

use super::recovery::RecoveryReport;
use super::service::SwapService;

/// Consumes settled incoming payments until the channel closes or the
/// service shuts down. A failing event is logged and skipped.
pub async fn run_invoice_listener(service: SwapService, mut rx: mpsc::Receiver<IncomingPayment>) {
    let shutdown = service.shutdown_token();
    loop {
        let payment = tokio::select! {
            _ = shutdown.cancelled() => break,
            payment = rx.recv() => match payment {
                Some(payment) => payment,
                None => break,
            },
        };

        if let Err(err) = service.handle_invoice_paid(&payment).await {
            tracing::warn!(
                wallet = %payment.wallet,
                payment_hash = %payment.payment_hash,
                error = %err,
                "invoice paid handler failed"
            );
        }
    }
    tracing::debug!("invoice listener stopped");
}

/// Background work of a running swap service: the startup recovery scan and
/// the incoming-payment listener.
pub struct SwapTasks {
    service: SwapService,
    recovery: JoinHandle<Option<RecoveryReport>>,
    listener: JoinHandle<()>,
}

impl SwapTasks {
    pub fn start(service: SwapService, incoming: mpsc::Receiver<IncomingPayment>) -> Self {
        let recovery = tokio::spawn({
            let service = service.clone();
            async move {
                let shutdown = service.shutdown_token();
                tokio::select! {
                    _ = shutdown.cancelled() => None,
                    report = service.run_recovery_scan() => Some(report),
                }
            }
        });
        let listener = tokio::spawn(run_invoice_listener(service.clone(), incoming));

        tracing::info!("swap tasks started");
        Self {
            service,
            recovery,
            listener,
        }
    }

    pub fn service(&self) -> &SwapService {
        &self.service
    }

    /// Cancels all swap work and waits for it to wind down. Interrupted swaps
    /// stay pending and are picked up by the next recovery scan.
    pub async fn stop(self) -> Result<Option<RecoveryReport>> {
        self.service.shutdown.cancel();

        let report = self.recovery.await.context("join recovery scan")?;
        self.listener.await.context("join invoice listener")?;

        self.service.tracker.close();
        self.service.tracker.wait().await;

        tracing::info!("swap tasks stopped");
        Ok(report)
    }
}
