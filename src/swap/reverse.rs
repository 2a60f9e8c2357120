use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use super::client::{ClaimRequest, SwapServiceClient};
use super::store::SwapStore;
use super::{ReverseSubmarineSwap, SwapStatus, finish_swap};
use crate::lightning::{LightningGateway, PaymentRequest, PaymentTags};

/// How a reverse swap run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseSwapOutcome {
    /// The hold invoice settled.
    Completed,
    /// The payment or the claim failed; the swap is marked failed.
    Failed,
    /// Shutdown interrupted the run; the swap stays pending for recovery.
    Interrupted,
}

pub(crate) fn claim_request(swap: &ReverseSubmarineSwap) -> ClaimRequest {
    ClaimRequest {
        asset: swap.asset,
        boltz_id: swap.boltz_id.clone(),
        privkey: swap.claim_privkey.clone(),
        preimage: swap.preimage.clone(),
        lockup_address: swap.lockup_address.clone(),
        receive_address: swap.onchain_address.clone(),
        redeem_script: swap.redeem_script.clone(),
        zeroconf: swap.instant_settlement,
        feerate: swap.feerate.then_some(swap.feerate_value).flatten(),
        blinding_key: swap.blinding_key.clone(),
    }
}

/// Runs the claim and the hold-invoice payment of a reverse swap side by side.
///
/// The hold invoice only settles once the claim transaction reveals the
/// preimage, and the lockup only appears after the payment is in flight, so
/// both tasks are spawned before either is awaited.
pub async fn execute_reverse_swap(
    client: Arc<dyn SwapServiceClient>,
    gateway: Arc<dyn LightningGateway>,
    store: Arc<dyn SwapStore>,
    swap: ReverseSubmarineSwap,
    shutdown: CancellationToken,
) -> ReverseSwapOutcome {
    let swap_id = swap.id.clone();

    let mut claim = tokio::spawn({
        let request = claim_request(&swap);
        async move { client.claim(&request).await }
    });

    let mut pay = tokio::spawn({
        let request = PaymentRequest {
            wallet: swap.wallet.clone(),
            payment_request: swap.invoice.clone(),
            memo: format!(
                "reverse swapped {}: {} sats on boltz.exchange",
                swap.asset, swap.onchain_amount
            ),
            tags: PaymentTags::reverse_swap(&swap.id),
        };
        async move { gateway.pay_invoice(&request).await }
    });

    tracing::info!(%swap_id, boltz_id = %swap.boltz_id, "reverse swap started");

    let mut claim_done = false;
    loop {
        // A settled payment wins over a shutdown arriving in the same poll.
        tokio::select! {
            biased;

            res = &mut pay => {
                return match res {
                    Ok(Ok(_preimage)) => {
                        // An unfinished claim keeps running detached.
                        finish_swap(store.as_ref(), &swap_id, SwapStatus::Complete);
                        ReverseSwapOutcome::Completed
                    }
                    Ok(Err(err)) => {
                        claim.abort();
                        tracing::warn!(%swap_id, error = %err, "reverse swap payment failed");
                        finish_swap(store.as_ref(), &swap_id, SwapStatus::Failed);
                        ReverseSwapOutcome::Failed
                    }
                    Err(err) => {
                        claim.abort();
                        on_join_error(store.as_ref(), &swap_id, "pay", err)
                    }
                };
            }
            _ = shutdown.cancelled() => {
                pay.abort();
                claim.abort();
                tracing::info!(%swap_id, "reverse swap interrupted by shutdown");
                return ReverseSwapOutcome::Interrupted;
            }
            res = &mut claim, if !claim_done => {
                claim_done = true;
                match res {
                    Ok(Ok(txid)) => {
                        tracing::info!(%swap_id, claim_txid = %txid, "reverse swap claimed");
                    }
                    Ok(Err(err)) => {
                        pay.abort();
                        tracing::warn!(%swap_id, error = %err, "reverse swap claim failed");
                        finish_swap(store.as_ref(), &swap_id, SwapStatus::Failed);
                        return ReverseSwapOutcome::Failed;
                    }
                    Err(err) => {
                        pay.abort();
                        return on_join_error(store.as_ref(), &swap_id, "claim", err);
                    }
                }
            }
        }
    }
}

fn on_join_error(
    store: &dyn SwapStore,
    swap_id: &str,
    task: &str,
    err: JoinError,
) -> ReverseSwapOutcome {
    if err.is_cancelled() {
        tracing::info!(%swap_id, task, "reverse swap task cancelled");
        return ReverseSwapOutcome::Interrupted;
    }
    tracing::error!(%swap_id, task, error = %err, "reverse swap task panicked");
    finish_swap(store, swap_id, SwapStatus::Failed);
    ReverseSwapOutcome::Failed
}
