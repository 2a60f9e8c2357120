use serde::Serialize;

use super::error::ServiceError;
use super::reverse::claim_request;
use super::service::{SwapService, refund_request};
use super::{ReverseSubmarineSwap, SubmarineSwap, SwapStatus, finish_swap};

/// Per-outcome counts of one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub completed: usize,
    pub refunded: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

impl RecoveryReport {
    fn record(&mut self, outcome: Recovered) {
        match outcome {
            Recovered::Status(SwapStatus::Complete) => self.completed += 1,
            Recovered::Status(SwapStatus::Refunded) => self.refunded += 1,
            Recovered::Status(SwapStatus::Failed) => self.failed += 1,
            Recovered::Status(SwapStatus::Pending) => self.still_pending += 1,
            Recovered::Error => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Recovered {
    Status(SwapStatus),
    Error,
}

impl SwapService {
    /// Reconciles every pending swap with the remote service and the wallet.
    ///
    /// Safe to run repeatedly. A store that cannot be read is treated as
    /// having no pending swaps, and a failing swap never stops the pass.
    pub async fn run_recovery_scan(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        let (swaps, reverse_swaps) = match (
            self.store.list_pending_submarine_swaps(),
            self.store.list_pending_reverse_swaps(),
        ) {
            (Ok(swaps), Ok(reverse_swaps)) => (swaps, reverse_swaps),
            (Err(err), _) | (_, Err(err)) => {
                tracing::error!(error = %err, "swap store not ready, recovery skipped");
                return report;
            }
        };
        if swaps.is_empty() && reverse_swaps.is_empty() {
            return report;
        }
        tracing::info!(
            swaps = swaps.len(),
            reverse_swaps = reverse_swaps.len(),
            "recovering pending swaps"
        );

        for swap in &swaps {
            let outcome = self.recover_submarine_swap(swap).await;
            report.record(outcome);
        }
        for swap in &reverse_swaps {
            let outcome = self.recover_reverse_swap(swap).await;
            report.record(outcome);
        }

        tracing::info!(?report, "recovery scan finished");
        report
    }

    async fn recover_submarine_swap(&self, swap: &SubmarineSwap) -> Recovered {
        let swap_id = swap.id.as_str();

        match self
            .gateway
            .check_settlement(&swap.wallet, &swap.payment_hash)
            .await
        {
            Ok(true) => {
                tracing::info!(%swap_id, boltz_id = %swap.boltz_id, "swap got paid while offline");
                return self.transition(swap_id, SwapStatus::Complete);
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(%swap_id, error = %err, "check settlement failed");
                return Recovered::Error;
            }
        }

        match self.client.swap_status(&swap.boltz_id).await {
            Err(ServiceError::NotFound(_)) => {
                tracing::info!(%swap_id, boltz_id = %swap.boltz_id, "swap does not exist");
                return self.transition(swap_id, SwapStatus::Failed);
            }
            Err(ServiceError::TimeoutNotReached { .. }) => {
                return Recovered::Status(SwapStatus::Pending);
            }
            _ => {}
        }

        match self.client.refund(&refund_request(swap)).await {
            Ok(txid) => {
                tracing::info!(%swap_id, refund_txid = %txid, "swap refunded");
                self.transition(swap_id, SwapStatus::Refunded)
            }
            Err(ServiceError::TimeoutNotReached {
                current_height,
                timeout_height,
            }) => {
                tracing::info!(
                    %swap_id,
                    current_height,
                    timeout_height,
                    "refund not possible yet, timeout not reached"
                );
                Recovered::Status(SwapStatus::Pending)
            }
            Err(ServiceError::NotFound(_)) => self.transition(swap_id, SwapStatus::Failed),
            Err(err) => {
                tracing::error!(%swap_id, error = %err, "swap recovery failed");
                Recovered::Error
            }
        }
    }

    async fn recover_reverse_swap(&self, swap: &ReverseSubmarineSwap) -> Recovered {
        let swap_id = swap.id.as_str();

        match self.client.swap_status(&swap.boltz_id).await {
            Ok(status) if status.is_settled() => {
                tracing::info!(%swap_id, status = %status.status, "reverse swap settled while offline");
                return self.transition(swap_id, SwapStatus::Complete);
            }
            Ok(status) if status.is_failed() => {
                tracing::info!(%swap_id, status = %status.status, "reverse swap failed remotely");
                return self.transition(swap_id, SwapStatus::Failed);
            }
            Ok(_) => {}
            Err(err @ (ServiceError::NotFound(_) | ServiceError::SwapStatus(_))) => {
                tracing::info!(%swap_id, boltz_id = %swap.boltz_id, error = %err, "reverse swap not claimable");
                return self.transition(swap_id, SwapStatus::Failed);
            }
            Err(err) => {
                tracing::error!(%swap_id, error = %err, "reverse swap recovery failed");
                return Recovered::Error;
            }
        }

        match self.client.claim(&claim_request(swap)).await {
            Ok(txid) => {
                tracing::info!(%swap_id, claim_txid = %txid, "reverse swap claimed");
                self.transition(swap_id, SwapStatus::Complete)
            }
            Err(err @ (ServiceError::NotFound(_) | ServiceError::SwapStatus(_))) => {
                tracing::info!(%swap_id, error = %err, "reverse swap not claimable");
                self.transition(swap_id, SwapStatus::Failed)
            }
            Err(err) => {
                tracing::error!(%swap_id, error = %err, "reverse swap recovery failed");
                Recovered::Error
            }
        }
    }

    fn transition(&self, swap_id: &str, status: SwapStatus) -> Recovered {
        if finish_swap(self.store.as_ref(), swap_id, status) {
            Recovered::Status(status)
        } else {
            Recovered::Error
        }
    }
}
