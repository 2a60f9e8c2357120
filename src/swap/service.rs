use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SwapConfig;
use crate::lightning::{IncomingPayment, InvoiceRequest, LightningGateway, PaymentTags};

use super::address::validate_address;
use super::client::{PairInfo, RefundRequest, RemoteSwapStatus, SwapServiceClient};
use super::error::{SwapError, SwapResult};
use super::reverse::{ReverseSwapOutcome, execute_reverse_swap};
use super::store::SwapStore;
use super::{
    AnySwap, AutoReverseSubmarineSwap, CreateReverseSubmarineSwap, CreateSubmarineSwap,
    ReverseSubmarineSwap, SubmarineSwap, SwapAsset, SwapDirection, SwapStatus, new_swap_id,
    unix_now,
};

/// Drives swap creation, refunds and status transitions against the remote
/// swap service, the lightning gateway and the swap store.
///
/// Cloning is cheap; clones share the shutdown token and the set of running
/// reverse swaps.
#[derive(Clone)]
pub struct SwapService {
    pub(super) client: Arc<dyn SwapServiceClient>,
    pub(super) gateway: Arc<dyn LightningGateway>,
    pub(super) store: Arc<dyn SwapStore>,
    pub(super) config: Arc<SwapConfig>,
    pub(super) shutdown: CancellationToken,
    pub(super) tracker: TaskTracker,
}

pub(crate) fn refund_request(swap: &SubmarineSwap) -> RefundRequest {
    RefundRequest {
        asset: swap.asset,
        boltz_id: swap.boltz_id.clone(),
        privkey: swap.refund_privkey.clone(),
        lockup_address: swap.address.clone(),
        receive_address: swap.refund_address.clone(),
        redeem_script: swap.redeem_script.clone(),
        timeout_block_height: swap.timeout_block_height,
        feerate: swap.feerate.then_some(swap.feerate_value).flatten(),
        blinding_key: swap.blinding_key.clone(),
    }
}

fn store_err(err: anyhow::Error) -> SwapError {
    SwapError::Store(err)
}

impl SwapService {
    pub fn new(
        client: Arc<dyn SwapServiceClient>,
        gateway: Arc<dyn LightningGateway>,
        store: Arc<dyn SwapStore>,
        config: SwapConfig,
    ) -> Self {
        Self {
            client,
            gateway,
            store,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Cancelling this token interrupts every running reverse swap.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Receive via on-chain deposit.
    pub async fn create_submarine_swap(
        &self,
        input: CreateSubmarineSwap,
    ) -> SwapResult<SubmarineSwap> {
        if input.wallet.trim().is_empty() {
            return Err(SwapError::Validation("wallet is required".to_string()));
        }
        if input.amount == 0 {
            return Err(SwapError::Validation("amount must be > 0".to_string()));
        }
        if self
            .store
            .get_auto_swap_by_wallet(&input.wallet)
            .map_err(store_err)?
            .is_some()
        {
            return Err(SwapError::Conflict(
                "auto reverse swap is active, a swap would immediately be swapped out again"
                    .to_string(),
            ));
        }

        let asset: SwapAsset = input.asset.parse()?;
        let direction: SwapDirection = input.direction.parse()?;
        validate_address(&self.config.settings, asset, &input.refund_address)?;

        let amount = match direction {
            SwapDirection::Send => {
                let fees = self.client.pair_fees(asset).await?;
                direction.submarine_amount(input.amount, &fees)
            }
            SwapDirection::Receive => input.amount,
        };
        if amount == 0 {
            return Err(SwapError::Validation(format!(
                "amount {} does not cover the swap fees",
                input.amount
            )));
        }

        let swap_id = new_swap_id();
        let invoice = self
            .gateway
            .create_invoice(&InvoiceRequest {
                wallet: input.wallet.clone(),
                amount_sat: amount,
                memo: format!("swap of {amount} sats on boltz.exchange"),
                tags: PaymentTags::swap(&swap_id),
                expiry_secs: self.config.invoice_expiry_secs,
            })
            .await
            .map_err(SwapError::Lightning)?;

        let created = self
            .client
            .create_swap(asset, &invoice.payment_request)
            .await?;

        let swap = SubmarineSwap {
            id: swap_id,
            wallet: input.wallet,
            asset,
            amount: input.amount,
            direction,
            feerate: input.feerate,
            feerate_value: input.feerate_value,
            payment_hash: invoice.payment_hash,
            created_at: unix_now(),
            status: SwapStatus::Pending,
            refund_privkey: created.refund_privkey,
            refund_address: input.refund_address,
            boltz_id: created.boltz_id,
            expected_amount: created.expected_amount,
            timeout_block_height: created.timeout_block_height,
            address: created.address,
            bip21: created.bip21,
            redeem_script: created.redeem_script,
            blinding_key: created.blinding_key,
        };
        self.store.insert_submarine_swap(&swap).map_err(store_err)?;

        tracing::info!(
            swap_id = %swap.id,
            boltz_id = %swap.boltz_id,
            wallet = %swap.wallet,
            amount,
            "submarine swap created"
        );
        Ok(swap)
    }

    pub async fn refund_submarine_swap(&self, swap_id: &str) -> SwapResult<SubmarineSwap> {
        if swap_id.trim().is_empty() {
            return Err(SwapError::Validation("swap_id is required".to_string()));
        }
        let mut swap = self
            .store
            .get_submarine_swap(swap_id)
            .map_err(store_err)?
            .ok_or_else(|| SwapError::NotFound(format!("submarine swap {swap_id}")))?;
        if swap.status != SwapStatus::Pending {
            return Err(SwapError::Conflict(format!(
                "swap {swap_id} is {}, only pending swaps can be refunded",
                swap.status
            )));
        }

        let txid = self
            .client
            .refund(&refund_request(&swap))
            .await
            .map_err(SwapError::RefundFailure)?;
        tracing::info!(%swap_id, refund_txid = %txid, "submarine swap refunded");

        if self
            .store
            .update_swap_status(swap_id, SwapStatus::Refunded)
            .map_err(store_err)?
        {
            swap.status = SwapStatus::Refunded;
        } else if let Some(current) = self.store.get_submarine_swap(swap_id).map_err(store_err)? {
            swap = current;
        }
        Ok(swap)
    }

    /// Send to on-chain. The swap is returned once persisted; the pay and
    /// claim run in the background until the swap reaches a terminal status.
    pub async fn create_reverse_swap(
        &self,
        input: CreateReverseSubmarineSwap,
    ) -> SwapResult<ReverseSubmarineSwap> {
        if input.wallet.trim().is_empty() {
            return Err(SwapError::Validation("wallet is required".to_string()));
        }
        if input.amount == 0 {
            return Err(SwapError::Validation("amount must be > 0".to_string()));
        }

        let balance_sat = self
            .gateway
            .wallet_balance(&input.wallet)
            .await
            .map_err(SwapError::Lightning)?;
        let fee_reserve_sat = self.gateway.fee_reserve(input.amount);
        if balance_sat.saturating_sub(fee_reserve_sat) < input.amount {
            return Err(SwapError::InsufficientFunds {
                balance_sat,
                fee_reserve_sat,
                amount_sat: input.amount,
            });
        }

        let asset: SwapAsset = input.asset.parse()?;
        let direction: SwapDirection = input.direction.parse()?;
        validate_address(&self.config.settings, asset, &input.onchain_address)?;

        let amount = match direction {
            SwapDirection::Send => input.amount,
            SwapDirection::Receive => {
                let fees = self.client.pair_fees(asset).await?;
                direction.reverse_amount(input.amount, &fees)
            }
        };

        let created = self.client.create_reverse_swap(asset, amount).await?;

        let swap = ReverseSubmarineSwap {
            id: new_swap_id(),
            wallet: input.wallet,
            asset,
            amount: input.amount,
            direction,
            feerate: input.feerate,
            feerate_value: input.feerate_value,
            onchain_address: input.onchain_address,
            instant_settlement: input.instant_settlement,
            created_at: unix_now(),
            status: SwapStatus::Pending,
            boltz_id: created.boltz_id,
            preimage: created.preimage,
            claim_privkey: created.claim_privkey,
            lockup_address: created.lockup_address,
            invoice: created.invoice,
            onchain_amount: created.onchain_amount,
            timeout_block_height: created.timeout_block_height,
            redeem_script: created.redeem_script,
            blinding_key: created.blinding_key,
        };
        self.store.insert_reverse_swap(&swap).map_err(store_err)?;

        tracing::info!(
            swap_id = %swap.id,
            boltz_id = %swap.boltz_id,
            wallet = %swap.wallet,
            amount,
            "reverse swap created"
        );

        self.spawn_reverse_swap(swap.clone());
        Ok(swap)
    }

    pub(super) fn spawn_reverse_swap(
        &self,
        swap: ReverseSubmarineSwap,
    ) -> JoinHandle<ReverseSwapOutcome> {
        self.tracker.spawn(execute_reverse_swap(
            self.client.clone(),
            self.gateway.clone(),
            self.store.clone(),
            swap,
            self.shutdown.clone(),
        ))
    }

    /// Handles a settled incoming payment: runs the auto-swap trigger for the
    /// wallet, then completes the submarine swap the invoice belongs to.
    pub async fn handle_invoice_paid(&self, payment: &IncomingPayment) -> SwapResult<()> {
        if let Err(err) = self.check_for_auto_swap(&payment.wallet).await {
            tracing::warn!(wallet = %payment.wallet, error = %err, "auto swap check failed");
        }

        // Tags do not survive a restart of the gateway; the payment hash does.
        let swap = match payment.tags.swap_id() {
            Some(swap_id) => self.store.get_submarine_swap(swap_id),
            None => self
                .store
                .get_submarine_swap_by_payment_hash(&payment.payment_hash),
        }
        .map_err(store_err)?;

        if let Some(swap) = swap {
            super::finish_swap(self.store.as_ref(), &swap.id, SwapStatus::Complete);
        }
        Ok(())
    }

    /// Status of a swap as reported by the remote service.
    pub async fn get_swap_status(&self, swap_id: &str) -> SwapResult<RemoteSwapStatus> {
        let swap = self.find_swap(swap_id)?;
        Ok(self.client.swap_status(swap.boltz_id()).await?)
    }

    /// Fees and amount limits the service currently quotes for `asset`.
    pub async fn pair_info(&self, asset: &str) -> SwapResult<PairInfo> {
        let asset: SwapAsset = asset.parse()?;
        let fees = self.client.pair_fees(asset).await?;
        let limits = self.client.pair_limits(asset).await?;
        Ok(PairInfo {
            asset,
            fees,
            limits,
        })
    }

    pub fn find_swap(&self, swap_id: &str) -> SwapResult<AnySwap> {
        if let Some(swap) = self.store.get_submarine_swap(swap_id).map_err(store_err)? {
            return Ok(AnySwap::Submarine(swap));
        }
        self.store
            .get_reverse_swap(swap_id)
            .map_err(store_err)?
            .map(AnySwap::Reverse)
            .ok_or_else(|| SwapError::NotFound(format!("swap {swap_id}")))
    }

    pub fn list_submarine_swaps(&self, wallets: &[String]) -> SwapResult<Vec<SubmarineSwap>> {
        self.store.list_submarine_swaps(wallets).map_err(store_err)
    }

    pub fn list_reverse_swaps(&self, wallets: &[String]) -> SwapResult<Vec<ReverseSubmarineSwap>> {
        self.store.list_reverse_swaps(wallets).map_err(store_err)
    }

    pub fn list_auto_swaps(&self, wallets: &[String]) -> SwapResult<Vec<AutoReverseSubmarineSwap>> {
        self.store.list_auto_swaps(wallets).map_err(store_err)
    }
}
