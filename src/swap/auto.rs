use crate::config::BoltzSettings;

use super::address::validate_address;
use super::error::{SwapError, SwapResult};
use super::service::SwapService;
use super::store::SwapStore;
use super::{
    AutoReverseSubmarineSwap, CreateAutoReverseSubmarineSwap, CreateReverseSubmarineSwap,
    ReverseSubmarineSwap, SwapAsset, SwapDirection, new_swap_id, unix_now,
};

/// Persists a new auto-swap configuration. A wallet has at most one.
pub fn create_auto_swap(
    store: &dyn SwapStore,
    settings: &BoltzSettings,
    input: CreateAutoReverseSubmarineSwap,
) -> SwapResult<AutoReverseSubmarineSwap> {
    if input.wallet.trim().is_empty() {
        return Err(SwapError::Validation("wallet is required".to_string()));
    }
    if input.amount == 0 {
        return Err(SwapError::Validation("amount must be > 0".to_string()));
    }
    if store
        .get_auto_swap_by_wallet(&input.wallet)
        .map_err(SwapError::Store)?
        .is_some()
    {
        return Err(SwapError::Conflict(
            "auto reverse swap is active, only 1 swap per wallet possible".to_string(),
        ));
    }

    let asset: SwapAsset = input.asset.parse()?;
    validate_address(settings, asset, &input.onchain_address)?;

    let auto_swap = AutoReverseSubmarineSwap {
        id: new_swap_id(),
        wallet: input.wallet,
        asset,
        amount: input.amount,
        feerate_limit: input.feerate_limit,
        balance: input.balance,
        onchain_address: input.onchain_address,
        instant_settlement: input.instant_settlement,
        created_at: unix_now(),
        count: 0,
    };
    store.insert_auto_swap(&auto_swap).map_err(SwapError::Store)?;
    Ok(auto_swap)
}

pub fn delete_auto_swap(store: &dyn SwapStore, id: &str) -> SwapResult<()> {
    if store.delete_auto_swap(id).map_err(SwapError::Store)? {
        Ok(())
    } else {
        Err(SwapError::NotFound(format!("auto reverse swap {id}")))
    }
}

/// Balance that may be swapped out: what is above the floor after keeping the
/// routing fee reserve aside.
pub fn available_amount(balance_sat: u64, floor_sat: u64, fee_reserve_sat: u64) -> u64 {
    balance_sat
        .saturating_sub(floor_sat)
        .saturating_sub(fee_reserve_sat)
}

impl SwapService {
    pub fn create_auto_reverse_swap(
        &self,
        input: CreateAutoReverseSubmarineSwap,
    ) -> SwapResult<AutoReverseSubmarineSwap> {
        let auto_swap = create_auto_swap(self.store.as_ref(), &self.config.settings, input)?;
        tracing::info!(
            auto_swap_id = %auto_swap.id,
            wallet = %auto_swap.wallet,
            amount = auto_swap.amount,
            balance = auto_swap.balance,
            "auto reverse swap created"
        );
        Ok(auto_swap)
    }

    pub fn delete_auto_reverse_swap(&self, id: &str) -> SwapResult<()> {
        delete_auto_swap(self.store.as_ref(), id)?;
        tracing::info!(auto_swap_id = %id, "auto reverse swap deleted");
        Ok(())
    }

    /// Sweeps the wallet's excess balance into a reverse swap if its auto-swap
    /// threshold is met. Returns the swap that was started, if any.
    pub async fn check_for_auto_swap(
        &self,
        wallet: &str,
    ) -> SwapResult<Option<ReverseSubmarineSwap>> {
        let Some(auto_swap) = self
            .store
            .get_auto_swap_by_wallet(wallet)
            .map_err(SwapError::Store)?
        else {
            return Ok(None);
        };

        let balance = self
            .gateway
            .wallet_balance(wallet)
            .await
            .map_err(SwapError::Lightning)?;
        let reserve = self.gateway.fee_reserve(balance);
        let amount = available_amount(balance, auto_swap.balance, reserve);
        if amount < auto_swap.amount {
            return Ok(None);
        }

        let estimate = match self.client.estimate_claim_fee(auto_swap.asset).await {
            Ok(fee) => fee,
            Err(err) => {
                tracing::error!(%wallet, error = %err, "swap service unavailable, auto swap skipped");
                return Ok(None);
            }
        };
        if let Some(limit) = auto_swap.feerate_limit
            && estimate > limit
        {
            tracing::warn!(
                %wallet,
                feerate_limit = limit,
                claim_fee_estimate = estimate,
                "auto reverse swap not created, fee limit exceeded"
            );
            return Ok(None);
        }

        // `send` keeps the amount as is; it is already net of the reserve.
        let swap = self
            .create_reverse_swap(CreateReverseSubmarineSwap {
                wallet: auto_swap.wallet.clone(),
                asset: auto_swap.asset.to_string(),
                amount,
                direction: SwapDirection::Send.to_string(),
                instant_settlement: auto_swap.instant_settlement,
                onchain_address: auto_swap.onchain_address.clone(),
                feerate: false,
                feerate_value: None,
            })
            .await?;

        self.store
            .update_auto_swap_count(&auto_swap.id, auto_swap.count + 1)
            .map_err(SwapError::Store)?;

        tracing::info!(
            %wallet,
            amount,
            boltz_id = %swap.boltz_id,
            "auto reverse swap created"
        );
        Ok(Some(swap))
    }
}
