use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SwapAsset;
use super::error::ServiceError;

/// Parameters returned by the service for a new submarine swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSwap {
    pub boltz_id: String,
    pub refund_privkey: String,
    pub address: String,
    pub expected_amount: u64,
    pub redeem_script: String,
    pub timeout_block_height: u32,
    pub bip21: String,
    pub blinding_key: Option<String>,
}

/// Parameters returned by the service for a new reverse swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedReverseSwap {
    pub boltz_id: String,
    pub preimage: String,
    pub claim_privkey: String,
    pub lockup_address: String,
    pub invoice: String,
    pub onchain_amount: u64,
    pub timeout_block_height: u32,
    pub redeem_script: String,
    pub blinding_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub asset: SwapAsset,
    pub boltz_id: String,
    pub privkey: String,
    pub lockup_address: String,
    pub receive_address: String,
    pub redeem_script: String,
    pub timeout_block_height: u32,
    pub feerate: Option<u64>,
    pub blinding_key: Option<String>,
}

/// Waits for the lockup transaction and then broadcasts the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub asset: SwapAsset,
    pub boltz_id: String,
    pub privkey: String,
    pub preimage: String,
    pub lockup_address: String,
    pub receive_address: String,
    pub redeem_script: String,
    pub zeroconf: bool,
    pub feerate: Option<u64>,
    pub blinding_key: Option<String>,
}

/// Swap state as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSwapStatus {
    pub status: String,
    pub failure_reason: Option<String>,
}

impl RemoteSwapStatus {
    const FAILED: &'static [&'static str] = &[
        "swap.expired",
        "invoice.expired",
        "invoice.failedToPay",
        "transaction.failed",
        "transaction.lockupFailed",
        "transaction.refunded",
    ];

    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            failure_reason: None,
        }
    }

    const SETTLED: &'static [&'static str] = &["invoice.settled", "transaction.claimed"];

    pub fn is_failed(&self) -> bool {
        self.failure_reason.is_some() || Self::FAILED.contains(&self.status.as_str())
    }

    /// The reverse swap already went through: the hold invoice settled or
    /// the lockup was claimed.
    pub fn is_settled(&self) -> bool {
        Self::SETTLED.contains(&self.status.as_str())
    }
}

/// Fee schedule of a swap pair. Percentages are in percent, not fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairFees {
    pub percentage: f64,
    pub miner_fee_sat: u64,
    pub reverse_percentage: f64,
    pub reverse_miner_fee_sat: u64,
}

impl PairFees {
    /// Invoice amount the service pays for an on-chain deposit of `amount_sat`.
    pub fn subtract_swap_fees(&self, amount_sat: u64) -> u64 {
        let service_fee = (amount_sat as f64 * self.percentage / 100.0).ceil() as u64;
        amount_sat
            .saturating_sub(service_fee)
            .saturating_sub(self.miner_fee_sat)
    }

    /// Hold invoice amount needed for an on-chain output of `amount_sat`.
    pub fn add_reverse_swap_fees(&self, amount_sat: u64) -> u64 {
        let gross = amount_sat.saturating_add(self.reverse_miner_fee_sat) as f64;
        (gross * (1.0 + self.reverse_percentage / 100.0)).ceil() as u64
    }
}

/// Amount bounds of a swap pair, in sats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairLimits {
    pub minimal_sat: u64,
    pub maximal_sat: u64,
}

/// Fees and limits the service quotes for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairInfo {
    pub asset: SwapAsset,
    pub fees: PairFees,
    pub limits: PairLimits,
}

/// Client for the remote atomic-swap counterparty.
///
/// Claim and refund construct and broadcast the on-chain transactions; their
/// script internals belong to the implementation.
#[async_trait]
pub trait SwapServiceClient: Send + Sync {
    async fn create_swap(
        &self,
        asset: SwapAsset,
        invoice: &str,
    ) -> Result<CreatedSwap, ServiceError>;

    async fn create_reverse_swap(
        &self,
        asset: SwapAsset,
        amount_sat: u64,
    ) -> Result<CreatedReverseSwap, ServiceError>;

    /// Returns the refund txid.
    async fn refund(&self, request: &RefundRequest) -> Result<String, ServiceError>;

    /// Suspends until the lockup is observed; returns the claim txid.
    async fn claim(&self, request: &ClaimRequest) -> Result<String, ServiceError>;

    async fn swap_status(&self, boltz_id: &str) -> Result<RemoteSwapStatus, ServiceError>;

    /// Current claim fee rate estimate, sat/vbyte.
    async fn estimate_claim_fee(&self, asset: SwapAsset) -> Result<u64, ServiceError>;

    async fn pair_fees(&self, asset: SwapAsset) -> Result<PairFees, ServiceError>;

    async fn pair_limits(&self, asset: SwapAsset) -> Result<PairLimits, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_failure_detection() {
        assert!(RemoteSwapStatus::new("swap.expired").is_failed());
        assert!(RemoteSwapStatus::new("transaction.lockupFailed").is_failed());
        assert!(!RemoteSwapStatus::new("transaction.mempool").is_failed());

        let with_reason = RemoteSwapStatus {
            status: "transaction.mempool".to_string(),
            failure_reason: Some("lockup too low".to_string()),
        };
        assert!(with_reason.is_failed());
    }

    #[test]
    fn remote_status_settlement_detection() {
        assert!(RemoteSwapStatus::new("invoice.settled").is_settled());
        assert!(RemoteSwapStatus::new("transaction.claimed").is_settled());
        assert!(!RemoteSwapStatus::new("transaction.mempool").is_settled());
        assert!(!RemoteSwapStatus::new("swap.expired").is_settled());
    }

    #[test]
    fn subtract_swap_fees_saturates() {
        let fees = PairFees {
            percentage: 1.0,
            miner_fee_sat: 500,
            reverse_percentage: 0.0,
            reverse_miner_fee_sat: 0,
        };
        assert_eq!(fees.subtract_swap_fees(100), 0);
        assert_eq!(fees.subtract_swap_fees(100_000), 98_500);
    }
}
