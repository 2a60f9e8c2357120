pub mod address;
pub mod auto;
pub mod client;
pub mod error;
pub mod recovery;
pub mod reverse;
pub mod service;
pub mod store;
pub mod tasks;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use self::client::PairFees;
use self::error::SwapError;
use self::store::SwapStore;

/// Correlation tag attached to every invoice and payment this crate creates.
pub const PAYMENT_TAG: &str = "boltz";

/// Which side of a swap absorbs the service fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    Send,
    Receive,
}

impl SwapDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapDirection::Send => "send",
            SwapDirection::Receive => "receive",
        }
    }

    /// Invoice amount for a submarine swap: `send` pays the swap fee out of the
    /// requested amount, `receive` invoices the full amount.
    pub fn submarine_amount(self, amount_sat: u64, fees: &PairFees) -> u64 {
        match self {
            SwapDirection::Send => fees.subtract_swap_fees(amount_sat),
            SwapDirection::Receive => amount_sat,
        }
    }

    /// Hold invoice amount for a reverse swap: `receive` grosses the amount up
    /// so the on-chain output equals the request, `send` pays it as is.
    pub fn reverse_amount(self, amount_sat: u64, fees: &PairFees) -> u64 {
        match self {
            SwapDirection::Send => amount_sat,
            SwapDirection::Receive => fees.add_reverse_swap_fees(amount_sat),
        }
    }
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapDirection {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(SwapDirection::Send),
            "receive" => Ok(SwapDirection::Receive),
            other => Err(SwapError::Validation(format!(
                "swap direction: {other} not supported"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    Complete,
    Refunded,
    Failed,
}

impl SwapStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Complete => "complete",
            SwapStatus::Refunded => "refunded",
            SwapStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SwapStatus::Pending)
    }

    /// pending -> {complete, refunded, failed}; nothing else.
    pub fn can_transition_to(self, next: SwapStatus) -> bool {
        self == SwapStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SwapStatus::Pending),
            "complete" => Ok(SwapStatus::Complete),
            "refunded" => Ok(SwapStatus::Refunded),
            "failed" => Ok(SwapStatus::Failed),
            other => anyhow::bail!("unknown swap status: {other}"),
        }
    }
}

/// On-chain rail of a swap pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapAsset {
    #[default]
    #[serde(rename = "BTC/BTC")]
    Btc,
    #[serde(rename = "L-BTC/BTC")]
    Lbtc,
}

impl SwapAsset {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapAsset::Btc => "BTC/BTC",
            SwapAsset::Lbtc => "L-BTC/BTC",
        }
    }
}

impl fmt::Display for SwapAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapAsset {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC/BTC" => Ok(SwapAsset::Btc),
            "L-BTC/BTC" => Ok(SwapAsset::Lbtc),
            other => Err(SwapError::Validation(format!("unsupported asset: {other}"))),
        }
    }
}

/// Receive via on-chain deposit: the wallet issues an invoice that the service
/// pays once the deposit lands, or the deposit is refunded after the timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmarineSwap {
    pub id: String,
    pub wallet: String,
    pub asset: SwapAsset,
    pub amount: u64,
    pub direction: SwapDirection,
    pub feerate: bool,
    pub feerate_value: Option<u64>,
    pub payment_hash: String,
    pub created_at: u64,
    pub status: SwapStatus,
    pub refund_privkey: String,
    pub refund_address: String,
    pub boltz_id: String,
    pub expected_amount: u64,
    pub timeout_block_height: u32,
    pub address: String,
    pub bip21: String,
    pub redeem_script: String,
    pub blinding_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubmarineSwap {
    pub wallet: String,
    pub asset: String,
    pub refund_address: String,
    pub amount: u64,
    pub direction: String,
    pub feerate: bool,
    pub feerate_value: Option<u64>,
}

/// Send to on-chain: the wallet pays a hold invoice that only settles once the
/// claim transaction reveals the preimage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseSubmarineSwap {
    pub id: String,
    pub wallet: String,
    pub asset: SwapAsset,
    pub amount: u64,
    pub direction: SwapDirection,
    pub feerate: bool,
    pub feerate_value: Option<u64>,
    pub onchain_address: String,
    pub instant_settlement: bool,
    pub created_at: u64,
    pub status: SwapStatus,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReverseSubmarineSwap {
    pub wallet: String,
    pub asset: String,
    pub amount: u64,
    pub direction: String,
    pub instant_settlement: bool,
    pub onchain_address: String,
    pub feerate: bool,
    pub feerate_value: Option<u64>,
}

/// Standing per-wallet configuration that sweeps balance above `balance` into
/// reverse swaps once at least `amount` is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoReverseSubmarineSwap {
    pub id: String,
    pub wallet: String,
    pub asset: SwapAsset,
    pub amount: u64,
    pub feerate_limit: Option<u64>,
    pub balance: u64,
    pub onchain_address: String,
    pub instant_settlement: bool,
    pub created_at: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAutoReverseSubmarineSwap {
    pub wallet: String,
    pub asset: String,
    pub amount: u64,
    pub balance: u64,
    pub instant_settlement: bool,
    pub onchain_address: String,
    pub feerate_limit: Option<u64>,
}

/// Either kind of swap, as returned by an id lookup across both tables.
#[derive(Debug, Clone, PartialEq)]
pub enum AnySwap {
    Submarine(SubmarineSwap),
    Reverse(ReverseSubmarineSwap),
}

impl AnySwap {
    pub fn boltz_id(&self) -> &str {
        match self {
            AnySwap::Submarine(s) => &s.boltz_id,
            AnySwap::Reverse(s) => &s.boltz_id,
        }
    }
}

/// Moves a pending swap to `status`, logging instead of failing.
///
/// Returns true only if this call made the transition.
pub(crate) fn finish_swap(store: &dyn SwapStore, swap_id: &str, status: SwapStatus) -> bool {
    match store.update_swap_status(swap_id, status) {
        Ok(true) => {
            tracing::info!(%swap_id, %status, "swap status updated");
            true
        }
        Ok(false) => {
            tracing::debug!(%swap_id, %status, "swap already terminal");
            false
        }
        Err(err) => {
            tracing::error!(%swap_id, %status, error = %err, "update swap status failed");
            false
        }
    }
}

pub fn new_swap_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_only_leave_pending() {
        use SwapStatus::*;
        for next in [Complete, Refunded, Failed] {
            assert!(Pending.can_transition_to(next));
        }
        assert!(!Pending.can_transition_to(Pending));
        for from in [Complete, Refunded, Failed] {
            for next in [Pending, Complete, Refunded, Failed] {
                assert!(!from.can_transition_to(next), "{from} -> {next}");
            }
        }
    }

    #[test]
    fn direction_rejects_unknown_values() {
        assert_eq!("send".parse::<SwapDirection>().unwrap(), SwapDirection::Send);
        assert_eq!(
            "receive".parse::<SwapDirection>().unwrap(),
            SwapDirection::Receive
        );
        let err = "sideways".parse::<SwapDirection>().unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
    }

    #[test]
    fn direction_fee_adjustment() {
        let fees = PairFees {
            percentage: 0.5,
            miner_fee_sat: 100,
            reverse_percentage: 0.5,
            reverse_miner_fee_sat: 100,
        };
        assert_eq!(SwapDirection::Send.submarine_amount(10_000, &fees), 9_850);
        assert_eq!(SwapDirection::Receive.submarine_amount(10_000, &fees), 10_000);
        assert_eq!(SwapDirection::Send.reverse_amount(10_000, &fees), 10_000);
        assert_eq!(SwapDirection::Receive.reverse_amount(10_000, &fees), 10_151);
    }

    #[test]
    fn asset_round_trips_through_serde_names() {
        let json = serde_json::to_string(&SwapAsset::Lbtc).unwrap();
        assert_eq!(json, "\"L-BTC/BTC\"");
        assert_eq!("BTC/BTC".parse::<SwapAsset>().unwrap(), SwapAsset::Btc);
        assert!("ETH/BTC".parse::<SwapAsset>().is_err());
    }
}
