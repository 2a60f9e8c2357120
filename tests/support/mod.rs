#![allow(dead_code)]

pub mod fakes;
pub mod wait;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tempfile::TempDir;

use boltz_swap::config::{BoltzSettings, SwapConfig};
use boltz_swap::swap::service::SwapService;
use boltz_swap::swap::store::SqliteSwapStore;
use boltz_swap::swap::{
    ReverseSubmarineSwap, SubmarineSwap, SwapAsset, SwapDirection, SwapStatus,
};

use fakes::{FakeGateway, FakeSwapClient};

pub const WALLET: &str = "wallet-1";
pub const REGTEST_ADDRESS: &str = "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080";

pub fn regtest_config() -> SwapConfig {
    SwapConfig {
        settings: BoltzSettings {
            boltz_network: "regtest".to_string(),
            boltz_network_liquid: "liquidregtest".to_string(),
            ..BoltzSettings::default()
        },
        ..SwapConfig::default()
    }
}

pub struct Harness {
    pub client: Arc<FakeSwapClient>,
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<SqliteSwapStore>,
    pub service: SwapService,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let store = Arc::new(
            SqliteSwapStore::open(dir.path().join("swaps.sqlite3")).context("open store")?,
        );
        let client = FakeSwapClient::new();
        let gateway = FakeGateway::new();
        let service = SwapService::new(
            client.clone(),
            gateway.clone(),
            store.clone(),
            regtest_config(),
        );
        Ok(Self {
            client,
            gateway,
            store,
            service,
            _dir: dir,
        })
    }
}

pub fn submarine_swap(id: &str, boltz_id: &str) -> SubmarineSwap {
    SubmarineSwap {
        id: id.to_string(),
        wallet: WALLET.to_string(),
        asset: SwapAsset::Btc,
        amount: 10_000,
        direction: SwapDirection::Receive,
        feerate: false,
        feerate_value: None,
        payment_hash: format!("hash-{id}"),
        created_at: 1_700_000_000,
        status: SwapStatus::Pending,
        refund_privkey: format!("refund-key-{id}"),
        refund_address: REGTEST_ADDRESS.to_string(),
        boltz_id: boltz_id.to_string(),
        expected_amount: 10_000,
        timeout_block_height: 200,
        address: format!("lockup-{id}"),
        bip21: format!("bitcoin:lockup-{id}"),
        redeem_script: "a914".to_string(),
        blinding_key: None,
    }
}

pub fn reverse_swap(id: &str, boltz_id: &str) -> ReverseSubmarineSwap {
    ReverseSubmarineSwap {
        id: id.to_string(),
        wallet: WALLET.to_string(),
        asset: SwapAsset::Btc,
        amount: 10_000,
        direction: SwapDirection::Send,
        feerate: false,
        feerate_value: None,
        onchain_address: REGTEST_ADDRESS.to_string(),
        instant_settlement: false,
        created_at: 1_700_000_000,
        status: SwapStatus::Pending,
        boltz_id: boltz_id.to_string(),
        preimage: "11".repeat(32),
        claim_privkey: format!("claim-key-{id}"),
        lockup_address: format!("lockup-{id}"),
        invoice: format!("lnbcrt-{id}"),
        onchain_amount: 9_900,
        timeout_block_height: 200,
        redeem_script: "a914".to_string(),
        blinding_key: None,
    }
}
