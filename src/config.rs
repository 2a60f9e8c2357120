use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INVOICE_EXPIRY_SECS: u32 = 60 * 60 * 24;

/// Process-wide swap service settings. Read-only to the swap core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoltzSettings {
    pub boltz_network: String,
    pub boltz_network_liquid: String,
    pub boltz_url: String,
    pub boltz_mempool_space_url: String,
    pub boltz_mempool_space_liquid_url: String,
}

impl Default for BoltzSettings {
    fn default() -> Self {
        Self {
            boltz_network: "main".to_string(),
            boltz_network_liquid: "liquidv1".to_string(),
            boltz_url: "https://boltz.exchange/api".to_string(),
            boltz_mempool_space_url: "https://mempool.space/api".to_string(),
            boltz_mempool_space_liquid_url: "https://liquid.network/api".to_string(),
        }
    }
}

impl BoltzSettings {
    pub fn validate(&self) -> Result<()> {
        validate_url("boltz_url", &self.boltz_url)?;
        validate_url("boltz_mempool_space_url", &self.boltz_mempool_space_url)?;
        validate_url(
            "boltz_mempool_space_liquid_url",
            &self.boltz_mempool_space_liquid_url,
        )?;
        bitcoin_network(&self.boltz_network)?;
        liquid_network_params(&self.boltz_network_liquid)?;
        Ok(())
    }
}

pub fn bitcoin_network(name: &str) -> Result<bitcoin::Network> {
    match name {
        "main" | "mainnet" | "bitcoin" => Ok(bitcoin::Network::Bitcoin),
        "testnet" => Ok(bitcoin::Network::Testnet),
        "signet" => Ok(bitcoin::Network::Signet),
        "regtest" => Ok(bitcoin::Network::Regtest),
        other => Err(anyhow!("unknown bitcoin network: {other}")),
    }
}

pub fn liquid_network_params(
    name: &str,
) -> Result<&'static lwk_wollet::elements::AddressParams> {
    use lwk_wollet::elements::AddressParams;

    match name {
        "liquidv1" => Ok(&AddressParams::LIQUID),
        "liquidtestnet" => Ok(&AddressParams::LIQUID_TESTNET),
        "liquidregtest" | "elementsregtest" => Ok(&AddressParams::ELEMENTS),
        other => Err(anyhow!("unknown liquid network: {other}")),
    }
}

pub fn validate_url(label: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!("{label} must start with http:// or https://"))
    }
}

/// Amount a wallet must keep aside to pay routing fees, in sats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeReserve {
    pub min_sat: u64,
    pub percent: f64,
}

impl Default for FeeReserve {
    fn default() -> Self {
        Self {
            min_sat: 2,
            percent: 1.0,
        }
    }
}

impl FeeReserve {
    pub fn reserve_for(&self, amount_sat: u64) -> u64 {
        let proportional = (amount_sat as f64 * self.percent / 100.0).ceil() as u64;
        proportional.max(self.min_sat)
    }
}

#[derive(Debug, Clone)]
pub struct SwapConfig {
    pub settings: BoltzSettings,
    pub fee_reserve: FeeReserve,
    pub invoice_expiry_secs: u32,
    pub payment_poll_interval: Duration,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            settings: BoltzSettings::default(),
            fee_reserve: FeeReserve::default(),
            invoice_expiry_secs: DEFAULT_INVOICE_EXPIRY_SECS,
            payment_poll_interval: Duration::from_secs(2),
        }
    }
}

impl SwapConfig {
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        if !self.fee_reserve.percent.is_finite() || self.fee_reserve.percent < 0.0 {
            return Err(anyhow!("fee_reserve.percent must be a non-negative number"));
        }
        if self.invoice_expiry_secs == 0 {
            return Err(anyhow!("invoice_expiry_secs must be greater than zero"));
        }
        if self.payment_poll_interval.is_zero() {
            return Err(anyhow!("payment_poll_interval must be greater than zero"));
        }
        Ok(())
    }
}
