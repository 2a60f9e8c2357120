use std::str::FromStr as _;

use crate::config::{BoltzSettings, bitcoin_network, liquid_network_params};

use super::SwapAsset;
use super::error::SwapError;

/// Checks that `address` parses and belongs to the network configured for `asset`.
pub fn validate_address(
    settings: &BoltzSettings,
    asset: SwapAsset,
    address: &str,
) -> Result<(), SwapError> {
    if address.trim().is_empty() {
        return Err(SwapError::Validation("address is required".to_string()));
    }

    match asset {
        SwapAsset::Btc => {
            let network = bitcoin_network(&settings.boltz_network)
                .map_err(|e| SwapError::Validation(format!("{e:#}")))?;
            bitcoin::Address::from_str(address)
                .map_err(|e| SwapError::Validation(format!("invalid bitcoin address: {e}")))?
                .require_network(network)
                .map_err(|e| {
                    SwapError::Validation(format!("bitcoin address network mismatch: {e}"))
                })?;
        }
        SwapAsset::Lbtc => {
            let params = liquid_network_params(&settings.boltz_network_liquid)
                .map_err(|e| SwapError::Validation(format!("{e:#}")))?;
            let address = lwk_wollet::elements::Address::from_str(address)
                .map_err(|e| SwapError::Validation(format!("invalid liquid address: {e}")))?;
            if address.params != params {
                return Err(SwapError::Validation(
                    "liquid address network mismatch".to_string(),
                ));
            }
        }
    }

    Ok(())
}
