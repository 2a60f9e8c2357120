pub mod invoice;
pub mod ldk;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Correlation data carried alongside an invoice or payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTags {
    pub tag: Option<String>,
    pub swap_id: Option<String>,
    #[serde(default)]
    pub reverse: bool,
}

impl PaymentTags {
    pub fn swap(swap_id: impl Into<String>) -> Self {
        Self {
            tag: Some(crate::swap::PAYMENT_TAG.to_string()),
            swap_id: Some(swap_id.into()),
            reverse: false,
        }
    }

    pub fn reverse_swap(swap_id: impl Into<String>) -> Self {
        Self {
            reverse: true,
            ..Self::swap(swap_id)
        }
    }

    /// The swap id, if these tags were written by this crate.
    pub fn swap_id(&self) -> Option<&str> {
        match self.tag.as_deref() {
            Some(crate::swap::PAYMENT_TAG) => self.swap_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub wallet: String,
    pub amount_sat: u64,
    pub memo: String,
    pub tags: PaymentTags,
    pub expiry_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub payment_hash: String,
    pub payment_request: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub wallet: String,
    pub payment_request: String,
    pub memo: String,
    pub tags: PaymentTags,
}

/// A settled incoming payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPayment {
    pub wallet: String,
    pub payment_hash: String,
    pub amount_sat: u64,
    pub tags: PaymentTags,
}

#[async_trait]
pub trait LightningGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice>;

    /// Suspends until the payment settles; returns the preimage hex.
    async fn pay_invoice(&self, request: &PaymentRequest) -> Result<String>;

    async fn check_settlement(&self, wallet: &str, payment_hash: &str) -> Result<bool>;

    async fn wallet_balance(&self, wallet: &str) -> Result<u64>;

    /// Routing fee reserve required to send `amount_sat`.
    fn fee_reserve(&self, amount_sat: u64) -> u64;
}
