use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use ldk_server_client::client::LdkServerClient;
use ldk_server_protos::api::{
    Bolt11ReceiveRequest, Bolt11SendRequest, GetBalancesRequest, ListPaymentsRequest,
};
use ldk_server_protos::types::{
    Bolt11InvoiceDescription, Payment, PaymentDirection, PaymentStatus,
    bolt11_invoice_description, payment_kind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::invoice::payment_hash_from_bolt11;
use super::{
    CreatedInvoice, IncomingPayment, InvoiceRequest, LightningGateway, PaymentRequest,
    PaymentTags,
};
use crate::config::{FeeReserve, SwapConfig};

#[derive(Clone)]
pub struct LdkLightningClient {
    client: LdkServerClient,
}

impl LdkLightningClient {
    pub fn new(rest_service_address: String) -> Self {
        Self {
            client: LdkServerClient::new(rest_service_address),
        }
    }

    pub async fn receive(
        &self,
        amount_msat: u64,
        memo: String,
        expiry_secs: u32,
    ) -> Result<String> {
        let description = Bolt11InvoiceDescription {
            kind: Some(bolt11_invoice_description::Kind::Direct(memo)),
        };

        let resp = self
            .client
            .bolt11_receive(Bolt11ReceiveRequest {
                amount_msat: Some(amount_msat),
                description: Some(description),
                expiry_secs,
            })
            .await
            .context("Bolt11Receive")?;

        Ok(resp.invoice)
    }

    /// Starts an outbound payment and returns its payment id.
    pub async fn send(&self, invoice: String) -> Result<String> {
        let resp = self
            .client
            .bolt11_send(Bolt11SendRequest {
                invoice,
                amount_msat: None,
                route_parameters: None,
            })
            .await
            .context("Bolt11Send")?;
        Ok(resp.payment_id)
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>> {
        Ok(self
            .client
            .list_payments(ListPaymentsRequest { page_token: None })
            .await
            .context("ListPayments")?
            .payments)
    }

    pub async fn lightning_balance_sat(&self) -> Result<u64> {
        let balances = self
            .client
            .get_balances(GetBalancesRequest {})
            .await
            .context("GetBalances")?;
        Ok(balances.total_lightning_balance_sats)
    }

    /// Polls until the outbound payment resolves. Hold invoices can stay
    /// pending for hours, so there is no deadline here; callers cancel.
    /// Failed polls are retried.
    pub async fn wait_settled(&self, payment_id: &str, poll_interval: Duration) -> Result<String> {
        loop {
            match self.list_payments().await {
                Ok(payments) => {
                    if let Some(outcome) = outbound_outcome(&payments, payment_id) {
                        return outcome;
                    }
                }
                Err(err) => {
                    tracing::warn!(%payment_id, error = %err, "poll payment status failed");
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Final result of an outbound payment, or None while it is in flight.
fn outbound_outcome(payments: &[Payment], payment_id: &str) -> Option<Result<String>> {
    let p = payments
        .iter()
        .find(|p| p.id == payment_id && p.direction == PaymentDirection::Outbound as i32)?;

    if p.status == PaymentStatus::Failed as i32 {
        return Some(Err(anyhow::anyhow!("payment failed: payment_id={payment_id}")));
    }
    if p.status != PaymentStatus::Succeeded as i32 {
        return None;
    }
    let preimage = match p.kind.as_ref().and_then(|k| k.kind.as_ref()) {
        Some(payment_kind::Kind::Bolt11(b)) => b.preimage.clone(),
        _ => None,
    };
    Some(preimage.context("missing payment preimage"))
}

fn bolt11_hash(payment: &Payment) -> Option<&str> {
    match payment.kind.as_ref().and_then(|k| k.kind.as_ref()) {
        Some(payment_kind::Kind::Bolt11(b)) => Some(b.hash.as_str()),
        _ => None,
    }
}

fn is_settled_inbound(payment: &Payment) -> bool {
    payment.direction == PaymentDirection::Inbound as i32
        && payment.status == PaymentStatus::Succeeded as i32
}

/// A settled inbound bolt11 payment seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SettledPayment {
    payment_hash: String,
    amount_sat: u64,
}

/// Diffs successive payment listings of one node.
///
/// The first listing is the baseline and reports nothing. Only ids settled in
/// the latest listing are remembered.
#[derive(Debug, Default)]
struct PaymentWatch {
    seen: Option<HashSet<String>>,
}

impl PaymentWatch {
    fn poll(&mut self, payments: &[Payment]) -> Vec<SettledPayment> {
        let settled: HashSet<String> = payments
            .iter()
            .filter(|p| is_settled_inbound(p))
            .map(|p| p.id.clone())
            .collect();

        let fresh = match &self.seen {
            None => Vec::new(),
            Some(seen) => payments
                .iter()
                .filter(|p| is_settled_inbound(p) && !seen.contains(&p.id))
                .filter_map(|p| {
                    Some(SettledPayment {
                        payment_hash: bolt11_hash(p)?.to_string(),
                        amount_sat: p.amount_msat.unwrap_or_default() / 1000,
                    })
                })
                .collect(),
        };

        self.seen = Some(settled);
        fresh
    }
}

/// Lightning gateway over one ldk-server node per wallet.
pub struct LdkGateway {
    nodes: HashMap<String, LdkLightningClient>,
    fee_reserve: FeeReserve,
    poll_interval: Duration,
    // payment_hash -> tags of invoices issued through this gateway
    invoice_tags: Mutex<HashMap<String, PaymentTags>>,
}

impl LdkGateway {
    pub fn new(nodes: HashMap<String, LdkLightningClient>, config: &SwapConfig) -> Self {
        Self {
            nodes,
            fee_reserve: config.fee_reserve,
            poll_interval: config.payment_poll_interval,
            invoice_tags: Mutex::new(HashMap::new()),
        }
    }

    fn node(&self, wallet: &str) -> Result<&LdkLightningClient> {
        self.nodes
            .get(wallet)
            .with_context(|| format!("no lightning node for wallet {wallet}"))
    }

    /// Tags of an invoice issued here, forgotten once handed out.
    fn take_tags(&self, payment_hash: &str) -> PaymentTags {
        self.invoice_tags
            .lock()
            .ok()
            .and_then(|mut tags| tags.remove(payment_hash))
            .unwrap_or_default()
    }

    /// Streams settled incoming payments of every wallet until `shutdown` fires.
    ///
    /// Payments already settled when the poller starts are not reported.
    pub fn spawn_incoming_payments(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> mpsc::Receiver<IncomingPayment> {
        let (tx, rx) = mpsc::channel(64);
        let gateway = Arc::clone(self);

        tokio::spawn(async move {
            let mut watches: HashMap<String, PaymentWatch> = HashMap::new();

            loop {
                for (wallet, node) in &gateway.nodes {
                    let payments = match node.list_payments().await {
                        Ok(payments) => payments,
                        Err(err) => {
                            tracing::warn!(%wallet, error = %err, "list payments failed");
                            continue;
                        }
                    };

                    let fresh = watches.entry(wallet.clone()).or_default().poll(&payments);
                    for settled in fresh {
                        let event = IncomingPayment {
                            wallet: wallet.clone(),
                            tags: gateway.take_tags(&settled.payment_hash),
                            payment_hash: settled.payment_hash,
                            amount_sat: settled.amount_sat,
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(gateway.poll_interval) => {}
                }
            }
        });

        rx
    }
}

#[async_trait]
impl LightningGateway for LdkGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice> {
        let amount_msat = request
            .amount_sat
            .checked_mul(1000)
            .context("invoice amount overflow")?;
        let invoice = self
            .node(&request.wallet)?
            .receive(amount_msat, request.memo.clone(), request.expiry_secs)
            .await
            .context("create invoice")?;
        let payment_hash = payment_hash_from_bolt11(&invoice).context("parse invoice")?;

        if let Ok(mut tags) = self.invoice_tags.lock() {
            tags.insert(payment_hash.clone(), request.tags.clone());
        }

        Ok(CreatedInvoice {
            payment_hash,
            payment_request: invoice,
        })
    }

    async fn pay_invoice(&self, request: &PaymentRequest) -> Result<String> {
        let node = self.node(&request.wallet)?;
        let payment_id = node
            .send(request.payment_request.clone())
            .await
            .context("pay invoice")?;
        tracing::info!(
            wallet = %request.wallet,
            %payment_id,
            swap_id = request.tags.swap_id.as_deref().unwrap_or_default(),
            memo = %request.memo,
            "payment sent"
        );
        node.wait_settled(&payment_id, self.poll_interval).await
    }

    async fn check_settlement(&self, wallet: &str, payment_hash: &str) -> Result<bool> {
        let payments = self.node(wallet)?.list_payments().await?;
        Ok(payments
            .iter()
            .any(|p| is_settled_inbound(p) && bolt11_hash(p) == Some(payment_hash)))
    }

    async fn wallet_balance(&self, wallet: &str) -> Result<u64> {
        self.node(wallet)?.lightning_balance_sat().await
    }

    fn fee_reserve(&self, amount_sat: u64) -> u64 {
        self.fee_reserve.reserve_for(amount_sat)
    }
}
