use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

use boltz_swap::lightning::{
    CreatedInvoice, InvoiceRequest, LightningGateway, PaymentRequest,
};
use boltz_swap::swap::client::{
    ClaimRequest, CreatedReverseSwap, CreatedSwap, PairFees, PairLimits, RefundRequest,
    RemoteSwapStatus, SwapServiceClient,
};
use boltz_swap::swap::store::{SqliteSwapStore, SwapStore};
use boltz_swap::swap::{
    AutoReverseSubmarineSwap, ReverseSubmarineSwap, SubmarineSwap, SwapAsset, SwapStatus,
};
use boltz_swap::swap::error::ServiceError;

/// Sets its flag when dropped; dropped only if the owning future is aborted.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    NotFound,
    TimeoutNotReached,
    SwapStatus,
    Unavailable,
}

impl Fault {
    fn error(self, boltz_id: &str) -> ServiceError {
        match self {
            Fault::NotFound => ServiceError::NotFound(boltz_id.to_string()),
            Fault::TimeoutNotReached => ServiceError::TimeoutNotReached {
                current_height: 100,
                timeout_height: 200,
            },
            Fault::SwapStatus => ServiceError::SwapStatus("swap.expired".to_string()),
            Fault::Unavailable => ServiceError::Unavailable(anyhow::anyhow!("connection refused")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    Succeed,
    Fail,
    /// Never sees a lockup.
    Pending,
}

pub struct FakeSwapClient {
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fees: Mutex<PairFees>,
    claim_fee: AtomicU64,
    claim_mode: Mutex<ClaimMode>,
    status_faults: Mutex<HashMap<String, Fault>>,
    remote_status: Mutex<HashMap<String, String>>,
    refund_faults: Mutex<HashMap<String, Fault>>,
    estimate_fault: Mutex<Option<Fault>>,
    pub claim_seen: Arc<Notify>,
    pub claim_dropped: Arc<AtomicBool>,
}

impl FakeSwapClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fees: Mutex::new(PairFees {
                percentage: 0.5,
                miner_fee_sat: 100,
                reverse_percentage: 0.5,
                reverse_miner_fee_sat: 100,
            }),
            claim_fee: AtomicU64::new(2),
            claim_mode: Mutex::new(ClaimMode::Succeed),
            status_faults: Mutex::new(HashMap::new()),
            remote_status: Mutex::new(HashMap::new()),
            refund_faults: Mutex::new(HashMap::new()),
            estimate_fault: Mutex::new(None),
            claim_seen: Arc::new(Notify::new()),
            claim_dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_claim_fee(&self, fee: u64) {
        self.claim_fee.store(fee, Ordering::SeqCst);
    }

    pub fn set_claim_mode(&self, mode: ClaimMode) {
        *self.claim_mode.lock().unwrap() = mode;
    }

    pub fn fail_status(&self, boltz_id: &str, fault: Fault) {
        self.status_faults
            .lock()
            .unwrap()
            .insert(boltz_id.to_string(), fault);
    }

    pub fn set_remote_status(&self, boltz_id: &str, status: &str) {
        self.remote_status
            .lock()
            .unwrap()
            .insert(boltz_id.to_string(), status.to_string());
    }

    pub fn fail_refund(&self, boltz_id: &str, fault: Fault) {
        self.refund_faults
            .lock()
            .unwrap()
            .insert(boltz_id.to_string(), fault);
    }

    pub fn fail_estimate(&self, fault: Fault) {
        *self.estimate_fault.lock().unwrap() = Some(fault);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapServiceClient for FakeSwapClient {
    async fn create_swap(
        &self,
        _asset: SwapAsset,
        invoice: &str,
    ) -> Result<CreatedSwap, ServiceError> {
        self.record(format!("create_swap:{invoice}"));
        let n = self.next();
        Ok(CreatedSwap {
            boltz_id: format!("boltz-{n}"),
            refund_privkey: format!("refund-key-{n}"),
            address: format!("bcrt1q-lockup-{n}"),
            expected_amount: 10_000,
            redeem_script: "a914".to_string(),
            timeout_block_height: 200,
            bip21: format!("bitcoin:bcrt1q-lockup-{n}"),
            blinding_key: None,
        })
    }

    async fn create_reverse_swap(
        &self,
        _asset: SwapAsset,
        amount_sat: u64,
    ) -> Result<CreatedReverseSwap, ServiceError> {
        self.record(format!("create_reverse_swap:{amount_sat}"));
        let n = self.next();
        Ok(CreatedReverseSwap {
            boltz_id: format!("boltz-{n}"),
            preimage: "11".repeat(32),
            claim_privkey: format!("claim-key-{n}"),
            lockup_address: format!("bcrt1q-lockup-{n}"),
            invoice: format!("lnbcrt-reverse-{n}"),
            onchain_amount: amount_sat.saturating_sub(100),
            timeout_block_height: 200,
            redeem_script: "a914".to_string(),
            blinding_key: None,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<String, ServiceError> {
        self.record(format!("refund:{}", request.boltz_id));
        let fault = self.refund_faults.lock().unwrap().get(&request.boltz_id).copied();
        match fault {
            Some(fault) => Err(fault.error(&request.boltz_id)),
            None => Ok(format!("refund-tx-{}", request.boltz_id)),
        }
    }

    async fn claim(&self, request: &ClaimRequest) -> Result<String, ServiceError> {
        self.record(format!("claim:{}", request.boltz_id));
        self.claim_seen.notify_one();

        let mode = *self.claim_mode.lock().unwrap();
        match mode {
            ClaimMode::Succeed => Ok(format!("claim-tx-{}", request.boltz_id)),
            ClaimMode::Fail => Err(ServiceError::Unavailable(anyhow::anyhow!(
                "lockup transaction rejected"
            ))),
            ClaimMode::Pending => {
                let _flag = DropFlag(self.claim_dropped.clone());
                std::future::pending::<Result<String, ServiceError>>().await
            }
        }
    }

    async fn swap_status(&self, boltz_id: &str) -> Result<RemoteSwapStatus, ServiceError> {
        self.record(format!("swap_status:{boltz_id}"));
        if let Some(fault) = self.status_faults.lock().unwrap().get(boltz_id).copied() {
            return Err(fault.error(boltz_id));
        }
        let status = self
            .remote_status
            .lock()
            .unwrap()
            .get(boltz_id)
            .cloned()
            .unwrap_or_else(|| "transaction.mempool".to_string());
        Ok(RemoteSwapStatus::new(status))
    }

    async fn estimate_claim_fee(&self, _asset: SwapAsset) -> Result<u64, ServiceError> {
        self.record("estimate_claim_fee".to_string());
        if let Some(fault) = *self.estimate_fault.lock().unwrap() {
            return Err(fault.error("estimate"));
        }
        Ok(self.claim_fee.load(Ordering::SeqCst))
    }

    async fn pair_fees(&self, _asset: SwapAsset) -> Result<PairFees, ServiceError> {
        self.record("pair_fees".to_string());
        Ok(*self.fees.lock().unwrap())
    }

    async fn pair_limits(&self, _asset: SwapAsset) -> Result<PairLimits, ServiceError> {
        self.record("pair_limits".to_string());
        Ok(PairLimits {
            minimal_sat: 10_000,
            maximal_sat: 25_000_000,
        })
    }
}

#[derive(Debug, Clone)]
pub enum PayMode {
    Succeed,
    Fail,
    /// Never settles.
    Pending,
    /// Settles once the notify fires, like a hold invoice waiting on the claim.
    Hold(Arc<Notify>),
}

pub struct FakeGateway {
    next_id: AtomicU64,
    fee_reserve: AtomicU64,
    balances: Mutex<HashMap<String, u64>>,
    settled: Mutex<HashSet<String>>,
    invoices: Mutex<Vec<InvoiceRequest>>,
    payments: Mutex<Vec<PaymentRequest>>,
    pay_mode: Mutex<PayMode>,
    pub pay_dropped: Arc<AtomicBool>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            fee_reserve: AtomicU64::new(10),
            balances: Mutex::new(HashMap::new()),
            settled: Mutex::new(HashSet::new()),
            invoices: Mutex::new(Vec::new()),
            payments: Mutex::new(Vec::new()),
            pay_mode: Mutex::new(PayMode::Succeed),
            pay_dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn set_balance(&self, wallet: &str, balance_sat: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert(wallet.to_string(), balance_sat);
    }

    /// Fixed reserve returned for any amount.
    pub fn set_fee_reserve(&self, reserve_sat: u64) {
        self.fee_reserve.store(reserve_sat, Ordering::SeqCst);
    }

    pub fn set_pay_mode(&self, mode: PayMode) {
        *self.pay_mode.lock().unwrap() = mode;
    }

    pub fn settle(&self, payment_hash: &str) {
        self.settled
            .lock()
            .unwrap()
            .insert(payment_hash.to_string());
    }

    pub fn invoices(&self) -> Vec<InvoiceRequest> {
        self.invoices.lock().unwrap().clone()
    }

    pub fn payments(&self) -> Vec<PaymentRequest> {
        self.payments.lock().unwrap().clone()
    }
}

#[async_trait]
impl LightningGateway for FakeGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice> {
        self.invoices.lock().unwrap().push(request.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedInvoice {
            payment_hash: format!("hash-{n}"),
            payment_request: format!("lnbcrt-{n}"),
        })
    }

    async fn pay_invoice(&self, request: &PaymentRequest) -> Result<String> {
        self.payments.lock().unwrap().push(request.clone());

        let mode = self.pay_mode.lock().unwrap().clone();
        match mode {
            PayMode::Succeed => Ok("22".repeat(32)),
            PayMode::Fail => anyhow::bail!("no route found"),
            PayMode::Pending => {
                let _flag = DropFlag(self.pay_dropped.clone());
                std::future::pending::<Result<String>>().await
            }
            PayMode::Hold(release) => {
                release.notified().await;
                Ok("22".repeat(32))
            }
        }
    }

    async fn check_settlement(&self, _wallet: &str, payment_hash: &str) -> Result<bool> {
        Ok(self.settled.lock().unwrap().contains(payment_hash))
    }

    async fn wallet_balance(&self, wallet: &str) -> Result<u64> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(wallet)
            .copied()
            .unwrap_or_default())
    }

    fn fee_reserve(&self, _amount_sat: u64) -> u64 {
        self.fee_reserve.load(Ordering::SeqCst)
    }
}

/// SQLite store whose next `fail_reads` submarine swap lookups error.
pub struct FlakyStore {
    inner: Arc<SqliteSwapStore>,
    fail_reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteSwapStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_reads: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    pub fn failing_reads_left(&self) -> usize {
        self.fail_reads.load(Ordering::SeqCst)
    }

    fn read_fault(&self) -> Result<()> {
        let armed = self
            .fail_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

impl SwapStore for FlakyStore {
    fn insert_submarine_swap(&self, swap: &SubmarineSwap) -> Result<()> {
        self.inner.insert_submarine_swap(swap)
    }

    fn get_submarine_swap(&self, id: &str) -> Result<Option<SubmarineSwap>> {
        self.read_fault()?;
        self.inner.get_submarine_swap(id)
    }

    fn get_submarine_swap_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<Option<SubmarineSwap>> {
        self.read_fault()?;
        self.inner.get_submarine_swap_by_payment_hash(payment_hash)
    }

    fn list_submarine_swaps(&self, wallets: &[String]) -> Result<Vec<SubmarineSwap>> {
        self.inner.list_submarine_swaps(wallets)
    }

    fn list_pending_submarine_swaps(&self) -> Result<Vec<SubmarineSwap>> {
        self.inner.list_pending_submarine_swaps()
    }

    fn insert_reverse_swap(&self, swap: &ReverseSubmarineSwap) -> Result<()> {
        self.inner.insert_reverse_swap(swap)
    }

    fn get_reverse_swap(&self, id: &str) -> Result<Option<ReverseSubmarineSwap>> {
        self.inner.get_reverse_swap(id)
    }

    fn list_reverse_swaps(&self, wallets: &[String]) -> Result<Vec<ReverseSubmarineSwap>> {
        self.inner.list_reverse_swaps(wallets)
    }

    fn list_pending_reverse_swaps(&self) -> Result<Vec<ReverseSubmarineSwap>> {
        self.inner.list_pending_reverse_swaps()
    }

    fn insert_auto_swap(&self, swap: &AutoReverseSubmarineSwap) -> Result<()> {
        self.inner.insert_auto_swap(swap)
    }

    fn get_auto_swap(&self, id: &str) -> Result<Option<AutoReverseSubmarineSwap>> {
        self.inner.get_auto_swap(id)
    }

    fn get_auto_swap_by_wallet(&self, wallet: &str) -> Result<Option<AutoReverseSubmarineSwap>> {
        self.inner.get_auto_swap_by_wallet(wallet)
    }

    fn list_auto_swaps(&self, wallets: &[String]) -> Result<Vec<AutoReverseSubmarineSwap>> {
        self.inner.list_auto_swaps(wallets)
    }

    fn update_auto_swap_count(&self, id: &str, count: u64) -> Result<()> {
        self.inner.update_auto_swap_count(id, count)
    }

    fn delete_auto_swap(&self, id: &str) -> Result<bool> {
        self.inner.delete_auto_swap(id)
    }

    fn update_swap_status(&self, id: &str, status: SwapStatus) -> Result<bool> {
        self.inner.update_swap_status(id, status)
    }
}
