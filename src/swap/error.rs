use thiserror::Error;

/// Failures reported by the remote swap service client.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service no longer recognizes the swap id.
    #[error("swap not found: {0}")]
    NotFound(String),

    /// A refund was attempted before the swap's timeout block height.
    #[error("timeout block height not reached: current {current_height}, timeout {timeout_height}")]
    TimeoutNotReached {
        current_height: u32,
        timeout_height: u32,
    },

    /// The service reports the swap in a failed state.
    #[error("swap status: {0}")]
    SwapStatus(String),

    /// Unreachable, rejected the request, or any other transport-level fault.
    #[error("swap service unavailable: {0:#}")]
    Unavailable(#[from] anyhow::Error),
}

/// Errors returned by the swap orchestrator to its callers.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(
        "insufficient balance: balance {balance_sat} sat, fee reserve {fee_reserve_sat} sat, requested {amount_sat} sat"
    )]
    InsufficientFunds {
        balance_sat: u64,
        fee_reserve_sat: u64,
        amount_sat: u64,
    },

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("swap service error: {0}")]
    Service(#[source] ServiceError),

    #[error("swap service does not know swap {0}")]
    ServiceNotFound(String),

    #[error("timeout block height not reached")]
    TimeoutNotReached,

    #[error("refund failed: {0}")]
    RefundFailure(#[source] ServiceError),

    #[error("lightning: {0:#}")]
    Lightning(#[source] anyhow::Error),

    #[error("store: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl From<ServiceError> for SwapError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(id) => SwapError::ServiceNotFound(id),
            ServiceError::TimeoutNotReached { .. } => SwapError::TimeoutNotReached,
            other => SwapError::Service(other),
        }
    }
}

pub type SwapResult<T> = Result<T, SwapError>;
