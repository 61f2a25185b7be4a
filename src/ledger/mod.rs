//! Ledger abstraction for reading token holders and issuing payouts.

use crate::domain::{Address, InstrumentId, TxHash};
use async_trait::async_trait;
use std::fmt;

pub mod mock;
pub mod rpc;

pub use mock::MockLedger;
pub use rpc::RpcLedger;

/// Final state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub success: bool,
    pub error: Option<String>,
}

impl Confirmation {
    pub fn confirmed() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Ledger collaborator.
///
/// Read methods are safe to retry. `transfer` is not: a failed transfer must be
/// reported to the caller, never resubmitted by the implementation.
#[async_trait]
pub trait Ledger: Send + Sync + fmt::Debug {
    /// Addresses holding a non-zero balance of `instrument`.
    async fn list_holders(&self, instrument: &InstrumentId) -> Result<Vec<Address>, LedgerError>;

    /// Balance of `address` in `instrument`, in base units.
    async fn get_balance(
        &self,
        address: &Address,
        instrument: &InstrumentId,
    ) -> Result<u128, LedgerError>;

    /// Submit a transfer signed by `signer`. Returns once the transaction is accepted
    /// for inclusion, not once it is final.
    async fn transfer(
        &self,
        signer: &Address,
        recipient: &Address,
        amount: u128,
        instrument: &InstrumentId,
    ) -> Result<TxHash, LedgerError>;

    /// Block until the transaction is final.
    async fn wait_for_confirmation(&self, hash: &TxHash) -> Result<Confirmation, LedgerError>;

    async fn current_block_height(&self) -> Result<u64, LedgerError>;
}

/// Error type for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network error (e.g., connection refused, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// JSON-RPC error object returned by the node
    RpcError { code: i64, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// Signer cannot cover the transfer
    InsufficientFunds(String),
    /// Other error
    Other(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LedgerError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            LedgerError::RpcError { code, message } => write!(f, "RPC error {}: {}", code, message),
            LedgerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LedgerError::RateLimited => write!(f, "Rate limited"),
            LedgerError::InsufficientFunds(msg) => write!(f, "Insufficient funds: {}", msg),
            LedgerError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_display() {
        let err = LedgerError::NetworkError("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = LedgerError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = LedgerError::RpcError {
            code: -32000,
            message: "nonce too low".to_string(),
        };
        assert_eq!(err.to_string(), "RPC error -32000: nonce too low");

        let err = LedgerError::InsufficientFunds("need 10".to_string());
        assert_eq!(err.to_string(), "Insufficient funds: need 10");
    }

    #[test]
    fn test_confirmation_constructors() {
        assert!(Confirmation::confirmed().success);
        let rejected = Confirmation::rejected("reverted");
        assert!(!rejected.success);
        assert_eq!(rejected.error.as_deref(), Some("reverted"));
    }
}
