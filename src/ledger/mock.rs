//! In-memory ledger for testing without network calls.

use super::{Confirmation, Ledger, LedgerError};
use crate::domain::{Address, InstrumentId, TxHash};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A transfer accepted by the mock ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTransfer {
    pub nonce: u64,
    pub signer: Address,
    pub recipient: Address,
    pub amount: u128,
    pub instrument: InstrumentId,
    pub hash: TxHash,
}

#[derive(Debug, Default)]
struct MockState {
    holders: HashMap<InstrumentId, Vec<Address>>,
    balances: HashMap<(Address, InstrumentId), u128>,
    transfers: Vec<MockTransfer>,
    recipients_by_hash: HashMap<TxHash, Address>,
    next_nonce: u64,
    active_reads: usize,
    max_active_reads: usize,
    active_transfers: usize,
    max_active_transfers: usize,
}

/// Mock ledger with failure injection and transfer bookkeeping.
#[derive(Debug, Clone)]
pub struct MockLedger {
    state: Arc<Mutex<MockState>>,
    unreachable: bool,
    block_height: u64,
    failing_balances: HashSet<(Address, InstrumentId)>,
    balance_delay: Option<Duration>,
    failing_transfers: HashSet<Address>,
    rejected_confirmations: HashSet<Address>,
    hanging_confirmations: HashSet<Address>,
    confirmation_delay: Option<Duration>,
}

impl MockLedger {
    /// Create a new mock ledger with no holders.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            unreachable: false,
            block_height: 1,
            failing_balances: HashSet::new(),
            balance_delay: None,
            failing_transfers: HashSet::new(),
            rejected_confirmations: HashSet::new(),
            hanging_confirmations: HashSet::new(),
            confirmation_delay: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `address` as a holder of `instrument` with `balance`.
    pub fn with_balance(self, address: &str, instrument: &str, balance: u128) -> Self {
        self.set_balance(address, instrument, balance);
        self
    }

    /// Register `address` in the holder list of `instrument` without a balance entry.
    pub fn with_holder(self, address: &str, instrument: &str) -> Self {
        {
            let mut state = self.lock();
            let holders = state
                .holders
                .entry(InstrumentId::new(instrument.to_string()))
                .or_default();
            let address = Address::new(address.to_string());
            if !holders.contains(&address) {
                holders.push(address);
            }
        }
        self
    }

    pub fn with_block_height(mut self, height: u64) -> Self {
        self.block_height = height;
        self
    }

    /// Every call fails with a network error.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_failing_balance(mut self, address: &str, instrument: &str) -> Self {
        self.failing_balances.insert((
            Address::new(address.to_string()),
            InstrumentId::new(instrument.to_string()),
        ));
        self
    }

    pub fn with_balance_delay(mut self, delay: Duration) -> Self {
        self.balance_delay = Some(delay);
        self
    }

    /// Transfers to `recipient` are refused at submission.
    pub fn with_failing_transfer(mut self, recipient: &str) -> Self {
        self.failing_transfers.insert(Address::new(recipient.to_string()));
        self
    }

    /// Transfers to `recipient` are accepted but fail on-ledger.
    pub fn with_rejected_confirmation(mut self, recipient: &str) -> Self {
        self.rejected_confirmations
            .insert(Address::new(recipient.to_string()));
        self
    }

    /// Transfers to `recipient` never reach finality.
    pub fn with_hanging_confirmation(mut self, recipient: &str) -> Self {
        self.hanging_confirmations
            .insert(Address::new(recipient.to_string()));
        self
    }

    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = Some(delay);
        self
    }

    /// Change a balance; the address is added to the instrument's holder list if needed.
    pub fn set_balance(&self, address: &str, instrument: &str, balance: u128) {
        let address = Address::new(address.to_string());
        let instrument = InstrumentId::new(instrument.to_string());
        let mut state = self.lock();
        let holders = state.holders.entry(instrument.clone()).or_default();
        if !holders.contains(&address) {
            holders.push(address.clone());
        }
        state.balances.insert((address, instrument), balance);
    }

    /// Transfers accepted so far, in submission order.
    pub fn transfers(&self) -> Vec<MockTransfer> {
        self.lock().transfers.clone()
    }

    /// Highest number of balance lookups observed in flight at once.
    pub fn max_concurrent_reads(&self) -> usize {
        self.lock().max_active_reads
    }

    /// Highest number of transfer submissions observed in flight at once.
    pub fn max_concurrent_transfers(&self) -> usize {
        self.lock().max_active_transfers
    }

    fn check_reachable(&self) -> Result<(), LedgerError> {
        if self.unreachable {
            return Err(LedgerError::NetworkError("ledger unreachable".to_string()));
        }
        Ok(())
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn list_holders(&self, instrument: &InstrumentId) -> Result<Vec<Address>, LedgerError> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .holders
            .get(instrument)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_balance(
        &self,
        address: &Address,
        instrument: &InstrumentId,
    ) -> Result<u128, LedgerError> {
        self.check_reachable()?;
        {
            let mut state = self.lock();
            state.active_reads += 1;
            state.max_active_reads = state.max_active_reads.max(state.active_reads);
        }

        match self.balance_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let mut state = self.lock();
        state.active_reads -= 1;
        if self
            .failing_balances
            .contains(&(address.clone(), instrument.clone()))
        {
            return Err(LedgerError::HttpError {
                status: 503,
                message: "balance lookup failed".to_string(),
            });
        }
        Ok(state
            .balances
            .get(&(address.clone(), instrument.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn transfer(
        &self,
        signer: &Address,
        recipient: &Address,
        amount: u128,
        instrument: &InstrumentId,
    ) -> Result<TxHash, LedgerError> {
        self.check_reachable()?;
        {
            let mut state = self.lock();
            state.active_transfers += 1;
            state.max_active_transfers = state.max_active_transfers.max(state.active_transfers);
        }

        tokio::task::yield_now().await;

        let mut state = self.lock();
        state.active_transfers -= 1;
        if self.failing_transfers.contains(recipient) {
            return Err(LedgerError::InsufficientFunds(format!(
                "cannot transfer {} to {}",
                amount, recipient
            )));
        }

        let nonce = state.next_nonce;
        state.next_nonce += 1;
        let hash = TxHash::new(format!("0xtx{:04}", nonce));
        state.recipients_by_hash.insert(hash.clone(), recipient.clone());
        state.transfers.push(MockTransfer {
            nonce,
            signer: signer.clone(),
            recipient: recipient.clone(),
            amount,
            instrument: instrument.clone(),
            hash: hash.clone(),
        });
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, hash: &TxHash) -> Result<Confirmation, LedgerError> {
        self.check_reachable()?;
        let recipient = self
            .lock()
            .recipients_by_hash
            .get(hash)
            .cloned()
            .ok_or_else(|| LedgerError::Other(format!("unknown transaction {}", hash)))?;

        if self.hanging_confirmations.contains(&recipient) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.confirmation_delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejected_confirmations.contains(&recipient) {
            return Ok(Confirmation::rejected("execution reverted"));
        }
        Ok(Confirmation::confirmed())
    }

    async fn current_block_height(&self) -> Result<u64, LedgerError> {
        self.check_reachable()?;
        Ok(self.block_height)
    }
}
