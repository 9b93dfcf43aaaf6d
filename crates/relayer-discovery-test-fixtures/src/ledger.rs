use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use relayer_discovery::{find_transaction_pda, Message, RelayerTransaction};
use relayer_discovery_resolver::{
    DiscoveryRpc, ExecutionReceipt, Executor, FinalTransaction, FundingSource, PayloadStager,
    SimulationRequest, TransportError,
};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

/// Accounts and balances of the in-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    /// Account data by address.
    pub accounts: HashMap<Pubkey, Vec<u8>>,
    /// Lamports by address.
    pub balances: HashMap<Pubkey, u64>,
}

impl LedgerState {
    #[must_use]
    pub fn balance(&self, account: &Pubkey) -> u64 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Moves `lamports` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// If `from` holds less than `lamports`.
    pub fn transfer(&mut self, from: &Pubkey, to: &Pubkey, lamports: u64) -> Result<(), String> {
        let available = self.balance(from);
        let remaining = available.checked_sub(lamports).ok_or_else(|| {
            format!("{from} holds {available} lamports, {lamports} needed")
        })?;
        self.balances.insert(*from, remaining);
        *self.balances.entry(*to).or_default() += lamports;
        Ok(())
    }

    /// Burns `lamports` from `account`, like a transaction fee.
    ///
    /// # Errors
    ///
    /// If `account` holds less than `lamports`.
    pub fn charge(&mut self, account: &Pubkey, lamports: u64) -> Result<(), String> {
        let available = self.balance(account);
        let remaining = available.checked_sub(lamports).ok_or_else(|| {
            format!("fee payer {account} holds {available} lamports, the fee is {lamports}")
        })?;
        self.balances.insert(*account, remaining);
        Ok(())
    }

    /// The data of `account`, or an error naming it.
    ///
    /// # Errors
    ///
    /// If no account exists at `account`.
    pub fn data(&self, account: &Pubkey) -> Result<&[u8], String> {
        self.accounts
            .get(account)
            .map(Vec::as_slice)
            .ok_or_else(|| format!("account {account} not found"))
    }
}

/// A destination program living on the [`TestLedger`].
pub trait DestinationProgram: Send + Sync {
    /// Handles `instruction` in a simulation and returns its return data.
    ///
    /// # Errors
    ///
    /// A message describing why the instruction failed.
    fn simulate(&self, instruction: &Instruction, state: &LedgerState) -> Result<Vec<u8>, String>;

    /// Handles `instruction` in a real transaction.
    ///
    /// # Errors
    ///
    /// A message describing why the instruction failed. The whole transaction is
    /// rolled back.
    fn execute(&self, instruction: &Instruction, state: &mut LedgerState) -> Result<(), String>;

    /// How long simulating one of this program's instructions takes.
    fn latency(&self) -> Duration {
        Duration::ZERO
    }
}

#[derive(Default)]
struct Inner {
    state: LedgerState,
    programs: HashMap<Pubkey, Arc<dyn DestinationProgram>>,
    fetches: Vec<Pubkey>,
    simulations: Vec<SimulationRequest>,
    top_ups: Vec<(Pubkey, u64)>,
    executed: Vec<FinalTransaction>,
    staged: Vec<[u8; 32]>,
}

/// An in-memory ledger implementing every relayer collaborator.
///
/// Simulations run against a copy of the state, executions are atomic. The funding
/// wallet is a regular account that top ups are debited from. It is also the fee
/// payer: a transaction fee, if set, is charged to it before any instruction runs,
/// and simulations are rejected while it can't cover that fee.
pub struct TestLedger {
    funder: Pubkey,
    transaction_fee: u64,
    inner: Mutex<Inner>,
}

impl TestLedger {
    /// A ledger whose funding wallet holds `funder_balance` lamports.
    #[must_use]
    pub fn new(funder_balance: u64) -> Self {
        let funder = Pubkey::new_unique();
        let mut inner = Inner::default();
        inner.state.balances.insert(funder, funder_balance);
        Self {
            funder,
            transaction_fee: 0,
            inner: Mutex::new(inner),
        }
    }

    /// Charges `lamports` to the fee payer of every executed transaction.
    #[must_use]
    pub fn with_transaction_fee(mut self, lamports: u64) -> Self {
        self.transaction_fee = lamports;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing panics while holding the lock, so a poisoned one is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub const fn funder(&self) -> Pubkey {
        self.funder
    }

    /// Makes `program` callable at `program_id`.
    pub fn deploy(&self, program_id: Pubkey, program: Arc<dyn DestinationProgram>) {
        self.lock().programs.insert(program_id, program);
    }

    /// Stores `transaction` at the transaction pda of `program_id`, like
    /// [`RelayerTransaction::init`] does on chain.
    pub fn publish(&self, program_id: &Pubkey, transaction: &RelayerTransaction) {
        let (address, _) =
            find_transaction_pda(program_id).expect("test program ids have a viable bump");
        self.lock()
            .state
            .accounts
            .insert(address, transaction.encode());
    }

    /// Stores raw bytes at the transaction pda of `program_id`.
    pub fn publish_raw(&self, program_id: &Pubkey, bytes: Vec<u8>) {
        let (address, _) =
            find_transaction_pda(program_id).expect("test program ids have a viable bump");
        self.lock().state.accounts.insert(address, bytes);
    }

    /// Records the gateway approval of `message` and returns the incoming message
    /// account.
    pub fn approve(&self, message: &Message) -> Pubkey {
        let incoming_message = Pubkey::new_unique();
        self.lock()
            .state
            .accounts
            .insert(incoming_message, message.encode());
        incoming_message
    }

    /// Stores `payload` in a fresh account and returns it.
    pub fn store_payload(&self, payload: &[u8]) -> Pubkey {
        let account = Pubkey::new_unique();
        self.lock().state.accounts.insert(account, payload.to_vec());
        account
    }

    pub fn set_balance(&self, account: Pubkey, lamports: u64) {
        self.lock().state.balances.insert(account, lamports);
    }

    #[must_use]
    pub fn balance_of(&self, account: &Pubkey) -> u64 {
        self.lock().state.balance(account)
    }

    #[must_use]
    pub fn account_data(&self, account: &Pubkey) -> Option<Vec<u8>> {
        self.lock().state.accounts.get(account).cloned()
    }

    /// Every address fetched so far.
    #[must_use]
    pub fn fetches(&self) -> Vec<Pubkey> {
        self.lock().fetches.clone()
    }

    /// Every simulation request so far.
    #[must_use]
    pub fn simulations(&self) -> Vec<SimulationRequest> {
        self.lock().simulations.clone()
    }

    /// Every top up so far, as `(payer, lamports)`.
    #[must_use]
    pub fn top_ups(&self) -> Vec<(Pubkey, u64)> {
        self.lock().top_ups.clone()
    }

    /// Every successfully executed transaction.
    #[must_use]
    pub fn executed(&self) -> Vec<FinalTransaction> {
        self.lock().executed.clone()
    }

    /// Command ids of every staged payload.
    #[must_use]
    pub fn staged(&self) -> Vec<[u8; 32]> {
        self.lock().staged.clone()
    }

    fn program(
        inner: &Inner,
        program_id: &Pubkey,
    ) -> Result<Arc<dyn DestinationProgram>, String> {
        inner
            .programs
            .get(program_id)
            .cloned()
            .ok_or_else(|| format!("program {program_id} is not deployed"))
    }
}

#[async_trait]
impl DiscoveryRpc for TestLedger {
    async fn fetch_account_data(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut inner = self.lock();
        inner.fetches.push(*address);
        Ok(inner.state.accounts.get(address).cloned())
    }

    async fn simulate(&self, request: SimulationRequest) -> Result<Vec<u8>, TransportError> {
        let latency = {
            let mut inner = self.lock();
            inner.simulations.push(request.clone());
            request
                .instructions
                .iter()
                .filter_map(|instruction| inner.programs.get(&instruction.program_id))
                .map(|program| program.latency())
                .sum::<Duration>()
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let inner = self.lock();
        if inner.state.balance(&request.fee_payer) < self.transaction_fee {
            return Err(TransportError::Rejected(format!(
                "fee payer {} can't pay the transaction fee",
                request.fee_payer
            )));
        }
        let mut return_data = Vec::new();
        for instruction in &request.instructions {
            let program =
                Self::program(&inner, &instruction.program_id).map_err(TransportError::Rejected)?;
            return_data = program
                .simulate(instruction, &inner.state)
                .map_err(TransportError::Rejected)?;
        }
        if return_data.is_empty() {
            return Err(TransportError::MissingReturnData);
        }
        Ok(return_data)
    }
}

#[async_trait]
impl FundingSource for TestLedger {
    fn fee_payer(&self) -> Pubkey {
        self.funder
    }

    async fn balance(&self, account: &Pubkey) -> Result<u64, TransportError> {
        Ok(self.balance_of(account))
    }

    async fn top_up(&self, payer: &Pubkey, lamports: u64) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner
            .state
            .transfer(&self.funder, payer, lamports)
            .map_err(TransportError::Rejected)?;
        inner.top_ups.push((*payer, lamports));
        Ok(())
    }
}

#[async_trait]
impl Executor for TestLedger {
    async fn execute(
        &self,
        transaction: FinalTransaction,
    ) -> Result<ExecutionReceipt, TransportError> {
        let mut inner = self.lock();

        let unsigned = transaction
            .instructions
            .iter()
            .flat_map(|instruction| &instruction.accounts)
            .find(|meta| meta.is_signer && !transaction.signers.contains(&meta.pubkey));
        if let Some(meta) = unsigned {
            return Err(TransportError::MissingSigner(meta.pubkey));
        }
        if !transaction.signers.contains(&transaction.fee_payer) {
            return Err(TransportError::MissingSigner(transaction.fee_payer));
        }

        let mut state = inner.state.clone();
        state
            .charge(&transaction.fee_payer, self.transaction_fee)
            .map_err(TransportError::Rejected)?;
        for instruction in &transaction.instructions {
            let program =
                Self::program(&inner, &instruction.program_id).map_err(TransportError::Rejected)?;
            program
                .execute(instruction, &mut state)
                .map_err(TransportError::Rejected)?;
        }
        inner.state = state;
        inner.executed.push(transaction);

        let mut signature = [0_u8; 64];
        let sequence = (inner.executed.len() as u64).to_le_bytes();
        for (byte, sequence_byte) in signature.iter_mut().zip(sequence) {
            *byte = sequence_byte;
        }
        Ok(ExecutionReceipt {
            signature: Signature::from(signature),
        })
    }
}

#[async_trait]
impl PayloadStager for TestLedger {
    async fn stage_payload(
        &self,
        command_id: [u8; 32],
        payload: &[u8],
    ) -> Result<Pubkey, TransportError> {
        let account = self.store_payload(payload);
        self.lock().staged.push(command_id);
        Ok(account)
    }
}
