//! The ledger collaborators the relayer talks to.
//!
//! Every method is a suspension point of the discovery loop. Implementations are
//! shared by all concurrently relayed messages and therefore must not keep
//! per-message state.

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::TransportError;

/// Instructions to simulate without touching ledger state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    /// Pays the (simulated) fees. Never the `Payer` account of the relay.
    pub fee_payer: Pubkey,
    /// The materialized instructions, in order.
    pub instructions: Vec<Instruction>,
}

/// A fully materialized and funded transaction, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalTransaction {
    /// Pays the fees, so that the `Payer` account still holds its full top up when
    /// the instructions run.
    pub fee_payer: Pubkey,
    /// The materialized instructions, in order.
    pub instructions: Vec<Instruction>,
    /// Every account that has to sign, `fee_payer` first.
    pub signers: Vec<Pubkey>,
}

/// Proof that a [`FinalTransaction`] was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// The signature of the executed transaction.
    pub signature: Signature,
}

/// Reading account data and simulating discovery rounds.
#[async_trait]
pub trait DiscoveryRpc: Send + Sync {
    /// The data stored at `address`, or `None` if no account exists there.
    async fn fetch_account_data(&self, address: &Pubkey)
        -> Result<Option<Vec<u8>>, TransportError>;

    /// Simulates `request` and returns the return data of its last instruction.
    async fn simulate(&self, request: SimulationRequest) -> Result<Vec<u8>, TransportError>;
}

/// The wallet that tops up the payer and pays transaction fees.
#[async_trait]
pub trait FundingSource: Send + Sync {
    /// The account paying the fees of every simulated and executed transaction.
    fn fee_payer(&self) -> Pubkey;

    /// The current lamport balance of `account`.
    async fn balance(&self, account: &Pubkey) -> Result<u64, TransportError>;

    /// Transfers exactly `lamports` to `payer`.
    async fn top_up(&self, payer: &Pubkey, lamports: u64) -> Result<(), TransportError>;
}

/// Submits final transactions.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Signs `transaction` with every key in its signer list and submits it.
    async fn execute(&self, transaction: FinalTransaction)
        -> Result<ExecutionReceipt, TransportError>;
}

/// Uploads message payloads so that `MessagePayload` references can be resolved.
#[async_trait]
pub trait PayloadStager: Send + Sync {
    /// Stores `payload` for the message with `command_id` and returns the account
    /// holding it.
    async fn stage_payload(
        &self,
        command_id: [u8; 32],
        payload: &[u8],
    ) -> Result<Pubkey, TransportError>;
}

/// Everything a relay needs from the ledger.
pub trait RelayerTransport: DiscoveryRpc + FundingSource + Executor {}

impl<T: DiscoveryRpc + FundingSource + Executor + ?Sized> RelayerTransport for T {}
