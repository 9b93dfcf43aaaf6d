//! Every collaborator trait, backed by a Solana JSON RPC node.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;

use crate::transport::{
    DiscoveryRpc, ExecutionReceipt, Executor, FinalTransaction, FundingSource, SimulationRequest,
};
use crate::TransportError;

/// Talks to the ledger through a nonblocking [`RpcClient`].
///
/// The funder pays every fee and tops up the payer. The payer only signs for the
/// `Payer` accounts of final transactions, so an exact top up reaches the destination
/// program in full and a drained payer can still be simulated against.
pub struct RpcRelayerClient {
    rpc: Arc<RpcClient>,
    payer: Arc<Keypair>,
    funder: Arc<Keypair>,
    extra_signers: Vec<Arc<Keypair>>,
}

impl RpcRelayerClient {
    /// A client signing `Payer` accounts with `payer` and paying fees from `funder`.
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>, payer: Arc<Keypair>, funder: Arc<Keypair>) -> Self {
        Self {
            rpc,
            payer,
            funder,
            extra_signers: Vec::new(),
        }
    }

    /// Adds a keypair for `Fixed` accounts published as signers.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<Keypair>) -> Self {
        self.extra_signers.push(signer);
        self
    }

    /// The account that signs for `Payer` accounts.
    #[must_use]
    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    fn keypair(&self, pubkey: &Pubkey) -> Option<&Keypair> {
        core::iter::once(&self.payer)
            .chain(core::iter::once(&self.funder))
            .chain(self.extra_signers.iter())
            .find(|keypair| keypair.pubkey() == *pubkey)
            .map(|keypair| &**keypair)
    }
}

fn rpc_error(error: impl core::fmt::Display) -> TransportError {
    TransportError::Rpc(error.to_string())
}

#[async_trait]
impl DiscoveryRpc for RpcRelayerClient {
    async fn fetch_account_data(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .await
            .map_err(rpc_error)?;
        Ok(response.value.map(|account| account.data))
    }

    async fn simulate(&self, request: SimulationRequest) -> Result<Vec<u8>, TransportError> {
        let transaction =
            Transaction::new_with_payer(&request.instructions, Some(&request.fee_payer));
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.rpc.commitment()),
            ..RpcSimulateTransactionConfig::default()
        };

        let result = self
            .rpc
            .simulate_transaction_with_config(&transaction, config)
            .await
            .map_err(rpc_error)?
            .value;
        if let Some(error) = result.err {
            let logs = result.logs.unwrap_or_default().join("\n");
            return Err(TransportError::Rejected(format!("{error:?}\n{logs}")));
        }

        let return_data = result.return_data.ok_or(TransportError::MissingReturnData)?;
        base64::engine::general_purpose::STANDARD
            .decode(return_data.data.0)
            .map_err(rpc_error)
    }
}

#[async_trait]
impl FundingSource for RpcRelayerClient {
    fn fee_payer(&self) -> Pubkey {
        self.funder.pubkey()
    }

    async fn balance(&self, account: &Pubkey) -> Result<u64, TransportError> {
        self.rpc.get_balance(account).await.map_err(rpc_error)
    }

    async fn top_up(&self, payer: &Pubkey, lamports: u64) -> Result<(), TransportError> {
        let blockhash = self.rpc.get_latest_blockhash().await.map_err(rpc_error)?;
        let transaction = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(
                &self.funder.pubkey(),
                payer,
                lamports,
            )],
            Some(&self.funder.pubkey()),
            &[self.funder.as_ref()],
            blockhash,
        );
        self.rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|error| TransportError::Rejected(error.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Executor for RpcRelayerClient {
    async fn execute(
        &self,
        transaction: FinalTransaction,
    ) -> Result<ExecutionReceipt, TransportError> {
        let signers = transaction
            .signers
            .iter()
            .map(|pubkey| {
                self.keypair(pubkey)
                    .ok_or(TransportError::MissingSigner(*pubkey))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let blockhash = self.rpc.get_latest_blockhash().await.map_err(rpc_error)?;
        let transaction = Transaction::new_signed_with_payer(
            &transaction.instructions,
            Some(&transaction.fee_payer),
            signers.as_slice(),
            blockhash,
        );
        let signature = self
            .rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|error| TransportError::Rejected(error.to_string()))?;
        Ok(ExecutionReceipt { signature })
    }
}
