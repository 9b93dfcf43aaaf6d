//! A [`TestLedger`] behind a slow link.

use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use relayer_discovery_resolver::{
    DiscoveryRpc, ExecutionReceipt, Executor, FinalTransaction, FundingSource,
    SimulationRequest, TransportError,
};
use solana_sdk::pubkey::Pubkey;
use typed_builder::TypedBuilder;

use crate::TestLedger;

/// Delays every call to the wrapped [`TestLedger`].
///
/// Requests are delayed before they reach the ledger, so a call that is abandoned
/// while waiting leaves no trace. Balances are the exception: they are read first and
/// returned after the delay, so by then they may be stale.
#[derive(TypedBuilder)]
pub struct LaggingLedger {
    ledger: Arc<TestLedger>,
    #[builder(default)]
    fetch: Duration,
    #[builder(default)]
    simulate: Duration,
    #[builder(default)]
    balance: Duration,
    #[builder(default)]
    top_up: Duration,
    #[builder(default)]
    execute: Duration,
}

async fn lag(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl DiscoveryRpc for LaggingLedger {
    async fn fetch_account_data(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        lag(self.fetch).await;
        self.ledger.fetch_account_data(address).await
    }

    async fn simulate(&self, request: SimulationRequest) -> Result<Vec<u8>, TransportError> {
        lag(self.simulate).await;
        self.ledger.simulate(request).await
    }
}

#[async_trait]
impl FundingSource for LaggingLedger {
    fn fee_payer(&self) -> Pubkey {
        self.ledger.fee_payer()
    }

    async fn balance(&self, account: &Pubkey) -> Result<u64, TransportError> {
        let balance = self.ledger.balance(account).await;
        lag(self.balance).await;
        balance
    }

    async fn top_up(&self, payer: &Pubkey, lamports: u64) -> Result<(), TransportError> {
        lag(self.top_up).await;
        self.ledger.top_up(payer, lamports).await
    }
}

#[async_trait]
impl Executor for LaggingLedger {
    async fn execute(
        &self,
        transaction: FinalTransaction,
    ) -> Result<ExecutionReceipt, TransportError> {
        lag(self.execute).await;
        self.ledger.execute(transaction).await
    }
}
