//! Off-chain side of relayer discovery.
//!
//! Given an approved [`Message`](relayer_discovery::Message), the relayer fetches the
//! [`RelayerTransaction`](relayer_discovery::RelayerTransaction) its destination
//! program published, then simulates discovery rounds until the program returns a
//! final transaction. That one gets funded with exactly the lamports its `Payer`
//! accounts request and executed.
//!
//! The ledger is reached only through the traits in [`transport`]; [`rpc`] implements
//! them on top of a JSON RPC node.

mod config;
mod context;
pub mod discovery;
mod error;
pub mod funding;
pub mod materializer;
pub mod relayer;
pub mod resolver;
pub mod rpc;
pub mod transport;

pub use config::{ConfigError, RelayerConfig};
pub use context::ResolutionContext;
pub use discovery::{DiscoveryLoop, RelayOutcome, RelayRequest, ResolutionState};
pub use error::{DiscoveryError, MaterializationError, RelayError, TransportError};
pub use funding::{plan_funding, FundingPlan};
pub use materializer::{materialize_instruction, MaterializedInstruction, MaterializedTransaction};
pub use relayer::Relayer;
pub use resolver::{AccountResolver, AccountRole, PayerRequests, ResolvedAccount};
pub use rpc::RpcRelayerClient;
pub use transport::{
    DiscoveryRpc, ExecutionReceipt, Executor, FinalTransaction, FundingSource, PayloadStager,
    RelayerTransport, SimulationRequest,
};
