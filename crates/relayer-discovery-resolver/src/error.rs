use core::time::Duration;

use relayer_discovery::{AddressDerivationError, DecodeError};
use solana_sdk::pubkey::Pubkey;

/// A failure reported by one of the ledger collaborators (fetch, simulate, fund,
/// execute).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never produced an answer from the ledger.
    #[error("rpc request failed: {0}")]
    Rpc(String),
    /// The simulated instructions succeeded but returned nothing.
    #[error("simulation produced no return data")]
    MissingReturnData,
    /// The ledger processed the transaction and rejected it.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The transaction requires a signature the relayer can't provide.
    #[error("no keypair for required signer {0}")]
    MissingSigner(Pubkey),
}

/// A relayer account or data chunk references something the current
/// [`ResolutionContext`](crate::ResolutionContext) doesn't hold yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MaterializationError {
    /// `RelayerAccount::IncomingMessage` without a known incoming message account.
    #[error("the incoming message account is not known yet")]
    MissingIncomingMessage,
    /// `RelayerAccount::MessagePayload` without a known payload account.
    #[error("the message payload needs to be uploaded before further relayer discovery can be done")]
    MissingMessagePayload,
    /// `RelayerData::Message` without a known message.
    #[error("the message is not known yet")]
    MissingMessage,
}

/// Why relaying a single message failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The destination program id is unusable.
    #[error(transparent)]
    AddressDerivation(#[from] AddressDerivationError),
    /// Nothing is published at the transaction pda: the program is not discoverable.
    #[error("no relayer transaction published at {address}")]
    AccountNotFound {
        /// The derived transaction pda.
        address: Pubkey,
    },
    /// Fetching the published relayer transaction failed.
    #[error("failed to fetch the relayer transaction: {0}")]
    Fetch(TransportError),
    /// The published bytes or the simulation return data are malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A reference could not be resolved with the current context.
    #[error(transparent)]
    Materialization(#[from] MaterializationError),
    /// The payload could not be staged on the ledger.
    #[error("failed to stage the message payload: {0}")]
    PayloadStaging(TransportError),
    /// Simulating a discovery round failed.
    #[error("simulation failed: {0}")]
    SimulationFailure(TransportError),
    /// The destination program never returned a final transaction.
    #[error("no final relayer transaction after {max_rounds} rounds")]
    MaxRoundsExceeded {
        /// The configured limit.
        max_rounds: u32,
    },
    /// The requested payer lamports exceed the gas available for the message.
    #[error("payers request {requested} lamports but the gas budget is {budget}")]
    FundingMismatch {
        /// Sum of all `Payer` amounts of the final transaction.
        requested: u64,
        /// Gas allotted to relaying this message.
        budget: u64,
    },
    /// Reading the payer balance or topping it up failed.
    #[error("failed to fund the payer: {0}")]
    Funding(TransportError),
    /// The final transaction was rejected.
    #[error("execution failed: {0}")]
    ExecutionFailure(TransportError),
    /// The relay was cancelled or ran out of time.
    #[error("cancelled")]
    Cancelled,
    /// A single round took longer than allowed.
    #[error("round did not complete within {timeout:?}")]
    RoundTimeout {
        /// The configured per-round timeout.
        timeout: Duration,
    },
    /// The task driving the relay panicked or was aborted.
    #[error("relay task aborted: {0}")]
    Aborted(String),
}

/// A [`DiscoveryError`] attributed to the message and round it happened in.
///
/// Round `0` means the failure happened before the published relayer transaction
/// was decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("relaying command {} failed in round {round}: {kind}", hex::encode(.command_id))]
pub struct RelayError {
    /// The command id of the message.
    pub command_id: [u8; 32],
    /// The round the failure happened in.
    pub round: u32,
    /// What went wrong.
    pub kind: DiscoveryError,
}

impl RelayError {
    /// Whether re-attempting the whole relay later may succeed.
    ///
    /// Nothing inside this crate retries: this only tells callers which failures are
    /// transient. A non-terminating discovery chain, an insufficient budget or
    /// malformed published data will fail the same way every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match &self.kind {
            DiscoveryError::Fetch(_)
            | DiscoveryError::PayloadStaging(_)
            | DiscoveryError::SimulationFailure(_)
            | DiscoveryError::Funding(_)
            | DiscoveryError::RoundTimeout { .. }
            | DiscoveryError::Cancelled
            | DiscoveryError::Aborted(_) => true,
            DiscoveryError::ExecutionFailure(error) => {
                !matches!(error, TransportError::MissingSigner(_))
            }
            DiscoveryError::AddressDerivation(_)
            | DiscoveryError::AccountNotFound { .. }
            | DiscoveryError::Decode(_)
            | DiscoveryError::Materialization(_)
            | DiscoveryError::MaxRoundsExceeded { .. }
            | DiscoveryError::FundingMismatch { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(kind: DiscoveryError) -> RelayError {
        RelayError {
            command_id: [0xab; 32],
            round: 3,
            kind,
        }
    }

    #[test]
    fn display_names_command_and_round() {
        let error = failed(DiscoveryError::MaxRoundsExceeded { max_rounds: 2 });
        assert_eq!(
            error.to_string(),
            format!(
                "relaying command {} failed in round 3: no final relayer transaction after 2 rounds",
                "ab".repeat(32)
            )
        );
    }

    #[test]
    fn broken_chains_and_budgets_are_fatal() {
        assert!(!failed(DiscoveryError::MaxRoundsExceeded { max_rounds: 2 }).is_retryable());
        assert!(!failed(DiscoveryError::FundingMismatch {
            requested: 2,
            budget: 1
        })
        .is_retryable());
        assert!(!failed(DiscoveryError::AccountNotFound {
            address: Pubkey::new_unique()
        })
        .is_retryable());
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert!(failed(DiscoveryError::SimulationFailure(TransportError::Rpc(
            "connection reset".to_owned()
        )))
        .is_retryable());
        assert!(failed(DiscoveryError::ExecutionFailure(TransportError::Rejected(
            "blockhash not found".to_owned()
        )))
        .is_retryable());
        assert!(!failed(DiscoveryError::ExecutionFailure(
            TransportError::MissingSigner(Pubkey::new_unique())
        ))
        .is_retryable());
    }
}
