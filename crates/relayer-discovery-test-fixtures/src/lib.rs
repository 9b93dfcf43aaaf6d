//! Test fixtures for relayer discovery: an in-memory ledger implementing every
//! relayer collaborator, a slow link in front of it, and destination programs
//! publishing discovery chains.

use relayer_discovery::{CrossChainId, Message};
use relayer_discovery_resolver::RelayRequest;
use solana_program::keccak;
use solana_sdk::pubkey::Pubkey;

pub mod lagging;
pub mod ledger;
pub mod programs;

pub use lagging::LaggingLedger;
pub use ledger::{DestinationProgram, LedgerState, TestLedger};
pub use programs::{DiscoverableMemo, MemoPayload, MemoStep, NoopProgram, ScriptedProgram, MEMO_FEE};

/// A message from a random source to `destination`, carrying `payload`.
#[must_use]
pub fn random_message(destination: &Pubkey, payload: &[u8]) -> Message {
    Message {
        cc_id: CrossChainId {
            chain: "ethereum".to_owned(),
            id: format!("0x{:016x}-{}", rand::random::<u64>(), rand::random::<u8>()),
        },
        source_address: format!("0x{:040x}", rand::random::<u128>()),
        destination_chain: "solana".to_owned(),
        destination_address: destination.to_string(),
        payload_hash: keccak::hash(payload).to_bytes(),
    }
}

/// Approves a random message to `destination` on `ledger` and stores its payload.
#[must_use]
pub fn approved_request(
    ledger: &TestLedger,
    destination: &Pubkey,
    payload: &[u8],
    gas_budget: u64,
) -> RelayRequest {
    let message = random_message(destination, payload);
    RelayRequest {
        incoming_message: ledger.approve(&message),
        message_payload: Some(ledger.store_payload(payload)),
        message,
        payload: payload.to_vec(),
        gas_budget,
    }
}
