#![deny(missing_docs)]

//! Relayer discovery primitives.
//!
//! A destination program that wants to be relayed to without the relayer knowing its
//! accounts up front publishes a [`RelayerTransaction`] at a deterministic address
//! (see [`find_transaction_pda`]). The relayer fetches it, turns it into concrete
//! instructions and either simulates them (to obtain the next [`RelayerTransaction`]
//! via return data) or, once `is_final` is set, executes them.
//!
//! This crate only holds what both sides of the protocol have to agree on: the wire
//! types, their codec, the canonical [`Message`] and the address derivation. It
//! depends on nothing but `borsh` and `solana-program`, so destination programs can
//! link it directly.

use solana_program::pubkey::Pubkey;

/// The canonical cross-chain message that gets spliced into instruction data.
pub mod message;
/// The structs for relayer discovery and their wire codec.
pub mod structs;
/// Derivation and initialization of the descriptor account.
pub mod transaction_pda;

pub use message::{CrossChainId, Message};
pub use structs::{RelayerAccount, RelayerData, RelayerInstruction, RelayerTransaction};
pub use transaction_pda::{find_transaction_pda, TRANSACTION_PDA_SEED};

/// Failure to decode a [`RelayerTransaction`] from account data or return data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The bytes do not follow the wire layout: truncated input, an unknown variant
    /// tag, an invalid boolean or a length prefix running past the end of the input.
    #[error("malformed relayer transaction: {reason}")]
    Malformed {
        /// What the decoder tripped over.
        reason: String,
    },
    /// The bytes decoded but hold no instructions.
    #[error("relayer transaction holds no instructions")]
    NoInstructions,
}

/// Failure to compute the descriptor address of a destination program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressDerivationError {
    /// The destination address is not a base58 encoded program id.
    #[error("`{0}` is not a valid program id")]
    InvalidProgramId(String),
    /// No bump seed yields an off-curve address for this program id.
    #[error("no off-curve transaction pda exists for program {0}")]
    NoViableBump(Pubkey),
}
