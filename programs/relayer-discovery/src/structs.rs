use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::DecodeError;

/// A single piece of instruction data. The relayer converts each of these to bytes
/// and concatenates them in order.
///
/// Variant order is the wire tag: `Bytes` = 0, `Message` = 1.
#[derive(Debug, Eq, PartialEq, Clone, BorshSerialize, BorshDeserialize)]
pub enum RelayerData {
    /// Raw bytes, copied verbatim. Usually the selector of the handler to call.
    Bytes(Vec<u8>),
    /// The borsh-serialized [`crate::Message`] being relayed.
    Message,
}

/// An account the relayer has to pass to the destination program.
///
/// Variant order is the wire tag: `Fixed` = 0, `IncomingMessage` = 1,
/// `MessagePayload` = 2, `Payer` = 3.
#[derive(Debug, Eq, PartialEq, Clone, BorshSerialize, BorshDeserialize)]
pub enum RelayerAccount {
    /// A concrete account known to the destination program, passed through as is.
    Fixed {
        /// The address of the account.
        pubkey: Pubkey,
        /// Whether the account signs the transaction.
        is_signer: bool,
        /// Whether the account is writable.
        is_writable: bool,
    },
    /// The gateway account holding the approved incoming message.
    IncomingMessage,
    /// The account holding the raw payload of the message.
    MessagePayload,
    /// A writable signer holding at least this many lamports right before execution.
    /// The lamports are subtracted from the gas paid for relaying the message.
    Payer(u64),
}

impl RelayerAccount {
    /// A read-only, non-signer account.
    #[must_use]
    pub const fn readonly(pubkey: Pubkey) -> Self {
        Self::Fixed {
            pubkey,
            is_signer: false,
            is_writable: false,
        }
    }

    /// A writable, non-signer account.
    #[must_use]
    pub const fn writable(pubkey: Pubkey) -> Self {
        Self::Fixed {
            pubkey,
            is_signer: false,
            is_writable: true,
        }
    }
}

/// An instruction the relayer converts into an
/// [`Instruction`](solana_program::instruction::Instruction).
///
/// The order of `accounts` and `data` is significant: destination programs address
/// accounts by position, so the relayer must never reorder them.
#[derive(Debug, Eq, PartialEq, Clone, BorshSerialize, BorshDeserialize)]
pub struct RelayerInstruction {
    /// The program to invoke. It does not have to be the destination program itself.
    pub program_id: Pubkey,
    /// The instruction accounts, in order.
    pub accounts: Vec<RelayerAccount>,
    /// The instruction data chunks, concatenated in order.
    pub data: Vec<RelayerData>,
}

/// One round of relayer discovery.
///
/// With `is_final` set the instructions are the ones to execute. Otherwise simulating
/// them must return (as return data of the last instruction) the next
/// `RelayerTransaction`.
#[derive(Debug, Eq, PartialEq, Clone, BorshSerialize, BorshDeserialize)]
pub struct RelayerTransaction {
    /// Whether these instructions are executed rather than simulated.
    pub is_final: bool,
    /// The instructions, executed in order.
    pub instructions: Vec<RelayerInstruction>,
}

impl RelayerTransaction {
    /// A transaction whose instructions should be executed.
    #[must_use]
    pub const fn final_transaction(instructions: Vec<RelayerInstruction>) -> Self {
        Self {
            is_final: true,
            instructions,
        }
    }

    /// A transaction whose instructions should be simulated to discover the next one.
    #[must_use]
    pub const fn discovery(instructions: Vec<RelayerInstruction>) -> Self {
        Self {
            is_final: false,
            instructions,
        }
    }

    /// Borsh-encodes the transaction.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        // Descriptors are typically a couple hundred bytes.
        let mut buffer = Vec::with_capacity(256);
        self.serialize(&mut buffer)
            .expect("writing into a Vec<u8> is infallible");
        buffer
    }

    /// Decodes a transaction from account data or simulation return data.
    ///
    /// Bytes following a complete transaction are ignored, as account data may be
    /// allocated larger than the transaction stored in it.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Malformed`] if the bytes don't follow the wire layout,
    /// [`DecodeError::NoInstructions`] if the decoded transaction is empty.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, DecodeError> {
        let transaction =
            Self::deserialize(&mut bytes).map_err(|error| DecodeError::Malformed {
                reason: error.to_string(),
            })?;
        if transaction.instructions.is_empty() {
            return Err(DecodeError::NoInstructions);
        }
        Ok(transaction)
    }

    /// The number of bytes needed to store the encoded transaction.
    #[must_use]
    pub fn space(&self) -> usize {
        self.encode().len()
    }
}
