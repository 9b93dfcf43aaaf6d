use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::keccak;
use solana_program::pubkey::Pubkey;

use crate::AddressDerivationError;

/// Identifies a message by its source chain and the id it has there.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct CrossChainId {
    /// The name of the source chain.
    pub chain: String,

    /// The message id, unique within the source chain.
    pub id: String,
}

/// An approved cross-chain message, as spliced into instruction data for
/// [`RelayerData::Message`](crate::RelayerData::Message).
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Message {
    /// The cross-chain identifier of the message.
    pub cc_id: CrossChainId,

    /// The address that sent the message on the source chain.
    pub source_address: String,

    /// The chain the message is sent to.
    pub destination_chain: String,

    /// The base58 program id of the destination program.
    pub destination_address: String,

    /// Keccak256 hash of the payload.
    pub payload_hash: [u8; 32],
}

impl Message {
    /// The command id tying this message to its approval on the gateway:
    /// `keccak256(chain || "-" || id)`.
    #[must_use]
    pub fn command_id(&self) -> [u8; 32] {
        keccak::hashv(&[
            self.cc_id.chain.as_bytes(),
            b"-",
            self.cc_id.id.as_bytes(),
        ])
        .to_bytes()
    }

    /// The program the message is addressed to.
    ///
    /// # Errors
    ///
    /// [`AddressDerivationError::InvalidProgramId`] if `destination_address` is not a
    /// base58 encoded public key.
    pub fn destination_program(&self) -> Result<Pubkey, AddressDerivationError> {
        Pubkey::from_str(&self.destination_address).map_err(|_| {
            AddressDerivationError::InvalidProgramId(self.destination_address.clone())
        })
    }

    /// The canonical wire form of the message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        // Messages average well under 256 bytes.
        let mut buffer = Vec::with_capacity(256);
        self.serialize(&mut buffer)
            .expect("writing into a Vec<u8> is infallible");
        buffer
    }
}
