use relayer_discovery::Message;
use solana_sdk::pubkey::Pubkey;

/// What the relayer knows about the message being relayed, used to resolve the
/// placeholders of a [`RelayerTransaction`](relayer_discovery::RelayerTransaction).
///
/// The payer is always known. The other handles are filled in as they become
/// available; a round that references one that is still missing fails to
/// materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Substituted for `Payer` accounts: signs for them and receives their top ups.
    pub payer: Pubkey,
    /// The gateway account holding the approved message.
    pub incoming_message: Option<Pubkey>,
    /// The account holding the payload of the message.
    pub message_payload: Option<Pubkey>,
    /// The message being relayed.
    pub message: Option<Message>,
}

impl ResolutionContext {
    /// A context in which only the payer is known.
    #[must_use]
    pub const fn new(payer: Pubkey) -> Self {
        Self {
            payer,
            incoming_message: None,
            message_payload: None,
            message: None,
        }
    }

    /// Sets the gateway account holding the approved message.
    #[must_use]
    pub fn with_incoming_message(mut self, incoming_message: Pubkey) -> Self {
        self.incoming_message = Some(incoming_message);
        self
    }

    /// Sets the account holding the payload.
    #[must_use]
    pub fn with_message_payload(mut self, message_payload: Pubkey) -> Self {
        self.message_payload = Some(message_payload);
        self
    }

    /// Sets the message being relayed.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }
}
