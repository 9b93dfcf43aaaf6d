//! Turns [`RelayerAccount`] references into concrete account metas.

use relayer_discovery::RelayerAccount;
use solana_sdk::instruction::AccountMeta;
use solana_sdk::pubkey::Pubkey;

use crate::{MaterializationError, ResolutionContext};

/// The role an account was resolved from.
///
/// Destination programs address accounts by position. Keeping the role next to
/// each resolved account lets callers (and tests) find e.g. the payload account
/// without hard-coding its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    /// A concrete account published by the destination program.
    Fixed,
    /// The approved incoming message.
    IncomingMessage,
    /// The message payload.
    MessagePayload,
    /// The relayer's payer, which must hold `lamports` before execution.
    Payer {
        /// The amount the destination program requested.
        lamports: u64,
    },
}

/// An account meta together with the role it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    /// What gets passed to the instruction.
    pub meta: AccountMeta,
    /// Where `meta` came from.
    pub role: AccountRole,
}

/// The lamports requested by every `Payer` reference resolved so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayerRequests {
    requests: Vec<u64>,
}

impl PayerRequests {
    /// Records one `Payer` reference.
    pub fn record(&mut self, lamports: u64) {
        self.requests.push(lamports);
    }

    /// The combined requirement. Saturates rather than wrapping, so an absurd request
    /// can only ever fail the budget check.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.requests
            .iter()
            .fold(0_u64, |total, lamports| total.saturating_add(*lamports))
    }

    /// Whether no `Payer` reference was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Every recorded request, in resolution order.
    #[must_use]
    pub fn requests(&self) -> &[u64] {
        &self.requests
    }
}

/// Resolves accounts against a [`ResolutionContext`], accumulating the payer
/// requests of one relayer transaction.
///
/// Resolution is pure: it never talks to the ledger.
#[derive(Debug)]
pub struct AccountResolver<'a> {
    context: &'a ResolutionContext,
    payers: PayerRequests,
}

impl<'a> AccountResolver<'a> {
    /// A resolver with no payer requests recorded yet.
    #[must_use]
    pub fn new(context: &'a ResolutionContext) -> Self {
        Self {
            context,
            payers: PayerRequests::default(),
        }
    }

    /// The context accounts are resolved against.
    #[must_use]
    pub const fn context(&self) -> &'a ResolutionContext {
        self.context
    }

    /// Resolves a single account reference.
    ///
    /// `Fixed` accounts are passed through as published. The placeholders get their
    /// flags from their role: the incoming message is writable, the payload is
    /// read-only and the payer signs and is writable.
    ///
    /// # Errors
    ///
    /// [`MaterializationError`] if the reference needs a handle the context doesn't
    /// hold.
    pub fn resolve(
        &mut self,
        account: &RelayerAccount,
    ) -> Result<ResolvedAccount, MaterializationError> {
        let resolved = match *account {
            RelayerAccount::Fixed {
                pubkey,
                is_signer,
                is_writable,
            } => ResolvedAccount {
                meta: meta(pubkey, is_signer, is_writable),
                role: AccountRole::Fixed,
            },
            RelayerAccount::IncomingMessage => ResolvedAccount {
                meta: AccountMeta::new(
                    self.context
                        .incoming_message
                        .ok_or(MaterializationError::MissingIncomingMessage)?,
                    false,
                ),
                role: AccountRole::IncomingMessage,
            },
            RelayerAccount::MessagePayload => ResolvedAccount {
                meta: AccountMeta::new_readonly(
                    self.context
                        .message_payload
                        .ok_or(MaterializationError::MissingMessagePayload)?,
                    false,
                ),
                role: AccountRole::MessagePayload,
            },
            RelayerAccount::Payer(lamports) => {
                self.payers.record(lamports);
                ResolvedAccount {
                    meta: AccountMeta::new(self.context.payer, true),
                    role: AccountRole::Payer { lamports },
                }
            }
        };
        Ok(resolved)
    }

    /// The payer requests recorded while resolving.
    #[must_use]
    pub fn into_payer_requests(self) -> PayerRequests {
        self.payers
    }
}

const fn meta(pubkey: Pubkey, is_signer: bool, is_writable: bool) -> AccountMeta {
    AccountMeta {
        pubkey,
        is_signer,
        is_writable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_context() -> ResolutionContext {
        ResolutionContext::new(Pubkey::new_unique())
            .with_incoming_message(Pubkey::new_unique())
            .with_message_payload(Pubkey::new_unique())
    }

    #[test]
    fn fixed_accounts_pass_through() {
        let context = full_context();
        let mut resolver = AccountResolver::new(&context);
        let pubkey = Pubkey::new_unique();

        let resolved = resolver
            .resolve(&RelayerAccount::Fixed {
                pubkey,
                is_signer: true,
                is_writable: false,
            })
            .unwrap();

        assert_eq!(
            resolved,
            ResolvedAccount {
                meta: AccountMeta::new_readonly(pubkey, true),
                role: AccountRole::Fixed,
            }
        );
    }

    #[test]
    fn placeholders_take_their_flags_from_the_role() {
        let context = full_context();
        let mut resolver = AccountResolver::new(&context);

        let incoming = resolver.resolve(&RelayerAccount::IncomingMessage).unwrap();
        assert_eq!(
            incoming.meta,
            AccountMeta::new(context.incoming_message.unwrap(), false)
        );

        let payload = resolver.resolve(&RelayerAccount::MessagePayload).unwrap();
        assert_eq!(
            payload.meta,
            AccountMeta::new_readonly(context.message_payload.unwrap(), false)
        );

        let payer = resolver.resolve(&RelayerAccount::Payer(7)).unwrap();
        assert_eq!(payer.meta, AccountMeta::new(context.payer, true));
        assert_eq!(payer.role, AccountRole::Payer { lamports: 7 });
    }

    #[test]
    fn payer_requests_accumulate() {
        let context = full_context();
        let mut resolver = AccountResolver::new(&context);

        for lamports in [1_000, 0, 250] {
            resolver.resolve(&RelayerAccount::Payer(lamports)).unwrap();
        }
        let requests = resolver.into_payer_requests();

        assert_eq!(requests.requests(), &[1_000, 0, 250]);
        assert_eq!(requests.total(), 1_250);
    }

    #[test]
    fn total_saturates() {
        let mut requests = PayerRequests::default();
        requests.record(u64::MAX);
        requests.record(1);
        assert_eq!(requests.total(), u64::MAX);
    }

    #[test]
    fn missing_handles_are_reported() {
        let context = ResolutionContext::new(Pubkey::new_unique());
        let mut resolver = AccountResolver::new(&context);

        assert_eq!(
            resolver.resolve(&RelayerAccount::IncomingMessage),
            Err(MaterializationError::MissingIncomingMessage)
        );
        assert_eq!(
            resolver.resolve(&RelayerAccount::MessagePayload),
            Err(MaterializationError::MissingMessagePayload)
        );
        assert!(resolver.into_payer_requests().is_empty());
    }
}
