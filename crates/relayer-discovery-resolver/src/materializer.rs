use relayer_discovery::{RelayerData, RelayerInstruction, RelayerTransaction};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::resolver::{AccountResolver, AccountRole, PayerRequests, ResolvedAccount};
use crate::{MaterializationError, ResolutionContext};

/// A [`RelayerInstruction`] with every account resolved and every data chunk
/// converted to bytes. Accounts keep the published order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedInstruction {
    /// The program to invoke.
    pub program_id: Pubkey,
    /// The resolved accounts, in published order.
    pub accounts: Vec<ResolvedAccount>,
    /// The concatenated instruction data.
    pub data: Vec<u8>,
}

impl MaterializedInstruction {
    /// The positional instruction submitted to the ledger.
    #[must_use]
    pub fn to_instruction(&self) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: self
                .accounts
                .iter()
                .map(|account| account.meta.clone())
                .collect(),
            data: self.data.clone(),
        }
    }

    #[must_use]
    pub fn incoming_message_account(&self) -> Option<&AccountMeta> {
        self.find(AccountRole::IncomingMessage)
    }

    #[must_use]
    pub fn message_payload_account(&self) -> Option<&AccountMeta> {
        self.find(AccountRole::MessagePayload)
    }

    /// Every payer reference with the lamports it requested.
    pub fn payer_accounts(&self) -> impl Iterator<Item = (&AccountMeta, u64)> {
        self.accounts.iter().filter_map(|account| match account.role {
            AccountRole::Payer { lamports } => Some((&account.meta, lamports)),
            AccountRole::Fixed | AccountRole::IncomingMessage | AccountRole::MessagePayload => {
                None
            }
        })
    }

    /// The accounts the destination program published verbatim.
    pub fn fixed_accounts(&self) -> impl Iterator<Item = &AccountMeta> {
        self.accounts
            .iter()
            .filter(|account| account.role == AccountRole::Fixed)
            .map(|account| &account.meta)
    }

    fn find(&self, role: AccountRole) -> Option<&AccountMeta> {
        self.accounts
            .iter()
            .find(|account| account.role == role)
            .map(|account| &account.meta)
    }
}

/// Resolves every account and concatenates every data chunk of `instruction`, in
/// order.
///
/// # Errors
///
/// [`MaterializationError`] if an account or chunk references something the
/// resolver's context doesn't hold.
pub fn materialize_instruction(
    instruction: &RelayerInstruction,
    resolver: &mut AccountResolver<'_>,
) -> Result<MaterializedInstruction, MaterializationError> {
    let accounts = instruction
        .accounts
        .iter()
        .map(|account| resolver.resolve(account))
        .collect::<Result<Vec<_>, _>>()?;

    let mut data = Vec::new();
    for chunk in &instruction.data {
        match chunk {
            RelayerData::Bytes(bytes) => data.extend_from_slice(bytes),
            RelayerData::Message => {
                let message = resolver
                    .context()
                    .message
                    .as_ref()
                    .ok_or(MaterializationError::MissingMessage)?;
                data.extend_from_slice(&message.encode());
            }
        }
    }

    Ok(MaterializedInstruction {
        program_id: instruction.program_id,
        accounts,
        data,
    })
}

/// Every instruction of a [`RelayerTransaction`], materialized against one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedTransaction {
    /// Copied from the relayer transaction.
    pub is_final: bool,
    /// The materialized instructions, in published order.
    pub instructions: Vec<MaterializedInstruction>,
    /// The `Payer` amounts requested across all instructions.
    pub payer_requests: PayerRequests,
}

impl MaterializedTransaction {
    /// Materializes every instruction of `transaction`.
    ///
    /// # Errors
    ///
    /// The first [`MaterializationError`] hit, in instruction order.
    pub fn materialize(
        transaction: &RelayerTransaction,
        context: &ResolutionContext,
    ) -> Result<Self, MaterializationError> {
        let mut resolver = AccountResolver::new(context);
        let instructions = transaction
            .instructions
            .iter()
            .map(|instruction| materialize_instruction(instruction, &mut resolver))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            is_final: transaction.is_final,
            instructions,
            payer_requests: resolver.into_payer_requests(),
        })
    }

    /// The instructions to simulate or execute.
    #[must_use]
    pub fn instructions(&self) -> Vec<Instruction> {
        self.instructions
            .iter()
            .map(MaterializedInstruction::to_instruction)
            .collect()
    }

    /// Every account that has to sign, without duplicates. `fee_payer` always comes
    /// first.
    #[must_use]
    pub fn required_signers(&self, fee_payer: &Pubkey) -> Vec<Pubkey> {
        let mut signers = vec![*fee_payer];
        for meta in self
            .instructions
            .iter()
            .flat_map(|instruction| &instruction.accounts)
            .map(|account| &account.meta)
            .filter(|meta| meta.is_signer)
        {
            if !signers.contains(&meta.pubkey) {
                signers.push(meta.pubkey);
            }
        }
        signers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relayer_discovery::{CrossChainId, Message, RelayerAccount};

    fn message() -> Message {
        Message {
            cc_id: CrossChainId {
                chain: "ethereum".to_owned(),
                id: "0x1-2".to_owned(),
            },
            source_address: "0xsender".to_owned(),
            destination_chain: "solana".to_owned(),
            destination_address: Pubkey::new_unique().to_string(),
            payload_hash: [1; 32],
        }
    }

    #[test]
    fn single_round_instruction() {
        let program = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        let transaction = RelayerTransaction::final_transaction(vec![RelayerInstruction {
            program_id: program,
            accounts: vec![RelayerAccount::readonly(account)],
            data: vec![RelayerData::Bytes(vec![0x01])],
        }]);

        let materialized = MaterializedTransaction::materialize(
            &transaction,
            &ResolutionContext::new(Pubkey::new_unique()),
        )
        .unwrap();

        assert_eq!(
            materialized.instructions(),
            vec![Instruction {
                program_id: program,
                accounts: vec![AccountMeta::new_readonly(account, false)],
                data: vec![0x01],
            }]
        );
        assert!(materialized.payer_requests.is_empty());
    }

    #[test]
    fn data_is_the_ordered_concatenation_of_chunks() {
        let message = message();
        let context = ResolutionContext::new(Pubkey::new_unique()).with_message(message.clone());
        let instruction = |data| RelayerInstruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![],
            data,
        };

        let selector_first = materialize_instruction(
            &instruction(vec![RelayerData::Bytes(vec![0x09]), RelayerData::Message]),
            &mut AccountResolver::new(&context),
        )
        .unwrap();
        let message_first = materialize_instruction(
            &instruction(vec![RelayerData::Message, RelayerData::Bytes(vec![0x09])]),
            &mut AccountResolver::new(&context),
        )
        .unwrap();

        let mut expected = vec![0x09];
        expected.extend_from_slice(&message.encode());
        assert_eq!(selector_first.data, expected);
        assert_ne!(selector_first.data, message_first.data);
    }

    #[test]
    fn message_chunk_needs_a_message() {
        let context = ResolutionContext::new(Pubkey::new_unique());
        let instruction = RelayerInstruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![],
            data: vec![RelayerData::Message],
        };

        assert_eq!(
            materialize_instruction(&instruction, &mut AccountResolver::new(&context)),
            Err(MaterializationError::MissingMessage)
        );
    }

    #[test]
    fn accounts_keep_order_and_roles() {
        let context = ResolutionContext::new(Pubkey::new_unique())
            .with_incoming_message(Pubkey::new_unique())
            .with_message_payload(Pubkey::new_unique())
            .with_message(message());
        let counter = Pubkey::new_unique();
        let instruction = RelayerInstruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![
                RelayerAccount::Payer(1_000),
                RelayerAccount::IncomingMessage,
                RelayerAccount::MessagePayload,
                RelayerAccount::writable(counter),
            ],
            data: vec![],
        };

        let materialized =
            materialize_instruction(&instruction, &mut AccountResolver::new(&context)).unwrap();

        let keys: Vec<_> = materialized
            .accounts
            .iter()
            .map(|account| account.meta.pubkey)
            .collect();
        assert_eq!(
            keys,
            vec![
                context.payer,
                context.incoming_message.unwrap(),
                context.message_payload.unwrap(),
                counter
            ]
        );
        assert_eq!(
            materialized.message_payload_account().map(|meta| meta.pubkey),
            context.message_payload
        );
        assert_eq!(
            materialized.incoming_message_account().map(|meta| meta.pubkey),
            context.incoming_message
        );
        assert_eq!(
            materialized
                .payer_accounts()
                .map(|(meta, lamports)| (meta.pubkey, lamports))
                .collect::<Vec<_>>(),
            vec![(context.payer, 1_000)]
        );
        assert_eq!(
            materialized.fixed_accounts().cloned().collect::<Vec<_>>(),
            vec![AccountMeta::new(counter, false)]
        );
    }

    #[test]
    fn payer_requests_sum_across_instructions() {
        let context = ResolutionContext::new(Pubkey::new_unique());
        let paying = |lamports| RelayerInstruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![RelayerAccount::Payer(lamports)],
            data: vec![],
        };
        let transaction = RelayerTransaction::final_transaction(vec![paying(400), paying(600)]);

        let materialized = MaterializedTransaction::materialize(&transaction, &context).unwrap();

        assert_eq!(materialized.payer_requests.total(), 1_000);
    }

    #[test]
    fn required_signers_are_deduplicated() {
        let payer = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let context = ResolutionContext::new(payer);
        let transaction = RelayerTransaction::final_transaction(vec![
            RelayerInstruction {
                program_id: Pubkey::new_unique(),
                accounts: vec![
                    RelayerAccount::Payer(1),
                    RelayerAccount::Fixed {
                        pubkey: authority,
                        is_signer: true,
                        is_writable: false,
                    },
                ],
                data: vec![],
            },
            RelayerInstruction {
                program_id: Pubkey::new_unique(),
                accounts: vec![RelayerAccount::Payer(1)],
                data: vec![],
            },
        ]);

        let materialized = MaterializedTransaction::materialize(&transaction, &context).unwrap();

        assert_eq!(materialized.required_signers(&payer), vec![payer, authority]);
    }
}
