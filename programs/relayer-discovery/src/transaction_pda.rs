use solana_program::account_info::AccountInfo;
use solana_program::entrypoint::ProgramResult;
use solana_program::msg;
use solana_program::program::invoke_signed;
use solana_program::program_error::ProgramError;
use solana_program::pubkey::Pubkey;
use solana_program::system_instruction;
use solana_program::sysvar::rent::Rent;
use solana_program::sysvar::Sysvar;

use crate::{AddressDerivationError, RelayerTransaction};

/// The single seed every destination program derives its descriptor address from:
/// `keccak256("relayer-discovery-transaction")`.
pub const TRANSACTION_PDA_SEED: [u8; 32] = keccak_const::Keccak256::new()
    .update(b"relayer-discovery-transaction")
    .finalize();

/// Find the `transaction_pda` holding the initial [`RelayerTransaction`] of a program,
/// and its canonical bump.
///
/// The address only depends on `program_id` and [`TRANSACTION_PDA_SEED`].
///
/// # Errors
///
/// [`AddressDerivationError::NoViableBump`] in the (practically impossible) case that
/// every bump yields an on-curve address.
pub fn find_transaction_pda(program_id: &Pubkey) -> Result<(Pubkey, u8), AddressDerivationError> {
    Pubkey::try_find_program_address(&[TRANSACTION_PDA_SEED.as_slice()], program_id)
        .ok_or(AddressDerivationError::NoViableBump(*program_id))
}

impl RelayerTransaction {
    /// Publishes this transaction at the program's `transaction_pda`. Meant to be called
    /// once by the destination program while it is being set up.
    ///
    /// The account is created rent exempt and sized to exactly fit the encoded
    /// transaction.
    ///
    /// # Arguments
    ///
    /// * `program_id` - The program publishing its `transaction_pda`.
    /// * `system_account` - The system program.
    /// * `payer` - Funds the account creation.
    /// * `into` - The `transaction_pda` derived for `program_id`.
    ///
    /// # Errors
    ///
    /// [`ProgramError::InvalidSeeds`] if `into` is not the derived address, or any error
    /// raised by the system program while creating the account.
    pub fn init<'a>(
        &self,
        program_id: &Pubkey,
        system_account: &AccountInfo<'a>,
        payer: &AccountInfo<'a>,
        into: &AccountInfo<'a>,
    ) -> ProgramResult {
        let data = self.encode();

        let (expected_pda, bump) =
            find_transaction_pda(program_id).map_err(|_| ProgramError::InvalidSeeds)?;
        if &expected_pda != into.key {
            msg!("Invalid transaction pda: {}", into.key);
            return Err(ProgramError::InvalidSeeds);
        }

        let rent = Rent::get()?;
        invoke_signed(
            &system_instruction::create_account(
                payer.key,
                into.key,
                rent.minimum_balance(data.len()).max(1),
                data.len() as u64,
                program_id,
            ),
            &[payer.clone(), into.clone(), system_account.clone()],
            &[&[TRANSACTION_PDA_SEED.as_slice(), &[bump]]],
        )?;

        let mut account_data = into.try_borrow_mut_data()?;
        account_data
            .get_mut(..data.len())
            .ok_or(ProgramError::AccountDataTooSmall)?
            .copy_from_slice(&data);

        Ok(())
    }
}
