//! Discovery-enabled destination programs for the [`TestLedger`](crate::TestLedger).

use core::time::Duration;

use borsh::{BorshDeserialize, BorshSerialize};
use relayer_discovery::{
    Message, RelayerAccount, RelayerData, RelayerInstruction, RelayerTransaction,
};
use solana_program::keccak;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use typed_builder::TypedBuilder;

use crate::ledger::{DestinationProgram, LedgerState};

/// Lamports a memo costs. Collected into the counter account.
pub const MEMO_FEE: u64 = 1_000;

/// The steps of [`DiscoverableMemo`], sent as the first instruction data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemoStep {
    /// Inspects the payload and returns the final relayer transaction.
    ResolveAccounts = 0x05,
    /// Processes the message.
    Execute = 0x09,
}

impl TryFrom<u8> for MemoStep {
    type Error = String;

    fn try_from(selector: u8) -> Result<Self, Self::Error> {
        match selector {
            0x05 => Ok(Self::ResolveAccounts),
            0x09 => Ok(Self::Execute),
            unknown => Err(format!("unknown memo step {unknown:#04x}")),
        }
    }
}

impl From<MemoStep> for RelayerData {
    fn from(step: MemoStep) -> Self {
        Self::Bytes(vec![step as u8])
    }
}

/// What a message to [`DiscoverableMemo`] asks for.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum MemoPayload {
    /// Count a memo, paying [`MEMO_FEE`].
    Memo {
        /// The memo.
        text: String,
    },
    /// Forward lamports from the payer to `recipient`.
    Transfer {
        /// Receives the lamports.
        recipient: Pubkey,
        /// How many lamports.
        lamports: u64,
    },
}

impl MemoPayload {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("writing into a Vec<u8> is infallible")
    }
}

/// A destination program that needs two rounds of discovery.
///
/// Its published relayer transaction only asks for the payload. Simulating that
/// returns the final transaction, whose accounts depend on the payload:
/// `[Payer, IncomingMessage, MessagePayload, counter]`, plus the recipient for
/// transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverableMemo {
    /// Where the program is deployed.
    pub program_id: Pubkey,
    /// Counts the processed memos and collects their fees.
    pub counter: Pubkey,
}

impl DiscoverableMemo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program_id: Pubkey::new_unique(),
            counter: Pubkey::new_unique(),
        }
    }

    /// The relayer transaction published at setup.
    #[must_use]
    pub fn initial_transaction(&self) -> RelayerTransaction {
        RelayerTransaction::discovery(vec![RelayerInstruction {
            program_id: self.program_id,
            accounts: vec![RelayerAccount::MessagePayload],
            data: vec![MemoStep::ResolveAccounts.into()],
        }])
    }

    /// The final relayer transaction for `payload`.
    #[must_use]
    pub fn final_transaction(&self, payload: &MemoPayload) -> RelayerTransaction {
        let mut accounts = vec![
            RelayerAccount::Payer(Self::payer_request(payload)),
            RelayerAccount::IncomingMessage,
            RelayerAccount::MessagePayload,
            RelayerAccount::writable(self.counter),
        ];
        if let MemoPayload::Transfer { recipient, .. } = payload {
            accounts.push(RelayerAccount::writable(*recipient));
        }

        RelayerTransaction::final_transaction(vec![RelayerInstruction {
            program_id: self.program_id,
            accounts,
            data: vec![MemoStep::Execute.into(), RelayerData::Message],
        }])
    }

    const fn payer_request(payload: &MemoPayload) -> u64 {
        match *payload {
            MemoPayload::Memo { .. } => MEMO_FEE,
            MemoPayload::Transfer { lamports, .. } => lamports,
        }
    }

    fn read_payload(
        instruction: &Instruction,
        index: usize,
        state: &LedgerState,
    ) -> Result<MemoPayload, String> {
        let account = instruction
            .accounts
            .get(index)
            .ok_or("the payload account is missing")?;
        MemoPayload::try_from_slice(state.data(&account.pubkey)?)
            .map_err(|error| error.to_string())
    }

    fn selector(instruction: &Instruction) -> Result<(MemoStep, &[u8]), String> {
        let (selector, rest) = instruction
            .data
            .split_first()
            .ok_or("empty instruction data")?;
        Ok((MemoStep::try_from(*selector)?, rest))
    }
}

impl Default for DiscoverableMemo {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationProgram for DiscoverableMemo {
    fn simulate(&self, instruction: &Instruction, state: &LedgerState) -> Result<Vec<u8>, String> {
        match Self::selector(instruction)?.0 {
            MemoStep::ResolveAccounts => {
                let payload = Self::read_payload(instruction, 0, state)?;
                Ok(self.final_transaction(&payload).encode())
            }
            MemoStep::Execute => Ok(Vec::new()),
        }
    }

    fn execute(&self, instruction: &Instruction, state: &mut LedgerState) -> Result<(), String> {
        let (step, message_bytes) = Self::selector(instruction)?;
        if step != MemoStep::Execute {
            return Err(format!("{step:?} can't be executed"));
        }
        let [payer, incoming_message, payload_account, counter, rest @ ..] =
            instruction.accounts.as_slice()
        else {
            return Err("not enough accounts".to_owned());
        };
        if !payer.is_signer || !payer.is_writable {
            return Err("the payer must be a writable signer".to_owned());
        }
        if counter.pubkey != self.counter || !counter.is_writable {
            return Err("wrong counter account".to_owned());
        }

        let message = Message::try_from_slice(message_bytes).map_err(|error| error.to_string())?;
        if state.data(&incoming_message.pubkey)? != message.encode().as_slice() {
            return Err("the message is not approved".to_owned());
        }
        let payload_bytes = state.data(&payload_account.pubkey)?;
        if keccak::hash(payload_bytes).to_bytes() != message.payload_hash {
            return Err("payload does not match the payload hash".to_owned());
        }
        let payload =
            MemoPayload::try_from_slice(payload_bytes).map_err(|error| error.to_string())?;

        match payload {
            MemoPayload::Memo { .. } => {
                state.transfer(&payer.pubkey, &self.counter, MEMO_FEE)?;
            }
            MemoPayload::Transfer { recipient, lamports } => {
                let target = rest.first().ok_or("the recipient account is missing")?;
                if target.pubkey != recipient {
                    return Err("wrong recipient account".to_owned());
                }
                state.transfer(&payer.pubkey, &recipient, lamports)?;
            }
        }

        let count = state
            .accounts
            .get(&self.counter)
            .and_then(|data| data.get(..8))
            .and_then(|bytes| bytes.try_into().ok())
            .map_or(0, u64::from_le_bytes);
        state
            .accounts
            .insert(self.counter, (count + 1).to_le_bytes().to_vec());
        Ok(())
    }
}

/// A destination program whose discovery chain has a configurable length.
///
/// Round `n` carries `n` as instruction data. Simulating round `n` returns round
/// `n + 1`, or the final transaction once `discovery_rounds` non-final rounds were
/// handed out. With `discovery_rounds: None` it never returns a final transaction.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct ScriptedProgram {
    #[builder(default = Pubkey::new_unique())]
    pub program_id: Pubkey,
    pub discovery_rounds: Option<u32>,
    /// Lamports the final transaction requests through a `Payer` account.
    #[builder(default)]
    pub payer_request: u64,
    /// Time every simulation takes.
    #[builder(default)]
    pub latency: Duration,
}

const FINAL_STEP: [u8; 1] = [0xff];

impl ScriptedProgram {
    /// The relayer transaction published at setup.
    #[must_use]
    pub fn initial_transaction(&self) -> RelayerTransaction {
        if self.discovery_rounds == Some(0) {
            self.final_transaction()
        } else {
            self.discovery_round(1)
        }
    }

    fn discovery_round(&self, round: u32) -> RelayerTransaction {
        RelayerTransaction::discovery(vec![RelayerInstruction {
            program_id: self.program_id,
            accounts: vec![],
            data: vec![RelayerData::Bytes(round.to_le_bytes().to_vec())],
        }])
    }

    fn final_transaction(&self) -> RelayerTransaction {
        let accounts = if self.payer_request > 0 {
            vec![RelayerAccount::Payer(self.payer_request)]
        } else {
            vec![]
        };
        RelayerTransaction::final_transaction(vec![RelayerInstruction {
            program_id: self.program_id,
            accounts,
            data: vec![RelayerData::Bytes(FINAL_STEP.to_vec())],
        }])
    }
}

impl DestinationProgram for ScriptedProgram {
    fn simulate(&self, instruction: &Instruction, _state: &LedgerState) -> Result<Vec<u8>, String> {
        let round = <[u8; 4]>::try_from(instruction.data.as_slice())
            .map(u32::from_le_bytes)
            .map_err(|_| "not a discovery round".to_owned())?;
        let next = match self.discovery_rounds {
            Some(rounds) if round >= rounds => self.final_transaction(),
            Some(_) | None => self.discovery_round(round + 1),
        };
        Ok(next.encode())
    }

    fn execute(&self, instruction: &Instruction, state: &mut LedgerState) -> Result<(), String> {
        if instruction.data != FINAL_STEP {
            return Err("only the final step can be executed".to_owned());
        }
        if self.payer_request > 0 {
            let payer = instruction.accounts.first().ok_or("the payer is missing")?;
            state.transfer(&payer.pubkey, &self.program_id, self.payer_request)?;
        }
        Ok(())
    }

    fn latency(&self) -> Duration {
        self.latency
    }
}

/// A program accepting any instruction without side effects. Useful for relayer
/// transactions built by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgram;

impl DestinationProgram for NoopProgram {
    fn simulate(
        &self,
        _instruction: &Instruction,
        _state: &LedgerState,
    ) -> Result<Vec<u8>, String> {
        Ok(Vec::new())
    }

    fn execute(&self, _instruction: &Instruction, _state: &mut LedgerState) -> Result<(), String> {
        Ok(())
    }
}
