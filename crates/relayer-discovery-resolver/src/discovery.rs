//! The per-message resolution loop.
//!
//! ```text
//! Start -> AwaitDescriptor -> Decoded(1) -> Simulating -> Decoded(2) -> ... -> Final -> Executed
//! ```
//!
//! Every arrow that talks to the ledger is a suspension point: it may be cut short
//! by cancellation, the message timeout or the round timeout. Any error moves the
//! loop to `Failed`.

use core::future::Future;
use std::sync::Arc;

use relayer_discovery::{find_transaction_pda, Message, RelayerTransaction};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::funding::{plan_funding, FundingPlan};
use crate::materializer::MaterializedTransaction;
use crate::transport::{
    ExecutionReceipt, FinalTransaction, PayloadStager, RelayerTransport, SimulationRequest,
};
use crate::{
    DiscoveryError, MaterializationError, RelayError, RelayerConfig, ResolutionContext,
};

/// An approved message to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /// The message, as approved by the gateway.
    pub message: Message,
    /// The raw payload, staged on the ledger if the destination program asks for it.
    pub payload: Vec<u8>,
    /// The gateway account holding the approval.
    pub incoming_message: Pubkey,
    /// The account holding the payload, if it was already uploaded.
    pub message_payload: Option<Pubkey>,
    /// Lamports paid for relaying this message. Caps the `Payer` requests.
    pub gas_budget: u64,
}

/// Outcome of a successful relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// The command id of the relayed message.
    pub command_id: [u8; 32],
    /// How many relayer transactions were decoded, the final one included.
    pub rounds: u32,
    /// Sum of the `Payer` amounts of the final transaction.
    pub requested: u64,
    /// Lamports transferred to the payer before execution.
    pub top_up: u64,
    /// The executed final transaction.
    pub receipt: ExecutionReceipt,
}

/// The states of a single relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    /// Nothing happened yet.
    Start,
    /// Waiting for the relayer transaction published at `address`.
    AwaitDescriptor {
        /// The transaction pda of the destination program.
        address: Pubkey,
    },
    /// A relayer transaction was decoded.
    Decoded {
        transaction: RelayerTransaction,
        round: u32,
    },
    /// The materialized instructions of a non-final round are being simulated.
    Simulating {
        request: SimulationRequest,
        round: u32,
    },
    /// The final relayer transaction was reached.
    Final {
        transaction: RelayerTransaction,
        round: u32,
    },
    /// The final transaction was funded and executed.
    Executed(RelayOutcome),
    /// The relay failed.
    Failed(RelayError),
}

impl ResolutionState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::AwaitDescriptor { .. } => "await_descriptor",
            Self::Decoded { .. } => "decoded",
            Self::Simulating { .. } => "simulating",
            Self::Final { .. } => "final",
            Self::Executed(_) => "executed",
            Self::Failed(_) => "failed",
        }
    }

    const fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed(_) | Self::Failed(_))
    }
}

/// Drives the relay of one message from the published relayer transaction to the
/// executed final transaction.
pub struct DiscoveryLoop<T: ?Sized> {
    transport: Arc<T>,
    stager: Option<Arc<dyn PayloadStager>>,
    config: RelayerConfig,
    funding_lock: Arc<Mutex<()>>,
    cancellation: CancellationToken,
    request: RelayRequest,
    context: ResolutionContext,
    command_id: [u8; 32],
    round: u32,
    message_deadline: Instant,
    round_deadline: Instant,
}

impl<T: RelayerTransport + ?Sized> DiscoveryLoop<T> {
    /// A loop relaying `request`, signed and funded through `payer`.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        payer: Pubkey,
        request: RelayRequest,
        config: RelayerConfig,
    ) -> Self {
        let mut context = ResolutionContext::new(payer)
            .with_incoming_message(request.incoming_message)
            .with_message(request.message.clone());
        context.message_payload = request.message_payload;
        let now = Instant::now();

        Self {
            transport,
            stager: None,
            command_id: request.message.command_id(),
            message_deadline: now + config.message_timeout,
            round_deadline: now + config.round_timeout,
            config,
            funding_lock: Arc::new(Mutex::new(())),
            cancellation: CancellationToken::new(),
            request,
            context,
            round: 0,
        }
    }

    /// Stages the payload whenever a round references it before it is known.
    #[must_use]
    pub fn with_payload_stager(mut self, stager: Arc<dyn PayloadStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    /// Serializes funding and execution with every other loop sharing `lock`.
    #[must_use]
    pub fn with_funding_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.funding_lock = lock;
        self
    }

    /// Aborts the loop at its next suspension point once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The command id of the message being relayed.
    #[must_use]
    pub const fn command_id(&self) -> [u8; 32] {
        self.command_id
    }

    /// Runs the loop to completion.
    ///
    /// # Errors
    ///
    /// A [`RelayError`] naming the round the relay failed in.
    #[tracing::instrument(
        name = "relay",
        skip_all,
        fields(
            command_id = %hex::encode(self.command_id),
            destination = %self.request.message.destination_address,
        )
    )]
    pub async fn run(mut self) -> Result<RelayOutcome, RelayError> {
        let now = Instant::now();
        self.message_deadline = now + self.config.message_timeout;
        self.round_deadline = now + self.config.round_timeout;

        let mut state = ResolutionState::Start;
        loop {
            state = self.step(state).await;
            match state {
                ResolutionState::Executed(outcome) => {
                    info!(
                        rounds = outcome.rounds,
                        top_up = outcome.top_up,
                        signature = %outcome.receipt.signature,
                        "message relayed"
                    );
                    return Ok(outcome);
                }
                ResolutionState::Failed(error) => {
                    warn!(
                        round = error.round,
                        retryable = error.is_retryable(),
                        %error,
                        "relay failed"
                    );
                    return Err(error);
                }
                _ => {}
            }
        }
    }

    /// Advances the loop by a single transition.
    pub async fn step(&mut self, state: ResolutionState) -> ResolutionState {
        if state.is_terminal() {
            return state;
        }

        let from = state.name();
        let next = match self.transition(state).await {
            Ok(next) => next,
            Err(kind) => ResolutionState::Failed(RelayError {
                command_id: self.command_id,
                round: self.round,
                kind,
            }),
        };
        debug!(round = self.round, from, to = next.name(), "transition");
        next
    }

    async fn transition(
        &mut self,
        state: ResolutionState,
    ) -> Result<ResolutionState, DiscoveryError> {
        match state {
            ResolutionState::Start => {
                let program_id = self.request.message.destination_program()?;
                let (address, _) = find_transaction_pda(&program_id)?;
                Ok(ResolutionState::AwaitDescriptor { address })
            }
            ResolutionState::AwaitDescriptor { address } => {
                let bytes = self
                    .suspend(self.transport.fetch_account_data(&address))
                    .await?
                    .map_err(DiscoveryError::Fetch)?
                    .ok_or(DiscoveryError::AccountNotFound { address })?;
                self.decoded(&bytes)
            }
            ResolutionState::Decoded { transaction, round } => {
                if transaction.is_final {
                    return Ok(ResolutionState::Final { transaction, round });
                }
                // Another simulation could only yield a round past the limit.
                if round >= self.config.max_rounds {
                    return Err(DiscoveryError::MaxRoundsExceeded {
                        max_rounds: self.config.max_rounds,
                    });
                }
                let materialized = self.materialize(&transaction).await?;
                Ok(ResolutionState::Simulating {
                    request: SimulationRequest {
                        fee_payer: self.transport.fee_payer(),
                        instructions: materialized.instructions(),
                    },
                    round,
                })
            }
            ResolutionState::Simulating { request, .. } => {
                let return_data = self
                    .suspend(self.transport.simulate(request))
                    .await?
                    .map_err(DiscoveryError::SimulationFailure)?;
                self.decoded(&return_data)
            }
            ResolutionState::Final { transaction, round } => {
                let materialized = self.materialize(&transaction).await?;
                let (plan, receipt) = self.fund_and_execute(&materialized).await?;
                Ok(ResolutionState::Executed(RelayOutcome {
                    command_id: self.command_id,
                    rounds: round,
                    requested: plan.requested,
                    top_up: plan.top_up,
                    receipt,
                }))
            }
            terminal @ (ResolutionState::Executed(_) | ResolutionState::Failed(_)) => Ok(terminal),
        }
    }

    fn decoded(&mut self, bytes: &[u8]) -> Result<ResolutionState, DiscoveryError> {
        let transaction = RelayerTransaction::decode(bytes)?;
        self.round = self.round.saturating_add(1);
        self.round_deadline = Instant::now() + self.config.round_timeout;
        debug!(
            round = self.round,
            is_final = transaction.is_final,
            instructions = transaction.instructions.len(),
            "decoded relayer transaction"
        );
        Ok(ResolutionState::Decoded {
            transaction,
            round: self.round,
        })
    }

    async fn materialize(
        &mut self,
        transaction: &RelayerTransaction,
    ) -> Result<MaterializedTransaction, DiscoveryError> {
        match MaterializedTransaction::materialize(transaction, &self.context) {
            Ok(materialized) => Ok(materialized),
            Err(MaterializationError::MissingMessagePayload) => {
                let Some(stager) = self.stager.clone() else {
                    return Err(MaterializationError::MissingMessagePayload.into());
                };
                debug!(bytes = self.request.payload.len(), "staging message payload");
                let message_payload = self
                    .suspend(stager.stage_payload(self.command_id, &self.request.payload))
                    .await?
                    .map_err(DiscoveryError::PayloadStaging)?;
                self.context.message_payload = Some(message_payload);
                Ok(MaterializedTransaction::materialize(
                    transaction,
                    &self.context,
                )?)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn fund_and_execute(
        &self,
        materialized: &MaterializedTransaction,
    ) -> Result<(FundingPlan, ExecutionReceipt), DiscoveryError> {
        let payer = self.context.payer;
        let fee_payer = self.transport.fee_payer();

        // Held until execution, so no other relay sees the topped up balance.
        let _funding = self.suspend(self.funding_lock.lock()).await?;

        let balance = self
            .suspend(self.transport.balance(&payer))
            .await?
            .map_err(DiscoveryError::Funding)?;
        let plan = plan_funding(&materialized.payer_requests, balance, self.request.gas_budget)?;
        if plan.top_up > 0 {
            debug!(lamports = plan.top_up, %payer, "topping up payer");
            self.suspend(self.transport.top_up(&payer, plan.top_up))
                .await?
                .map_err(DiscoveryError::Funding)?;
        }

        let receipt = self
            .suspend(self.transport.execute(FinalTransaction {
                fee_payer,
                instructions: materialized.instructions(),
                signers: materialized.required_signers(&fee_payer),
            }))
            .await?
            .map_err(DiscoveryError::ExecutionFailure)?;

        Ok((plan, receipt))
    }

    /// Awaits `future` unless the loop is cancelled or out of time first.
    async fn suspend<F: Future>(&self, future: F) -> Result<F::Output, DiscoveryError> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(DiscoveryError::Cancelled),
            () = tokio::time::sleep_until(self.message_deadline) => Err(DiscoveryError::Cancelled),
            () = tokio::time::sleep_until(self.round_deadline) => Err(DiscoveryError::RoundTimeout {
                timeout: self.config.round_timeout,
            }),
            output = future => Ok(output),
        }
    }
}

impl<T: ?Sized> core::fmt::Debug for DiscoveryLoop<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DiscoveryLoop")
            .field("command_id", &hex::encode(self.command_id))
            .field("round", &self.round)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
