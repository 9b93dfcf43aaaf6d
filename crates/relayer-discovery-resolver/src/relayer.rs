use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::discovery::{DiscoveryLoop, RelayOutcome, RelayRequest};
use crate::transport::{PayloadStager, RelayerTransport};
use crate::{DiscoveryError, RelayError, RelayerConfig};

/// Relays many messages at once over one shared transport.
///
/// Every message gets its own [`DiscoveryLoop`]. The loops only share the
/// transport and the payer, whose funding is serialized.
pub struct Relayer<T: ?Sized> {
    transport: Arc<T>,
    stager: Option<Arc<dyn PayloadStager>>,
    payer: Pubkey,
    config: RelayerConfig,
    funding_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
    permits: Arc<Semaphore>,
}

impl<T: RelayerTransport + ?Sized + 'static> Relayer<T> {
    /// A relayer signing every `Payer` account with `payer`.
    #[must_use]
    pub fn new(transport: Arc<T>, payer: Pubkey, config: RelayerConfig) -> Self {
        Self {
            transport,
            stager: None,
            payer,
            funding_lock: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_messages.max(1))),
            config,
        }
    }

    /// Lets every loop stage payloads that were not uploaded beforehand.
    #[must_use]
    pub fn with_payload_stager(mut self, stager: Arc<dyn PayloadStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    /// A loop for `request` wired to this relayer's payer, funding lock and shutdown
    /// signal.
    #[must_use]
    pub fn discovery_loop(&self, request: RelayRequest) -> DiscoveryLoop<T> {
        let discovery = DiscoveryLoop::new(
            Arc::clone(&self.transport),
            self.payer,
            request,
            self.config.clone(),
        )
        .with_funding_lock(Arc::clone(&self.funding_lock))
        .with_cancellation(self.shutdown.child_token());

        match &self.stager {
            Some(stager) => discovery.with_payload_stager(Arc::clone(stager)),
            None => discovery,
        }
    }

    /// Relays a single message.
    ///
    /// # Errors
    ///
    /// The [`RelayError`] the message failed with.
    pub async fn relay(&self, request: RelayRequest) -> Result<RelayOutcome, RelayError> {
        let discovery = self.discovery_loop(request);
        let _permit =
            Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| RelayError {
                    command_id: discovery.command_id(),
                    round: 0,
                    kind: DiscoveryError::Cancelled,
                })?;
        discovery.run().await
    }

    /// Relays every request concurrently, at most `max_concurrent_messages` at a
    /// time.
    ///
    /// Results come back in completion order, one per request. A failing message
    /// never affects the others.
    pub async fn relay_all(
        &self,
        requests: impl IntoIterator<Item = RelayRequest>,
    ) -> Vec<Result<RelayOutcome, RelayError>> {
        let mut relays = FuturesUnordered::new();
        for request in requests {
            let discovery = self.discovery_loop(request);
            let command_id = discovery.command_id();
            let permits = Arc::clone(&self.permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|_| RelayError {
                    command_id,
                    round: 0,
                    kind: DiscoveryError::Cancelled,
                })?;
                discovery.run().await
            });
            relays.push(async move { (command_id, handle.await) });
        }
        debug!(messages = relays.len(), "relaying messages");

        let mut results = Vec::with_capacity(relays.len());
        while let Some((command_id, joined)) = relays.next().await {
            results.push(joined.unwrap_or_else(|error| {
                Err(RelayError {
                    command_id,
                    round: 0,
                    kind: DiscoveryError::Aborted(error.to_string()),
                })
            }));
        }
        results
    }

    /// Cancels every running relay. They fail with [`DiscoveryError::Cancelled`] at
    /// their next suspension point.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
