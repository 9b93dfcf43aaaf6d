use core::time::Duration;
use std::sync::Arc;

use relayer_discovery_resolver::{
    DiscoveryError, DiscoveryLoop, MaterializationError, PayloadStager, Relayer, RelayerConfig,
};
use relayer_discovery_test_fixtures::{
    approved_request, DiscoverableMemo, LaggingLedger, MemoPayload, ScriptedProgram, TestLedger,
};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn deploy(ledger: &TestLedger, program: ScriptedProgram) -> Pubkey {
    let program_id = program.program_id;
    ledger.publish(&program_id, &program.initial_transaction());
    ledger.deploy(program_id, Arc::new(program));
    program_id
}

#[test_log::test(tokio::test)]
async fn slow_message_does_not_block_fast_one() {
    let ledger = Arc::new(TestLedger::new(0));
    let slow = deploy(
        &ledger,
        ScriptedProgram::builder()
            .discovery_rounds(Some(1))
            .latency(Duration::from_millis(500))
            .build(),
    );
    let fast = deploy(
        &ledger,
        ScriptedProgram::builder().discovery_rounds(Some(1)).build(),
    );
    let slow_request = approved_request(&ledger, &slow, b"", 0);
    let fast_request = approved_request(&ledger, &fast, b"", 0);
    let fast_command = fast_request.message.command_id();
    let slow_command = slow_request.message.command_id();
    let relayer = Relayer::new(
        Arc::clone(&ledger),
        Pubkey::new_unique(),
        RelayerConfig::default(),
    );

    let results = relayer.relay_all([slow_request, fast_request]).await;

    let completed: Vec<_> = results
        .into_iter()
        .map(|result| result.unwrap().command_id)
        .collect();
    assert_eq!(completed, vec![fast_command, slow_command]);
}

#[test_log::test(tokio::test)]
async fn failing_message_does_not_abort_others() {
    let ledger = Arc::new(TestLedger::new(0));
    let discoverable = deploy(
        &ledger,
        ScriptedProgram::builder().discovery_rounds(Some(2)).build(),
    );
    let missing = Pubkey::new_unique();
    let relayer = Relayer::new(
        Arc::clone(&ledger),
        Pubkey::new_unique(),
        RelayerConfig::default(),
    );

    let results = relayer
        .relay_all([
            approved_request(&ledger, &missing, b"", 0),
            approved_request(&ledger, &discoverable, b"", 0),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    let failure = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        failure.kind,
        DiscoveryError::AccountNotFound { .. }
    ));
}

#[test_log::test(tokio::test)]
async fn shutdown_cancels_in_flight_relays() {
    let ledger = Arc::new(TestLedger::new(0));
    let program_id = deploy(
        &ledger,
        ScriptedProgram::builder()
            .discovery_rounds(Some(1))
            .latency(Duration::from_secs(10))
            .build(),
    );
    let relayer = Relayer::new(
        Arc::clone(&ledger),
        Pubkey::new_unique(),
        RelayerConfig::default(),
    );
    let request = approved_request(&ledger, &program_id, b"", 0);

    let (results, ()) = tokio::join!(relayer.relay_all([request]), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        relayer.shutdown();
    });

    let error = results.into_iter().next().unwrap().unwrap_err();
    assert_eq!(error.kind, DiscoveryError::Cancelled);
    assert_eq!(error.round, 1);
    assert!(ledger.executed().is_empty());
}

#[test_log::test(tokio::test)]
async fn slow_round_times_out() {
    let ledger = Arc::new(TestLedger::new(0));
    let program_id = deploy(
        &ledger,
        ScriptedProgram::builder()
            .discovery_rounds(Some(1))
            .latency(Duration::from_secs(5))
            .build(),
    );
    let config = RelayerConfig::builder()
        .round_timeout(Duration::from_millis(100))
        .build();

    let error = Relayer::new(Arc::clone(&ledger), Pubkey::new_unique(), config)
        .relay(approved_request(&ledger, &program_id, b"", 0))
        .await
        .unwrap_err();

    assert_eq!(
        error.kind,
        DiscoveryError::RoundTimeout {
            timeout: Duration::from_millis(100)
        }
    );
    assert_eq!(error.round, 1);
    assert!(error.is_retryable());
}

#[test_log::test(tokio::test)]
async fn message_timeout_spans_all_rounds() {
    let ledger = Arc::new(TestLedger::new(0));
    let program_id = deploy(
        &ledger,
        ScriptedProgram::builder()
            .discovery_rounds(None)
            .latency(Duration::from_millis(40))
            .build(),
    );
    let config = RelayerConfig::builder()
        .max_rounds(1_000)
        .round_timeout(Duration::from_secs(10))
        .message_timeout(Duration::from_millis(200))
        .build();

    let error = Relayer::new(Arc::clone(&ledger), Pubkey::new_unique(), config)
        .relay(approved_request(&ledger, &program_id, b"", 0))
        .await
        .unwrap_err();

    assert_eq!(error.kind, DiscoveryError::Cancelled);
    assert!(error.round > 1);
}

#[test_log::test(tokio::test)]
async fn payload_is_staged_when_first_referenced() {
    let ledger = Arc::new(TestLedger::new(1_000_000));
    let memo = DiscoverableMemo::new();
    ledger.deploy(memo.program_id, Arc::new(memo));
    ledger.publish(&memo.program_id, &memo.initial_transaction());
    let payload = MemoPayload::Memo {
        text: "staged".to_owned(),
    }
    .encode();
    let mut request = approved_request(&ledger, &memo.program_id, &payload, 5_000);
    request.message_payload = None;
    let command_id = request.message.command_id();
    let stager: Arc<dyn PayloadStager> = Arc::clone(&ledger) as Arc<dyn PayloadStager>;

    let outcome = Relayer::new(
        Arc::clone(&ledger),
        Pubkey::new_unique(),
        RelayerConfig::default(),
    )
    .with_payload_stager(stager)
    .relay(request)
    .await
    .unwrap();

    assert_eq!(outcome.rounds, 2);
    // Staged once, then reused by the final round.
    assert_eq!(ledger.staged(), vec![command_id]);
    assert_eq!(ledger.executed().len(), 1);
}

#[test_log::test(tokio::test)]
async fn unstaged_payload_without_stager_fails() {
    let ledger = Arc::new(TestLedger::new(1_000_000));
    let memo = DiscoverableMemo::new();
    ledger.deploy(memo.program_id, Arc::new(memo));
    ledger.publish(&memo.program_id, &memo.initial_transaction());
    let mut request = approved_request(&ledger, &memo.program_id, b"", 5_000);
    request.message_payload = None;

    let error = Relayer::new(
        Arc::clone(&ledger),
        Pubkey::new_unique(),
        RelayerConfig::default(),
    )
    .relay(request)
    .await
    .unwrap_err();

    assert_eq!(error.round, 1);
    assert_eq!(
        error.kind,
        DiscoveryError::Materialization(MaterializationError::MissingMessagePayload)
    );
    assert!(ledger.simulations().is_empty());
}

fn funded_final_program(ledger: &TestLedger) -> Pubkey {
    deploy(
        ledger,
        ScriptedProgram::builder()
            .discovery_rounds(Some(0))
            .payer_request(100)
            .build(),
    )
}

#[test_log::test(tokio::test)]
async fn shutdown_interrupts_descriptor_fetch() {
    let ledger = Arc::new(TestLedger::new(1_000_000));
    let program_id = funded_final_program(&ledger);
    let transport = LaggingLedger::builder()
        .ledger(Arc::clone(&ledger))
        .fetch(Duration::from_secs(10))
        .build();
    let relayer = Relayer::new(
        Arc::new(transport),
        Pubkey::new_unique(),
        RelayerConfig::default(),
    );
    let request = approved_request(&ledger, &program_id, b"", 1_000);

    let (result, ()) = tokio::join!(relayer.relay(request), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        relayer.shutdown();
    });

    let error = result.unwrap_err();
    assert_eq!(error.kind, DiscoveryError::Cancelled);
    assert_eq!(error.round, 0);
    assert!(ledger.fetches().is_empty());
}

#[test_log::test(tokio::test)]
async fn cancellation_reaches_relays_waiting_for_funding() {
    let ledger = Arc::new(TestLedger::new(1_000_000));
    let program_id = funded_final_program(&ledger);
    let funding_lock = Arc::new(Mutex::new(()));
    let cancellation = CancellationToken::new();
    let discovery = DiscoveryLoop::new(
        Arc::clone(&ledger),
        Pubkey::new_unique(),
        approved_request(&ledger, &program_id, b"", 1_000),
        RelayerConfig::default(),
    )
    .with_funding_lock(Arc::clone(&funding_lock))
    .with_cancellation(cancellation.clone());
    // Another relay is funding the same payer.
    let _funding = funding_lock.lock().await;

    let (result, ()) = tokio::join!(discovery.run(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancellation.cancel();
    });

    let error = result.unwrap_err();
    assert_eq!(error.kind, DiscoveryError::Cancelled);
    assert_eq!(error.round, 1);
    assert!(ledger.top_ups().is_empty());
    assert!(ledger.executed().is_empty());
}

#[test_log::test(tokio::test)]
async fn message_timeout_interrupts_execution() {
    let ledger = Arc::new(TestLedger::new(1_000_000));
    let program_id = funded_final_program(&ledger);
    let transport = LaggingLedger::builder()
        .ledger(Arc::clone(&ledger))
        .execute(Duration::from_secs(10))
        .build();
    let config = RelayerConfig::builder()
        .round_timeout(Duration::from_secs(10))
        .message_timeout(Duration::from_millis(100))
        .build();

    let error = Relayer::new(Arc::new(transport), Pubkey::new_unique(), config)
        .relay(approved_request(&ledger, &program_id, b"", 1_000))
        .await
        .unwrap_err();

    assert_eq!(error.kind, DiscoveryError::Cancelled);
    assert_eq!(error.round, 1);
    assert_eq!(ledger.top_ups().len(), 1);
    assert!(ledger.executed().is_empty());
}
