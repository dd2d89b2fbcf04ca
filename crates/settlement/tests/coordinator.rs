mod common;

use std::sync::Arc;
use std::time::Duration;

use chess_core::{Beneficiary, Color, GameId, Outcome, SettlementPayload};
use runtime::{Event, EventBus, SettlementEvent, SignatureRepository, Topic};
use settlement::{
    MockLedger, SettlementCoordinator, SettlementError, UnconfiguredLedger, recover, verify,
};

use common::*;

fn coordinator(
    repository: Arc<runtime::InMemoryRepository>,
    signer: Arc<CountingSigner>,
) -> SettlementCoordinator {
    SettlementCoordinator::new(&config(), repository, Arc::new(UnconfiguredLedger))
        .unwrap()
        .with_signer(signer)
}

#[tokio::test]
async fn simultaneous_claims_share_one_signing_operation() {
    let repository = repository_with(&[terminal(1, Outcome::WhiteWins)]).await;
    let signer = CountingSigner::new(Duration::from_millis(50));
    let coordinator = coordinator(repository, signer.clone());

    let alice = id("alice");
    let (first, second) = tokio::join!(
        coordinator.claim(GameId(1), &alice),
        coordinator.claim(GameId(1), &alice),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(signer.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.signature_hex, second.signature_hex);
    assert_eq!(first.beneficiary, Beneficiary::Address(alice_address()));
    assert_eq!(
        recover(&first.payload_hash, &first.signature).unwrap(),
        coordinator.judge_address()
    );
}

fn alice_address() -> chess_core::Address {
    common::alice().address
}

#[tokio::test]
async fn draw_payload_uses_marker_and_either_player_may_claim() {
    let repository = repository_with(&[terminal(2, Outcome::Draw)]).await;
    let signer = CountingSigner::new(Duration::ZERO);
    let coordinator = coordinator(repository, signer.clone());

    let by_white = coordinator.claim(GameId(2), &id("alice")).await.unwrap();
    let by_black = coordinator.claim(GameId(2), &id("bob")).await.unwrap();

    assert_eq!(signer.calls(), 1);
    assert_eq!(by_white, by_black);
    assert_eq!(by_white.beneficiary, Beneficiary::Draw);
    let expected = SettlementPayload::new(GameId(2), Beneficiary::Draw, coordinator.contract());
    assert_eq!(by_white.payload_hash, expected.hash());
    assert!(verify(
        &by_white.payload_hash,
        &by_white.signature,
        coordinator.judge_address()
    ));

    // A win for the same game would hash differently.
    let win = SettlementPayload::new(
        GameId(2),
        Beneficiary::Address(alice_address()),
        coordinator.contract(),
    );
    assert_ne!(win.hash(), by_white.payload_hash);
}

#[tokio::test]
async fn repeated_requests_return_the_stored_signature() {
    let repository = repository_with(&[terminal(3, Outcome::BlackTimeout)]).await;
    let bus = EventBus::with_capacity(16);
    let mut events = bus.subscribe(Topic::Settlement);
    let signer = CountingSigner::new(Duration::ZERO);
    let first_coordinator = coordinator(repository.clone(), signer.clone()).with_event_bus(bus);

    let first = first_coordinator
        .get_or_issue_signature(GameId(3))
        .await
        .unwrap();
    let again = first_coordinator
        .get_or_issue_signature(GameId(3))
        .await
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(signer.calls(), 1);
    assert_eq!(
        first.payload.beneficiary,
        Beneficiary::Address(common::bob().address)
    );

    match events.try_recv() {
        Ok(Event::Settlement(SettlementEvent::SignatureIssued {
            game_id,
            payload_hash,
        })) => {
            assert_eq!(game_id, GameId(3));
            assert_eq!(payload_hash, first.payload_hash);
        }
        other => panic!("expected signature issued, got {other:?}"),
    }
    assert!(events.try_recv().is_err());

    // A fresh coordinator, as after a restart, reuses the stored record.
    let other_signer = CountingSigner::new(Duration::ZERO);
    let restarted = coordinator(repository, other_signer.clone());
    let after_restart = restarted.get_or_issue_signature(GameId(3)).await.unwrap();
    assert_eq!(after_restart, first);
    assert_eq!(other_signer.calls(), 0);
}

#[tokio::test]
async fn only_the_beneficiary_may_claim() {
    let repository = repository_with(&[
        terminal(4, Outcome::BlackWins),
        terminal(
            5,
            Outcome::Abandoned {
                beneficiary: Color::White,
            },
        ),
    ])
    .await;
    let signer = CountingSigner::new(Duration::ZERO);
    let coordinator = coordinator(repository, signer.clone());

    let denied = coordinator.claim(GameId(4), &id("alice")).await;
    assert!(matches!(
        denied,
        Err(SettlementError::NotBeneficiary {
            game_id: GameId(4),
            ..
        })
    ));
    let denied = coordinator.claim(GameId(4), &id("mallory")).await;
    assert!(matches!(denied, Err(SettlementError::NotBeneficiary { .. })));
    assert_eq!(signer.calls(), 0);

    let ticket = coordinator.claim(GameId(4), &id("bob")).await.unwrap();
    assert_eq!(ticket.beneficiary, Beneficiary::Address(common::bob().address));
    let ticket = coordinator.claim(GameId(5), &id("alice")).await.unwrap();
    assert_eq!(ticket.beneficiary, Beneficiary::Address(alice_address()));

    assert!(matches!(
        coordinator.claim(GameId(6), &id("alice")).await,
        Err(SettlementError::NotCompleted(GameId(6)))
    ));
}

#[tokio::test]
async fn claims_are_marked_only_after_ledger_confirmation() {
    let repository = repository_with(&[terminal(7, Outcome::WhiteWins)]).await;
    let ledger = Arc::new(MockLedger::new());
    let bus = EventBus::with_capacity(16);
    let mut events = bus.subscribe(Topic::Settlement);
    let coordinator = SettlementCoordinator::new(&config(), repository.clone(), ledger.clone())
        .unwrap()
        .with_event_bus(bus);

    assert!(matches!(
        coordinator.mark_claimed(GameId(7), "0xtx1").await,
        Err(SettlementError::NoSignature(GameId(7)))
    ));

    let ticket = coordinator.claim(GameId(7), &id("alice")).await.unwrap();
    let _issued = events.recv().await.unwrap();

    // Not on the ledger yet.
    let pending = coordinator.mark_claimed(GameId(7), "0xtx1").await;
    assert!(matches!(
        pending,
        Err(SettlementError::ClaimNotConfirmed { ref reason, .. }) if reason == "pending"
    ));
    assert!(pending.unwrap_err().is_retryable());
    let stored = repository
        .load_signature(&ticket.payload_hash)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.claimed);

    // A transaction that settled something else is rejected.
    let other = SettlementPayload::new(GameId(8), Beneficiary::Draw, coordinator.contract());
    ledger.confirm("0xtx2", other.hash());
    assert!(matches!(
        coordinator.mark_claimed(GameId(7), "0xtx2").await,
        Err(SettlementError::ClaimNotConfirmed { .. })
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::Settlement(SettlementEvent::ClaimRejected {
            game_id: GameId(7),
            ..
        })
    ));

    ledger.confirm("0xtx3", ticket.payload_hash);
    let claimed = coordinator.mark_claimed(GameId(7), "0xtx3").await.unwrap();
    assert!(claimed.claimed);
    assert_eq!(claimed.claim_tx.as_deref(), Some("0xtx3"));
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::Settlement(SettlementEvent::ClaimConfirmed { .. })
    ));

    let again = coordinator.mark_claimed(GameId(7), "0xtx3").await.unwrap();
    assert_eq!(again, claimed);
    let ticket = coordinator.claim(GameId(7), &id("alice")).await.unwrap();
    assert!(ticket.claimed);
}

#[tokio::test]
async fn signing_failures_are_retried_and_never_reported_as_signed() {
    let repository = repository_with(&[terminal(9, Outcome::Draw), terminal(10, Outcome::Draw)])
        .await;

    let flaky = CountingSigner::failing(2, Duration::ZERO);
    let recovered = coordinator(repository.clone(), flaky.clone());
    let record = recovered.get_or_issue_signature(GameId(9)).await.unwrap();
    assert_eq!(flaky.calls(), 3);
    assert!(verify(
        &record.payload_hash,
        &record.signature,
        recovered.judge_address()
    ));

    let broken = CountingSigner::failing(u32::MAX, Duration::ZERO);
    let failing = coordinator(repository, broken.clone());
    let result = failing.get_or_issue_signature(GameId(10)).await;
    assert!(matches!(result, Err(SettlementError::Signing { .. })));
    assert_eq!(broken.calls(), 3);
    assert!(failing.signature(GameId(10)).await.unwrap().is_none());
}
