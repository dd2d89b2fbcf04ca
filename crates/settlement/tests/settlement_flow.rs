mod common;

use std::sync::Arc;
use std::time::Duration;

use chess_core::{Beneficiary, GameConfig, GameId, Move, Outcome};
use runtime::{
    Event, EventBus, GameSetup, InMemoryRepository, Runtime, RuntimeConfig, SettlementEvent,
    Topic,
};
use settlement::{SettlementCoordinator, UnconfiguredLedger};
use tokio::sync::broadcast;

use common::*;

async fn next_settlement_event(rx: &mut broadcast::Receiver<Event>) -> SettlementEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Event::Settlement(event) = rx.recv().await.expect("event bus open") {
                return event;
            }
        }
    })
    .await
    .expect("settlement event in time")
}

#[tokio::test]
async fn agreed_draw_is_signed_once_and_claimable_by_both() {
    let repository = Arc::new(InMemoryRepository::new());
    let bus = EventBus::with_capacity(64);
    let mut settlement_events = bus.subscribe(Topic::Settlement);
    let signer = CountingSigner::new(Duration::from_millis(10));
    let coordinator = Arc::new(
        SettlementCoordinator::new(&config(), repository.clone(), Arc::new(UnconfiguredLedger))
            .unwrap()
            .with_event_bus(bus.clone())
            .with_signer(signer.clone()),
    );

    let runtime = Runtime::builder()
        .config(RuntimeConfig {
            game: GameConfig::with_time_control(60_000, 0),
            retry: fast_retry(3),
            ..RuntimeConfig::default()
        })
        .repository(repository.clone())
        .event_bus(bus)
        .hook(coordinator.clone())
        .build()
        .await
        .unwrap();

    let handle = runtime
        .open_game(GameSetup::new(GameId(100), alice()).with_black(bob()))
        .await
        .unwrap();
    handle
        .submit_move(id("alice"), Move::from_uci("e2e4", 1).unwrap())
        .await
        .unwrap();
    handle.accept_draw(id("alice")).await.unwrap();
    let reply = handle.accept_draw(id("bob")).await.unwrap();
    assert_eq!(
        reply.snapshot.result.map(|r| r.outcome),
        Some(Outcome::Draw)
    );

    // The terminal hook pre-issues the signature.
    match next_settlement_event(&mut settlement_events).await {
        SettlementEvent::SignatureIssued { game_id, .. } => assert_eq!(game_id, GameId(100)),
        other => panic!("unexpected settlement event {other:?}"),
    }

    let (alice, bob) = (id("alice"), id("bob"));
    let (white, black) = tokio::join!(
        coordinator.claim(GameId(100), &alice),
        coordinator.claim(GameId(100), &bob),
    );
    let (white, black) = (white.unwrap(), black.unwrap());
    assert_eq!(white.signature_hex, black.signature_hex);
    assert_eq!(white.beneficiary, Beneficiary::Draw);
    assert_eq!(signer.calls(), 1);

    runtime.shutdown().await.unwrap();
    assert!(settlement_events.try_recv().is_err());
}

#[tokio::test]
async fn resignation_pays_the_opponent() {
    let repository = Arc::new(InMemoryRepository::new());
    let bus = EventBus::with_capacity(64);
    let mut settlement_events = bus.subscribe(Topic::Settlement);
    let coordinator = Arc::new(
        SettlementCoordinator::new(&config(), repository.clone(), Arc::new(UnconfiguredLedger))
            .unwrap()
            .with_event_bus(bus.clone()),
    );
    let runtime = Runtime::builder()
        .config(RuntimeConfig {
            retry: fast_retry(3),
            ..RuntimeConfig::default()
        })
        .repository(repository)
        .event_bus(bus)
        .hook(coordinator.clone())
        .build()
        .await
        .unwrap();

    let handle = runtime
        .open_game(GameSetup::new(GameId(101), alice()).with_black(bob()))
        .await
        .unwrap();
    handle.resign(id("alice")).await.unwrap();

    assert!(matches!(
        next_settlement_event(&mut settlement_events).await,
        SettlementEvent::SignatureIssued {
            game_id: GameId(101),
            ..
        }
    ));
    let ticket = coordinator.claim(GameId(101), &id("bob")).await.unwrap();
    assert_eq!(ticket.beneficiary, Beneficiary::Address(bob().address));
    assert!(coordinator.claim(GameId(101), &id("alice")).await.is_err());

    runtime.shutdown().await.unwrap();
}
