mod common;

use std::sync::Arc;
use std::time::Duration;

use chess_core::{GameConfig, GameId, Move, Outcome, Rejection, SessionStatus};
use runtime::{
    ConnectionId, Event, FileRepository, GameRepository, GameSetup, InMemoryRepository,
    OutcomeEvent, Runtime, RuntimeConfig, RuntimeError, Topic,
};

use common::*;

fn mv(uci: &str, seq: u32) -> Move {
    Move::from_uci(uci, seq).expect("valid uci")
}

#[tokio::test]
async fn restarted_runtime_resumes_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();

    let (fen, legal_before) = {
        let repository = Arc::new(FileRepository::new(dir.path()).unwrap());
        let runtime = start_runtime(&clock, repository, None).await;
        let handle = runtime
            .open_game(GameSetup::new(GameId(5), alice()).with_black(bob()))
            .await
            .unwrap();
        handle.submit_move(id(ALICE), mv("e2e4", 1)).await.unwrap();
        clock.advance(1_500);
        handle.submit_move(id(BOB), mv("e7e5", 2)).await.unwrap();
        let snapshot = handle.snapshot();
        runtime.shutdown().await.unwrap();

        let stored = FileRepository::new(dir.path())
            .unwrap()
            .load_game(GameId(5))
            .await
            .unwrap()
            .expect("snapshot persisted on shutdown");
        assert_eq!(stored.plies(), 2);
        (snapshot.fen, stored.position.legal_moves())
    };

    let repository = Arc::new(FileRepository::new(dir.path()).unwrap());
    let runtime = start_runtime(&clock, repository.clone(), None).await;
    let handle = runtime.session(GameId(5)).await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.ply, 2);
    assert_eq!(snapshot.fen, fen);
    assert_eq!(snapshot.clock.black_ms, 60_000 - 1_500);

    let restored = repository.load_game(GameId(5)).await.unwrap().unwrap();
    assert_eq!(restored.position.legal_moves(), legal_before);

    let reply = handle.submit_move(id(ALICE), mv("g1f3", 3)).await.unwrap();
    assert!(reply.is_accepted());
    assert_eq!(reply.snapshot.ply, 3);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn registry_never_hosts_two_sessions_for_one_game() {
    let clock = clock();
    let runtime = start_runtime(&clock, Arc::new(InMemoryRepository::new()), None).await;
    let setup = GameSetup::new(GameId(77), alice()).with_black(bob());

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let registry = runtime.registry().clone();
        let setup = setup.clone();
        tasks.push(tokio::spawn(async move { registry.get_or_create(setup).await }));
    }
    let handles: Vec<_> = futures_join(tasks).await;

    let reply = handles[0].submit_move(id(ALICE), mv("d2d4", 1)).await.unwrap();
    assert!(reply.is_accepted());
    for handle in &handles {
        assert_eq!(handle.query().await.unwrap().ply, 1);
    }
    assert_eq!(runtime.registry().live_count().await, 1);

    let duplicate = runtime.open_game(setup).await;
    assert!(matches!(
        duplicate,
        Err(RuntimeError::ConcurrencyViolation {
            game_id: GameId(77)
        })
    ));

    runtime.shutdown().await.unwrap();
}

async fn futures_join(
    tasks: Vec<tokio::task::JoinHandle<runtime::Result<runtime::SessionHandle>>>,
) -> Vec<runtime::SessionHandle> {
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }
    handles
}

#[tokio::test]
async fn removed_game_is_restored_on_demand() {
    let clock = clock();
    let repository = Arc::new(InMemoryRepository::new());
    let runtime = start_runtime(&clock, repository.clone(), None).await;
    let handle = runtime
        .open_game(GameSetup::new(GameId(8), alice()).with_black(bob()))
        .await
        .unwrap();
    handle.submit_move(id(ALICE), mv("c2c4", 1)).await.unwrap();

    assert!(runtime.registry().remove(GameId(8)).await.unwrap());
    assert!(!handle.is_live());
    assert!(matches!(
        handle.query().await,
        Err(RuntimeError::CommandChannelClosed(GameId(8)))
    ));
    assert!(!runtime.registry().remove(GameId(8)).await.unwrap());

    let restored = runtime.session(GameId(8)).await.unwrap();
    assert_eq!(restored.snapshot().ply, 1);
    assert!(matches!(
        runtime.session(GameId(9)).await,
        Err(RuntimeError::UnknownGame(GameId(9)))
    ));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn pending_game_starts_on_activation() {
    let clock = clock();
    let runtime = start_runtime(&clock, Arc::new(InMemoryRepository::new()), None).await;
    let handle = runtime
        .open_game(
            GameSetup::new(GameId(15), alice())
                .with_config(GameConfig::with_time_control(30_000, 2_000)),
        )
        .await
        .unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Pending);

    let early = handle.submit_move(id(ALICE), mv("e2e4", 1)).await.unwrap();
    assert!(matches!(early.rejection, Some(Rejection::NotStarted { .. })));

    let activated = handle.activate(bob()).await.unwrap();
    assert!(activated.is_accepted());
    assert_eq!(activated.snapshot.status, SessionStatus::Active);
    assert_eq!(activated.snapshot.clock.white_ms, 30_000);

    clock.advance(1_000);
    let reply = handle.submit_move(id(ALICE), mv("e2e4", 1)).await.unwrap();
    assert!(reply.is_accepted());
    assert_eq!(reply.snapshot.clock.white_ms, 31_000);

    let again = handle.activate(bob()).await.unwrap();
    assert_eq!(again.rejection, Some(Rejection::AlreadyActive));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn snapshots_follow_ply_interval() {
    let clock = clock();
    let repository = Arc::new(CountingRepository::new());
    let runtime = start_runtime(&clock, repository.clone(), None).await;
    let config = GameConfig {
        checkpoint_every_plies: 2,
        ..GameConfig::with_time_control(60_000, 0)
    };
    let handle = runtime
        .open_game(
            GameSetup::new(GameId(21), alice())
                .with_black(bob())
                .with_config(config),
        )
        .await
        .unwrap();

    let line = ["e2e4", "e7e5", "g1f3", "b8c6"];
    for (i, uci) in line.iter().enumerate() {
        let player = if i % 2 == 0 { ALICE } else { BOB };
        let reply = handle
            .submit_move(id(player), mv(uci, i as u32 + 1))
            .await
            .unwrap();
        assert!(reply.is_accepted());
    }

    eventually(|| {
        let repository = repository.clone();
        async move {
            repository
                .inner
                .load_game(GameId(21))
                .await
                .ok()
                .flatten()
                .is_some_and(|record| record.plies() == 4)
        }
    })
    .await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_terminal_write_failures_are_retried() {
    let clock = clock();
    let repository = Arc::new(CountingRepository::flaky(2));
    let runtime = start_runtime(&clock, repository.clone(), None).await;
    let mut outcomes = runtime.subscribe(Topic::Outcome);

    let handle = runtime
        .open_game(GameSetup::new(GameId(31), alice()).with_black(bob()))
        .await
        .unwrap();
    handle.resign(id(ALICE)).await.unwrap();

    wait_for(&mut outcomes, |e| {
        matches!(e, Event::Outcome(OutcomeEvent::Recorded { first_write: true, .. }))
    })
    .await;
    assert_eq!(repository.terminals(), 3);
    let stored = repository.inner.load_terminal(GameId(31)).await.unwrap();
    assert_eq!(stored.map(|r| r.outcome), Some(Outcome::BlackWins));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn exhausted_terminal_write_escalates_but_keeps_outcome() {
    let clock = clock();
    let repository = Arc::new(CountingRepository::broken());
    let runtime = start_runtime(&clock, repository.clone(), None).await;
    let mut outcomes = runtime.subscribe(Topic::Outcome);

    let handle = runtime
        .open_game(GameSetup::new(GameId(32), alice()).with_black(bob()))
        .await
        .unwrap();
    let reply = handle.resign(id(BOB)).await.unwrap();
    assert!(reply.is_accepted());

    let event = wait_for(&mut outcomes, |e| {
        matches!(e, Event::Outcome(OutcomeEvent::Escalated { .. }))
    })
    .await;
    assert!(matches!(
        event,
        Event::Outcome(OutcomeEvent::Escalated {
            game_id: GameId(32),
            ..
        })
    ));
    assert_eq!(repository.terminals(), 4);

    let snapshot = handle.query().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.result.map(|r| r.outcome), Some(Outcome::WhiteWins));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn fair_play_report_follows_terminal_record() {
    let clock = clock();
    let runtime = start_runtime(&clock, Arc::new(InMemoryRepository::new()), None).await;
    let mut outcomes = runtime.subscribe(Topic::Outcome);

    let handle = runtime
        .open_game(GameSetup::new(GameId(41), alice()).with_black(bob()))
        .await
        .unwrap();
    handle.submit_move(id(ALICE), mv("f2f3", 1)).await.unwrap();
    handle.submit_move(id(BOB), mv("e7e5", 2)).await.unwrap();
    handle.submit_move(id(ALICE), mv("g2g4", 3)).await.unwrap();
    let mate = handle.submit_move(id(BOB), mv("d8h4", 4)).await.unwrap();
    assert_eq!(
        mate.snapshot.result.map(|r| r.outcome),
        Some(Outcome::BlackWins)
    );

    let event = wait_for(&mut outcomes, |e| {
        matches!(e, Event::Outcome(OutcomeEvent::FairPlay { .. }))
    })
    .await;
    match event {
        Event::Outcome(OutcomeEvent::FairPlay { game_id, report }) => {
            assert_eq!(game_id, GameId(41));
            assert_eq!(report.overall.move_count, 4);
            assert_eq!(report.overall.risk, chess_core::Risk::Low);
            assert!(report.overall.signals.is_empty());
        }
        other => panic!("unexpected event {other:?}"),
    }

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn slow_restore_does_not_stall_other_games() {
    let clock = clock();
    let repository = Arc::new(StallingRepository::new(GameId(1)));
    let runtime = start_runtime(&clock, repository, None).await;
    runtime
        .open_game(GameSetup::new(GameId(2), alice()).with_black(bob()))
        .await
        .unwrap();

    let registry = runtime.registry().clone();
    let stalled = tokio::spawn(async move { registry.get(GameId(1)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reply = tokio::time::timeout(Duration::from_millis(250), async {
        runtime
            .session(GameId(2))
            .await?
            .submit_move(id(ALICE), mv("e2e4", 1))
            .await
    })
    .await
    .expect("other games stay responsive")
    .unwrap();
    assert!(reply.is_accepted());
    assert!(runtime.registry().get_live(GameId(1)).await.is_none());

    // Bounded by the retry policy, then the empty slot is dropped.
    let stalled = stalled.await.unwrap();
    assert!(matches!(
        stalled,
        Err(RuntimeError::PersistenceExhausted {
            game_id: GameId(1),
            operation: "load_game",
            ..
        })
    ));
    assert_eq!(runtime.registry().live_games().await, vec![GameId(2)]);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn reaped_game_is_restored_without_replaying_its_outcome() {
    let clock = clock();
    let repository = Arc::new(CountingRepository::new());
    let runtime = Runtime::builder()
        .config(RuntimeConfig {
            completed_linger: Duration::from_millis(100),
            ..config()
        })
        .repository(repository.clone())
        .time_source(Arc::new(clock.clone()))
        .build()
        .await
        .unwrap();
    let mut outcomes = runtime.subscribe(Topic::Outcome);

    let handle = runtime
        .open_game(GameSetup::new(GameId(9), alice()).with_black(bob()))
        .await
        .unwrap();
    handle.submit_move(id(ALICE), mv("e2e4", 1)).await.unwrap();
    handle.resign(id(BOB)).await.unwrap();
    wait_for(&mut outcomes, |e| {
        matches!(e, Event::Outcome(OutcomeEvent::Recorded { .. }))
    })
    .await;
    eventually(|| {
        let repository = repository.clone();
        async move {
            repository
                .inner
                .load_game(GameId(9))
                .await
                .ok()
                .flatten()
                .is_some_and(|record| record.status == SessionStatus::Completed)
        }
    })
    .await;
    eventually(|| {
        let registry = runtime.registry().clone();
        async move { registry.live_count().await == 0 }
    })
    .await;

    let snapshots = repository.snapshots();
    let terminals = repository.terminals();

    let restored = runtime.session(GameId(9)).await.unwrap();
    let late = restored.submit_move(id(BOB), mv("e7e5", 2)).await.unwrap();
    assert_eq!(late.rejection, Some(Rejection::GameCompleted));
    assert_eq!(
        late.snapshot.result.map(|r| r.outcome),
        Some(Outcome::WhiteWins)
    );

    // The restored worker lingers and is reaped again without writing.
    eventually(|| {
        let registry = runtime.registry().clone();
        async move { registry.live_count().await == 0 }
    })
    .await;
    assert!(outcomes.try_recv().is_err());
    assert_eq!(repository.terminals(), terminals);
    assert_eq!(repository.snapshots(), snapshots);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn connection_activity_survives_restart() {
    let clock = clock();
    let repository = Arc::new(InMemoryRepository::new());
    let game = GameConfig::with_time_control(600_000, 0).with_abandonment_window(10_000);

    {
        let runtime = start_runtime(&clock, repository.clone(), None).await;
        let handle = runtime
            .open_game(
                GameSetup::new(GameId(6), alice())
                    .with_black(bob())
                    .with_config(game),
            )
            .await
            .unwrap();
        clock.advance(8_000);
        let reply = handle
            .connect(id(ALICE), ConnectionId::new("conn-alice"))
            .await
            .unwrap();
        assert!(reply.is_accepted());
        runtime.shutdown().await.unwrap();
    }

    clock.advance(4_000);
    let runtime = start_runtime(&clock, repository, None).await;
    let handle = runtime.session(GameId(6)).await.unwrap();
    let claim = handle.claim_abandonment(id(BOB)).await.unwrap();
    assert_eq!(
        claim.rejection,
        Some(Rejection::AbandonmentTooEarly { remaining_ms: 6_000 })
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_completes_while_registry_clones_are_held() {
    let clock = clock();
    let runtime = start_runtime(&clock, Arc::new(InMemoryRepository::new()), None).await;
    let registry = runtime.registry().clone();
    let handle = runtime
        .open_game(GameSetup::new(GameId(3), alice()).with_black(bob()))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), runtime.shutdown())
        .await
        .expect("shutdown finished")
        .unwrap();
    assert!(!handle.is_live());
    assert!(matches!(
        registry.get(GameId(3)).await,
        Err(RuntimeError::ShuttingDown)
    ));
    assert!(matches!(
        registry.open(GameSetup::new(GameId(4), alice())).await,
        Err(RuntimeError::ShuttingDown)
    ));
}
