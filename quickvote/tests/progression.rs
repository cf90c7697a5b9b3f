use std::sync::Arc;
use std::time::Duration;

use quickvote::builder::ElectionBuilder;
use quickvote::simulator::{ApiCall, SimulatedServer};
use quickvote::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn assembly() -> Election {
    ElectionBuilder::new("Annual assembly")
        .target_date("2026-11-03")
        .stage(Stage::new(
            "Chair",
            CandidateSource::inline(&["Alice", "Bob", "Charlie"]),
        ))
        .stage(Stage::new("Approve the budget?", CandidateSource::YesNo))
        .policy("Manual", "The administrator decides the winners")
        .build()
}

#[tokio::test]
async fn open_close_adjudicate() {
    init();
    let server = Arc::new(SimulatedServer::new(assembly()));
    server.set_tally(0, &[("Bob", 3), ("Alice", 9), ("Charlie", 1)]);
    let engine = Engine::load(server.clone()).await.unwrap();
    assert_eq!(engine.phase().unwrap(), Phase::Begin);
    server.clear_calls();

    let rounds = engine.rounds();
    assert_eq!(rounds.open().await.unwrap(), Phase::Stage);
    assert_eq!(
        server.calls()[0],
        ApiCall::Transition(TransitionKind::Open, RoundId(0), None)
    );
    assert_eq!(engine.election().stage_index, 0.0);

    assert_eq!(rounds.close_voting().await.unwrap(), Phase::StagePartial);
    let tally = engine.election().partial_tally.unwrap();
    let names: Vec<&str> = tally.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob", "Charlie"]);

    let adjudicator = engine.adjudicator();
    let mut adjudication = adjudicator.begin().unwrap();
    adjudication.decide_at(0, Decision::Win).unwrap();
    adjudication.decide_at(1, Decision::Lose).unwrap();
    adjudication.decide_at(2, Decision::Lose).unwrap();
    assert!(adjudication.validate(1).is_ok());
    assert_eq!(adjudicator.submit(&adjudication).await.unwrap(), Phase::Inbetween);

    let e = engine.election();
    assert_eq!(e.stage_index, 0.5);
    assert_eq!(e.stage_outcomes[0].winners, vec!["Alice".to_string()]);
}

#[tokio::test]
async fn runoff_then_full_agenda() {
    init();
    let server = Arc::new(SimulatedServer::new(assembly()));
    server.set_tally(0, &[("Alice", 5), ("Bob", 5), ("Charlie", 1)]);
    let engine = Engine::load(server.clone()).await.unwrap();
    let rounds = engine.rounds();
    let adjudicator = engine.adjudicator();

    rounds.open().await.unwrap();
    rounds.close_voting().await.unwrap();
    let mut adjudication = adjudicator.begin().unwrap();
    adjudication.decide("Charlie", Decision::Lose).unwrap();
    // Alice and Bob stay in the runoff.
    assert_eq!(adjudicator.submit(&adjudication).await.unwrap(), Phase::Stage);
    assert_eq!(engine.election().round_id, RoundId(102));

    // The previous adjudication belongs to an older round.
    server.set_tally(0, &[("Bob", 6), ("Alice", 5)]);
    rounds.close_voting().await.unwrap();
    assert_eq!(
        adjudicator
            .submit(&adjudication)
            .await
            .unwrap_err()
            .validation_reason(),
        Some(ValidationReason::StaleRound)
    );
    let mut adjudication = adjudicator.begin().unwrap();
    adjudication.decide("Bob", Decision::Win).unwrap();
    adjudication.decide("Alice", Decision::Lose).unwrap();
    assert_eq!(adjudicator.submit(&adjudication).await.unwrap(), Phase::Inbetween);

    assert_eq!(rounds.advance_round().await.unwrap(), Phase::Stage);
    assert_eq!(engine.election().round_id, RoundId(201));
    rounds.close_voting().await.unwrap();
    let mut adjudication = adjudicator.begin().unwrap();
    adjudication.decide("Yes", Decision::Win).unwrap();
    adjudication.decide("No", Decision::Lose).unwrap();
    adjudicator.submit(&adjudication).await.unwrap();

    assert_eq!(rounds.advance_round().await.unwrap(), Phase::Inbetween);
    let e = engine.election();
    assert!(e.completed);
    assert_eq!(e.stage_outcomes[0].winners, vec!["Bob".to_string()]);
    assert_eq!(e.stage_outcomes[1].winners, vec!["Yes".to_string()]);
    assert!(matches!(
        rounds.advance_round().await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn ballot_counts_follow_the_phase() {
    init();
    let server = Arc::new(SimulatedServer::new(assembly()));
    server.set_eligible_voters(40);
    let engine = Engine::load(server.clone()).await.unwrap();
    let polling = engine.start_polling(PollingConfig::default());
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(polling.state(), PollState::Idle);
    assert_eq!(engine.ballot_count(), None);

    server.record_ballots(RoundId(101), 12);
    engine.rounds().open().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(polling.state(), PollState::Polling);
    let count = engine.ballot_count().unwrap();
    assert_eq!(count.received, 12);
    assert_eq!(count.total_eligible, 40);
    assert_eq!(count.percentage(), 30.0);

    engine.rounds().close_voting().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(polling.state(), PollState::Idle);
    // Closing voting clears the cached count.
    assert_eq!(engine.ballot_count(), None);
    polling.shutdown().await;
}
