use invaders_rl::compute::InputIntent;
use invaders_rl::config::Config;
use invaders_rl::orchestrator::*;
use invaders_rl::persistence::FileStore;

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

fn config(seed: u64) -> Config {
    let mut config = Config::default();
    config.run.seed = Some(seed);
    config.agent.batch_size = 8;
    config
}

fn orchestrator(seed: u64) -> Orchestrator {
    Orchestrator::new(config(seed)).expect("orchestrator")
}

/// Train until a full batch is stored and an episode is mid-flight, so the
/// next tick steps and updates.
async fn primed(seed: u64) -> Orchestrator {
    let mut orch = orchestrator(seed);
    orch.set_mode(Mode::Training);
    loop {
        orch.training_tick().await.expect("tick");
        let stored = orch.agent().map_or(0, |a| a.store().len());
        if stored >= 8 && orch.env().state().is_playing() {
            return orch;
        }
    }
}

// ── Modes ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn starts_interactive_and_training_ticks_are_idle() {
    let mut orch = orchestrator(1);
    assert_eq!(orch.mode(), Mode::Interactive);
    assert_eq!(orch.training_tick().await.expect("tick"), TickOutcome::Idle);
    assert_eq!(orch.stats().total_steps, 0);
}

#[test]
fn toggle_flips_mode_and_clears_episode_counters() {
    let mut orch = orchestrator(2);
    orch.start_episode();
    orch.interactive_tick(InputIntent::default());
    assert_eq!(orch.stats().episode_steps, 1);

    assert_eq!(orch.toggle_mode(), Mode::Training);
    assert_eq!(orch.stats().episode_steps, 0);
    assert_eq!(orch.stats().total_steps, 1);
    assert_eq!(orch.toggle_mode(), Mode::Interactive);
}

#[test]
fn interactive_ticks_need_a_running_episode() {
    let mut orch = orchestrator(3);
    assert_eq!(orch.interactive_tick(InputIntent::default()), None);

    orch.start_episode();
    assert!(orch.interactive_tick(InputIntent::default()).is_some());
    assert_eq!(orch.env().state().frame, 1);

    orch.set_mode(Mode::Training);
    assert_eq!(orch.interactive_tick(InputIntent::default()), None);
    assert_eq!(orch.env().state().frame, 1);
}

// ── Training ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_training_tick_resets_then_steps() {
    let mut orch = orchestrator(4);
    orch.set_mode(Mode::Training);

    assert_eq!(orch.training_tick().await.expect("tick"), TickOutcome::Reset);
    assert!(orch.env().state().is_playing());

    match orch.training_tick().await.expect("tick") {
        TickOutcome::Stepped(report) => {
            // One transition is not a batch yet.
            assert_eq!(report.update, None);
        }
        other => panic!("expected a step, got {other:?}"),
    }
    assert_eq!(orch.stats().total_steps, 1);
    assert_eq!(orch.agent().map(|a| a.store().len()), Some(1));
}

#[tokio::test]
async fn updates_start_once_a_batch_is_stored() {
    let mut orch = orchestrator(5);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let stats = orch.run_training(Some(120), stop_rx).await.expect("training");

    assert!(stats.total_steps > 0);
    assert!(stats.last_loss.is_some());
    let agent = orch.agent().expect("agent returned after every update");
    assert!(agent.updates() > 0);
    assert!(agent.epsilon() < 1.0);
    assert_eq!(agent.store().len() as u64, stats.total_steps);
}

#[tokio::test]
async fn stop_flag_is_honoured_between_ticks() {
    let mut orch = orchestrator(6);
    let (stop_tx, stop_rx) = watch::channel(false);
    stop_tx.send(true).expect("receiver alive");

    let stats = orch.run_training(None, stop_rx).await.expect("training");
    assert_eq!(stats.total_steps, 0);
    assert_eq!(orch.mode(), Mode::Training);
    assert!(orch.agent().is_some());
}

#[tokio::test]
async fn long_episodes_are_truncated() {
    let mut config = config(7);
    config.run.max_steps_per_episode = Some(5);
    let mut orch = Orchestrator::new(config).expect("orchestrator");
    let (_stop_tx, stop_rx) = watch::channel(false);

    let stats = orch.run_training(Some(40), stop_rx).await.expect("training");
    assert!(stats.episodes >= 4);
    assert!(stats.episode_steps <= 5);
}

#[tokio::test]
async fn dropped_tick_still_returns_the_agent() {
    let mut orch = primed(11).await;
    let (updates, epsilon) = {
        let agent = orch.agent().expect("agent");
        (agent.updates(), agent.epsilon())
    };

    // A zero timeout abandons the tick at its first suspension point.
    let _ = timeout(Duration::ZERO, orch.training_tick()).await;
    orch.settle().await.expect("settle");

    assert!(!orch.update_in_flight());
    let agent = orch.agent().expect("agent back after the dropped tick");
    assert_eq!(agent.updates(), updates + 1);
    assert_eq!(agent.epsilon(), (epsilon * 0.995).max(0.01));
    assert!(orch.training_tick().await.is_ok());
}

#[tokio::test]
async fn next_tick_joins_an_abandoned_update() {
    let mut orch = primed(12).await;
    let updates = orch.agent().expect("agent").updates();

    let _ = timeout(Duration::ZERO, orch.training_tick()).await;
    match orch.training_tick().await.expect("tick") {
        TickOutcome::Stepped(_) | TickOutcome::Reset => {}
        TickOutcome::Idle => panic!("training tick went idle"),
    }
    assert!(orch.agent().expect("agent").updates() > updates);
}

#[tokio::test]
async fn leaving_training_keeps_learner_progress() {
    let mut orch = orchestrator(13);
    orch.set_mode(Mode::Training);
    let mut last = None;
    let mut completed = 0;
    while completed < 5 {
        if let TickOutcome::Stepped(StepReport {
            update: Some(report),
            ..
        }) = orch.training_tick().await.expect("tick")
        {
            last = Some(report);
            completed += 1;
        }
    }
    orch.set_mode(Mode::Interactive);

    let agent = orch.agent().expect("agent");
    assert_eq!(agent.updates(), completed);
    assert_eq!(Some(agent.epsilon()), last.map(|r| r.epsilon));
    assert_eq!(orch.training_tick().await.expect("tick"), TickOutcome::Idle);
    assert_eq!(orch.agent().expect("agent").updates(), completed);
}

#[tokio::test]
async fn save_after_a_dropped_tick_waits_for_the_update() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    let mut orch = primed(14).await;

    let _ = timeout(Duration::ZERO, orch.training_tick()).await;
    orch.save_model(&store, "mid-update").await.expect("save");
    assert!(orch.agent().is_some());
    assert_eq!(orch.load_model(&store, None).await.expect("load"), "mid-update");
}

// ── Evaluation & persistence ──────────────────────────────────────────────────

#[tokio::test]
async fn evaluation_plays_greedy_without_recording() {
    let mut orch = orchestrator(8);
    let results = orch.evaluate(2, 60).await.expect("evaluate");
    assert_eq!(results.len(), 2);
    for episode in &results {
        assert!(episode.steps > 0 && episode.steps <= 60);
    }
    let agent = orch.agent().expect("agent");
    assert!(agent.store().is_empty());
    assert_eq!(agent.updates(), 0);
}

#[tokio::test]
async fn saved_model_loads_into_another_orchestrator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());

    let mut trained = orchestrator(9);
    let (_stop_tx, stop_rx) = watch::channel(false);
    trained.run_training(Some(30), stop_rx).await.expect("training");
    trained.save_model(&store, "run-9").await.expect("save");

    let mut fresh = orchestrator(10);
    assert_eq!(fresh.load_model(&store, None).await.expect("load"), "run-9");

    let exported = |o: &Orchestrator| o.agent().expect("agent").export_model().expect("export");
    assert_eq!(exported(&fresh), exported(&trained));
}
