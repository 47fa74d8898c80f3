use invaders_rl::compute::{init_state, reset, spawn_boss};
use invaders_rl::constants::*;
use invaders_rl::entities::*;
use invaders_rl::env::*;
use invaders_rl::Error;

use rand::rngs::mock::StepRng;

fn quiet_rng() -> StepRng {
    StepRng::new(u64::MAX, 0)
}

fn invader(x: f32, y: f32) -> Invader {
    Invader {
        x,
        y,
        width: INVADER_WIDTH,
        height: INVADER_HEIGHT,
        vx: INVADER_SPEED,
        anim_frame: 0,
        anim_timer: 0,
        pending_removal: false,
    }
}

fn bullet(x: f32, y: f32, speed: f32, owner: BulletOwner) -> Bullet {
    Bullet {
        x,
        y,
        width: BULLET_WIDTH,
        height: BULLET_HEIGHT,
        speed,
        owner,
        pending_removal: false,
    }
}

fn playing_state() -> SimulationState {
    let mut state = init_state();
    reset(&mut state);
    state
}

fn assert_close(a: f32, b: f32) {
    assert!((a - b).abs() < 1e-5, "{a} != {b}");
}

fn assert_obs(got: Observation, want: [f32; OBSERVATION_LEN]) {
    for (g, w) in got.iter().zip(want) {
        assert_close(*g, w);
    }
}

// ── Actions ───────────────────────────────────────────────────────────────────

#[test]
fn action_indices_round_trip() {
    for (i, action) in Action::ALL.iter().enumerate() {
        assert_eq!(action.index(), i);
        assert_eq!(Action::from_index(i), Some(*action));
    }
    assert_eq!(Action::from_index(Action::COUNT), None);
}

#[test]
fn each_action_holds_one_input() {
    assert_eq!(Action::Stay.intent(), Default::default());
    assert!(Action::Left.intent().move_left);
    assert!(!Action::Left.intent().move_right);
    assert!(Action::Right.intent().move_right);
    assert!(Action::Shoot.intent().fire);
    assert!(!Action::Shoot.intent().move_left);
}

// ── Observation ───────────────────────────────────────────────────────────────

#[test]
fn observation_with_one_invader_and_nothing_else() {
    let mut state = playing_state();
    state.player.x = 398.0;
    state.invaders = vec![invader(50.0, 90.0)];
    assert_obs(observe(&state), [0.4975, 0.0625, 0.15, 0.5, 0.0, 0.5, 0.0]);
}

#[test]
fn empty_world_reads_as_defaults() {
    let mut state = playing_state();
    state.invaders.clear();
    let obs = observe(&state);
    assert_close(obs[0], 386.0 / WORLD_WIDTH);
    assert_obs(obs, [obs[0], 0.5, 0.0, 0.5, 0.0, 0.5, 0.0]);
}

#[test]
fn nearest_invader_by_manhattan_distance() {
    let mut state = playing_state();
    // Player at (386, 556).  The second invader is closer.
    state.invaders = vec![invader(0.0, 100.0), invader(400.0, 300.0), invader(380.0, 200.0)];
    let obs = observe(&state);
    assert_close(obs[1], 400.0 / WORLD_WIDTH);
    assert_close(obs[2], 300.0 / WORLD_HEIGHT);
}

#[test]
fn nearest_tie_goes_to_the_first() {
    let mut state = playing_state();
    state.invaders = vec![invader(376.0, 300.0), invader(396.0, 300.0)];
    let obs = observe(&state);
    assert_close(obs[1], 376.0 / WORLD_WIDTH);
}

#[test]
fn only_enemy_bullets_are_observed() {
    let mut state = playing_state();
    state.bullets = vec![
        bullet(390.0, 540.0, PLAYER_BULLET_SPEED, BulletOwner::Player),
        bullet(100.0, 200.0, ENEMY_BULLET_SPEED, BulletOwner::Enemy),
        bullet(300.0, 400.0, ENEMY_BULLET_SPEED, BulletOwner::Enemy),
    ];
    let obs = observe(&state);
    assert_close(obs[3], 300.0 / WORLD_WIDTH);
    assert_close(obs[4], 400.0 / WORLD_HEIGHT);
}

#[test]
fn boss_presence_is_flagged() {
    let mut state = playing_state();
    state.boss = Some(spawn_boss());
    let obs = observe(&state);
    assert_close(obs[5], BOSS_SPAWN_X / WORLD_WIDTH);
    assert_eq!(obs[6], 1.0);
}

// ── Reward ────────────────────────────────────────────────────────────────────

#[test]
fn reward_components() {
    assert_close(reward(0, 0, false), 0.1);
    assert_close(reward(0, 10, false), 10.1);
    assert_close(reward(0, 0, true), -49.9);
    assert_close(reward(40, 50, true), -39.9);
}

#[test]
fn score_bonus_is_paid_once_per_step() {
    assert_close(reward(0, 510, false), reward(0, 10, false));
}

// ── Environment ───────────────────────────────────────────────────────────────

#[test]
fn step_before_reset_is_rejected() {
    let mut env = Environment::new(Some(3));
    assert!(!env.is_started());
    assert!(matches!(env.step(Action::Stay), Err(Error::NotStarted)));
}

#[test]
fn reset_returns_the_current_observation() {
    let mut env = Environment::new(Some(3));
    let obs = env.reset();
    assert!(env.is_started());
    assert!(!env.is_terminal());
    assert_eq!(obs, env.observe());
    assert_close(obs[0], 386.0 / WORLD_WIDTH);
    assert_eq!(env.state().invaders.len(), 40);
}

#[test]
fn survival_step_pays_the_survival_reward() {
    let mut env = Environment::from_state(playing_state(), quiet_rng());
    let result = env.step(Action::Left).expect("step");
    assert_close(result.reward, SURVIVAL_REWARD);
    assert!(!result.terminal);
    assert_close(result.observation[0], 381.0 / WORLD_WIDTH);
}

#[test]
fn kill_step_pays_the_score_bonus() {
    let mut state = playing_state();
    state.invaders = vec![invader(100.0, 100.0), invader(600.0, 100.0)];
    state.bullets.push(bullet(110.0, 115.0, PLAYER_BULLET_SPEED, BulletOwner::Player));
    let mut env = Environment::from_state(state, quiet_rng());

    let result = env.step(Action::Stay).expect("step");
    assert_eq!(result.events.invaders_destroyed, 1);
    assert_close(result.reward, 10.1);
    assert_eq!(env.state().score, INVADER_SCORE);
}

#[test]
fn terminal_step_then_episode_over() {
    let mut state = playing_state();
    state
        .bullets
        .push(bullet(398.0, 545.0, ENEMY_BULLET_SPEED, BulletOwner::Enemy));
    let mut env = Environment::from_state(state, quiet_rng());

    let result = env.step(Action::Stay).expect("step");
    assert!(result.terminal);
    assert!(env.is_terminal());
    assert_close(result.reward, -49.9);
    assert!(matches!(env.step(Action::Stay), Err(Error::EpisodeOver)));

    env.reset();
    assert!(env.step(Action::Stay).is_ok());
}

#[test]
fn seeded_environments_agree() {
    let mut a = Environment::new(Some(11));
    let mut b = Environment::new(Some(11));
    a.reset();
    b.reset();
    for i in 0..400 {
        let action = Action::ALL[i % Action::COUNT];
        if a.is_terminal() {
            break;
        }
        let ra = a.step(action).expect("step a");
        let rb = b.step(action).expect("step b");
        assert_eq!(ra, rb);
    }
}

#[test]
fn interactive_advance_does_nothing_after_game_over() {
    let mut state = playing_state();
    state.status = GameStatus::GameOver;
    let mut env = Environment::from_state(state, quiet_rng());
    let events = env.advance(Action::Right.intent());
    assert_eq!(events.terminal, None);
    assert_eq!(env.state().player.x, 386.0);
}
