//! Markov-decision-process view of the simulation.
//!
//! The environment owns the `SimulationState` and the RNG that drives it.
//! A policy only ever sees the 7-element [`Observation`] and a scalar reward.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compute::{self, InputIntent, StepEvents};
use crate::constants::{
    SCORE_REWARD, SURVIVAL_REWARD, TERMINAL_PENALTY, WORLD_HEIGHT, WORLD_WIDTH,
};
use crate::entities::{GameStatus, SimulationState};
use crate::error::{Error, Result};

pub const OBSERVATION_LEN: usize = 7;

/// `[player_x, invader_x, invader_y, bullet_x, bullet_y, boss_x, boss_present]`,
/// every coordinate normalised by the world size.
pub type Observation = [f32; OBSERVATION_LEN];

// ── Actions ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Stay,
    Left,
    Right,
    Shoot,
}

impl Action {
    pub const COUNT: usize = 4;
    pub const ALL: [Action; Action::COUNT] = [Action::Stay, Action::Left, Action::Right, Action::Shoot];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Exactly one input held per action.
    pub fn intent(self) -> InputIntent {
        InputIntent {
            move_left: self == Action::Left,
            move_right: self == Action::Right,
            fire: self == Action::Shoot,
        }
    }
}

// ── Step result ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    pub terminal: bool,
    pub events: StepEvents,
}

// ── Features & reward ────────────────────────────────────────────────────────

/// Closest point to `from` by Manhattan distance; the first one wins ties.
fn nearest(points: impl Iterator<Item = (f32, f32)>, from: (f32, f32)) -> Option<(f32, f32)> {
    let mut best = None;
    let mut best_dist = f32::INFINITY;
    for (x, y) in points {
        let dist = (x - from.0).abs() + (y - from.1).abs();
        if dist < best_dist {
            best_dist = dist;
            best = Some((x, y));
        }
    }
    best
}

/// Derive the feature vector from the current state alone.
pub fn observe(state: &SimulationState) -> Observation {
    let player = &state.player;
    let origin = (player.x, player.y);

    let invader = nearest(state.invaders.iter().map(|i| (i.x, i.y)), origin);
    let bullet = nearest(
        state
            .bullets
            .iter()
            .filter(|b| b.is_enemy())
            .map(|b| (b.x, b.y)),
        origin,
    );

    // Absent targets read as "mid-screen, at the top".
    let (ix, iy) = invader.map_or((0.5, 0.0), |(x, y)| (x / WORLD_WIDTH, y / WORLD_HEIGHT));
    let (bx, by) = bullet.map_or((0.5, 0.0), |(x, y)| (x / WORLD_WIDTH, y / WORLD_HEIGHT));
    let (boss_x, boss_present) = state
        .boss
        .as_ref()
        .map_or((0.5, 0.0), |boss| (boss.x / WORLD_WIDTH, 1.0));

    [player.x / WORLD_WIDTH, ix, iy, bx, by, boss_x, boss_present]
}

/// Survival bonus, plus one scoring bonus if the score went up at all, plus
/// the terminal penalty.
pub fn reward(score_before: u32, score_after: u32, terminal: bool) -> f32 {
    let mut reward = SURVIVAL_REWARD;
    if score_after > score_before {
        reward += SCORE_REWARD;
    }
    if terminal {
        reward += TERMINAL_PENALTY;
    }
    reward
}

// ── Environment ──────────────────────────────────────────────────────────────

pub struct Environment<R: Rng = StdRng> {
    state: SimulationState,
    rng: R,
}

impl Environment<StdRng> {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(rng)
    }
}

impl<R: Rng> Environment<R> {
    pub fn with_rng(rng: R) -> Self {
        Self::from_state(compute::init_state(), rng)
    }

    /// Wrap an existing state, e.g. a hand-built scenario.
    pub fn from_state(state: SimulationState, rng: R) -> Self {
        Self { state, rng }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn is_started(&self) -> bool {
        self.state.status != GameStatus::Idle
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_game_over()
    }

    pub fn reset(&mut self) -> Observation {
        compute::reset(&mut self.state);
        debug!("episode reset");
        self.observe()
    }

    pub fn observe(&self) -> Observation {
        observe(&self.state)
    }

    /// Run one step under `action` and score it.
    pub fn step(&mut self, action: Action) -> Result<StepResult> {
        self.ensure_running()?;

        let score_before = self.state.score;
        let events = compute::advance(&mut self.state, action.intent(), &mut self.rng);
        let terminal = self.state.is_game_over();

        Ok(StepResult {
            observation: self.observe(),
            reward: reward(score_before, self.state.score, terminal),
            terminal,
            events,
        })
    }

    /// Run one step under raw held input, without scoring.  Used by the
    /// interactive loop; does nothing once the episode is over.
    pub fn advance(&mut self, intent: InputIntent) -> StepEvents {
        compute::advance(&mut self.state, intent, &mut self.rng)
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state.status {
            GameStatus::Idle => Err(Error::NotStarted),
            GameStatus::GameOver => Err(Error::EpisodeOver),
            GameStatus::Playing => Ok(()),
        }
    }
}
