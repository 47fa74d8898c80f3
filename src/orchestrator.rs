//! Drives the environment in one of two modes.
//!
//! Interactive ticks advance the game from live input and never touch the
//! learner.  Training ticks run one full act → step → record → update cycle.
//! The gradient update runs on the blocking pool and is awaited before the
//! tick returns, so at most one update is ever in flight and the next tick
//! cannot start until it lands.
//!
//! The join handle of that update is kept on the orchestrator, not on the
//! tick's stack.  If a tick is dropped mid-update the update still runs to
//! completion, and the next call that needs the learner joins it first.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agent::{Agent, TrainReport};
use crate::compute::{InputIntent, StepEvents};
use crate::config::Config;
use crate::entities::RenderSnapshot;
use crate::env::{Action, Environment, Observation};
use crate::error::{Error, Result};
use crate::persistence::ModelStore;
use crate::replay::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Training,
}

/// Running counters shown on the HUD and in logs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpisodeStats {
    /// Finished episodes (terminal or truncated).
    pub episodes: u64,
    pub episode_steps: u64,
    pub episode_reward: f32,
    pub total_steps: u64,
    pub last_reward: f32,
    pub last_loss: Option<f32>,
    pub last_score: u32,
    pub best_score: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub action: Action,
    pub reward: f32,
    pub terminal: bool,
    pub update: Option<TrainReport>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Not in training mode; nothing happened.
    Idle,
    /// A new episode was started instead of stepping.
    Reset,
    Stepped(StepReport),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvalEpisode {
    pub score: u32,
    pub steps: u64,
    pub total_reward: f32,
}

type PendingUpdate = JoinHandle<(Agent, Result<Option<TrainReport>>)>;

pub struct Orchestrator {
    env: Environment,
    /// `None` only while a gradient update owns the agent.
    agent: Option<Agent>,
    /// The update that owns the agent, if any.
    pending: Option<PendingUpdate>,
    mode: Mode,
    stats: EpisodeStats,
    config: Config,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self> {
        let seed = config.run.seed;
        let env = Environment::new(seed);
        let agent = Agent::new(config.agent.clone(), seed.map(|s| s.wrapping_add(1)))?;
        Ok(Self::with_parts(env, agent, config))
    }

    pub fn with_parts(env: Environment, agent: Agent, config: Config) -> Self {
        Self {
            env,
            agent: Some(agent),
            pending: None,
            mode: Mode::Interactive,
            stats: EpisodeStats::default(),
            config,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch modes.  The current episode's counters start over; the next
    /// training tick resets the game if it is over or was never started.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        info!(from = ?self.mode, to = ?mode, "mode switch");
        self.mode = mode;
        self.stats.episode_steps = 0;
        self.stats.episode_reward = 0.0;
    }

    pub fn toggle_mode(&mut self) -> Mode {
        let next = match self.mode {
            Mode::Interactive => Mode::Training,
            Mode::Training => Mode::Interactive,
        };
        self.set_mode(next);
        next
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// `None` while an update is still in flight; see [`Orchestrator::settle`].
    pub fn agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    pub fn update_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        self.env.state().snapshot()
    }

    pub fn start_episode(&mut self) -> Observation {
        self.stats.episode_steps = 0;
        self.stats.episode_reward = 0.0;
        self.env.reset()
    }

    fn finish_episode(&mut self, truncated: bool) {
        let score = self.env.state().score;
        self.stats.episodes += 1;
        self.stats.last_score = score;
        self.stats.best_score = self.stats.best_score.max(score);
        info!(
            episode = self.stats.episodes,
            score,
            steps = self.stats.episode_steps,
            reward = self.stats.episode_reward,
            epsilon = ?self.agent.as_ref().map(Agent::epsilon),
            truncated,
            "episode finished"
        );
    }

    fn episode_truncated(&self) -> bool {
        self.config
            .run
            .max_steps_per_episode
            .is_some_and(|cap| self.stats.episode_steps >= cap)
    }

    // ── Interactive mode ─────────────────────────────────────────────────────

    /// One render-paced step from live input.  Does nothing in training mode
    /// or outside an episode.
    pub fn interactive_tick(&mut self, intent: InputIntent) -> Option<StepEvents> {
        if self.mode != Mode::Interactive || !self.env.state().is_playing() {
            return None;
        }
        let events = self.env.advance(intent);
        self.stats.episode_steps += 1;
        self.stats.total_steps += 1;
        if events.terminal.is_some() {
            self.finish_episode(false);
        }
        Some(events)
    }

    // ── Training mode ────────────────────────────────────────────────────────

    /// One training cycle: reset if needed, otherwise act, step, record and
    /// run one replay update.
    pub async fn training_tick(&mut self) -> Result<TickOutcome> {
        if self.mode != Mode::Training {
            return Ok(TickOutcome::Idle);
        }
        self.settle().await?;

        if !self.env.is_started() || self.env.is_terminal() {
            self.start_episode();
            return Ok(TickOutcome::Reset);
        }
        if self.episode_truncated() {
            self.finish_episode(true);
            self.start_episode();
            return Ok(TickOutcome::Reset);
        }

        let agent = self.agent.as_mut().ok_or(Error::LearnerBusy)?;
        let observation = self.env.observe();
        let action = agent.select_action(&observation)?;
        let result = self.env.step(action)?;
        agent.remember(Transition {
            state: observation,
            action,
            reward: result.reward,
            next_state: result.observation,
            terminal: result.terminal,
        });

        // Book the step before handing the agent off.
        self.stats.episode_steps += 1;
        self.stats.total_steps += 1;
        self.stats.episode_reward += result.reward;
        self.stats.last_reward = result.reward;
        if result.terminal {
            self.finish_episode(false);
        }

        let update = self.run_update().await?;

        Ok(TickOutcome::Stepped(StepReport {
            action,
            reward: result.reward,
            terminal: result.terminal,
            update,
        }))
    }

    /// Hand the agent to the blocking pool for one update and wait for it.
    async fn run_update(&mut self) -> Result<Option<TrainReport>> {
        let batch_size = self.config.agent.batch_size;
        let mut agent = self.agent.take().ok_or(Error::LearnerBusy)?;
        self.pending = Some(tokio::task::spawn_blocking(move || {
            // The agent comes back even if the update panics.
            let report = panic::catch_unwind(AssertUnwindSafe(|| agent.train_step(batch_size)))
                .unwrap_or_else(|payload| Err(Error::UpdatePanicked(panic_message(&*payload))));
            (agent, report)
        }));
        self.settle().await
    }

    /// Join the in-flight update, if any, and take the agent back.  Safe to
    /// drop mid-wait: the handle stays stored until a join completes.
    pub async fn settle(&mut self) -> Result<Option<TrainReport>> {
        let Some(handle) = self.pending.as_mut() else {
            return Ok(None);
        };
        let joined = handle.await;
        self.pending = None;

        let (agent, report) = joined?;
        self.agent = Some(agent);
        let report = report?;
        if let Some(report) = report {
            self.stats.last_loss = Some(report.loss);
        }
        Ok(report)
    }

    /// Keep ticking in training mode until `max_ticks` ticks have run or
    /// `stop` flips to `true`.  A stop request is honoured between ticks, so
    /// an update already in flight always completes.
    pub async fn run_training(
        &mut self,
        max_ticks: Option<u64>,
        stop: watch::Receiver<bool>,
    ) -> Result<EpisodeStats> {
        self.set_mode(Mode::Training);
        let mut ticks = 0u64;
        while max_ticks.map_or(true, |max| ticks < max) {
            if *stop.borrow() {
                debug!(ticks, "training stopped on request");
                break;
            }
            self.training_tick().await?;
            ticks += 1;
        }
        Ok(self.stats.clone())
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    /// Play `episodes` greedy episodes without recording or training.
    pub async fn evaluate(&mut self, episodes: u32, max_steps: u64) -> Result<Vec<EvalEpisode>> {
        self.settle().await?;
        let agent = self.agent.as_ref().ok_or(Error::LearnerBusy)?;
        let mut results = Vec::with_capacity(episodes as usize);
        for _ in 0..episodes {
            let mut observation = self.env.reset();
            let mut steps = 0;
            let mut total_reward = 0.0;
            while steps < max_steps {
                let result = self.env.step(agent.greedy_action(&observation)?)?;
                observation = result.observation;
                total_reward += result.reward;
                steps += 1;
                if result.terminal {
                    break;
                }
            }
            let score = self.env.state().score;
            info!(score, steps, total_reward, "evaluation episode");
            results.push(EvalEpisode {
                score,
                steps,
                total_reward,
            });
        }
        Ok(results)
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    pub async fn save_model(&mut self, store: &impl ModelStore, name: &str) -> Result<()> {
        self.settle().await?;
        let agent = self.agent.as_ref().ok_or(Error::LearnerBusy)?;
        store.save(name, &agent.export_model()?)
    }

    /// Load `name` (or the newest model) into the agent.  Returns the loaded
    /// model's name.
    pub async fn load_model(
        &mut self,
        store: &impl ModelStore,
        name: Option<&str>,
    ) -> Result<String> {
        self.settle().await?;
        let stored = store.load(name)?;
        let agent = self.agent.as_mut().ok_or(Error::LearnerBusy)?;
        agent.import_model(&stored.blob)?;
        Ok(stored.name)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
