mod display;

use std::collections::HashMap;
use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    cursor,
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    terminal, ExecutableCommand,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use invaders_rl::compute::InputIntent;
use invaders_rl::config::Config;
use invaders_rl::orchestrator::{Mode, Orchestrator};
use invaders_rl::persistence::{default_model_name, FileStore};

use display::Hud;

const FRAME: Duration = Duration::from_millis(16); // ≈60 FPS

/// A key is considered "held" if its last press/repeat event arrived within
/// this many frames.  Covers terminals that don't emit key-release events.
const HOLD_WINDOW: u64 = 8;

/// Frames a status message stays on screen.
const MESSAGE_FRAMES: u64 = 120;

#[derive(Debug, Parser)]
#[command(name = "invaders_rl", about = "Space invaders with a Q-learning agent")]
struct Cli {
    /// JSON config file; missing keys fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding saved models.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play in the terminal, switching to training with `T` (default).
    Play {
        #[arg(long, default_value = "invaders.log")]
        log_file: PathBuf,
    },
    /// Train headless and save the result.
    Train {
        #[arg(long, default_value_t = 50_000)]
        steps: u64,
        /// Model name to save under; defaults to a timestamped name.
        #[arg(long)]
        name: Option<String>,
        /// Start from the newest saved model.
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        max_episode_steps: Option<u64>,
    },
    /// Play greedy episodes with a saved model and report the scores.
    Eval {
        #[arg(long, default_value_t = 5)]
        episodes: u32,
        /// Model to load; defaults to the newest.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 10_000)]
        max_steps: u64,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::default(),
    };
    if cli.seed.is_some() {
        config.run.seed = cli.seed;
    }
    if let Some(dir) = &cli.model_dir {
        config.run.model_dir = dir.clone();
    }
    Ok(config)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        None => play(config, PathBuf::from("invaders.log")).await,
        Some(Command::Play { log_file }) => play(config, log_file).await,
        Some(Command::Train {
            steps,
            name,
            resume,
            max_episode_steps,
        }) => {
            if max_episode_steps.is_some() {
                config.run.max_steps_per_episode = max_episode_steps;
            }
            train(config, steps, name, resume).await
        }
        Some(Command::Eval {
            episodes,
            name,
            max_steps,
        }) => eval(config, episodes, name, max_steps).await,
    }
}

// ── Headless ──────────────────────────────────────────────────────────────────

async fn train(config: Config, steps: u64, name: Option<String>, resume: bool) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let store = FileStore::new(&config.run.model_dir);
    let mut orchestrator = Orchestrator::new(config).context("failed to build the agent")?;
    if resume {
        let loaded = orchestrator
            .load_model(&store, None)
            .await
            .context("failed to resume from the newest model")?;
        info!(model = %loaded, "resuming");
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            let _ = stop_tx.send(true);
        }
    });

    let stats = orchestrator.run_training(Some(steps), stop_rx).await?;

    let name = name.unwrap_or_else(default_model_name);
    orchestrator
        .save_model(&store, &name)
        .await
        .with_context(|| format!("failed to save model {name}"))?;

    let epsilon = orchestrator.agent().map(|a| a.epsilon()).unwrap_or_default();
    println!(
        "trained {} steps over {} episodes: best score {}, last score {}, epsilon {:.3}",
        stats.total_steps, stats.episodes, stats.best_score, stats.last_score, epsilon
    );
    println!("saved model {name} to {}", store.dir().display());
    Ok(())
}

async fn eval(config: Config, episodes: u32, name: Option<String>, max_steps: u64) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let store = FileStore::new(&config.run.model_dir);
    let mut orchestrator = Orchestrator::new(config).context("failed to build the agent")?;
    let loaded = orchestrator
        .load_model(&store, name.as_deref())
        .await
        .context("failed to load model")?;

    let results = orchestrator.evaluate(episodes, max_steps).await?;
    println!("model {loaded}");
    for (i, episode) in results.iter().enumerate() {
        println!(
            "episode {:>3}: score {:>6}  steps {:>6}  reward {:>9.1}",
            i + 1,
            episode.score,
            episode.steps,
            episode.total_reward
        );
    }
    if !results.is_empty() {
        let mean = results.iter().map(|e| e.score as f64).sum::<f64>() / results.len() as f64;
        println!("mean score {mean:.1}");
    }
    Ok(())
}

// ── Terminal frontend ─────────────────────────────────────────────────────────

/// Returns true if `key` was seen within the last `HOLD_WINDOW` frames.
fn is_held(key_frame: &HashMap<KeyCode, u64>, keys: &[KeyCode], frame: u64) -> bool {
    keys.iter().any(|key| {
        key_frame
            .get(key)
            .is_some_and(|&last| frame.saturating_sub(last) <= HOLD_WINDOW)
    })
}

/// Held keys to one intent.  Left wins when both directions are held.
fn held_intent(key_frame: &HashMap<KeyCode, u64>, frame: u64) -> InputIntent {
    let left = is_held(
        key_frame,
        &[KeyCode::Left, KeyCode::Char('a'), KeyCode::Char('A')],
        frame,
    );
    let right = is_held(
        key_frame,
        &[KeyCode::Right, KeyCode::Char('d'), KeyCode::Char('D')],
        frame,
    );
    InputIntent {
        move_left: left,
        move_right: right && !left,
        fire: is_held(key_frame, &[KeyCode::Char(' ')], frame),
    }
}

/// Drains the input channel, keeping key events in arrival order.  Resize,
/// focus and mouse events carry nothing for the game.
fn pending_keys(rx: &mpsc::Receiver<Event>) -> Vec<KeyEvent> {
    rx.try_iter()
        .filter_map(|event| match event {
            Event::Key(key) => Some(key),
            _ => None,
        })
        .collect()
}

async fn play(config: Config, log_file: PathBuf) -> Result<()> {
    // The alternate screen owns stdout, so logs go to a file.
    let file = File::create(&log_file)
        .with_context(|| format!("failed to create log file {}", log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    let store = FileStore::new(&config.run.model_dir);
    let mut orchestrator = Orchestrator::new(config).context("failed to build the agent")?;

    let mut out = BufWriter::new(stdout());
    terminal::enable_raw_mode()?;
    out.execute(terminal::EnterAlternateScreen)?;
    out.execute(cursor::Hide)?;

    let keyboard_enhanced = out
        .execute(PushKeyboardEnhancementFlags(
            KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
        ))
        .is_ok();

    // Blocking event reads live on their own thread.
    let (tx, rx) = mpsc::channel::<Event>();
    thread::spawn(move || {
        while let Ok(ev) = event::read() {
            if tx.send(ev).is_err() {
                break;
            }
        }
    });

    let result = game_loop(&mut out, &mut orchestrator, &store, &rx).await;

    // Always restore the terminal
    if keyboard_enhanced {
        let _ = out.execute(PopKeyboardEnhancementFlags);
    }
    let _ = out.execute(cursor::Show);
    let _ = out.execute(terminal::LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();

    result
}

/// Renders once per frame.  Interactive mode advances the game one step per
/// frame from held keys; training mode runs as many learner ticks as fit in
/// the frame.
async fn game_loop<W: Write>(
    out: &mut W,
    orchestrator: &mut Orchestrator,
    store: &FileStore,
    rx: &mpsc::Receiver<Event>,
) -> Result<()> {
    let mut key_frame: HashMap<KeyCode, u64> = HashMap::new();
    let mut message: Option<(String, u64)> = None;
    let mut frame: u64 = 0;

    loop {
        let deadline = Instant::now() + FRAME;
        frame += 1;

        for KeyEvent {
            code,
            kind,
            modifiers,
            ..
        } in pending_keys(rx)
        {
            match kind {
                KeyEventKind::Press => {
                    key_frame.insert(code, frame);
                    let status = match code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        KeyCode::Char('t') | KeyCode::Char('T') => {
                            let mode = orchestrator.toggle_mode();
                            Some(format!("mode: {mode:?}"))
                        }
                        KeyCode::Char('s') | KeyCode::Char('S') => {
                            let name = default_model_name();
                            Some(match orchestrator.save_model(store, &name).await {
                                Ok(()) => format!("saved {name}"),
                                Err(e) => format!("save failed: {e}"),
                            })
                        }
                        KeyCode::Char('l') | KeyCode::Char('L') => {
                            Some(match orchestrator.load_model(store, None).await {
                                Ok(name) => format!("loaded {name}"),
                                Err(e) => format!("load failed: {e}"),
                            })
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') | KeyCode::Char(' ')
                            if orchestrator.mode() == Mode::Interactive
                                && !orchestrator.env().state().is_playing() =>
                        {
                            orchestrator.start_episode();
                            None
                        }
                        _ => None,
                    };
                    if let Some(text) = status {
                        info!("{text}");
                        message = Some((text, frame));
                    }
                }
                KeyEventKind::Repeat => {
                    key_frame.insert(code, frame);
                }
                KeyEventKind::Release => {
                    key_frame.remove(&code);
                }
            }
        }

        match orchestrator.mode() {
            Mode::Interactive => {
                orchestrator.interactive_tick(held_intent(&key_frame, frame));
            }
            Mode::Training => loop {
                orchestrator.training_tick().await?;
                if Instant::now() >= deadline {
                    break;
                }
            },
        }

        if message
            .as_ref()
            .is_some_and(|(_, since)| frame - since > MESSAGE_FRAMES)
        {
            message = None;
        }

        let snapshot = orchestrator.snapshot();
        let hud = Hud {
            mode: orchestrator.mode(),
            stats: orchestrator.stats(),
            epsilon: orchestrator.agent().map(|a| a.epsilon()),
            message: message.as_ref().map(|(text, _)| text.as_str()),
            idle: !orchestrator.env().is_started(),
        };
        display::render(out, &snapshot, &hud)?;

        tokio::time::sleep_until(deadline).await;
    }
}
