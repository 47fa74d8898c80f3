//! Simulation engine.
//!
//! `advance` is the single authoritative per-step update.  It takes the
//! state by exclusive reference and draws all randomness from the injected
//! RNG, so a seeded RNG replays a run exactly.

use rand::Rng;
use tracing::debug;

use crate::constants::*;
use crate::entities::{Boss, Bullet, BulletOwner, GameStatus, Invader, Player, SimulationState};

// ── Input boundary ───────────────────────────────────────────────────────────

/// Held-input state for one step.  Left and right together cancel out; the
/// caller decides precedence if it wants something else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputIntent {
    pub move_left: bool,
    pub move_right: bool,
    pub fire: bool,
}

// ── Step outcome ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalCause {
    /// An enemy bullet hit the player.
    PlayerShot,
    /// An invader touched the player.
    InvaderCollision,
    /// An invader reached the bottom edge.
    InvaderBreach,
    /// The boss touched the player.
    BossCollision,
}

/// What happened during one call to [`advance`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepEvents {
    pub invaders_destroyed: u32,
    pub boss_hits: u32,
    pub boss_spawned: bool,
    pub boss_defeated: bool,
    pub terminal: Option<TerminalCause>,
}

// ── Constructors ─────────────────────────────────────────────────────────────

pub fn spawn_player() -> Player {
    Player {
        x: WORLD_WIDTH / 2.0 - PLAYER_WIDTH / 2.0,
        y: WORLD_HEIGHT - PLAYER_HEIGHT - PLAYER_BOTTOM_MARGIN,
        width: PLAYER_WIDTH,
        height: PLAYER_HEIGHT,
        shoot_cooldown: 0,
        alive: true,
    }
}

/// Fresh 5×8 formation, row-major from the top-left invader.
pub fn invader_grid() -> Vec<Invader> {
    let pitch_x = INVADER_WIDTH + INVADER_PADDING;
    let pitch_y = INVADER_HEIGHT + INVADER_PADDING;
    let offset_left = (WORLD_WIDTH - INVADER_COLS as f32 * pitch_x) / 2.0;

    let mut invaders = Vec::with_capacity(INVADER_ROWS * INVADER_COLS);
    for row in 0..INVADER_ROWS {
        for col in 0..INVADER_COLS {
            invaders.push(Invader {
                x: offset_left + col as f32 * pitch_x,
                y: INVADER_OFFSET_TOP + row as f32 * pitch_y,
                width: INVADER_WIDTH,
                height: INVADER_HEIGHT,
                vx: INVADER_SPEED,
                anim_frame: 0,
                anim_timer: 0,
                pending_removal: false,
            });
        }
    }
    invaders
}

pub fn spawn_boss() -> Boss {
    Boss {
        x: BOSS_SPAWN_X,
        y: BOSS_BASE_Y,
        width: BOSS_WIDTH,
        height: BOSS_HEIGHT,
        health: BOSS_MAX_HEALTH,
        max_health: BOSS_MAX_HEALTH,
        vx: BOSS_SPEED,
        angle: 0.0,
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

fn enemy_bullet(x: f32, y: f32) -> Bullet {
    bullet(x, y, ENEMY_BULLET_SPEED, BulletOwner::Enemy)
}

/// State before the first episode: player parked at the start, no enemies.
pub fn init_state() -> SimulationState {
    SimulationState {
        score: 0,
        status: GameStatus::Idle,
        player: spawn_player(),
        invaders: Vec::new(),
        boss: None,
        bullets: Vec::new(),
        frame: 0,
        wave: 0,
    }
}

/// Start a fresh episode in place.
pub fn reset(state: &mut SimulationState) {
    *state = SimulationState {
        status: GameStatus::Playing,
        invaders: invader_grid(),
        ..init_state()
    };
}

// ── Per-step update ──────────────────────────────────────────────────────────

/// Advance the simulation by one step.  A no-op unless an episode is in
/// progress.
pub fn advance(
    state: &mut SimulationState,
    intent: InputIntent,
    rng: &mut impl Rng,
) -> StepEvents {
    let mut events = StepEvents::default();
    if !state.is_playing() {
        return events;
    }
    state.frame += 1;

    // ── 1. Player ────────────────────────────────────────────────────────────
    update_player(state, intent);

    // ── 2./3. Boss encounter ─────────────────────────────────────────────────
    match state.boss.as_ref().map(Boss::is_defeated) {
        Some(true) => defeat_boss(state, &mut events),
        Some(false) => {
            if let Some(boss) = state.boss.as_mut() {
                update_boss(boss, &mut state.bullets, rng);
            }
        }
        None if state.invaders.is_empty() => start_boss_encounter(state, &mut events),
        None => {}
    }

    // ── 4. Invader fire ──────────────────────────────────────────────────────
    if !state.invaders.is_empty() && rng.gen_bool(INVADER_FIRE_PROBABILITY) {
        let shooter = &state.invaders[rng.gen_range(0..state.invaders.len())];
        let shot = enemy_bullet(shooter.x + shooter.width / 2.0, shooter.y + shooter.height);
        state.bullets.push(shot);
    }

    // ── 5. Bullets ───────────────────────────────────────────────────────────
    for b in state.bullets.iter_mut() {
        b.y += b.speed;
        if b.y < 0.0 || b.y > WORLD_HEIGHT {
            b.pending_removal = true;
        }
    }
    state.bullets.retain(|b| !b.pending_removal);

    // ── 6. Invader formation ─────────────────────────────────────────────────
    update_invaders(&mut state.invaders);

    // ── 7. Collisions & terminal checks ──────────────────────────────────────
    let terminal = resolve_collisions(state, &mut events);
    events.terminal = terminal;
    match terminal {
        Some(cause) => {
            if cause != TerminalCause::InvaderBreach {
                state.player.alive = false;
            }
            state.status = GameStatus::GameOver;
        }
        None if state.invaders.is_empty() && state.boss.is_none() => {
            start_boss_encounter(state, &mut events);
        }
        None => {}
    }

    debug_assert!(
        state.is_game_over() || !state.invaders.is_empty() || state.boss.is_some(),
        "empty wave without a boss after step {}",
        state.frame
    );
    events
}

fn update_player(state: &mut SimulationState, intent: InputIntent) {
    let player = &mut state.player;
    if intent.move_left {
        player.x -= PLAYER_SPEED;
    }
    if intent.move_right {
        player.x += PLAYER_SPEED;
    }
    player.x = player.x.clamp(0.0, WORLD_WIDTH - player.width);

    if player.shoot_cooldown > 0 {
        player.shoot_cooldown -= 1;
    }
    if intent.fire && player.shoot_cooldown == 0 {
        let shot = bullet(
            player.x + player.width / 2.0 - BULLET_WIDTH / 2.0,
            player.y,
            PLAYER_BULLET_SPEED,
            BulletOwner::Player,
        );
        state.bullets.push(shot);
        player.shoot_cooldown = PLAYER_SHOOT_INTERVAL;
    }
}

fn update_boss(boss: &mut Boss, bullets: &mut Vec<Bullet>, rng: &mut impl Rng) {
    boss.x += boss.vx;
    boss.angle += BOSS_ANGLE_STEP;
    boss.y = BOSS_BASE_Y + boss.angle.sin() * BOSS_AMPLITUDE;

    if boss.x <= 0.0 || boss.x + boss.width >= WORLD_WIDTH {
        boss.vx = -boss.vx;
    }

    if rng.gen_bool(BOSS_FIRE_PROBABILITY) {
        let cx = boss.x + boss.width / 2.0;
        let base = boss.y + boss.height;
        bullets.push(enemy_bullet(cx, base));
        bullets.push(enemy_bullet(cx - BOSS_SPREAD_OFFSET, base - BOSS_SPREAD_LIFT));
        bullets.push(enemy_bullet(cx + BOSS_SPREAD_OFFSET, base - BOSS_SPREAD_LIFT));
    }
}

/// Move the wave; if any invader touched a side wall this step, the whole
/// wave turns around and drops one row.
fn update_invaders(invaders: &mut [Invader]) {
    let mut reverse = false;
    for inv in invaders.iter_mut() {
        inv.x += inv.vx;
        inv.anim_timer += 1;
        if inv.anim_timer >= INVADER_ANIM_INTERVAL {
            inv.anim_frame ^= 1;
            inv.anim_timer = 0;
        }
        if inv.x + inv.width >= WORLD_WIDTH || inv.x <= 0.0 {
            reverse = true;
        }
    }

    if reverse {
        for inv in invaders.iter_mut() {
            inv.vx = -inv.vx;
            inv.y += inv.height;
        }
    }
}

fn start_boss_encounter(state: &mut SimulationState, events: &mut StepEvents) {
    state.boss = Some(spawn_boss());
    events.boss_spawned = true;
    debug!(frame = state.frame, wave = state.wave, "boss spawned");
}

fn defeat_boss(state: &mut SimulationState, events: &mut StepEvents) {
    state.boss = None;
    state.score += BOSS_SCORE;
    state.invaders = invader_grid();
    state.wave += 1;
    events.boss_defeated = true;
    debug!(frame = state.frame, wave = state.wave, score = state.score, "boss defeated");
}

/// Runs the collision phases in order and stops at the first terminal cause.
fn resolve_collisions(
    state: &mut SimulationState,
    events: &mut StepEvents,
) -> Option<TerminalCause> {
    // Player bullets ↔ invaders.  A bullet destroys at most one invader.
    for b in state.bullets.iter_mut().filter(|b| !b.is_enemy()) {
        let rect = b.rect();
        let hit = state
            .invaders
            .iter_mut()
            .find(|inv| !inv.pending_removal && inv.rect().intersects(&rect));
        if let Some(inv) = hit {
            inv.pending_removal = true;
            b.pending_removal = true;
            state.score += INVADER_SCORE;
            events.invaders_destroyed += 1;
        }
    }
    state.invaders.retain(|inv| !inv.pending_removal);

    // Player bullets ↔ boss.  Points only arrive with the kill.
    if let Some(boss) = state.boss.as_mut() {
        for b in state
            .bullets
            .iter_mut()
            .filter(|b| !b.is_enemy() && !b.pending_removal)
        {
            if boss.health > 0 && b.rect().intersects(&boss.rect()) {
                b.pending_removal = true;
                boss.health -= 1;
                events.boss_hits += 1;
            }
        }
    }
    if state.boss.as_ref().is_some_and(Boss::is_defeated) {
        defeat_boss(state, events);
    }

    // Enemy bullets ↔ player.
    let player_rect = state.player.rect();
    let mut cause = None;
    if let Some(b) = state
        .bullets
        .iter_mut()
        .find(|b| b.is_enemy() && !b.pending_removal && b.rect().intersects(&player_rect))
    {
        b.pending_removal = true;
        cause = Some(TerminalCause::PlayerShot);
    }
    state.bullets.retain(|b| !b.pending_removal);
    if cause.is_some() {
        return cause;
    }

    // Invaders ↔ player, then invaders ↔ bottom edge.
    if state
        .invaders
        .iter()
        .any(|inv| inv.rect().intersects(&player_rect))
    {
        return Some(TerminalCause::InvaderCollision);
    }
    if state
        .invaders
        .iter()
        .any(|inv| inv.y + inv.height >= WORLD_HEIGHT)
    {
        return Some(TerminalCause::InvaderBreach);
    }

    // Boss ↔ player.
    if state
        .boss
        .as_ref()
        .is_some_and(|boss| boss.rect().intersects(&player_rect))
    {
        return Some(TerminalCause::BossCollision);
    }

    None
}
