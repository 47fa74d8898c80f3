//! World geometry and tuning numbers shared by the engine and the environment.

// ── World ────────────────────────────────────────────────────────────────────

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;

// ── Player ───────────────────────────────────────────────────────────────────

/// 7×6 sprite at 4 px per cell.
pub const PLAYER_WIDTH: f32 = 28.0;
pub const PLAYER_HEIGHT: f32 = 24.0;
/// Gap between the player's feet and the bottom edge.
pub const PLAYER_BOTTOM_MARGIN: f32 = 20.0;
pub const PLAYER_SPEED: f32 = 5.0;
/// Frames between two player shots while fire is held.
pub const PLAYER_SHOOT_INTERVAL: u32 = 20;

// ── Invaders ─────────────────────────────────────────────────────────────────

pub const INVADER_ROWS: usize = 5;
pub const INVADER_COLS: usize = 8;
/// 11×8 sprite at 3 px per cell.
pub const INVADER_WIDTH: f32 = 33.0;
pub const INVADER_HEIGHT: f32 = 24.0;
pub const INVADER_PADDING: f32 = 20.0;
pub const INVADER_OFFSET_TOP: f32 = 80.0;
pub const INVADER_SPEED: f32 = 2.0;
pub const INVADER_ANIM_INTERVAL: u32 = 30;
/// Per-step chance that one random invader fires.
pub const INVADER_FIRE_PROBABILITY: f64 = 0.02;

// ── Boss ─────────────────────────────────────────────────────────────────────

/// 17×7 sprite at 4 px per cell.
pub const BOSS_WIDTH: f32 = 68.0;
pub const BOSS_HEIGHT: f32 = 28.0;
/// Spawn x is centred on a 60 px footprint, so the saucer starts slightly right of centre.
pub const BOSS_SPAWN_X: f32 = WORLD_WIDTH / 2.0 - 30.0;
pub const BOSS_BASE_Y: f32 = 50.0;
pub const BOSS_AMPLITUDE: f32 = 30.0;
pub const BOSS_ANGLE_STEP: f32 = 0.05;
pub const BOSS_SPEED: f32 = 3.0;
pub const BOSS_MAX_HEALTH: u32 = 20;
pub const BOSS_FIRE_PROBABILITY: f64 = 0.03;
/// Horizontal offset of the two flanking shots in a boss volley.
pub const BOSS_SPREAD_OFFSET: f32 = 20.0;
/// The flanking shots start this far above the centre shot.
pub const BOSS_SPREAD_LIFT: f32 = 5.0;

// ── Bullets ──────────────────────────────────────────────────────────────────

pub const BULLET_WIDTH: f32 = 4.0;
pub const BULLET_HEIGHT: f32 = 10.0;
pub const PLAYER_BULLET_SPEED: f32 = -7.0;
pub const ENEMY_BULLET_SPEED: f32 = 5.0;

// ── Scoring ──────────────────────────────────────────────────────────────────

pub const INVADER_SCORE: u32 = 10;
pub const BOSS_SCORE: u32 = 500;

// ── Reward shaping ───────────────────────────────────────────────────────────

pub const SURVIVAL_REWARD: f32 = 0.1;
pub const SCORE_REWARD: f32 = 10.0;
pub const TERMINAL_PENALTY: f32 = -50.0;
