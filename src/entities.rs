//! All game entity types: pure data plus read-only views over it.
//!
//! The engine in `compute` is the only code that mutates these records.
//! Renderers and the RL environment read them through [`Entity`] and
//! [`RenderSnapshot`].

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Strict overlap: each origin must lie before the other's far edge on
    /// both axes, so rectangles that only touch do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    /// No episode has been started yet.
    Idle,
    Playing,
    GameOver,
}

// ── Projectiles ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulletOwner {
    Player,
    Enemy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bullet {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Signed vertical speed: negative travels up (player), positive down (enemy).
    pub speed: f32,
    pub owner: BulletOwner,
    /// Set during a scan, compacted away once the scan finishes.
    pub pending_removal: bool,
}

impl Bullet {
    pub fn is_enemy(&self) -> bool {
        self.owner == BulletOwner::Enemy
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

// ── Player & enemies ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Frames left before the next shot is allowed.
    pub shoot_cooldown: u32,
    pub alive: bool,
}

impl Player {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Invader {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Horizontal velocity; the whole wave shares its sign.
    pub vx: f32,
    /// Sprite frame, 0 or 1.
    pub anim_frame: u8,
    pub anim_timer: u32,
    pub pending_removal: bool,
}

impl Invader {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Boss {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub health: u32,
    pub max_health: u32,
    pub vx: f32,
    /// Phase of the vertical sine motion, in radians.
    pub angle: f32,
}

impl Boss {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn is_defeated(&self) -> bool {
        self.health == 0
    }
}

// ── Master simulation state ──────────────────────────────────────────────────

/// The authoritative world.  Only the functions in `compute` mutate it.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub score: u32,
    pub status: GameStatus,
    pub player: Player,
    pub invaders: Vec<Invader>,
    pub boss: Option<Boss>,
    pub bullets: Vec<Bullet>,
    /// Steps advanced since the last reset.
    pub frame: u64,
    /// Boss encounters cleared this episode.
    pub wave: u32,
}

impl SimulationState {
    pub fn is_playing(&self) -> bool {
        self.status == GameStatus::Playing
    }

    pub fn is_game_over(&self) -> bool {
        self.status == GameStatus::GameOver
    }

    /// Every live entity, in draw order.
    pub fn entities(&self) -> impl Iterator<Item = Entity<'_>> {
        let player = self
            .player
            .alive
            .then_some(Entity::Player(&self.player));
        player
            .into_iter()
            .chain(self.boss.iter().map(Entity::Boss))
            .chain(self.invaders.iter().map(Entity::Invader))
            .chain(self.bullets.iter().map(Entity::Bullet))
    }

    /// Detached copy of everything a renderer needs for one frame.
    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            sprites: self.entities().map(|e| e.sprite()).collect(),
            score: self.score,
            game_over: self.is_game_over(),
            boss_health: self.boss.as_ref().map(|b| (b.health, b.max_health)),
        }
    }
}

// ── Closed entity view ───────────────────────────────────────────────────────

/// One borrowed entity of any kind.  Per-kind behaviour is a `match` here
/// rather than a trait object, since the set of kinds is fixed.
#[derive(Clone, Copy, Debug)]
pub enum Entity<'a> {
    Player(&'a Player),
    Invader(&'a Invader),
    Boss(&'a Boss),
    Bullet(&'a Bullet),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpriteKind {
    Player,
    Invader,
    Boss,
    PlayerBullet,
    EnemyBullet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Tint {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

pub const TINT_PLAYER: Tint = Tint::rgb(0x39, 0xff, 0x14);
pub const TINT_INVADER: Tint = Tint::rgb(0xff, 0x00, 0xff);
pub const TINT_BOSS: Tint = Tint::rgb(0xff, 0x00, 0x00);
pub const TINT_PLAYER_BULLET: Tint = Tint::rgb(0x00, 0xff, 0xff);
pub const TINT_ENEMY_BULLET: Tint = Tint::rgb(0xff, 0x00, 0x00);

impl Entity<'_> {
    pub fn kind(&self) -> SpriteKind {
        match self {
            Entity::Player(_) => SpriteKind::Player,
            Entity::Invader(_) => SpriteKind::Invader,
            Entity::Boss(_) => SpriteKind::Boss,
            Entity::Bullet(b) if b.is_enemy() => SpriteKind::EnemyBullet,
            Entity::Bullet(_) => SpriteKind::PlayerBullet,
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            Entity::Player(p) => p.rect(),
            Entity::Invader(i) => i.rect(),
            Entity::Boss(b) => b.rect(),
            Entity::Bullet(b) => b.rect(),
        }
    }

    pub fn tint(&self) -> Tint {
        match self.kind() {
            SpriteKind::Player => TINT_PLAYER,
            SpriteKind::Invader => TINT_INVADER,
            SpriteKind::Boss => TINT_BOSS,
            SpriteKind::PlayerBullet => TINT_PLAYER_BULLET,
            SpriteKind::EnemyBullet => TINT_ENEMY_BULLET,
        }
    }

    pub fn sprite(&self) -> SpriteView {
        let frame = match self {
            Entity::Invader(i) => i.anim_frame,
            _ => 0,
        };
        SpriteView {
            kind: self.kind(),
            rect: self.rect(),
            tint: self.tint(),
            frame,
        }
    }
}

// ── Renderer boundary ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteView {
    pub kind: SpriteKind,
    pub rect: Rect,
    pub tint: Tint,
    /// Animation frame for kinds that have one.
    pub frame: u8,
}

/// Owned, read-only picture of one simulation step.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSnapshot {
    pub sprites: Vec<SpriteView>,
    pub score: u32,
    pub game_over: bool,
    /// `(health, max_health)` while a boss is on screen.
    pub boss_health: Option<(u32, u32)>,
}
