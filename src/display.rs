//! Rendering layer.  All terminal I/O lives here.
//!
//! Each function receives a mutable writer and a read-only snapshot of the
//! simulation.  No game logic is performed; this module only translates the
//! 800×600 world into terminal cells.

use std::io::Write;

use crossterm::{
    cursor,
    style::{self, Color, Print},
    terminal,
    QueueableCommand,
};
use invaders_rl::constants::{WORLD_HEIGHT, WORLD_WIDTH};
use invaders_rl::entities::{RenderSnapshot, SpriteKind, SpriteView, Tint};
use invaders_rl::orchestrator::{EpisodeStats, Mode};

// ── Colour palette ────────────────────────────────────────────────────────────

const C_BORDER: Color = Color::DarkBlue;
const C_HUD_SCORE: Color = Color::Yellow;
const C_HUD_TRAINING: Color = Color::Magenta;
const C_HUD_PLAYING: Color = Color::Green;
const C_BOSS_BAR_FULL: Color = Color::Green;
const C_BOSS_BAR_LOW: Color = Color::Red;
const C_HINT: Color = Color::DarkGrey;

/// Everything the HUD shows besides the snapshot itself.
pub struct Hud<'a> {
    pub mode: Mode,
    pub stats: &'a EpisodeStats,
    pub epsilon: Option<f64>,
    /// Transient status line, e.g. "model saved".
    pub message: Option<&'a str>,
    /// True before the first episode has been started.
    pub idle: bool,
}

/// Maps world coordinates to cells inside the border.
#[derive(Clone, Copy)]
struct Viewport {
    width: u16,
    height: u16,
}

impl Viewport {
    fn cols(&self) -> f32 {
        self.width.saturating_sub(2).max(1) as f32
    }

    // Rows 2 ..= height-3 are the play field.
    fn rows(&self) -> f32 {
        self.height.saturating_sub(4).max(1) as f32
    }

    fn col(&self, x: f32) -> u16 {
        let c = (x / WORLD_WIDTH * self.cols()) as i32;
        (c.clamp(0, self.cols() as i32 - 1) + 1) as u16
    }

    fn row(&self, y: f32) -> u16 {
        let r = (y / WORLD_HEIGHT * self.rows()) as i32;
        (r.clamp(0, self.rows() as i32 - 1) + 2) as u16
    }

    fn span(&self, width: f32) -> usize {
        ((width / WORLD_WIDTH * self.cols()).round() as usize).max(1)
    }
}

fn color(tint: Tint) -> Color {
    Color::Rgb {
        r: tint.r,
        g: tint.g,
        b: tint.b,
    }
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Render one complete frame.
pub fn render<W: Write>(out: &mut W, snapshot: &RenderSnapshot, hud: &Hud) -> std::io::Result<()> {
    let (width, height) = terminal::size()?;
    let view = Viewport { width, height };

    out.queue(terminal::Clear(terminal::ClearType::All))?;

    draw_border(out, view)?;
    draw_hud(out, view, snapshot, hud)?;

    for sprite in &snapshot.sprites {
        draw_sprite(out, view, sprite)?;
    }

    draw_controls_hint(out, view)?;

    if hud.idle {
        draw_banner(out, view, &["SPACE INVADERS", "SPACE - Start   T - Train"])?;
    } else if snapshot.game_over && hud.mode == Mode::Interactive {
        let score_line = format!("Final Score: {:>6}", snapshot.score);
        draw_banner(out, view, &["GAME  OVER", &score_line, "R - Play Again  Q - Quit"])?;
    }

    // Park cursor in a harmless spot and flush
    out.queue(style::ResetColor)?;
    out.queue(cursor::MoveTo(0, height.saturating_sub(1)))?;
    out.flush()?;
    Ok(())
}

// ── Border ────────────────────────────────────────────────────────────────────

fn draw_border<W: Write>(out: &mut W, view: Viewport) -> std::io::Result<()> {
    let w = view.width as usize;
    let h = view.height;

    out.queue(style::SetForegroundColor(C_BORDER))?;

    out.queue(cursor::MoveTo(0, 1))?;
    out.queue(Print(format!("┌{}┐", "─".repeat(w.saturating_sub(2)))))?;

    out.queue(cursor::MoveTo(0, h.saturating_sub(2)))?;
    out.queue(Print(format!("└{}┘", "─".repeat(w.saturating_sub(2)))))?;

    for row in 2..h.saturating_sub(2) {
        out.queue(cursor::MoveTo(0, row))?;
        out.queue(Print("│"))?;
        out.queue(cursor::MoveTo(view.width.saturating_sub(1), row))?;
        out.queue(Print("│"))?;
    }

    Ok(())
}

// ── HUD (row 0) ───────────────────────────────────────────────────────────────

fn draw_hud<W: Write>(
    out: &mut W,
    view: Viewport,
    snapshot: &RenderSnapshot,
    hud: &Hud,
) -> std::io::Result<()> {
    out.queue(cursor::MoveTo(1, 0))?;
    out.queue(style::SetForegroundColor(C_HUD_SCORE))?;
    out.queue(Print(format!(
        "Score:{:>6}  Best:{:>6}",
        snapshot.score, hud.stats.best_score
    )))?;

    let (mode_str, mode_color) = match hud.mode {
        Mode::Interactive => ("[ PLAYING ]", C_HUD_PLAYING),
        Mode::Training => ("[ TRAINING ]", C_HUD_TRAINING),
    };
    let mx = (view.width / 2).saturating_sub(mode_str.len() as u16 / 2);
    out.queue(cursor::MoveTo(mx, 0))?;
    out.queue(style::SetForegroundColor(mode_color))?;
    out.queue(Print(mode_str))?;

    // Learner stats or boss health on the right
    let right_str = match (hud.mode, snapshot.boss_health) {
        (Mode::Training, _) => format!(
            "Ep:{} ε:{:.3} R:{:+.1}",
            hud.stats.episodes,
            hud.epsilon.unwrap_or_default(),
            hud.stats.last_reward
        ),
        (Mode::Interactive, Some((health, max))) => {
            let filled = (health as usize * 10).div_ceil(max.max(1) as usize);
            format!("BOSS {}{}", "█".repeat(filled), "░".repeat(10 - filled.min(10)))
        }
        (Mode::Interactive, None) => String::new(),
    };
    let rx = view
        .width
        .saturating_sub(right_str.chars().count() as u16 + 1);
    out.queue(cursor::MoveTo(rx, 0))?;
    let right_color = match snapshot.boss_health {
        Some((health, max)) if hud.mode == Mode::Interactive && health * 2 <= max => C_BOSS_BAR_LOW,
        Some(_) if hud.mode == Mode::Interactive => C_BOSS_BAR_FULL,
        _ => C_HUD_TRAINING,
    };
    out.queue(style::SetForegroundColor(right_color))?;
    out.queue(Print(&right_str))?;

    if let Some(message) = hud.message {
        let cx = (view.width / 2).saturating_sub(message.chars().count() as u16 / 2);
        out.queue(cursor::MoveTo(cx, view.height.saturating_sub(2)))?;
        out.queue(style::SetForegroundColor(Color::White))?;
        out.queue(Print(message))?;
    }

    Ok(())
}

// ── Entities ──────────────────────────────────────────────────────────────────

fn glyph(sprite: &SpriteView) -> &'static str {
    match sprite.kind {
        SpriteKind::Player => "▲",
        SpriteKind::Invader if sprite.frame == 0 => "W",
        SpriteKind::Invader => "M",
        SpriteKind::Boss => "█",
        SpriteKind::PlayerBullet => "║",
        SpriteKind::EnemyBullet => "↓",
    }
}

fn draw_sprite<W: Write>(out: &mut W, view: Viewport, sprite: &SpriteView) -> std::io::Result<()> {
    let span = match sprite.kind {
        SpriteKind::PlayerBullet | SpriteKind::EnemyBullet => 1,
        _ => view.span(sprite.rect.width),
    };
    let col = view.col(sprite.rect.x);
    let span = span.min((view.width.saturating_sub(1).saturating_sub(col)) as usize).max(1);

    out.queue(cursor::MoveTo(col, view.row(sprite.rect.y)))?;
    out.queue(style::SetForegroundColor(color(sprite.tint)))?;
    out.queue(Print(glyph(sprite).repeat(span)))?;
    Ok(())
}

// ── Controls hint (last row) ──────────────────────────────────────────────────

fn draw_controls_hint<W: Write>(out: &mut W, view: Viewport) -> std::io::Result<()> {
    out.queue(cursor::MoveTo(1, view.height.saturating_sub(1)))?;
    out.queue(style::SetForegroundColor(C_HINT))?;
    out.queue(Print(
        "← → / A D : Move   SPACE : Shoot   T : Train   S/L : Save/Load   Q : Quit",
    ))?;
    Ok(())
}

// ── Overlays ──────────────────────────────────────────────────────────────────

fn draw_banner<W: Write>(out: &mut W, view: Viewport, lines: &[&str]) -> std::io::Result<()> {
    let inner = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    let top = format!("╔{}╗", "═".repeat(inner));
    let bottom = format!("╚{}╝", "═".repeat(inner));

    let cx = view.width / 2;
    let start_row = (view.height / 2).saturating_sub((lines.len() as u16 + 2) / 2);

    out.queue(style::SetForegroundColor(Color::Red))?;
    let col = cx.saturating_sub(top.chars().count() as u16 / 2);
    out.queue(cursor::MoveTo(col, start_row))?;
    out.queue(Print(&top))?;

    for (i, line) in lines.iter().enumerate() {
        let padded = format!("║{:^width$}║", line, width = inner);
        out.queue(cursor::MoveTo(col, start_row + 1 + i as u16))?;
        out.queue(style::SetForegroundColor(if i == 0 { Color::Red } else { Color::White }))?;
        out.queue(Print(&padded))?;
    }

    out.queue(style::SetForegroundColor(Color::Red))?;
    out.queue(cursor::MoveTo(col, start_row + 1 + lines.len() as u16))?;
    out.queue(Print(&bottom))?;
    Ok(())
}
