use invaders_rl::compute::{init_state, reset, spawn_boss};
use invaders_rl::constants::*;
use invaders_rl::entities::*;

fn bullet(x: f32, y: f32, owner: BulletOwner) -> Bullet {
    Bullet {
        x,
        y,
        width: BULLET_WIDTH,
        height: BULLET_HEIGHT,
        speed: 0.0,
        owner,
        pending_removal: false,
    }
}

// ── Rect ──────────────────────────────────────────────────────────────────────

#[test]
fn rect_overlap_is_strict() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert!(a.intersects(&Rect::new(5.0, 5.0, 10.0, 10.0)));
    // Sharing an edge is not a hit
    assert!(!a.intersects(&Rect::new(10.0, 0.0, 10.0, 10.0)));
    assert!(!a.intersects(&Rect::new(0.0, 10.0, 10.0, 10.0)));
    assert!(!a.intersects(&Rect::new(20.0, 20.0, 1.0, 1.0)));
}

#[test]
fn rect_containment_intersects_both_ways() {
    let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
    let inner = Rect::new(40.0, 40.0, 4.0, 10.0);
    assert!(outer.intersects(&inner));
    assert!(inner.intersects(&outer));
    assert_eq!(inner.right(), 44.0);
    assert_eq!(inner.bottom(), 50.0);
}

// ── Entity views ──────────────────────────────────────────────────────────────

#[test]
fn bullet_kind_follows_owner() {
    let mine = bullet(0.0, 0.0, BulletOwner::Player);
    let theirs = bullet(0.0, 0.0, BulletOwner::Enemy);
    assert!(!mine.is_enemy());
    assert!(theirs.is_enemy());
    assert_eq!(Entity::Bullet(&mine).kind(), SpriteKind::PlayerBullet);
    assert_eq!(Entity::Bullet(&theirs).kind(), SpriteKind::EnemyBullet);
    assert_eq!(Entity::Bullet(&mine).tint(), TINT_PLAYER_BULLET);
    assert_eq!(Entity::Bullet(&theirs).tint(), TINT_ENEMY_BULLET);
}

#[test]
fn boss_defeated_only_at_zero_health() {
    let mut boss = spawn_boss();
    assert!(!boss.is_defeated());
    boss.health = 1;
    assert!(!boss.is_defeated());
    boss.health = 0;
    assert!(boss.is_defeated());
}

#[test]
fn sprite_carries_invader_animation_frame() {
    let mut state = init_state();
    reset(&mut state);
    state.invaders[0].anim_frame = 1;
    let sprite = Entity::Invader(&state.invaders[0]).sprite();
    assert_eq!(sprite.kind, SpriteKind::Invader);
    assert_eq!(sprite.frame, 1);
    assert_eq!(sprite.rect, state.invaders[0].rect());
    assert_eq!(sprite.tint, TINT_INVADER);
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

#[test]
fn snapshot_lists_player_then_boss_invaders_bullets() {
    let mut state = init_state();
    reset(&mut state);
    state.boss = Some(spawn_boss());
    state.bullets.push(bullet(100.0, 100.0, BulletOwner::Enemy));
    state.score = 70;

    let snap = state.snapshot();
    assert_eq!(snap.sprites.len(), 1 + 1 + INVADER_ROWS * INVADER_COLS + 1);
    assert_eq!(snap.sprites[0].kind, SpriteKind::Player);
    assert_eq!(snap.sprites[1].kind, SpriteKind::Boss);
    assert_eq!(snap.sprites[2].kind, SpriteKind::Invader);
    assert_eq!(snap.sprites.last().map(|s| s.kind), Some(SpriteKind::EnemyBullet));
    assert_eq!(snap.score, 70);
    assert!(!snap.game_over);
    assert_eq!(snap.boss_health, Some((BOSS_MAX_HEALTH, BOSS_MAX_HEALTH)));
}

#[test]
fn snapshot_hides_dead_player() {
    let mut state = init_state();
    reset(&mut state);
    state.player.alive = false;
    state.status = GameStatus::GameOver;

    let snap = state.snapshot();
    assert!(snap.game_over);
    assert!(snap.sprites.iter().all(|s| s.kind != SpriteKind::Player));
    assert_eq!(snap.boss_health, None);
}

#[test]
fn snapshot_is_detached_from_state() {
    let mut state = init_state();
    reset(&mut state);
    let snap = state.snapshot();

    state.player.x += 50.0;
    state.score = 999;

    assert_eq!(snap.sprites[0].rect.x, WORLD_WIDTH / 2.0 - PLAYER_WIDTH / 2.0);
    assert_eq!(snap.score, 0);
}

#[test]
fn state_clone_is_independent() {
    let mut original = init_state();
    reset(&mut original);
    let mut cloned = original.clone();

    cloned.player.x = 99.0;
    cloned.score = 999;
    cloned.invaders.clear();

    assert_eq!(original.player.x, 386.0);
    assert_eq!(original.score, 0);
    assert_eq!(original.invaders.len(), INVADER_ROWS * INVADER_COLS);
}
