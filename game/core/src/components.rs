//! Component schema shared by both games, plus the deterministic movement
//! rule applied identically by the server simulation and client prediction.

use hadron::entity::EntityId;

/// Input bitfield bits, as carried in input packets.
pub mod input_flags {
    pub const UP: u16 = 1 << 0;
    pub const DOWN: u16 = 1 << 1;
    pub const LEFT: u16 = 1 << 2;
    pub const RIGHT: u16 = 1 << 3;
    pub const SHOOT: u16 = 1 << 4;
    pub const CHARGE: u16 = 1 << 5;
    pub const SPECIAL: u16 = 1 << 6;
}

/// Player movement speed in pixels per second.
pub const PLAYER_SPEED: f32 = 200.0;

/// Derive a velocity from an input bitfield: the axis vector is normalized
/// and scaled by `PLAYER_SPEED`, so diagonals are no faster than straights.
pub fn velocity_from_input(flags: u16) -> (f32, f32) {
    let axis = |positive: u16, negative: u16| -> f32 {
        let mut value = 0.0;
        if flags & positive != 0 {
            value += 1.0;
        }
        if flags & negative != 0 {
            value -= 1.0;
        }
        value
    };

    let dx = axis(input_flags::RIGHT, input_flags::LEFT);
    let dy = axis(input_flags::DOWN, input_flags::UP);

    let magnitude = (dx * dx + dy * dy).sqrt();

    if magnitude == 0.0 {
        return (0.0, 0.0);
    }

    (
        dx / magnitude * PLAYER_SPEED,
        dy / magnitude * PLAYER_SPEED,
    )
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Health {
    pub current: u16,
    pub max: u16,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Score {
    pub value: u32,
}

/// Only consumed by the rendering backend; the server never reads it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sprite {
    pub texture: u32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub tint: u32,
    pub layer: u8,
}

/// Snapshot of a player's intent for the current tick.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct InputState {
    pub flags: u16,
}

/// The externally visible entity id; the replication key on the wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NetworkId {
    pub id: u32,
}

// Role tags.

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Player {
    pub player_id: u32,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Enemy {
    pub bounty: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct Projectile {
    pub owner_player_id: u32,
    pub damage: u16,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Wall;

#[derive(Debug, Copy, Clone)]
pub enum PowerupKind {
    Shield,
    SpeedBoost,
    BonusWeapon,
}

#[derive(Debug, Copy, Clone)]
pub struct Powerup {
    pub kind: PowerupKind,
}

/// Marks the entity controlled by this client. Client-side only.
#[derive(Debug, Copy, Clone, Default)]
pub struct LocalPlayer;

/// Blob-arena body. Mass decides both the collider size and who can swallow
/// whom; it never crosses the wire, only its effects do.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Blob {
    pub mass: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct Scrollable {
    pub speed: f32,
}

/// Reaped by the destroy stage at the end of the tick; the resulting destroy
/// event is the only authoritative end of an entity's life.
#[derive(Debug, Copy, Clone, Default)]
pub struct ToDestroy;

// Transient effects, decayed every tick.

#[derive(Debug, Copy, Clone)]
pub struct HitFlash {
    pub remaining: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct Invulnerability {
    pub remaining: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct Shield {
    pub remaining: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct SpeedBoost {
    pub remaining: f32,
    pub factor: f32,
}

/// Cross-entity link resolved through the world by id each tick; never a
/// direct reference.
#[derive(Debug, Copy, Clone)]
pub struct Attached {
    pub parent: EntityId,
    pub offset_x: f32,
    pub offset_y: f32,
    pub smooth: bool,
}

// Controller state.

#[derive(Debug, Copy, Clone)]
pub struct WaveController {
    pub current_wave: u16,
    pub total_waves: u16,
    pub alive_enemies: u16,
    pub spawn_budget: u16,
    pub spawn_timer: f32,
    pub wave_active: bool,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct GameState {
    pub over: bool,
    pub victory: bool,
}

#[derive(Debug, Copy, Clone)]
pub struct BonusWeapon {
    pub level: u8,
    pub remaining: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_input_is_still() {
        assert_eq!(velocity_from_input(0), (0.0, 0.0));
    }

    #[test]
    fn test_cardinal_speed() {
        let (dx, dy) = velocity_from_input(input_flags::RIGHT);

        assert_eq!(dx, PLAYER_SPEED);
        assert_eq!(dy, 0.0);
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let (dx, dy) = velocity_from_input(input_flags::RIGHT | input_flags::DOWN);
        let speed = (dx * dx + dy * dy).sqrt();

        assert!((speed - PLAYER_SPEED).abs() < 1e-3);
        assert!(dx > 0.0 && dy > 0.0);
    }

    #[test]
    fn test_opposed_inputs_cancel() {
        assert_eq!(
            velocity_from_input(input_flags::LEFT | input_flags::RIGHT),
            (0.0, 0.0)
        );
    }

    #[test]
    fn test_up_is_negative_y() {
        let (_, dy) = velocity_from_input(input_flags::UP);

        assert!(dy < 0.0);
    }
}
