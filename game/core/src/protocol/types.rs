use crate::protocol::DecodeError;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

/// Matchmaking mode; the discriminant is the wire value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GameMode {
    Duo = 0,
    Trio = 1,
    Squad = 2,
}

impl GameMode {
    /// Player capacity implied by the mode.
    pub fn capacity(self) -> u8 {
        match self {
            GameMode::Duo => 2,
            GameMode::Trio => 3,
            GameMode::Squad => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<GameMode, DecodeError> {
        Ok(match value {
            0 => GameMode::Duo,
            1 => GameMode::Trio,
            2 => GameMode::Squad,
            _ => return Err(DecodeError::Truncated),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Difficulty {
    Easy = 0,
    Normal = 1,
    Hard = 2,
}

impl Difficulty {
    pub fn from_u8(value: u8) -> Result<Difficulty, DecodeError> {
        Ok(match value {
            0 => Difficulty::Easy,
            1 => Difficulty::Normal,
            2 => Difficulty::Hard,
            _ => return Err(DecodeError::Truncated),
        })
    }
}

/// Admission rejection reasons carried by the reject packet.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum RejectReason {
    ServerFull = 0,
    VersionMismatch = 1,
    DuplicateName = 2,
    InternalError = 3,
}

impl RejectReason {
    pub fn from_u8(value: u8) -> Result<RejectReason, DecodeError> {
        Ok(match value {
            0 => RejectReason::ServerFull,
            1 => RejectReason::VersionMismatch,
            2 => RejectReason::DuplicateName,
            3 => RejectReason::InternalError,
            _ => return Err(DecodeError::Truncated),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum RoomStatus {
    Waiting = 0,
    Countdown = 1,
    InProgress = 2,
}

impl RoomStatus {
    pub fn from_u8(value: u8) -> Result<RoomStatus, DecodeError> {
        Ok(match value {
            0 => RoomStatus::Waiting,
            1 => RoomStatus::Countdown,
            2 => RoomStatus::InProgress,
            _ => return Err(DecodeError::Truncated),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum RoomErrorCode {
    WrongPassword = 0,
    RoomFull = 1,
    RoomNotFound = 2,
    RoomInProgress = 3,
    NotHost = 4,
    AlreadyInRoom = 5,
}

impl RoomErrorCode {
    pub fn from_u8(value: u8) -> Result<RoomErrorCode, DecodeError> {
        Ok(match value {
            0 => RoomErrorCode::WrongPassword,
            1 => RoomErrorCode::RoomFull,
            2 => RoomErrorCode::RoomNotFound,
            3 => RoomErrorCode::RoomInProgress,
            4 => RoomErrorCode::NotHost,
            5 => RoomErrorCode::AlreadyInRoom,
            _ => return Err(DecodeError::Truncated),
        })
    }
}

/// Replicated entity category carried in spawn packets and snapshots.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum EntityKind {
    Player = 0,
    Enemy = 1,
    Projectile = 2,
    Wall = 3,
    Powerup = 4,
}

impl EntityKind {
    pub fn from_u8(value: u8) -> Result<EntityKind, DecodeError> {
        Ok(match value {
            0 => EntityKind::Player,
            1 => EntityKind::Enemy,
            2 => EntityKind::Projectile,
            3 => EntityKind::Wall,
            4 => EntityKind::Powerup,
            _ => return Err(DecodeError::Truncated),
        })
    }
}

/// Entity state flag bits carried in snapshots.
pub mod entity_flags {
    pub const HIT_FLASH: u8 = 1 << 0;
    pub const INVULNERABLE: u8 = 1 << 1;
    pub const SHIELD: u8 = 1 << 2;
    pub const SPEED_BOOST: u8 = 1 << 3;
}

/// Per-entity record inside a snapshot. 20 bytes on the wire; velocity is a
/// signed 16-bit fixed point value scaled by 10.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: u32,
    pub position_x: f32,
    pub position_y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub health: u16,
    pub flags: u8,
    pub kind: EntityKind,
}

impl EntityState {
    pub const SIZE: usize = 20;

    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<EntityState, DecodeError> {
        Ok(EntityState {
            entity_id: cursor.read_u32::<BigEndian>()?,
            position_x: cursor.read_f32::<LittleEndian>()?,
            position_y: cursor.read_f32::<LittleEndian>()?,
            velocity_x: f32::from(cursor.read_i16::<BigEndian>()?) / 10.0,
            velocity_y: f32::from(cursor.read_i16::<BigEndian>()?) / 10.0,
            health: cursor.read_u16::<BigEndian>()?,
            flags: cursor.read_u8()?,
            kind: EntityKind::from_u8(cursor.read_u8()?)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_u32::<BigEndian>(self.entity_id).expect("vec write");
        out.write_f32::<LittleEndian>(self.position_x).expect("vec write");
        out.write_f32::<LittleEndian>(self.position_y).expect("vec write");
        out.write_i16::<BigEndian>(quantize_velocity(self.velocity_x))
            .expect("vec write");
        out.write_i16::<BigEndian>(quantize_velocity(self.velocity_y))
            .expect("vec write");
        out.write_u16::<BigEndian>(self.health).expect("vec write");
        out.push(self.flags);
        out.push(self.kind as u8);
    }
}

fn quantize_velocity(velocity: f32) -> i16 {
    let scaled = (velocity * 10.0).round();

    if scaled > f32::from(i16::max_value()) {
        i16::max_value()
    } else if scaled < f32::from(i16::min_value()) {
        i16::min_value()
    } else {
        scaled as i16
    }
}

/// Room summary row in the room list packet. 44 bytes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_id: u32,
    pub name: String,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub current_players: u8,
    pub max_players: u8,
    pub is_private: bool,
    pub status: RoomStatus,
    pub map_id: u16,
}

impl RoomInfo {
    pub const SIZE: usize = 44;

    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<RoomInfo, DecodeError> {
        Ok(RoomInfo {
            room_id: cursor.read_u32::<BigEndian>()?,
            name: read_fixed_str(cursor, super::NAME_LEN)?,
            mode: GameMode::from_u8(cursor.read_u8()?)?,
            difficulty: Difficulty::from_u8(cursor.read_u8()?)?,
            current_players: cursor.read_u8()?,
            max_players: cursor.read_u8()?,
            is_private: cursor.read_u8()? != 0,
            status: RoomStatus::from_u8(cursor.read_u8()?)?,
            map_id: cursor.read_u16::<BigEndian>()?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_u32::<BigEndian>(self.room_id).expect("vec write");
        write_fixed_str(out, &self.name, super::NAME_LEN);
        out.push(self.mode as u8);
        out.push(self.difficulty as u8);
        out.push(self.current_players);
        out.push(self.max_players);
        out.push(self.is_private as u8);
        out.push(self.status as u8);
        out.write_u16::<BigEndian>(self.map_id).expect("vec write");
    }
}

/// All-time leaderboard row. 40 bytes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
    pub timestamp: u32,
}

impl LeaderboardEntry {
    pub const SIZE: usize = 40;

    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<LeaderboardEntry, DecodeError> {
        Ok(LeaderboardEntry {
            name: read_fixed_str(cursor, super::NAME_LEN)?,
            score: cursor.read_u32::<BigEndian>()?,
            timestamp: cursor.read_u32::<BigEndian>()?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_fixed_str(out, &self.name, super::NAME_LEN);
        out.write_u32::<BigEndian>(self.score).expect("vec write");
        out.write_u32::<BigEndian>(self.timestamp).expect("vec write");
    }
}

/// Write a string into a fixed-width null-padded ASCII field, truncating
/// oversized input.
pub(crate) fn write_fixed_str(out: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(width);

    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + width - take, 0);
}

/// Read a fixed-width null-padded field back into a string, dropping the
/// padding and any non-ASCII bytes.
pub(crate) fn read_fixed_str(
    cursor: &mut Cursor<&[u8]>,
    width: usize,
) -> Result<String, DecodeError> {
    let mut field = vec![0u8; width];
    cursor.read_exact(&mut field)?;

    let end = field.iter().position(|&b| b == 0).unwrap_or(width);

    Ok(field[..end]
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect())
}
