//! Wire protocol shared by the server and the client core. Every packet is
//! `[header | payload]`; multi-byte integers travel in network byte order,
//! floats as IEEE-754 little-endian. Both conventions are load-bearing: the
//! sources were silent on float order, so it is pinned here and both ends
//! follow this module.

mod packet;
mod types;

pub use self::packet::Packet;
pub use self::types::entity_flags;
pub use self::types::{
    Difficulty, EntityKind, EntityState, GameMode, LeaderboardEntry, RejectReason, RoomErrorCode,
    RoomInfo, RoomStatus,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use std::io::Cursor;

/// Protocol major version. Bumped on incompatible header or payload changes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 8;

pub const DEFAULT_TCP_PORT: u16 = 4242;
pub const DEFAULT_UDP_PORT: u16 = 4243;

/// Fixed field widths for null-padded ASCII strings.
pub const NAME_LEN: usize = 32;
pub const MESSAGE_LEN: usize = 64;
pub const PASSWORD_HASH_LEN: usize = 64;

/// Decoding failure contracts. A failed packet is dropped and counted; the
/// peer is not disconnected on first offense.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// Fewer bytes than header plus declared payload.
    Truncated,
    /// Header version differs from the local one.
    BadVersion,
    /// Unknown packet type tag.
    BadType(u8),
    /// Declared payload length disagrees with the embedded element count.
    CountMismatch,
}

impl From<io::Error> for DecodeError {
    #[inline]
    fn from(_: io::Error) -> Self {
        DecodeError::Truncated
    }
}

/// Closed set of packet type tags. Client-to-server tags occupy the low
/// range, server-to-client tags start at 0x80.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 0x01,
    Disconnect = 0x02,
    Ping = 0x03,
    JoinLobby = 0x04,
    LeaveLobby = 0x05,
    CreateRoom = 0x06,
    JoinRoom = 0x07,
    LeaveRoom = 0x08,
    RequestRoomList = 0x09,
    StartGame = 0x0a,
    SetPlayerName = 0x0b,
    SetPlayerSkin = 0x0c,
    UdpHandshake = 0x0d,
    Input = 0x0e,

    Accept = 0x80,
    Reject = 0x81,
    Pong = 0x82,
    LobbyState = 0x83,
    Countdown = 0x84,
    GameStart = 0x85,
    EntitySpawn = 0x86,
    EntityDestroy = 0x87,
    ProjectileSpawn = 0x88,
    Explosion = 0x89,
    Snapshot = 0x8a,
    WaveStart = 0x8b,
    WaveComplete = 0x8c,
    ScoreUpdate = 0x8d,
    GameOver = 0x8e,
    RoomCreated = 0x8f,
    RoomJoined = 0x90,
    RoomLeft = 0x91,
    RoomList = 0x92,
    RoomError = 0x93,
    RoomState = 0x94,
    PlayerNameUpdated = 0x95,
    PlayerSkinUpdated = 0x96,
    PlayerSkin = 0x97,
    PlayerEaten = 0x98,
    GlobalLeaderboard = 0x99,
}

impl PacketType {
    pub fn from_u8(tag: u8) -> Result<PacketType, DecodeError> {
        use self::PacketType::*;

        Ok(match tag {
            0x01 => Connect,
            0x02 => Disconnect,
            0x03 => Ping,
            0x04 => JoinLobby,
            0x05 => LeaveLobby,
            0x06 => CreateRoom,
            0x07 => JoinRoom,
            0x08 => LeaveRoom,
            0x09 => RequestRoomList,
            0x0a => StartGame,
            0x0b => SetPlayerName,
            0x0c => SetPlayerSkin,
            0x0d => UdpHandshake,
            0x0e => Input,
            0x80 => Accept,
            0x81 => Reject,
            0x82 => Pong,
            0x83 => LobbyState,
            0x84 => Countdown,
            0x85 => GameStart,
            0x86 => EntitySpawn,
            0x87 => EntityDestroy,
            0x88 => ProjectileSpawn,
            0x89 => Explosion,
            0x8a => Snapshot,
            0x8b => WaveStart,
            0x8c => WaveComplete,
            0x8d => ScoreUpdate,
            0x8e => GameOver,
            0x8f => RoomCreated,
            0x90 => RoomJoined,
            0x91 => RoomLeft,
            0x92 => RoomList,
            0x93 => RoomError,
            0x94 => RoomState,
            0x95 => PlayerNameUpdated,
            0x96 => PlayerSkinUpdated,
            0x97 => PlayerSkin,
            0x98 => PlayerEaten,
            0x99 => GlobalLeaderboard,
            unknown => return Err(DecodeError::BadType(unknown)),
        })
    }
}

/// The fixed 8-byte packet header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    pub version: u8,
    pub packet_type: PacketType,
    pub payload_len: u16,
    pub sequence: u32,
}

impl Header {
    pub fn read(bytes: &[u8]) -> Result<Header, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated);
        }

        let mut cursor = Cursor::new(bytes);

        let version = cursor.read_u8()?;

        if version != PROTOCOL_VERSION {
            return Err(DecodeError::BadVersion);
        }

        let packet_type = PacketType::from_u8(cursor.read_u8()?)?;
        let payload_len = cursor.read_u16::<BigEndian>()?;
        let sequence = cursor.read_u32::<BigEndian>()?;

        Ok(Header {
            version,
            packet_type,
            payload_len,
            sequence,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.packet_type as u8);
        out.write_u16::<BigEndian>(self.payload_len)
            .expect("vec write can't fail");
        out.write_u32::<BigEndian>(self.sequence)
            .expect("vec write can't fail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            version: PROTOCOL_VERSION,
            packet_type: PacketType::Snapshot,
            payload_len: 1234,
            sequence: 99,
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes);

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Header::read(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_truncated() {
        assert_eq!(Header::read(&[1, 2, 3]).unwrap_err(), DecodeError::Truncated);
    }

    #[test]
    fn test_header_bad_version() {
        let bytes = [9, 0x01, 0, 0, 0, 0, 0, 0];

        assert_eq!(Header::read(&bytes).unwrap_err(), DecodeError::BadVersion);
    }

    #[test]
    fn test_header_bad_type() {
        let bytes = [PROTOCOL_VERSION, 0x7f, 0, 0, 0, 0, 0, 0];

        assert_eq!(
            Header::read(&bytes).unwrap_err(),
            DecodeError::BadType(0x7f)
        );
    }
}
