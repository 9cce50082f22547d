use crate::protocol::types::{read_fixed_str, write_fixed_str};
use crate::protocol::{
    DecodeError, Difficulty, EntityKind, EntityState, GameMode, Header, LeaderboardEntry,
    PacketType, RejectReason, RoomErrorCode, RoomInfo, RoomStatus, HEADER_SIZE, MESSAGE_LEN,
    NAME_LEN, PASSWORD_HASH_LEN, PROTOCOL_VERSION,
};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// The full packet catalogue as a closed tagged union. `decode(encode(p))`
/// reproduces `p` for every member.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // Client to server
    Connect {
        name: String,
    },
    Disconnect,
    Ping {
        timestamp: u32,
    },
    JoinLobby {
        mode: GameMode,
        difficulty: Difficulty,
    },
    LeaveLobby,
    CreateRoom {
        name: String,
        password_hash: String,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        max_players: u8,
    },
    JoinRoom {
        room_id: u32,
        password_hash: String,
    },
    LeaveRoom,
    RequestRoomList,
    StartGame,
    SetPlayerName {
        name: String,
    },
    SetPlayerSkin {
        skin_id: u8,
    },
    UdpHandshake {
        session_id: u32,
        player_id: u32,
    },
    Input {
        player_id: u32,
        flags: u16,
        sequence: u32,
        timestamp: u32,
    },

    // Server to client
    Accept {
        player_id: u32,
        map_width: f32,
        map_height: f32,
    },
    Reject {
        reason: RejectReason,
        message: String,
    },
    Pong {
        timestamp: u32,
    },
    LobbyState {
        lobby_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        current_players: u8,
        required_players: u8,
    },
    Countdown {
        seconds: u8,
    },
    GameStart {
        session_id: u32,
        udp_port: u16,
        map_id: u16,
        scroll_speed: f32,
    },
    EntitySpawn {
        entity_id: u32,
        kind: EntityKind,
        x: f32,
        y: f32,
        owner_player_id: u32,
    },
    EntityDestroy {
        entity_id: u32,
    },
    ProjectileSpawn {
        entity_id: u32,
        owner_player_id: u32,
        x: f32,
        y: f32,
        velocity_x: f32,
        velocity_y: f32,
    },
    Explosion {
        x: f32,
        y: f32,
        size: u8,
    },
    Snapshot {
        server_tick: u32,
        last_processed_input: u32,
        entities: Vec<EntityState>,
    },
    WaveStart {
        wave: u16,
    },
    WaveComplete {
        wave: u16,
    },
    ScoreUpdate {
        player_id: u32,
        score: u32,
    },
    GameOver {
        victory: bool,
        final_score: u32,
    },
    RoomCreated {
        room_id: u32,
    },
    RoomJoined {
        room_id: u32,
    },
    RoomLeft,
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    RoomError {
        code: RoomErrorCode,
    },
    RoomState {
        room_id: u32,
        host_player_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        current_players: u8,
        max_players: u8,
        status: RoomStatus,
    },
    PlayerNameUpdated {
        player_id: u32,
        name: String,
    },
    PlayerSkinUpdated {
        player_id: u32,
        skin_id: u8,
    },
    PlayerSkin {
        player_id: u32,
        skin_id: u8,
    },
    PlayerEaten {
        eater_player_id: u32,
        eaten_player_id: u32,
    },
    GlobalLeaderboard {
        entries: Vec<LeaderboardEntry>,
    },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect { .. } => PacketType::Connect,
            Packet::Disconnect => PacketType::Disconnect,
            Packet::Ping { .. } => PacketType::Ping,
            Packet::JoinLobby { .. } => PacketType::JoinLobby,
            Packet::LeaveLobby => PacketType::LeaveLobby,
            Packet::CreateRoom { .. } => PacketType::CreateRoom,
            Packet::JoinRoom { .. } => PacketType::JoinRoom,
            Packet::LeaveRoom => PacketType::LeaveRoom,
            Packet::RequestRoomList => PacketType::RequestRoomList,
            Packet::StartGame => PacketType::StartGame,
            Packet::SetPlayerName { .. } => PacketType::SetPlayerName,
            Packet::SetPlayerSkin { .. } => PacketType::SetPlayerSkin,
            Packet::UdpHandshake { .. } => PacketType::UdpHandshake,
            Packet::Input { .. } => PacketType::Input,
            Packet::Accept { .. } => PacketType::Accept,
            Packet::Reject { .. } => PacketType::Reject,
            Packet::Pong { .. } => PacketType::Pong,
            Packet::LobbyState { .. } => PacketType::LobbyState,
            Packet::Countdown { .. } => PacketType::Countdown,
            Packet::GameStart { .. } => PacketType::GameStart,
            Packet::EntitySpawn { .. } => PacketType::EntitySpawn,
            Packet::EntityDestroy { .. } => PacketType::EntityDestroy,
            Packet::ProjectileSpawn { .. } => PacketType::ProjectileSpawn,
            Packet::Explosion { .. } => PacketType::Explosion,
            Packet::Snapshot { .. } => PacketType::Snapshot,
            Packet::WaveStart { .. } => PacketType::WaveStart,
            Packet::WaveComplete { .. } => PacketType::WaveComplete,
            Packet::ScoreUpdate { .. } => PacketType::ScoreUpdate,
            Packet::GameOver { .. } => PacketType::GameOver,
            Packet::RoomCreated { .. } => PacketType::RoomCreated,
            Packet::RoomJoined { .. } => PacketType::RoomJoined,
            Packet::RoomLeft => PacketType::RoomLeft,
            Packet::RoomList { .. } => PacketType::RoomList,
            Packet::RoomError { .. } => PacketType::RoomError,
            Packet::RoomState { .. } => PacketType::RoomState,
            Packet::PlayerNameUpdated { .. } => PacketType::PlayerNameUpdated,
            Packet::PlayerSkinUpdated { .. } => PacketType::PlayerSkinUpdated,
            Packet::PlayerSkin { .. } => PacketType::PlayerSkin,
            Packet::PlayerEaten { .. } => PacketType::PlayerEaten,
            Packet::GlobalLeaderboard { .. } => PacketType::GlobalLeaderboard,
        }
    }

    /// True for traffic that travels on the unreliable channel: inputs, the
    /// UDP handshake that opens it, and snapshots.
    pub fn is_unreliable(&self) -> bool {
        match self.packet_type() {
            PacketType::Input | PacketType::UdpHandshake | PacketType::Snapshot => true,
            _ => false,
        }
    }

    /// Serialize header plus payload with the supplied sequence number.
    pub fn encode(&self, sequence: u32) -> Vec<u8> {
        let payload = self.encode_payload();

        let header = Header {
            version: PROTOCOL_VERSION,
            packet_type: self.packet_type(),
            payload_len: payload.len() as u16,
            sequence,
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        header.write(&mut out);
        out.extend_from_slice(&payload);
        out
    }

    /// Parse one packet off the wire. The payload must be at least as long
    /// as the header declares; trailing bytes beyond the declared length are
    /// ignored.
    pub fn decode(bytes: &[u8]) -> Result<(Header, Packet), DecodeError> {
        let header = Header::read(bytes)?;

        let declared = header.payload_len as usize;

        if bytes.len() < HEADER_SIZE + declared {
            return Err(DecodeError::Truncated);
        }

        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + declared];
        let packet = Packet::decode_payload(header.packet_type, payload)?;

        Ok((header, packet))
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();

        match self {
            Packet::Connect { name } => write_fixed_str(&mut out, name, NAME_LEN),
            Packet::Disconnect => (),
            Packet::Ping { timestamp } => {
                out.write_u32::<BigEndian>(*timestamp).expect("vec write")
            }
            Packet::JoinLobby { mode, difficulty } => {
                out.push(*mode as u8);
                out.push(*difficulty as u8);
            }
            Packet::LeaveLobby => (),
            Packet::CreateRoom {
                name,
                password_hash,
                mode,
                difficulty,
                map_id,
                max_players,
            } => {
                write_fixed_str(&mut out, name, NAME_LEN);
                write_fixed_str(&mut out, password_hash, PASSWORD_HASH_LEN);
                out.push(*mode as u8);
                out.push(*difficulty as u8);
                out.write_u16::<BigEndian>(*map_id).expect("vec write");
                out.push(*max_players);
            }
            Packet::JoinRoom {
                room_id,
                password_hash,
            } => {
                out.write_u32::<BigEndian>(*room_id).expect("vec write");
                write_fixed_str(&mut out, password_hash, PASSWORD_HASH_LEN);
            }
            Packet::LeaveRoom | Packet::RequestRoomList | Packet::StartGame => (),
            Packet::SetPlayerName { name } => write_fixed_str(&mut out, name, NAME_LEN),
            Packet::SetPlayerSkin { skin_id } => out.push(*skin_id),
            Packet::UdpHandshake {
                session_id,
                player_id,
            } => {
                out.write_u32::<BigEndian>(*session_id).expect("vec write");
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
            }
            Packet::Input {
                player_id,
                flags,
                sequence,
                timestamp,
            } => {
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
                out.write_u16::<BigEndian>(*flags).expect("vec write");
                out.write_u32::<BigEndian>(*sequence).expect("vec write");
                out.write_u32::<BigEndian>(*timestamp).expect("vec write");
            }
            Packet::Accept {
                player_id,
                map_width,
                map_height,
            } => {
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
                out.write_f32::<LittleEndian>(*map_width).expect("vec write");
                out.write_f32::<LittleEndian>(*map_height).expect("vec write");
            }
            Packet::Reject { reason, message } => {
                out.push(*reason as u8);
                write_fixed_str(&mut out, message, MESSAGE_LEN);
            }
            Packet::Pong { timestamp } => {
                out.write_u32::<BigEndian>(*timestamp).expect("vec write")
            }
            Packet::LobbyState {
                lobby_id,
                mode,
                difficulty,
                current_players,
                required_players,
            } => {
                out.write_u32::<BigEndian>(*lobby_id).expect("vec write");
                out.push(*mode as u8);
                out.push(*difficulty as u8);
                out.push(*current_players);
                out.push(*required_players);
            }
            Packet::Countdown { seconds } => out.push(*seconds),
            Packet::GameStart {
                session_id,
                udp_port,
                map_id,
                scroll_speed,
            } => {
                out.write_u32::<BigEndian>(*session_id).expect("vec write");
                out.write_u16::<BigEndian>(*udp_port).expect("vec write");
                out.write_u16::<BigEndian>(*map_id).expect("vec write");
                out.write_f32::<LittleEndian>(*scroll_speed).expect("vec write");
            }
            Packet::EntitySpawn {
                entity_id,
                kind,
                x,
                y,
                owner_player_id,
            } => {
                out.write_u32::<BigEndian>(*entity_id).expect("vec write");
                out.push(*kind as u8);
                out.write_f32::<LittleEndian>(*x).expect("vec write");
                out.write_f32::<LittleEndian>(*y).expect("vec write");
                out.write_u32::<BigEndian>(*owner_player_id).expect("vec write");
            }
            Packet::EntityDestroy { entity_id } => {
                out.write_u32::<BigEndian>(*entity_id).expect("vec write")
            }
            Packet::ProjectileSpawn {
                entity_id,
                owner_player_id,
                x,
                y,
                velocity_x,
                velocity_y,
            } => {
                out.write_u32::<BigEndian>(*entity_id).expect("vec write");
                out.write_u32::<BigEndian>(*owner_player_id).expect("vec write");
                out.write_f32::<LittleEndian>(*x).expect("vec write");
                out.write_f32::<LittleEndian>(*y).expect("vec write");
                out.write_f32::<LittleEndian>(*velocity_x).expect("vec write");
                out.write_f32::<LittleEndian>(*velocity_y).expect("vec write");
            }
            Packet::Explosion { x, y, size } => {
                out.write_f32::<LittleEndian>(*x).expect("vec write");
                out.write_f32::<LittleEndian>(*y).expect("vec write");
                out.push(*size);
            }
            Packet::Snapshot {
                server_tick,
                last_processed_input,
                entities,
            } => {
                out.write_u32::<BigEndian>(*server_tick).expect("vec write");
                out.write_u32::<BigEndian>(*last_processed_input)
                    .expect("vec write");
                out.write_u16::<BigEndian>(entities.len() as u16)
                    .expect("vec write");
                for entity in entities {
                    entity.write(&mut out);
                }
            }
            Packet::WaveStart { wave } => out.write_u16::<BigEndian>(*wave).expect("vec write"),
            Packet::WaveComplete { wave } => {
                out.write_u16::<BigEndian>(*wave).expect("vec write")
            }
            Packet::ScoreUpdate { player_id, score } => {
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
                out.write_u32::<BigEndian>(*score).expect("vec write");
            }
            Packet::GameOver {
                victory,
                final_score,
            } => {
                out.push(*victory as u8);
                out.write_u32::<BigEndian>(*final_score).expect("vec write");
            }
            Packet::RoomCreated { room_id } => {
                out.write_u32::<BigEndian>(*room_id).expect("vec write")
            }
            Packet::RoomJoined { room_id } => {
                out.write_u32::<BigEndian>(*room_id).expect("vec write")
            }
            Packet::RoomLeft => (),
            Packet::RoomList { rooms } => {
                out.write_u16::<BigEndian>(rooms.len() as u16).expect("vec write");
                for room in rooms {
                    room.write(&mut out);
                }
            }
            Packet::RoomError { code } => out.push(*code as u8),
            Packet::RoomState {
                room_id,
                host_player_id,
                mode,
                difficulty,
                current_players,
                max_players,
                status,
            } => {
                out.write_u32::<BigEndian>(*room_id).expect("vec write");
                out.write_u32::<BigEndian>(*host_player_id).expect("vec write");
                out.push(*mode as u8);
                out.push(*difficulty as u8);
                out.push(*current_players);
                out.push(*max_players);
                out.push(*status as u8);
            }
            Packet::PlayerNameUpdated { player_id, name } => {
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
                write_fixed_str(&mut out, name, NAME_LEN);
            }
            Packet::PlayerSkinUpdated { player_id, skin_id } => {
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
                out.push(*skin_id);
            }
            Packet::PlayerSkin { player_id, skin_id } => {
                out.write_u32::<BigEndian>(*player_id).expect("vec write");
                out.push(*skin_id);
            }
            Packet::PlayerEaten {
                eater_player_id,
                eaten_player_id,
            } => {
                out.write_u32::<BigEndian>(*eater_player_id).expect("vec write");
                out.write_u32::<BigEndian>(*eaten_player_id).expect("vec write");
            }
            Packet::GlobalLeaderboard { entries } => {
                out.write_u16::<BigEndian>(entries.len() as u16)
                    .expect("vec write");
                for entry in entries {
                    entry.write(&mut out);
                }
            }
        }

        out
    }

    fn decode_payload(packet_type: PacketType, payload: &[u8]) -> Result<Packet, DecodeError> {
        let mut cursor = Cursor::new(payload);
        let cursor = &mut cursor;

        let packet = match packet_type {
            PacketType::Connect => Packet::Connect {
                name: read_fixed_str(cursor, NAME_LEN)?,
            },
            PacketType::Disconnect => Packet::Disconnect,
            PacketType::Ping => Packet::Ping {
                timestamp: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::JoinLobby => Packet::JoinLobby {
                mode: GameMode::from_u8(cursor.read_u8()?)?,
                difficulty: Difficulty::from_u8(cursor.read_u8()?)?,
            },
            PacketType::LeaveLobby => Packet::LeaveLobby,
            PacketType::CreateRoom => Packet::CreateRoom {
                name: read_fixed_str(cursor, NAME_LEN)?,
                password_hash: read_fixed_str(cursor, PASSWORD_HASH_LEN)?,
                mode: GameMode::from_u8(cursor.read_u8()?)?,
                difficulty: Difficulty::from_u8(cursor.read_u8()?)?,
                map_id: cursor.read_u16::<BigEndian>()?,
                max_players: cursor.read_u8()?,
            },
            PacketType::JoinRoom => Packet::JoinRoom {
                room_id: cursor.read_u32::<BigEndian>()?,
                password_hash: read_fixed_str(cursor, PASSWORD_HASH_LEN)?,
            },
            PacketType::LeaveRoom => Packet::LeaveRoom,
            PacketType::RequestRoomList => Packet::RequestRoomList,
            PacketType::StartGame => Packet::StartGame,
            PacketType::SetPlayerName => Packet::SetPlayerName {
                name: read_fixed_str(cursor, NAME_LEN)?,
            },
            PacketType::SetPlayerSkin => Packet::SetPlayerSkin {
                skin_id: cursor.read_u8()?,
            },
            PacketType::UdpHandshake => Packet::UdpHandshake {
                session_id: cursor.read_u32::<BigEndian>()?,
                player_id: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::Input => Packet::Input {
                player_id: cursor.read_u32::<BigEndian>()?,
                flags: cursor.read_u16::<BigEndian>()?,
                sequence: cursor.read_u32::<BigEndian>()?,
                timestamp: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::Accept => Packet::Accept {
                player_id: cursor.read_u32::<BigEndian>()?,
                map_width: cursor.read_f32::<LittleEndian>()?,
                map_height: cursor.read_f32::<LittleEndian>()?,
            },
            PacketType::Reject => Packet::Reject {
                reason: RejectReason::from_u8(cursor.read_u8()?)?,
                message: read_fixed_str(cursor, MESSAGE_LEN)?,
            },
            PacketType::Pong => Packet::Pong {
                timestamp: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::LobbyState => Packet::LobbyState {
                lobby_id: cursor.read_u32::<BigEndian>()?,
                mode: GameMode::from_u8(cursor.read_u8()?)?,
                difficulty: Difficulty::from_u8(cursor.read_u8()?)?,
                current_players: cursor.read_u8()?,
                required_players: cursor.read_u8()?,
            },
            PacketType::Countdown => Packet::Countdown {
                seconds: cursor.read_u8()?,
            },
            PacketType::GameStart => Packet::GameStart {
                session_id: cursor.read_u32::<BigEndian>()?,
                udp_port: cursor.read_u16::<BigEndian>()?,
                map_id: cursor.read_u16::<BigEndian>()?,
                scroll_speed: cursor.read_f32::<LittleEndian>()?,
            },
            PacketType::EntitySpawn => Packet::EntitySpawn {
                entity_id: cursor.read_u32::<BigEndian>()?,
                kind: EntityKind::from_u8(cursor.read_u8()?)?,
                x: cursor.read_f32::<LittleEndian>()?,
                y: cursor.read_f32::<LittleEndian>()?,
                owner_player_id: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::EntityDestroy => Packet::EntityDestroy {
                entity_id: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::ProjectileSpawn => Packet::ProjectileSpawn {
                entity_id: cursor.read_u32::<BigEndian>()?,
                owner_player_id: cursor.read_u32::<BigEndian>()?,
                x: cursor.read_f32::<LittleEndian>()?,
                y: cursor.read_f32::<LittleEndian>()?,
                velocity_x: cursor.read_f32::<LittleEndian>()?,
                velocity_y: cursor.read_f32::<LittleEndian>()?,
            },
            PacketType::Explosion => Packet::Explosion {
                x: cursor.read_f32::<LittleEndian>()?,
                y: cursor.read_f32::<LittleEndian>()?,
                size: cursor.read_u8()?,
            },
            PacketType::Snapshot => {
                let server_tick = cursor.read_u32::<BigEndian>()?;
                let last_processed_input = cursor.read_u32::<BigEndian>()?;
                let count = cursor.read_u16::<BigEndian>()? as usize;

                if payload.len() != 10 + count * EntityState::SIZE {
                    return Err(DecodeError::CountMismatch);
                }

                let mut entities = Vec::with_capacity(count);
                for _ in 0..count {
                    entities.push(EntityState::read(cursor)?);
                }

                Packet::Snapshot {
                    server_tick,
                    last_processed_input,
                    entities,
                }
            }
            PacketType::WaveStart => Packet::WaveStart {
                wave: cursor.read_u16::<BigEndian>()?,
            },
            PacketType::WaveComplete => Packet::WaveComplete {
                wave: cursor.read_u16::<BigEndian>()?,
            },
            PacketType::ScoreUpdate => Packet::ScoreUpdate {
                player_id: cursor.read_u32::<BigEndian>()?,
                score: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::GameOver => Packet::GameOver {
                victory: cursor.read_u8()? != 0,
                final_score: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::RoomCreated => Packet::RoomCreated {
                room_id: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::RoomJoined => Packet::RoomJoined {
                room_id: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::RoomLeft => Packet::RoomLeft,
            PacketType::RoomList => {
                let count = cursor.read_u16::<BigEndian>()? as usize;

                if payload.len() != 2 + count * RoomInfo::SIZE {
                    return Err(DecodeError::CountMismatch);
                }

                let mut rooms = Vec::with_capacity(count);
                for _ in 0..count {
                    rooms.push(RoomInfo::read(cursor)?);
                }

                Packet::RoomList { rooms }
            }
            PacketType::RoomError => Packet::RoomError {
                code: RoomErrorCode::from_u8(cursor.read_u8()?)?,
            },
            PacketType::RoomState => Packet::RoomState {
                room_id: cursor.read_u32::<BigEndian>()?,
                host_player_id: cursor.read_u32::<BigEndian>()?,
                mode: GameMode::from_u8(cursor.read_u8()?)?,
                difficulty: Difficulty::from_u8(cursor.read_u8()?)?,
                current_players: cursor.read_u8()?,
                max_players: cursor.read_u8()?,
                status: RoomStatus::from_u8(cursor.read_u8()?)?,
            },
            PacketType::PlayerNameUpdated => Packet::PlayerNameUpdated {
                player_id: cursor.read_u32::<BigEndian>()?,
                name: read_fixed_str(cursor, NAME_LEN)?,
            },
            PacketType::PlayerSkinUpdated => Packet::PlayerSkinUpdated {
                player_id: cursor.read_u32::<BigEndian>()?,
                skin_id: cursor.read_u8()?,
            },
            PacketType::PlayerSkin => Packet::PlayerSkin {
                player_id: cursor.read_u32::<BigEndian>()?,
                skin_id: cursor.read_u8()?,
            },
            PacketType::PlayerEaten => Packet::PlayerEaten {
                eater_player_id: cursor.read_u32::<BigEndian>()?,
                eaten_player_id: cursor.read_u32::<BigEndian>()?,
            },
            PacketType::GlobalLeaderboard => {
                let count = cursor.read_u16::<BigEndian>()? as usize;

                if payload.len() != 2 + count * LeaderboardEntry::SIZE {
                    return Err(DecodeError::CountMismatch);
                }

                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(LeaderboardEntry::read(cursor)?);
                }

                Packet::GlobalLeaderboard { entries }
            }
        };

        Ok(packet)
    }
}
