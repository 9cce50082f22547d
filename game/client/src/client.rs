//! The client networking core: admission, lobby/room traffic, the UDP
//! handshake, input sequencing and snapshot reconciliation. Rendering, audio
//! and input capture live behind the backend traits and call into this from
//! their own main loop via `poll`.

use crate::interpolation::Interpolator;
use crate::prediction::Predictor;
use flare::logging;
use hadron::net::client::{ClientTransport, ClientTransportEvent};
use hadron::net::NetworkResult;
use novacore::protocol::{
    Difficulty, EntityKind, GameMode, LeaderboardEntry, Packet, RejectReason, RoomErrorCode,
    RoomInfo, RoomStatus,
};
use hashbrown::HashMap;
use std::time::{Duration, Instant};

const PING_INTERVAL: Duration = Duration::from_secs(2);
const HANDSHAKE_RETRY: Duration = Duration::from_secs(1);
const SERVER_DT: f32 = 0.05;

/// High-level connection state as seen by the game loop.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClientState {
    Connected,
    InLobby,
    InRoom,
    InSession,
    Disconnected,
}

/// A remote entity known to the client.
#[derive(Debug, Copy, Clone)]
pub struct RemoteEntity {
    pub kind: EntityKind,
    pub owner_player_id: u32,
}

/// Events surfaced to the game loop, one batch per `poll`.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Accepted {
        player_id: u32,
        map_width: f32,
        map_height: f32,
    },
    Rejected {
        reason: RejectReason,
        message: String,
    },
    LobbyState {
        lobby_id: u32,
        current_players: u8,
        required_players: u8,
    },
    RoomCreated {
        room_id: u32,
    },
    RoomJoined {
        room_id: u32,
    },
    RoomLeft,
    RoomState {
        room_id: u32,
        host_player_id: u32,
        current_players: u8,
        max_players: u8,
        status: RoomStatus,
    },
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    RoomError {
        code: RoomErrorCode,
    },
    Countdown {
        seconds: u8,
    },
    GameStarted {
        session_id: u32,
        map_id: u16,
    },
    EntitySpawned {
        entity_id: u32,
        kind: EntityKind,
        x: f32,
        y: f32,
        owner_player_id: u32,
    },
    EntityDestroyed {
        entity_id: u32,
    },
    ProjectileSpawned {
        entity_id: u32,
        owner_player_id: u32,
    },
    Explosion {
        x: f32,
        y: f32,
        size: u8,
    },
    WaveStarted {
        wave: u16,
    },
    WaveCompleted {
        wave: u16,
    },
    ScoreChanged {
        player_id: u32,
        score: u32,
    },
    PlayerEaten {
        eater_player_id: u32,
        eaten_player_id: u32,
    },
    NameUpdated {
        player_id: u32,
        name: String,
    },
    SkinUpdated {
        player_id: u32,
        skin_id: u8,
    },
    SnapshotApplied {
        server_tick: u32,
    },
    GameOver {
        victory: bool,
        final_score: u32,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    Disconnected {
        reason: String,
    },
}

/// Transport seam for the client core; the mio-backed `ClientTransport` is
/// the production implementation.
pub trait ClientLink {
    fn poll(&mut self) -> Vec<ClientTransportEvent>;
    fn send_reliable(&mut self, bytes: Vec<u8>);
    fn send_unreliable(&mut self, bytes: Vec<u8>);
    fn shutdown(&mut self);
}

impl ClientLink for ClientTransport {
    fn poll(&mut self) -> Vec<ClientTransportEvent> {
        ClientTransport::poll(self)
    }

    fn send_reliable(&mut self, bytes: Vec<u8>) {
        ClientTransport::send_reliable(self, bytes);
    }

    fn send_unreliable(&mut self, bytes: Vec<u8>) {
        ClientTransport::send_unreliable(self, bytes);
    }

    fn shutdown(&mut self) {
        ClientTransport::shutdown(self);
    }
}

pub struct ClientCore<L: ClientLink> {
    link: L,

    state: ClientState,
    player_id: Option<u32>,
    session_id: Option<u32>,
    udp_port: u16,

    local_entity: Option<u32>,
    entities: HashMap<u32, RemoteEntity>,

    predictor: Predictor,
    interpolator: Interpolator,

    sequence: u32,
    server_tick: u32,
    snapshot_seen: bool,

    last_ping: Instant,
    pending_ping: Option<(u32, Instant)>,
    rtt_ms: Option<u32>,
    last_handshake: Instant,

    last_reject: Option<String>,

    log: logging::Logger,
}

impl ClientCore<ClientTransport> {
    /// Connect to a server and request admission under the supplied name.
    /// Refused connections fail synchronously.
    pub fn connect<'a, L: Into<Option<&'a logging::Logger>>>(
        host: &str,
        tcp_port: u16,
        udp_port: u16,
        name: &str,
        log: L,
    ) -> NetworkResult<ClientCore<ClientTransport>> {
        let core_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let transport = ClientTransport::connect(host, tcp_port, udp_port, &core_log)?;

        let mut core = ClientCore::with_link(transport, core_log);
        core.send_reliable(&Packet::Connect {
            name: name.to_string(),
        });

        Ok(core)
    }
}

impl<L: ClientLink> ClientCore<L> {
    pub fn with_link(link: L, log: logging::Logger) -> ClientCore<L> {
        let now = Instant::now();

        ClientCore {
            link,
            state: ClientState::Connected,
            player_id: None,
            session_id: None,
            udp_port: 0,
            local_entity: None,
            entities: HashMap::new(),
            predictor: Predictor::new(SERVER_DT),
            interpolator: Interpolator::new(),
            sequence: 0,
            server_tick: 0,
            snapshot_seen: false,
            last_ping: now,
            pending_ping: None,
            rtt_ms: None,
            last_handshake: now,
            last_reject: None,
            log,
        }
    }

    #[inline]
    pub fn state(&self) -> ClientState {
        self.state
    }

    #[inline]
    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    #[inline]
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Unreliable port announced by the server at game start.
    #[inline]
    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    #[inline]
    pub fn local_entity(&self) -> Option<u32> {
        self.local_entity
    }

    #[inline]
    pub fn rtt_ms(&self) -> Option<u32> {
        self.rtt_ms
    }

    #[inline]
    pub fn server_tick(&self) -> u32 {
        self.server_tick
    }

    /// Predicted position of the locally controlled entity.
    pub fn local_position(&self) -> (f32, f32) {
        (self.predictor.x, self.predictor.y)
    }

    /// Interpolated position of a remote entity for rendering.
    pub fn remote_position(&self, entity_id: u32) -> Option<(f32, f32)> {
        self.interpolator
            .position(entity_id, self.server_tick as f32)
    }

    #[inline]
    pub fn entities(&self) -> &HashMap<u32, RemoteEntity> {
        &self.entities
    }

    /// Drive the networking core; the game loop calls this once per frame.
    pub fn poll(&mut self, now: Instant) -> Vec<GameEvent> {
        let mut events = Vec::new();

        for event in self.link.poll() {
            match event {
                ClientTransportEvent::Reliable(bytes) => match Packet::decode(&bytes) {
                    Ok((_, packet)) => self.handle_reliable(packet, now, &mut events),
                    Err(err) => {
                        logging::debug!(self.log, "undecodable packet dropped";
                                        "context" => "poll",
                                        "error" => ?err);
                    }
                },
                ClientTransportEvent::Unreliable(bytes) => match Packet::decode(&bytes) {
                    Ok((_, packet)) => self.handle_unreliable(packet, &mut events),
                    Err(_) => (),
                },
                ClientTransportEvent::Disconnected => {
                    self.state = ClientState::Disconnected;
                    let reason = self
                        .last_reject
                        .take()
                        .unwrap_or_else(|| "Disconnected from server".to_string());
                    events.push(GameEvent::Disconnected { reason });
                }
            }
        }

        if self.state != ClientState::Disconnected {
            self.keepalive(now);
        }

        events
    }

    /// Sample the local input for this frame: predict immediately, then ship
    /// the sequenced input on the unreliable channel.
    pub fn send_input(&mut self, flags: u16) {
        let player_id = match (self.state, self.player_id) {
            (ClientState::InSession, Some(player_id)) => player_id,
            _ => return,
        };

        let timestamp = flare::time::timestamp_millis();
        let sequence = self.predictor.record_input(flags, timestamp);

        self.send_unreliable(&Packet::Input {
            player_id,
            flags,
            sequence,
            timestamp,
        });
    }

    pub fn join_lobby(&mut self, mode: GameMode, difficulty: Difficulty) {
        self.send_reliable(&Packet::JoinLobby { mode, difficulty });
    }

    pub fn leave_lobby(&mut self) {
        self.send_reliable(&Packet::LeaveLobby);
        if self.state == ClientState::InLobby {
            self.state = ClientState::Connected;
        }
    }

    pub fn create_room(
        &mut self,
        name: &str,
        password_hash: &str,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        max_players: u8,
    ) {
        self.send_reliable(&Packet::CreateRoom {
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            mode,
            difficulty,
            map_id,
            max_players,
        });
    }

    pub fn join_room(&mut self, room_id: u32, password_hash: &str) {
        self.send_reliable(&Packet::JoinRoom {
            room_id,
            password_hash: password_hash.to_string(),
        });
    }

    pub fn leave_room(&mut self) {
        self.send_reliable(&Packet::LeaveRoom);
    }

    pub fn request_room_list(&mut self) {
        self.send_reliable(&Packet::RequestRoomList);
    }

    pub fn start_game(&mut self) {
        self.send_reliable(&Packet::StartGame);
    }

    pub fn set_player_name(&mut self, name: &str) {
        self.send_reliable(&Packet::SetPlayerName {
            name: name.to_string(),
        });
    }

    pub fn set_player_skin(&mut self, skin_id: u8) {
        self.send_reliable(&Packet::SetPlayerSkin { skin_id });
    }

    pub fn disconnect(&mut self) {
        self.send_reliable(&Packet::Disconnect);
        self.link.shutdown();
        self.state = ClientState::Disconnected;
    }

    // ============== Inbound ==============

    fn handle_reliable(&mut self, packet: Packet, now: Instant, events: &mut Vec<GameEvent>) {
        match packet {
            Packet::Accept {
                player_id,
                map_width,
                map_height,
            } => {
                self.player_id = Some(player_id);
                events.push(GameEvent::Accepted {
                    player_id,
                    map_width,
                    map_height,
                });
            }
            Packet::Reject { reason, message } => {
                self.last_reject = Some(message.clone());
                events.push(GameEvent::Rejected { reason, message });
            }
            Packet::Pong { timestamp } => {
                if let Some((sent_stamp, sent_at)) = self.pending_ping.take() {
                    if sent_stamp == timestamp {
                        self.rtt_ms = Some(sent_at.elapsed().as_millis() as u32);
                    }
                }
            }
            Packet::LobbyState {
                lobby_id,
                current_players,
                required_players,
                ..
            } => {
                self.state = ClientState::InLobby;
                events.push(GameEvent::LobbyState {
                    lobby_id,
                    current_players,
                    required_players,
                });
            }
            Packet::Countdown { seconds } => events.push(GameEvent::Countdown { seconds }),
            Packet::GameStart {
                session_id,
                udp_port,
                map_id,
                ..
            } => {
                self.state = ClientState::InSession;
                self.session_id = Some(session_id);
                self.udp_port = udp_port;
                self.local_entity = None;
                self.entities.clear();
                self.snapshot_seen = false;
                self.predictor.reset(0.0, 0.0);
                self.interpolator.clear();

                self.send_handshake(now);
                events.push(GameEvent::GameStarted { session_id, map_id });
            }
            Packet::EntitySpawn {
                entity_id,
                kind,
                x,
                y,
                owner_player_id,
            } => {
                self.entities.insert(
                    entity_id,
                    RemoteEntity {
                        kind,
                        owner_player_id,
                    },
                );

                if kind == EntityKind::Player && Some(owner_player_id) == self.player_id {
                    self.local_entity = Some(entity_id);
                    self.predictor.reset(x, y);
                }

                events.push(GameEvent::EntitySpawned {
                    entity_id,
                    kind,
                    x,
                    y,
                    owner_player_id,
                });
            }
            Packet::EntityDestroy { entity_id } => {
                self.entities.remove(&entity_id);
                self.interpolator.forget(entity_id);

                if self.local_entity == Some(entity_id) {
                    self.local_entity = None;
                    self.predictor.reset(0.0, 0.0);
                }

                events.push(GameEvent::EntityDestroyed { entity_id });
            }
            Packet::ProjectileSpawn {
                entity_id,
                owner_player_id,
                ..
            } => {
                self.entities.insert(
                    entity_id,
                    RemoteEntity {
                        kind: EntityKind::Projectile,
                        owner_player_id,
                    },
                );
                events.push(GameEvent::ProjectileSpawned {
                    entity_id,
                    owner_player_id,
                });
            }
            Packet::Explosion { x, y, size } => events.push(GameEvent::Explosion { x, y, size }),
            Packet::WaveStart { wave } => events.push(GameEvent::WaveStarted { wave }),
            Packet::WaveComplete { wave } => events.push(GameEvent::WaveCompleted { wave }),
            Packet::ScoreUpdate { player_id, score } => {
                events.push(GameEvent::ScoreChanged { player_id, score })
            }
            Packet::PlayerEaten {
                eater_player_id,
                eaten_player_id,
            } => events.push(GameEvent::PlayerEaten {
                eater_player_id,
                eaten_player_id,
            }),
            Packet::GameOver {
                victory,
                final_score,
            } => {
                self.state = ClientState::Connected;
                self.session_id = None;
                self.local_entity = None;
                self.entities.clear();
                self.predictor.reset(0.0, 0.0);
                self.interpolator.clear();

                events.push(GameEvent::GameOver {
                    victory,
                    final_score,
                });
            }
            Packet::RoomCreated { room_id } => {
                self.state = ClientState::InRoom;
                events.push(GameEvent::RoomCreated { room_id });
            }
            Packet::RoomJoined { room_id } => {
                self.state = ClientState::InRoom;
                events.push(GameEvent::RoomJoined { room_id });
            }
            Packet::RoomLeft => {
                if self.state == ClientState::InRoom {
                    self.state = ClientState::Connected;
                }
                events.push(GameEvent::RoomLeft);
            }
            Packet::RoomList { rooms } => events.push(GameEvent::RoomList { rooms }),
            Packet::RoomError { code } => events.push(GameEvent::RoomError { code }),
            Packet::RoomState {
                room_id,
                host_player_id,
                current_players,
                max_players,
                status,
                ..
            } => events.push(GameEvent::RoomState {
                room_id,
                host_player_id,
                current_players,
                max_players,
                status,
            }),
            Packet::PlayerNameUpdated { player_id, name } => {
                events.push(GameEvent::NameUpdated { player_id, name })
            }
            Packet::PlayerSkinUpdated { player_id, skin_id }
            | Packet::PlayerSkin { player_id, skin_id } => {
                events.push(GameEvent::SkinUpdated { player_id, skin_id })
            }
            Packet::GlobalLeaderboard { entries } => {
                events.push(GameEvent::Leaderboard { entries })
            }
            other => {
                logging::debug!(self.log, "unexpected packet dropped";
                                "context" => "handle_reliable",
                                "type" => ?other.packet_type());
            }
        }
    }

    fn handle_unreliable(&mut self, packet: Packet, events: &mut Vec<GameEvent>) {
        if let Packet::Snapshot {
            server_tick,
            last_processed_input,
            entities,
        } = packet
        {
            // Reconciliation is monotonic in the server tick.
            if self.snapshot_seen && server_tick <= self.server_tick {
                return;
            }

            self.server_tick = server_tick;
            self.snapshot_seen = true;

            if let Some(local) = self.local_entity {
                if let Some(state) = entities.iter().find(|state| state.entity_id == local) {
                    self.predictor.reconcile(
                        state.position_x,
                        state.position_y,
                        last_processed_input,
                    );
                }
            }

            self.interpolator
                .record_snapshot(server_tick, &entities, self.local_entity);

            events.push(GameEvent::SnapshotApplied { server_tick });
        }
    }

    // ============== Outbound ==============

    fn keepalive(&mut self, now: Instant) {
        if now.duration_since(self.last_ping) >= PING_INTERVAL {
            self.last_ping = now;
            let timestamp = flare::time::timestamp_millis();
            self.pending_ping = Some((timestamp, now));
            self.send_reliable(&Packet::Ping { timestamp });
        }

        // Until the first snapshot proves the association, keep offering the
        // handshake; the datagram may have been lost.
        if self.state == ClientState::InSession
            && !self.snapshot_seen
            && now.duration_since(self.last_handshake) >= HANDSHAKE_RETRY
        {
            self.send_handshake(now);
        }
    }

    fn send_handshake(&mut self, now: Instant) {
        if let (Some(session_id), Some(player_id)) = (self.session_id, self.player_id) {
            self.last_handshake = now;
            self.send_unreliable(&Packet::UdpHandshake {
                session_id,
                player_id,
            });
        }
    }

    fn send_reliable(&mut self, packet: &Packet) {
        self.sequence += 1;
        self.link.send_reliable(packet.encode(self.sequence));
    }

    fn send_unreliable(&mut self, packet: &Packet) {
        self.sequence += 1;
        self.link.send_unreliable(packet.encode(self.sequence));
    }
}
