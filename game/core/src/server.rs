//! The server dispatcher: routes wire events between the transport, the
//! matchmaking managers and the running sessions. All state mutation happens
//! on the tick thread; the transport and the admin console feed it through
//! queues.

use crate::admin::{self, AdminCommand, AdminConsole, CommandResult};
use crate::config::GameConfig;
use crate::leaderboard::GlobalLeaderboard;
use crate::lobby::{LobbyError, LobbyEvent, LobbyManager};
use crate::players::{PlayerRegistry, RegisterError};
use crate::protocol::{DecodeError, Difficulty, GameMode, Packet, RejectReason};
use crate::rooms::{CreateRoomParams, RoomEvent, RoomManager};
use crate::session::{Outbound, SessionConfig, SessionId, SessionManager, SessionState};
use flare::logging;
use hadron::net::{ClientId, Transport, TransportEvent, UdpSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const LEADERBOARD_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

pub struct Server<T: Transport> {
    config: GameConfig,
    transport: T,

    players: PlayerRegistry,
    lobby: LobbyManager,
    rooms: RoomManager,
    sessions: SessionManager,
    leaderboard: GlobalLeaderboard,

    console: Option<AdminConsole>,

    /// Outbound sequence counter; every sent packet gets exactly one
    /// increment.
    sequence: u32,
    protocol_errors: u64,

    running: Arc<AtomicBool>,
    last_leaderboard_broadcast: Instant,
    /// Single time source for the tick in progress.
    now: Instant,

    log: logging::Logger,
}

impl<T: Transport> Server<T> {
    pub fn new(
        config: GameConfig,
        transport: T,
        console: Option<AdminConsole>,
        log: &logging::Logger,
    ) -> Server<T> {
        let server_log = log.new(logging::o!());

        let session_config = SessionConfig {
            map_width: config.game.map_width,
            map_height: config.game.map_height,
            scroll_speed: config.game.scroll_speed,
            kind: config.session_kind(),
        };

        let leaderboard = GlobalLeaderboard::load(&config.leaderboard.path, &server_log);

        Server {
            transport,
            players: PlayerRegistry::new(),
            lobby: LobbyManager::new(&server_log),
            rooms: RoomManager::new(&server_log),
            sessions: SessionManager::new(session_config, &server_log),
            leaderboard,
            console,
            sequence: 0,
            protocol_errors: 0,
            running: Arc::new(AtomicBool::new(true)),
            last_leaderboard_broadcast: Instant::now(),
            now: Instant::now(),
            log: server_log,
            config,
        }
    }

    /// Handle used by signal handlers to request a graceful stop.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    #[inline]
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    /// The fixed-step server loop. Ticks are never skipped or compressed;
    /// an overrun simply delays the next tick.
    pub fn run(&mut self) {
        let slot = Duration::from_millis(1000 / self.config.game.fps.max(1));

        logging::info!(self.log, "server running";
                       "context" => "run",
                       "tcp" => self.config.tcp_addr(),
                       "udp" => self.config.udp_addr(),
                       "fps" => self.config.game.fps);

        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();

            self.run_once(started);

            let elapsed = started.elapsed();
            if elapsed < slot {
                thread::sleep(slot - elapsed);
            }
        }

        self.shutdown();
    }

    /// One full tick: drain wire events, advance matchmaking and sessions,
    /// then run the barrier broadcast.
    pub fn run_once(&mut self, now: Instant) {
        self.now = now;

        let dt = 1.0 / self.config.game.fps.max(1) as f32;

        for event in self.transport.poll() {
            self.handle_transport_event(event);
        }

        let lines: Vec<String> = match self.console.as_ref() {
            Some(console) => console.drain(),
            None => Vec::new(),
        };
        for line in lines {
            let result = match admin::parse(&line) {
                Ok(command) => self.execute_admin(command),
                Err(result) => result,
            };
            println!("{}", result.message);
        }

        let lobby_events = self.lobby.update(now);
        self.apply_lobby_events(lobby_events);

        let room_events = self.rooms.update(now);
        self.apply_room_events(room_events);

        self.sessions.step_all(dt);
        self.flush_sessions();

        if now.duration_since(self.last_leaderboard_broadcast) >= LEADERBOARD_BROADCAST_INTERVAL {
            self.last_leaderboard_broadcast = now;
            self.broadcast_leaderboard();
        }
    }

    /// Graceful shutdown: every session broadcasts one last game_over, then
    /// the transport goes down.
    pub fn shutdown(&mut self) {
        logging::info!(self.log, "server shutting down"; "context" => "shutdown");

        for session in self.sessions.iter_mut() {
            session.finish();
        }
        self.flush_sessions();

        self.transport.shutdown();
    }

    // ============== Inbound routing ==============

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(client) => {
                logging::info!(self.log, "peer connected, awaiting admission";
                               "context" => "transport",
                               "client_id" => client);
            }
            TransportEvent::Disconnected(client) => {
                self.cleanup_client(client);
            }
            TransportEvent::Reliable(client, bytes) => match Packet::decode(&bytes) {
                Ok((_, packet)) => self.route_reliable(client, packet),
                Err(DecodeError::BadVersion) if self.players.by_client(client).is_none() => {
                    self.protocol_errors += 1;
                    self.reject(client, RejectReason::VersionMismatch, "Protocol version mismatch");
                    self.transport.disconnect_peer(client);
                }
                Err(err) => {
                    self.protocol_errors += 1;
                    logging::debug!(self.log, "undecodable reliable packet dropped";
                                    "context" => "transport",
                                    "client_id" => client,
                                    "error" => ?err);
                }
            },
            TransportEvent::Unreliable(source, bytes) => match Packet::decode(&bytes) {
                Ok((_, packet)) => self.route_unreliable(source, packet),
                Err(_) => {
                    // Unreliable garbage is dropped without ceremony.
                    self.protocol_errors += 1;
                }
            },
        }
    }

    fn route_reliable(&mut self, client: ClientId, packet: Packet) {
        match packet {
            Packet::Connect { name } => self.on_connect(client, &name),
            Packet::Disconnect => {
                self.cleanup_client(client);
                self.transport.disconnect_peer(client);
            }
            Packet::Ping { timestamp } => {
                self.send_to_client(client, &Packet::Pong { timestamp });
            }
            Packet::JoinLobby { mode, difficulty } => self.on_join_lobby(client, mode, difficulty),
            Packet::LeaveLobby => self.on_leave_lobby(client),
            Packet::CreateRoom {
                name,
                password_hash,
                mode,
                difficulty,
                map_id,
                max_players,
            } => self.on_create_room(
                client,
                CreateRoomParams {
                    name,
                    password_hash,
                    mode,
                    difficulty,
                    map_id,
                    max_players,
                },
            ),
            Packet::JoinRoom {
                room_id,
                password_hash,
            } => self.on_join_room(client, room_id, &password_hash),
            Packet::LeaveRoom => self.on_leave_room(client),
            Packet::RequestRoomList => {
                let rooms = self.rooms.public_rooms();
                self.send_to_client(client, &Packet::RoomList { rooms });
            }
            Packet::StartGame => self.on_start_game(client),
            Packet::SetPlayerName { name } => self.on_set_player_name(client, &name),
            Packet::SetPlayerSkin { skin_id } => self.on_set_player_skin(client, skin_id),
            other => {
                // Unexpected direction or channel for this packet.
                logging::debug!(self.log, "packet dropped by routing table";
                                "context" => "route_reliable",
                                "client_id" => client,
                                "type" => ?other.packet_type());
            }
        }
    }

    fn route_unreliable(&mut self, source: UdpSource, packet: Packet) {
        match packet {
            Packet::UdpHandshake {
                session_id,
                player_id,
            } => self.on_udp_handshake(source, session_id, player_id),
            Packet::Input {
                player_id,
                flags,
                sequence,
                ..
            } => self.on_input(source, player_id, flags, sequence),
            // Anything else on the unreliable channel is silently dropped.
            _ => (),
        }
    }

    // ============== Admission ==============

    fn on_connect(&mut self, client: ClientId, name: &str) {
        if self.players.len() >= self.config.server.max_clients as usize {
            self.reject(client, RejectReason::ServerFull, "Server is full");
            self.transport.disconnect_peer(client);
            return;
        }

        match self.players.register(client, name) {
            Ok(player_id) => {
                logging::info!(self.log, "player admitted";
                               "context" => "connect",
                               "client_id" => client,
                               "player_id" => player_id,
                               "name" => name);

                self.send_to_client(
                    client,
                    &Packet::Accept {
                        player_id,
                        map_width: self.config.game.map_width,
                        map_height: self.config.game.map_height,
                    },
                );
            }
            Err(RegisterError::DuplicateName) => {
                self.reject(client, RejectReason::DuplicateName, "Name already taken");
                self.transport.disconnect_peer(client);
            }
            Err(RegisterError::AlreadyRegistered) => {
                logging::debug!(self.log, "duplicate connect ignored";
                                "context" => "connect",
                                "client_id" => client);
            }
        }
    }

    fn reject(&mut self, client: ClientId, reason: RejectReason, message: &str) {
        logging::info!(self.log, "peer rejected";
                       "context" => "reject",
                       "client_id" => client,
                       "reason" => ?reason);

        self.send_to_client(
            client,
            &Packet::Reject {
                reason,
                message: message.to_string(),
            },
        );
    }

    // ============== Matchmaking ==============

    fn on_join_lobby(&mut self, client: ClientId, mode: GameMode, difficulty: Difficulty) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.room_id.is_none() && player.session_id.is_none() => {
                player.player_id
            }
            _ => return,
        };

        match self.lobby.join(player_id, mode, difficulty, self.now) {
            Ok((lobby_id, events)) => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.lobby_id = Some(lobby_id);
                }
                self.apply_lobby_events(events);
            }
            Err(LobbyError::AlreadyInLobby) => {
                logging::debug!(self.log, "join refused, already in a lobby";
                                "context" => "join_lobby",
                                "player_id" => player_id);
            }
        }
    }

    fn on_leave_lobby(&mut self, client: ClientId) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.lobby_id.is_some() => player.player_id,
            _ => return,
        };

        if let Some(player) = self.players.get_mut(player_id) {
            player.lobby_id = None;
        }

        let events = self.lobby.leave(player_id);
        self.apply_lobby_events(events);
    }

    fn apply_lobby_events(&mut self, events: Vec<LobbyEvent>) {
        for event in events {
            match event {
                LobbyEvent::State {
                    lobby_id,
                    mode,
                    difficulty,
                    members,
                    current_players,
                    required_players,
                } => {
                    let packet = Packet::LobbyState {
                        lobby_id,
                        mode,
                        difficulty,
                        current_players,
                        required_players,
                    };
                    for player_id in members {
                        self.send_to_player(player_id, &packet);
                    }
                }
                LobbyEvent::Countdown { members, seconds } => {
                    let packet = Packet::Countdown { seconds };
                    for player_id in members {
                        self.send_to_player(player_id, &packet);
                    }
                }
                LobbyEvent::GameStart {
                    mode,
                    difficulty,
                    map_id,
                    members,
                    ..
                } => self.start_session(mode, difficulty, map_id, members),
            }
        }
    }

    // ============== Rooms ==============

    fn on_create_room(&mut self, client: ClientId, params: CreateRoomParams) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.lobby_id.is_none() && player.session_id.is_none() => {
                player.player_id
            }
            _ => return,
        };

        match self.rooms.create(player_id, params) {
            Ok((room_id, events)) => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.room_id = Some(room_id);
                }
                self.send_to_client(client, &Packet::RoomCreated { room_id });
                self.apply_room_events(events);
            }
            Err(code) => {
                self.send_to_client(client, &Packet::RoomError { code });
            }
        }
    }

    fn on_join_room(&mut self, client: ClientId, room_id: u32, password_hash: &str) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.lobby_id.is_none() && player.session_id.is_none() => {
                player.player_id
            }
            _ => return,
        };

        match self.rooms.join(player_id, room_id, password_hash) {
            Ok(events) => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.room_id = Some(room_id);
                }
                self.send_to_client(client, &Packet::RoomJoined { room_id });
                self.apply_room_events(events);
            }
            Err(code) => {
                self.send_to_client(client, &Packet::RoomError { code });
            }
        }
    }

    fn on_leave_room(&mut self, client: ClientId) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.room_id.is_some() => player.player_id,
            _ => return,
        };

        if let Some(player) = self.players.get_mut(player_id) {
            player.room_id = None;
        }

        let events = self.rooms.leave(player_id);
        self.send_to_client(client, &Packet::RoomLeft);
        self.apply_room_events(events);
    }

    fn on_start_game(&mut self, client: ClientId) {
        let (player_id, room_id) = match self.players.by_client(client) {
            Some(player) => match player.room_id {
                Some(room_id) => (player.player_id, room_id),
                None => return,
            },
            None => return,
        };

        match self.rooms.start(room_id, player_id, self.now) {
            Ok(events) => self.apply_room_events(events),
            Err(code) => self.send_to_client(client, &Packet::RoomError { code }),
        }
    }

    fn apply_room_events(&mut self, events: Vec<RoomEvent>) {
        for event in events {
            match event {
                RoomEvent::State {
                    room_id,
                    host_player_id,
                    mode,
                    difficulty,
                    members,
                    current_players,
                    max_players,
                    status,
                } => {
                    let packet = Packet::RoomState {
                        room_id,
                        host_player_id,
                        mode,
                        difficulty,
                        current_players,
                        max_players,
                        status,
                    };
                    for player_id in members {
                        self.send_to_player(player_id, &packet);
                    }
                }
                RoomEvent::Countdown { members, seconds } => {
                    let packet = Packet::Countdown { seconds };
                    for player_id in members {
                        self.send_to_player(player_id, &packet);
                    }
                }
                RoomEvent::GameStart {
                    mode,
                    difficulty,
                    map_id,
                    members,
                    ..
                } => self.start_session(mode, difficulty, map_id, members),
            }
        }
    }

    // ============== Profile updates ==============

    fn on_set_player_name(&mut self, client: ClientId, name: &str) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.lobby_id.is_some() || player.room_id.is_some() => {
                player.player_id
            }
            _ => return,
        };

        if let Some(player) = self.players.get_mut(player_id) {
            player.name = name.to_string();
        }

        let packet = Packet::PlayerNameUpdated {
            player_id,
            name: name.to_string(),
        };
        for member in self.co_members(player_id) {
            self.send_to_player(member, &packet);
        }
    }

    fn on_set_player_skin(&mut self, client: ClientId, skin_id: u8) {
        let player_id = match self.players.by_client(client) {
            Some(player) if player.lobby_id.is_some() || player.room_id.is_some() => {
                player.player_id
            }
            _ => return,
        };

        if let Some(player) = self.players.get_mut(player_id) {
            player.skin_id = skin_id;
        }

        let packet = Packet::PlayerSkinUpdated { player_id, skin_id };
        for member in self.co_members(player_id) {
            self.send_to_player(member, &packet);
        }
    }

    /// Everyone sharing the player's lobby or room, the player included.
    fn co_members(&self, player_id: u32) -> Vec<u32> {
        match self.players.get(player_id) {
            Some(player) => match (player.lobby_id, player.room_id) {
                (Some(lobby_id), _) => self.lobby.members(lobby_id),
                (_, Some(room_id)) => self.rooms.members(room_id),
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    // ============== Unreliable channel ==============

    fn on_udp_handshake(&mut self, source: UdpSource, session_id: SessionId, player_id: u32) {
        let client_id = match self.players.get(player_id) {
            Some(player) if player.session_id == Some(session_id) => player.client_id,
            _ => {
                logging::debug!(self.log, "udp handshake for unknown session dropped";
                                "context" => "udp_handshake",
                                "player_id" => player_id,
                                "session_id" => session_id);
                return;
            }
        };

        if let Some(existing) = source.client {
            if existing != client_id {
                return;
            }
        }

        if self
            .sessions
            .get(session_id)
            .map(|session| session.is_member(player_id))
            .unwrap_or(false)
        {
            self.transport.associate_udp(client_id, source.addr);

            if let Some(player) = self.players.get_mut(player_id) {
                player.udp_associated = true;
            }
        }
    }

    fn on_input(&mut self, source: UdpSource, player_id: u32, flags: u16, sequence: u32) {
        let session_id = match (source.client, self.players.get(player_id)) {
            (Some(client), Some(player))
                if client == player.client_id && player.udp_associated =>
            {
                match player.session_id {
                    Some(session_id) => session_id,
                    None => return,
                }
            }
            // Unassociated or mismatched input is silently dropped.
            _ => return,
        };

        if let Some(session) = self.sessions.get_mut(session_id) {
            session.apply_input(player_id, flags, sequence);
        }
    }

    // ============== Sessions ==============

    fn start_session(
        &mut self,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        members: Vec<u32>,
    ) {
        let session_id = self.sessions.create(mode, difficulty, map_id, &members);

        logging::info!(self.log, "session started";
                       "context" => "start_session",
                       "session_id" => session_id,
                       "members" => members.len());

        let skins: Vec<(u32, u8)> = members
            .iter()
            .filter_map(|&player_id| {
                self.players
                    .get(player_id)
                    .map(|player| (player_id, player.skin_id))
            })
            .collect();

        let start_packet = Packet::GameStart {
            session_id,
            udp_port: self.config.server.udp_port,
            map_id,
            scroll_speed: self.config.game.scroll_speed,
        };

        for &player_id in members.iter() {
            if let Some(player) = self.players.get_mut(player_id) {
                player.lobby_id = None;
                player.room_id = None;
                player.session_id = Some(session_id);
            }

            self.send_to_player(player_id, &start_packet);

            for &(skin_player, skin_id) in skins.iter() {
                self.send_to_player(
                    player_id,
                    &Packet::PlayerSkin {
                        player_id: skin_player,
                        skin_id,
                    },
                );
            }
        }
    }

    /// Barrier broadcast: after every session has stepped, drain each
    /// session's outbound queue in production order. Spawns, destroys and
    /// scores travel reliably; snapshots go out as datagrams, after the
    /// events of the tick that produced them.
    fn flush_sessions(&mut self) {
        let session_ids: Vec<SessionId> =
            self.sessions.iter_mut().map(|session| session.id()).collect();

        for session_id in session_ids {
            let (outbound, members, ending) = match self.sessions.get_mut(session_id) {
                Some(session) => (
                    session.drain_outbound(),
                    session.members().to_vec(),
                    session.state() == SessionState::Ending,
                ),
                None => continue,
            };

            for item in outbound {
                match item {
                    Outbound::Broadcast(packet) => {
                        for member in members.iter().filter(|m| m.connected) {
                            self.send_to_player(member.player_id, &packet);
                        }
                    }
                    Outbound::To(player_id, packet) | Outbound::Datagram(player_id, packet) => {
                        self.send_to_player(player_id, &packet);
                    }
                }
            }

            if ending {
                self.finish_session(session_id);
            }
        }
    }

    /// Post-game_over teardown: persist scores, release members to idle and
    /// destroy the session world.
    fn finish_session(&mut self, session_id: SessionId) {
        let scores = match self.sessions.get(session_id) {
            Some(session) => session.final_scores(),
            None => return,
        };

        for (player_id, score) in scores {
            let name = match self.players.get(player_id) {
                Some(player) => player.name.clone(),
                None => continue,
            };

            self.leaderboard.add_score(&name, score);

            if let Some(player) = self.players.get_mut(player_id) {
                player.session_id = None;
                player.udp_associated = false;
            }
        }

        self.sessions.remove(session_id);
    }

    fn broadcast_leaderboard(&mut self) {
        let entries = self.leaderboard.entries();

        if entries.is_empty() {
            return;
        }

        let packet = Packet::GlobalLeaderboard { entries };
        let players: Vec<u32> = self.players.iter().map(|player| player.player_id).collect();

        for player_id in players {
            self.send_to_player(player_id, &packet);
        }
    }

    // ============== Cleanup ==============

    fn cleanup_client(&mut self, client: ClientId) {
        let player = match self.players.remove_client(client) {
            Some(player) => player,
            None => return,
        };

        logging::info!(self.log, "player removed";
                       "context" => "cleanup",
                       "client_id" => client,
                       "player_id" => player.player_id,
                       "name" => %player.name);

        if player.lobby_id.is_some() {
            let events = self.lobby.leave(player.player_id);
            self.apply_lobby_events(events);
        }

        if player.room_id.is_some() {
            let events = self.rooms.leave(player.player_id);
            self.apply_room_events(events);
        }

        if let Some(session_id) = player.session_id {
            if let Some(session) = self.sessions.get_mut(session_id) {
                session.remove_player(player.player_id);
            }
        }
    }

    // ============== Admin ==============

    fn execute_admin(&mut self, command: AdminCommand) -> CommandResult {
        match command {
            AdminCommand::Help => CommandResult::ok(admin::HELP_TEXT),
            AdminCommand::List => {
                if self.players.len() == 0 {
                    return CommandResult::ok("No players connected");
                }

                let mut lines = vec![format!("Connected players ({}):", self.players.len())];
                for player in self.players.iter() {
                    let mut line = format!("  [ID: {}] {}", player.player_id, player.name);
                    if let Some(session_id) = player.session_id {
                        line.push_str(&format!(" (in game - session {})", session_id));
                    }
                    lines.push(line);
                }

                CommandResult::ok(lines.join("\n"))
            }
            AdminCommand::Kick { player_id, reason } => {
                let client = match self.players.client_of(player_id) {
                    Some(client) => client,
                    None => {
                        return CommandResult::fail(format!("Player {} not found", player_id))
                    }
                };

                self.reject(client, RejectReason::InternalError, &reason);
                self.cleanup_client(client);
                self.transport.disconnect_peer(client);

                CommandResult::ok(format!("Player {} kicked", player_id))
            }
            AdminCommand::Info => CommandResult::ok(format!(
                "players={} lobbies={} rooms={} sessions={} protocol_errors={}",
                self.players.len(),
                self.lobby.count(),
                self.rooms.count(),
                self.sessions.count(),
                self.protocol_errors
            )),
            AdminCommand::Pause => {
                self.sessions.set_all_paused(true);
                CommandResult::ok("All sessions paused")
            }
            AdminCommand::Resume => {
                self.sessions.set_all_paused(false);
                CommandResult::ok("All sessions resumed")
            }
            AdminCommand::ClearEnemies { session_id } => match session_id {
                Some(session_id) => match self.sessions.get_mut(session_id) {
                    Some(session) => {
                        let cleared = session.clear_enemies();
                        CommandResult::ok(format!(
                            "Cleared {} enemies in session {}",
                            cleared, session_id
                        ))
                    }
                    None => CommandResult::fail(format!("Session {} not found", session_id)),
                },
                None => {
                    let mut cleared = 0;
                    for session in self.sessions.iter_mut() {
                        cleared += session.clear_enemies();
                    }
                    CommandResult::ok(format!("Cleared {} enemies", cleared))
                }
            },
        }
    }

    // ============== Outbound ==============

    fn send_to_player(&mut self, player_id: u32, packet: &Packet) {
        if let Some(client) = self.players.client_of(player_id) {
            self.send_to_client(client, packet);
        }
    }

    fn send_to_client(&mut self, client: ClientId, packet: &Packet) {
        self.sequence += 1;
        let bytes = packet.encode(self.sequence);

        if packet.is_unreliable() {
            self.transport.send_unreliable(client, bytes);
        } else {
            self.transport.send_reliable(client, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EntityKind, PacketType, RoomErrorCode};
    use std::collections::VecDeque;
    use std::net::SocketAddr;

    /// In-memory transport backend: tests inject inbound events and inspect
    /// everything the dispatcher sent.
    struct RecordingTransport {
        inbound: VecDeque<TransportEvent>,
        sent: Vec<(ClientId, Packet, bool)>,
        associations: Vec<(ClientId, SocketAddr)>,
        disconnected: Vec<ClientId>,
    }

    impl RecordingTransport {
        fn new() -> RecordingTransport {
            RecordingTransport {
                inbound: VecDeque::new(),
                sent: Vec::new(),
                associations: Vec::new(),
                disconnected: Vec::new(),
            }
        }

        fn record(&mut self, peer: ClientId, bytes: Vec<u8>, reliable: bool) {
            let (_, packet) = Packet::decode(&bytes).expect("server sent a valid packet");
            self.sent.push((peer, packet, reliable));
        }
    }

    impl Transport for RecordingTransport {
        fn poll(&mut self) -> Vec<TransportEvent> {
            self.inbound.drain(..).collect()
        }

        fn send_reliable(&mut self, peer: ClientId, bytes: Vec<u8>) {
            self.record(peer, bytes, true);
        }

        fn send_unreliable(&mut self, peer: ClientId, bytes: Vec<u8>) {
            self.record(peer, bytes, false);
        }

        fn broadcast_reliable(&mut self, bytes: Vec<u8>, except: Option<ClientId>) {
            let _ = (bytes, except);
        }

        fn broadcast_unreliable(&mut self, bytes: Vec<u8>, except: Option<ClientId>) {
            let _ = (bytes, except);
        }

        fn associate_udp(&mut self, peer: ClientId, addr: SocketAddr) {
            self.associations.push((peer, addr));
        }

        fn disconnect_peer(&mut self, peer: ClientId) {
            self.disconnected.push(peer);
        }

        fn note_rtt(&mut self, _peer: ClientId, _rtt_ms: u32) {}

        fn rtt(&self, _peer: ClientId) -> Option<u32> {
            None
        }

        fn shutdown(&mut self) {}
    }

    struct Harness {
        server: Server<RecordingTransport>,
        now: Instant,
    }

    impl Harness {
        fn new() -> Harness {
            use std::sync::atomic::{AtomicUsize, Ordering};

            static SCRATCH: AtomicUsize = AtomicUsize::new(0);

            let mut config = GameConfig::default();
            config.leaderboard.path = format!(
                "{}/nova_dispatch_{}_{}.json",
                std::env::temp_dir().display(),
                std::process::id(),
                SCRATCH.fetch_add(1, Ordering::SeqCst)
            );

            let log = logging::Logger::root(logging::Discard, logging::o!());
            let server = Server::new(config, RecordingTransport::new(), None, &log);

            let now = Instant::now();
            Harness { server, now }
        }

        fn inject(&mut self, event: TransportEvent) {
            self.server.transport.inbound.push_back(event);
        }

        fn send(&mut self, client: ClientId, packet: Packet) {
            self.inject(TransportEvent::Reliable(client, packet.encode(1)));
        }

        fn send_udp(&mut self, client: Option<ClientId>, port: u16, packet: Packet) {
            let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
            self.inject(TransportEvent::Unreliable(
                UdpSource { client, addr },
                packet.encode(1),
            ));
        }

        fn tick(&mut self) {
            self.server.run_once(self.now);
        }

        fn advance(&mut self, duration: Duration) {
            self.now += duration;
            self.tick();
        }

        fn sent(&mut self) -> Vec<(ClientId, Packet, bool)> {
            std::mem::replace(&mut self.server.transport.sent, Vec::new())
        }

        fn sent_to(&mut self, client: ClientId) -> Vec<Packet> {
            self.sent()
                .into_iter()
                .filter(|(peer, _, _)| *peer == client)
                .map(|(_, packet, _)| packet)
                .collect()
        }

        /// Connect two named peers and run the admission exchange.
        fn connect(&mut self, client: ClientId, name: &str) -> u32 {
            self.inject(TransportEvent::Connected(client));
            self.send(
                client,
                Packet::Connect {
                    name: name.to_string(),
                },
            );
            self.tick();

            let accepted = self
                .sent_to(client)
                .into_iter()
                .find_map(|packet| match packet {
                    Packet::Accept { player_id, .. } => Some(player_id),
                    _ => None,
                });

            accepted.expect("connect was accepted")
        }

        /// Drive two players through DUO matchmaking into a session.
        fn start_duo(&mut self) -> (u32, u32, SessionId) {
            let p1 = self.connect(1, "A");
            let p2 = self.connect(2, "B");

            self.send(
                1,
                Packet::JoinLobby {
                    mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                },
            );
            self.send(
                2,
                Packet::JoinLobby {
                    mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                },
            );
            self.tick();
            self.sent();

            for _ in 0..6 {
                self.advance(Duration::from_secs(1));
            }

            let session_id = self
                .sent()
                .into_iter()
                .find_map(|(_, packet, _)| match packet {
                    Packet::GameStart { session_id, .. } => Some(session_id),
                    _ => None,
                })
                .expect("session started");

            (p1, p2, session_id)
        }
    }

    #[test]
    fn test_scenario_matchmaking_duo() {
        let mut harness = Harness::new();

        let p1 = harness.connect(1, "A");
        let p2 = harness.connect(2, "B");
        assert_ne!(p1, p2);

        harness.send(
            1,
            Packet::JoinLobby {
                mode: GameMode::Duo,
                difficulty: Difficulty::Normal,
            },
        );
        harness.tick();

        let first = harness.sent_to(1);
        assert!(first.contains(&Packet::LobbyState {
            lobby_id: 1,
            mode: GameMode::Duo,
            difficulty: Difficulty::Normal,
            current_players: 1,
            required_players: 2,
        }));

        harness.send(
            2,
            Packet::JoinLobby {
                mode: GameMode::Duo,
                difficulty: Difficulty::Normal,
            },
        );
        harness.tick();

        let mut sent = harness.sent();
        let both_state = sent
            .iter()
            .filter(|(_, packet, _)| {
                matches!(
                    packet,
                    Packet::LobbyState {
                        current_players: 2,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(both_state, 2);

        // Countdown 5 was announced to both on fill.
        let fives = sent
            .iter()
            .filter(|(_, packet, _)| matches!(packet, Packet::Countdown { seconds: 5 }))
            .count();
        assert_eq!(fives, 2);

        // Then 4, 3, 2, 1 over the following seconds.
        let mut countdown_seen = Vec::new();
        for _ in 0..5 {
            harness.advance(Duration::from_secs(1));
            sent = harness.sent();
            for (peer, packet, _) in sent.iter() {
                if *peer == 1 {
                    if let Packet::Countdown { seconds } = packet {
                        countdown_seen.push(*seconds);
                    }
                }
            }
        }
        assert_eq!(countdown_seen, vec![4, 3, 2, 1]);

        // The final advance started the game for both, same session id.
        let starts: Vec<(ClientId, SessionId)> = sent
            .iter()
            .filter_map(|(peer, packet, _)| match packet {
                Packet::GameStart { session_id, .. } => Some((*peer, *session_id)),
                _ => None,
            })
            .collect();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].1, starts[1].1);

        // The next tick carries a snapshot with both player entities.
        harness.tick();
        let snapshot = harness
            .sent()
            .into_iter()
            .find_map(|(_, packet, reliable)| match packet {
                Packet::Snapshot { entities, .. } => {
                    assert!(!reliable);
                    Some(entities)
                }
                _ => None,
            })
            .expect("snapshot broadcast");

        let players = snapshot
            .iter()
            .filter(|entity| entity.kind == EntityKind::Player)
            .count();
        assert_eq!(players, 2);
    }

    #[test]
    fn test_scenario_decode_failure_keeps_peer() {
        let mut harness = Harness::new();
        harness.connect(1, "A");

        // Declared payload length of 1000 with only a few bytes following.
        let mut bytes = Packet::Ping { timestamp: 1 }.encode(2);
        bytes[2] = 0x03;
        bytes[3] = 0xe8;
        harness.inject(TransportEvent::Reliable(1, bytes));
        harness.tick();

        assert_eq!(harness.server.protocol_errors(), 1);
        assert!(harness.server.transport.disconnected.is_empty());
        assert_eq!(harness.server.players.len(), 1);
    }

    #[test]
    fn test_server_full_rejects() {
        let mut harness = Harness::new();
        harness.server.config.server.max_clients = 1;

        harness.connect(1, "A");

        harness.inject(TransportEvent::Connected(2));
        harness.send(
            2,
            Packet::Connect {
                name: "B".to_string(),
            },
        );
        harness.tick();

        let packets = harness.sent_to(2);
        assert!(packets.iter().any(|packet| matches!(
            packet,
            Packet::Reject {
                reason: RejectReason::ServerFull,
                ..
            }
        )));
        assert_eq!(harness.server.transport.disconnected, vec![2]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut harness = Harness::new();
        harness.connect(1, "A");

        harness.inject(TransportEvent::Connected(2));
        harness.send(
            2,
            Packet::Connect {
                name: "A".to_string(),
            },
        );
        harness.tick();

        let packets = harness.sent_to(2);
        assert!(packets.iter().any(|packet| matches!(
            packet,
            Packet::Reject {
                reason: RejectReason::DuplicateName,
                ..
            }
        )));
    }

    #[test]
    fn test_ping_pong() {
        let mut harness = Harness::new();
        harness.connect(1, "A");

        harness.send(1, Packet::Ping { timestamp: 777 });
        harness.tick();

        assert!(harness
            .sent_to(1)
            .contains(&Packet::Pong { timestamp: 777 }));
    }

    #[test]
    fn test_scenario_host_transfer() {
        let mut harness = Harness::new();

        let host = harness.connect(1, "H");
        let p1 = harness.connect(2, "P1");
        let _p2 = harness.connect(3, "P2");

        harness.send(
            1,
            Packet::CreateRoom {
                name: "Alpha".to_string(),
                password_hash: String::new(),
                mode: GameMode::Squad,
                difficulty: Difficulty::Normal,
                map_id: 1,
                max_players: 0,
            },
        );
        harness.tick();

        let room_id = harness
            .sent_to(1)
            .into_iter()
            .find_map(|packet| match packet {
                Packet::RoomCreated { room_id } => Some(room_id),
                _ => None,
            })
            .expect("room created");

        harness.send(
            2,
            Packet::JoinRoom {
                room_id,
                password_hash: String::new(),
            },
        );
        harness.send(
            3,
            Packet::JoinRoom {
                room_id,
                password_hash: String::new(),
            },
        );
        harness.tick();
        harness.sent();

        harness.send(1, Packet::LeaveRoom);
        harness.tick();

        let sent = harness.sent();

        // The departing host got room_left.
        assert!(sent
            .iter()
            .any(|(peer, packet, _)| *peer == 1 && *packet == Packet::RoomLeft));

        // Remaining members saw the earliest-joined member inherit the room.
        let new_hosts: Vec<u32> = sent
            .iter()
            .filter_map(|(peer, packet, _)| match packet {
                Packet::RoomState { host_player_id, .. } if *peer != 1 => Some(*host_player_id),
                _ => None,
            })
            .collect();
        assert_eq!(new_hosts, vec![p1, p1]);
        let _ = host;
    }

    #[test]
    fn test_wrong_password_room_error() {
        let mut harness = Harness::new();

        harness.connect(1, "H");
        harness.connect(2, "P1");

        harness.send(
            1,
            Packet::CreateRoom {
                name: "Locked".to_string(),
                password_hash: "cafe".to_string(),
                mode: GameMode::Duo,
                difficulty: Difficulty::Normal,
                map_id: 1,
                max_players: 0,
            },
        );
        harness.tick();
        let room_id = harness
            .sent_to(1)
            .into_iter()
            .find_map(|packet| match packet {
                Packet::RoomCreated { room_id } => Some(room_id),
                _ => None,
            })
            .unwrap();

        harness.send(
            2,
            Packet::JoinRoom {
                room_id,
                password_hash: "wrong".to_string(),
            },
        );
        harness.tick();

        assert!(harness.sent_to(2).contains(&Packet::RoomError {
            code: RoomErrorCode::WrongPassword,
        }));
    }

    #[test]
    fn test_room_list_is_public_only() {
        let mut harness = Harness::new();

        harness.connect(1, "H");
        harness.connect(2, "P1");

        harness.send(
            1,
            Packet::CreateRoom {
                name: "Secret".to_string(),
                password_hash: "cafe".to_string(),
                mode: GameMode::Duo,
                difficulty: Difficulty::Normal,
                map_id: 1,
                max_players: 0,
            },
        );
        harness.send(2, Packet::RequestRoomList);
        harness.tick();

        let lists: Vec<Packet> = harness
            .sent_to(2)
            .into_iter()
            .filter(|packet| packet.packet_type() == PacketType::RoomList)
            .collect();

        assert_eq!(lists, vec![Packet::RoomList { rooms: Vec::new() }]);
    }

    #[test]
    fn test_udp_handshake_and_input_flow() {
        let mut harness = Harness::new();
        let (p1, _, session_id) = harness.start_duo();

        // Handshake from an unassociated address.
        harness.send_udp(
            None,
            5000,
            Packet::UdpHandshake {
                session_id,
                player_id: p1,
            },
        );
        harness.tick();

        assert_eq!(harness.server.transport.associations.len(), 1);
        assert_eq!(harness.server.transport.associations[0].0, 1);

        // Input now reaches the session and is acknowledged in the snapshot.
        harness.sent();
        harness.send_udp(
            Some(1),
            5000,
            Packet::Input {
                player_id: p1,
                flags: crate::components::input_flags::RIGHT,
                sequence: 3,
                timestamp: 0,
            },
        );
        harness.tick();

        let acked = harness
            .sent()
            .into_iter()
            .find_map(|(peer, packet, _)| match packet {
                Packet::Snapshot {
                    last_processed_input,
                    ..
                } if peer == 1 => Some(last_processed_input),
                _ => None,
            })
            .expect("snapshot for player one");
        assert_eq!(acked, 3);
    }

    #[test]
    fn test_input_without_association_dropped() {
        let mut harness = Harness::new();
        let (p1, _, _) = harness.start_duo();

        harness.sent();
        harness.send_udp(
            None,
            5000,
            Packet::Input {
                player_id: p1,
                flags: crate::components::input_flags::RIGHT,
                sequence: 3,
                timestamp: 0,
            },
        );
        harness.tick();

        let acked = harness
            .sent()
            .into_iter()
            .find_map(|(peer, packet, _)| match packet {
                Packet::Snapshot {
                    last_processed_input,
                    ..
                } if peer == 1 => Some(last_processed_input),
                _ => None,
            })
            .expect("snapshot for player one");
        assert_eq!(acked, 0);
    }

    #[test]
    fn test_scenario_disconnect_mid_session() {
        let mut harness = Harness::new();

        let _p1 = harness.connect(1, "A");
        let _p2 = harness.connect(2, "B");
        let _p3 = harness.connect(3, "C");

        for client in 1..=3 {
            harness.send(
                client,
                Packet::JoinLobby {
                    mode: GameMode::Trio,
                    difficulty: Difficulty::Normal,
                },
            );
        }
        harness.tick();
        for _ in 0..6 {
            harness.advance(Duration::from_secs(1));
        }
        harness.sent();

        // The transport watchdog dropped peer one.
        harness.inject(TransportEvent::Disconnected(1));
        harness.tick();

        let sent = harness.sent();

        // An entity destroy was broadcast to the remaining members.
        let destroys = sent
            .iter()
            .filter(|(peer, packet, _)| {
                matches!(packet, Packet::EntityDestroy { .. }) && (*peer == 2 || *peer == 3)
            })
            .count();
        assert_eq!(destroys, 2);

        // No game over: the session continues with two players.
        assert!(!sent
            .iter()
            .any(|(_, packet, _)| matches!(packet, Packet::GameOver { .. })));
        assert_eq!(harness.server.sessions.count(), 1);
    }

    #[test]
    fn test_leave_lobby_cancels_countdown() {
        let mut harness = Harness::new();

        harness.connect(1, "A");
        harness.connect(2, "B");

        for client in 1..=2 {
            harness.send(
                client,
                Packet::JoinLobby {
                    mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                },
            );
        }
        harness.tick();
        harness.sent();

        harness.send(2, Packet::LeaveLobby);
        harness.advance(Duration::from_secs(2));

        // No game start despite the elapsed time.
        for _ in 0..5 {
            harness.advance(Duration::from_secs(1));
        }
        assert!(!harness
            .sent()
            .iter()
            .any(|(_, packet, _)| matches!(packet, Packet::GameStart { .. })));
    }

    #[test]
    fn test_admin_kick() {
        let mut harness = Harness::new();
        let p1 = harness.connect(1, "A");

        let result = harness.server.execute_admin(AdminCommand::Kick {
            player_id: p1,
            reason: "testing".to_string(),
        });

        assert!(result.success);
        assert_eq!(harness.server.transport.disconnected, vec![1]);
        assert_eq!(harness.server.players.len(), 0);

        let result = harness.server.execute_admin(AdminCommand::Kick {
            player_id: 999,
            reason: String::new(),
        });
        assert!(!result.success);
    }

    #[test]
    fn test_admin_pause_resume_and_info() {
        let mut harness = Harness::new();
        harness.start_duo();
        harness.sent();

        assert!(harness.server.execute_admin(AdminCommand::Pause).success);
        harness.tick();
        let paused_sent = harness.sent();
        assert!(!paused_sent
            .iter()
            .any(|(_, packet, _)| matches!(packet, Packet::Snapshot { .. })));

        assert!(harness.server.execute_admin(AdminCommand::Resume).success);
        harness.tick();
        assert!(harness
            .sent()
            .iter()
            .any(|(_, packet, _)| matches!(packet, Packet::Snapshot { .. })));

        let info = harness.server.execute_admin(AdminCommand::Info);
        assert!(info.message.contains("sessions=1"));
    }

    #[test]
    fn test_name_update_broadcast_to_lobby() {
        let mut harness = Harness::new();

        let p1 = harness.connect(1, "A");
        harness.connect(2, "B");

        // Third player makes the DUO lobby stay unfilled: use trio.
        for client in 1..=2 {
            harness.send(
                client,
                Packet::JoinLobby {
                    mode: GameMode::Trio,
                    difficulty: Difficulty::Normal,
                },
            );
        }
        harness.tick();
        harness.sent();

        harness.send(
            1,
            Packet::SetPlayerName {
                name: "Ace".to_string(),
            },
        );
        harness.tick();

        let updates = harness
            .sent()
            .into_iter()
            .filter(|(_, packet, _)| {
                *packet
                    == Packet::PlayerNameUpdated {
                        player_id: p1,
                        name: "Ace".to_string(),
                    }
            })
            .count();

        // Both lobby members heard about it.
        assert_eq!(updates, 2);
    }
}
