use crate::lobby::COUNTDOWN_SECONDS;
use crate::protocol::{Difficulty, GameMode, RoomErrorCode, RoomInfo, RoomStatus};
use flare::logging;
use hashbrown::HashMap;
use std::time::{Duration, Instant};

/// Room ids are allocated from a range disjoint from matchmaking lobby ids.
pub const ROOM_ID_BASE: u32 = 0x4000_0000;

#[derive(Debug, Copy, Clone)]
struct Countdown {
    started: Instant,
    last_announced: u8,
}

/// A custom game room: a lobby created explicitly by a host, optionally
/// password protected. The host is always one of the players.
#[derive(Debug)]
pub struct Room {
    pub id: u32,
    pub name: String,
    pub password_hash: String,
    pub host_player_id: u32,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub map_id: u16,
    pub max_players: u8,
    pub status: RoomStatus,
    /// Join order; the earliest joined member inherits the host role.
    pub players: Vec<u32>,
    countdown: Option<Countdown>,
}

impl Room {
    #[inline]
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    #[inline]
    pub fn is_private(&self) -> bool {
        !self.password_hash.is_empty()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id,
            name: self.name.clone(),
            mode: self.mode,
            difficulty: self.difficulty,
            current_players: self.players.len() as u8,
            max_players: self.max_players,
            is_private: self.is_private(),
            status: self.status,
            map_id: self.map_id,
        }
    }
}

/// Room lifecycle changes surfaced to the dispatcher in production order.
#[derive(Debug, PartialEq)]
pub enum RoomEvent {
    State {
        room_id: u32,
        host_player_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        members: Vec<u32>,
        current_players: u8,
        max_players: u8,
        status: RoomStatus,
    },
    Countdown {
        members: Vec<u32>,
        seconds: u8,
    },
    GameStart {
        room_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        members: Vec<u32>,
    },
}

pub struct CreateRoomParams {
    pub name: String,
    pub password_hash: String,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub map_id: u16,
    pub max_players: u8,
}

/// Manages custom rooms: creation, password-checked joins, host transfer,
/// host-triggered countdown and cleanup of empty rooms.
pub struct RoomManager {
    rooms: HashMap<u32, Room>,
    by_player: HashMap<u32, u32>,
    next_id: u32,
    log: logging::Logger,
}

impl RoomManager {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> RoomManager {
        let manager_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        RoomManager {
            rooms: HashMap::new(),
            by_player: HashMap::new(),
            next_id: ROOM_ID_BASE + 1,
            log: manager_log,
        }
    }

    /// Create a room with the requester as host and first member. An empty
    /// name is substituted with `Room #<id>`.
    pub fn create(
        &mut self,
        host_player_id: u32,
        params: CreateRoomParams,
    ) -> Result<(u32, Vec<RoomEvent>), RoomErrorCode> {
        if self.by_player.contains_key(&host_player_id) {
            return Err(RoomErrorCode::AlreadyInRoom);
        }

        let id = self.next_id;
        self.next_id += 1;

        let name = if params.name.is_empty() {
            format!("Room #{}", id - ROOM_ID_BASE)
        } else {
            params.name
        };

        let max_players = if params.max_players == 0 {
            params.mode.capacity()
        } else {
            params.max_players.min(params.mode.capacity())
        };

        let room = Room {
            id,
            name,
            password_hash: params.password_hash,
            host_player_id,
            mode: params.mode,
            difficulty: params.difficulty,
            map_id: params.map_id,
            max_players,
            status: RoomStatus::Waiting,
            players: vec![host_player_id],
            countdown: None,
        };

        logging::info!(self.log, "room created";
                       "context" => "create",
                       "room_id" => id,
                       "name" => %room.name,
                       "host" => host_player_id,
                       "private" => room.is_private());

        let events = vec![state_event(&room)];
        self.rooms.insert(id, room);
        self.by_player.insert(host_player_id, id);

        Ok((id, events))
    }

    /// Join an existing room, checking password, capacity and progress.
    pub fn join(
        &mut self,
        player_id: u32,
        room_id: u32,
        password_hash: &str,
    ) -> Result<Vec<RoomEvent>, RoomErrorCode> {
        if self.by_player.contains_key(&player_id) {
            return Err(RoomErrorCode::AlreadyInRoom);
        }

        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomErrorCode::RoomNotFound)?;

        if room.status == RoomStatus::InProgress {
            return Err(RoomErrorCode::RoomInProgress);
        }

        if room.is_full() {
            return Err(RoomErrorCode::RoomFull);
        }

        if room.is_private() && room.password_hash != password_hash {
            return Err(RoomErrorCode::WrongPassword);
        }

        room.players.push(player_id);
        self.by_player.insert(player_id, room_id);

        logging::info!(self.log, "player joined room";
                       "context" => "join",
                       "room_id" => room_id,
                       "player_id" => player_id,
                       "current" => room.players.len());

        Ok(vec![state_event(room)])
    }

    /// Remove a player from their room. A departing host hands the role to
    /// the earliest-joined remaining member; a countdown in progress is
    /// cancelled. Empty rooms are destroyed on the next update cycle.
    pub fn leave(&mut self, player_id: u32) -> Vec<RoomEvent> {
        let room_id = match self.by_player.remove(&player_id) {
            Some(room_id) => room_id,
            None => return Vec::new(),
        };

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Vec::new(),
        };

        room.players.retain(|&member| member != player_id);

        if room.countdown.is_some() {
            room.countdown = None;
            room.status = RoomStatus::Waiting;
        }

        if room.players.is_empty() {
            // Cleanup happens in update(); nobody is left to notify.
            return Vec::new();
        }

        if room.host_player_id == player_id {
            room.host_player_id = room.players[0];

            logging::info!(self.log, "host transferred";
                           "context" => "leave",
                           "room_id" => room_id,
                           "new_host" => room.host_player_id);
        }

        vec![state_event(room)]
    }

    /// Host-only game start. Needs at least one player and a room not
    /// already counting down or running.
    pub fn start(
        &mut self,
        room_id: u32,
        requester_id: u32,
        now: Instant,
    ) -> Result<Vec<RoomEvent>, RoomErrorCode> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomErrorCode::RoomNotFound)?;

        if room.host_player_id != requester_id {
            return Err(RoomErrorCode::NotHost);
        }

        if room.status != RoomStatus::Waiting || room.players.is_empty() {
            return Err(RoomErrorCode::RoomInProgress);
        }

        room.status = RoomStatus::Countdown;
        room.countdown = Some(Countdown {
            started: now,
            last_announced: COUNTDOWN_SECONDS,
        });

        logging::info!(self.log, "room countdown started";
                       "context" => "start",
                       "room_id" => room_id);

        Ok(vec![
            state_event(room),
            RoomEvent::Countdown {
                members: room.players.clone(),
                seconds: COUNTDOWN_SECONDS,
            },
        ])
    }

    /// Advance countdowns and destroy rooms that emptied out.
    pub fn update(&mut self, now: Instant) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        let mut started = Vec::new();
        let mut emptied = Vec::new();

        for room in self.rooms.values_mut() {
            if room.players.is_empty() {
                emptied.push(room.id);
                continue;
            }

            let countdown = match room.countdown.as_mut() {
                Some(countdown) => countdown,
                None => continue,
            };

            let elapsed = now.duration_since(countdown.started);

            if elapsed >= Duration::from_secs(u64::from(COUNTDOWN_SECONDS)) {
                started.push(room.id);
                continue;
            }

            let remaining = COUNTDOWN_SECONDS - elapsed.as_secs() as u8;

            if remaining < countdown.last_announced {
                countdown.last_announced = remaining;
                events.push(RoomEvent::Countdown {
                    members: room.players.clone(),
                    seconds: remaining,
                });
            }
        }

        for room_id in emptied {
            logging::info!(self.log, "empty room destroyed";
                           "context" => "update",
                           "room_id" => room_id);
            self.rooms.remove(&room_id);
        }

        for room_id in started {
            let mut room = self.rooms.remove(&room_id).expect("room exists");
            room.status = RoomStatus::InProgress;

            for player in room.players.iter() {
                self.by_player.remove(player);
            }

            logging::info!(self.log, "room countdown finished, starting game";
                           "context" => "update",
                           "room_id" => room_id);

            events.push(RoomEvent::GameStart {
                room_id,
                mode: room.mode,
                difficulty: room.difficulty,
                map_id: room.map_id,
                members: room.players,
            });
        }

        events
    }

    /// Public, waiting rooms only; private and running rooms are invisible.
    pub fn public_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self
            .rooms
            .values()
            .filter(|room| room.status == RoomStatus::Waiting && !room.is_private())
            .map(Room::info)
            .collect();

        rooms.sort_by_key(|info| info.room_id);
        rooms
    }

    #[inline]
    pub fn room_of(&self, player_id: u32) -> Option<u32> {
        self.by_player.get(&player_id).copied()
    }

    #[inline]
    pub fn room(&self, room_id: u32) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn members(&self, room_id: u32) -> Vec<u32> {
        self.rooms
            .get(&room_id)
            .map(|room| room.players.clone())
            .unwrap_or_default()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}

fn state_event(room: &Room) -> RoomEvent {
    RoomEvent::State {
        room_id: room.id,
        host_player_id: room.host_player_id,
        mode: room.mode,
        difficulty: room.difficulty,
        members: room.players.clone(),
        current_players: room.players.len() as u8,
        max_players: room.max_players,
        status: room.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str, password: &str) -> CreateRoomParams {
        CreateRoomParams {
            name: name.to_string(),
            password_hash: password.to_string(),
            mode: GameMode::Squad,
            difficulty: Difficulty::Normal,
            map_id: 1,
            max_players: 0,
        }
    }

    fn manager() -> RoomManager {
        RoomManager::new(None)
    }

    #[test]
    fn test_create_host_auto_joins() {
        let mut manager = manager();

        let (room_id, _) = manager.create(1, params("Alpha", "")).unwrap();

        let room = manager.room(room_id).unwrap();
        assert_eq!(room.host_player_id, 1);
        assert_eq!(room.players, vec![1]);
        assert_eq!(manager.room_of(1), Some(room_id));
        assert!(room_id > ROOM_ID_BASE);
    }

    #[test]
    fn test_empty_name_substituted() {
        let mut manager = manager();

        let (room_id, _) = manager.create(1, params("", "")).unwrap();

        assert_eq!(manager.room(room_id).unwrap().name, "Room #1");
    }

    #[test]
    fn test_join_errors() {
        let mut manager = manager();

        let (room_id, _) = manager.create(1, params("Locked", "cafe")).unwrap();

        assert_eq!(
            manager.join(2, 999, "").unwrap_err(),
            RoomErrorCode::RoomNotFound
        );
        assert_eq!(
            manager.join(2, room_id, "wrong").unwrap_err(),
            RoomErrorCode::WrongPassword
        );

        manager.join(2, room_id, "cafe").unwrap();
        manager.join(3, room_id, "cafe").unwrap();
        manager.join(4, room_id, "cafe").unwrap();

        assert_eq!(
            manager.join(5, room_id, "cafe").unwrap_err(),
            RoomErrorCode::RoomFull
        );
    }

    #[test]
    fn test_only_host_starts() {
        let mut manager = manager();
        let now = Instant::now();

        let (room_id, _) = manager.create(1, params("Alpha", "")).unwrap();
        manager.join(2, room_id, "").unwrap();

        assert_eq!(
            manager.start(room_id, 2, now).unwrap_err(),
            RoomErrorCode::NotHost
        );

        let events = manager.start(room_id, 1, now).unwrap();
        assert!(events.iter().any(|event| match event {
            RoomEvent::Countdown { seconds: 5, .. } => true,
            _ => false,
        }));

        // Starting twice is refused.
        assert_eq!(
            manager.start(room_id, 1, now).unwrap_err(),
            RoomErrorCode::RoomInProgress
        );
    }

    #[test]
    fn test_countdown_start_flow() {
        let mut manager = manager();
        let start = Instant::now();

        let (room_id, _) = manager.create(1, params("Alpha", "")).unwrap();
        manager.join(2, room_id, "").unwrap();
        manager.start(room_id, 1, start).unwrap();

        let events = manager.update(start + Duration::from_secs(5));

        assert_eq!(events.len(), 1);
        match &events[0] {
            RoomEvent::GameStart { members, .. } => assert_eq!(members, &vec![1, 2]),
            other => panic!("Expected game start, got {:?}", other),
        }

        assert_eq!(manager.count(), 0);
        assert_eq!(manager.room_of(1), None);
    }

    #[test]
    fn test_host_transfer_to_earliest_joined() {
        let mut manager = manager();

        let (room_id, _) = manager.create(1, params("Alpha", "")).unwrap();
        manager.join(2, room_id, "").unwrap();
        manager.join(3, room_id, "").unwrap();

        let events = manager.leave(1);

        assert_eq!(manager.room(room_id).unwrap().host_player_id, 2);
        match &events[0] {
            RoomEvent::State {
                host_player_id,
                members,
                ..
            } => {
                assert_eq!(*host_player_id, 2);
                assert_eq!(members, &vec![2, 3]);
            }
            other => panic!("Expected state event, got {:?}", other),
        }
    }

    #[test]
    fn test_leave_cancels_countdown() {
        let mut manager = manager();
        let now = Instant::now();

        let (room_id, _) = manager.create(1, params("Alpha", "")).unwrap();
        manager.join(2, room_id, "").unwrap();
        manager.start(room_id, 1, now).unwrap();

        manager.leave(2);

        let room = manager.room(room_id).unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(room.countdown.is_none());
    }

    #[test]
    fn test_empty_room_destroyed_on_update() {
        let mut manager = manager();

        let (room_id, _) = manager.create(1, params("Alpha", "")).unwrap();
        manager.leave(1);

        assert!(manager.room(room_id).is_some());

        manager.update(Instant::now());

        assert!(manager.room(room_id).is_none());
    }

    #[test]
    fn test_public_listing_hides_private_and_running() {
        let mut manager = manager();
        let now = Instant::now();

        manager.create(1, params("Open", "")).unwrap();
        manager.create(2, params("Hidden", "cafe")).unwrap();
        let (running_id, _) = manager.create(3, params("Running", "")).unwrap();
        manager.start(running_id, 3, now).unwrap();

        let listing = manager.public_rooms();

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "Open");
    }
}
