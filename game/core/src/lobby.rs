use crate::protocol::{Difficulty, GameMode};
use flare::logging;
use hashbrown::HashMap;
use std::time::{Duration, Instant};

pub const COUNTDOWN_SECONDS: u8 = 5;

#[derive(Debug, Eq, PartialEq)]
pub enum LobbyError {
    AlreadyInLobby,
}

#[derive(Debug, Copy, Clone)]
struct Countdown {
    started: Instant,
    last_announced: u8,
}

#[derive(Debug)]
pub struct Lobby {
    pub id: u32,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub players: Vec<u32>,
    pub max_players: u8,
    pub map_id: u16,
    countdown: Option<Countdown>,
}

impl Lobby {
    fn new(id: u32, mode: GameMode, difficulty: Difficulty) -> Lobby {
        Lobby {
            id,
            mode,
            difficulty,
            players: Vec::new(),
            max_players: mode.capacity(),
            map_id: 1,
            countdown: None,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    #[inline]
    pub fn countdown_active(&self) -> bool {
        self.countdown.is_some()
    }
}

/// State changes surfaced to the dispatcher, in the order they occurred.
#[derive(Debug, PartialEq)]
pub enum LobbyEvent {
    State {
        lobby_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        members: Vec<u32>,
        current_players: u8,
        required_players: u8,
    },
    Countdown {
        members: Vec<u32>,
        seconds: u8,
    },
    GameStart {
        lobby_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        members: Vec<u32>,
    },
}

/// Matchmaking: pools players into lobbies keyed by (mode, difficulty),
/// counts down when one fills, and hands full rosters over for session
/// creation. Empty lobbies are destroyed immediately.
pub struct LobbyManager {
    lobbies: HashMap<u32, Lobby>,
    by_player: HashMap<u32, u32>,
    next_id: u32,
    log: logging::Logger,
}

impl LobbyManager {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> LobbyManager {
        let manager_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        LobbyManager {
            lobbies: HashMap::new(),
            by_player: HashMap::new(),
            next_id: 1,
            log: manager_log,
        }
    }

    /// Attach a player to a matching lobby, creating one when none fits.
    /// A full lobby starts its countdown at once.
    pub fn join(
        &mut self,
        player_id: u32,
        mode: GameMode,
        difficulty: Difficulty,
        now: Instant,
    ) -> Result<(u32, Vec<LobbyEvent>), LobbyError> {
        if self.by_player.contains_key(&player_id) {
            return Err(LobbyError::AlreadyInLobby);
        }

        let lobby_id = self
            .lobbies
            .values()
            .find(|lobby| {
                lobby.mode == mode
                    && lobby.difficulty == difficulty
                    && !lobby.is_full()
                    && !lobby.countdown_active()
            })
            .map(|lobby| lobby.id)
            .unwrap_or_else(|| {
                let id = self.next_id;
                self.next_id += 1;

                logging::info!(self.log, "lobby created";
                               "context" => "join",
                               "lobby_id" => id,
                               "mode" => ?mode,
                               "difficulty" => ?difficulty);

                self.lobbies.insert(id, Lobby::new(id, mode, difficulty));
                id
            });

        let mut events = Vec::new();

        {
            let lobby = self.lobbies.get_mut(&lobby_id).expect("lobby exists");
            lobby.players.push(player_id);
            self.by_player.insert(player_id, lobby_id);

            logging::info!(self.log, "player joined lobby";
                           "context" => "join",
                           "lobby_id" => lobby_id,
                           "player_id" => player_id,
                           "current" => lobby.players.len(),
                           "required" => lobby.max_players);

            events.push(state_event(lobby));

            if lobby.is_full() {
                lobby.countdown = Some(Countdown {
                    started: now,
                    last_announced: COUNTDOWN_SECONDS,
                });
                events.push(LobbyEvent::Countdown {
                    members: lobby.players.clone(),
                    seconds: COUNTDOWN_SECONDS,
                });
            }
        }

        Ok((lobby_id, events))
    }

    /// Detach a player. An active countdown is cancelled outright; it will
    /// restart from the top if the lobby refills. Empty lobbies are
    /// destroyed.
    pub fn leave(&mut self, player_id: u32) -> Vec<LobbyEvent> {
        let lobby_id = match self.by_player.remove(&player_id) {
            Some(lobby_id) => lobby_id,
            None => return Vec::new(),
        };

        let mut events = Vec::new();

        let empty = {
            let lobby = match self.lobbies.get_mut(&lobby_id) {
                Some(lobby) => lobby,
                None => return events,
            };

            lobby.players.retain(|&member| member != player_id);
            lobby.countdown = None;

            logging::info!(self.log, "player left lobby";
                           "context" => "leave",
                           "lobby_id" => lobby_id,
                           "player_id" => player_id,
                           "current" => lobby.players.len());

            if !lobby.is_empty() {
                events.push(state_event(lobby));
            }

            lobby.is_empty()
        };

        if empty {
            logging::info!(self.log, "empty lobby destroyed";
                           "context" => "leave",
                           "lobby_id" => lobby_id);
            self.lobbies.remove(&lobby_id);
        }

        events
    }

    /// Advance active countdowns: one announcement per second, and a game
    /// start when a countdown reaches zero. Started lobbies are destroyed.
    pub fn update(&mut self, now: Instant) -> Vec<LobbyEvent> {
        let mut events = Vec::new();
        let mut started = Vec::new();

        for lobby in self.lobbies.values_mut() {
            let countdown = match lobby.countdown.as_mut() {
                Some(countdown) => countdown,
                None => continue,
            };

            let elapsed = now.duration_since(countdown.started);

            if elapsed >= Duration::from_secs(u64::from(COUNTDOWN_SECONDS)) {
                started.push(lobby.id);
                continue;
            }

            let remaining = COUNTDOWN_SECONDS - elapsed.as_secs() as u8;

            if remaining < countdown.last_announced {
                countdown.last_announced = remaining;
                events.push(LobbyEvent::Countdown {
                    members: lobby.players.clone(),
                    seconds: remaining,
                });
            }
        }

        for lobby_id in started {
            let lobby = self.lobbies.remove(&lobby_id).expect("lobby exists");

            for player in lobby.players.iter() {
                self.by_player.remove(player);
            }

            logging::info!(self.log, "lobby countdown finished, starting game";
                           "context" => "update",
                           "lobby_id" => lobby_id);

            events.push(LobbyEvent::GameStart {
                lobby_id,
                mode: lobby.mode,
                difficulty: lobby.difficulty,
                map_id: lobby.map_id,
                members: lobby.players,
            });
        }

        events
    }

    #[inline]
    pub fn lobby_of(&self, player_id: u32) -> Option<u32> {
        self.by_player.get(&player_id).copied()
    }

    pub fn members(&self, lobby_id: u32) -> Vec<u32> {
        self.lobbies
            .get(&lobby_id)
            .map(|lobby| lobby.players.clone())
            .unwrap_or_default()
    }

    #[inline]
    pub fn lobby(&self, lobby_id: u32) -> Option<&Lobby> {
        self.lobbies.get(&lobby_id)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.lobbies.len()
    }
}

fn state_event(lobby: &Lobby) -> LobbyEvent {
    LobbyEvent::State {
        lobby_id: lobby.id,
        mode: lobby.mode,
        difficulty: lobby.difficulty,
        members: lobby.players.clone(),
        current_players: lobby.players.len() as u8,
        required_players: lobby.max_players,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LobbyManager {
        LobbyManager::new(None)
    }

    #[test]
    fn test_join_pools_matching_players() {
        let mut manager = manager();
        let now = Instant::now();

        let (lobby_a, _) = manager
            .join(1, GameMode::Duo, Difficulty::Normal, now)
            .unwrap();
        let (lobby_b, _) = manager
            .join(2, GameMode::Duo, Difficulty::Normal, now)
            .unwrap();

        assert_eq!(lobby_a, lobby_b);
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_mismatched_players_get_separate_lobbies() {
        let mut manager = manager();
        let now = Instant::now();

        let (lobby_a, _) = manager
            .join(1, GameMode::Duo, Difficulty::Normal, now)
            .unwrap();
        let (lobby_b, _) = manager
            .join(2, GameMode::Duo, Difficulty::Hard, now)
            .unwrap();

        assert_ne!(lobby_a, lobby_b);
    }

    #[test]
    fn test_double_join_rejected() {
        let mut manager = manager();
        let now = Instant::now();

        manager.join(1, GameMode::Duo, Difficulty::Normal, now).unwrap();

        assert_eq!(
            manager
                .join(1, GameMode::Trio, Difficulty::Normal, now)
                .unwrap_err(),
            LobbyError::AlreadyInLobby
        );
    }

    #[test]
    fn test_full_lobby_starts_countdown_at_five() {
        let mut manager = manager();
        let now = Instant::now();

        manager.join(1, GameMode::Duo, Difficulty::Normal, now).unwrap();
        let (lobby_id, events) = manager
            .join(2, GameMode::Duo, Difficulty::Normal, now)
            .unwrap();

        assert!(manager.lobby(lobby_id).unwrap().countdown_active());
        assert!(events.contains(&LobbyEvent::Countdown {
            members: vec![1, 2],
            seconds: 5,
        }));
    }

    #[test]
    fn test_countdown_ticks_once_per_second() {
        let mut manager = manager();
        let start = Instant::now();

        manager.join(1, GameMode::Duo, Difficulty::Normal, start).unwrap();
        manager.join(2, GameMode::Duo, Difficulty::Normal, start).unwrap();

        let events = manager.update(start + Duration::from_millis(1100));
        assert_eq!(
            events,
            vec![LobbyEvent::Countdown {
                members: vec![1, 2],
                seconds: 4,
            }]
        );

        // Same second again: no duplicate announcement.
        assert!(manager
            .update(start + Duration::from_millis(1200))
            .is_empty());
    }

    #[test]
    fn test_countdown_reaching_zero_starts_game() {
        let mut manager = manager();
        let start = Instant::now();

        manager.join(1, GameMode::Duo, Difficulty::Normal, start).unwrap();
        manager.join(2, GameMode::Duo, Difficulty::Normal, start).unwrap();

        let events = manager.update(start + Duration::from_secs(5));

        assert_eq!(events.len(), 1);
        match &events[0] {
            LobbyEvent::GameStart { members, mode, .. } => {
                assert_eq!(members, &vec![1, 2]);
                assert_eq!(*mode, GameMode::Duo);
            }
            other => panic!("Expected game start, got {:?}", other),
        }

        // The lobby is gone and its players released.
        assert_eq!(manager.count(), 0);
        assert_eq!(manager.lobby_of(1), None);
    }

    #[test]
    fn test_leave_cancels_countdown_and_restarts_full() {
        let mut manager = manager();
        let start = Instant::now();

        manager.join(1, GameMode::Duo, Difficulty::Normal, start).unwrap();
        let (lobby_id, _) = manager
            .join(2, GameMode::Duo, Difficulty::Normal, start)
            .unwrap();

        // Partway through the countdown a player leaves.
        manager.update(start + Duration::from_secs(2));
        manager.leave(2);

        assert!(!manager.lobby(lobby_id).unwrap().countdown_active());

        // Refilling restarts from five, never resumes.
        let rejoin = start + Duration::from_secs(3);
        let (_, events) = manager
            .join(3, GameMode::Duo, Difficulty::Normal, rejoin)
            .unwrap();

        assert!(events.contains(&LobbyEvent::Countdown {
            members: vec![1, 3],
            seconds: 5,
        }));
    }

    #[test]
    fn test_join_then_leave_restores_prior_state() {
        let mut manager = manager();
        let now = Instant::now();

        manager.join(1, GameMode::Duo, Difficulty::Normal, now).unwrap();

        assert_eq!(manager.count(), 1);

        manager.leave(1);

        assert_eq!(manager.count(), 0);
        assert_eq!(manager.lobby_of(1), None);
    }
}
