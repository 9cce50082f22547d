use crate::session::SessionId;
use hadron::net::ClientId;
use hashbrown::HashMap;

/// Server-side record of a connected player. The transport `client_id` is
/// the reliable-channel identity; `player_id` is the stable application
/// identity handed to the client on accept.
#[derive(Debug, Clone)]
pub struct Player {
    pub client_id: ClientId,
    pub player_id: u32,
    pub name: String,
    pub skin_id: u8,
    pub lobby_id: Option<u32>,
    pub room_id: Option<u32>,
    pub session_id: Option<SessionId>,
    pub udp_associated: bool,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RegisterError {
    DuplicateName,
    AlreadyRegistered,
}

/// The roster of everyone currently connected, indexed both ways. All
/// mutation happens on the tick thread.
pub struct PlayerRegistry {
    players: HashMap<u32, Player>,
    by_client: HashMap<ClientId, u32>,
    next_player_id: u32,
}

impl PlayerRegistry {
    pub fn new() -> PlayerRegistry {
        PlayerRegistry {
            players: HashMap::new(),
            by_client: HashMap::new(),
            next_player_id: 1,
        }
    }

    /// Admit a peer, allocating its stable player id. Names are unique
    /// across the server.
    pub fn register(&mut self, client_id: ClientId, name: &str) -> Result<u32, RegisterError> {
        if self.by_client.contains_key(&client_id) {
            return Err(RegisterError::AlreadyRegistered);
        }

        if self.players.values().any(|player| player.name == name) {
            return Err(RegisterError::DuplicateName);
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        self.players.insert(
            player_id,
            Player {
                client_id,
                player_id,
                name: name.to_string(),
                skin_id: 0,
                lobby_id: None,
                room_id: None,
                session_id: None,
                udp_associated: false,
            },
        );
        self.by_client.insert(client_id, player_id);

        Ok(player_id)
    }

    pub fn remove_client(&mut self, client_id: ClientId) -> Option<Player> {
        let player_id = self.by_client.remove(&client_id)?;
        self.players.remove(&player_id)
    }

    #[inline]
    pub fn get(&self, player_id: u32) -> Option<&Player> {
        self.players.get(&player_id)
    }

    #[inline]
    pub fn get_mut(&mut self, player_id: u32) -> Option<&mut Player> {
        self.players.get_mut(&player_id)
    }

    #[inline]
    pub fn by_client(&self, client_id: ClientId) -> Option<&Player> {
        self.by_client
            .get(&client_id)
            .and_then(|player_id| self.players.get(player_id))
    }

    #[inline]
    pub fn by_client_mut(&mut self, client_id: ClientId) -> Option<&mut Player> {
        let player_id = *self.by_client.get(&client_id)?;
        self.players.get_mut(&player_id)
    }

    #[inline]
    pub fn client_of(&self, player_id: u32) -> Option<ClientId> {
        self.players.get(&player_id).map(|player| player.client_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_distinct_player_ids() {
        let mut registry = PlayerRegistry::new();

        let a = registry.register(10, "A").unwrap();
        let b = registry.register(11, "B").unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.by_client(10).unwrap().name, "A");
        assert_eq!(registry.client_of(b), Some(11));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PlayerRegistry::new();

        registry.register(10, "A").unwrap();

        assert_eq!(
            registry.register(11, "A").unwrap_err(),
            RegisterError::DuplicateName
        );
    }

    #[test]
    fn test_double_register_rejected() {
        let mut registry = PlayerRegistry::new();

        registry.register(10, "A").unwrap();

        assert_eq!(
            registry.register(10, "B").unwrap_err(),
            RegisterError::AlreadyRegistered
        );
    }

    #[test]
    fn test_remove_frees_name() {
        let mut registry = PlayerRegistry::new();

        registry.register(10, "A").unwrap();
        let removed = registry.remove_client(10).unwrap();
        assert_eq!(removed.name, "A");

        // Name is reusable, player ids are not.
        let next = registry.register(11, "A").unwrap();
        assert_eq!(next, 2);
    }
}
