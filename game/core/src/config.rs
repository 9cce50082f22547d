use crate::protocol::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use crate::session::SessionKind;
use serde_derive::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Serialize, Deserialize, Clone)]
pub struct Server {
    pub tcp_port: u16,
    pub udp_port: u16,
    pub bind_all: bool,
    pub max_clients: u16,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Game {
    pub fps: u64,
    pub map_width: f32,
    pub map_height: f32,
    pub scroll_speed: f32,
    /// Which game this server hosts: "shooter" or "blob".
    pub kind: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Leaderboard {
    pub path: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Log {
    pub level: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct GameConfig {
    pub server: Server,
    pub game: Game,
    pub leaderboard: Leaderboard,
    pub log: Log,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            server: Server {
                tcp_port: DEFAULT_TCP_PORT,
                udp_port: DEFAULT_UDP_PORT,
                bind_all: false,
                max_clients: 32,
            },
            game: Game {
                fps: 20,
                map_width: 1920.0,
                map_height: 1080.0,
                scroll_speed: 40.0,
                kind: "shooter".to_string(),
            },
            leaderboard: Leaderboard {
                path: "data/global_leaderboard.json".to_string(),
            },
            log: Log {
                level: "info".to_string(),
            },
        }
    }
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> GameConfig {
        serdeconv::from_toml_file(path).expect("Error loading game configuration file")
    }

    /// Environment overrides recognized on top of the file.
    pub fn apply_env(&mut self) {
        if env::var("RTYPE_BIND_ALL").map(|v| v == "1").unwrap_or(false) {
            self.server.bind_all = true;
        }
    }

    /// The session kind implied by the `[game]` section. Unknown values
    /// fall back to the shooter.
    pub fn session_kind(&self) -> SessionKind {
        match self.game.kind.as_str() {
            "blob" => SessionKind::Blob,
            _ => SessionKind::Shooter,
        }
    }

    fn bind_host(&self) -> &'static str {
        if self.server.bind_all {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.bind_host(), self.server.tcp_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.bind_host(), self.server.udp_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports_match_protocol() {
        let config = GameConfig::default();

        assert_eq!(config.server.tcp_port, 4242);
        assert_eq!(config.server.udp_port, 4243);
        assert_eq!(config.tcp_addr(), "127.0.0.1:4242");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = GameConfig::default();

        let toml = serdeconv::to_toml_string(&config).unwrap();
        let back: GameConfig = serdeconv::from_toml_str(&toml).unwrap();

        assert_eq!(back.server.tcp_port, config.server.tcp_port);
        assert_eq!(back.game.fps, config.game.fps);
        assert_eq!(back.leaderboard.path, config.leaderboard.path);
    }

    #[test]
    fn test_bind_all_addr() {
        let mut config = GameConfig::default();
        config.server.bind_all = true;

        assert_eq!(config.tcp_addr(), "0.0.0.0:4242");
    }

    #[test]
    fn test_session_kind_mapping() {
        let mut config = GameConfig::default();
        assert_eq!(config.session_kind(), SessionKind::Shooter);

        config.game.kind = "blob".to_string();
        assert_eq!(config.session_kind(), SessionKind::Blob);

        config.game.kind = "pinball".to_string();
        assert_eq!(config.session_kind(), SessionKind::Shooter);
    }
}
