#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod admin;
pub mod components;
pub mod config;
pub mod leaderboard;
pub mod lobby;
pub mod players;
pub mod protocol;
pub mod rooms;
pub mod server;
pub mod session;
pub mod systems;
