use crate::session::SessionId;
use std::io::BufRead;
use std::sync::mpsc;
use std::thread;

/// Parsed admin console command.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Help,
    List,
    Kick { player_id: u32, reason: String },
    Info,
    Pause,
    Resume,
    ClearEnemies { session_id: Option<SessionId> },
}

/// Outcome of an executed command, echoed back on the console.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    pub fn ok<S: Into<String>>(message: S) -> CommandResult {
        CommandResult {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail<S: Into<String>>(message: S) -> CommandResult {
        CommandResult {
            success: false,
            message: message.into(),
        }
    }
}

pub const HELP_TEXT: &str = "Available admin commands:\n\
  help                 - Show this help\n\
  list                 - List connected players\n\
  kick <player_id> [reason] - Kick a player\n\
  info                 - Server statistics\n\
  pause                - Pause all game sessions\n\
  resume               - Resume all game sessions\n\
  clearenemies [sid]   - Clear enemies (session id optional)";

/// Parse one console line. A leading slash is tolerated, command names are
/// case-insensitive.
pub fn parse(line: &str) -> Result<AdminCommand, CommandResult> {
    let mut tokens = line.split_whitespace();

    let command = match tokens.next() {
        Some(token) => token.trim_start_matches('/').to_ascii_lowercase(),
        None => return Err(CommandResult::fail("Empty command")),
    };

    let args: Vec<&str> = tokens.collect();

    match command.as_str() {
        "help" => Ok(AdminCommand::Help),
        "list" => Ok(AdminCommand::List),
        "info" => Ok(AdminCommand::Info),
        "pause" => Ok(AdminCommand::Pause),
        "resume" => Ok(AdminCommand::Resume),
        "kick" => {
            let player_id = args
                .first()
                .ok_or_else(|| CommandResult::fail("Usage: kick <player_id> [reason]"))?
                .parse::<u32>()
                .map_err(|_| CommandResult::fail(format!("Invalid player id: {}", args[0])))?;

            let reason = if args.len() > 1 {
                args[1..].join(" ")
            } else {
                "Kicked by admin".to_string()
            };

            Ok(AdminCommand::Kick { player_id, reason })
        }
        "clearenemies" => {
            let session_id = match args.first() {
                Some(raw) => Some(raw.parse::<SessionId>().map_err(|_| {
                    CommandResult::fail(format!("Invalid session id: {}", raw))
                })?),
                None => None,
            };

            Ok(AdminCommand::ClearEnemies { session_id })
        }
        unknown => Err(CommandResult::fail(format!(
            "Unknown command: {}. Type 'help' for available commands.",
            unknown
        ))),
    }
}

/// Local admin console fed from the server's stdin. The reader thread hands
/// lines to the tick thread through a queue; commands never touch server
/// state from the console thread.
pub struct AdminConsole {
    lines: mpsc::Receiver<String>,
}

impl AdminConsole {
    pub fn spawn_stdin() -> AdminConsole {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("admin-console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(line) => {
                            if !line.trim().is_empty() && tx.send(line).is_err() {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
            })
            .expect("Failed to spawn the admin console thread");

        AdminConsole { lines: rx }
    }

    /// Drain console input received since the last tick.
    pub fn drain(&self) -> Vec<String> {
        self.lines.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("help").unwrap(), AdminCommand::Help);
        assert_eq!(parse("LIST").unwrap(), AdminCommand::List);
        assert_eq!(parse("/info").unwrap(), AdminCommand::Info);
        assert_eq!(parse("pause").unwrap(), AdminCommand::Pause);
        assert_eq!(parse("resume").unwrap(), AdminCommand::Resume);
    }

    #[test]
    fn test_parse_kick() {
        assert_eq!(
            parse("kick 7").unwrap(),
            AdminCommand::Kick {
                player_id: 7,
                reason: "Kicked by admin".to_string(),
            }
        );
        assert_eq!(
            parse("kick 7 spamming the lobby").unwrap(),
            AdminCommand::Kick {
                player_id: 7,
                reason: "spamming the lobby".to_string(),
            }
        );
        assert!(!parse("kick").unwrap_err().success);
        assert!(!parse("kick seven").unwrap_err().success);
    }

    #[test]
    fn test_parse_clearenemies() {
        assert_eq!(
            parse("clearenemies").unwrap(),
            AdminCommand::ClearEnemies { session_id: None }
        );
        assert_eq!(
            parse("clearenemies 3").unwrap(),
            AdminCommand::ClearEnemies {
                session_id: Some(3)
            }
        );
    }

    #[test]
    fn test_parse_unknown() {
        let result = parse("teleport 1").unwrap_err();

        assert!(!result.success);
        assert!(result.message.contains("Unknown command"));
    }
}
