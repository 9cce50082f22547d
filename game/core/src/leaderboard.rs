use crate::protocol::LeaderboardEntry;
use flare::logging;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MAX_ENTRIES: usize = 10;

#[derive(Serialize, Deserialize, Clone, Debug)]
struct EntryRecord {
    player_name: String,
    best_score: u32,
    timestamp: u32,
}

#[derive(Serialize, Deserialize, Default)]
struct LeaderboardFile {
    leaderboard: Vec<EntryRecord>,
}

/// All-time top ten, persisted as JSON. The file is rewritten in full on
/// every change through a temp file and rename, so a crash never leaves a
/// half-written leaderboard. Write failures keep the in-memory state; the
/// next successful add persists it.
pub struct GlobalLeaderboard {
    path: PathBuf,
    entries: Mutex<Vec<EntryRecord>>,
    log: logging::Logger,
}

impl GlobalLeaderboard {
    /// Load the leaderboard, starting empty when the file is missing or
    /// unreadable.
    pub fn load<'a, P, L>(path: P, log: L) -> GlobalLeaderboard
    where
        P: AsRef<Path>,
        L: Into<Option<&'a logging::Logger>>,
    {
        let board_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let path = path.as_ref().to_path_buf();

        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<LeaderboardFile>(&bytes) {
                Ok(file) => file.leaderboard,
                Err(err) => {
                    logging::warn!(board_log, "leaderboard file unreadable, starting fresh";
                                   "context" => "load",
                                   "error" => %err);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        let board = GlobalLeaderboard {
            path,
            entries: Mutex::new(entries),
            log: board_log,
        };

        board.normalize();
        board
    }

    /// Record a score. Scores at or below the floor of a full board change
    /// nothing. A player improving an existing entry keeps one row. Returns
    /// true when the board changed.
    pub fn add_score(&self, name: &str, score: u32) -> bool {
        let changed = {
            let mut entries = self.entries.lock().expect("leaderboard mutex poisoned");

            let existing = entries.iter_mut().find(|entry| entry.player_name == name);

            let changed = match existing {
                Some(entry) => {
                    if score <= entry.best_score {
                        false
                    } else {
                        entry.best_score = score;
                        entry.timestamp = now_secs();
                        true
                    }
                }
                None => {
                    let floor = if entries.len() >= MAX_ENTRIES {
                        entries.last().map(|entry| entry.best_score).unwrap_or(0)
                    } else {
                        0
                    };

                    if entries.len() >= MAX_ENTRIES && score <= floor {
                        false
                    } else {
                        entries.push(EntryRecord {
                            player_name: name.to_string(),
                            best_score: score,
                            timestamp: now_secs(),
                        });
                        true
                    }
                }
            };

            if changed {
                entries.sort_by(|a, b| b.best_score.cmp(&a.best_score));
                entries.truncate(MAX_ENTRIES);
            }

            changed
        };

        if changed {
            self.save();
        }

        changed
    }

    /// Current standings as wire entries, best first.
    pub fn entries(&self) -> Vec<LeaderboardEntry> {
        self.entries
            .lock()
            .expect("leaderboard mutex poisoned")
            .iter()
            .map(|entry| LeaderboardEntry {
                name: entry.player_name.clone(),
                score: entry.best_score,
                timestamp: entry.timestamp,
            })
            .collect()
    }

    fn normalize(&self) {
        let mut entries = self.entries.lock().expect("leaderboard mutex poisoned");
        entries.sort_by(|a, b| b.best_score.cmp(&a.best_score));
        entries.truncate(MAX_ENTRIES);
    }

    fn save(&self) {
        let file = {
            let entries = self.entries.lock().expect("leaderboard mutex poisoned");
            LeaderboardFile {
                leaderboard: entries.clone(),
            }
        };

        if let Err(err) = self.write_atomic(&file) {
            logging::warn!(self.log, "leaderboard write failed, keeping memory state";
                           "context" => "save",
                           "error" => %err);
        }
    }

    fn write_atomic(&self, file: &LeaderboardFile) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)
    }
}

fn now_secs() -> u32 {
    chrono::Utc::now().timestamp() as u32
}
