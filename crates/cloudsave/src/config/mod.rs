use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Environment variable that overrides the token stored in the settings
/// file. Loaded through dotenv by the binary, so a `.env` next to the
/// settings file works too.
pub const TOKEN_ENV: &str = "CLOUDSAVE_TOKEN";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GameEntry {
    pub path: PathBuf,
    #[serde(rename = "backupPath")]
    pub backup_path: PathBuf,
}

/// Settings are assembled once (by the CLI wizard or loaded from disk) and
/// passed into the engine read-only. The engine never mutates them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub games: BTreeMap<String, GameEntry>,
}

/// A single registered game as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProfile {
    pub name: String,
    pub path: PathBuf,
    pub backup_path: PathBuf,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::new(
                ErrorKind::Config,
                format!("failed to read settings file {}: {e}", path.display()),
            )
        })?;
        serde_json::from_str::<Settings>(&raw).map_err(|e| {
            Error::new(
                ErrorKind::Config,
                format!("failed to parse settings file {}: {e}", path.display()),
            )
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| Error::new(ErrorKind::Config, format!("failed to encode settings: {e}")))?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::new(
                    ErrorKind::Config,
                    format!("failed to create {}: {e}", parent.display()),
                )
            })?;
        }
        fs::write(path, body).map_err(|e| {
            Error::new(
                ErrorKind::Config,
                format!("failed to write settings file {}: {e}", path.display()),
            )
        })
    }

    /// The auth token, preferring the environment over the settings file.
    pub fn token(&self) -> Result<String> {
        self.token_with_override(std::env::var(TOKEN_ENV).ok())
    }

    /// Precedence: a non-blank override (the environment variable) wins
    /// over the settings file's `auth`.
    fn token_with_override(&self, env_token: Option<String>) -> Result<String> {
        if let Some(v) = env_token {
            let v = v.trim().to_string();
            if !v.is_empty() {
                return Ok(v);
            }
        }
        let v = self.auth.trim().to_string();
        if v.is_empty() {
            return Err(Error::new(
                ErrorKind::Config,
                format!("no auth token configured (set 'auth' in settings or {TOKEN_ENV})"),
            ));
        }
        Ok(v)
    }

    pub fn profile(&self, name: &str) -> Option<GameProfile> {
        self.games.get(name).map(|g| GameProfile {
            name: name.to_string(),
            path: g.path.clone(),
            backup_path: g.backup_path.clone(),
        })
    }

    pub fn game_names(&self) -> Vec<String> {
        self.games.keys().cloned().collect()
    }

    pub fn add_game(&mut self, profile: GameProfile) -> Result<()> {
        let name = profile.name.trim();
        if name.is_empty() {
            return Err(Error::new(ErrorKind::Config, "game name is empty"));
        }
        if self.games.contains_key(name) {
            return Err(Error::new(
                ErrorKind::Config,
                format!("game '{name}' is already registered"),
            ));
        }
        self.games.insert(
            name.to_string(),
            GameEntry {
                path: profile.path,
                backup_path: profile.backup_path,
            },
        );
        Ok(())
    }
}
