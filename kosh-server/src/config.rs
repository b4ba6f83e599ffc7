use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// If true, run against the in-memory store instead of SQLite.
    pub ephemeral: bool,
    /// User ids granted the admin role at startup, in addition to any roles
    /// the identity provider sends per request.
    pub admin_users: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let ephemeral = env::var("EPHEMERAL_STORE")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .context("EPHEMERAL_STORE must be true or false")?;

        let admin_users = env::var("ADMIN_USERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            port,
            state_dir,
            ephemeral,
            admin_users,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join("kosh.db")
    }
}
