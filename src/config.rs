//! Process configuration shared by the binaries

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;

/// `INTAKE_PORT` and `INTAKE_DB_PATH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("INTAKE_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let db_path = lookup("INTAKE_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(
                || {
                    let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".vehicle-intake").join("sessions.db")
                },
                PathBuf::from,
            );
        Self { port, db_path }
    }
}
