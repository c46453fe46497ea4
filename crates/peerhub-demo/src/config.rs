//! Demo configuration
//!
//! Loaded from the JSON file named by `PEERHUB_CONFIG` when set, otherwise
//! from defaults. `PEERHUB_DISCIPLINE`, `PEERHUB_LISTEN` and
//! `PEERHUB_LOG_FORMAT` override the file.

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use peerhub_broadcast::BroadcasterConfig;
use peerhub_server::LockstepConfig;
use peerhub_transport::NetPeerConfig;

pub const CONFIG_ENV: &str = "PEERHUB_CONFIG";

/// How the room sees client messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    EventDriven,
    Fifo,
    Lockstep,
}

impl FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "event" | "event_driven" | "event-driven" => Ok(Discipline::EventDriven),
            "fifo" => Ok(Discipline::Fifo),
            "lockstep" => Ok(Discipline::Lockstep),
            other => Err(format!("unknown discipline: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub discipline: Discipline,
    pub listen: SocketAddr,
    pub log_format: LogFormat,
    /// Echo room traffic to stdout and broadcast lines typed on stdin
    pub console: bool,
    /// Append room traffic to this file, one line per message
    pub journal_path: Option<PathBuf>,
    /// Broadcast every line appended to this file
    pub follow_path: Option<PathBuf>,
    /// Broadcast a heartbeat this often; 0 disables
    pub heartbeat_ms: u64,
    pub lockstep: LockstepConfig,
    pub broadcaster: BroadcasterConfig,
    pub net: NetPeerConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            discipline: Discipline::EventDriven,
            listen: SocketAddr::from(([127, 0, 0, 1], 7070)),
            log_format: LogFormat::Pretty,
            console: false,
            journal_path: None,
            follow_path: None,
            heartbeat_ms: 0,
            lockstep: LockstepConfig::default(),
            broadcaster: BroadcasterConfig::default(),
            net: NetPeerConfig::default(),
        }
    }
}

impl DemoConfig {
    /// File (if any), then environment overrides
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn apply_env(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), Box<dyn Error>> {
        if let Some(value) = var("PEERHUB_DISCIPLINE") {
            self.discipline = value.parse()?;
        }
        if let Some(value) = var("PEERHUB_LISTEN") {
            self.listen = value.parse()?;
        }
        if let Some(value) = var("PEERHUB_LOG_FORMAT") {
            self.log_format = value.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let text = r#"{
            "discipline": "lockstep",
            "lockstep": {"step_length_ms": 20},
            "heartbeat_ms": 500
        }"#;
        std::fs::write(&path, text).unwrap();

        let config = DemoConfig::from_file(&path).unwrap();
        assert_eq!(config.discipline, Discipline::Lockstep);
        assert_eq!(config.lockstep.step_length_ms, 20);
        let defaults = LockstepConfig::default();
        assert_eq!(config.lockstep.max_step_length_ms, defaults.max_step_length_ms);
        assert_eq!(config.heartbeat_ms, 500);
        assert_eq!(config.listen, DemoConfig::default().listen);
        assert_eq!(config.net, NetPeerConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PEERHUB_DISCIPLINE", "FIFO"),
            ("PEERHUB_LISTEN", "0.0.0.0:9000"),
            ("PEERHUB_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = DemoConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.discipline, Discipline::Fifo);
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = DemoConfig::default();
        let err = config
            .apply_env(|key| (key == "PEERHUB_DISCIPLINE").then(|| "round_robin".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown discipline: round_robin");
        assert_eq!(config.discipline, Discipline::EventDriven);
    }
}
