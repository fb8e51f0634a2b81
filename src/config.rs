//! `key=value` server configuration with documented defaults. The config
//! path comes from argv[1] and defaults to `server.cfg`; a missing file
//! just means defaults.

use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "server.cfg";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_ip: String,
    pub port: u16,
    pub debug_log: bool,
    pub log_file: String,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            port: 8969,
            debug_log: false,
            log_file: "server.log".to_string(),
            data_dir: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(format!("read {} failed: {}", path.display(), err)),
        };
        Self::parse(&raw).map_err(|err| format!("{}: {}", path.display(), err))
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let mut config = Self::default();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("line {}: expected key=value, got \"{}\"", index + 1, line));
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "BIND_IP" => config.bind_ip = value.to_string(),
                "PORT" => {
                    config.port = value.parse().map_err(|_| {
                        format!("line {}: PORT must be a number, got \"{}\"", index + 1, value)
                    })?;
                }
                "DEBUG_LOG" => config.debug_log = value == "1",
                "LOG_FILE" => config.log_file = value.to_string(),
                "DATA_DIR" => config.data_dir = PathBuf::from(value),
                other => {
                    // unknown keys are tolerated so configs can travel
                    // between server versions
                    eprintln!("petri: ignoring unknown config key \"{}\"", other);
                }
            }
        }
        Ok(config)
    }
}
