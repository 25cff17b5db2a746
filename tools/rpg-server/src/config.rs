//! Environment-driven server configuration.
//!
//! Every knob comes from the environment; invalid values are fatal at
//! startup (non-zero exit). `validate` enforces the relations the rest of
//! the server relies on, e.g. the sweep interval being strictly shorter
//! than the session timeout.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub enable_persistence: bool,
    pub auto_save_interval: Duration,
    pub session_timeout: Duration,
    pub session_cleanup_interval: Duration,
    pub allowed_origins: Vec<String>,
    pub dev_mode: bool,
    pub world_width: i32,
    pub world_height: i32,
    pub world_seed: u64,
    /// Token bucket refill rate, requests per second per session.
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: u32,
    /// Cadence of the game tick loop.
    pub tick_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("./data"),
            enable_persistence: true,
            auto_save_interval: Duration::from_secs(30),
            session_timeout: Duration::from_secs(30 * 60),
            session_cleanup_interval: Duration::from_secs(5 * 60),
            allowed_origins: Vec::new(),
            dev_mode: false,
            world_width: 100,
            world_height: 100,
            world_seed: 0xDEAD_BEEF,
            rate_limit_per_sec: 20.0,
            rate_limit_burst: 40,
            tick_interval: Duration::from_secs(1),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => Ok(Some(v)),
            Err(e) => bail!("invalid {key}={raw:?}: {e}"),
        },
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => bail!("invalid {key}={other:?}: expected a boolean"),
        },
        Err(_) => Ok(None),
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}

impl ServerConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse("SERVER_PORT")? {
            cfg.port = v;
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_bool("ENABLE_PERSISTENCE")? {
            cfg.enable_persistence = v;
        }
        if let Some(v) = env_secs("AUTO_SAVE_INTERVAL")? {
            cfg.auto_save_interval = v;
        }
        if let Some(v) = env_secs("SESSION_TIMEOUT")? {
            cfg.session_timeout = v;
        }
        if let Some(v) = env_secs("SESSION_CLEANUP_INTERVAL")? {
            cfg.session_cleanup_interval = v;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            cfg.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = env_bool("ENABLE_DEV_MODE")? {
            cfg.dev_mode = v;
        }
        if let Some(v) = env_parse("WORLD_WIDTH")? {
            cfg.world_width = v;
        }
        if let Some(v) = env_parse("WORLD_HEIGHT")? {
            cfg.world_height = v;
        }
        if let Some(v) = env_parse("WORLD_SEED")? {
            cfg.world_seed = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_PER_SEC")? {
            cfg.rate_limit_per_sec = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_BURST")? {
            cfg.rate_limit_burst = v;
        }
        if let Some(v) = env_parse::<u64>("TICK_INTERVAL_MS")? {
            cfg.tick_interval = Duration::from_millis(v);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.world_width <= 0 || self.world_height <= 0 {
            bail!(
                "world dimensions must be positive, got {}x{}",
                self.world_width,
                self.world_height
            );
        }
        if self.session_cleanup_interval >= self.session_timeout {
            bail!(
                "SESSION_CLEANUP_INTERVAL ({:?}) must be strictly shorter than SESSION_TIMEOUT ({:?})",
                self.session_cleanup_interval,
                self.session_timeout
            );
        }
        if self.auto_save_interval.is_zero() {
            bail!("AUTO_SAVE_INTERVAL must be non-zero");
        }
        if self.rate_limit_per_sec <= 0.0 || self.rate_limit_burst == 0 {
            bail!("rate limit settings must be positive");
        }
        if !self.dev_mode && self.allowed_origins.is_empty() {
            bail!("ALLOWED_ORIGINS is required outside dev mode");
        }
        self.data_dir
            .to_str()
            .context("DATA_DIR is not valid UTF-8")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_with_dev_mode_validates() {
        let cfg = ServerConfig {
            dev_mode: true,
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn sweep_must_be_shorter_than_timeout() {
        let cfg = ServerConfig {
            dev_mode: true,
            session_timeout: Duration::from_secs(60),
            session_cleanup_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_requires_origins() {
        let cfg = ServerConfig {
            dev_mode: false,
            allowed_origins: Vec::new(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ServerConfig {
            dev_mode: false,
            allowed_origins: vec!["https://game.example.com".into()],
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_world_rejected() {
        let cfg = ServerConfig {
            dev_mode: true,
            world_width: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
