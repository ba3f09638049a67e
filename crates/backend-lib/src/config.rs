// ============================
// debate-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::auth::session::MAX_SESSION_TTL;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "debate.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Period of the moderator-update broadcast
    pub broadcast_interval_ms: u64,
    /// Debate length used when a create request names none
    pub default_debate_duration_secs: u64,
    /// Session TTL in seconds
    pub session_ttl_secs: u64,
    /// How often expired sessions are swept
    pub session_cleanup_interval_secs: u64,
    /// Cookie carrying the browser session identity
    pub session_cookie: String,
    /// Outbound queue capacity per connection
    pub outbound_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            broadcast_interval_ms: 200,
            default_debate_duration_secs: 300,
            session_ttl_secs: 60 * 60 * 24 * 7, // 1 week
            session_cleanup_interval_secs: 60 * 60,
            session_cookie: "debate.sid".to_string(),
            outbound_buffer: 64,
        }
    }
}

impl Settings {
    /// Load settings from defaults, `debate.toml` and `DEBATE_*` env vars
    pub fn load() -> Result<Self> {
        Self::figment(Toml::file(DEFAULT_CONFIG_FILE))
    }

    /// Load settings with an explicit TOML file instead of `debate.toml`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        Self::figment(Toml::file(path))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(file)
            .merge(Env::prefixed("DEBATE_"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        if self.broadcast_interval_ms == 0 {
            bail!("broadcast_interval_ms must be greater than zero");
        }
        if self.default_debate_duration_secs == 0 {
            bail!("default_debate_duration_secs must be greater than zero");
        }
        if self.session_ttl_secs == 0 {
            bail!("session_ttl_secs must be greater than zero");
        }
        if self.session_ttl() > MAX_SESSION_TTL {
            bail!(
                "session_ttl_secs must be at most {}",
                MAX_SESSION_TTL.as_secs()
            );
        }
        if self.session_cleanup_interval_secs == 0 {
            bail!("session_cleanup_interval_secs must be greater than zero");
        }
        if self.session_cookie.trim().is_empty() {
            bail!("session_cookie must not be empty");
        }
        if self.outbound_buffer == 0 {
            bail!("outbound_buffer must be greater than zero");
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn default_debate_duration(&self) -> Duration {
        Duration::from_secs(self.default_debate_duration_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.broadcast_interval(), Duration::from_millis(200));
        assert_eq!(settings.session_ttl(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_settings_validation() {
        let settings = Settings::default();

        let mut invalid = settings.clone();
        invalid.log_level = "loud".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.broadcast_interval_ms = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.session_ttl_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.session_ttl_secs = u64::MAX;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.session_cookie = "  ".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = settings;
        invalid.outbound_buffer = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "broadcast_interval_ms = 50").unwrap();
        writeln!(file, "session_cookie = \"sid\"").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.broadcast_interval_ms, 50);
        assert_eq!(settings.session_cookie, "sid");
        assert_eq!(settings.default_debate_duration_secs, 300);
    }

    #[test]
    fn test_load_from_rejects_invalid_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "broadcast_interval_ms = 0").unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        assert!(Settings::load_from("/definitely/not/here/debate.toml").is_err());
    }
}
