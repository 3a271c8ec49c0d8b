//! Attack configuration and settings
//!
//! One `AttackConfig` is constructed at process start (CLI flags or a JSON
//! file) and passed by reference into the orchestrator. Nothing else in the
//! crate reads configuration from any other source.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AttackError, Result};

/// How to react when a conflicting service (NetworkManager, wpa_supplicant,
/// another hostapd/dnsmasq) is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Abort setup with `ConflictingProcess`
    Fail,
    /// Kill the conflicting processes and continue
    Kill,
    /// Log a warning and continue anyway
    Ignore,
}

/// Complete attack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Interface that hosts the rogue AP
    pub ap_interface: String,

    /// Interface for deauth injection (monitor mode); None reuses the AP
    /// interface and disables simultaneous deauth
    pub deauth_interface: Option<String>,

    /// Gateway/portal IP served to clients
    pub gateway_ip: Ipv4Addr,

    /// First address handed out by the DHCP daemon
    pub dhcp_range_start: Ipv4Addr,

    /// Last address handed out by the DHCP daemon
    pub dhcp_range_end: Ipv4Addr,

    /// Overall attack timeout in seconds (0 = unbounded)
    pub attack_timeout_secs: u64,

    /// Portal template name recorded in snapshots
    pub portal_template: String,

    /// Directory for generated daemon configs and log spools
    pub conf_dir: PathBuf,

    /// Base directory for per-run loot output
    pub loot_dir: PathBuf,

    /// Seconds between session snapshot saves
    pub session_save_interval_secs: u64,

    /// What to do about conflicting services found before setup
    pub conflict_policy: ConflictPolicy,

    /// The operator has confirmed authorization for this engagement.
    /// Attacks refuse to start while this is false.
    pub authorized: bool,

    pub deauth: DeauthSettings,
    pub validator: ValidatorSettings,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            ap_interface: "wlan0".to_string(),
            deauth_interface: None,
            gateway_ip: Ipv4Addr::new(192, 168, 100, 1),
            dhcp_range_start: Ipv4Addr::new(192, 168, 100, 10),
            dhcp_range_end: Ipv4Addr::new(192, 168, 100, 100),
            attack_timeout_secs: 0,
            portal_template: "generic".to_string(),
            conf_dir: PathBuf::from("/tmp/twintrap"),
            loot_dir: PathBuf::from("loot"),
            session_save_interval_secs: 30,
            conflict_policy: ConflictPolicy::Fail,
            authorized: false,
            deauth: DeauthSettings::default(),
            validator: ValidatorSettings::default(),
        }
    }
}

impl AttackConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AttackError::external(format!("failed to read config: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| AttackError::external(format!("failed to parse config: {e}")))
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AttackError::external(format!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| AttackError::external(format!("failed to write config: {e}")))?;
        Ok(())
    }

    pub fn attack_timeout(&self) -> Option<Duration> {
        if self.attack_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.attack_timeout_secs))
        }
    }

    pub fn session_save_interval(&self) -> Duration {
        Duration::from_secs(self.session_save_interval_secs.max(1))
    }
}

/// Adaptive deauthentication tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeauthSettings {
    /// Base interval between deauth bursts in seconds
    pub base_interval_secs: f64,
    /// Interval floor while clients are actively biting
    pub min_interval_secs: f64,
    /// Interval ceiling when no activity is observed
    pub max_interval_secs: f64,
}

impl Default for DeauthSettings {
    fn default() -> Self {
        Self {
            base_interval_secs: 5.0,
            min_interval_secs: 2.0,
            max_interval_secs: 15.0,
        }
    }
}

impl DeauthSettings {
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs_f64(self.base_interval_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_secs)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs_f64(self.max_interval_secs)
    }
}

/// Credential validation and anti-lockout tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Minimum seconds between validation attempts (before backoff)
    pub min_interval_secs: f64,
    /// Per-validation timeout in seconds
    pub timeout_secs: u64,
    /// Failed attempts before the lockout fires
    pub lockout_threshold: u32,
    /// Lockout duration in seconds
    pub lockout_duration_secs: u64,
    /// Backoff multiplier cap
    pub max_backoff_multiplier: f64,
    /// Cache entry time-to-live in seconds
    pub cache_ttl_secs: u64,
    /// Maximum cached verdicts before eviction
    pub max_cache_size: usize,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 1.5,
            timeout_secs: 30,
            lockout_threshold: 10,
            lockout_duration_secs: 300,
            max_backoff_multiplier: 16.0,
            cache_ttl_secs: 300,
            max_cache_size: 100,
        }
    }
}

impl ValidatorSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AttackConfig::default();
        assert_eq!(config.gateway_ip, Ipv4Addr::new(192, 168, 100, 1));
        assert!(config.attack_timeout().is_none());
        assert!(!config.authorized);
        assert_eq!(config.deauth.base_interval(), Duration::from_secs(5));
        assert_eq!(config.validator.lockout_threshold, 10);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AttackConfig::default();
        config.ap_interface = "wlan1".to_string();
        config.attack_timeout_secs = 600;
        config.conflict_policy = ConflictPolicy::Kill;
        config.save(&path).unwrap();

        let loaded = AttackConfig::load(&path).unwrap();
        assert_eq!(loaded.ap_interface, "wlan1");
        assert_eq!(loaded.attack_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(loaded.conflict_policy, ConflictPolicy::Kill);
    }
}
