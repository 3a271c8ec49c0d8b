//! Attack session snapshots.
//!
//! Snapshots are explicit versioned value structs; loading validates the
//! schema version and the recorded attack phase instead of round-tripping
//! through untyped maps.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attack::AttackState;
use crate::error::{AttackError, Result};

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One client as persisted in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub mac: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    pub connect_time: DateTime<Utc>,
    #[serde(default)]
    pub disconnect_time: Option<DateTime<Utc>>,
    pub credential_submitted: bool,
    #[serde(default)]
    pub credential_valid: Option<bool>,
}

/// One credential submission as persisted in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialAttempt {
    pub mac: String,
    pub password: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Complete persisted attack state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackSnapshot {
    pub version: u32,

    pub interface_ap: String,
    #[serde(default)]
    pub interface_deauth: Option<String>,
    pub portal_template: String,
    pub deauth_interval_secs: f64,

    pub attack_phase: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub setup_time_secs: Option<f64>,

    pub clients: Vec<ClientSnapshot>,
    pub credential_attempts: Vec<CredentialAttempt>,

    pub total_clients_connected: u32,
    pub total_credential_attempts: u32,
    pub successful_validations: u32,

    #[serde(default)]
    pub captured_password: Option<String>,
    #[serde(default)]
    pub validation_time_secs: f64,
}

impl AttackSnapshot {
    /// Reject snapshots this build cannot interpret.
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(AttackError::external(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        if self.attack_phase.parse::<AttackState>().is_err() {
            return Err(AttackError::external(format!(
                "unknown attack phase in snapshot: {}",
                self.attack_phase
            )));
        }
        Ok(())
    }

    /// A completed or failed attack cannot be resumed.
    pub fn can_resume(&self) -> bool {
        if self.captured_password.is_some() {
            return false;
        }
        !matches!(
            self.attack_phase.parse::<AttackState>(),
            Ok(AttackState::Completed) | Ok(AttackState::Failed) | Err(_)
        )
    }
}

/// Persistence collaborator for attack snapshots.
pub trait SessionStore: Send {
    fn save(&self, snapshot: &AttackSnapshot) -> Result<()>;
    fn load(&self) -> Result<AttackSnapshot>;
}

/// JSON-file backed session store.
pub struct JsonFileSession {
    path: PathBuf,
}

impl JsonFileSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl SessionStore for JsonFileSession {
    fn save(&self, snapshot: &AttackSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(snapshot)
            .map_err(|e| AttackError::external(format!("serialize snapshot: {e}")))?;

        // Write-then-rename so a crash mid-save never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "session snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<AttackSnapshot> {
        let content = std::fs::read_to_string(&self.path)?;
        let snapshot: AttackSnapshot = serde_json::from_str(&content)
            .map_err(|e| AttackError::external(format!("parse snapshot: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> AttackSnapshot {
        AttackSnapshot {
            version: SNAPSHOT_VERSION,
            interface_ap: "wlan0".into(),
            interface_deauth: Some("wlan1".into()),
            portal_template: "generic".into(),
            deauth_interval_secs: 5.0,
            attack_phase: AttackState::Running.to_string(),
            start_time: Some(Utc::now()),
            setup_time_secs: Some(3.2),
            clients: vec![ClientSnapshot {
                mac: "AA:BB:CC:DD:EE:FF".into(),
                ip: Some("192.168.100.10".into()),
                hostname: Some("phone".into()),
                connect_time: Utc::now(),
                disconnect_time: None,
                credential_submitted: true,
                credential_valid: Some(false),
            }],
            credential_attempts: vec![CredentialAttempt {
                mac: "AA:BB:CC:DD:EE:FF".into(),
                password: "wrongpass".into(),
                success: false,
                timestamp: Utc::now(),
            }],
            total_clients_connected: 1,
            total_credential_attempts: 1,
            successful_validations: 0,
            captured_password: None,
            validation_time_secs: 0.0,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSession::new(dir.path().join("session.json"));

        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.interface_ap, "wlan0");
        assert_eq!(loaded.attack_phase, "Running");
        assert_eq!(loaded.clients.len(), 1);
        assert_eq!(loaded.credential_attempts[0].password, "wrongpass");
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSession::new(dir.path().join("session.json"));

        let mut snapshot = sample_snapshot();
        snapshot.version = 99;
        store.save(&snapshot).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_load_rejects_unknown_phase() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSession::new(dir.path().join("session.json"));

        let mut snapshot = sample_snapshot();
        snapshot.attack_phase = "Daydreaming".into();
        store.save(&snapshot).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_load_rejects_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"version": 1, "interface_ap": "wlan0"}"#).unwrap();
        let store = JsonFileSession::new(&path);
        assert!(store.load().is_err());
    }

    #[test]
    fn test_resume_rules() {
        let mut snapshot = sample_snapshot();
        assert!(snapshot.can_resume());

        snapshot.captured_password = Some("found".into());
        assert!(!snapshot.can_resume());

        snapshot.captured_password = None;
        snapshot.attack_phase = AttackState::Failed.to_string();
        assert!(!snapshot.can_resume());

        snapshot.attack_phase = AttackState::Completed.to_string();
        assert!(!snapshot.can_resume());
    }
}
