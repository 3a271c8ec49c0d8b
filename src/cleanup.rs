//! Resource cleanup for attack teardown.
//!
//! Everything the attack creates is registered here during setup; one
//! `cleanup_all` pass drains every registry in a fixed order and a failed
//! step never blocks the rest. The pass is idempotent.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::process::{kill_pid, pgrep_exact, pgrep_pattern, run_cmd};

/// Capability interface implemented by every managed resource wrapper.
/// Daemon wrappers stop gracefully; raw children escalate interrupt→kill.
pub trait Teardown {
    fn stop(&mut self) -> Result<()>;
}

/// Saved state for restoring an interface after the attack.
#[derive(Debug, Clone)]
pub struct InterfaceState {
    /// Mode to restore ("managed" or "monitor"); an interface that was in
    /// AP mode goes back to managed.
    pub mode: String,
    /// Whether the interface was up before we touched it
    pub was_up: bool,
}

impl Default for InterfaceState {
    fn default() -> Self {
        Self {
            mode: "managed".to_string(),
            was_up: true,
        }
    }
}

/// A firewall rule added during setup, recorded for deletion.
#[derive(Debug, Clone)]
pub struct FirewallRule {
    pub table: String,
    pub chain: String,
    pub rule: Vec<String>,
}

/// Write-then-drain teardown registries.
#[derive(Default)]
pub struct CleanupManager {
    processes: Vec<(String, Box<dyn Teardown + Send>)>,
    firewall_rules: Vec<FirewallRule>,
    ip_forwarding_changed: bool,
    interfaces: Vec<(String, InterfaceState)>,
    temp_files: BTreeSet<PathBuf>,
    errors: Vec<String>,
    drained: bool,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_process(&mut self, name: &str, process: Box<dyn Teardown + Send>) {
        tracing::debug!(name, "registered process for cleanup");
        self.processes.push((name.to_string(), process));
        self.drained = false;
    }

    pub fn register_temp_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.temp_files.insert(path.clone()) {
            tracing::debug!(path = %path.display(), "registered temp file for cleanup");
        }
        self.drained = false;
    }

    pub fn register_interface(&mut self, interface: &str, original: InterfaceState) {
        tracing::debug!(interface, "registered interface for restoration");
        self.interfaces.push((interface.to_string(), original));
        self.drained = false;
    }

    pub fn register_firewall_rule(&mut self, table: &str, chain: &str, rule: &[&str]) {
        tracing::debug!(table, chain, "registered firewall rule for removal");
        self.firewall_rules.push(FirewallRule {
            table: table.to_string(),
            chain: chain.to_string(),
            rule: rule.iter().map(|s| s.to_string()).collect(),
        });
        self.drained = false;
    }

    /// Note that IP forwarding was enabled and must be turned back off.
    pub fn register_ip_forwarding(&mut self) {
        self.ip_forwarding_changed = true;
        self.drained = false;
    }

    /// Stop one process, converting a failure into a recorded error.
    fn stop_process(&mut self, name: &str, process: &mut (dyn Teardown + Send)) {
        tracing::debug!(name, "stopping");
        match process.stop() {
            Ok(()) => tracing::info!(name, "stopped"),
            Err(err) => {
                tracing::error!(name, %err, "failed to stop");
                self.errors.push(format!("{name}: {err}"));
            }
        }
    }

    fn remove_temp_file(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed temp file"),
            Err(err) => {
                tracing::error!(path = %path.display(), %err, "failed to remove temp file");
                self.errors.push(format!("file {}: {err}", path.display()));
            }
        }
    }

    fn remove_firewall_rule(&mut self, rule: &FirewallRule) {
        let mut args: Vec<&str> = vec!["-t", &rule.table, "-D", &rule.chain];
        args.extend(rule.rule.iter().map(|s| s.as_str()));
        // A missing rule is fine; it may already be gone.
        if let Err(err) = run_cmd("iptables", &args) {
            tracing::debug!(table = %rule.table, chain = %rule.chain, %err, "firewall rule not removed (may not exist)");
        } else {
            tracing::info!(table = %rule.table, chain = %rule.chain, "removed firewall rule");
        }
    }

    fn disable_ip_forwarding(&mut self) {
        if let Err(err) = std::fs::write("/proc/sys/net/ipv4/ip_forward", "0\n") {
            tracing::warn!(%err, "failed to disable IP forwarding");
            self.errors.push(format!("ip_forward: {err}"));
        } else {
            tracing::info!("disabled IP forwarding");
        }
    }

    fn restore_interface(&mut self, interface: &str, original: &InterfaceState) {
        tracing::debug!(interface, "restoring interface");
        let result = (|| -> Result<()> {
            run_cmd("ip", &["link", "set", interface, "down"])?;
            run_cmd("ip", &["addr", "flush", "dev", interface])?;

            let mode = if original.mode == "AP" {
                "managed"
            } else {
                original.mode.as_str()
            };
            if mode == "monitor" {
                run_cmd("iw", &[interface, "set", "monitor", "control"])?;
            } else {
                run_cmd("iw", &[interface, "set", "type", mode])?;
            }

            if original.was_up {
                run_cmd("ip", &["link", "set", interface, "up"])?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => tracing::info!(interface, "restored interface"),
            Err(err) => {
                tracing::error!(interface, %err, "failed to restore interface");
                self.errors.push(format!("interface {interface}: {err}"));
            }
        }
    }

    /// Drain every registry exactly once, in dependency order: processes
    /// before the interfaces they hold, firewall and forwarding before
    /// interface restoration, temp files last. Per-item errors are
    /// aggregated, never raised.
    pub fn cleanup_all(&mut self) -> Vec<String> {
        if self.drained {
            return self.errors.clone();
        }
        self.drained = true;
        self.errors.clear();

        tracing::info!(
            processes = self.processes.len(),
            rules = self.firewall_rules.len(),
            interfaces = self.interfaces.len(),
            temp_files = self.temp_files.len(),
            "starting cleanup"
        );

        let mut processes = std::mem::take(&mut self.processes);
        for (name, process) in processes.iter_mut() {
            let name = name.clone();
            self.stop_process(&name, process.as_mut());
        }

        for rule in std::mem::take(&mut self.firewall_rules) {
            self.remove_firewall_rule(&rule);
        }

        if std::mem::take(&mut self.ip_forwarding_changed) {
            self.disable_ip_forwarding();
        }

        for (interface, original) in std::mem::take(&mut self.interfaces) {
            self.restore_interface(&interface, &original);
        }

        for path in std::mem::take(&mut self.temp_files) {
            self.remove_temp_file(&path);
        }

        if self.errors.is_empty() {
            tracing::info!("cleanup complete");
        } else {
            tracing::warn!(errors = self.errors.len(), "cleanup completed with errors");
        }
        self.errors.clone()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Command-line patterns left behind by a previous attack run.
const ORPHAN_PATTERNS: &[(&str, &str)] = &[
    ("hostapd", "hostapd.*twintrap"),
    ("dnsmasq", "dnsmasq.*twintrap"),
    ("wpa_supplicant", "wpa_supplicant.*twintrap"),
];

/// Services that interfere with a rogue AP on the same radio.
const CONFLICT_NAMES: &[&str] = &["NetworkManager", "wpa_supplicant", "hostapd", "dnsmasq"];

/// Find and kill leftovers from a previous interrupted run. Returns the
/// (name, pid) pairs that were killed.
pub fn kill_orphaned_processes() -> Vec<(String, i32)> {
    let mut killed = Vec::new();
    for (name, pattern) in ORPHAN_PATTERNS {
        for pid in pgrep_pattern(pattern) {
            match kill_pid(pid) {
                Ok(()) => {
                    tracing::info!(%name, pid, "killed orphaned process");
                    killed.push((name.to_string(), pid));
                }
                Err(err) => tracing::warn!(%name, pid, %err, "failed to kill orphaned process"),
            }
        }
    }
    if killed.is_empty() {
        tracing::debug!("no orphaned processes found");
    }
    killed
}

/// Processes that may conflict with the attack, as (name, pid) pairs.
pub fn check_conflicting_processes() -> Vec<(String, i32)> {
    let mut conflicting = Vec::new();
    for name in CONFLICT_NAMES {
        for pid in pgrep_exact(name) {
            conflicting.push((name.to_string(), pid));
        }
    }
    if !conflicting.is_empty() {
        tracing::warn!(count = conflicting.len(), "found conflicting processes");
    }
    conflicting
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttackError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubResource {
        stops: Arc<AtomicU32>,
        fail: bool,
    }

    impl Teardown for StubResource {
        fn stop(&mut self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AttackError::external("refused to die"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_failed_stop_does_not_block_temp_file_removal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("attack.conf");
        std::fs::write(&file, "x").unwrap();

        let stops = Arc::new(AtomicU32::new(0));
        let mut manager = CleanupManager::new();
        manager.register_process(
            "bad-daemon",
            Box::new(StubResource {
                stops: Arc::clone(&stops),
                fail: true,
            }),
        );
        manager.register_temp_file(&file);

        let errors = manager.cleanup_all();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("bad-daemon"));
        assert!(!file.exists(), "temp file must still be removed");
    }

    #[test]
    fn test_second_cleanup_pass_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("attack.conf");
        std::fs::write(&file, "x").unwrap();

        let stops = Arc::new(AtomicU32::new(0));
        let mut manager = CleanupManager::new();
        manager.register_process(
            "daemon",
            Box::new(StubResource {
                stops: Arc::clone(&stops),
                fail: true,
            }),
        );
        manager.register_temp_file(&file);

        let first = manager.cleanup_all();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), 1);

        // Recreate the file; a second pass must not touch it or the process.
        std::fs::write(&file, "x").unwrap();
        let second = manager.cleanup_all();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(second, first);
        assert!(file.exists());
    }

    #[test]
    fn test_temp_file_registration_deduplicates() {
        let mut manager = CleanupManager::new();
        manager.register_temp_file("/tmp/twintrap/same.conf");
        manager.register_temp_file("/tmp/twintrap/same.conf");
        assert_eq!(manager.temp_files.len(), 1);
    }

    #[test]
    fn test_missing_temp_file_is_not_an_error() {
        let mut manager = CleanupManager::new();
        manager.register_temp_file("/tmp/twintrap/never-existed.conf");
        let errors = manager.cleanup_all();
        assert!(errors.is_empty());
    }

    #[test]
    fn test_registration_after_cleanup_reopens_registries() {
        let stops = Arc::new(AtomicU32::new(0));
        let mut manager = CleanupManager::new();
        assert!(manager.cleanup_all().is_empty());

        manager.register_process(
            "late-daemon",
            Box::new(StubResource {
                stops: Arc::clone(&stops),
                fail: false,
            }),
        );
        manager.cleanup_all();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
