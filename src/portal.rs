//! Captive portal collaborator interface.
//!
//! The portal's HTML and HTTP transport live outside this crate; the core
//! only registers a credential handler with whatever serves the pages.
//! `SpoolPortal` covers the common deployment where the portal process
//! appends submissions to a JSON-lines capture file.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::monitor::LogTail;

/// Invoked for every credential submission; returns whether the credential
/// validated against the real network.
pub type CredentialHandler = Arc<dyn Fn(&str, &str, Option<Ipv4Addr>) -> bool + Send + Sync>;

/// Captive portal collaborator.
pub trait PortalServer: Send {
    /// Start serving and deliver every submission to `handler`.
    fn start(&mut self, handler: CredentialHandler) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SpoolEntry {
    ssid: String,
    password: String,
    #[serde(default)]
    client_ip: Option<Ipv4Addr>,
}

/// Portal adapter that tails the external portal's capture spool.
///
/// Each line is one JSON object: `{"ssid": "...", "password": "...",
/// "client_ip": "192.168.100.10"}`.
pub struct SpoolPortal {
    spool_path: PathBuf,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SpoolPortal {
    pub fn new(spool_path: impl Into<PathBuf>) -> Self {
        Self {
            spool_path: spool_path.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl PortalServer for SpoolPortal {
    fn start(&mut self, handler: CredentialHandler) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Ensure the spool exists so the tail starts at offset zero even if
        // the portal process comes up later.
        if let Some(parent) = self.spool_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !self.spool_path.exists() {
            std::fs::write(&self.spool_path, "")?;
        }

        let running = Arc::clone(&self.running);
        let mut tail = LogTail::new(&self.spool_path);
        let spool = self.spool_path.clone();

        self.handle = Some(thread::spawn(move || {
            tracing::debug!(spool = %spool.display(), "portal spool watcher started");
            while running.load(Ordering::Relaxed) {
                if let Ok(lines) = tail.poll() {
                    for line in lines {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<SpoolEntry>(line) {
                            Ok(entry) => {
                                let accepted =
                                    handler(&entry.ssid, &entry.password, entry.client_ip);
                                tracing::debug!(
                                    ssid = %entry.ssid,
                                    client_ip = ?entry.client_ip,
                                    accepted,
                                    "portal submission processed"
                                );
                            }
                            Err(err) => {
                                tracing::warn!(%err, "unparseable portal spool line");
                            }
                        }
                    }
                }
                thread::sleep(Duration::from_millis(500));
            }
            tracing::debug!("portal spool watcher stopped");
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for SpoolPortal {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn test_spool_submissions_reach_handler() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("portal_creds.jsonl");

        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let handler: CredentialHandler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |ssid, password, _ip| {
                seen.lock().unwrap().push((ssid.to_string(), password.to_string()));
                password == "rightpass"
            })
        };

        let mut portal = SpoolPortal::new(&spool);
        portal.start(handler).unwrap();

        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&spool).unwrap();
            writeln!(
                file,
                r#"{{"ssid": "HomeNetwork", "password": "wrongpass", "client_ip": "192.168.100.10"}}"#
            )
            .unwrap();
            writeln!(file, "not json at all").unwrap();
            writeln!(file, r#"{{"ssid": "HomeNetwork", "password": "rightpass"}}"#).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        portal.stop().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, "wrongpass");
        assert_eq!(seen[1].1, "rightpass");
    }
}
