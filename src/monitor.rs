//! Live client presence monitoring.
//!
//! A background thread tails the AP daemon and DHCP daemon logs by byte
//! offset, turning appended lines into connect/disconnect/DHCP events. Each
//! event type is matched against an ordered list of dialects so differing
//! daemon versions keep working; adding a dialect is one more matcher.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// How long disconnected clients stay in the table before the sweep drops
/// them.
const CLIENT_RETENTION: Duration = Duration::from_secs(3600);

/// Poll cadence for both log streams.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A client seen on the rogue AP.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub mac: String,
    pub ip: Option<Ipv4Addr>,
    pub hostname: Option<String>,
    pub connect_time: DateTime<Utc>,
    pub disconnect_time: Option<DateTime<Utc>>,
    pub credential_submitted: bool,
    pub credential_valid: Option<bool>,
    pub last_seen: DateTime<Utc>,
}

impl ClientConnection {
    fn new(mac: String) -> Self {
        let now = Utc::now();
        Self {
            mac,
            ip: None,
            hostname: None,
            connect_time: now,
            disconnect_time: None,
            credential_submitted: false,
            credential_valid: None,
            last_seen: now,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.disconnect_time.is_none()
    }

    pub fn connection_duration(&self) -> Duration {
        let end = self.disconnect_time.unwrap_or_else(Utc::now);
        (end - self.connect_time).to_std().unwrap_or_default()
    }
}

/// Attack-wide counters owned by the monitor. All counts are monotonic
/// except `currently_connected`; the clock freezes when the monitor stops.
#[derive(Debug, Clone)]
pub struct AttackStatistics {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    pub total_clients_connected: u32,
    pub unique_clients: HashSet<String>,
    pub currently_connected: u32,

    pub total_credential_attempts: u32,
    pub successful_attempts: u32,
    pub failed_attempts: u32,

    pub first_client_time: Option<DateTime<Utc>>,
    pub first_credential_time: Option<DateTime<Utc>>,
    pub success_time: Option<DateTime<Utc>>,
}

impl Default for AttackStatistics {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            total_clients_connected: 0,
            unique_clients: HashSet::new(),
            currently_connected: 0,
            total_credential_attempts: 0,
            successful_attempts: 0,
            failed_attempts: 0,
            first_client_time: None,
            first_credential_time: None,
            success_time: None,
        }
    }
}

impl AttackStatistics {
    fn record_client_connect(&mut self, mac: &str) {
        self.total_clients_connected += 1;
        self.unique_clients.insert(mac.to_ascii_uppercase());
        self.currently_connected += 1;
        if self.first_client_time.is_none() {
            self.first_client_time = Some(Utc::now());
        }
    }

    fn record_client_disconnect(&mut self) {
        if self.currently_connected > 0 {
            self.currently_connected -= 1;
        }
    }

    pub(crate) fn record_credential_attempt(&mut self, success: bool) {
        self.total_credential_attempts += 1;
        if success {
            self.successful_attempts += 1;
            if self.success_time.is_none() {
                self.success_time = Some(Utc::now());
            }
        } else {
            self.failed_attempts += 1;
        }
        if self.first_credential_time.is_none() {
            self.first_credential_time = Some(Utc::now());
        }
    }

    pub fn unique_client_count(&self) -> usize {
        self.unique_clients.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_credential_attempts == 0 {
            return 0.0;
        }
        self.successful_attempts as f64 / self.total_credential_attempts as f64 * 100.0
    }

    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    pub fn time_to_first_client(&self) -> Option<Duration> {
        self.first_client_time
            .map(|t| (t - self.start_time).to_std().unwrap_or_default())
    }

    pub fn time_to_success(&self) -> Option<Duration> {
        self.success_time
            .map(|t| (t - self.start_time).to_std().unwrap_or_default())
    }

    fn mark_complete(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }
}

/// Incremental tail over an append-only log file.
///
/// Keeps a byte offset so each poll parses only newly appended data; a file
/// that shrank (rotation/truncation) resets the offset to zero. A trailing
/// partial line is buffered until its newline arrives.
pub struct LogTail {
    path: PathBuf,
    offset: u64,
    pending: String,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            pending: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines appended since the last poll.
    pub fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let len = std::fs::metadata(&self.path)?.len();

        if len < self.offset {
            tracing::debug!(path = %self.path.display(), "log file shrank, resetting tail offset");
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;

        let mut text = std::mem::take(&mut self.pending);
        text.push_str(&String::from_utf8_lossy(&buf));

        let mut lines = Vec::new();
        for piece in text.split_inclusive('\n') {
            if piece.ends_with('\n') {
                lines.push(piece.trim_end_matches(['\n', '\r']).to_string());
            } else {
                self.pending = piece.to_string();
            }
        }
        Ok(lines)
    }
}

/// Parsed client event from either log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Connect { mac: String },
    Disconnect { mac: String },
    DhcpAck {
        mac: String,
        ip: Ipv4Addr,
        hostname: Option<String>,
    },
}

enum ApEventKind {
    Connect,
    Disconnect,
}

struct ApMatcher {
    pattern: Regex,
    kind: ApEventKind,
}

// Ordered dialect list for the AP daemon log. The wpa_ctrl event lines come
// first; the verbose association messages cover older daemon versions.
static AP_MATCHERS: Lazy<Vec<ApMatcher>> = Lazy::new(|| {
    vec![
        ApMatcher {
            pattern: Regex::new(r"AP-STA-CONNECTED\s+([0-9a-fA-F:]{17})").unwrap(),
            kind: ApEventKind::Connect,
        },
        ApMatcher {
            pattern: Regex::new(r"AP-STA-DISCONNECTED\s+([0-9a-fA-F:]{17})").unwrap(),
            kind: ApEventKind::Disconnect,
        },
        ApMatcher {
            pattern: Regex::new(r"(?i)([0-9a-fA-F:]{17})[^\n]*?\sassociated\s+\(aid\s+\d+\)")
                .unwrap(),
            kind: ApEventKind::Connect,
        },
        ApMatcher {
            pattern: Regex::new(r"(?i)([0-9a-fA-F:]{17})[^\n]*?\sdisassociated").unwrap(),
            kind: ApEventKind::Disconnect,
        },
    ]
});

// DHCPACK(iface) IP MAC [HOSTNAME] — hostname is optional.
static DHCP_ACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"DHCPACK\([^)]+\)\s+(\d+\.\d+\.\d+\.\d+)\s+([0-9a-fA-F:]{17})(?:\s+(\S.*))?")
        .unwrap()
});

/// Match an AP daemon log line against the dialect list.
pub fn parse_ap_line(line: &str) -> Option<LogEvent> {
    for matcher in AP_MATCHERS.iter() {
        if let Some(caps) = matcher.pattern.captures(line) {
            let mac = caps[1].to_ascii_uppercase();
            return Some(match matcher.kind {
                ApEventKind::Connect => LogEvent::Connect { mac },
                ApEventKind::Disconnect => LogEvent::Disconnect { mac },
            });
        }
    }
    None
}

/// Match a DHCP daemon log line.
pub fn parse_dhcp_line(line: &str) -> Option<LogEvent> {
    let caps = DHCP_ACK.captures(line)?;
    let ip: Ipv4Addr = caps[1].parse().ok()?;
    let mac = caps[2].to_ascii_uppercase();
    let hostname = caps.get(3).map(|m| m.as_str().trim().to_string());
    Some(LogEvent::DhcpAck { mac, ip, hostname })
}

pub type ClientCallback = Arc<dyn Fn(&ClientConnection) + Send + Sync>;

#[derive(Clone, Default)]
struct Callbacks {
    on_connect: Option<ClientCallback>,
    on_disconnect: Option<ClientCallback>,
    on_dhcp: Option<ClientCallback>,
}

#[derive(Default)]
struct MonitorState {
    clients: HashMap<String, ClientConnection>,
    statistics: AttackStatistics,
}

/// Event dispatch and table maintenance, shared between the monitor thread
/// and the accessors. One mutex guards the table and the statistics
/// together; callbacks fire only after that mutex is released.
struct MonitorCore {
    state: Mutex<MonitorState>,
    callbacks: Callbacks,
}

impl MonitorCore {
    fn dispatch(&self, event: LogEvent) {
        match event {
            LogEvent::Connect { mac } => self.handle_connect(&mac),
            LogEvent::Disconnect { mac } => self.handle_disconnect(&mac),
            LogEvent::DhcpAck { mac, ip, hostname } => self.handle_dhcp(&mac, ip, hostname),
        }
    }

    fn handle_connect(&self, mac: &str) {
        let notify = {
            let mut state = self.state.lock().unwrap();
            match state.clients.get_mut(mac) {
                Some(existing) if existing.is_connected() => {
                    // Duplicate associate message: refresh, no event.
                    existing.last_seen = Utc::now();
                    None
                }
                _ => {
                    let client = ClientConnection::new(mac.to_string());
                    state.clients.insert(mac.to_string(), client.clone());
                    state.statistics.record_client_connect(mac);
                    Some(client)
                }
            }
        };

        if let Some(client) = notify {
            tracing::info!(mac = %client.mac, "client connected");
            if let Some(cb) = &self.callbacks.on_connect {
                cb(&client);
            }
        }
    }

    fn handle_disconnect(&self, mac: &str) {
        let notify = {
            let mut state = self.state.lock().unwrap();
            match state.clients.get_mut(mac) {
                Some(client) if client.is_connected() => {
                    client.disconnect_time = Some(Utc::now());
                    let snapshot = client.clone();
                    state.statistics.record_client_disconnect();
                    Some(snapshot)
                }
                _ => None,
            }
        };

        if let Some(client) = notify {
            tracing::info!(
                mac = %client.mac,
                connected_secs = client.connection_duration().as_secs_f64(),
                "client disconnected"
            );
            if let Some(cb) = &self.callbacks.on_disconnect {
                cb(&client);
            }
        }
    }

    fn handle_dhcp(&self, mac: &str, ip: Ipv4Addr, hostname: Option<String>) {
        let notify = {
            let mut state = self.state.lock().unwrap();
            // DHCP events never create client records; the AP log owns the
            // connect lifecycle.
            state.clients.get_mut(mac).map(|client| {
                client.ip = Some(ip);
                client.hostname = hostname;
                client.last_seen = Utc::now();
                client.clone()
            })
        };

        if let Some(client) = notify {
            tracing::info!(mac = %client.mac, ip = %ip, hostname = ?client.hostname, "client lease");
            if let Some(cb) = &self.callbacks.on_dhcp {
                cb(&client);
            }
        }
    }

    fn sweep(&self, retention: Duration) {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        state.clients.retain(|_, client| match client.disconnect_time {
            Some(at) => {
                let age = (now - at).to_std().unwrap_or_default();
                age <= retention
            }
            None => true,
        });
    }
}

/// Background monitor over the two daemon log streams.
pub struct ClientMonitor {
    ap_log: PathBuf,
    dhcp_log: PathBuf,
    retention: Duration,
    core: Arc<MonitorCore>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    callbacks: Callbacks,
}

impl ClientMonitor {
    pub fn new(ap_log: impl Into<PathBuf>, dhcp_log: impl Into<PathBuf>) -> Self {
        Self {
            ap_log: ap_log.into(),
            dhcp_log: dhcp_log.into(),
            retention: CLIENT_RETENTION,
            core: Arc::new(MonitorCore {
                state: Mutex::new(MonitorState::default()),
                callbacks: Callbacks::default(),
            }),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            callbacks: Callbacks::default(),
        }
    }

    #[cfg(test)]
    fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Register the connect callback. Must be called before `start`.
    pub fn on_client_connect(&mut self, cb: ClientCallback) {
        self.callbacks.on_connect = Some(cb);
    }

    pub fn on_client_disconnect(&mut self, cb: ClientCallback) {
        self.callbacks.on_disconnect = Some(cb);
    }

    pub fn on_client_dhcp(&mut self, cb: ClientCallback) {
        self.callbacks.on_dhcp = Some(cb);
    }

    /// Start the monitoring thread. Callback registration is frozen here.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("client monitor already running");
            return;
        }

        // Rebuild the core so callbacks registered since construction are
        // visible to the thread; existing state carries over.
        let state = {
            let mut old = self.core.state.lock().unwrap();
            std::mem::take(&mut *old)
        };
        self.core = Arc::new(MonitorCore {
            state: Mutex::new(state),
            callbacks: self.callbacks.clone(),
        });

        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let retention = self.retention;
        let mut ap_tail = LogTail::new(&self.ap_log);
        let mut dhcp_tail = LogTail::new(&self.dhcp_log);

        *self.handle.lock().unwrap() = Some(thread::spawn(move || {
            tracing::debug!("client monitor loop started");
            while running.load(Ordering::Relaxed) {
                if let Ok(lines) = ap_tail.poll() {
                    for line in lines {
                        if let Some(event) = parse_ap_line(&line) {
                            core.dispatch(event);
                        }
                    }
                }
                if let Ok(lines) = dhcp_tail.poll() {
                    for line in lines {
                        if let Some(event) = parse_dhcp_line(&line) {
                            core.dispatch(event);
                        }
                    }
                }
                core.sweep(retention);
                thread::sleep(POLL_INTERVAL);
            }
            tracing::debug!("client monitor loop stopped");
        }));
    }

    /// Stop the monitoring thread and freeze the statistics clock. The join
    /// is bounded by the poll interval.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.core.state.lock().unwrap().statistics.mark_complete();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn connected_clients(&self) -> Vec<ClientConnection> {
        let state = self.core.state.lock().unwrap();
        state
            .clients
            .values()
            .filter(|c| c.is_connected())
            .cloned()
            .collect()
    }

    pub fn all_clients(&self) -> Vec<ClientConnection> {
        let state = self.core.state.lock().unwrap();
        state.clients.values().cloned().collect()
    }

    pub fn client(&self, mac: &str) -> Option<ClientConnection> {
        let state = self.core.state.lock().unwrap();
        state.clients.get(&mac.to_ascii_uppercase()).cloned()
    }

    /// Find the client holding a given lease, for portal-to-client
    /// correlation.
    pub fn client_by_ip(&self, ip: Ipv4Addr) -> Option<ClientConnection> {
        let state = self.core.state.lock().unwrap();
        state
            .clients
            .values()
            .find(|c| c.ip == Some(ip))
            .cloned()
    }

    pub fn has_connected_clients(&self) -> bool {
        self.connected_count() > 0
    }

    pub fn connected_count(&self) -> usize {
        let state = self.core.state.lock().unwrap();
        state.clients.values().filter(|c| c.is_connected()).count()
    }

    /// Record a credential submission against the owning client record and
    /// the attack statistics.
    pub fn record_credential_attempt(&self, mac: &str, success: bool) {
        let mut state = self.core.state.lock().unwrap();
        let mac = mac.to_ascii_uppercase();
        if let Some(client) = state.clients.get_mut(&mac) {
            client.credential_submitted = true;
            client.credential_valid = Some(success);
        }
        state.statistics.record_credential_attempt(success);
        tracing::info!(mac = %mac, success, "credential attempt recorded");
    }

    pub fn statistics(&self) -> AttackStatistics {
        let mut state = self.core.state.lock().unwrap();
        let connected = state.clients.values().filter(|c| c.is_connected()).count() as u32;
        state.statistics.currently_connected = connected;
        state.statistics.clone()
    }

    #[cfg(test)]
    fn dispatch_for_test(&self, event: LogEvent) {
        self.core.dispatch(event);
    }
}

impl Drop for ClientMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
