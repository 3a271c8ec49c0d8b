//! End-to-end attack flow against stub collaborators.
//!
//! Drives the orchestrator through the full lifecycle: a client connects to
//! the rogue AP, submits a wrong password, then the right one; the attack
//! completes, reports the captured key, and cleans up exactly once.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use twintrap::attack::{AttackOutcome, EvilTwinAttack, ServiceDaemon};
use twintrap::cleanup::Teardown;
use twintrap::config::{AttackConfig, ConflictPolicy};
use twintrap::deauth::SignalInjector;
use twintrap::error::Result;
use twintrap::portal::SpoolPortal;
use twintrap::session::{AttackSnapshot, SessionStore};
use twintrap::target::Target;
use twintrap::validator::{AuthProbe, AuthRequest, CredentialValidator, ProbeVerdict};

const CLIENT_MAC: &str = "11:22:33:44:55:66";
const CORRECT_PASSWORD: &str = "hunter22hunter";

struct StubDaemon {
    log_path: PathBuf,
    stops: Arc<AtomicU32>,
}

impl Teardown for StubDaemon {
    fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ServiceDaemon for StubDaemon {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn log_path(&self) -> PathBuf {
        self.log_path.clone()
    }

    fn is_running(&mut self) -> bool {
        true
    }
}

struct StubInjector {
    sends: Arc<AtomicU32>,
}

impl SignalInjector for StubInjector {
    fn send(
        &mut self,
        _bssid: &str,
        _essid: &str,
        _client_mac: &str,
        _count: u32,
        _interface: &str,
    ) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
struct StubSession {
    saves: Arc<AtomicU32>,
    last: Arc<Mutex<Option<AttackSnapshot>>>,
}

impl StubSession {
    fn new() -> Self {
        Self {
            saves: Arc::new(AtomicU32::new(0)),
            last: Arc::new(Mutex::new(None)),
        }
    }
}

impl SessionStore for StubSession {
    fn save(&self, snapshot: &AttackSnapshot) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<AttackSnapshot> {
        Err(twintrap::error::AttackError::external("no snapshot"))
    }
}

/// Accepts exactly one password, instantly.
struct PasswordProbe;

impl AuthProbe for PasswordProbe {
    fn authenticate(&mut self, request: &AuthRequest, _timeout: Duration) -> Result<ProbeVerdict> {
        if request.password == CORRECT_PASSWORD {
            Ok(ProbeVerdict::Valid)
        } else {
            Ok(ProbeVerdict::Invalid("Invalid password".to_string()))
        }
    }
}

struct Fixture {
    config: AttackConfig,
    target: Target,
    ap_log: PathBuf,
    spool: PathBuf,
    ap_stops: Arc<AtomicU32>,
    net_stops: Arc<AtomicU32>,
    injector_sends: Arc<AtomicU32>,
    session: StubSession,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let ap_log = dir.path().join("hostapd.log");
    let dhcp_log = dir.path().join("dnsmasq.log");
    let spool = dir.path().join("portal_creds.jsonl");
    std::fs::write(&ap_log, "").unwrap();
    std::fs::write(&dhcp_log, "").unwrap();

    let mut config = AttackConfig::default();
    config.ap_interface = "twintrap-test0".to_string();
    config.deauth_interface = None;
    config.conf_dir = dir.path().join("conf");
    config.loot_dir = dir.path().join("loot");
    config.attack_timeout_secs = 60;
    config.session_save_interval_secs = 1;
    config.conflict_policy = ConflictPolicy::Ignore;
    config.authorized = true;
    config.validator.min_interval_secs = 0.0;
    config.validator.timeout_secs = 1;

    let target = Target::new("00:11:22:33:44:55", "HomeNetwork", 6).unwrap();

    Fixture {
        config,
        target,
        ap_log,
        spool,
        ap_stops: Arc::new(AtomicU32::new(0)),
        net_stops: Arc::new(AtomicU32::new(0)),
        injector_sends: Arc::new(AtomicU32::new(0)),
        session: StubSession::new(),
        _dir: dir,
    }
}

fn build_attack(fx: &Fixture) -> EvilTwinAttack {
    let dhcp_log = fx.ap_log.with_file_name("dnsmasq.log");
    let validator = CredentialValidator::new(
        fx.target.clone(),
        fx.config.validator.clone(),
        Box::new(PasswordProbe),
    );

    EvilTwinAttack::with_collaborators(
        fx.target.clone(),
        &fx.config,
        Box::new(StubInjector {
            sends: Arc::clone(&fx.injector_sends),
        }),
        Box::new(StubDaemon {
            log_path: fx.ap_log.clone(),
            stops: Arc::clone(&fx.ap_stops),
        }),
        Box::new(StubDaemon {
            log_path: dhcp_log,
            stops: Arc::clone(&fx.net_stops),
        }),
        Box::new(SpoolPortal::new(&fx.spool)),
        Box::new(fx.session.clone()),
        Arc::new(validator),
    )
}

fn append_line(path: &PathBuf, line: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    writeln!(file, "{line}").unwrap();
}

#[test]
fn full_attack_captures_credentials_and_cleans_up_once() {
    let fx = fixture();
    let mut attack = build_attack(&fx);

    let ap_log = fx.ap_log.clone();
    let spool = fx.spool.clone();
    let driver = thread::spawn(move || {
        // Client joins the rogue AP.
        thread::sleep(Duration::from_millis(1200));
        append_line(&ap_log, &format!("wlan0: AP-STA-CONNECTED {}", CLIENT_MAC.to_lowercase()));

        // Wrong password first: recorded, attack keeps running.
        thread::sleep(Duration::from_millis(1500));
        append_line(
            &spool,
            r#"{"ssid": "HomeNetwork", "password": "notthisone"}"#,
        );

        // Then the real one.
        thread::sleep(Duration::from_millis(1500));
        append_line(
            &spool,
            &format!(r#"{{"ssid": "HomeNetwork", "password": "{CORRECT_PASSWORD}"}}"#),
        );
    });

    let report = attack.run();
    driver.join().unwrap();

    assert_eq!(report.outcome, AttackOutcome::Completed);
    assert!(report.success());

    let credential = report.credential.as_ref().expect("credential captured");
    assert_eq!(credential.key, CORRECT_PASSWORD);
    assert_eq!(credential.essid, "HomeNetwork");

    assert_eq!(report.clients_connected, 1);
    assert_eq!(report.unique_clients, 1);
    assert_eq!(report.credential_attempts, 2);
    assert_eq!(report.successful_validations, 1);

    // One stop per daemon, even after drop.
    assert_eq!(fx.ap_stops.load(Ordering::SeqCst), 1);
    assert_eq!(fx.net_stops.load(Ordering::SeqCst), 1);
    drop(attack);
    assert_eq!(fx.ap_stops.load(Ordering::SeqCst), 1);
    assert_eq!(fx.net_stops.load(Ordering::SeqCst), 1);

    // The final snapshot recorded the capture, and the client connect
    // tightened the deauth interval by at least 20% from the 5s base.
    assert!(fx.session.saves.load(Ordering::SeqCst) >= 1);
    let snapshot = fx.session.last.lock().unwrap().clone().expect("snapshot saved");
    assert_eq!(snapshot.captured_password.as_deref(), Some(CORRECT_PASSWORD));
    assert!(snapshot.deauth_interval_secs <= 4.0);
    assert_eq!(snapshot.total_credential_attempts, 2);
}

#[test]
fn cancellation_reports_partial_results() {
    let fx = fixture();
    let mut attack = build_attack(&fx);
    let cancel = attack.cancel_flag();

    let ap_log = fx.ap_log.clone();
    let driver = thread::spawn(move || {
        thread::sleep(Duration::from_millis(1200));
        append_line(&ap_log, &format!("wlan0: AP-STA-CONNECTED {CLIENT_MAC}"));
        thread::sleep(Duration::from_millis(1200));
        cancel.store(true, Ordering::SeqCst);
    });

    let report = attack.run();
    driver.join().unwrap();

    assert_eq!(report.outcome, AttackOutcome::Cancelled);
    assert!(!report.success());
    assert!(report.credential.is_none());
    // Partial statistics survive cancellation.
    assert_eq!(report.clients_connected, 1);
    assert_eq!(fx.ap_stops.load(Ordering::SeqCst), 1);
}

struct FailingDaemon;

impl Teardown for FailingDaemon {
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ServiceDaemon for FailingDaemon {
    fn start(&mut self) -> Result<()> {
        Err(twintrap::error::AttackError::setup("hostapd", "no such interface"))
    }

    fn log_path(&self) -> PathBuf {
        PathBuf::from("/nonexistent/hostapd.log")
    }

    fn is_running(&mut self) -> bool {
        false
    }
}

#[test]
fn setup_failure_still_returns_a_report_and_cleans_up() {
    let fx = fixture();
    let validator = CredentialValidator::new(
        fx.target.clone(),
        fx.config.validator.clone(),
        Box::new(PasswordProbe),
    );

    let mut attack = EvilTwinAttack::with_collaborators(
        fx.target.clone(),
        &fx.config,
        Box::new(StubInjector {
            sends: Arc::clone(&fx.injector_sends),
        }),
        Box::new(FailingDaemon),
        Box::new(StubDaemon {
            log_path: fx.ap_log.with_file_name("dnsmasq.log"),
            stops: Arc::clone(&fx.net_stops),
        }),
        Box::new(SpoolPortal::new(&fx.spool)),
        Box::new(fx.session.clone()),
        Arc::new(validator),
    );

    let report = attack.run();
    assert_eq!(report.outcome, AttackOutcome::Failed);
    assert!(report.error.as_deref().unwrap_or("").contains("hostapd"));
    // The services that never started are still drained through cleanup.
    assert_eq!(fx.net_stops.load(Ordering::SeqCst), 1);
}

#[test]
fn unauthorized_config_refuses_to_start() {
    let mut fx = fixture();
    fx.config.authorized = false;
    let mut attack = build_attack(&fx);

    let report = attack.run();
    assert_eq!(report.outcome, AttackOutcome::Failed);
    assert!(report
        .error
        .as_deref()
        .unwrap_or("")
        .contains("authorization"));
}
