//! Rogue AP daemon wrapper.
//!
//! Generates a one-shot hostapd configuration impersonating the target,
//! prepares the AP interface, and runs hostapd with its output captured to
//! a log file the client monitor tails.

use std::net::Ipv4Addr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cleanup::Teardown;
use crate::error::{AttackError, Result};
use crate::process::{run_cmd, ChildProcess};

pub struct HostapdDaemon {
    interface: String,
    ssid: String,
    channel: u8,
    gateway_ip: Ipv4Addr,
    /// WPA2 passphrase; None runs an open network for the captive portal
    password: Option<String>,
    conf_dir: PathBuf,
    config_path: PathBuf,
    log_path: PathBuf,
    process: Option<ChildProcess>,
}

impl HostapdDaemon {
    pub fn new(
        interface: &str,
        ssid: &str,
        channel: u8,
        gateway_ip: Ipv4Addr,
        conf_dir: impl Into<PathBuf>,
    ) -> Self {
        let conf_dir = conf_dir.into();
        Self {
            interface: interface.to_string(),
            ssid: ssid.to_string(),
            channel,
            gateway_ip,
            password: None,
            config_path: conf_dir.join("hostapd_twintrap.conf"),
            log_path: conf_dir.join("hostapd.log"),
            conf_dir,
            process: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Path of the log the client monitor should tail.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn hw_mode(&self) -> &'static str {
        if self.channel > 14 {
            "a"
        } else {
            "g"
        }
    }

    fn generate_config(&self) -> String {
        let mut config = format!(
            "interface={}\n\
             driver=nl80211\n\
             ssid={}\n\
             channel={}\n\
             hw_mode={}\n\
             ieee80211n=1\n\
             wmm_enabled=1\n\
             auth_algs=1\n\
             ignore_broadcast_ssid=0\n\
             macaddr_acl=0\n\
             ctrl_interface=/var/run/hostapd\n",
            self.interface,
            self.ssid,
            self.channel,
            self.hw_mode()
        );
        if let Some(password) = &self.password {
            config.push_str(&format!(
                "wpa=2\nwpa_key_mgmt=WPA-PSK\nrsn_pairwise=CCMP\nwpa_passphrase={password}\n"
            ));
        }
        config
    }

    fn prepare_interface(&self) -> Result<()> {
        run_cmd("ip", &["link", "set", &self.interface, "down"])?;
        run_cmd("iw", &[&self.interface, "set", "type", "__ap"])?;
        run_cmd("ip", &["link", "set", &self.interface, "up"])?;
        run_cmd("ip", &["addr", "flush", "dev", &self.interface])?;
        run_cmd(
            "ip",
            &[
                "addr",
                "add",
                &format!("{}/24", self.gateway_ip),
                "dev",
                &self.interface,
            ],
        )?;
        Ok(())
    }

    /// Write the config, prepare the interface, and start hostapd.
    pub fn start(&mut self) -> Result<()> {
        if self.process.is_some() {
            tracing::warn!("hostapd already running");
            return Ok(());
        }

        std::fs::create_dir_all(&self.conf_dir)?;
        std::fs::write(&self.config_path, self.generate_config())?;
        std::fs::set_permissions(&self.config_path, std::fs::Permissions::from_mode(0o600))?;

        self.prepare_interface()
            .map_err(|e| AttackError::setup("ap-interface", e.to_string()))?;

        let config_str = self.config_path.to_string_lossy().into_owned();
        let mut process = ChildProcess::spawn_to_log(
            "hostapd",
            "hostapd",
            &["-d", &config_str],
            &self.log_path,
        )?;

        // Give the daemon time to bring the BSS up before DHCP starts.
        std::thread::sleep(Duration::from_secs(2));

        if let Some(status) = process.poll() {
            let tail = std::fs::read_to_string(&self.log_path).unwrap_or_default();
            let last = tail.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(AttackError::setup(
                "hostapd",
                format!("exited early ({status}): {last}"),
            ));
        }

        tracing::info!(
            ssid = %self.ssid,
            channel = self.channel,
            interface = %self.interface,
            pid = process.pid(),
            "rogue AP running"
        );
        self.process = Some(process);
        Ok(())
    }

    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => process.poll().is_none(),
            None => false,
        }
    }
}

impl Teardown for HostapdDaemon {
    fn stop(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            process.stop_with_grace(Duration::from_secs(1))?;
            tracing::info!("hostapd stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daemon(channel: u8) -> HostapdDaemon {
        HostapdDaemon::new(
            "wlan0",
            "HomeNetwork",
            channel,
            Ipv4Addr::new(192, 168, 100, 1),
            "/tmp/twintrap-test",
        )
    }

    #[test]
    fn test_open_network_config() {
        let config = daemon(6).generate_config();
        assert!(config.contains("interface=wlan0"));
        assert!(config.contains("ssid=HomeNetwork"));
        assert!(config.contains("channel=6"));
        assert!(config.contains("hw_mode=g"));
        assert!(!config.contains("wpa="), "portal AP must default to open");
    }

    #[test]
    fn test_wpa2_config() {
        let config = daemon(6)
            .with_password(Some("secret99".into()))
            .generate_config();
        assert!(config.contains("wpa=2"));
        assert!(config.contains("wpa_passphrase=secret99"));
    }

    #[test]
    fn test_five_ghz_hw_mode() {
        assert!(daemon(36).generate_config().contains("hw_mode=a"));
    }
}
