//! Target network descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AttackError, Result};

/// Broadcast destination accepted by the deauth injector.
pub const BROADCAST_MAC: &str = "FF:FF:FF:FF:FF:FF";

/// The access point being impersonated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// BSSID of the legitimate AP (normalized uppercase)
    pub bssid: String,
    /// Network name to impersonate
    pub essid: String,
    /// Channel the legitimate AP operates on
    pub channel: u8,
    /// Station MACs observed on the legitimate AP during recon; candidates
    /// for targeted deauth
    #[serde(default)]
    pub known_clients: Vec<String>,
}

impl Target {
    pub fn new(bssid: &str, essid: &str, channel: u8) -> Result<Self> {
        let bssid = normalize_mac(bssid)?;
        if essid.is_empty() {
            return Err(AttackError::external("target ESSID must not be empty"));
        }
        Ok(Self {
            bssid,
            essid: essid.to_string(),
            channel,
            known_clients: Vec::new(),
        })
    }

    pub fn with_known_clients(mut self, clients: Vec<String>) -> Self {
        self.known_clients = clients;
        self
    }

    /// Frequency in MHz for the target channel (2.4/5 GHz mapping).
    pub fn frequency_mhz(&self) -> u32 {
        channel_to_freq(self.channel)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.essid, self.bssid)
    }
}

/// Validate a MAC address string and normalize it to uppercase.
pub fn normalize_mac(mac: &str) -> Result<String> {
    let mac = mac.trim();
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6
        || parts
            .iter()
            .any(|p| p.len() != 2 || !p.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return Err(AttackError::external(format!("invalid MAC address: {mac}")));
    }
    Ok(mac.to_ascii_uppercase())
}

/// Convert a wireless channel number to its center frequency in MHz.
pub fn channel_to_freq(channel: u8) -> u32 {
    match channel {
        1..=13 => 2407 + channel as u32 * 5,
        14 => 2484,
        ch if ch >= 36 => 5000 + ch as u32 * 5,
        _ => 2412,
    }
}

/// Sanitize a network name for use in loot directory paths.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(
            normalize_mac("aa:bb:cc:dd:ee:ff").unwrap(),
            "AA:BB:CC:DD:EE:FF"
        );
        assert!(normalize_mac("aa:bb:cc:dd:ee").is_err());
        assert!(normalize_mac("zz:bb:cc:dd:ee:ff").is_err());
    }

    #[test]
    fn test_channel_to_freq() {
        assert_eq!(channel_to_freq(1), 2412);
        assert_eq!(channel_to_freq(6), 2437);
        assert_eq!(channel_to_freq(13), 2472);
        assert_eq!(channel_to_freq(14), 2484);
        assert_eq!(channel_to_freq(36), 5180);
        assert_eq!(channel_to_freq(149), 5745);
        // Channels 15-35 don't exist; fall back to channel 1.
        assert_eq!(channel_to_freq(20), 2412);
    }

    #[test]
    fn test_target_display() {
        let target = Target::new("00:11:22:33:44:55", "HomeNetwork", 6).unwrap();
        assert_eq!(target.to_string(), "HomeNetwork (00:11:22:33:44:55)");
        assert_eq!(target.frequency_mhz(), 2437);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Test Network"), "Test_Network");
        assert_eq!(sanitize_filename("WiFi@Home!"), "WiFi_Home_");
        assert_eq!(sanitize_filename("normal-name_123"), "normal-name_123");
    }
}
