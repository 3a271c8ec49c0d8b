//! twintrap — rogue access point (Evil Twin) attack orchestration.
//!
//! Stands up a fake network impersonating a target, lures clients onto it
//! with adaptive deauthentication, captures credentials they submit to a
//! captive portal, and validates them against the real network — with
//! guaranteed resource cleanup however the attack ends.
//!
//! For use only on networks you own or are authorized to test.
//!
//! ## Layout
//! - [`attack`] — the attack lifecycle state machine and control loop
//! - [`deauth`] — adaptive deauthentication decisions and injection
//! - [`monitor`] — live client presence from daemon log streams
//! - [`validator`] — credential validation with backoff and lockout
//! - [`cleanup`] — idempotent, partial-failure-tolerant teardown
//! - [`hostapd`], [`dnsmasq`], [`portal`], [`session`] — collaborator
//!   wrappers and persistence

// This crate drives Linux wireless tooling (hostapd, iw, nl80211 drivers)
// and is not meant to build elsewhere.
#[cfg(not(target_os = "linux"))]
compile_error!("twintrap targets Linux only");

pub mod attack;
pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod deauth;
pub mod dnsmasq;
pub mod error;
pub mod hostapd;
pub mod monitor;
pub mod portal;
pub mod process;
pub mod session;
pub mod target;
pub mod validator;

pub use attack::{AttackOutcome, AttackReport, AttackState, CapturedCredential, EvilTwinAttack};
pub use config::{AttackConfig, ConflictPolicy};
pub use error::{AttackError, Result};
pub use target::Target;
