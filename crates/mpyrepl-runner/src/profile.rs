//! YAML connection profiles.
//!
//! A profile names the device connection and optionally tunes the session:
//!
//! ```yaml
//! connection:
//!   kind: serial
//!   path: /dev/ttyUSB0
//!   baud_rate: 115200
//! session:
//!   handshake_timeout_ms: 500
//!   max_handshake_attempts: 0   # 0 retries forever
//!   output_timeout_ms: 10000
//! ```

use std::path::Path;
use std::time::Duration;

use mpyrepl_session::SessionConfig;
use mpyrepl_transport::ConnectionProfile;
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;

/// A device connection plus session tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// How to reach the device.
    pub connection: ConnectionProfile,
    /// Overrides applied on top of the default session configuration.
    #[serde(default)]
    pub session: SessionOverrides,
}

impl Profile {
    /// A profile for `connection` with default session settings.
    pub fn new(connection: ConnectionProfile) -> Self {
        Profile {
            connection,
            session: SessionOverrides::default(),
        }
    }

    /// Parse a profile from YAML text.
    pub fn from_yaml_str(text: &str) -> RunnerResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a profile from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> RunnerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Session configuration with this profile's overrides applied.
    pub fn session_config(&self) -> SessionConfig {
        self.session.apply(SessionConfig::default())
    }
}

/// Optional session settings. Unset fields keep the default.
///
/// Timeouts are in milliseconds. For the output and prompt timeouts, `0`
/// means wait forever. For `max_handshake_attempts`, `0` retries forever.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOverrides {
    pub handshake_timeout_ms: Option<u64>,
    pub handshake_retry_delay_ms: Option<u64>,
    pub max_handshake_attempts: Option<usize>,
    pub prompt_timeout_ms: Option<u64>,
    pub ack_timeout_ms: Option<u64>,
    pub output_timeout_ms: Option<u64>,
    pub prime_import: Option<bool>,
}

impl SessionOverrides {
    /// Fields set in `other` win over fields set here.
    pub fn merge(&self, other: &SessionOverrides) -> SessionOverrides {
        SessionOverrides {
            handshake_timeout_ms: other.handshake_timeout_ms.or(self.handshake_timeout_ms),
            handshake_retry_delay_ms: other
                .handshake_retry_delay_ms
                .or(self.handshake_retry_delay_ms),
            max_handshake_attempts: other.max_handshake_attempts.or(self.max_handshake_attempts),
            prompt_timeout_ms: other.prompt_timeout_ms.or(self.prompt_timeout_ms),
            ack_timeout_ms: other.ack_timeout_ms.or(self.ack_timeout_ms),
            output_timeout_ms: other.output_timeout_ms.or(self.output_timeout_ms),
            prime_import: other.prime_import.or(self.prime_import),
        }
    }

    /// Apply the set fields to `config`.
    pub fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(ms) = self.handshake_timeout_ms {
            config = config.with_handshake_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.handshake_retry_delay_ms {
            config = config.with_handshake_retry_delay(Duration::from_millis(ms));
        }
        if let Some(attempts) = self.max_handshake_attempts {
            config = config.with_max_handshake_attempts((attempts > 0).then_some(attempts));
        }
        if let Some(ms) = self.prompt_timeout_ms {
            config = config.with_prompt_timeout(optional_millis(ms));
        }
        if let Some(ms) = self.ack_timeout_ms {
            config = config.with_ack_timeout(optional_millis(ms));
        }
        if let Some(ms) = self.output_timeout_ms {
            config = config.with_output_timeout(optional_millis(ms));
        }
        if let Some(prime) = self.prime_import {
            config = config.with_prime_import(prime);
        }
        config
    }
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial_profile() {
        let yaml = r#"
connection:
  kind: serial
  path: /dev/ttyUSB0
session:
  handshake_timeout_ms: 250
  max_handshake_attempts: 0
  output_timeout_ms: 10000
  prime_import: false
"#;
        let profile = Profile::from_yaml_str(yaml).unwrap();
        assert_eq!(
            profile.connection,
            ConnectionProfile::Serial {
                path: "/dev/ttyUSB0".into(),
                baud_rate: 115200,
            }
        );

        let config = profile.session_config();
        assert_eq!(config.handshake_timeout, Duration::from_millis(250));
        assert_eq!(config.max_handshake_attempts, None);
        assert_eq!(config.output_timeout, Some(Duration::from_secs(10)));
        assert!(!config.prime_import);
        // Untouched fields keep their defaults.
        assert_eq!(config.prompt_timeout, SessionConfig::default().prompt_timeout);
    }

    #[test]
    fn test_session_section_is_optional() {
        let profile = Profile::from_yaml_str("connection:\n  kind: simulated\n").unwrap();
        assert_eq!(profile, Profile::new(ConnectionProfile::Simulated));
        assert_eq!(profile.session_config(), SessionConfig::default());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let yaml = "connection:\n  kind: simulated\nsession:\n  handshake_timeout: 5\n";
        assert!(Profile::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_zero_timeouts_wait_forever() {
        let overrides = SessionOverrides {
            prompt_timeout_ms: Some(0),
            ack_timeout_ms: Some(0),
            ..Default::default()
        };
        let config = overrides.apply(SessionConfig::default());
        assert_eq!(config.prompt_timeout, None);
        assert_eq!(config.ack_timeout, None);
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = SessionOverrides {
            handshake_timeout_ms: Some(100),
            prime_import: Some(true),
            ..Default::default()
        };
        let flags = SessionOverrides {
            handshake_timeout_ms: Some(900),
            ..Default::default()
        };
        let merged = base.merge(&flags);
        assert_eq!(merged.handshake_timeout_ms, Some(900));
        assert_eq!(merged.prime_import, Some(true));
    }
}
