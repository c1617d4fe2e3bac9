//! Raw REPL handshake.
//!
//! Brings the device from an unknown state into raw mode:
//!
//! 1. write `\r` + `0x03 0x03` to interrupt whatever is running
//! 2. discard buffered input
//! 3. write `0x01`
//! 4. scan for `raw REPL; CTRL-B to exit\r\n` within the handshake budget
//!
//! A timeout or failed write restarts from step 1, up to the configured
//! attempt bound. State moves `Unsynced -> HandshakeSent -> Ready`.
//!
//! With priming enabled, `import os` runs right after the banner under a
//! bounded output timeout. A prime that stalls or loses the channel counts
//! as a failed attempt and the handshake starts over.

use mpyrepl_metrics::metric_defs;
use mpyrepl_protocol::{
    encode_submission, RemoteCommand, ENTER_RAW_MODE, INTERRUPT_SEQUENCE, RAW_REPL_BANNER,
};
use mpyrepl_transport::Transport;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::session::{Session, SyncState};

impl<T: Transport> Session<T> {
    /// Enter raw mode, retrying until the banner appears.
    ///
    /// Fails with [`SessionError::HandshakeExhausted`] once
    /// `max_handshake_attempts` is used up, and with
    /// [`SessionError::Closed`] if the session or transport closes meanwhile.
    pub async fn initialize(&self) -> SessionResult<()> {
        self.ensure_open()?;
        self.lock.run(&self.labels, self.handshake_locked()).await
    }

    /// Handshake loop. Caller holds the lock.
    pub(crate) async fn handshake_locked(&self) -> SessionResult<()> {
        let mut attempts = 0usize;
        loop {
            self.ensure_open()?;
            if let Some(max) = self.config.max_handshake_attempts {
                if attempts >= max {
                    self.set_state(SyncState::Unsynced);
                    warn!(address = %self.address(), attempts, "raw REPL handshake exhausted");
                    return Err(SessionError::HandshakeExhausted { attempts });
                }
            }
            attempts += 1;
            metrics::counter!(metric_defs::HANDSHAKE_ATTEMPTS.name, &self.labels.to_labels())
                .increment(1);

            let outcome = match self.attempt_handshake().await {
                Ok(()) => self.enter_ready(attempts).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if err.is_fatal() || self.is_closed() => {
                    self.set_state(SyncState::Unsynced);
                    return Err(if self.is_closed() { SessionError::Closed } else { err });
                }
                Err(err) if self.state() == SyncState::Ready => {
                    // Banner seen but the prime did not complete.
                    warn!(address = %self.address(), attempt = attempts, error = %err, "priming import failed, restarting handshake");
                    self.set_state(SyncState::Unsynced);
                    tokio::time::sleep(self.config.handshake_retry_delay).await;
                }
                Err(err) => {
                    debug!(address = %self.address(), attempt = attempts, error = %err, "handshake attempt failed");
                    tokio::time::sleep(self.config.handshake_retry_delay).await;
                }
            }
        }
    }

    async fn enter_ready(&self, attempts: usize) -> SessionResult<()> {
        self.set_state(SyncState::Ready);
        metrics::counter!(metric_defs::HANDSHAKE_COMPLETED.name, &self.labels.to_labels())
            .increment(1);
        info!(address = %self.address(), attempts, "raw REPL ready");

        if self.config.prime_import {
            self.prime().await?;
        }
        Ok(())
    }

    async fn attempt_handshake(&self) -> SessionResult<()> {
        self.set_state(SyncState::HandshakeSent);
        self.write(INTERRUPT_SEQUENCE).await?;
        self.scanner().drain().await?;
        self.write(ENTER_RAW_MODE).await?;
        self.scanner()
            .read_until(RAW_REPL_BANNER, Some(self.config.handshake_timeout))
            .await?;
        Ok(())
    }

    /// Import `os` so the filesystem helpers can run.
    async fn prime(&self) -> SessionResult<()> {
        let code = RemoteCommand::Import {
            module: "os".to_string(),
        }
        .to_code();
        let frame = encode_submission(&code).map_err(SessionError::InvalidCode)?;
        let result = self
            .execute_locked_within(&frame, self.config.prime_timeout())
            .await?;
        if !result.is_success() {
            warn!(
                address = %self.address(),
                error = result.exception_summary().unwrap_or_default(),
                "priming import failed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use mpyrepl_transport::{SimDevice, TransportError};
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_handshake_timeout(Duration::from_millis(20))
            .with_handshake_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_handshake_enters_raw_mode_and_primes() {
        let device = SimDevice::new();
        let session = Session::with_config(device.transport(), config());

        session.initialize().await.unwrap();
        assert_eq!(session.state(), SyncState::Ready);
        assert!(device.is_raw());
        assert_eq!(device.interrupts(), 2);
        assert_eq!(device.submissions(), vec!["import os".to_string()]);
        assert!(device.written().starts_with(b"\r\x03\x03\x01"));
    }

    #[tokio::test]
    async fn test_handshake_without_prime() {
        let device = SimDevice::new();
        let session =
            Session::with_config(device.transport(), config().with_prime_import(false));

        session.initialize().await.unwrap();
        assert!(device.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_discards_stale_output() {
        let device = SimDevice::new();
        let transport = device.transport();
        device.emit(b"Traceback ... >>> >");
        let session = Session::with_config(transport, config().with_prime_import(false));

        session.initialize().await.unwrap();
        // Only the prompt after the banner is left.
        assert_eq!(session.transport.available_bytes(), 1);
    }

    #[tokio::test]
    async fn test_handshake_exhausted() {
        let device = SimDevice::new();
        device.set_banner_enabled(false);
        let session = Session::with_config(
            device.transport(),
            config().with_max_handshake_attempts(Some(3)),
        );

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::HandshakeExhausted { attempts: 3 }));
        assert_eq!(device.raw_mode_requests(), 3);
        assert_eq!(session.state(), SyncState::Unsynced);
    }

    #[tokio::test]
    async fn test_write_failure_is_retried() {
        let device = SimDevice::new();
        device.fail_next_writes(2);
        let session =
            Session::with_config(device.transport(), config().with_prime_import(false));

        session.initialize().await.unwrap();
        assert_eq!(session.state(), SyncState::Ready);
        assert_eq!(device.raw_mode_requests(), 1);
    }

    #[tokio::test]
    async fn test_stalled_prime_restarts_handshake() {
        let device = SimDevice::new();
        device.stall_next_submission();
        let session = Session::with_config(
            device.transport(),
            config()
                .with_prompt_timeout(Some(Duration::from_millis(50)))
                .with_output_timeout(None),
        );

        tokio::time::timeout(Duration::from_secs(2), session.initialize())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SyncState::Ready);
        assert_eq!(device.raw_mode_requests(), 2);
        assert_eq!(device.submissions(), vec!["import os".to_string(), "import os".to_string()]);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_stalled_prime_counts_against_attempts() {
        let device = SimDevice::new();
        device.stall_next_submission();
        let session = Session::with_config(
            device.transport(),
            config()
                .with_max_handshake_attempts(Some(1))
                .with_output_timeout(Some(Duration::from_millis(50))),
        );

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::HandshakeExhausted { attempts: 1 }));
        assert_eq!(session.state(), SyncState::Unsynced);
    }

    #[tokio::test]
    async fn test_closed_transport_stops_retrying() {
        let device = SimDevice::new();
        let transport = device.transport();
        transport.close().await.unwrap();
        let session = Session::with_config(transport, config().with_max_handshake_attempts(None));

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Closed)));
    }
}
