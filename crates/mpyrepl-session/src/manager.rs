//! Owner of the active session.
//!
//! One [`SessionManager`] is created by the application and handed to
//! whatever needs device access. It holds at most one connected session;
//! connecting again closes the previous one first.

use std::sync::Arc;

use mpyrepl_transport::{AnyTransport, ConnectionProfile};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// Shared handle to the managed session.
pub type SharedSession = Arc<Session<AnyTransport>>;

/// Holds at most one connected, initialized session.
#[derive(Default)]
pub struct SessionManager {
    config: SessionConfig,
    active: Mutex<Option<SharedSession>>,
}

impl SessionManager {
    /// Create a manager whose sessions use `config`.
    pub fn new(config: SessionConfig) -> Self {
        SessionManager {
            config,
            active: Mutex::new(None),
        }
    }

    /// Open the transport described by `profile`, run the handshake and
    /// make the result the active session.
    pub async fn connect(&self, profile: &ConnectionProfile) -> SessionResult<SharedSession> {
        self.disconnect().await?;
        debug!(kind = %profile.kind(), "opening transport");
        let transport = profile.open().await?;
        self.attach(transport).await
    }

    /// Make a session over an already opened transport the active one.
    pub async fn attach(&self, transport: impl Into<AnyTransport>) -> SessionResult<SharedSession> {
        self.disconnect().await?;
        let session = Arc::new(Session::with_config(transport.into(), self.config.clone()));
        if let Err(err) = session.initialize().await {
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "closing failed session");
            }
            return Err(err);
        }
        info!(address = %session.address(), kind = %session.kind(), "connected");
        *self.active.lock() = Some(session.clone());
        Ok(session)
    }

    /// Close the active session, if any.
    pub async fn disconnect(&self) -> SessionResult<()> {
        let previous = self.active.lock().take();
        if let Some(session) = previous {
            info!(address = %session.address(), "disconnecting");
            session.close().await?;
        }
        Ok(())
    }

    /// The active session.
    pub fn session(&self) -> SessionResult<SharedSession> {
        self.active.lock().clone().ok_or(SessionError::NotConnected)
    }

    /// True if a session is active.
    pub fn is_connected(&self) -> bool {
        self.active.lock().is_some()
    }
}
