//! WebREPL provisioning over an established session.
//!
//! Typically run over serial: afterwards the board can be reached with a
//! `websocket` connection profile at the returned URL.

use std::time::Duration;

use mpyrepl_protocol::{
    parse_webrepl_url, validate_webrepl_password, webrepl_boot_block, webrepl_config,
    RemoteCommand, BOOT_SCRIPT_PATH, WEBREPL_CONFIG_PATH,
};
use mpyrepl_transport::Transport;
use tracing::{debug, info};

use crate::fs::{check, RemoteFs, RemoteFsResult, WriteOptions};
use crate::session::Session;

/// Time given to the station interface to obtain an address.
pub const DEFAULT_WLAN_SETTLE: Duration = Duration::from_secs(3);

/// Network and password for [`WebRepl::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebReplSetup {
    /// Wireless network to join.
    pub ssid: String,
    /// Password of that network.
    pub wlan_password: String,
    /// WebREPL login password, 4 to 9 characters.
    pub password: String,
    /// Wait between joining the network and starting the daemon.
    pub settle: Duration,
}

impl WebReplSetup {
    pub fn new(
        ssid: impl Into<String>,
        wlan_password: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        WebReplSetup {
            ssid: ssid.into(),
            wlan_password: wlan_password.into(),
            password: password.into(),
            settle: DEFAULT_WLAN_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// WebREPL management on the device behind a session.
pub struct WebRepl<'a, T> {
    session: &'a Session<T>,
}

impl<'a, T: Transport> WebRepl<'a, T> {
    pub fn new(session: &'a Session<T>) -> Self {
        WebRepl { session }
    }

    /// Start the daemon (a no-op if it runs already) and return its
    /// `ws://` URL.
    pub async fn url(&self) -> RemoteFsResult<String> {
        let result = self
            .session
            .execute(&RemoteCommand::StartWebRepl.to_code())
            .await?;
        let output = check("webrepl", result)?;
        let url = parse_webrepl_url(&output)?;
        debug!(address = %self.session.address(), url = %url, "WebREPL listening");
        Ok(url)
    }

    /// Enable WebREPL now and at every boot.
    ///
    /// Writes the password file, joins the network, waits `settle`, starts
    /// the daemon and, once it reports an address, appends the same network
    /// and start-up code to the boot script. Returns the daemon URL.
    pub async fn configure(&self, setup: &WebReplSetup) -> RemoteFsResult<String> {
        validate_webrepl_password(&setup.password)?;
        let fs = RemoteFs::new(self.session);

        fs.write_file(
            WEBREPL_CONFIG_PATH,
            webrepl_config(&setup.password).as_bytes(),
            WriteOptions::default(),
            |_, _| {},
        )
        .await?;

        let connect = RemoteCommand::ConnectWlan {
            ssid: setup.ssid.clone(),
            password: setup.wlan_password.clone(),
        };
        check("network", self.session.execute(&connect.to_code()).await?)?;
        debug!(ssid = %setup.ssid, settle_ms = setup.settle.as_millis() as u64, "joining network");
        tokio::time::sleep(setup.settle).await;

        let url = self.url().await?;

        let boot = webrepl_boot_block(&setup.ssid, &setup.wlan_password);
        let append = WriteOptions {
            append: true,
            ..Default::default()
        };
        fs.write_file(BOOT_SCRIPT_PATH, boot.as_bytes(), append, |_, _| {})
            .await?;

        info!(address = %self.session.address(), url = %url, "WebREPL configured");
        Ok(url)
    }
}
