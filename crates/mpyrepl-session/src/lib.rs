//! Session driver for the MicroPython raw REPL.
//!
//! A [`Session`] owns one [`Transport`](mpyrepl_transport::Transport) and
//! turns it into a request/response channel for code:
//!
//! - [`Session::initialize`] forces the device into raw mode, retrying until
//!   the banner appears
//! - [`Session::execute`] runs code and returns both output channels
//! - [`Session::execute_interactive`] and [`Session::execute_stream`] forward
//!   output as it arrives
//! - [`Session::dangerously_write`] sends bytes out of band, typically an
//!   interrupt
//!
//! Only one operation drives the transport at a time. When an exchange fails
//! at the transport or times out, the driver re-runs the handshake before
//! reporting the failure, so the next call starts from a known state.
//!
//! On top of the driver sit [`RemoteFs`], which maps file operations onto
//! snippets, [`WebRepl`], which provisions network access, and
//! [`SessionManager`], which owns the active session.
//!
//! # Example
//!
//! ```rust,no_run
//! use mpyrepl_session::Session;
//! use mpyrepl_transport::SimDevice;
//!
//! # async fn demo() -> Result<(), mpyrepl_session::SessionError> {
//! let device = SimDevice::new();
//! let session = Session::new(device.transport());
//! session.initialize().await?;
//! let result = session.execute("print(2+2)").await?;
//! println!("{}", result.output);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod fs;
mod handshake;
mod lock;
mod manager;
mod scanner;
mod session;
mod stream;
mod webrepl;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use fs::{join_path, RemoteFs, RemoteFsError, RemoteFsResult, WriteOptions};
pub use lock::{FlightGuard, SingleFlight};
pub use manager::{SessionManager, SharedSession};
pub use scanner::Scanner;
pub use session::{ExclusiveSection, Session, SyncState};
pub use stream::{CallbackSink, ChannelSink, ExecStream, Output, OutputSink};
pub use webrepl::{WebRepl, WebReplSetup, DEFAULT_WLAN_SETTLE};

pub use mpyrepl_protocol::{DirEntry, EntryKind, ExecutionResult, RemoteStat};
