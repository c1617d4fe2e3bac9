//! Command-line front end for the MicroPython raw REPL driver.
//!
//! The `mpyrepl` binary resolves a [`Profile`] from a YAML file and flags,
//! connects through [`SessionManager`](mpyrepl_session::SessionManager) and
//! runs one [`Command`].

pub mod boards;
pub mod cli;
pub mod commands;
pub mod error;
pub mod profile;

pub use boards::{BoardRecord, BoardRegistry, DEFAULT_BOARDS_FILE};
pub use cli::{Cli, Command, ConnectionArgs, TuningArgs, WebReplAction};
pub use commands::{run_command, Console};
pub use error::{RunnerError, RunnerResult};
pub use profile::{Profile, SessionOverrides};
