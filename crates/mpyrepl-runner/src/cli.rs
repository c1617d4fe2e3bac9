//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mpyrepl_transport::{ConnectionProfile, DEFAULT_BAUD_RATE, DEFAULT_LOGIN_TIMEOUT_MS};

use crate::boards::{BoardRegistry, DEFAULT_BOARDS_FILE};
use crate::error::{RunnerError, RunnerResult};
use crate::profile::{Profile, SessionOverrides};

/// Drive a MicroPython board over its raw REPL.
#[derive(Parser, Debug)]
#[command(name = "mpyrepl", about, author, version)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the device is. Flags override the profile file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// YAML profile with connection and session settings.
    #[arg(long, global = true, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Serial port of the board.
    #[arg(long, global = true, conflicts_with_all = ["url", "board", "sim"])]
    pub port: Option<String>,

    /// Baud rate for --port.
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// WebREPL endpoint, e.g. ws://192.168.4.1:8266.
    #[arg(long, global = true, conflicts_with_all = ["board", "sim"])]
    pub url: Option<String>,

    /// WebREPL password for --url.
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Connect to a board saved by `webrepl setup`.
    #[arg(long, global = true, conflicts_with = "sim")]
    pub board: Option<String>,

    /// Board registry searched by --board.
    #[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_BOARDS_FILE)]
    pub boards: PathBuf,

    /// Talk to the built-in simulated device.
    #[arg(long, global = true)]
    pub sim: bool,
}

/// Session tuning flags. Same meaning as the profile's `session` section.
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Time to wait for the raw REPL banner per attempt.
    #[arg(long, global = true, value_name = "MS")]
    pub handshake_timeout_ms: Option<u64>,

    /// Handshake attempts before giving up; 0 retries forever.
    #[arg(long, global = true, value_name = "N")]
    pub max_handshake_attempts: Option<usize>,

    /// Time to wait for program output; 0 waits forever.
    #[arg(long, global = true, value_name = "MS")]
    pub output_timeout_ms: Option<u64>,

    /// Skip importing `os` after the handshake.
    #[arg(long, global = true)]
    pub no_prime: bool,
}

impl TuningArgs {
    fn overrides(&self) -> SessionOverrides {
        SessionOverrides {
            handshake_timeout_ms: self.handshake_timeout_ms,
            max_handshake_attempts: self.max_handshake_attempts,
            output_timeout_ms: self.output_timeout_ms,
            prime_import: self.no_prime.then_some(false),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a code snippet and print its output.
    Exec {
        /// Python source.
        code: String,
    },
    /// Run a local script, streaming output. Ctrl-C interrupts the board.
    Run {
        /// Script to send.
        file: PathBuf,
    },
    /// Print the value of an expression.
    Eval {
        /// Python expression.
        expr: String,
    },
    /// List a remote directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a remote file.
    Cat { path: String },
    /// Show kind, size and times of a remote path.
    Stat { path: String },
    /// Copy a local file to the board.
    Put {
        local: PathBuf,
        /// Defaults to the local file name in the root directory.
        remote: Option<String>,
        /// Fail if the remote file exists.
        #[arg(long, conflicts_with = "append")]
        no_overwrite: bool,
        /// Append to an existing remote file.
        #[arg(long)]
        append: bool,
        /// Keep `\r` bytes.
        #[arg(long)]
        binary: bool,
    },
    /// Copy a remote file to the local machine.
    Get {
        remote: String,
        /// Defaults to the remote file name in the current directory.
        local: Option<PathBuf>,
    },
    /// Create a remote directory.
    Mkdir { path: String },
    /// Remove a remote file or directory.
    Rm {
        path: String,
        /// Remove directories and their contents.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Rename a remote path.
    Mv {
        from: String,
        to: String,
        /// Replace the destination if it exists.
        #[arg(short, long)]
        force: bool,
    },
    /// Manage WebREPL on the board.
    Webrepl {
        #[command(subcommand)]
        action: WebReplAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum WebReplAction {
    /// Start WebREPL and print its ws:// URL.
    Url,
    /// Join a network, enable WebREPL at boot and save the board.
    Setup {
        /// Wireless network to join.
        #[arg(long)]
        ssid: String,
        /// Password of the wireless network.
        #[arg(long, default_value = "")]
        wlan_password: String,
        /// WebREPL password to set (4-9 characters).
        #[arg(long)]
        webrepl_password: String,
        /// Name to save the board under.
        #[arg(long)]
        name: String,
        /// Registry file the board is saved to.
        #[arg(long, value_name = "FILE", default_value = DEFAULT_BOARDS_FILE)]
        save_to: PathBuf,
        /// Time for the network to come up before starting WebREPL.
        #[arg(long, value_name = "MS", default_value_t = 3000)]
        settle_ms: u64,
    },
}

impl Command {
    /// True for commands that run user code and should forward Ctrl-C.
    pub fn is_interruptible(&self) -> bool {
        matches!(self, Command::Run { .. } | Command::Exec { .. })
    }
}

impl Cli {
    /// Resolve the profile file and connection flags into one profile.
    pub fn profile(&self) -> RunnerResult<Profile> {
        let args = &self.connection;
        let file = args.profile.as_ref().map(Profile::load).transpose()?;
        let flagged = if args.sim {
            Some(ConnectionProfile::Simulated)
        } else if let Some(path) = &args.port {
            Some(ConnectionProfile::Serial {
                path: path.clone(),
                baud_rate: args.baud,
            })
        } else if let Some(url) = &args.url {
            Some(ConnectionProfile::WebSocket {
                url: url.clone(),
                password: args.password.clone(),
                login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            })
        } else if let Some(name) = &args.board {
            let registry = BoardRegistry::load(&args.boards)?;
            let record = registry.find(name).ok_or_else(|| RunnerError::UnknownBoard {
                name: name.clone(),
                registry: args.boards.display().to_string(),
            })?;
            Some(record.connection())
        } else {
            None
        };

        let mut profile = match (file, flagged) {
            (Some(mut profile), Some(connection)) => {
                profile.connection = connection;
                profile
            }
            (Some(profile), None) => profile,
            (None, Some(connection)) => Profile::new(connection),
            (None, None) => return Err(RunnerError::NoConnection),
        };
        profile.session = profile.session.merge(&self.tuning.overrides());
        Ok(profile)
    }

    /// Default log filter for the verbosity count.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
