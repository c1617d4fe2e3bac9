//! Protocol constants
//!
//! Control bytes and literal sentinels exchanged with the MicroPython raw REPL.
//! All sentinels are exact and case-sensitive.

// ============================================================================
// Control Bytes
// ============================================================================

/// `Ctrl-A`: switch the interpreter into raw REPL mode.
pub const CTRL_A: u8 = 0x01;
/// `Ctrl-B`: leave raw REPL mode and return to the friendly REPL.
pub const CTRL_B: u8 = 0x02;
/// `Ctrl-C`: keyboard interrupt.
pub const CTRL_C: u8 = 0x03;
/// `Ctrl-D`: end of transmission. Terminates a submission and each output channel.
pub const CTRL_D: u8 = 0x04;

// ============================================================================
// Host → Device Sequences
// ============================================================================

/// Aborts any running program. The leading `\r` terminates a partial input line.
pub const INTERRUPT_SEQUENCE: &[u8] = b"\r\x03\x03";

/// Requests raw REPL mode.
pub const ENTER_RAW_MODE: &[u8] = &[CTRL_A];

// ============================================================================
// Device → Host Sentinels
// ============================================================================

/// Banner printed once raw mode has been entered.
pub const RAW_REPL_BANNER: &str = "raw REPL; CTRL-B to exit\r\n";

/// Prompt printed when the interpreter is ready for a submission.
pub const RAW_PROMPT: &str = ">";

/// Acknowledgment printed once a submission was accepted and started.
pub const SUBMISSION_ACK: &str = "OK";

/// Channel terminator, printed after stdout and again after stderr.
pub const END_OF_TRANSMISSION: &str = "\x04";

// ============================================================================
// WebREPL Login
// ============================================================================

/// Prompt sent by a WebREPL endpoint before the password.
pub const WEBREPL_PASSWORD_PROMPT: &str = "Password: ";

/// Greeting sent by a WebREPL endpoint after a successful login.
pub const WEBREPL_CONNECTED: &str = "\r\nWebREPL connected\r\n>>> ";

/// Line terminator sent after the WebREPL password.
pub const WEBREPL_LINE_END: &str = "\r\n";

// ============================================================================
// Limits
// ============================================================================

/// Bytes of file content carried by a single write submission.
pub const WRITE_CHUNK_SIZE: usize = 128;

/// Bytes read per iteration by the remote file dump loop.
pub const READ_CHUNK_SIZE: usize = 256;

/// Mode bit marking a regular file in `os.stat`/`os.ilistdir` results.
pub const STAT_FILE_FLAG: u32 = 0x8000;
