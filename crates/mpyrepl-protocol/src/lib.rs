//! MicroPython Raw REPL Protocol
//!
//! This crate provides the wire-level pieces for driving a MicroPython
//! interpreter through its "raw REPL" mode. Unlike the friendly REPL, which is
//! line oriented and echoes input, raw mode accepts a whole code submission
//! terminated by a single control byte and answers with sentinel-delimited
//! output.
//!
//! # Protocol Overview
//!
//! - **Enter raw mode** (host → device): `\r` + `Ctrl-C Ctrl-C`, then `Ctrl-A`.
//!   The device answers with the banner `raw REPL; CTRL-B to exit\r\n` followed
//!   by the `>` prompt.
//! - **Submission** (host → device): source text followed by `Ctrl-D`.
//! - **Result** (device → host): `OK`, stdout, `Ctrl-D`, stderr, `Ctrl-D`, `>`.
//!
//! Nothing in the stream has a length prefix, so every boundary is found by
//! scanning for a suffix ([`SentinelMatcher`]).
//!
//! # Example
//!
//! ```rust
//! use mpyrepl_protocol::{encode_submission, SentinelMatcher, END_OF_TRANSMISSION};
//!
//! let frame = encode_submission("print(2+2)").unwrap();
//! assert_eq!(frame.last(), Some(&0x04));
//!
//! let mut matcher = SentinelMatcher::new(END_OF_TRANSMISSION);
//! assert_eq!(matcher.push(b'4'), None);
//! assert_eq!(matcher.push(0x04), Some(b"4".to_vec()));
//! ```

mod codec;
mod commands;
mod constants;
mod error;
mod responses;
mod webrepl;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use responses::*;
pub use webrepl::*;
