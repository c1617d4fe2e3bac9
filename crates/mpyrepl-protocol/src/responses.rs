//! Parsing of device replies.
//!
//! A completed submission yields two texts: whatever the code printed to
//! stdout and whatever it printed to stderr. Helper snippets from
//! [`crate::commands`] print in fixed formats parsed here.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Output of one code submission.
///
/// A non-empty `error` means the remote code raised an exception. That is
/// data for the caller, not a protocol failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Text printed to stdout.
    pub output: String,
    /// Traceback printed to stderr.
    pub error: String,
}

impl ExecutionResult {
    /// Create a result from both channels.
    pub fn new(output: impl Into<String>, error: impl Into<String>) -> Self {
        ExecutionResult {
            output: output.into(),
            error: error.into(),
        }
    }

    /// True if the remote code completed without raising.
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// The last line of the traceback, e.g. `ZeroDivisionError: division by zero`.
    pub fn exception_summary(&self) -> Option<&str> {
        self.error.lines().rev().find(|line| !line.trim().is_empty()).map(str::trim)
    }
}

/// Kind of a remote filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    fn parse(flag: &str) -> ProtocolResult<EntryKind> {
        match flag {
            "f" => Ok(EntryKind::File),
            "d" => Ok(EntryKind::Directory),
            other => Err(ProtocolError::ParseError(format!("unknown entry kind '{}'", other))),
        }
    }

    /// Single-letter tag as printed by the helper snippets.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "f",
            EntryKind::Directory => "d",
        }
    }
}

/// Result of [`crate::RemoteCommand::Stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStat {
    /// File or directory.
    pub kind: EntryKind,
    /// Creation time (device epoch seconds).
    pub ctime: i64,
    /// Modification time (device epoch seconds).
    pub mtime: i64,
    /// Size in bytes.
    pub size: u64,
}

impl RemoteStat {
    /// Parse `kind/ctime/mtime/size`.
    pub fn parse(text: &str) -> ProtocolResult<RemoteStat> {
        let text = text.trim();
        let parts: Vec<&str> = text.split('/').collect();
        if parts.len() != 4 {
            return Err(ProtocolError::ParseError(format!("malformed stat line '{}'", text)));
        }
        let number = |field: &str| -> ProtocolResult<i64> {
            field
                .parse()
                .map_err(|_| ProtocolError::ParseError(format!("bad stat field '{}'", field)))
        };
        let size = number(parts[3])?;
        Ok(RemoteStat {
            kind: EntryKind::parse(parts[0])?,
            ctime: number(parts[1])?,
            mtime: number(parts[2])?,
            size: u64::try_from(size)
                .map_err(|_| ProtocolError::ParseError(format!("negative size {}", size)))?,
        })
    }

    /// True for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One entry of [`crate::RemoteCommand::ListDir`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (no path).
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
}

/// Parse `name/kind` lines. Blank lines are skipped.
pub fn parse_dir_listing(text: &str) -> ProtocolResult<Vec<DirEntry>> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (name, flag) = line
                .rsplit_once('/')
                .ok_or_else(|| ProtocolError::ParseError(format!("malformed entry '{}'", line)))?;
            Ok(DirEntry {
                name: name.to_string(),
                kind: EntryKind::parse(flag)?,
            })
        })
        .collect()
}

/// Decode the hex lines printed by [`crate::RemoteCommand::ReadFile`].
pub fn parse_hex_dump(text: &str) -> ProtocolResult<Vec<u8>> {
    let mut data = Vec::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        data.extend(hex::decode(line)?);
    }
    Ok(data)
}

/// Strip the line terminator `print` appends.
pub fn trim_printed(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_result_success() {
        let result = ExecutionResult::new("4\r\n", "");
        assert!(result.is_success());
        assert_eq!(result.exception_summary(), None);
    }

    #[test]
    fn test_exception_summary() {
        let result = ExecutionResult::new(
            "",
            "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\nZeroDivisionError: divide by zero\r\n",
        );
        assert!(!result.is_success());
        assert_eq!(result.exception_summary(), Some("ZeroDivisionError: divide by zero"));
    }

    #[test]
    fn test_parse_stat_file() {
        let stat = RemoteStat::parse("f/0/1700000000/42\r\n").unwrap();
        assert_eq!(stat.kind, EntryKind::File);
        assert_eq!(stat.mtime, 1700000000);
        assert_eq!(stat.size, 42);
        assert!(!stat.is_dir());
    }

    #[test]
    fn test_parse_stat_malformed() {
        assert!(RemoteStat::parse("f/0/1").is_err());
        assert!(RemoteStat::parse("x/0/1/2").is_err());
        assert!(RemoteStat::parse("f/0/1/-2").is_err());
    }

    #[test]
    fn test_parse_dir_listing() {
        let entries = parse_dir_listing("boot.py/f\r\nlib/d\r\n\r\n").unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "boot.py".to_string(), kind: EntryKind::File },
                DirEntry { name: "lib".to_string(), kind: EntryKind::Directory },
            ]
        );
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_dir_listing("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_hex_dump() {
        assert_eq!(parse_hex_dump("68656c\r\n6c6f\r\n").unwrap(), b"hello".to_vec());
        assert!(matches!(
            parse_hex_dump("zz\r\n"),
            Err(ProtocolError::InvalidHex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 }))
        ));
    }

    #[test]
    fn test_trim_printed() {
        assert_eq!(trim_printed("4\r\n"), "4");
        assert_eq!(trim_printed("4\n"), "4");
        assert_eq!(trim_printed("4"), "4");
    }
}
