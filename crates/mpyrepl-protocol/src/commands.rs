//! Helper snippets executed on the device.
//!
//! Filesystem access and expression evaluation have no dedicated protocol
//! messages; they are ordinary code submissions whose printed output is
//! parsed on the host (see [`crate::responses`]). Each [`RemoteCommand`]
//! renders to a short MicroPython snippet.

use std::fmt::Write as _;

use crate::constants::{READ_CHUNK_SIZE, STAT_FILE_FLAG};

/// Commands rendered to MicroPython source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Import a module into the interpreter's global namespace.
    Import {
        /// Module name, e.g. `os`.
        module: String,
    },

    /// Print the value of an expression.
    Eval {
        /// The expression to evaluate.
        expr: String,
    },

    // ========== Query Commands ==========
    /// Print `kind/ctime/mtime/size` for a path.
    Stat {
        /// Remote path.
        path: String,
    },

    /// Print one `name/kind` line per directory entry.
    ListDir {
        /// Remote directory.
        path: String,
    },

    /// Print the file content as hex, one chunk per line.
    ReadFile {
        /// Remote file.
        path: String,
    },

    // ========== Mutating Commands ==========
    /// Create a directory.
    MakeDir {
        /// Remote directory.
        path: String,
    },

    /// Remove a file.
    Remove {
        /// Remote file.
        path: String,
    },

    /// Remove an empty directory.
    RemoveDir {
        /// Remote directory.
        path: String,
    },

    /// Rename a file or directory.
    Rename {
        /// Current path.
        from: String,
        /// New path.
        to: String,
    },

    // ========== Chunked Write ==========
    /// Open a file for binary writing and bind its `write` method to `w`.
    OpenForWrite {
        /// Remote file.
        path: String,
        /// Append instead of truncating.
        append: bool,
    },

    /// Write one chunk through the bound `w`.
    WriteChunk {
        /// Raw chunk bytes.
        data: Vec<u8>,
    },

    /// Close the file opened by [`RemoteCommand::OpenForWrite`].
    CloseFile,

    // ========== WebREPL ==========
    /// Bring up the station interface and join a network, bound to `w`.
    ConnectWlan {
        /// Network name.
        ssid: String,
        /// Network password.
        password: String,
    },

    /// Start the WebREPL daemon, which prints its address.
    StartWebRepl,
}

impl RemoteCommand {
    /// Render the command as MicroPython source.
    pub fn to_code(&self) -> String {
        match self {
            RemoteCommand::Import { module } => format!("import {}", module),
            RemoteCommand::Eval { expr } => format!("print({})", expr),
            RemoteCommand::Stat { path } => format!(
                "f=os.stat({})\nprint('{{}}/{{}}/{{}}/{{}}'.format('f'if f[0]&{:#x} else'd',f[9],f[8],f[6]))",
                python_str(path),
                STAT_FILE_FLAG
            ),
            RemoteCommand::ListDir { path } => format!(
                "for f in os.ilistdir({}):\n print('{{}}/{{}}'.format(f[0],'f'if f[1]&{:#x} else'd'))",
                python_str(path),
                STAT_FILE_FLAG
            ),
            RemoteCommand::ReadFile { path } => format!(
                "import binascii\nwith open({},'rb') as f:\n while 1:\n  b=f.read({})\n  if not b:break\n  print(binascii.hexlify(b).decode())",
                python_str(path),
                READ_CHUNK_SIZE
            ),
            RemoteCommand::MakeDir { path } => format!("os.mkdir({})", python_str(path)),
            RemoteCommand::Remove { path } => format!("os.remove({})", python_str(path)),
            RemoteCommand::RemoveDir { path } => format!("os.rmdir({})", python_str(path)),
            RemoteCommand::Rename { from, to } => {
                format!("os.rename({},{})", python_str(from), python_str(to))
            }
            RemoteCommand::OpenForWrite { path, append } => format!(
                "f=open({},'{}b')\nw=f.write",
                python_str(path),
                if *append { 'a' } else { 'w' }
            ),
            RemoteCommand::WriteChunk { data } => format!("w({})", python_bytes(data)),
            RemoteCommand::CloseFile => "f.close()".to_string(),
            RemoteCommand::ConnectWlan { ssid, password } => format!(
                "import network\nw=network.WLAN(network.STA_IF)\nw.active(True)\nif w.isconnected():\n w.disconnect()\nw.connect({},{})",
                python_str(ssid),
                python_str(password)
            ),
            RemoteCommand::StartWebRepl => "import webrepl\nwebrepl.start()".to_string(),
        }
    }
}

/// Quote text as a single-quoted Python string literal.
pub fn python_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote raw bytes as a Python bytes literal (`b'...'`).
pub fn python_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 3);
    out.push_str("b'");
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", byte);
            }
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_code() {
        let cmd = RemoteCommand::Stat { path: "/main.py".to_string() };
        assert_eq!(
            cmd.to_code(),
            "f=os.stat('/main.py')\nprint('{}/{}/{}/{}'.format('f'if f[0]&0x8000 else'd',f[9],f[8],f[6]))"
        );
    }

    #[test]
    fn test_list_dir_code() {
        let cmd = RemoteCommand::ListDir { path: "/lib".to_string() };
        assert_eq!(
            cmd.to_code(),
            "for f in os.ilistdir('/lib'):\n print('{}/{}'.format(f[0],'f'if f[1]&0x8000 else'd'))"
        );
    }

    #[test]
    fn test_open_for_write_modes() {
        let write = RemoteCommand::OpenForWrite { path: "/a.txt".to_string(), append: false };
        let append = RemoteCommand::OpenForWrite { path: "/a.txt".to_string(), append: true };
        assert_eq!(write.to_code(), "f=open('/a.txt','wb')\nw=f.write");
        assert_eq!(append.to_code(), "f=open('/a.txt','ab')\nw=f.write");
    }

    #[test]
    fn test_rename_code() {
        let cmd = RemoteCommand::Rename { from: "/a".to_string(), to: "/b".to_string() };
        assert_eq!(cmd.to_code(), "os.rename('/a','/b')");
    }

    #[test]
    fn test_python_str_escapes_quotes() {
        assert_eq!(python_str("it's"), "'it\\'s'");
        assert_eq!(python_str("a\\b"), "'a\\\\b'");
        assert_eq!(python_str("x\u{1}"), "'x\\x01'");
    }

    #[test]
    fn test_python_bytes_escapes() {
        assert_eq!(python_bytes(b"hi\n"), "b'hi\\n'");
        assert_eq!(python_bytes(&[0x00, 0xff]), "b'\\x00\\xff'");
        assert_eq!(python_bytes(b"'\\"), "b'\\'\\\\'");
    }

    #[test]
    fn test_connect_wlan_code() {
        let cmd = RemoteCommand::ConnectWlan {
            ssid: "home".to_string(),
            password: "it's".to_string(),
        };
        assert_eq!(
            cmd.to_code(),
            "import network\nw=network.WLAN(network.STA_IF)\nw.active(True)\nif w.isconnected():\n w.disconnect()\nw.connect('home','it\\'s')"
        );
    }

    #[test]
    fn test_write_chunk_code() {
        let cmd = RemoteCommand::WriteChunk { data: b"print(1)\n".to_vec() };
        assert_eq!(cmd.to_code(), "w(b'print(1)\\n')");
    }
}
