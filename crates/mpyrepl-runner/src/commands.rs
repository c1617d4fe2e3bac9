//! Command execution against a connected session.
//!
//! Results go to a [`Console`] as plain text or, with `--json`, as one JSON
//! document per command. Program output is streamed as it arrives in text
//! mode and collected in JSON mode.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mpyrepl_session::{
    join_path, EntryKind, ExecutionResult, Output, RemoteFs, SharedSession, WebRepl,
    WebReplSetup, WriteOptions,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::boards::{BoardRecord, BoardRegistry};
use crate::cli::{Command, WebReplAction};
use crate::error::{RunnerError, RunnerResult};

/// Output destinations for a command.
pub struct Console<W, E> {
    out: W,
    err: E,
    json: bool,
    interrupts: Option<mpsc::UnboundedReceiver<()>>,
}

impl<W: Write, E: Write> Console<W, E> {
    pub fn new(out: W, err: E, json: bool) -> Self {
        Console {
            out,
            err,
            json,
            interrupts: None,
        }
    }

    /// Forward every message on `interrupts` to the board while code runs.
    pub fn with_interrupts(mut self, interrupts: mpsc::UnboundedReceiver<()>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// The writers, for inspection after a run.
    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }

    fn emit_json(&mut self, value: &impl Serialize) -> RunnerResult<()> {
        serde_json::to_writer_pretty(&mut self.out, value)?;
        writeln!(self.out)?;
        Ok(())
    }

    async fn next_interrupt(&mut self) -> Option<()> {
        match self.interrupts.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}

/// Run `command` on `session`.
///
/// A remote exception raised by user code is printed and then reported as
/// [`RunnerError::RemoteException`] so the process can exit non-zero.
pub async fn run_command<W: Write, E: Write>(
    session: &SharedSession,
    command: &Command,
    console: &mut Console<W, E>,
) -> RunnerResult<()> {
    debug!(?command, "running command");
    let fs = RemoteFs::new(session.as_ref());
    match command {
        Command::Exec { code } => run_code(session, code, console).await,
        Command::Run { file } => {
            let code = std::fs::read_to_string(file)?;
            info!(file = %file.display(), len = code.len(), "running script");
            run_code(session, &code, console).await
        }
        Command::Eval { expr } => {
            let value = session.eval(expr).await?;
            if console.json {
                console.emit_json(&json!({ "expr": expr, "value": value }))
            } else {
                writeln!(console.out, "{}", value)?;
                Ok(())
            }
        }
        Command::Ls { path } => {
            let entries = fs.list_dir(path).await?;
            if console.json {
                return console.emit_json(&entries);
            }
            for entry in entries {
                match entry.kind {
                    EntryKind::Directory => writeln!(console.out, "{}/", entry.name)?,
                    EntryKind::File => writeln!(console.out, "{}", entry.name)?,
                }
            }
            Ok(())
        }
        Command::Cat { path } => {
            let content = fs.read_file(path).await?;
            if console.json {
                let text = String::from_utf8_lossy(&content);
                console.emit_json(&json!({ "path": path, "content": text }))
            } else {
                console.out.write_all(&content)?;
                console.out.flush()?;
                Ok(())
            }
        }
        Command::Stat { path } => {
            let stat = fs.stat(path).await?;
            if console.json {
                return console.emit_json(&stat);
            }
            let kind = match stat.kind {
                EntryKind::File => "file",
                EntryKind::Directory => "directory",
            };
            writeln!(
                console.out,
                "{}: {}, {} bytes, mtime {}, ctime {}",
                path, kind, stat.size, stat.mtime, stat.ctime
            )?;
            Ok(())
        }
        Command::Put {
            local,
            remote,
            no_overwrite,
            append,
            binary,
        } => {
            let content = std::fs::read(local)?;
            let remote = match remote {
                Some(remote) => remote.clone(),
                None => join_path("/", &file_name(local)?),
            };
            let mut options = if *append {
                WriteOptions::append()
            } else if *no_overwrite {
                WriteOptions::create_new()
            } else {
                WriteOptions::default()
            };
            if *binary {
                options = options.binary();
            }

            let json = console.json;
            let err = &mut console.err;
            fs.write_file(&remote, &content, options, |sent, total| {
                if !json {
                    let _ = write!(err, "\r{}: {}/{} bytes", remote, sent, total);
                }
            })
            .await?;
            if json {
                console.emit_json(&json!({ "path": remote, "bytes": content.len() }))
            } else {
                writeln!(console.err)?;
                Ok(())
            }
        }
        Command::Get { remote, local } => {
            let content = fs.read_file(remote).await?;
            let local = match local {
                Some(local) => local.clone(),
                None => PathBuf::from(remote_name(remote)),
            };
            std::fs::write(&local, &content)?;
            if console.json {
                console.emit_json(&json!({ "path": local, "bytes": content.len() }))
            } else {
                Ok(())
            }
        }
        Command::Mkdir { path } => {
            fs.create_dir(path).await?;
            done(console, path)
        }
        Command::Rm { path, recursive } => {
            fs.remove(path, *recursive).await?;
            done(console, path)
        }
        Command::Mv { from, to, force } => {
            fs.rename(from, to, *force).await?;
            done(console, to)
        }
        Command::Webrepl { action } => run_webrepl(session, action, console).await,
    }
}

async fn run_webrepl<W: Write, E: Write>(
    session: &SharedSession,
    action: &WebReplAction,
    console: &mut Console<W, E>,
) -> RunnerResult<()> {
    let webrepl = WebRepl::new(session.as_ref());
    match action {
        WebReplAction::Url => {
            let url = webrepl.url().await?;
            if console.json {
                console.emit_json(&json!({ "url": url }))
            } else {
                writeln!(console.out, "{}", url)?;
                Ok(())
            }
        }
        WebReplAction::Setup {
            ssid,
            wlan_password,
            webrepl_password,
            name,
            save_to,
            settle_ms,
        } => {
            let setup = WebReplSetup::new(ssid, wlan_password, webrepl_password)
                .with_settle(Duration::from_millis(*settle_ms));
            let url = webrepl.configure(&setup).await?;

            let mut registry = BoardRegistry::load(save_to)?;
            let record = BoardRecord::now(name, &url, webrepl_password);
            registry.upsert(record.clone());
            registry.save()?;
            info!(board = %name, url = %url, registry = %save_to.display(), "board saved");

            if console.json {
                console.emit_json(&record)
            } else {
                writeln!(console.out, "{} is at {}", name, url)?;
                Ok(())
            }
        }
    }
}

/// Stream a run to the console, forwarding interrupts to the board.
async fn run_code<W: Write, E: Write>(
    session: &SharedSession,
    code: &str,
    console: &mut Console<W, E>,
) -> RunnerResult<()> {
    let mut stream = session.execute_stream(code)?;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        tokio::select! {
            output = stream.next() => match output {
                Some(Output::Stdout(byte)) => {
                    stdout.push(byte);
                    if !console.json {
                        console.out.write_all(&[byte])?;
                        if byte == b'\n' {
                            console.out.flush()?;
                        }
                    }
                }
                Some(Output::Stderr(byte)) => {
                    stderr.push(byte);
                    if !console.json {
                        console.err.write_all(&[byte])?;
                    }
                }
                Some(Output::Started) | Some(Output::Finished) => {}
                None => break,
            },
            Some(()) = console.next_interrupt() => {
                info!("interrupting board");
                session.interrupt().await?;
            }
        }
    }
    stream.finish().await?;
    console.out.flush()?;
    console.err.flush()?;

    let result = ExecutionResult::new(
        String::from_utf8_lossy(&stdout),
        String::from_utf8_lossy(&stderr),
    );
    if console.json {
        console.emit_json(&result)?;
    }
    match result.exception_summary() {
        Some(summary) => Err(RunnerError::RemoteException(summary.to_string())),
        None => Ok(()),
    }
}

fn done<W: Write, E: Write>(console: &mut Console<W, E>, path: &str) -> RunnerResult<()> {
    if console.json {
        console.emit_json(&json!({ "path": path, "ok": true }))
    } else {
        Ok(())
    }
}

fn file_name(local: &Path) -> RunnerResult<String> {
    local
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            RunnerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", local.display()),
            ))
        })
}

/// Last component of a remote path.
fn remote_name(remote: &str) -> &str {
    remote
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_name() {
        assert_eq!(remote_name("/lib/util.py"), "util.py");
        assert_eq!(remote_name("main.py"), "main.py");
        assert_eq!(remote_name("/lib/"), "lib");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("scripts/blink.py")).unwrap(), "blink.py");
        assert!(file_name(Path::new("/")).is_err());
    }
}
