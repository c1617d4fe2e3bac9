//! Remote filesystem helper.
//!
//! File operations have no protocol messages of their own. Each one runs a
//! small snippet through [`Session::execute`] and parses what it prints.
//! A raised `OSError` is mapped onto the matching [`RemoteFsError`].

use mpyrepl_protocol::{
    parse_dir_listing, parse_hex_dump, DirEntry, EntryKind, ExecutionResult, ProtocolError,
    RemoteCommand, RemoteStat, WRITE_CHUNK_SIZE,
};
use mpyrepl_transport::Transport;
use thiserror::Error;
use tracing::debug;

use crate::error::SessionError;
use crate::session::Session;

/// Errors raised by [`RemoteFs`].
#[derive(Debug, Error)]
pub enum RemoteFsError {
    /// The session failed underneath the operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The device printed something the helper could not parse, or a
    /// WebREPL precondition failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The path does not exist.
    #[error("{0}: no such file or directory")]
    NotFound(String),

    /// The path exists and the operation would replace it.
    #[error("{0}: already exists")]
    AlreadyExists(String),

    /// A file operation was applied to a directory.
    #[error("{0}: is a directory")]
    IsADirectory(String),

    /// A directory operation was applied to a file.
    #[error("{0}: not a directory")]
    NotADirectory(String),

    /// Any other exception raised by the device.
    #[error("{path}: {message}")]
    Remote {
        /// Path the operation was applied to.
        path: String,
        /// Last line of the traceback.
        message: String,
    },
}

/// Result type alias for remote filesystem operations.
pub type RemoteFsResult<T> = Result<T, RemoteFsError>;

/// How [`RemoteFs::write_file`] treats an existing or missing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Replace an existing file. Only checked together with `create`.
    pub overwrite: bool,
    /// Append instead of truncating.
    pub append: bool,
    /// Drop `\r` bytes from the content before sending.
    pub strip_carriage_returns: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            create: true,
            overwrite: true,
            append: false,
            strip_carriage_returns: true,
        }
    }
}

impl WriteOptions {
    /// Create a new file, failing if one exists.
    pub fn create_new() -> Self {
        WriteOptions {
            overwrite: false,
            ..Default::default()
        }
    }

    /// Append to an existing file.
    pub fn append() -> Self {
        WriteOptions {
            create: false,
            append: true,
            ..Default::default()
        }
    }

    /// Send bytes exactly as given.
    pub fn binary(mut self) -> Self {
        self.strip_carriage_returns = false;
        self
    }
}

/// Filesystem operations on the device behind a session.
pub struct RemoteFs<'a, T> {
    session: &'a Session<T>,
}

impl<'a, T: Transport> RemoteFs<'a, T> {
    /// Borrow `session` for filesystem access. The session must have `os`
    /// imported (the default handshake does this).
    pub fn new(session: &'a Session<T>) -> Self {
        RemoteFs { session }
    }

    async fn run(&self, path: &str, command: RemoteCommand) -> RemoteFsResult<String> {
        let result = self.session.execute(&command.to_code()).await?;
        check(path, result)
    }

    /// Kind, timestamps and size of `path`.
    pub async fn stat(&self, path: &str) -> RemoteFsResult<RemoteStat> {
        let output = self
            .run(
                path,
                RemoteCommand::Stat {
                    path: path.to_string(),
                },
            )
            .await?;
        Ok(RemoteStat::parse(&output)?)
    }

    /// Like [`stat`](Self::stat), with a missing path as `None`.
    pub async fn try_stat(&self, path: &str) -> RemoteFsResult<Option<RemoteStat>> {
        match self.stat(path).await {
            Ok(stat) => Ok(Some(stat)),
            Err(RemoteFsError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// True if `path` exists.
    pub async fn exists(&self, path: &str) -> RemoteFsResult<bool> {
        Ok(self.try_stat(path).await?.is_some())
    }

    /// Entries of the directory at `path`.
    pub async fn list_dir(&self, path: &str) -> RemoteFsResult<Vec<DirEntry>> {
        if !self.stat(path).await?.is_dir() {
            return Err(RemoteFsError::NotADirectory(path.to_string()));
        }
        let output = self
            .run(
                path,
                RemoteCommand::ListDir {
                    path: path.to_string(),
                },
            )
            .await?;
        Ok(parse_dir_listing(&output)?)
    }

    /// Create a directory. Fails if anything already exists at `path`.
    pub async fn create_dir(&self, path: &str) -> RemoteFsResult<()> {
        if self.exists(path).await? {
            return Err(RemoteFsError::AlreadyExists(path.to_string()));
        }
        self.run(
            path,
            RemoteCommand::MakeDir {
                path: path.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    /// Full content of the file at `path`.
    pub async fn read_file(&self, path: &str) -> RemoteFsResult<Vec<u8>> {
        if self.stat(path).await?.is_dir() {
            return Err(RemoteFsError::IsADirectory(path.to_string()));
        }
        let output = self
            .run(
                path,
                RemoteCommand::ReadFile {
                    path: path.to_string(),
                },
            )
            .await?;
        Ok(parse_hex_dump(&output)?)
    }

    /// Write `content` to `path` in chunks, holding the session for the
    /// whole transfer.
    ///
    /// `progress` is called after every chunk with bytes sent and total.
    pub async fn write_file<F>(
        &self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
        mut progress: F,
    ) -> RemoteFsResult<()>
    where
        F: FnMut(usize, usize),
    {
        let existing = self.try_stat(path).await?;
        match existing {
            Some(stat) if stat.is_dir() => {
                return Err(RemoteFsError::IsADirectory(path.to_string()))
            }
            None if !options.create => return Err(RemoteFsError::NotFound(path.to_string())),
            Some(_) if options.create && !options.overwrite => {
                return Err(RemoteFsError::AlreadyExists(path.to_string()))
            }
            _ => {}
        }

        let data: Vec<u8> = if options.strip_carriage_returns {
            content.iter().copied().filter(|&byte| byte != b'\r').collect()
        } else {
            content.to_vec()
        };
        let total = data.len();
        debug!(path, total, append = options.append, "writing remote file");

        let mut section = self.session.exclusive().await?;
        let outcome = async {
            let open = RemoteCommand::OpenForWrite {
                path: path.to_string(),
                append: options.append,
            };
            check(path, section.execute(&open.to_code()).await?)?;

            let mut sent = 0;
            for chunk in data.chunks(WRITE_CHUNK_SIZE) {
                let write = RemoteCommand::WriteChunk {
                    data: chunk.to_vec(),
                };
                check(path, section.execute(&write.to_code()).await?)?;
                sent += chunk.len();
                progress(sent, total);
            }

            check(path, section.execute(&RemoteCommand::CloseFile.to_code()).await?)?;
            Ok::<(), RemoteFsError>(())
        }
        .await;
        section.release().await;
        outcome
    }

    /// Remove a file, or a directory when `recursive` is set.
    pub async fn remove(&self, path: &str, recursive: bool) -> RemoteFsResult<()> {
        if !self.stat(path).await?.is_dir() {
            self.run(
                path,
                RemoteCommand::Remove {
                    path: path.to_string(),
                },
            )
            .await?;
            return Ok(());
        }
        if !recursive {
            return Err(RemoteFsError::IsADirectory(path.to_string()));
        }

        // Depth-first without recursion: directories are removed after
        // everything below them.
        let mut pending = vec![(path.to_string(), false)];
        while let Some((dir, expanded)) = pending.pop() {
            if expanded {
                self.run(&dir, RemoteCommand::RemoveDir { path: dir.clone() })
                    .await?;
                continue;
            }
            pending.push((dir.clone(), true));
            for entry in self.list_dir(&dir).await? {
                let child = join_path(&dir, &entry.name);
                match entry.kind {
                    EntryKind::Directory => pending.push((child, false)),
                    EntryKind::File => {
                        self.run(&child, RemoteCommand::Remove { path: child.clone() })
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Rename `from` to `to`. Fails if `to` exists unless `overwrite` is set.
    pub async fn rename(&self, from: &str, to: &str, overwrite: bool) -> RemoteFsResult<()> {
        if !overwrite && self.exists(to).await? {
            return Err(RemoteFsError::AlreadyExists(to.to_string()));
        }
        self.run(
            from,
            RemoteCommand::Rename {
                from: from.to_string(),
                to: to.to_string(),
            },
        )
        .await?;
        Ok(())
    }
}

/// Join a directory and an entry name with exactly one `/`.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Turn a raised exception into an error, or return the printed output.
pub(crate) fn check(path: &str, result: ExecutionResult) -> RemoteFsResult<String> {
    if result.is_success() {
        return Ok(result.output);
    }
    let message = result.exception_summary().unwrap_or_default().to_string();
    Err(classify(path, message))
}

fn classify(path: &str, message: String) -> RemoteFsError {
    let path = path.to_string();
    if message.contains("ENOENT") || message.contains("[Errno 2]") {
        RemoteFsError::NotFound(path)
    } else if message.contains("EEXIST") || message.contains("[Errno 17]") {
        RemoteFsError::AlreadyExists(path)
    } else if message.contains("EISDIR") || message.contains("[Errno 21]") {
        RemoteFsError::IsADirectory(path)
    } else if message.contains("ENOTDIR") || message.contains("[Errno 20]") {
        RemoteFsError::NotADirectory(path)
    } else {
        RemoteFsError::Remote { path, message }
    }
}
