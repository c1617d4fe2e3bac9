//! Remote filesystem helper against scripted device replies.

use std::time::Duration;

use mpyrepl_protocol::{EntryKind, RemoteCommand, WRITE_CHUNK_SIZE};
use mpyrepl_session::{RemoteFs, RemoteFsError, Session, SessionConfig, WriteOptions};
use mpyrepl_transport::{SimDevice, SimResponse, SimTransport};

const ENOENT: &str = "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\nOSError: [Errno 2] ENOENT\r\n";

fn code(command: RemoteCommand) -> String {
    command.to_code()
}

fn stat_code(path: &str) -> String {
    code(RemoteCommand::Stat { path: path.into() })
}

fn script_file(device: &SimDevice, path: &str, size: u64) {
    device.respond(&stat_code(path), SimResponse::stdout(format!("f/100/200/{}\r\n", size)));
}

fn script_dir(device: &SimDevice, path: &str, listing: &str) {
    device.respond(&stat_code(path), SimResponse::stdout("d/0/0/0\r\n"));
    device.respond(
        &code(RemoteCommand::ListDir { path: path.into() }),
        SimResponse::stdout(listing),
    );
}

fn script_missing(device: &SimDevice, path: &str) {
    device.respond(&stat_code(path), SimResponse::stderr(ENOENT));
}

async fn session(device: &SimDevice) -> Session<SimTransport> {
    let config = SessionConfig::default()
        .with_handshake_timeout(Duration::from_millis(50))
        .with_output_timeout(Some(Duration::from_millis(500)));
    let session = Session::with_config(device.transport(), config);
    session.initialize().await.unwrap();
    session
}

#[tokio::test]
async fn test_stat() {
    let device = SimDevice::new();
    script_file(&device, "/main.py", 321);
    script_missing(&device, "/nope.py");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    let stat = fs.stat("/main.py").await.unwrap();
    assert_eq!(stat.kind, EntryKind::File);
    assert_eq!((stat.ctime, stat.mtime, stat.size), (100, 200, 321));

    assert!(matches!(fs.stat("/nope.py").await, Err(RemoteFsError::NotFound(p)) if p == "/nope.py"));
    assert!(fs.try_stat("/nope.py").await.unwrap().is_none());
    assert!(!fs.exists("/nope.py").await.unwrap());
}

#[tokio::test]
async fn test_list_dir() {
    let device = SimDevice::new();
    script_dir(&device, "/", "boot.py/f\r\nlib/d\r\n");
    script_file(&device, "/boot.py", 10);
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    let entries = fs.list_dir("/").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "boot.py");
    assert_eq!(entries[0].kind, EntryKind::File);
    assert_eq!(entries[1].name, "lib");
    assert_eq!(entries[1].kind, EntryKind::Directory);

    assert!(matches!(
        fs.list_dir("/boot.py").await,
        Err(RemoteFsError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn test_read_file() {
    let device = SimDevice::new();
    script_file(&device, "/hello.txt", 5);
    device.respond(
        &code(RemoteCommand::ReadFile { path: "/hello.txt".into() }),
        SimResponse::stdout("68656c\r\n6c6f\r\n"),
    );
    script_dir(&device, "/lib", "");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    assert_eq!(fs.read_file("/hello.txt").await.unwrap(), b"hello".to_vec());
    assert!(matches!(fs.read_file("/lib").await, Err(RemoteFsError::IsADirectory(_))));
}

#[tokio::test]
async fn test_create_dir() {
    let device = SimDevice::new();
    script_dir(&device, "/lib", "");
    script_missing(&device, "/data");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    assert!(matches!(fs.create_dir("/lib").await, Err(RemoteFsError::AlreadyExists(_))));
    fs.create_dir("/data").await.unwrap();
    assert!(device
        .submissions()
        .contains(&code(RemoteCommand::MakeDir { path: "/data".into() })));
}

#[tokio::test]
async fn test_write_file_in_chunks() {
    let device = SimDevice::new();
    script_missing(&device, "/big.txt");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    let mut content = Vec::new();
    for i in 0..30 {
        content.extend_from_slice(format!("line {:02}\r\n", i).as_bytes());
    }
    let stripped: Vec<u8> = content.iter().copied().filter(|&b| b != b'\r').collect();

    let mut progress = Vec::new();
    fs.write_file("/big.txt", &content, WriteOptions::default(), |sent, total| {
        progress.push((sent, total))
    })
    .await
    .unwrap();

    let chunks: Vec<String> = stripped
        .chunks(WRITE_CHUNK_SIZE)
        .map(|chunk| code(RemoteCommand::WriteChunk { data: chunk.to_vec() }))
        .collect();
    let mut expected = vec![code(RemoteCommand::OpenForWrite {
        path: "/big.txt".into(),
        append: false,
    })];
    expected.extend(chunks.iter().cloned());
    expected.push(code(RemoteCommand::CloseFile));

    let submissions = device.submissions();
    assert_eq!(submissions[submissions.len() - expected.len()..], expected[..]);
    assert_eq!(progress.len(), chunks.len());
    assert_eq!(progress.last(), Some(&(stripped.len(), stripped.len())));
}

#[tokio::test]
async fn test_write_file_checks() {
    let device = SimDevice::new();
    script_file(&device, "/exists.txt", 3);
    script_missing(&device, "/missing.txt");
    script_dir(&device, "/lib", "");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);
    let noop = |_: usize, _: usize| {};

    assert!(matches!(
        fs.write_file("/exists.txt", b"x", WriteOptions::create_new(), noop).await,
        Err(RemoteFsError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.write_file("/missing.txt", b"x", WriteOptions::append(), noop).await,
        Err(RemoteFsError::NotFound(_))
    ));
    assert!(matches!(
        fs.write_file("/lib", b"x", WriteOptions::default(), noop).await,
        Err(RemoteFsError::IsADirectory(_))
    ));

    fs.write_file("/exists.txt", b"more", WriteOptions::append(), noop)
        .await
        .unwrap();
    assert!(device.submissions().contains(&code(RemoteCommand::OpenForWrite {
        path: "/exists.txt".into(),
        append: true,
    })));
}

#[tokio::test]
async fn test_remove_recursive() {
    let device = SimDevice::new();
    script_dir(&device, "/d", "a.txt/f\r\nsub/d\r\n");
    script_dir(&device, "/d/sub", "b.txt/f\r\n");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    assert!(matches!(fs.remove("/d", false).await, Err(RemoteFsError::IsADirectory(_))));
    fs.remove("/d", true).await.unwrap();

    let removals: Vec<String> = device
        .submissions()
        .into_iter()
        .filter(|code| code.starts_with("os.remove") || code.starts_with("os.rmdir"))
        .collect();
    assert_eq!(
        removals,
        vec![
            code(RemoteCommand::Remove { path: "/d/a.txt".into() }),
            code(RemoteCommand::Remove { path: "/d/sub/b.txt".into() }),
            code(RemoteCommand::RemoveDir { path: "/d/sub".into() }),
            code(RemoteCommand::RemoveDir { path: "/d".into() }),
        ]
    );
}

#[tokio::test]
async fn test_rename() {
    let device = SimDevice::new();
    script_file(&device, "/new.py", 1);
    script_missing(&device, "/free.py");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    assert!(matches!(
        fs.rename("/old.py", "/new.py", false).await,
        Err(RemoteFsError::AlreadyExists(p)) if p == "/new.py"
    ));
    fs.rename("/old.py", "/new.py", true).await.unwrap();
    fs.rename("/old.py", "/free.py", false).await.unwrap();

    let renames: Vec<String> = device
        .submissions()
        .into_iter()
        .filter(|code| code.starts_with("os.rename"))
        .collect();
    assert_eq!(renames.len(), 2);
}

#[tokio::test]
async fn test_remote_error_passthrough() {
    let device = SimDevice::new();
    device.respond(
        &code(RemoteCommand::MakeDir { path: "/full".into() }),
        SimResponse::stderr("OSError: [Errno 28] ENOSPC\r\n"),
    );
    script_missing(&device, "/full");
    let session = session(&device).await;
    let fs = RemoteFs::new(&session);

    match fs.create_dir("/full").await {
        Err(RemoteFsError::Remote { path, message }) => {
            assert_eq!(path, "/full");
            assert!(message.contains("ENOSPC"));
        }
        other => panic!("unexpected {:?}", other),
    }
}
