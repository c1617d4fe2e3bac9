//! End-to-end driver behaviour against the simulated device.

use std::sync::Arc;
use std::time::Duration;

use mpyrepl_session::{Output, Session, SessionConfig, SessionError, SyncState};
use mpyrepl_transport::{SimDevice, SimResponse, SimTransport, WireEvent};

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_handshake_timeout(Duration::from_millis(30))
        .with_handshake_retry_delay(Duration::from_millis(1))
        .with_prompt_timeout(Some(Duration::from_millis(500)))
        .with_ack_timeout(Some(Duration::from_millis(500)))
        .with_prime_import(false)
}

async fn connect(device: &SimDevice, config: SessionConfig) -> Arc<Session<SimTransport>> {
    let session = Arc::new(Session::with_config(device.transport(), config));
    session.initialize().await.unwrap();
    session
}

fn position_of_write(events: &[WireEvent], data: &[u8]) -> usize {
    events
        .iter()
        .position(|event| *event == WireEvent::Write(data.to_vec()))
        .unwrap()
}

fn reads_between(events: &[WireEvent], from: usize, to: usize) -> Vec<u8> {
    events[from..to]
        .iter()
        .filter_map(|event| match event {
            WireEvent::Read(data) => Some(data.clone()),
            WireEvent::Write(_) => None,
        })
        .flatten()
        .collect()
}

#[tokio::test]
async fn test_print_scenario() {
    let device = SimDevice::new();
    device.respond("print(2+2)", SimResponse::stdout("4"));
    let session = connect(&device, config()).await;

    let result = session.execute("print(2+2)").await.unwrap();
    assert_eq!(result.output, "4");
    assert_eq!(result.error, "");
}

#[tokio::test]
async fn test_division_by_zero_scenario() {
    let device = SimDevice::new();
    device.respond("1/0", SimResponse::stderr("ZeroDivisionError: division by zero"));
    let session = connect(&device, config()).await;

    let result = session.execute("1/0").await.unwrap();
    assert_eq!(result.output, "");
    assert_eq!(result.error, "ZeroDivisionError: division by zero");
    // A remote exception is data, not a failure.
    assert_eq!(device.raw_mode_requests(), 1);
    assert_eq!(session.state(), SyncState::Ready);
}

#[tokio::test]
async fn test_exactly_one_channel_populated() {
    let device = SimDevice::new();
    let cases = [
        ("print('a')", SimResponse::stdout("a\r\n"), true),
        ("raise OSError(5)", SimResponse::stderr("OSError: 5\r\n"), false),
        ("print('é' * 3)", SimResponse::stdout("ééé\r\n"), true),
    ];
    for (code, response, _) in &cases {
        device.respond(code, response.clone());
    }
    let session = connect(&device, config()).await;

    for (code, _, on_stdout) in &cases {
        let result = session.execute(code).await.unwrap();
        assert_eq!(!result.output.is_empty(), *on_stdout, "{}", code);
        assert_eq!(!result.error.is_empty(), !*on_stdout, "{}", code);
    }
}

#[tokio::test]
async fn test_empty_code_writes_nothing() {
    let device = SimDevice::new();
    let session = connect(&device, config()).await;
    let events_before = device.events().len();

    let result = session.execute("").await.unwrap();
    assert_eq!(result.output, "");
    assert_eq!(result.error, "");
    assert_eq!(device.events().len(), events_before);
}

#[tokio::test]
async fn test_concurrent_executes_do_not_interleave() {
    let device = SimDevice::new();
    device.set_latency(Duration::from_millis(2));
    device.respond("a()", SimResponse::stdout("first"));
    device.respond("b()", SimResponse::stderr("second"));
    let session = connect(&device, config()).await;

    let (first, second) = tokio::join!(session.execute("a()"), session.execute("b()"));
    assert_eq!(first.unwrap().output, "first");
    assert_eq!(second.unwrap().error, "second");

    let events = device.events();
    let a = position_of_write(&events, b"a()\x04");
    let b = position_of_write(&events, b"b()\x04");
    let (early, late, early_reply) = if a < b {
        (a, b, "OKfirst\x04\x04>")
    } else {
        (b, a, "OK\x04second\x04>")
    };
    // Everything the first call read, including its final terminator and
    // the next prompt, happened before the second call wrote.
    assert_eq!(reads_between(&events, early, late), early_reply.as_bytes().to_vec());
}

#[tokio::test]
async fn test_handshake_retries_until_banner_appears() {
    let device = SimDevice::new();
    device.set_banner_enabled(false);
    let session = Arc::new(Session::with_config(
        device.transport(),
        config()
            .with_handshake_timeout(Duration::from_millis(10))
            .with_max_handshake_attempts(None),
    ));

    let initializing = {
        let session = session.clone();
        tokio::spawn(async move { session.initialize().await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!initializing.is_finished());
    assert!(device.raw_mode_requests() >= 5, "only {} attempts", device.raw_mode_requests());
    assert_eq!(session.state(), SyncState::HandshakeSent);

    device.set_banner_enabled(true);
    tokio::time::timeout(Duration::from_secs(2), initializing)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(session.state(), SyncState::Ready);
}

#[tokio::test]
async fn test_timeout_mid_execute_recovers() {
    let device = SimDevice::new();
    device.respond("slow()", SimResponse::stdout("partial"));
    device.respond("print(2+2)", SimResponse::stdout("4"));
    device.stall_next_submission();
    let session = connect(
        &device,
        config().with_output_timeout(Some(Duration::from_millis(50))),
    )
    .await;
    let written_before = device.written().len();

    // (a) the call fails
    let err = session.execute("slow()").await.unwrap_err();
    assert!(matches!(err, SessionError::ReadTimeout { ref sentinel } if sentinel == "\x04"));

    // (b) a full handshake followed on the wire
    assert_eq!(device.raw_mode_requests(), 2);
    let written = device.written();
    let after = &written[written_before..];
    let handshake = b"\r\x03\x03\x01";
    assert!(after.windows(handshake.len()).any(|window| window == handshake));
    assert_eq!(session.state(), SyncState::Ready);

    // (c) new calls are accepted
    assert_eq!(session.execute("print(2+2)").await.unwrap().output, "4");
}

#[tokio::test]
async fn test_injected_read_timeout_recovers() {
    let device = SimDevice::new();
    let session = connect(&device, config()).await;

    device.fail_next_reads(1);
    assert!(session.execute("x = 1").await.is_err());
    assert_eq!(device.raw_mode_requests(), 2);
    assert!(session.execute("x = 2").await.unwrap().is_success());
}

#[tokio::test]
async fn test_interactive_callback_order_and_count() {
    let device = SimDevice::new();
    let stdout = "line one\r\nline two\r\n";
    let stderr = "Traceback (most recent call last):\r\nValueError: x\r\n";
    device.respond(
        "run()",
        SimResponse {
            stdout: stdout.into(),
            stderr: stderr.into(),
        },
    );
    let session = connect(&device, config()).await;

    let mut events = Vec::new();
    session
        .execute_interactive("run()", |output| events.push(output))
        .await
        .unwrap();

    assert_eq!(events[0], Output::Started);
    let bytes: Vec<Output> = events[1..].to_vec();
    assert_eq!(bytes.len(), stdout.len() + stderr.len());
    let expected: Vec<Output> = stdout
        .bytes()
        .map(Output::Stdout)
        .chain(stderr.bytes().map(Output::Stderr))
        .collect();
    assert_eq!(bytes, expected);
}

#[tokio::test]
async fn test_interrupt_while_streaming() {
    let device = SimDevice::new();
    device.respond("while True: pass", SimResponse::stdout("spin"));
    device.stall_next_submission();
    let session = connect(&device, config()).await;

    let mut stream = session.execute_stream("while True: pass").unwrap();
    assert_eq!(stream.next().await, Some(Output::Started));
    for byte in b"spin" {
        assert_eq!(stream.next().await, Some(Output::Stdout(*byte)));
    }
    // The lock is held by the stream; the interrupt goes around it.
    assert!(session.is_busy());
    session.interrupt().await.unwrap();

    let result = stream.finish().await.unwrap();
    assert_eq!(result.output, "");
    assert!(result.error.contains("KeyboardInterrupt"));
    assert!(!session.is_busy());
    assert_eq!(device.raw_mode_requests(), 1);
}

#[tokio::test]
async fn test_close_interrupts_pending_execute() {
    let device = SimDevice::new();
    device.stall_next_submission();
    let session = connect(&device, config()).await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.execute("forever()").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.close().await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Closed));
    assert_eq!(session.state(), SyncState::Closed);
    // No recovery is attempted on a closed session.
    assert_eq!(device.raw_mode_requests(), 1);
}

#[tokio::test]
async fn test_stream_resyncs_after_failed_recovery() {
    let device = SimDevice::new();
    device.respond("print(3)", SimResponse::stdout("3"));
    let session = connect(&device, config().with_max_handshake_attempts(Some(1))).await;

    device.set_banner_enabled(false);
    device.fail_next_reads(1);
    assert!(session.execute("x = 1").await.is_err());
    assert_eq!(session.state(), SyncState::Unsynced);

    device.set_banner_enabled(true);
    let result = session.execute_stream("print(3)").unwrap().finish().await.unwrap();
    assert_eq!(result.output, "3");
    assert_eq!(device.raw_mode_requests(), 3);
    assert_eq!(session.state(), SyncState::Ready);
}
