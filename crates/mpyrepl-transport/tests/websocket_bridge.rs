//! WebREPL login and raw REPL traffic over a real WebSocket, with a
//! simulated device answering behind the server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mpyrepl_protocol::{
    CTRL_A, INTERRUPT_SEQUENCE, RAW_REPL_BANNER, WEBREPL_CONNECTED, WEBREPL_PASSWORD_PROMPT,
};
use mpyrepl_transport::{
    ConnectionKind, ConnectionProfile, SimDevice, SimResponse, Transport, TransportError,
};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

/// Serve one WebREPL client: demand `password`, then relay text frames to
/// `device` and its replies back.
async fn serve(device: SimDevice, password: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(Message::Text(WEBREPL_PASSWORD_PROMPT.into()))
            .await
            .unwrap();
        match ws.next().await {
            Some(Ok(Message::Text(line))) if line == format!("{}\r\n", password) => {
                ws.send(Message::Text(WEBREPL_CONNECTED.into())).await.unwrap();
            }
            _ => {
                ws.send(Message::Text("\r\nAccess denied\r\n".into()))
                    .await
                    .unwrap();
                let _ = ws.close(None).await;
                return;
            }
        }

        let sim = device.transport();
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            sim.write(text.as_bytes()).await.unwrap();
            let pending = sim.available_bytes();
            if pending > 0 {
                let reply = sim.read(pending, WAIT).await.unwrap();
                let reply = String::from_utf8(reply).unwrap();
                ws.send(Message::Text(reply)).await.unwrap();
            }
        }
    });

    url
}

async fn read_text(transport: &impl Transport, len: usize) -> String {
    String::from_utf8(transport.read(len, WAIT).await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_raw_repl_over_webrepl() {
    let device = SimDevice::new();
    device.respond("print(1)", SimResponse::stdout("1\r\n"));
    let url = serve(device.clone(), "hunter2").await;

    let profile = ConnectionProfile::WebSocket {
        url: url.clone(),
        password: Some("hunter2".to_string()),
        login_timeout_ms: 2_000,
    };
    let transport = profile.open().await.unwrap();
    assert_eq!(transport.kind(), ConnectionKind::Socket);
    assert_eq!(transport.address(), url);

    transport.write(INTERRUPT_SEQUENCE).await.unwrap();
    transport.write(&[CTRL_A]).await.unwrap();
    let expected = format!("{}>", RAW_REPL_BANNER);
    let mut seen = String::new();
    while !seen.ends_with(&expected) {
        seen.push_str(&read_text(&transport, 1).await);
    }

    transport.write(b"print(1)\x04").await.unwrap();
    assert_eq!(read_text(&transport, 8).await, "OK1\r\n\x04\x04>");
    assert_eq!(device.submissions(), vec!["print(1)".to_string()]);

    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_is_a_login_error() {
    let url = serve(SimDevice::new(), "hunter2").await;
    let profile = ConnectionProfile::WebSocket {
        url,
        password: Some("guess".to_string()),
        login_timeout_ms: 2_000,
    };
    match profile.open().await {
        Err(TransportError::Login(message)) => assert!(message.contains("closed")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("login should have been rejected"),
    }
}
