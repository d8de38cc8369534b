use super::*;
use std::sync::Mutex as StdMutex;
use tokio::net::TcpListener;
use tokio::time::timeout;

fn recording_handler() -> (MessageHandler, Arc<StdMutex<Vec<String>>>) {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: MessageHandler = Arc::new(move |body: &str| {
        sink.lock().expect("lock").push(body.to_owned());
    });
    (handler, seen)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(text) = rx.try_recv() {
        frames.push(decode_frame(&text).expect("decode queued frame"));
    }
    frames
}

fn message_text(subscription: &str, body: &str) -> String {
    encode_frame(
        &Frame::new(Command::Message)
            .with_header(HEADER_SUBSCRIPTION, subscription)
            .with_body(body),
    )
}

// =============================================================
// host_of
// =============================================================

#[test]
fn host_of_strips_scheme_port_and_path() {
    assert_eq!(host_of("ws://127.0.0.1:8080/ws"), "127.0.0.1");
    assert_eq!(host_of("wss://chat.example.com/ws?x=1"), "chat.example.com");
    assert_eq!(host_of("wss://user:pw@chat.example.com:443"), "chat.example.com");
    assert_eq!(host_of("ws://[::1]:9000/ws"), "::1");
    assert_eq!(host_of(""), "localhost");
}

#[test]
fn options_follow_config() {
    let cfg = SyncConfig::default();
    let opts = StompOptions::from_config(&cfg, Some("tok".into()));
    assert_eq!(opts.url, cfg.ws_url);
    assert_eq!(opts.host, "127.0.0.1");
    assert_eq!(opts.max_backoff, cfg.reconnect_max_backoff);
}

// =============================================================
// session bookkeeping
// =============================================================

#[test]
fn subscribe_while_disconnected_is_replayed_on_session_start() {
    let transport = StompTransport::detached();
    let (handler, _) = recording_handler();
    transport.subscribe("/topic/chat/c2", handler.clone(), "chat-c2").expect("subscribe");
    transport.subscribe("/topic/chat/c1", handler, "chat-c1").expect("subscribe");
    assert!(!transport.is_connected());

    let mut rx = transport.begin_session();
    assert!(transport.is_connected());

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].command, Command::Subscribe);
    assert_eq!(frames[0].header("id"), Some("chat-c1"));
    assert_eq!(frames[0].header("destination"), Some("/topic/chat/c1"));
    assert_eq!(frames[1].header("id"), Some("chat-c2"));
}

#[test]
fn subscribe_during_session_is_sent_once() {
    let transport = StompTransport::detached();
    let mut rx = transport.begin_session();
    let (handler, _) = recording_handler();
    transport.subscribe("/topic/user/u1", handler, "user-u1").expect("subscribe");

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header("destination"), Some("/topic/user/u1"));
}

#[test]
fn publish_requires_session() {
    let transport = StompTransport::detached();
    let err = transport.publish("/app/chat/c1/send", "{}").expect_err("not connected");
    assert!(matches!(err, TransportError::NotConnected));

    let mut rx = transport.begin_session();
    transport.publish("/app/chat/c1/send", r#"{"body":"hi"}"#).expect("publish");
    let frames = drain(&mut rx);
    assert_eq!(frames[0].command, Command::Send);
    assert_eq!(frames[0].header("destination"), Some("/app/chat/c1/send"));
    assert_eq!(frames[0].body, r#"{"body":"hi"}"#);
}

#[test]
fn end_session_marks_disconnected() {
    let transport = StompTransport::detached();
    let _rx = transport.begin_session();
    transport.end_session();
    assert!(!transport.is_connected());
    assert!(transport.publish("/d", "{}").is_err());
}

#[test]
fn unsubscribe_sends_frame_and_stops_delivery() {
    let transport = StompTransport::detached();
    let (handler, seen) = recording_handler();
    transport.subscribe("/topic/chat/c1", handler, "chat-c1").expect("subscribe");
    let mut rx = transport.begin_session();
    drain(&mut rx);

    transport.unsubscribe("chat-c1").expect("unsubscribe");
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Unsubscribe);

    transport.dispatch(&message_text("chat-c1", "late"));
    assert!(seen.lock().expect("lock").is_empty());

    // Unknown ids are a quiet no-op.
    transport.unsubscribe("chat-zz").expect("unsubscribe unknown");
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn close_sends_disconnect_and_refuses_new_subscriptions() {
    let transport = StompTransport::detached();
    let mut rx = transport.begin_session();
    transport.close();

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Disconnect);
    assert!(!transport.is_connected());

    let (handler, _) = recording_handler();
    let err = transport.subscribe("/topic/chat/c1", handler, "chat-c1").expect_err("closed");
    assert!(matches!(err, TransportError::Closed));
}

// =============================================================
// dispatch
// =============================================================

#[test]
fn dispatch_routes_message_by_subscription_header() {
    let transport = StompTransport::detached();
    let (h1, seen1) = recording_handler();
    let (h2, seen2) = recording_handler();
    transport.subscribe("/topic/chat/c1", h1, "chat-c1").expect("subscribe");
    transport.subscribe("/topic/chat/c2", h2, "chat-c2").expect("subscribe");

    transport.dispatch(&message_text("chat-c2", r#"{"id":"m1"}"#));
    transport.dispatch("\n");
    transport.dispatch("garbage");
    transport.dispatch(&encode_frame(&Frame::new(Command::Message).with_body("no header")));

    assert!(seen1.lock().expect("lock").is_empty());
    assert_eq!(*seen2.lock().expect("lock"), vec![r#"{"id":"m1"}"#.to_owned()]);
}

// =============================================================
// live broker
// =============================================================

async fn next_frame<S>(ws: &mut S) -> Frame
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("broker read timed out")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            if !is_heartbeat(text.as_str()) {
                return decode_frame(text.as_str()).expect("decode client frame");
            }
        }
    }
}

#[tokio::test]
async fn live_session_subscribes_receives_and_publishes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let broker = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        let connect = next_frame(&mut ws).await;
        assert_eq!(connect.command, Command::Connect);
        assert_eq!(connect.header("Authorization"), Some("Bearer tok"));
        ws.send(Message::text(encode_frame(&Frame::new(Command::Connected).with_header("version", "1.2"))))
            .await
            .expect("send CONNECTED");

        let subscribe = next_frame(&mut ws).await;
        assert_eq!(subscribe.command, Command::Subscribe);
        assert_eq!(subscribe.header("destination"), Some("/topic/chat/c1"));
        ws.send(Message::text(message_text("chat-c1", r#"{"id":"m1"}"#)))
            .await
            .expect("send MESSAGE");

        let send = next_frame(&mut ws).await;
        assert_eq!(send.command, Command::Send);
        send
    });

    let (transport, handle) = StompTransport::spawn(StompOptions {
        url: format!("ws://{addr}/ws"),
        host: "localhost".into(),
        session_token: Some("tok".into()),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    });
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handler: MessageHandler = Arc::new(move |body: &str| {
        let _ = tx.send(body.to_owned());
    });
    transport.subscribe("/topic/chat/c1", handler, "chat-c1").expect("subscribe");

    assert!(transport.wait_connected(Duration::from_secs(5)).await);
    let body = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message timed out")
        .expect("handler channel closed");
    assert_eq!(body, r#"{"id":"m1"}"#);

    transport.publish("/app/chat/c1/send", r#"{"body":"hi"}"#).expect("publish");
    let send = broker.await.expect("broker task");
    assert_eq!(send.header("destination"), Some("/app/chat/c1/send"));
    assert_eq!(send.body, r#"{"body":"hi"}"#);

    transport.close();
    handle.abort();
}
