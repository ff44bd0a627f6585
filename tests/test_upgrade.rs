//! Channel protocol tests against a stand-in exec endpoint

mod common;

use common::{raw_frame, text_frame, ChannelServer, Ending, Rejection};
use kubewire::upgrade::CHANNEL_PROTOCOL;
use kubewire::{CallOutcome, Channel, ChannelEvent, ChannelFrame, ChannelState, KubewireError, RequestDescriptor, Transport};

const EXEC_PATH: &str = "/api/v1/namespaces/default/pods/web/exec";

fn exec_descriptor() -> RequestDescriptor {
    RequestDescriptor::get(EXEC_PATH)
        .query_all("command", ["sh", "-c", "echo a"])
        .query("stdout", true)
        .query("stderr", true)
}

#[tokio::test]
async fn test_frames_demultiplexed_in_arrival_order() {
    let server = ChannelServer::start(
        vec![raw_frame(1, "a"), raw_frame(2, "b"), raw_frame(1, "c")],
        Ending::Close(1000, "done".to_string()),
    )
    .await;
    let transport = Transport::new(server.config()).unwrap();

    let result = transport.execute(&exec_descriptor()).await.unwrap().into_upgrade().unwrap();

    assert_eq!(
        result.messages,
        vec![
            ChannelFrame::new(Channel::Stdout, b"a".to_vec()),
            ChannelFrame::new(Channel::Stderr, b"b".to_vec()),
            ChannelFrame::new(Channel::Stdout, b"c".to_vec()),
        ]
    );
    assert_eq!(result.body, "abc");
    assert_eq!(result.code, 1000);
    assert_eq!(result.reason, "done");
}

#[tokio::test]
async fn test_reason_phrase_alone_triggers_upgrade() {
    let server = ChannelServer::start_with(
        vec![text_frame(1, "root\n")],
        Ending::Close(1000, String::new()),
        Rejection::ReasonPhrase,
    )
    .await;
    let transport = Transport::new(server.config()).unwrap();

    let result = transport.execute(&exec_descriptor()).await.unwrap().into_upgrade().unwrap();

    assert_eq!(result.stdout(), "root\n");
    assert_eq!(result.code, 1000);
    assert_eq!(server.websocket_requests().len(), 1);
}

#[tokio::test]
async fn test_ascii_channel_digits_and_error_channel() {
    let status = r#"{"metadata":{},"status":"Success"}"#;
    let server = ChannelServer::start(
        vec![text_frame(1, "hello\n"), text_frame(3, status)],
        Ending::Close(1000, String::new()),
    )
    .await;
    let transport = Transport::new(server.config()).unwrap();

    let outcome = transport.execute(&exec_descriptor()).await.unwrap();
    let CallOutcome::Upgrade(result) = outcome else {
        panic!("expected an upgrade outcome");
    };

    assert_eq!(result.stdout(), "hello\n");
    assert_eq!(result.error().as_deref(), Some(status));
    assert_eq!(result.body, format!("hello\n{}", status));
}

#[tokio::test]
async fn test_handshake_uses_channel_protocol_and_credentials() {
    let server = ChannelServer::start(vec![], Ending::Close(1000, String::new())).await;
    let transport = Transport::new(server.config().with_bearer_token("exec-token")).unwrap();

    let result = transport.execute(&exec_descriptor()).await.unwrap().into_upgrade().unwrap();
    assert!(result.messages.is_empty());
    assert_eq!(result.body, "");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].is_websocket());
    assert!(requests[0].request_line.starts_with("GET /api/v1/namespaces/default/pods/web/exec?command=sh&command=-c"));

    let upgrade = &requests[1];
    assert!(upgrade.is_websocket());
    assert_eq!(upgrade.header("sec-websocket-protocol"), Some(CHANNEL_PROTOCOL));
    assert_eq!(upgrade.header("authorization"), Some("Bearer exec-token"));
    assert!(upgrade.request_line.contains("command=echo+a"));
}

#[tokio::test]
async fn test_connection_failure_keeps_partial_transcript() {
    let server = ChannelServer::start(vec![raw_frame(1, "partial")], Ending::Abort).await;
    let transport = Transport::new(server.config()).unwrap();

    let err = transport.execute(&exec_descriptor()).await.unwrap_err();

    match &err {
        KubewireError::Upgrade { messages, .. } => {
            assert_eq!(messages, &vec![ChannelFrame::new(Channel::Stdout, b"partial".to_vec())]);
        }
        other => panic!("expected upgrade error, got {:?}", other),
    }
    assert_eq!(err.messages().map(|m| m.len()), Some(1));
}

#[tokio::test]
async fn test_unknown_channel_fails_with_transcript() {
    let server = ChannelServer::start(
        vec![raw_frame(2, "warn"), raw_frame(9, "bogus")],
        Ending::Close(1000, String::new()),
    )
    .await;
    let transport = Transport::new(server.config()).unwrap();

    let err = transport.execute(&exec_descriptor()).await.unwrap_err();
    let messages = err.messages().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].channel, Channel::Stderr);
}

#[tokio::test]
async fn test_open_channel_drains_events() {
    let server = ChannelServer::start(
        vec![text_frame(1, "x"), text_frame(2, "y")],
        Ending::Close(1000, "bye".to_string()),
    )
    .await;
    let transport = Transport::new(server.config()).unwrap();

    let mut conn = transport.open_channel(&exec_descriptor().query("stdin", true)).await.unwrap();
    assert_eq!(conn.state(), ChannelState::Open);

    conn.send(Channel::Stdin, b"ls\n").await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = conn.next_event().await.unwrap() {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            ChannelEvent::Frame(ChannelFrame::new(Channel::Stdout, b"x".to_vec())),
            ChannelEvent::Frame(ChannelFrame::new(Channel::Stderr, b"y".to_vec())),
            ChannelEvent::Closed {
                code: 1000,
                reason: "bye".to_string()
            },
        ]
    );
    assert_eq!(conn.state(), ChannelState::Closed);
    assert!(conn.send(Channel::Stdin, b"late").await.is_err());

    let result = conn.finish().await.unwrap();
    assert_eq!(result.body, "xy");
    assert_eq!(result.reason, "bye");
}
