use serde_json::json;
use starlark_wire::{
    debug_event,
    mock::{MockDebugServer, MockDebugServerConfig},
    proto::{Error, ThreadPausedEvent},
    PauseReason, PausedThread,
};

use super::stack_trace::launch_and_stop;
use crate::harness::spawn_server;

#[tokio::test]
async fn configuration_done_starts_debugging_and_reports_entry() {
    let config = MockDebugServerConfig {
        initial_pause: Some(PausedThread {
            id: 4,
            name: "main".to_string(),
            pause_reason: PauseReason::Initializing as i32,
            location: None,
            conditional_breakpoint_error: None,
        }),
        ..MockDebugServerConfig::default()
    };
    let server = MockDebugServer::spawn_with_config(config).await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    let resp = client.request("configurationDone", json!({})).await;
    assert_eq!(resp["success"], true, "{resp}");

    let thread = client.wait_for_event("thread").await;
    assert_eq!(thread["body"], json!({ "reason": "started", "threadId": 4 }));
    let stopped = client.wait_for_event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "entry");
    assert_eq!(stopped["body"]["threadId"], 4);

    let threads = client.request("threads", json!({})).await;
    assert_eq!(threads["body"]["threads"], json!([{ "id": 4, "name": "main" }]));

    client.disconnect().await;
}

#[tokio::test]
async fn pause_request_reports_a_pause_stop() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    let resp = client.request("pause", json!({ "threadId": 0 })).await;
    assert_eq!(resp["success"], true, "{resp}");

    let stopped = client.wait_for_event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "pause");
    assert_eq!(stopped["body"]["threadId"], 1);

    client.disconnect().await;
}

#[tokio::test]
async fn condition_errors_stop_with_an_exception() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    server
        .emit(debug_event::Payload::ThreadPaused(ThreadPausedEvent {
            thread: Some(PausedThread {
                id: 6,
                name: String::new(),
                pause_reason: PauseReason::ConditionalBreakpointError as i32,
                location: None,
                conditional_breakpoint_error: Some(Error {
                    message: "name 'y' is not defined".to_string(),
                }),
            }),
        }))
        .await
        .unwrap();

    let stopped = client.wait_for_event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "exception");
    assert_eq!(stopped["body"]["text"], "name 'y' is not defined");
    assert_eq!(
        stopped["body"]["description"],
        "Error evaluating breakpoint condition: name 'y' is not defined"
    );

    let threads = client.request("threads", json!({})).await;
    assert_eq!(threads["body"]["threads"], json!([{ "id": 6, "name": "Thread 6" }]));

    client.disconnect().await;
}

#[tokio::test]
async fn server_disconnect_terminates_the_session_once() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = launch_and_stop(&server, 1).await;

    server.disconnect().await;
    client.wait_for_event("terminated").await;

    let resp = client.request("disconnect", json!({})).await;
    assert_eq!(resp["success"], true, "{resp}");
    assert!(!client.pending_events().iter().any(|e| e == "terminated"));
}
