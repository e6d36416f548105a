use serde_json::json;
use starlark_wire::mock::MockDebugServer;

use crate::harness::spawn_server;

#[tokio::test]
async fn initialize_advertises_capabilities() {
    let mut client = spawn_server();
    let resp = client.initialize_handshake().await;

    let body = &resp["body"];
    assert_eq!(body["supportsConfigurationDoneRequest"], true);
    assert_eq!(body["supportsEvaluateForHovers"], true);
    assert_eq!(body["supportsConditionalBreakpoints"], true);

    client.disconnect().await;
}

#[tokio::test]
async fn launch_connects_and_emits_initialized() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    assert_eq!(server.connections(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn attach_is_accepted_like_launch() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;

    let resp = client
        .request("attach", json!({ "host": "127.0.0.1", "port": server.port() }))
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    client.wait_for_event("initialized").await;

    client.disconnect().await;
}

#[tokio::test]
async fn requests_before_launch_report_not_connected() {
    let mut client = spawn_server();
    client.initialize_handshake().await;

    let threads = client.request("threads", json!({})).await;
    assert_eq!(threads["success"], true);
    assert_eq!(threads["body"]["threads"], json!([]));

    let stack = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(stack["success"], false);
    assert_eq!(stack["message"], "not connected");

    let cont = client.request("continue", json!({ "threadId": 1 })).await;
    assert_eq!(cont["success"], false);

    client.disconnect().await;
}

#[tokio::test]
async fn launch_fails_after_exhausting_connection_attempts() {
    // Reserve a port, then free it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = spawn_server();
    client.initialize_handshake().await;

    let resp = client
        .request("launch", json!({ "port": port, "verbose": true }))
        .await;
    assert_eq!(resp["success"], false, "{resp}");
    let message = resp["message"].as_str().unwrap();
    assert!(message.contains("failed to connect"), "{message}");
    assert!(message.contains("2 attempt"), "{message}");

    // Verbose launches report progress on the console.
    let output = client.wait_for_event("output").await;
    assert_eq!(output["body"]["category"], "console");

    // The failed session is discarded.
    let stack = client.request("stackTrace", json!({ "threadId": 1 })).await;
    assert_eq!(stack["message"], "not connected");

    client.disconnect().await;
}

#[tokio::test]
async fn missing_required_arguments_fail_the_request() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    let resp = client.request("stackTrace", json!({})).await;
    assert_eq!(resp["success"], false);
    assert!(resp["message"]
        .as_str()
        .unwrap()
        .contains("stackTrace.threadId is required"));

    client.disconnect().await;
}
