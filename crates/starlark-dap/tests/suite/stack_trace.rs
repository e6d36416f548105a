use serde_json::json;
use starlark_wire::{
    debug_event,
    mock::{MockDebugServer, MockDebugServerConfig},
    proto::ThreadPausedEvent,
    Frame, Location, PauseReason, PausedThread, Scope, Value,
};

use crate::harness::{spawn_server, DapClient};

pub(crate) fn frame(name: &str, path: &str, line: i32, binding: Value) -> Frame {
    Frame {
        function_name: name.to_string(),
        scope: vec![Scope {
            name: "local".to_string(),
            binding: vec![binding],
        }],
        location: Some(Location {
            line_number: line,
            path: path.to_string(),
            column_number: 5,
        }),
    }
}

pub(crate) fn binding(label: &str, description: &str, id: i64) -> Value {
    Value {
        label: label.to_string(),
        description: description.to_string(),
        r#type: "string".to_string(),
        has_children: id != 0,
        id,
    }
}

pub(crate) fn paused(thread_id: i64, reason: PauseReason) -> debug_event::Payload {
    debug_event::Payload::ThreadPaused(ThreadPausedEvent {
        thread: Some(PausedThread {
            id: thread_id,
            name: format!("starlark-{thread_id}"),
            pause_reason: reason as i32,
            location: None,
            conditional_breakpoint_error: None,
        }),
    })
}

/// Launch against `server` and report thread `thread_id` as stopped on a breakpoint.
pub(crate) async fn launch_and_stop(server: &MockDebugServer, thread_id: i64) -> DapClient {
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;
    server
        .emit(paused(thread_id, PauseReason::HitBreakpoint))
        .await
        .unwrap();
    let stopped = client.wait_for_event("stopped").await;
    assert_eq!(stopped["body"]["threadId"], thread_id);
    client
}

#[tokio::test]
async fn scope_variables_come_from_the_fetched_frames() {
    let mut config = MockDebugServerConfig::default();
    config.frames.insert(
        3,
        vec![
            frame("rule_impl", "/does/not/exist/defs.bzl", 14, binding("ctx", "<ctx>", 0)),
            frame("<toplevel>", "/does/not/exist/BUILD", 2, binding("name", "\"lib\"", 0)),
        ],
    );
    let server = MockDebugServer::spawn_with_config(config).await.unwrap();
    let mut client = launch_and_stop(&server, 3).await;

    let threads = client.request("threads", json!({})).await;
    assert_eq!(
        threads["body"]["threads"],
        json!([{ "id": 3, "name": "starlark-3" }])
    );

    let stack = client.request("stackTrace", json!({ "threadId": 3 })).await;
    assert_eq!(stack["success"], true, "{stack}");
    assert_eq!(stack["body"]["totalFrames"], 2);
    let frames = stack["body"]["stackFrames"].as_array().unwrap().clone();
    assert_eq!(frames[0]["name"], "rule_impl");
    assert_eq!(frames[0]["line"], 14);
    assert_eq!(frames[0]["column"], 5);
    assert_eq!(frames[0]["source"]["name"], "defs.bzl");
    assert_eq!(frames[0]["source"]["path"], "/does/not/exist/defs.bzl");

    let scopes = client
        .request("scopes", json!({ "frameId": frames[1]["id"] }))
        .await;
    let scopes = scopes["body"]["scopes"].as_array().unwrap().clone();
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0]["name"], "local");

    let requests_before = server.requests().await.len();
    let vars = client
        .request(
            "variables",
            json!({ "variablesReference": scopes[0]["variablesReference"] }),
        )
        .await;
    assert_eq!(
        vars["body"]["variables"],
        json!([{ "name": "name", "value": "\"lib\"", "type": "string", "variablesReference": 0 }])
    );
    assert_eq!(server.requests().await.len(), requests_before);

    client.disconnect().await;
}

#[tokio::test]
async fn expandable_values_are_listed_through_get_children() {
    let mut config = MockDebugServerConfig::default();
    config.frames.insert(
        5,
        vec![frame("main", "/does/not/exist/BUILD", 1, binding("deps", "[...]", 77))],
    );
    config
        .children
        .insert(77, vec![binding("[0]", "\"//a\"", 0), binding("[1]", "\"//b\"", 0)]);
    let server = MockDebugServer::spawn_with_config(config).await.unwrap();
    let mut client = launch_and_stop(&server, 5).await;

    let stack = client.request("stackTrace", json!({ "threadId": 5 })).await;
    let frame_id = stack["body"]["stackFrames"][0]["id"].clone();
    let scopes = client.request("scopes", json!({ "frameId": frame_id })).await;
    let scope_ref = scopes["body"]["scopes"][0]["variablesReference"].clone();
    let vars = client
        .request("variables", json!({ "variablesReference": scope_ref }))
        .await;
    let deps_ref = vars["body"]["variables"][0]["variablesReference"].as_i64().unwrap();
    assert!(deps_ref > 0);

    let children = client
        .request("variables", json!({ "variablesReference": deps_ref }))
        .await;
    let names: Vec<_> = children["body"]["variables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["[0]", "[1]"]);

    client.disconnect().await;
}

#[tokio::test]
async fn unknown_references_produce_empty_results() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = launch_and_stop(&server, 1).await;

    let scopes = client.request("scopes", json!({ "frameId": 42 })).await;
    assert_eq!(scopes["body"]["scopes"], json!([]));
    let vars = client
        .request("variables", json!({ "variablesReference": 42 }))
        .await;
    assert_eq!(vars["success"], true);
    assert_eq!(vars["body"]["variables"], json!([]));

    client.disconnect().await;
}
