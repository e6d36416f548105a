use serde_json::json;
use starlark_wire::mock::{MockDebugServer, MockDebugServerConfig, MockEvaluation};

use super::stack_trace::{binding, frame, launch_and_stop};

#[tokio::test]
async fn evaluate_returns_the_server_value() {
    let mut config = MockDebugServerConfig::default();
    config
        .frames
        .insert(2, vec![frame("main", "/does/not/exist/BUILD", 1, binding("x", "1", 0))]);
    config.evaluations.insert(
        "len(srcs)".to_string(),
        MockEvaluation::Value(binding("len(srcs)", "3", 0)),
    );
    let server = MockDebugServer::spawn_with_config(config).await.unwrap();
    let mut client = launch_and_stop(&server, 2).await;

    let stack = client.request("stackTrace", json!({ "threadId": 2 })).await;
    let frame_id = stack["body"]["stackFrames"][0]["id"].clone();

    let resp = client
        .request(
            "evaluate",
            json!({ "expression": "len(srcs)", "frameId": frame_id, "context": "repl" }),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    assert_eq!(resp["body"]["result"], "3");
    assert_eq!(resp["body"]["variablesReference"], 0);

    client.disconnect().await;
}

#[tokio::test]
async fn hover_falls_back_to_a_fetched_binding() {
    let mut config = MockDebugServerConfig::default();
    config.frames.insert(
        2,
        vec![frame("main", "/does/not/exist/BUILD", 1, binding("name", "\"lib\"", 0))],
    );
    let server = MockDebugServer::spawn_with_config(config).await.unwrap();
    let mut client = launch_and_stop(&server, 2).await;

    let stack = client.request("stackTrace", json!({ "threadId": 2 })).await;
    let frame_id = stack["body"]["stackFrames"][0]["id"].clone();
    client.request("scopes", json!({ "frameId": frame_id })).await;

    // Editors quote hovered string literals; the quotes are stripped first.
    let resp = client
        .request(
            "evaluate",
            json!({ "expression": "'name'", "frameId": frame_id, "context": "hover" }),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    assert_eq!(resp["body"]["result"], "\"lib\"");
    assert_eq!(resp["body"]["type"], "string");

    let resp = client
        .request("evaluate", json!({ "expression": "nope", "frameId": frame_id }))
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    assert_eq!(resp["body"]["result"], "name 'nope' is not defined");

    client.disconnect().await;
}

#[tokio::test]
async fn evaluate_rejects_unknown_frames_and_missing_expressions() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = launch_and_stop(&server, 1).await;

    let resp = client
        .request("evaluate", json!({ "expression": "x", "frameId": 99 }))
        .await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["message"], "invalid request: unknown frameId 99");

    let resp = client.request("evaluate", json!({ "frameId": 1 })).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["message"], "invalid request: evaluate.expression is required");

    client.disconnect().await;
}
