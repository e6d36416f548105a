use serde_json::json;
use starlark_wire::{mock::MockDebugServer, proto::breakpoint, Breakpoint};

use crate::harness::spawn_server;

fn path_and_line(bp: &Breakpoint) -> (String, i32) {
    match &bp.kind {
        Some(breakpoint::Kind::Location(loc)) => (loc.path.clone(), loc.line_number),
        None => panic!("breakpoint without a location"),
    }
}

#[tokio::test]
async fn every_update_resends_the_full_breakpoint_set() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    let resp = client
        .request(
            "setBreakpoints",
            json!({
                "source": { "path": "/ws/pkg/BUILD" },
                "breakpoints": [{ "line": 3 }, { "line": 7, "condition": "len(srcs) > 1" }],
            }),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    assert_eq!(
        resp["body"]["breakpoints"],
        json!([{ "verified": true, "line": 3 }, { "verified": true, "line": 7 }])
    );

    let resp = client
        .request(
            "setBreakpoints",
            json!({
                "source": { "path": "/ws/defs.bzl" },
                "breakpoints": [{ "line": 12 }],
            }),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");

    let sent = server.breakpoints().await;
    let mut locations: Vec<_> = sent.iter().map(path_and_line).collect();
    locations.sort();
    assert_eq!(
        locations,
        vec![
            ("/ws/defs.bzl".to_string(), 12),
            ("/ws/pkg/BUILD".to_string(), 3),
            ("/ws/pkg/BUILD".to_string(), 7),
        ]
    );
    let conditional = sent
        .iter()
        .find(|bp| path_and_line(bp).1 == 7)
        .unwrap();
    assert_eq!(conditional.expression, "len(srcs) > 1");

    // Clearing one source keeps the others.
    let resp = client
        .request(
            "setBreakpoints",
            json!({ "source": { "path": "/ws/pkg/BUILD" }, "breakpoints": [] }),
        )
        .await;
    assert_eq!(resp["body"]["breakpoints"], json!([]));
    let sent = server.breakpoints().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(path_and_line(&sent[0]), ("/ws/defs.bzl".to_string(), 12));

    client.disconnect().await;
}

#[tokio::test]
async fn breakpoints_without_a_source_path_are_rejected() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    let resp = client
        .request("setBreakpoints", json!({ "source": {}, "breakpoints": [{ "line": 1 }] }))
        .await;
    assert_eq!(resp["success"], false);
    assert!(server.breakpoints().await.is_empty());

    client.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn back_to_back_updates_leave_the_complete_set_on_the_server() {
    let server = MockDebugServer::spawn().await.unwrap();
    let mut client = spawn_server();
    client.initialize_handshake().await;
    client.launch(server.port()).await;

    let mut seqs = Vec::new();
    for i in 0..20 {
        let seq = client
            .send(
                "setBreakpoints",
                json!({
                    "source": { "path": format!("/ws/f{i}.star") },
                    "breakpoints": [{ "line": i + 1 }],
                }),
            )
            .await;
        seqs.push(seq);
    }
    for seq in seqs {
        let resp = client.response(seq).await;
        assert_eq!(resp["success"], true, "{resp}");
    }

    let mut paths: Vec<_> = server
        .breakpoints()
        .await
        .iter()
        .map(|bp| path_and_line(bp).0)
        .collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 20);

    client.disconnect().await;
}
