//! In-process DAP client driving `starlark_dap::server` over a duplex pipe.

use std::{collections::VecDeque, time::Duration};

use serde_json::{json, Value};
use starlark_config::DebugServerConfig;
use starlark_dap::{
    dap_tokio::{self, DapReader, DapWriter},
    server::{self, ServerOptions},
};
use tokio::{
    io::{DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};

const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DapClient {
    reader: DapReader<ReadHalf<DuplexStream>>,
    writer: DapWriter<WriteHalf<DuplexStream>>,
    next_seq: i64,
    backlog: VecDeque<Value>,
    server: JoinHandle<dap_tokio::Result<()>>,
}

/// Options that fail fast when nothing listens on the target port.
pub fn fast_retry_options() -> ServerOptions {
    ServerOptions {
        debug_server: DebugServerConfig {
            host: "127.0.0.1".to_string(),
            connect_attempts: 2,
            retry_delay_ms: 10,
            ..DebugServerConfig::default()
        },
    }
}

pub fn spawn_server() -> DapClient {
    spawn_server_with(fast_retry_options())
}

pub fn spawn_server_with(options: ServerOptions) -> DapClient {
    let (client, server_stream) = tokio::io::duplex(256 * 1024);
    let (server_read, server_write) = tokio::io::split(server_stream);
    let server = tokio::spawn(server::run_with_options(server_read, server_write, options));

    let (client_read, client_write) = tokio::io::split(client);
    DapClient {
        reader: DapReader::new(client_read),
        writer: DapWriter::new(client_write),
        next_seq: 1,
        backlog: VecDeque::new(),
        server,
    }
}

fn is_response_to(msg: &Value, seq: i64) -> bool {
    msg.get("type").and_then(Value::as_str) == Some("response")
        && msg.get("request_seq").and_then(Value::as_i64) == Some(seq)
}

fn is_event(msg: &Value, event: &str) -> bool {
    msg.get("type").and_then(Value::as_str) == Some("event")
        && msg.get("event").and_then(Value::as_str) == Some(event)
}

impl DapClient {
    pub async fn send(&mut self, command: &str, arguments: Value) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let msg = json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        });
        self.writer.write_message(&msg).await.unwrap();
        seq
    }

    async fn read_next(&mut self) -> Value {
        tokio::time::timeout(READ_TIMEOUT, self.reader.read_value())
            .await
            .expect("timed out waiting for a DAP message")
            .unwrap()
            .expect("server closed the DAP stream")
    }

    /// Wait for the first message matching `pred`, keeping everything else
    /// for later lookups.
    async fn wait_for(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        if let Some(idx) = self.backlog.iter().position(&pred) {
            return self.backlog.remove(idx).unwrap();
        }
        loop {
            let msg = self.read_next().await;
            if pred(&msg) {
                return msg;
            }
            self.backlog.push_back(msg);
        }
    }

    pub async fn response(&mut self, seq: i64) -> Value {
        self.wait_for(|msg| is_response_to(msg, seq)).await
    }

    pub async fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments).await;
        self.response(seq).await
    }

    pub async fn wait_for_event(&mut self, event: &str) -> Value {
        self.wait_for(|msg| is_event(msg, event)).await
    }

    /// Names of the events received but not consumed yet.
    pub fn pending_events(&self) -> Vec<String> {
        self.backlog
            .iter()
            .filter_map(|msg| msg.get("event").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub async fn initialize_handshake(&mut self) -> Value {
        let resp = self
            .request("initialize", json!({ "adapterID": "starlark" }))
            .await;
        assert_eq!(resp["success"], true, "{resp}");
        resp
    }

    pub async fn launch(&mut self, port: u16) -> Value {
        let resp = self
            .request("launch", json!({ "host": "127.0.0.1", "port": port }))
            .await;
        assert_eq!(resp["success"], true, "{resp}");
        self.wait_for_event("initialized").await;
        resp
    }

    pub async fn disconnect(mut self) {
        let resp = self.request("disconnect", json!({})).await;
        assert_eq!(resp["success"], true, "{resp}");
        self.wait_for_event("terminated").await;
        tokio::time::timeout(READ_TIMEOUT, self.server)
            .await
            .expect("server did not exit after disconnect")
            .unwrap()
            .unwrap();
    }
}
