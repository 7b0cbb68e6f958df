//! End-to-end tests: JSON-RPC lines in, tool text out, against an
//! in-process memory service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use memo_client::{MemoClient, MemoConfig};
use memo_crypto::MemoKeyPair;
use memo_mcp::{McpServer, MemoryTools, ToolError};
use serde_json::{json, Value};
use std::collections::HashMap;

const CLIENT_PEM: &str = include_str!("../../../testdata/client_key.pem");

#[derive(Default)]
struct Service {
    records: Mutex<Vec<Value>>,
    requests: AtomicUsize,
    fail_with: Mutex<Option<(u16, String)>>,
}

async fn store(State(service): State<Arc<Service>>, Json(body): Json<Value>) -> Response {
    service.requests.fetch_add(1, Ordering::SeqCst);
    if let Some((status, text)) = service.fail_with.lock().unwrap().clone() {
        return (StatusCode::from_u16(status).unwrap(), text).into_response();
    }

    let mut records = service.records.lock().unwrap();
    let existing = body["idempotent_key"]
        .as_str()
        .and_then(|key| records.iter().position(|r| r["idempotent_key"] == key));
    let (index, id) = match existing {
        Some(index) => (index, records[index]["id"].as_str().unwrap().to_string()),
        None => {
            records.push(Value::Null);
            (records.len() - 1, format!("mem-{}", records.len()))
        }
    };
    let idempotent_key = format!("idem-{}", index + 1);

    records[index] = json!({
        "id": id,
        "handle": body["handle"],
        "description": body["description"],
        "content": body["ciphertext"],
        "metadata": body["metadata"],
        "idempotent_key": idempotent_key,
    });
    Json(json!({ "memory_id": id, "idempotent_key": idempotent_key })).into_response()
}

async fn list(
    State(service): State<Arc<Service>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    service.requests.fetch_add(1, Ordering::SeqCst);
    if let Some((status, text)) = service.fail_with.lock().unwrap().clone() {
        return (StatusCode::from_u16(status).unwrap(), text).into_response();
    }

    let limit: usize = params["limit"].parse().unwrap();
    let offset: usize = params.get("cursor").map(|c| c.parse().unwrap()).unwrap_or(0);
    let matching: Vec<Value> = service
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|r| params.get("handle").map_or(true, |h| r["handle"] == h.as_str()))
        .cloned()
        .collect();

    let data: Vec<Value> = matching.iter().skip(offset).take(limit).cloned().collect();
    let end = offset + data.len();
    let next_cursor = if end < matching.len() { json!(end.to_string()) } else { Value::Null };

    Json(json!({ "data": data, "pagination": { "next_cursor": next_cursor } })).into_response()
}

struct Harness {
    service: Arc<Service>,
    server: McpServer,
    tools: MemoryTools,
}

async fn harness(debug: bool) -> Harness {
    let service = Arc::new(Service::default());
    let app = Router::new()
        .route("/api/v1/memory", post(store).get(list))
        .with_state(service.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let keys = MemoKeyPair::from_pem(CLIENT_PEM).unwrap();
    let client = MemoClient::new(MemoConfig::new("k", format!("http://{addr}")), keys).unwrap();
    let tools = MemoryTools::new(client, debug);

    Harness {
        service,
        server: McpServer::new(tools.clone()),
        tools,
    }
}

impl Harness {
    async fn call(&self, name: &str, arguments: Value) -> String {
        self.tools.execute(name, &arguments).await.unwrap()
    }

    fn requests(&self) -> usize {
        self.service.requests.load(Ordering::SeqCst)
    }
}

mod tool_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let h = harness(false).await;

        let saved = h
            .call(
                "save_memory",
                json!({ "content": "Prefers tabs over spaces", "handle": "Editor Prefs", "description": "indentation" }),
            )
            .await;
        assert_eq!(
            saved,
            "Successfully archived in memory. ID: mem-1\nIdempotent key: idem-1"
        );

        let stored = h.service.records.lock().unwrap()[0].clone();
        assert_eq!(stored["handle"], "editor-prefs");
        assert!(!stored["content"].as_str().unwrap().contains("tabs"));

        let loaded = h.call("load_memories", json!({ "handle": "editor-prefs" })).await;
        assert_eq!(
            loaded,
            "### Retrieved Memories:\n\
             Handle: [editor-prefs]\n\
             Description: indentation\n\
             Content: Prefers tabs over spaces\n\
             Idempotent key: idem-1\n\
             ---"
        );
    }

    #[tokio::test]
    async fn test_resave_with_idempotent_key_updates() {
        let h = harness(false).await;

        let first = h
            .call("save_memory", json!({ "content": "Standup at 9", "handle": "work" }))
            .await;
        let key = first
            .lines()
            .find_map(|line| line.strip_prefix("Idempotent key: "))
            .expect("save reports an idempotent key")
            .to_string();

        let second = h
            .call(
                "save_memory",
                json!({ "content": "Standup at 10", "handle": "work", "idempotent_key": key }),
            )
            .await;
        assert_eq!(
            second,
            format!("Successfully archived in memory. ID: mem-1\nIdempotent key: {key}")
        );
        assert_eq!(h.service.records.lock().unwrap().len(), 1);

        let loaded = h.call("load_memories", json!({ "handle": "work" })).await;
        assert!(loaded.contains("Content: Standup at 10"));
        assert!(!loaded.contains("Standup at 9"));
        assert!(loaded.contains(&format!("Idempotent key: {key}")));
    }

    #[tokio::test]
    async fn test_load_pages_with_cursor() {
        let h = harness(false).await;
        for i in 0..3 {
            h.call("save_memory", json!({ "content": format!("note {i}") })).await;
        }

        let first = h.call("load_memories", json!({ "limit": 2 })).await;
        assert!(first.contains("Content: note 0"));
        assert!(first.contains("Content: note 1"));
        assert!(first.ends_with("Next cursor: 2"));

        let second = h
            .call("load_memories", json!({ "limit": 2, "cursor": "2" }))
            .await;
        assert!(second.contains("Content: note 2"));
        assert!(!second.contains("Next cursor"));

        let past_end = h
            .call("load_memories", json!({ "limit": 2, "cursor": "10" }))
            .await;
        assert!(past_end.starts_with("No memories found under the handle: all."));
        assert!(past_end.contains("past the last page"));
    }

    #[tokio::test]
    async fn test_load_modes() {
        let h = harness(false).await;
        h.call("save_memory", json!({ "content": "secret text", "description": "a summary" }))
            .await;

        let summary = h.call("load_memories", json!({ "mode": "summary" })).await;
        assert!(summary.contains("Description: a summary"));
        assert!(!summary.contains("secret text"));

        let metadata = h.call("load_memories", json!({ "mode": "metadata" })).await;
        assert!(!metadata.contains("a summary"));
        assert!(!metadata.contains("secret text"));
        assert!(metadata.contains("ID: mem-1"));
        assert!(metadata.contains("\"from\":\"memo-mcp\""));
    }

    #[tokio::test]
    async fn test_invalid_mode_makes_no_request() {
        let h = harness(false).await;

        let text = h.call("load_memories", json!({ "mode": "bogus" })).await;
        assert_eq!(
            text,
            "Invalid mode 'bogus': expected one of summary, metadata, full"
        );
        assert_eq!(h.requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_handle() {
        let h = harness(false).await;
        let text = h.call("load_memories", json!({ "handle": "work" })).await;
        assert_eq!(text, "No memories found under the handle: work.");
    }

    #[tokio::test]
    async fn test_save_failure_message() {
        let h = harness(false).await;
        *h.service.fail_with.lock().unwrap() =
            Some((500, json!({ "error": "disk full" }).to_string()));

        let text = h.call("save_memory", json!({ "content": "x" })).await;
        assert_eq!(text, "Failed to save your memory: API error 500: disk full");
    }

    #[tokio::test]
    async fn test_save_failure_diagnostic_in_debug() {
        let h = harness(true).await;
        *h.service.fail_with.lock().unwrap() = Some((401, "bad key".to_string()));

        let text = h
            .call(
                "save_memory",
                json!({ "content": "héllo", "handle": "work", "description": "d" }),
            )
            .await;
        let diagnostic: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(diagnostic["status_code"], 401);
        assert_eq!(diagnostic["response_text"], "bad key");
        assert_eq!(diagnostic["handle"], "work");
        assert_eq!(diagnostic["description"], "d");
        assert_eq!(diagnostic["content_length"], 5);
        assert!(diagnostic["url"].as_str().unwrap().ends_with("/api/v1/memory"));
        assert_eq!(diagnostic["payload"]["handle"], "work");
    }

    #[tokio::test]
    async fn test_save_soft_failure() {
        let h = harness(false).await;
        *h.service.fail_with.lock().unwrap() = Some((200, json!({ "ok": true }).to_string()));

        let text = h
            .call("save_memory", json!({ "content": "x", "handle": "Work" }))
            .await;
        assert_eq!(text, "Failed to save memory for handle: work");
    }

    #[tokio::test]
    async fn test_load_failure_message() {
        let h = harness(false).await;
        *h.service.fail_with.lock().unwrap() = Some((503, "down".to_string()));

        let text = h.call("load_memories", json!({})).await;
        assert_eq!(text, "Error retrieving memories: API error 503: down");
    }

    #[tokio::test]
    async fn test_argument_errors() {
        let h = harness(false).await;

        let err = h.tools.execute("save_memory", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));

        let err = h.tools.execute("forget", &json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("forget".to_string()));

        assert_eq!(h.requests(), 0);
    }
}

mod server_tests {
    use super::*;

    async fn roundtrip(server: &McpServer, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server.run(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_handshake_and_listing() {
        let h = harness(false).await;
        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "protocolVersion": "2024-11-05", "capabilities": {} } }),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
            json!({ "jsonrpc": "2.0", "id": "p", "method": "ping" }),
        ]
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");

        let responses = roundtrip(&h.server, &input).await;
        assert_eq!(responses.len(), 3);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "yomemoai");
        assert!(responses[0]["result"]["capabilities"]["tools"].is_object());

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "save_memory");
        assert!(tools[1]["inputSchema"].is_object());

        assert_eq!(responses[2], json!({ "jsonrpc": "2.0", "id": "p", "result": {} }));
    }

    #[tokio::test]
    async fn test_tool_call_result() {
        let h = harness(false).await;
        let request = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "save_memory", "arguments": { "content": "remember me" } }
        });

        let response = h.server.handle_line(&request.to_string()).await.unwrap();
        assert_eq!(
            response,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "result": { "content": [{ "type": "text", "text": "Successfully archived in memory. ID: mem-1\nIdempotent key: idem-1" }] }
            })
        );
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let h = harness(false).await;

        let parse = h.server.handle_line("{not json").await.unwrap();
        assert_eq!(parse["error"]["code"], -32700);
        assert_eq!(parse["id"], Value::Null);

        let unknown = h
            .server
            .handle_line(&json!({ "jsonrpc": "2.0", "id": 3, "method": "resources/list" }).to_string())
            .await
            .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);
        assert_eq!(unknown["id"], 3);

        let no_name = h
            .server
            .handle_line(&json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {} }).to_string())
            .await
            .unwrap();
        assert_eq!(no_name["error"]["code"], -32602);

        let bad_tool = h
            .server
            .handle_line(
                &json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": { "name": "nope" } })
                    .to_string(),
            )
            .await
            .unwrap();
        assert_eq!(bad_tool["error"]["code"], -32602);
        assert!(bad_tool["error"]["message"].as_str().unwrap().contains("nope"));

        let not_a_request = h.server.handle_line(r#"{"id": 6}"#).await.unwrap();
        assert_eq!(not_a_request["error"]["code"], -32600);
        assert_eq!(not_a_request["id"], 6);

        let wrong_version = h
            .server
            .handle_line(&json!({ "jsonrpc": "1.0", "id": 8, "method": "ping" }).to_string())
            .await
            .unwrap();
        assert_eq!(wrong_version["error"]["code"], -32600);
        assert_eq!(wrong_version["id"], 8);

        let no_version = h
            .server
            .handle_line(&json!({ "id": 9, "method": "ping" }).to_string())
            .await
            .unwrap();
        assert_eq!(no_version["error"]["code"], -32600);
        assert_eq!(no_version["id"], 9);

        assert!(h
            .server
            .handle_line(&json!({ "jsonrpc": "2.0", "method": "notifications/cancelled" }).to_string())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_blank_lines_ignored() {
        let h = harness(false).await;
        let input = format!(
            "\n   \n{}\n\n",
            json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })
        );
        let responses = roundtrip(&h.server, &input).await;
        assert_eq!(responses.len(), 1);
    }
}
