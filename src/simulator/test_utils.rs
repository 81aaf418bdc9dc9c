//! Helpers for mocking JSON-RPC nodes with mockito

use mockito::{Matcher, Mock, Request, ServerGuard};
use serde_json::{json, Value};

fn request_id(request: &Request) -> Value {
    request
        .body()
        .ok()
        .and_then(|body| serde_json::from_slice::<Value>(body).ok())
        .and_then(|body| body.get("id").cloned())
        .unwrap_or(json!(0))
}

/// Mock `method` to answer with `result`, echoing the caller's request id
pub async fn mock_rpc_result(server: &mut ServerGuard, method: &str, result: Value) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_header("content-type", "application/json")
        .with_body_from_request(move |request| {
            serde_json::to_vec(&json!({
                "jsonrpc": "2.0",
                "id": request_id(request),
                "result": result,
            }))
            .unwrap_or_default()
        })
        .create_async()
        .await
}

/// Mock `method` to answer with a JSON-RPC error object
pub async fn mock_rpc_error(
    server: &mut ServerGuard,
    method: &str,
    code: i64,
    message: &str,
) -> Mock {
    let message = message.to_string();
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_header("content-type", "application/json")
        .with_body_from_request(move |request| {
            serde_json::to_vec(&json!({
                "jsonrpc": "2.0",
                "id": request_id(request),
                "error": { "code": code, "message": message },
            }))
            .unwrap_or_default()
        })
        .create_async()
        .await
}
