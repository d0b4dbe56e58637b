//! Tool pipeline behavior against scripted guard and upstream fakes.

mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use warden::core::errors::WardenError;

fn call_params(name: &str, arguments: Value) -> Option<Value> {
    Some(json!({"name": name, "arguments": arguments}))
}

#[tokio::test]
async fn blocked_listing_empties_tools_and_preserves_everything_else() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/list",
        json!({
            "tools": [{"name": "read_file", "inputSchema": {"type": "object"}}],
            "nextCursor": "page-2",
            "_meta": {"trace": "abc"},
        }),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![block(json!({"reason": "policy"}))]));
    let pipeline = pipeline_with(guard.clone(), upstream);

    let result = pipeline.list_tools(None).await.unwrap();

    assert_eq!(result["tools"], json!([]));
    assert_eq!(result["nextCursor"], json!("page-2"));
    assert_eq!(result["_meta"], json!({"trace": "abc"}));

    let calls = guard.recorded();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].event_type, "tool_listing");
    assert!(calls[0].guard_input.messages.is_empty());
    assert_eq!(calls[0].guard_input.tools.as_ref().unwrap().len(), 1);
}

#[tokio::test]
async fn allowed_listing_passes_through_unchanged() {
    let listing = json!({
        "tools": [{"name": "a"}, {"name": "b"}],
        "nextCursor": "next",
    });
    let upstream = Arc::new(FakeUpstream::new().respond_to("tools/list", listing.clone()));
    let guard = Arc::new(ScriptedGuard::new(vec![allow()]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline.list_tools(None).await.unwrap();
    assert_eq!(result, listing);
}

#[tokio::test]
async fn transform_verdict_on_listing_is_treated_as_allow() {
    let listing = json!({"tools": [{"name": "a"}]});
    let upstream = Arc::new(FakeUpstream::new().respond_to("tools/list", listing.clone()));
    let guard = Arc::new(ScriptedGuard::new(vec![transform("{}")]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline.list_tools(None).await.unwrap();
    assert_eq!(result, listing);
}

#[tokio::test]
async fn listing_guard_failure_propagates() {
    let upstream = Arc::new(FakeUpstream::new().respond_to("tools/list", json!({"tools": []})));
    let guard = Arc::new(ScriptedGuard::new(vec![failure("Failure")]));
    let pipeline = pipeline_with(guard, upstream);

    let err = pipeline.list_tools(None).await.unwrap_err();
    assert!(matches!(err, WardenError::GuardRejected(_)));
}

#[tokio::test]
async fn input_transform_substitutes_arguments_before_upstream_call() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [{"type": "text", "text": "done"}]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![transform("{\"a\":1}"), allow()]));
    let pipeline = pipeline_with(guard.clone(), upstream.clone());

    let result = pipeline
        .call_tool(call_params("write_file", json!({"path": "/etc/passwd"})))
        .await
        .unwrap();

    let upstream_calls = upstream.calls_to("tools/call");
    assert_eq!(upstream_calls.len(), 1);
    assert_eq!(
        upstream_calls[0].as_ref().unwrap()["arguments"],
        json!({"a": 1})
    );
    assert_eq!(result["content"][0]["text"], json!("done"));

    let calls = guard.recorded();
    assert_eq!(calls[0].event_type, "tool_input");
    assert_eq!(calls[0].extra_info.tool_name.as_deref(), Some("write_file"));
    assert_eq!(calls[0].extra_info.peer_name, "upstream-tool");
    assert_eq!(calls[1].event_type, "tool_output");
}

#[tokio::test]
async fn blocked_input_never_reaches_upstream() {
    let upstream = Arc::new(FakeUpstream::new());
    let guard = Arc::new(ScriptedGuard::new(vec![block(json!({"reason": "pii"}))]));
    let pipeline = pipeline_with(guard, upstream.clone());

    let result = pipeline
        .call_tool(call_params("lookup", json!({"ssn": "123-45-6789"})))
        .await
        .unwrap();

    // A blocked input is a normal result, not an error
    assert!(result.get("isError").is_none());
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Input has been blocked by Warden."));
    assert!(text.contains("\"reason\": \"pii\""));
    assert!(!text.contains("guard_output"));

    assert!(upstream.calls_to("tools/call").is_empty());
}

#[tokio::test]
async fn input_guard_serializes_arguments_as_one_user_message() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [{"type": "text", "text": "hi"}]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), allow()]));
    let pipeline = pipeline_with(guard.clone(), upstream);

    pipeline
        .call_tool(call_params("echo", json!({"msg": "hello"})))
        .await
        .unwrap();

    let calls = guard.recorded();
    let input = &calls[0].guard_input;
    assert_eq!(input.messages.len(), 1);
    assert_eq!(input.messages[0].role, "user");
    assert_eq!(input.messages[0].content, "{\"msg\":\"hello\"}");
    assert!(input.tools.is_none());
}

#[tokio::test]
async fn missing_arguments_guard_empty_content() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [{"type": "text", "text": "ok"}]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), allow()]));
    let pipeline = pipeline_with(guard.clone(), upstream);

    pipeline
        .call_tool(Some(json!({"name": "no_args"})))
        .await
        .unwrap();

    assert_eq!(guard.recorded()[0].guard_input.messages[0].content, "");
}

#[tokio::test]
async fn input_transform_that_is_not_json_rejects_the_call() {
    let upstream = Arc::new(FakeUpstream::new());
    let guard = Arc::new(ScriptedGuard::new(vec![transform("not-json")]));
    let pipeline = pipeline_with(guard, upstream.clone());

    let err = pipeline
        .call_tool(call_params("echo", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::GuardContractViolation(_)));
    assert!(upstream.calls_to("tools/call").is_empty());
}

#[tokio::test]
async fn unstructured_block_short_circuits_after_earlier_items_are_checked() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [
            {"type": "text", "text": "one"},
            {"type": "text", "text": "two"},
            {"type": "text", "text": "three"},
        ]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![
        allow(), // input
        allow(), // item 1
        block(json!({"reason": "leak"})), // item 2
    ]));
    let pipeline = pipeline_with(guard.clone(), upstream);

    let result = pipeline
        .call_tool(call_params("fetch", json!({})))
        .await
        .unwrap();

    // Item 1 was checked, item 3 was not: exactly two output checkpoints
    let events = guard.events();
    assert_eq!(events, vec!["tool_input", "tool_output", "tool_output"]);

    // Output blocks on the unstructured path are error-flagged and carry
    // only the block notice
    assert_eq!(result["isError"], json!(true));
    let content = result["content"].as_array().unwrap();
    assert_eq!(content.len(), 1);
    let text = content[0]["text"].as_str().unwrap();
    assert!(text.contains("Output has been blocked by Warden."));
    assert!(text.contains("\"reason\": \"leak\""));
    assert!(!text.contains("one"));
}

#[tokio::test]
async fn unstructured_transform_rewrites_item_in_place() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [
            {"type": "text", "text": "keep"},
            {"type": "text", "text": "secret"},
        ]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![
        allow(),
        allow(),
        transform("[redacted]"),
    ]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline
        .call_tool(call_params("fetch", json!({})))
        .await
        .unwrap();

    assert_eq!(result["content"][0]["text"], json!("keep"));
    assert_eq!(result["content"][1]["text"], json!("[redacted]"));
    assert!(result.get("isError").is_none());
}

#[tokio::test]
async fn non_text_items_are_not_guarded() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [
            {"type": "image", "data": "aWJy", "mimeType": "image/png"},
            {"type": "text", "text": "caption"},
        ]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), allow()]));
    let pipeline = pipeline_with(guard.clone(), upstream);

    let result = pipeline
        .call_tool(call_params("render", json!({})))
        .await
        .unwrap();

    // One input checkpoint plus one output checkpoint for the single text item
    assert_eq!(guard.events(), vec!["tool_input", "tool_output"]);
    assert_eq!(result["content"][0]["data"], json!("aWJy"));
    assert_eq!(result["content"][0]["mimeType"], json!("image/png"));
}

#[tokio::test]
async fn structured_output_is_guarded_as_one_checkpoint() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({
            "content": [{"type": "text", "text": "{\"x\":1}"}],
            "structuredContent": {"x": 1},
        }),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), allow()]));
    let pipeline = pipeline_with(guard.clone(), upstream);

    pipeline
        .call_tool(call_params("calc", json!({})))
        .await
        .unwrap();

    let calls = guard.recorded();
    assert_eq!(guard.events(), vec!["tool_input", "tool_output"]);
    assert_eq!(calls[1].guard_input.messages[0].role, "tool");
    assert_eq!(calls[1].guard_input.messages[0].content, "{\"x\":1}");
}

#[tokio::test]
async fn structured_transform_replaces_payload_and_regenerates_text() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({
            "content": [{"type": "text", "text": "{\"x\":1}"}],
            "structuredContent": {"x": 1},
        }),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), transform("{\"y\":2}")]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline
        .call_tool(call_params("calc", json!({})))
        .await
        .unwrap();

    assert_eq!(result["structuredContent"], json!({"y": 2}));
    let content = result["content"].as_array().unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0]["text"], json!("{\"y\":2}"));
}

#[tokio::test]
async fn structured_transform_parse_failure_falls_back_to_raw_text() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({
            "content": [{"type": "text", "text": "{\"x\":1}"}],
            "structuredContent": {"x": 1},
        }),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![
        allow(),
        transform("output withheld"),
    ]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline
        .call_tool(call_params("calc", json!({})))
        .await
        .unwrap();

    assert!(result.get("structuredContent").is_none());
    assert_eq!(result["content"][0]["text"], json!("output withheld"));
}

#[tokio::test]
async fn structured_block_is_a_plain_result() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({
            "content": [{"type": "text", "text": "{\"x\":1}"}],
            "structuredContent": {"x": 1},
        }),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![
        allow(),
        block(json!({"reason": "secret"})),
    ]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline
        .call_tool(call_params("calc", json!({})))
        .await
        .unwrap();

    assert!(result.get("isError").is_none());
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Output has been blocked by Warden."));
    assert!(text.contains("\"reason\": \"secret\""));
}

#[tokio::test]
async fn allow_allow_round_trip_is_byte_identical() {
    let upstream_result = json!({
        "content": [
            {"type": "text", "text": "hello", "annotations": {"audience": ["user"]}},
            {"type": "image", "data": "aWJy", "mimeType": "image/png"},
        ],
        "_meta": {"elapsedMs": 12},
    });
    let upstream = Arc::new(FakeUpstream::new().respond_to("tools/call", upstream_result.clone()));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), allow()]));
    let pipeline = pipeline_with(guard, upstream);

    let result = pipeline
        .call_tool(call_params("greet", json!({"name": "ada"})))
        .await
        .unwrap();

    assert_eq!(result, upstream_result);
}

#[tokio::test]
async fn identical_allowed_calls_are_idempotent() {
    let upstream_result = json!({"content": [{"type": "text", "text": "4"}]});
    let run = |upstream_result: Value| async move {
        let upstream = Arc::new(FakeUpstream::new().respond_to("tools/call", upstream_result));
        let guard = Arc::new(ScriptedGuard::new(vec![allow(), allow()]));
        pipeline_with(guard, upstream)
            .call_tool(call_params("add", json!({"a": 2, "b": 2})))
            .await
            .unwrap()
    };

    let first = run(upstream_result.clone()).await;
    let second = run(upstream_result).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn guard_unreachable_during_output_fails_the_call() {
    let upstream = Arc::new(FakeUpstream::new().respond_to(
        "tools/call",
        json!({"content": [{"type": "text", "text": "sensitive"}]}),
    ));
    let guard = Arc::new(ScriptedGuard::new(vec![allow(), unreachable_guard()]));
    let pipeline = pipeline_with(guard, upstream);

    let err = pipeline
        .call_tool(call_params("fetch", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::GuardTransport(_)));
}

#[tokio::test]
async fn guard_non_success_status_fails_the_call() {
    let upstream = Arc::new(FakeUpstream::new());
    let guard = Arc::new(ScriptedGuard::new(vec![failure("InternalError")]));
    let pipeline = pipeline_with(guard, upstream.clone());

    let err = pipeline
        .call_tool(call_params("echo", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::GuardRejected(_)));
    assert!(upstream.calls_to("tools/call").is_empty());
}

#[tokio::test]
async fn upstream_tool_error_passes_through() {
    // No canned response: the fake answers with a JSON-RPC error
    let upstream = Arc::new(FakeUpstream::new());
    let guard = Arc::new(ScriptedGuard::new(vec![allow()]));
    let pipeline = pipeline_with(guard, upstream);

    let err = pipeline
        .call_tool(call_params("missing", json!({})))
        .await
        .unwrap_err();

    match err {
        WardenError::Upstream(e) => assert_eq!(e.code, -32601),
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_call_params_are_rejected() {
    let upstream = Arc::new(FakeUpstream::new());
    let guard = Arc::new(ScriptedGuard::new(vec![]));
    let pipeline = pipeline_with(guard, upstream);

    let err = pipeline.call_tool(None).await.unwrap_err();
    assert!(matches!(err, WardenError::ValidationError(_)));

    let err = pipeline
        .call_tool(Some(json!({"arguments": {}})))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::ValidationError(_)));
}
