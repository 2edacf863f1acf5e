// Integration tests for the Parley chat API
// Drives the full router in-process (tower oneshot), no network needed.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parley_server::responder::MockResponder;
use parley_server::storage::Storage;
use parley_server::{build_app, ServerConfig, Services};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with(config: ServerConfig) -> Router {
    let services = Services::new(Storage::in_memory(), Arc::new(MockResponder::new()), &config);
    build_app(&services, &config)
}

fn app() -> Router {
    app_with(ServerConfig::default())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_raw(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, uri, &body.to_string()).await
}

fn text_event(text: &str) -> Value {
    json!({
        "event": {
            "conversationId": "conv_1",
            "eventType": "message",
            "sender": { "type": "user" },
            "payload": { "messageType": "text", "content": { "text": text } }
        }
    })
}

async fn next_chunk(body: &mut Body) -> String {
    loop {
        let frame = body
            .frame()
            .await
            .expect("stream ended")
            .expect("stream error");
        if let Ok(data) = frame.into_data() {
            return String::from_utf8(data.to_vec()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(&app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let (status, body) = get(&app(), "/api-doc/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/chats/send-message"].is_object());
}

#[tokio::test(start_paused = true)]
async fn test_submit_reply_and_catch_up() {
    let app = app();

    let (status, body) = get(&app, "/api/chats/get-conversation-id").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "conversationId": "conv_1", "isNew": true }));

    let (status, ack) = post(&app, "/api/chats/send-message", text_event("hi")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ack["expectResponse"], true);
    let event_id = ack["eventId"].as_str().unwrap().to_string();
    assert!(ack["requestId"].as_str().unwrap().starts_with("req_"));

    // Let the responder run.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let (status, history) = get(
        &app,
        &format!("/api/chats/get-history?conversationId=conv_1&messages_after={event_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["hasMore"], false);
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["sender"]["type"], "bot");
    assert_eq!(messages[0]["payload"]["messageType"], "markdown");

    let (_, body) = get(&app, "/api/chats/get-conversation-id").await;
    assert_eq!(body["isNew"], false);

    let (status, chats) = get(&app, "/api/chats/get-chats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats["chats"][0]["conversationId"], "conv_1");
}

#[tokio::test(start_paused = true)]
async fn test_context_event_does_not_expect_response() {
    let app = app();
    let (status, ack) = post(
        &app,
        "/api/chats/send-message",
        json!({
            "event": {
                "conversationId": "conv_1",
                "eventType": "info",
                "sender": { "type": "system" },
                "payload": { "messageType": "context", "content": { "data": { "page": "home" } } }
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ack["expectResponse"], false);
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected_and_not_recorded() {
    let app = app();

    let mut missing_type = text_event("hi");
    missing_type["event"]
        .as_object_mut()
        .unwrap()
        .remove("eventType");
    let (status, body) = post(&app, "/api/chats/send-message", missing_type).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "event.eventType is required");

    let (status, body) = post_raw(&app, "/api/chats/send-message", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, history) = get(&app, "/api/chats/get-history?conversationId=conv_1").await;
    assert_eq!(history["messages"], json!([]));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_hides_trigger_from_history() {
    let app = app_with(ServerConfig {
        responder: parley_server::config::ResponderConfig {
            delays: vec![Duration::from_secs(5)],
            timeout: None,
        },
        ..ServerConfig::default()
    });

    let (_, first) = post(&app, "/api/chats/send-message", text_event("hello")).await;
    let (_, second) = post(&app, "/api/chats/send-message", text_event("show me properties")).await;

    let (status, body) = post(
        &app,
        "/api/chats/cancel",
        json!({ "requestId": second["requestId"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (_, history) = get(&app, "/api/chats/get-history?conversationId=conv_1").await;
    let ids: Vec<_> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["eventId"].clone())
        .collect();
    assert_eq!(ids, vec![first["eventId"].clone()]);

    // Cancelling again, or an unknown id, is still ok.
    let (status, _) = post(
        &app,
        "/api/chats/cancel",
        json!({ "requestId": second["requestId"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&app, "/api/chats/cancel", json!({ "requestId": "req_nope" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/api/chats/cancel", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "requestId is required");
}

#[tokio::test(start_paused = true)]
async fn test_rapid_submits_cancel_independently() {
    let app = app_with(ServerConfig {
        responder: parley_server::config::ResponderConfig {
            delays: vec![Duration::from_secs(5)],
            timeout: None,
        },
        ..ServerConfig::default()
    });

    let (_, first) = post(&app, "/api/chats/send-message", text_event("hello")).await;
    let (_, second) = post(&app, "/api/chats/send-message", text_event("show me properties")).await;
    assert_ne!(first["requestId"], second["requestId"]);

    let (status, _) = post(
        &app,
        "/api/chats/cancel",
        json!({ "requestId": first["requestId"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_secs(6)).await;

    // Cancel only hides the trigger; both replies still arrive.
    let (_, history) = get(&app, "/api/chats/get-history?conversationId=conv_1").await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["eventId"], second["eventId"]);
    assert!(messages[1..].iter().all(|m| m["sender"]["type"] == "bot"));
    let mut reply_types: Vec<_> = messages[1..]
        .iter()
        .map(|m| m["payload"]["messageType"].as_str().unwrap())
        .collect();
    reply_types.sort_unstable();
    assert_eq!(reply_types, vec!["markdown", "template"]);
}

#[tokio::test(start_paused = true)]
async fn test_submitted_event_ids_are_assigned_by_server() {
    let app = app();

    let mut event = text_event("hi");
    event["event"]["eventId"] = json!("dup");
    event["event"]["createdAt"] = json!("2020-01-01T00:00:00Z");

    let (status, first) = post(&app, "/api/chats/send-message", event.clone()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, second) = post(&app, "/api/chats/send-message", event).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_ne!(first["eventId"], "dup");
    assert_ne!(first["eventId"], second["eventId"]);

    let (_, history) = get(&app, "/api/chats/get-history?conversationId=conv_1").await;
    let messages = history["messages"].as_array().unwrap();
    let ids: Vec<_> = messages.iter().map(|m| m["eventId"].clone()).collect();
    assert_eq!(ids, vec![first["eventId"].clone(), second["eventId"].clone()]);
    assert!(messages
        .iter()
        .all(|m| !m["createdAt"].as_str().unwrap().starts_with("2020")));
}

#[tokio::test]
async fn test_history_requires_conversation_id() {
    let app = app();
    let (status, body) = get(&app, "/api/chats/get-history").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conversationId is required");

    let (status, _) = get(&app, "/api/chats/get-history?conversationId=conv_1&last=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn test_history_pagination_modes() {
    let app = app_with(ServerConfig {
        responder: parley_server::config::ResponderConfig {
            // Keep the responder out of the way.
            delays: vec![Duration::from_secs(3600)],
            timeout: None,
        },
        ..ServerConfig::default()
    });

    let mut ids = Vec::new();
    for i in 0..8 {
        let (_, ack) = post(&app, "/api/chats/send-message", text_event(&format!("m{i}"))).await;
        ids.push(ack["eventId"].as_str().unwrap().to_string());
    }
    let ids_of = |history: &Value| -> Vec<String> {
        history["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["eventId"].as_str().unwrap().to_string())
            .collect()
    };

    let (_, last) = get(&app, "/api/chats/get-history?conversationId=conv_1&last=3").await;
    assert_eq!(ids_of(&last), ids[5..].to_vec());
    assert_eq!(last["hasMore"], true);

    let (_, before) = get(
        &app,
        &format!(
            "/api/chats/get-history?conversationId=conv_1&messages_before={}&page_size=2",
            ids[5]
        ),
    )
    .await;
    assert_eq!(ids_of(&before), ids[3..5].to_vec());
    assert_eq!(before["hasMore"], true);

    let (_, page) = get(
        &app,
        "/api/chats/get-history?conversationId=conv_1&page=1&page_size=4",
    )
    .await;
    assert_eq!(ids_of(&page), ids[4..].to_vec());
    assert_eq!(page["hasMore"], false);

    // `last` wins over the other modes.
    let (_, mixed) = get(
        &app,
        &format!(
            "/api/chats/get-history?conversationId=conv_1&last=1&messages_after={}",
            ids[0]
        ),
    )
    .await;
    assert_eq!(ids_of(&mixed), vec![ids[7].clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_stream_delivers_bot_events() {
    let app = app();

    let (status, _) = get(&app, "/api/chats/stream").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/chats/stream?conversationId=conv_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut body = response.into_body();
    assert_eq!(next_chunk(&mut body).await, ": connected\n\n");

    let (_, ack) = post(&app, "/api/chats/send-message", text_event("hi")).await;

    let frame = next_chunk(&mut body).await;
    assert!(frame.contains("\nevent: chat_event\ndata: "));
    let data = frame
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .unwrap();
    let event: Value = serde_json::from_str(data).unwrap();
    assert_eq!(event["sender"]["type"], "bot");
    assert_ne!(event["eventId"], ack["eventId"]);

    // Idle with nothing pending: closed with a notification.
    let close = next_chunk(&mut body).await;
    assert_eq!(close, "event: connection_close\ndata: {\"reason\":\"idle\"}\n\n");
    assert!(body.frame().await.is_none());
}

#[tokio::test]
async fn test_demo_seeding() {
    let path = std::env::temp_dir().join(format!(
        "parley-demo-{}.json",
        parley_core::ids::new_event_id()
    ));
    std::fs::write(
        &path,
        json!({
            "messages": [{
                "eventId": "evt_demo_1",
                "eventType": "message",
                "sender": { "type": "bot", "id": "re_bot" },
                "payload": { "messageType": "text", "content": { "text": "Welcome back" } },
                "createdAt": "2024-01-01T00:00:00Z"
            }]
        })
        .to_string(),
    )
    .unwrap();

    let app = app_with(ServerConfig {
        demo_flow_path: path.clone(),
        ..ServerConfig::default()
    });

    let (_, body) = get(&app, "/api/chats/get-conversation-id?demo=true").await;
    assert_eq!(body["isNew"], false);

    let (_, history) = get(&app, "/api/chats/get-history?conversationId=conv_1&last=6").await;
    assert_eq!(history["messages"][0]["eventId"], "evt_demo_1");

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_api_prefix() {
    let app = app_with(ServerConfig {
        api_prefix: "/v2".to_string(),
        ..ServerConfig::default()
    });

    let (status, _) = get(&app, "/v2/api/chats/get-conversation-id").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}
