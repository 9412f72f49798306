//! Domain events from the facade driving the task engine.

use crate::helpers::{app_on, config_for, temp_app};
use davetjet::TaskStatus;
use davetjet_transport::{OutgoingRequest, topics};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn created_invitation_completes_task_and_opens_gated_ones() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-invitation-api"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 7 })))
        .mount(&server)
        .await;
    let t = temp_app(Some(&server.uri()));

    assert_eq!(
        t.app.tasks().unwrap().status("sending_setup"),
        Some(TaskStatus::Hidden)
    );

    let response = t
        .app
        .fetch(OutgoingRequest::post("/create-invitation-api"))
        .await
        .unwrap();
    assert_eq!(response.status, 201);

    let engine = t.app.tasks().unwrap();
    assert_eq!(engine.status("create_invitation"), Some(TaskStatus::Done));
    assert_eq!(engine.status("sending_setup"), Some(TaskStatus::Visible));
    assert_eq!(engine.status("analytics_view"), Some(TaskStatus::Visible));
}

#[tokio::test]
async fn intercepted_schedule_send_completes_sending_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule-send/42/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let t = temp_app(Some(&server.uri()));
    t.app.tasks().unwrap().complete("create_invitation").unwrap();

    let response = t
        .app
        .fetch(
            OutgoingRequest::post("/api/schedule-send/42/")
                .with_header("X-Request-Label", "Sending"),
        )
        .await
        .unwrap();
    assert!(response.ok());
    assert_eq!(
        t.app.tasks().unwrap().status("sending_setup"),
        Some(TaskStatus::Done)
    );

    // Hint headers never reach the server.
    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-request-label").is_none());
}

#[tokio::test]
async fn failed_create_does_not_complete_anything() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-invitation-api"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;
    let t = temp_app(Some(&server.uri()));

    let response = t
        .app
        .fetch(OutgoingRequest::post("/create-invitation-api"))
        .await
        .unwrap();
    assert_eq!(response.status, 422);
    assert_eq!(
        t.app.tasks().unwrap().status("create_invitation"),
        Some(TaskStatus::Visible)
    );
}

#[tokio::test]
async fn intercepted_server_error_is_retried_and_returned_as_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stats"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let t = temp_app(Some(&server.uri()));

    let response = t
        .app
        .fetch(OutgoingRequest::get("/api/stats"))
        .await
        .unwrap();
    assert_eq!(response.status, 503);
    // Intercepted calls are silent by default.
    assert!(t.notices.is_empty());
}

#[tokio::test]
async fn recipients_event_is_observed_without_completing_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recipients/abc/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let t = temp_app(Some(&server.uri()));

    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let sink = Arc::clone(&seen);
    t.app.bus().on(topics::RECIPIENTS_ADDED, move |payload| {
        sink.lock().unwrap().push(payload.clone());
        Ok(())
    });

    t.app
        .fetch(OutgoingRequest::post("/recipients/abc/"))
        .await
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(t.app.tasks().unwrap().state().done.len(), 0);
}

#[tokio::test]
async fn completion_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invitation-draft-promote/9"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let t = temp_app(Some(&server.uri()));
    t.app
        .fetch(OutgoingRequest::post("/invitation-draft-promote/9"))
        .await
        .unwrap();

    let restarted = app_on(t.dir.path(), config_for(Some(&server.uri())), &t.clock, &t.notices);
    assert_eq!(
        restarted.tasks().unwrap().status("create_invitation"),
        Some(TaskStatus::Done)
    );
}
