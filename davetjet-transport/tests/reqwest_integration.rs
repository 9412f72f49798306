//! End-to-end tests for the reqwest-backed path.
//!
//! Each test runs against a local `wiremock` server, so no external network is
//! involved. Timings use small real delays.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use davetjet_transport::{
    topics, ConfigOverrides, EventBus, Executor, FailureBody, FailureKind, InterceptPolicy,
    OutgoingRequest, RecordingNotifier, ReqwestClient, ResponseMode, TransportContext,
    TransportFacade,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Rig {
    executor: Arc<Executor>,
    client: Arc<ReqwestClient>,
    notifier: Arc<RecordingNotifier>,
    bus: Arc<EventBus>,
}

fn rig() -> Rig {
    let client = Arc::new(ReqwestClient::new(None).unwrap());
    let notifier = Arc::new(RecordingNotifier::new());
    let bus = Arc::new(EventBus::new());
    let context = Arc::new(TransportContext::new(notifier.clone(), bus.clone()));
    let executor = Arc::new(Executor::new(client.clone(), context));
    Rig {
        executor,
        client,
        notifier,
        bus,
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retries_through_transient_unavailability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guests"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/guests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"guests": 3})))
        .mount(&server)
        .await;

    let rig = rig();
    let overrides = ConfigOverrides {
        retries: Some(2),
        retry_backoff_base_ms: Some(20),
        response_mode: Some(ResponseMode::Json),
        ..ConfigOverrides::default()
    };
    let started = Instant::now();
    let value = rig
        .executor
        .execute(
            OutgoingRequest::get(format!("{}/api/guests", server.uri())),
            &overrides,
            None,
        )
        .await
        .unwrap()
        .into_json()
        .unwrap();

    assert_eq!(value["guests"], 3);
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(rig.notifier.is_empty());
}

#[tokio::test]
async fn always_unavailable_ends_in_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let rig = rig();
    let overrides = ConfigOverrides {
        timeout_ms: Some(100),
        retries: Some(2),
        retry_backoff_base_ms: Some(50),
        ..ConfigOverrides::default()
    };
    let started = Instant::now();
    let failure = rig
        .executor
        .execute(
            OutgoingRequest::get(format!("{}/api/x", server.uri())),
            &overrides,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::HttpError);
    assert_eq!(failure.status, Some(503));
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(rig.notifier.matching("Service Unavailable").len(), 1);
}

#[tokio::test]
async fn slow_server_times_out_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let rig = rig();
    let timeouts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&timeouts);
    rig.bus.on(topics::REQUEST_TIMEOUT, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let overrides = ConfigOverrides {
        timeout_ms: Some(100),
        retries: Some(3),
        ..ConfigOverrides::labelled("Report")
    };
    let failure = rig
        .executor
        .execute(
            OutgoingRequest::get(format!("{}/api/report", server.uri())),
            &overrides,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(rig.notifier.matching("Report: Request timed out").len(), 1);
}

#[tokio::test]
async fn json_error_body_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule-send/9"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "No recipients yet"})),
        )
        .mount(&server)
        .await;

    let rig = rig();
    let overrides = ConfigOverrides {
        response_mode: Some(ResponseMode::Json),
        ..ConfigOverrides::default()
    };
    let failure = rig
        .executor
        .execute(
            OutgoingRequest::post(format!("{}/api/schedule-send/9", server.uri())),
            &overrides,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.status, Some(422));
    assert_eq!(failure.message, "No recipients yet");
    let Some(FailureBody::Json(body)) = failure.body else {
        panic!("expected a json body");
    };
    assert_eq!(body["message"], "No recipients yet");
}

#[tokio::test]
async fn html_page_surfaces_sidecar_messages() {
    let page = r#"<!doctype html><html><head><title>Guests</title></head><body>
        <script id="dj-messages" type="application/json">
          {"version": 2, "messages": [{"level": "warning", "message": "Quota almost used", "duration": 9000}]}
        </script></body></html>"#;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let rig = rig();
    let overrides = ConfigOverrides {
        response_mode: Some(ResponseMode::Html),
        ..ConfigOverrides::default()
    };
    let payload = rig
        .executor
        .execute(
            OutgoingRequest::get(format!("{}/guests", server.uri())),
            &overrides,
            None,
        )
        .await
        .unwrap();

    let davetjet_transport::ResponsePayload::Html(doc) = payload else {
        panic!("expected html");
    };
    assert_eq!(doc.title().as_deref(), Some("Guests"));
    let notices = rig.notifier.matching("Quota almost used");
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].options.duration_ms, 9_000);
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let rig = rig();
    let overrides = ConfigOverrides {
        retries: Some(1),
        retry_backoff_base_ms: Some(10),
        ..ConfigOverrides::default()
    };
    // Port 9 (discard) is closed on test machines.
    let failure = rig
        .executor
        .execute(OutgoingRequest::get("http://127.0.0.1:9/api/x"), &overrides, None)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::NetworkError);
    assert_eq!(rig.notifier.matching("Network error").len(), 1);
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn facade_strips_hints_and_announces_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-invitation-api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .mount(&server)
        .await;
    Mock::given(header_exists("x-request-label"))
        .respond_with(ResponseTemplate::new(400))
        .with_priority(1)
        .mount(&server)
        .await;

    let rig = rig();
    let facade = TransportFacade::new(rig.executor.clone(), rig.client.clone()).unwrap();
    assert!(facade.install(InterceptPolicy::default_for(&server.uri()).unwrap()));

    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    rig.bus.on(topics::INVITATION_CREATED, move |payload| {
        assert_eq!(payload["method"], "POST");
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let response = facade
        .fetch(
            OutgoingRequest::post("/create-invitation-api")
                .with_header("X-Request-Label", "Create")
                .with_body(r#"{"title":"Wedding"}"#),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.json::<serde_json::Value>().unwrap()["id"], 7);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn facade_bypasses_static_assets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let rig = rig();
    let facade = TransportFacade::new(rig.executor.clone(), rig.client.clone()).unwrap();
    facade.install(InterceptPolicy::default_for(&server.uri()).unwrap());

    let response = facade.fetch(OutgoingRequest::get("/api/app.js")).await.unwrap();
    assert_eq!(response.status, 500);
    // bypassed: no retry from the policy defaults
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let response = facade.fetch(OutgoingRequest::get("/api/list")).await.unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
