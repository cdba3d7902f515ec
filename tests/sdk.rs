//! SDK operations against a local upstream speaking the service protocol.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use modelrunner::client::{ClientConfig, ServiceUrls};
use modelrunner::queue::JobStatus;
use modelrunner::realtime::{ConnectionState, RealtimeConfig, RealtimeHandlers, ThrottlePolicy};
use modelrunner::resilience::RetryPolicy;
use modelrunner::streaming::{StreamEvent, StreamOptions};
use modelrunner::subscription::{PollingConfig, SubscribeMode, SubscribeOptions, SubscriptionEvent};
use modelrunner::transport::Payload;
use modelrunner::{Client, Error};

use common::{direct_client, relay_config, start_echo_socket, start_relay, Reply, Upstream};

fn urls(upstream: &Upstream) -> ServiceUrls {
    ServiceUrls {
        queue: upstream.base(),
        run: upstream.base(),
        rest: upstream.base(),
        realtime: "ws://127.0.0.1:9".to_string(),
    }
}

fn client(upstream: &Upstream) -> Client {
    Client::new(
        ClientConfig::builder()
            .credentials("client-key")
            .urls(urls(upstream))
            .stream_client(direct_client())
            .build(),
    )
}

fn fast_polling() -> SubscribeOptions {
    SubscribeOptions::default().with_polling(PollingConfig {
        interval_ms: 100,
        backoff_factor: 1.0,
        max_interval_ms: 100,
    })
}

#[tokio::test]
async fn test_run_returns_output() {
    let upstream = Upstream::start(|_| Reply::json(200, json!({"images": ["out.png"]}))).await;

    let output = client(&upstream)
        .run("acme/text-to-image", &json!({"prompt": "a lighthouse"}))
        .await
        .unwrap();

    assert_eq!(output, Payload::Json(json!({"images": ["out.png"]})));
    let seen = upstream.captured();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].target, "/acme/text-to-image");
    assert_eq!(seen[0].header("authorization"), Some("Key client-key"));
    assert!(seen[0]
        .header("user-agent")
        .unwrap()
        .starts_with("modelrunner-client-rust/"));
    assert_eq!(seen[0].json(), json!({"prompt": "a lighthouse"}));
}

#[tokio::test]
async fn test_run_surfaces_validation_issues() {
    let upstream = Upstream::start(|_| {
        Reply::json(
            422,
            json!({"detail": [{"loc": ["body", "prompt"], "msg": "field required", "type": "missing"}]}),
        )
    })
    .await;

    let err = client(&upstream).run("acme/app", &json!({})).await.unwrap_err();
    match err {
        Error::Validation { status, issues, .. } => {
            assert_eq!(status, 422);
            assert_eq!(issues[0].field, "body.prompt");
            assert_eq!(issues[0].kind, "missing");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_through_relay_uses_server_credentials() {
    let upstream = Upstream::start(|_| Reply::json(200, json!({"ok": true}))).await;
    let relay = start_relay(relay_config("relay-key")).await;

    let client = Client::new(
        ClientConfig::builder()
            .credentials("must-not-leak")
            .proxy_url(relay.url("/api/modelrunner/proxy"))
            .urls(urls(&upstream))
            .stream_client(direct_client())
            .build(),
    );
    let output = client.run("acme/app", &json!({"n": 1})).await.unwrap();

    assert_eq!(output, Payload::Json(json!({"ok": true})));
    let seen = upstream.captured();
    assert_eq!(seen[0].target, "/acme/app");
    assert_eq!(seen[0].header("authorization"), Some("Key relay-key"));
    assert_eq!(seen[0].json(), json!({"n": 1}));
}

/// Queue protocol: submit, three status polls, result.
fn queue_upstream(polls: Arc<AtomicUsize>) -> impl Fn(&common::Captured) -> Reply + Send + Sync {
    move |request: &common::Captured| {
        let path = request.target.split('?').next().unwrap_or_default();
        match (request.method.as_str(), path) {
            ("POST", "/acme/app") => Reply::json(200, json!({"request_id": "req-1", "queue_position": 3})),
            ("GET", "/acme/app/requests/req-1/status") => match polls.fetch_add(1, Ordering::SeqCst) {
                0 => Reply::json(200, json!({"status": "IN_QUEUE", "queue_position": 2})),
                1 => Reply::json(
                    200,
                    json!({"status": "IN_PROGRESS", "logs": [{"message": "loading"}]}),
                ),
                _ => Reply::json(
                    200,
                    json!({"status": "COMPLETED", "logs": [{"message": "loading"}, {"message": "done"}]}),
                ),
            },
            ("GET", "/acme/app/requests/req-1") => Reply::json(200, json!({"image": "cat.png"})),
            _ => Reply::json(404, json!({"detail": "not found"})),
        }
    }
}

#[tokio::test]
async fn test_subscribe_polls_to_completion() {
    let polls = Arc::new(AtomicUsize::new(0));
    let upstream = Upstream::start(queue_upstream(polls.clone())).await;

    let mut events = Vec::new();
    let result = client(&upstream)
        .subscribe("acme/app", &json!({"prompt": "cat"}), fast_polling(), |event| {
            events.push(event)
        })
        .await
        .unwrap();

    assert_eq!(result.request_id, "req-1");
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.data, Payload::Json(json!({"image": "cat.png"})));
    assert_eq!(polls.load(Ordering::SeqCst), 3);

    assert_eq!(
        events.first(),
        Some(&SubscriptionEvent::Enqueued {
            request_id: "req-1".to_string()
        })
    );
    assert_eq!(
        events.last(),
        Some(&SubscriptionEvent::Completed {
            request_id: "req-1".to_string()
        })
    );
    let logs: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            SubscriptionEvent::LogAppended { entries, .. } => Some(entries.clone()),
            _ => None,
        })
        .flatten()
        .map(|entry| entry.message)
        .collect();
    assert_eq!(logs, vec!["loading", "done"]);
    assert!(events.contains(&SubscriptionEvent::StatusChanged {
        request_id: "req-1".to_string(),
        status: JobStatus::InQueue,
        queue_position: Some(2),
    }));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_subscribe_over_status_feed() {
    let upstream = Upstream::start(|request| {
        let path = request.target.split('?').next().unwrap_or_default();
        match path {
            "/acme/app" => Reply::json(200, json!({"request_id": "req-9"})),
            "/acme/app/requests/req-9/status/stream" => Reply::sse(&[
                ("", r#"{"status":"IN_QUEUE","queue_position":1}"#),
                ("", r#"{"status":"IN_PROGRESS","logs":[{"message":"step 1"}]}"#),
                ("", r#"{"status":"COMPLETED","logs":[{"message":"step 1"}]}"#),
            ]),
            "/acme/app/requests/req-9" => Reply::json(200, json!({"text": "hello"})),
            _ => Reply::json(404, json!({})),
        }
    })
    .await;

    let options = SubscribeOptions::default().with_mode(SubscribeMode::Streaming);
    let mut events = Vec::new();
    let result = client(&upstream)
        .subscribe("acme/app", &json!({}), options, |event| events.push(event))
        .await
        .unwrap();

    assert_eq!(result.data, Payload::Json(json!({"text": "hello"})));
    assert!(events.last().unwrap().is_terminal());
    let stream_request = upstream
        .captured()
        .into_iter()
        .find(|c| c.target.starts_with("/acme/app/requests/req-9/status/stream"))
        .unwrap();
    assert_eq!(stream_request.header("authorization"), Some("Key client-key"));
}

#[tokio::test]
async fn test_subscribe_times_out_and_cancels_job() {
    let upstream = Upstream::start(|request| {
        let path = request.target.split('?').next().unwrap_or_default();
        match (request.method.as_str(), path) {
            ("POST", "/acme/app") => Reply::json(200, json!({"request_id": "slow"})),
            ("PUT", "/acme/app/requests/slow/cancel") => Reply::json(202, json!({"status": "CANCELLATION_REQUESTED"})),
            _ => Reply::json(200, json!({"status": "IN_QUEUE", "queue_position": 5})),
        }
    })
    .await;

    let options = fast_polling().with_timeout(Duration::from_millis(350));
    let err = client(&upstream)
        .subscribe("acme/app", &json!({}), options, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(upstream
        .captured()
        .iter()
        .any(|c| c.method == "PUT" && c.target == "/acme/app/requests/slow/cancel"));
}

#[tokio::test]
async fn test_stream_partials_then_done() {
    let upstream = Upstream::start(|_| {
        Reply::sse(&[
            ("", r#"{"step":1}"#),
            ("", r#"{"step":2}"#),
            ("done", r#"{"images":["final.png"]}"#),
        ])
    })
    .await;

    let mut channel = client(&upstream)
        .stream("acme/app", &json!({"prompt": "x"}), StreamOptions::default())
        .await
        .unwrap();
    let correlation_id = channel.correlation_id().to_string();

    let mut partials = Vec::new();
    let mut completed = None;
    while let Some(event) = channel.next().await {
        match event {
            StreamEvent::Partial(value) => partials.push(value),
            StreamEvent::Completed(value) => completed = Some(value),
            StreamEvent::Error(e) => panic!("unexpected stream error: {e}"),
        }
    }

    assert_eq!(partials, vec![json!({"step": 1}), json!({"step": 2})]);
    assert_eq!(completed, Some(json!({"images": ["final.png"]})));

    let seen = upstream.captured();
    assert_eq!(seen[0].target, "/acme/app/stream");
    assert_eq!(seen[0].header("accept"), Some("text/event-stream"));
    assert_eq!(
        seen[0].header("x-modelrunner-correlation-id"),
        Some(correlation_id.as_str())
    );
}

#[tokio::test]
async fn test_stream_reconnects_after_drop() {
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let upstream = Upstream::start(move |_| match counter.fetch_add(1, Ordering::SeqCst) {
        0 => Reply::sse(&[("", r#"{"step":1}"#)]),
        _ => Reply::sse(&[("done", r#"{"step":2}"#)]),
    })
    .await;

    let options = StreamOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        ..StreamOptions::default()
    };
    let channel = client(&upstream)
        .stream("acme/app", &json!({}), options)
        .await
        .unwrap();

    let correlation_id = channel.correlation_id().to_string();
    assert_eq!(channel.done().await.unwrap(), json!({"step": 2}));
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    let seen = upstream.captured();
    assert_eq!(seen.len(), 2);
    for request in &seen {
        assert_eq!(
            request.header("x-modelrunner-correlation-id"),
            Some(correlation_id.as_str())
        );
    }
}

#[tokio::test]
async fn test_stream_resumes_with_last_event_id() {
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let upstream = Upstream::start(move |_| match counter.fetch_add(1, Ordering::SeqCst) {
        0 => Reply::sse_with_ids(&[("7", "", r#"{"step":1}"#)]),
        _ => Reply::sse(&[("done", r#"{"step":2}"#)]),
    })
    .await;

    let options = StreamOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        ..StreamOptions::default()
    };
    let channel = client(&upstream)
        .stream("acme/app", &json!({}), options)
        .await
        .unwrap();

    assert_eq!(channel.done().await.unwrap(), json!({"step": 2}));

    let seen = upstream.captured();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].header("last-event-id").is_none());
    assert_eq!(seen[1].header("last-event-id"), Some("7"));
    assert_eq!(
        seen[0].header("x-modelrunner-correlation-id"),
        seen[1].header("x-modelrunner-correlation-id")
    );
}

#[tokio::test]
async fn test_streams_sharing_a_cancel_token_stay_independent() {
    let upstream = Upstream::start(|_| Reply::sse(&[("done", r#"{"ok":true}"#)])).await;
    let client = client(&upstream);
    let shared = CancellationToken::new();
    let options = || StreamOptions {
        cancel: shared.clone(),
        ..StreamOptions::default()
    };

    let first = client.stream("acme/app", &json!({}), options()).await.unwrap();
    let second = client.stream("acme/app", &json!({}), options()).await.unwrap();

    assert_eq!(first.done().await.unwrap(), json!({"ok": true}));
    assert!(!shared.is_cancelled());
    assert_eq!(second.done().await.unwrap(), json!({"ok": true}));
    assert!(!shared.is_cancelled());
}

#[tokio::test]
async fn test_stream_rejection_is_not_retried() {
    let upstream = Upstream::start(|_| Reply::json(401, json!({"detail": "bad key"}))).await;

    let channel = client(&upstream)
        .stream("acme/app", &json!({}), StreamOptions::default())
        .await
        .unwrap();

    let err = channel.done().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(upstream.captured().len(), 1);
}

#[tokio::test]
async fn test_realtime_round_trip_with_token() {
    let upstream = Upstream::start(|_| Reply::json(200, json!({"token": "jwt-abc"}))).await;
    let (socket_addr, paths) = start_echo_socket().await;

    let client = Client::new(
        ClientConfig::builder()
            .credentials("client-key")
            .urls(ServiceUrls {
                realtime: format!("ws://{}", socket_addr),
                ..urls(&upstream)
            })
            .stream_client(direct_client())
            .build(),
    );

    let received = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sink = received.clone();
    let handlers = RealtimeHandlers::new(move |message| {
        sink.lock().unwrap().push(message);
        Ok(())
    });
    let config = RealtimeConfig {
        throttle: ThrottlePolicy::None,
        ..RealtimeConfig::default()
    };
    let channel = client.realtime("acme/app", config, handlers).unwrap();

    channel.send(&json!({"prompt": "first"})).await.unwrap();
    channel.send(&json!({"prompt": "second"})).await.unwrap();

    let mut state = channel.watch_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == ConnectionState::Open))
        .await
        .unwrap()
        .unwrap();
    for _ in 0..100 {
        if received.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(
        *received.lock().unwrap(),
        vec![
            json!({"echo": {"prompt": "first"}}),
            json!({"echo": {"prompt": "second"}})
        ]
    );
    assert_eq!(
        paths.lock().unwrap().first().map(String::as_str),
        Some("/acme/app/realtime?mr_jwt_token=jwt-abc")
    );
    let token_request = &upstream.captured()[0];
    assert_eq!(token_request.target, "/tokens/");
    assert_eq!(token_request.json(), json!({"allowed_apps": ["app"], "token_expiration": 120}));

    channel.close().await;
}
