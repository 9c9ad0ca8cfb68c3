//! End-to-end scenarios driven over a real TCP socket
//! against a `relay_core::connection::Server` bound to an ephemeral port.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::config::ServerOptions;
use relay_core::connection::Server;
use relay_core::error::{RelayError, Result};
use relay_core::event::Event;
use relay_core::route::Method;
use relay_core::sse::{SchedulerHandle, SseEvent, SseWriter};
use serde_json::json;

async fn hello(mut event: Event) -> Result<Event> {
    event.send_text("Hello")?;
    Ok(event)
}

async fn get_user(mut event: Event) -> Result<Event> {
    let id = event.get_param("id").unwrap_or("").to_string();
    event.send_text(id)?;
    Ok(event)
}

async fn create_user(mut event: Event) -> Result<Event> {
    let body = event.request.body.clone().unwrap_or_default();
    let parsed: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| RelayError::Handler(format!("invalid JSON body: {e}")))?;
    let name = parsed.get("name").and_then(|v| v.as_str()).unwrap_or("anonymous");
    event.set_status(http::StatusCode::CREATED)?;
    event.send_json_value(&json!({ "id": 1, "name": name }))?;
    Ok(event)
}

/// Emits five numbered events ~50ms apart, then closes the stream. A real
/// deployment might use a slower, e.g. 1s/10-event cadence; this test uses
/// a faster one so the suite stays quick while still exercising the same
/// streaming handoff, scheduler-driven timer, and close path.
async fn counting_stream(writer: SseWriter, scheduler: SchedulerHandle) -> Result<()> {
    let writer = Arc::new(tokio::sync::Mutex::new(writer));
    let counter = Arc::new(AtomicU64::new(0));

    let writer_clone = writer.clone();
    let counter_clone = counter.clone();
    scheduler.spawn_interval(Duration::from_millis(50), move || {
        let writer = writer_clone.clone();
        let counter = counter_clone.clone();
        tokio::spawn(async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n >= 5 {
                writer.lock().await.close();
                return;
            }
            let event = SseEvent::data(n.to_string()).with_event("tick").with_id(n.to_string());
            let _ = writer.lock().await.send_event(event);
        });
    });

    Ok(())
}

/// Emits three numbered events ~80ms apart (240ms total), well past the
/// shortened `linger_timeout_ms` the regression test below configures. The
/// linger timeout bounds only the post-handler drain, not the handler's own
/// running time, so none of these ticks should ever be cut off.
async fn slow_stream(writer: SseWriter, scheduler: SchedulerHandle) -> Result<()> {
    let writer = Arc::new(tokio::sync::Mutex::new(writer));
    let counter = Arc::new(AtomicU64::new(0));

    let writer_clone = writer.clone();
    let counter_clone = counter.clone();
    scheduler.spawn_interval(Duration::from_millis(80), move || {
        let writer = writer_clone.clone();
        let counter = counter_clone.clone();
        tokio::spawn(async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n >= 3 {
                writer.lock().await.close();
                return;
            }
            let event = SseEvent::data(n.to_string()).with_event("tick");
            let _ = writer.lock().await.send_event(event);
        });
    });

    Ok(())
}

/// Bind to an ephemeral port on a background OS thread with its own tokio
/// runtime, and return the resolved port once the listener is ready.
///
/// Binding synchronously (before spawning the server's accept loop) avoids
/// a race between "server is listening" and "test dials the port".
fn spawn_test_server() -> u16 {
    spawn_test_server_with(|_| {})
}

/// Same as [`spawn_test_server`], but lets the caller tweak `ServerOptions`
/// (e.g. shrink `linger_timeout_ms` for a fast-running regression test)
/// before the server starts accepting connections.
fn spawn_test_server_with(configure: impl FnOnce(&mut ServerOptions) + Send + 'static) -> u16 {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = std_listener.local_addr().unwrap().port();
    std_listener.set_nonblocking(true).unwrap();
    drop(std_listener);

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let mut options = ServerOptions::default();
            options.host = "127.0.0.1".to_string();
            options.port = port;
            options.worker_count = Some(1);
            configure(&mut options);
            let mut server = Server::new(options);
            server.route(Method::Get, "/", Arc::new(hello)).unwrap();
            server.route(Method::Get, "/users/:id", Arc::new(get_user)).unwrap();
            server.route(Method::Post, "/api/users", Arc::new(create_user)).unwrap();
            server.stream_with_scheduler("/events", counting_stream).unwrap();
            server.stream_with_scheduler("/events-slow", slow_stream).unwrap();
            server.serve().await.unwrap();
        });
    });

    // Give the accept loop a moment to start listening.
    std::thread::sleep(Duration::from_millis(200));
    port
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[test]
fn scenario_1_get_root_returns_hello() {
    let port = spawn_test_server();
    let resp = client().get(format!("http://127.0.0.1:{port}/")).send().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(resp.headers().get("content-length").unwrap(), "5");
    assert_eq!(resp.text().unwrap(), "Hello");
}

#[test]
fn scenario_2_get_user_echoes_param() {
    let port = spawn_test_server();
    let resp = client().get(format!("http://127.0.0.1:{port}/users/42")).send().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().unwrap(), "42");
}

#[test]
fn scenario_3_post_json_returns_201_with_id() {
    let port = spawn_test_server();
    let resp = client()
        .post(format!("http://127.0.0.1:{port}/api/users"))
        .header("Content-Type", "application/json")
        .body(r#"{"name":"x"}"#)
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body = resp.text().unwrap();
    assert!(body.contains("\"id\":1"));
}

#[test]
fn scenario_4_missing_route_returns_404_not_found() {
    let port = spawn_test_server();
    let resp = client().get(format!("http://127.0.0.1:{port}/missing")).send().unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(resp.text().unwrap(), "Not Found");
}

#[test]
fn keep_alive_serves_multiple_requests_on_one_connection() {
    let port = spawn_test_server();
    let c = client();
    for _ in 0..5 {
        let resp = c.get(format!("http://127.0.0.1:{port}/")).send().unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.text().unwrap(), "Hello");
    }
}

#[test]
fn scenario_5_sse_stream_emits_framed_events_with_no_content_length() {
    let port = spawn_test_server();
    let resp = client().get(format!("http://127.0.0.1:{port}/events")).send().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/event-stream");
    assert!(resp.headers().get("content-length").is_none());

    // The handler closes the writer after five ticks, so this blocks only
    // until the stream naturally ends rather than until the client's
    // overall request timeout.
    let body = resp.text().unwrap();
    let frame_count = body.matches("event: tick\n").count();
    assert_eq!(frame_count, 5);
    assert!(body.contains("data: 0\n\n"));
    assert!(body.contains("id: 4\n"));
}

#[test]
fn long_running_stream_outlives_a_short_linger_timeout() {
    // `linger_timeout_ms` bounds only the drain that happens after the
    // handler finishes, not the time the handler itself is allowed to run.
    // Shrinking it well below the handler's ~240ms lifetime would have
    // truncated the stream under the old single-deadline drain loop.
    let port = spawn_test_server_with(|options| {
        options.linger_timeout_ms = 20;
    });
    let resp = client()
        .get(format!("http://127.0.0.1:{port}/events-slow"))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.text().unwrap();
    let frame_count = body.matches("event: tick\n").count();
    assert_eq!(frame_count, 3);
    assert!(body.contains("data: 2\n\n"));
}
