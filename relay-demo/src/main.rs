//! Example binary exercising `relay-core` end to end: static and
//! parameterized routes, JSON handlers, a logging middleware, and an SSE
//! stream driven by a scheduler timer.
//!
//! CLI/config loading, the logging sink, and static-file handling are
//! all the embedding binary's job here, not the library's.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::config::ServerOptions;
use relay_core::connection::Server;
use relay_core::error::{RelayError, Result};
use relay_core::event::Event;
use relay_core::middleware::Next;
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

/// Pre/post logging middleware: log before calling `next`, then again
/// with the outcome once the inner chain returns.
async fn request_logger(event: Event, next: Next) -> Result<Event> {
    let method = event.request.method;
    let path = event.request.path.clone();
    log::info!("-> {method} {path}");
    let event = next.call(event).await?;
    log::info!("<- {method} {path} {}", event.response.status);
    Ok(event)
}

/// Emits ten numbered events one second apart, then closes the stream.
async fn counting_stream(writer: SseWriter, scheduler: SchedulerHandle) -> Result<()> {
    let writer = Arc::new(tokio::sync::Mutex::new(writer));
    let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let writer_clone = writer.clone();
    let counter_clone = counter.clone();
    scheduler.spawn_interval(Duration::from_secs(1), move || {
        let writer = writer_clone.clone();
        let counter = counter_clone.clone();
        tokio::spawn(async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n >= 10 {
                writer.lock().await.close();
                return;
            }
            let event = SseEvent::data(n.to_string()).with_event("tick").with_id(n.to_string());
            if let Err(err) = writer.lock().await.send_event(event) {
                log::warn!("sse send failed: {err}");
            }
        });
    });

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    // Each worker drives its own current-thread runtime (see
    // `Server::serve`); this top-level runtime only needs to run the
    // server's own setup future and the `spawn_blocking` calls that launch
    // the worker threads, so it doesn't need a multi-thread scheduler.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let mut server = Server::new(ServerOptions::default());

    server.route(Method::Get, "/", Arc::new(hello))?;
    server.route(Method::Get, "/users/:id", Arc::new(get_user))?;
    server.route(Method::Post, "/api/users", Arc::new(create_user))?;
    server.stream_with_scheduler("/events", counting_stream)?;
    server.use_middleware(request_logger);

    let shutdown = server.shutdown_handle();
    install_ctrlc_handler(shutdown);

    server.serve().await
}

/// Wire `Ctrl+C` to the server's own `Arc<AtomicBool>` handle rather than a
/// process-global flag.
fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        log::info!("SIGINT received, shutting down");
        shutdown.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");
}
