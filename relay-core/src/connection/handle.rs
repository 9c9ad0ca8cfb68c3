//! Per-connection state machine:
//! `Reading -> Dispatching -> (WritingResponse | Streaming) -> Draining -> Closed`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::connection::server::ServerRuntime;
use crate::connection::types::WriteQueue;
use crate::error::{RelayError, Result};
use crate::event::Event;
use crate::httpwire::{self, ParseOutcome};
use crate::route::HandlerVariant;
use crate::sse::{SchedulerHandle, SseWriter, WriteCommand};

/// Drive one accepted TCP connection through its full lifecycle, looping
/// back to `Reading` across keep-alive requests until the peer closes,
/// a timeout fires, or the handler requests `Connection: close`.
pub async fn handle_connection(mut stream: TcpStream, runtime: Arc<ServerRuntime>) -> Result<()> {
    let mut read_buf: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut first_request = true;

    loop {
        // -- Reading --
        let parsed = match read_request(&mut stream, &mut read_buf, &runtime, first_request).await {
            ReadOutcome::Request(req) => req,
            ReadOutcome::PeerClosed => return Ok(()),
            ReadOutcome::TimedOut => return Ok(()),
            ReadOutcome::ProtocolError(err) => {
                write_error_response(&mut stream, 400, "Bad Request").await;
                return Err(err);
            }
            ReadOutcome::VersionError(err) => {
                write_error_response(&mut stream, 505, "HTTP Version Not Supported").await;
                return Err(err);
            }
            ReadOutcome::BodyTooLarge(err) => {
                write_error_response(&mut stream, 413, "Payload Too Large").await;
                return Err(err);
            }
        };
        first_request = false;

        // -- Dispatching --
        let mut event = runtime.memory.events().acquire();
        event.request = parsed;
        let keep_alive = wants_keep_alive(&event);
        let method = event.request.method;
        let path = event.request.path.clone();

        let dispatched = run_dispatch_catching_panics(&runtime, method, path, event).await;
        let mut event = match dispatched {
            Ok(e) => e,
            Err(err) => {
                log::error!("dispatch failed: {err}");
                write_error_response(&mut stream, 500, "Internal Server Error").await;
                return Err(err);
            }
        };

        if event.pending_stream_handler.is_some() {
            // -- Streaming --
            run_streaming(&mut stream, &runtime, &mut event).await?;
            runtime.memory.events().release(event);
            return Ok(());
        }

        // -- WritingResponse --
        write_buffered_response(&mut stream, &mut event, &runtime, keep_alive).await?;
        runtime.memory.events().release(event);

        if !keep_alive {
            // -- Draining / Closed --
            let _ = stream.shutdown().await;
            return Ok(());
        }
        // else: loop back to Reading on the same connection.
    }
}

enum ReadOutcome {
    Request(crate::event::Request),
    PeerClosed,
    TimedOut,
    ProtocolError(RelayError),
    VersionError(RelayError),
    BodyTooLarge(RelayError),
}

async fn read_request(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    runtime: &ServerRuntime,
    is_first_request: bool,
) -> ReadOutcome {
    let mut chunk = [0u8; 8 * 1024];
    let request_timeout = Duration::from_millis(runtime.options.request_timeout_ms);
    let idle_timeout = Duration::from_millis(runtime.options.keepalive_timeout_ms);
    // The very first request on a fresh connection (or any bytes already
    // pipelined into `buf`) always uses the request timeout; only the idle
    // wait for the *next* request's first byte on an already-open keep-alive
    // connection uses the keep-alive timeout.
    let mut received_any_bytes = is_first_request || !buf.is_empty();

    loop {
        match httpwire::try_parse_request(buf, runtime.options.max_body_bytes) {
            Ok(ParseOutcome::Complete { request, consumed }) => {
                buf.drain(..consumed);
                return ReadOutcome::Request(request);
            }
            Ok(ParseOutcome::Incomplete) => {}
            Err(err) => {
                return if httpwire::is_version_error(&err) {
                    ReadOutcome::VersionError(err)
                } else if httpwire::is_body_too_large(&err) {
                    ReadOutcome::BodyTooLarge(err)
                } else {
                    ReadOutcome::ProtocolError(err)
                };
            }
        }

        let timeout = if received_any_bytes { request_timeout } else { idle_timeout };
        let read = tokio::time::timeout(timeout, stream.read(&mut chunk)).await;
        match read {
            Ok(Ok(0)) => return ReadOutcome::PeerClosed,
            Ok(Ok(n)) => {
                received_any_bytes = true;
                buf.extend_from_slice(&chunk[..n]);
            }
            Ok(Err(_)) => return ReadOutcome::PeerClosed,
            Err(_) => return ReadOutcome::TimedOut,
        }
    }
}

fn wants_keep_alive(event: &Event) -> bool {
    match event.get_header("connection") {
        Some(v) => v.eq_ignore_ascii_case("keep-alive"),
        None => matches!(event.request.version, crate::event::HttpVersion::Http11),
    }
}

/// Run the dispatcher's middleware/handler chain inside a `tokio::spawn`ed
/// task so a panicking handler is caught via `JoinError::is_panic()`
/// rather than taking down the worker. Takes and returns the pooled `Box`
/// itself (writing the dispatch result back in place) rather than
/// unboxing and reboxing around the spawn boundary, so a dispatch that
/// completes normally costs no extra heap allocation beyond the original
/// `acquire()`.
async fn run_dispatch_catching_panics(
    runtime: &Arc<ServerRuntime>,
    method: crate::route::Method,
    path: String,
    mut event: Box<Event>,
) -> Result<Box<Event>> {
    let runtime = runtime.clone();
    let join = tokio::spawn(async move {
        match runtime.dispatcher.dispatch(method, path, *event).await {
            Ok(e) => {
                *event = e;
                Ok(event)
            }
            Err(err) => Err(err),
        }
    });
    match join.await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            Err(RelayError::Handler("handler panicked".to_string()))
        }
        Err(join_err) => Err(RelayError::Transport(std::io::Error::new(
            std::io::ErrorKind::Other,
            join_err.to_string(),
        ))),
    }
}

async fn write_buffered_response(
    stream: &mut TcpStream,
    event: &mut Event,
    runtime: &ServerRuntime,
    keep_alive: bool,
) -> Result<()> {
    let headers: Vec<(String, String)> = event
        .response
        .headers
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect();
    let mut bytes = httpwire::encode_status_and_headers(event.response.status, headers.into_iter(), keep_alive);
    if let Some(body) = &event.response.body {
        bytes.extend_from_slice(&body.bytes);
    }
    let timeout = Duration::from_millis(runtime.options.write_timeout_ms);
    tokio::time::timeout(timeout, stream.write_all(&bytes))
        .await
        .map_err(|_| RelayError::Transport(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out")))?
        .map_err(RelayError::Transport)?;
    event.response.mark_sent();
    Ok(())
}

async fn write_error_response(stream: &mut TcpStream, status: u16, reason: &str) {
    let body = reason.as_bytes();
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body).await;
    let _ = stream.shutdown().await;
}

/// -- Streaming --
async fn run_streaming(stream: &mut TcpStream, runtime: &Arc<ServerRuntime>, event: &mut Event) -> Result<()> {
    let headers: Vec<(String, String)> = event
        .response
        .headers
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect();
    // No Content-Length on an SSE response.
    let head = httpwire::encode_status_and_headers(event.response.status, headers.into_iter(), true);
    stream
        .write_all(&head)
        .await
        .map_err(RelayError::Transport)?;

    let queue = WriteQueue::new(runtime.options.sse_watermark_bytes);
    let tx = queue.sender();
    let queued_bytes = queue.queued_bytes_handle();
    let peer_closed = queue.peer_closed_handle();
    let writer = SseWriter::new(tx, queued_bytes, runtime.options.sse_watermark_bytes, peer_closed.clone());
    let scheduler = SchedulerHandle::new(tokio::runtime::Handle::current());

    // Keep a second handle on the same channel for the automatic keep-alive
    // timer before handing the writer to the handler through
    // the documented attach/get contract.
    let keep_alive_writer = writer.clone();
    event.attach_sse_writer(writer);
    let writer = event.get_sse_writer()?;

    let keep_alive_task = scheduler.spawn_interval(Duration::from_millis(runtime.options.sse_keepalive_ms), move || {
        if let Err(err) = keep_alive_writer.send_keep_alive() {
            log::debug!("sse keep-alive send failed: {err}");
        }
    });

    let handler = event
        .pending_stream_handler
        .take()
        .expect("run_streaming called without a pending stream handler");

    let handler_task = spawn_stream_handler(handler, writer, scheduler);

    drain_write_queue(
        stream,
        queue,
        peer_closed,
        Duration::from_millis(runtime.options.write_timeout_ms),
        Duration::from_millis(runtime.options.linger_timeout_ms),
    )
    .await;

    // Draining -> Closed. The handler's own `SseWriter` is dropped once its
    // future completes, which is what sends `WriteCommand::Close` and lets
    // `drain_write_queue` return above — so the handler has either already
    // finished or is no longer able to make progress (peer gone/timed out).
    // Abort defensively so a handler that ignores send failures can't leak
    // past this connection's lifetime.
    handler_task.abort();
    keep_alive_task.abort();
    event.response.mark_sent();
    let _ = stream.shutdown().await;
    Ok(())
}

fn spawn_stream_handler(
    handler: HandlerVariant,
    writer: SseWriter,
    scheduler: SchedulerHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = match handler {
            HandlerVariant::Stream(h) => h.call(writer).await,
            HandlerVariant::StreamWithScheduler(h) => h.call(writer, scheduler).await,
            HandlerVariant::Regular(_) => unreachable!("regular handler cannot be streamed"),
        };
        if let Err(err) = result {
            log::warn!("streaming handler returned an error: {err}");
        }
    })
}

/// Forward queued SSE bytes to the wire in two phases.
///
/// Phase 1 (Streaming): forward chunks as the handler produces them with
/// no overall deadline — a streaming handler may run for the connection's
/// full lifetime. Each individual write is still bounded by
/// `write_timeout` so a peer that stops reading doesn't hang the worker
/// forever. The handler's own `SseWriter` sends `WriteCommand::Close`
/// automatically when dropped (i.e. once the streaming callback returns),
/// which is the signal to enter phase 2. Concurrently, a read half is
/// polled for EOF/error so a handler that never writes still notices the
/// peer is gone promptly, rather than only finding out on its next failed
/// write.
///
/// Phase 2 (Draining): flush whatever is still queued, bounded by the
/// `linger` timeout, then stop.
async fn drain_write_queue(
    stream: &mut TcpStream,
    mut queue: WriteQueue,
    peer_closed: Arc<std::sync::atomic::AtomicBool>,
    write_timeout: Duration,
    linger: Duration,
) {
    let (mut read_half, mut write_half) = stream.split();
    let mut discard = [0u8; 256];

    loop {
        tokio::select! {
            biased;
            read = read_half.read(&mut discard) => {
                match read {
                    Ok(0) | Err(_) => {
                        peer_closed.store(true, Ordering::Release);
                        break;
                    }
                    // A streaming connection's request body is already
                    // fully consumed; stray bytes here have no defined
                    // meaning for this request/response model and are
                    // discarded.
                    Ok(_) => {}
                }
            }
            cmd = queue.recv() => {
                match cmd {
                    Some(WriteCommand::Chunk(chunk)) => {
                        match tokio::time::timeout(write_timeout, write_half.write_all(&chunk)).await {
                            Ok(Ok(())) => {}
                            _ => {
                                peer_closed.store(true, Ordering::Release);
                                return;
                            }
                        }
                    }
                    Some(WriteCommand::Close) | None => break,
                }
            }
        }
    }

    let deadline = tokio::time::Instant::now() + linger;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            log::warn!("sse connection linger timeout exceeded; closing");
            return;
        }
        match tokio::time::timeout(remaining, queue.recv()).await {
            Ok(Some(WriteCommand::Chunk(chunk))) => {
                match tokio::time::timeout(write_timeout, write_half.write_all(&chunk)).await {
                    Ok(Ok(())) => {}
                    _ => {
                        peer_closed.store(true, Ordering::Release);
                        return;
                    }
                }
            }
            Ok(Some(WriteCommand::Close)) | Ok(None) => return,
            Err(_) => {
                log::warn!("sse connection linger timeout exceeded; closing");
                return;
            }
        }
    }
}
