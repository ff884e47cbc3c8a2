pub mod event;
pub mod handlers;

use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::menu::MenuClick;
use handlers::permissions::PermissionDecision;
use handlers::prefs::PrefPatch;

// ─── Message shapes ──────────────────────────────────────────────────────────
//
// One JSON object per text frame, dispatched on which member is present —
// there is no method field. `ping` and `fetchurl` are the external-page
// protocol; the rest is the host-shell surface (menu clicks, permission
// decisions, the options page). An optional `id` is echoed in the reply for
// shells that multiplex.

#[derive(Deserialize)]
struct Envelope {
    id: Option<Value>,
    ping: Option<Value>,
    fetchurl: Option<String>,
    menuclick: Option<MenuClick>,
    permissiondecision: Option<PermissionDecision>,
    getprefs: Option<Value>,
    setpref: Option<PrefPatch>,
    status: Option<Value>,
}

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "message server listening (WebSocket + HTTP health on same port)");

    ctx.broadcaster.broadcast(
        "daemon.ready",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "port": ctx.config.port
        }),
    );

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping message server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("message server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares its port for both WebSocket messages and a plain HTTP
/// health endpoint so shells can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let body = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from
    // WebSocket upgrades — both share the port and both start with "GET ".
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    let mut broadcast_rx = ctx.broadcaster.subscribe();

    // Deferred replies: a fetch can park on a permission prompt, so it runs
    // off the read loop and sends its reply here once it resolves. This is
    // the reply-channel-held-open side of the protocol — the sender keeps
    // waiting until the fetch task answers or the connection dies.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Err(e) => {
                                warn!(err = %e, "undecodable message");
                            }
                            Ok(env) if env.fetchurl.is_some() => {
                                let ctx = ctx.clone();
                                let tx = reply_tx.clone();
                                tokio::spawn(async move {
                                    if let Some(reply) = dispatch_envelope(env, &ctx).await {
                                        // Receiver gone means the connection closed.
                                        let _ = tx.send(reply);
                                    }
                                });
                            }
                            Ok(env) => {
                                if let Some(reply) = dispatch_envelope(env, &ctx).await {
                                    if let Err(e) = sink.send(Message::Text(reply)).await {
                                        warn!(err = %e, "send error");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // A deferred fetch reply resolved
            Some(reply) = reply_rx.recv() => {
                if let Err(e) = sink.send(Message::Text(reply)).await {
                    warn!(err = %e, "send error");
                    break;
                }
            }
            // Outgoing broadcast event
            event = broadcast_rx.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "broadcast send error");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }
    Ok(())
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Dispatch one message and render its reply, if the shape calls for one.
///
/// Unknown shapes get no reply — the contract defines replies only for the
/// members we know.
pub async fn dispatch(text: &str, ctx: &AppContext) -> Option<String> {
    let msg: Envelope = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(err = %e, "undecodable message");
            return None;
        }
    };
    dispatch_envelope(msg, ctx).await
}

async fn dispatch_envelope(msg: Envelope, ctx: &AppContext) -> Option<String> {
    let id = msg.id;
    let body = if let Some(ping) = msg.ping {
        json!({ "pong": ping })
    } else if let Some(url) = msg.fetchurl {
        handlers::fetch::fetch_url(&url, ctx).await
    } else if let Some(click) = msg.menuclick {
        handlers::menu::click(click, ctx).await
    } else if let Some(decision) = msg.permissiondecision {
        handlers::permissions::decision(decision, ctx).await
    } else if msg.getprefs.is_some() {
        handlers::prefs::get(ctx).await
    } else if let Some(patch) = msg.setpref {
        handlers::prefs::set(patch, ctx).await
    } else if msg.status.is_some() {
        handlers::daemon::status(ctx).await
    } else {
        warn!("unhandled message shape");
        return None;
    };
    Some(render(id, body))
}

fn render(id: Option<Value>, mut body: Value) -> String {
    if let Some(id) = id {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("id".to_string(), id);
        }
    }
    body.to_string()
}
