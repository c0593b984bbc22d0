//! Health endpoint: minimal hand-rolled HTTP/1.1 over TCP.
//! One request per connection; only the request line is interpreted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use office_core::{EntryState, OccupancyEntry, store::sort_entries};

use crate::context::AppContext;

pub const ROOT_BODY: &str = "OK - office tracker";

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEADER_LINES: usize = 100;

pub async fn run_server(port: u16, ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("health endpoint listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &ctx).await {
                tracing::debug!(%peer, "connection error: {e}");
            }
        });
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    /// Status line and headers, then the body unless `head_only`.
    /// `Content-Length` always describes the full body.
    fn encode(&self, head_only: bool) -> String {
        let reason = match self.status {
            200 => "OK",
            404 => "Not Found",
            405 => "Method Not Allowed",
            503 => "Service Unavailable",
            _ => "Bad Request",
        };
        let body = if head_only { "" } else { self.body.as_str() };
        format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            self.status,
            self.content_type,
            self.body.len(),
        )
    }
}

async fn handle_connection<S>(stream: S, ctx: &AppContext) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let request_line = tokio::time::timeout(READ_TIMEOUT, read_head(&mut reader)).await??;

    let response = route(&request_line, ctx).await;
    let head_only = request_line.split_whitespace().next() == Some("HEAD");
    let mut stream = reader.into_inner();
    stream.write_all(response.encode(head_only).as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read the request line and drain headers up to the blank line.
async fn read_head<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> anyhow::Result<String> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }
    Ok(request_line.trim_end().to_string())
}

async fn route(request_line: &str, ctx: &AppContext) -> Response {
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Response::text(400, "bad request");
    };
    let path = target.split('?').next().unwrap_or(target);

    match (method, path) {
        ("GET" | "HEAD", "/") => Response::text(200, ROOT_BODY),
        ("GET", "/status") => {
            let now = ctx.now();
            match ctx.with_store(|store| store.entries()).await {
                Ok(entries) => Response::json(200, &build_status(entries, now)),
                Err(e) => {
                    tracing::warn!("status read failed: {e}");
                    Response::json(503, &serde_json::json!({ "error": e.to_string() }))
                }
            }
        }
        (_, "/" | "/status") => Response::text(405, "method not allowed"),
        _ => Response::text(404, "not found"),
    }
}

#[derive(Debug, Serialize)]
struct StatusUser {
    user_id: String,
    display_name: String,
    state: EntryState,
}

/// `active_count` counts every entry in the active set, scheduled ones included.
pub(crate) fn build_status(mut entries: Vec<OccupancyEntry>, now: DateTime<Utc>) -> serde_json::Value {
    sort_entries(&mut entries);
    let users: Vec<StatusUser> = entries
        .into_iter()
        .map(|e| StatusUser {
            state: e.state(now),
            user_id: e.user_id,
            display_name: e.display_name,
        })
        .collect();
    serde_json::json!({
        "active_count": users.len(),
        "users": users,
    })
}
