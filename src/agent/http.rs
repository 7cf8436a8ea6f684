use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AgentError;

const MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Path plus optional query, exactly as sent on the request line.
    pub target: String,
}

impl HttpRequest {
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Decoded query pairs in request order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.target
            .split_once('?')
            .map(|(_, query)| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct ControlError {
    pub status: u16,
    pub message: String,
}

impl ControlError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub async fn read_http_request<S>(socket: &mut S) -> Result<HttpRequest, ControlError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| ControlError::new(400, format!("Failed to read request: {}", err)))?;
        if bytes == 0 {
            return Err(ControlError::new(400, "Empty request"));
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| ControlError::new(400, "Invalid read length"))?;
        buffer.extend_from_slice(read_slice);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(ControlError::new(413, "Request too large"));
        }
        if let Some(pos) = find_header_end(&buffer) {
            let head = buffer
                .get(..pos)
                .ok_or_else(|| ControlError::new(400, "Malformed request headers"))?;
            return parse_request_head(head);
        }
    }
}

/// Parses the request line and validates header syntax. The body, if any,
/// is ignored: every control route is a GET.
pub fn parse_request_head(head: &[u8]) -> Result<HttpRequest, ControlError> {
    let header_text = std::str::from_utf8(head)
        .map_err(|err| ControlError::new(400, format!("Invalid request encoding: {}", err)))?;
    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| ControlError::new(400, "Missing request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ControlError::new(400, "Missing HTTP method"))?;
    let target = parts
        .next()
        .ok_or_else(|| ControlError::new(400, "Missing request path"))?;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        if !line.contains(':') {
            return Err(ControlError::new(400, "Malformed header"));
        }
    }

    Ok(HttpRequest {
        method: method.to_owned(),
        target: target.to_owned(),
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

const fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

pub async fn write_json_response<S, T>(
    socket: &mut S,
    status: u16,
    response: &T,
) -> Result<(), AgentError>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut body = serde_json::to_vec(response).map_err(|err| AgentError::Serialize {
        context: "control response",
        source: err,
    })?;
    body.push(b'\n');
    write_response(socket, status, "application/json", &body).await
}

pub async fn write_error_response<S>(
    socket: &mut S,
    status: u16,
    message: &str,
) -> Result<(), AgentError>
where
    S: AsyncWrite + Unpin,
{
    #[derive(Serialize)]
    struct ErrorResponse<'msg> {
        error: &'msg str,
    }
    write_json_response(socket, status, &ErrorResponse { error: message }).await
}

pub async fn write_text_response<S>(socket: &mut S, status: u16, text: &str) -> Result<(), AgentError>
where
    S: AsyncWrite + Unpin,
{
    write_response(socket, status, "text/plain", text.as_bytes()).await
}

async fn write_response<S>(
    socket: &mut S,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<(), AgentError>
where
    S: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        status_text(status),
        content_type,
        body.len()
    );
    socket
        .write_all(response.as_bytes())
        .await
        .map_err(|err| AgentError::Io {
            context: "write control response",
            source: err,
        })?;
    socket.write_all(body).await.map_err(|err| AgentError::Io {
        context: "write control response body",
        source: err,
    })?;
    socket.flush().await.map_err(|err| AgentError::Io {
        context: "flush control response",
        source: err,
    })
}
