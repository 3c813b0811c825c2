use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Context, Result};
use thiserror::Error;
use volsynth_synth::{RouteResponse, SynthesisService, RESPONSE_HEADERS};

/// Largest request body accepted. A full feature list is a few hundred
/// bytes per cluster.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Longest start line or header line, terminator included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Most header lines accepted in one request.
pub const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Why a request could not be read.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head too large: {0}")]
    HeadTooLarge(String),

    #[error("body of {0} bytes exceeds {MAX_BODY_BYTES}")]
    BodyTooLarge(usize),

    #[error("transfer encoding '{0}' without Content-Length")]
    LengthRequired(String),

    #[error("transfer encoding '{0}' is not supported")]
    UnsupportedEncoding(String),

    #[error("connection closed before the request was complete")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HttpError {
    /// Status to answer with, or `None` when the peer is gone.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Malformed(_) => Some(400),
            Self::LengthRequired(_) => Some(411),
            Self::BodyTooLarge(_) => Some(413),
            Self::HeadTooLarge(_) => Some(431),
            Self::UnsupportedEncoding(_) => Some(501),
            Self::Closed | Self::Io(_) => None,
        }
    }
}

/// Read one CRLF- or LF-terminated line of at most [`MAX_LINE_BYTES`].
fn read_bounded_line<R: BufRead>(reader: &mut R) -> Result<String, HttpError> {
    let mut raw = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut raw)?;
    if read == 0 {
        return Err(HttpError::Closed);
    }
    if raw.last() != Some(&b'\n') {
        if read == MAX_LINE_BYTES {
            return Err(HttpError::HeadTooLarge(format!(
                "line longer than {MAX_LINE_BYTES} bytes"
            )));
        }
        return Err(HttpError::Closed);
    }
    let line = String::from_utf8(raw)
        .map_err(|_| HttpError::Malformed("head is not UTF-8".into()))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Parse one HTTP/1.1 request. Only `Content-Length` framing is supported.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<HttpRequest, HttpError> {
    let start_line = read_bounded_line(reader)?;
    let mut parts = start_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Err(HttpError::Malformed(format!("request line '{start_line}'")));
    };

    let mut content_length = None;
    let mut encoding = None;
    let mut headers = 0;
    loop {
        let line = read_bounded_line(reader)?;
        if line.is_empty() {
            break;
        }
        headers += 1;
        if headers > MAX_HEADERS {
            return Err(HttpError::HeadTooLarge(format!("more than {MAX_HEADERS} headers")));
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::Malformed(format!("header line '{line}'")));
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-length") {
            let length = value
                .parse::<usize>()
                .map_err(|_| HttpError::Malformed(format!("Content-Length '{value}'")))?;
            content_length = Some(length);
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && !value.eq_ignore_ascii_case("identity")
        {
            encoding = Some(value.to_string());
        }
    }

    match (encoding, content_length) {
        (Some(encoding), None) => return Err(HttpError::LengthRequired(encoding)),
        (Some(encoding), Some(_)) => return Err(HttpError::UnsupportedEncoding(encoding)),
        _ => {}
    }
    let length = content_length.unwrap_or(0);
    if length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge(length));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => HttpError::Closed,
        _ => HttpError::Io(e),
    })?;
    let body =
        String::from_utf8(body).map_err(|_| HttpError::Malformed("body is not UTF-8".into()))?;

    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        body,
    })
}

pub fn write_response<W: Write>(writer: &mut W, response: &RouteResponse) -> Result<()> {
    write!(writer, "HTTP/1.1 {} {}\r\n", response.status, response.reason())?;
    for (name, value) in RESPONSE_HEADERS {
        write!(writer, "{name}: {value}\r\n")?;
    }
    write!(writer, "Content-Length: {}\r\n", response.body.len())?;
    write!(writer, "Connection: close\r\n\r\n")?;
    writer.write_all(response.body.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn handle_client(stream: TcpStream, service: &Mutex<SynthesisService>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone().context("failed to clone tcp stream")?);
    let mut writer = stream;
    let request = match read_request(&mut reader) {
        Ok(request) => request,
        Err(e) => {
            if let Some(status) = e.status() {
                log::warn!("Rejecting request: {e}");
                write_response(&mut writer, &RouteResponse::message(status, &e.to_string()))?;
                return Ok(());
            }
            return Err(e.into());
        }
    };
    log::debug!("{} {} ({} bytes)", request.method, request.path, request.body.len());

    let response = {
        let mut service = service
            .lock()
            .map_err(|_| anyhow!("synthesis service lock poisoned"))?;
        service.route(&request.method, &request.path, &request.body)
    };
    log::info!("{} {} -> {}", request.method, request.path, response.status);

    write_response(&mut writer, &response)
}

/// Accept connections forever, one thread per client. Requests are
/// serialized on the shared service.
pub fn serve(listener: TcpListener, service: Arc<Mutex<SynthesisService>>) -> Result<()> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Accept failed: {e}");
                continue;
            }
        };

        let service = Arc::clone(&service);
        thread::spawn(move || {
            if let Err(e) = handle_client(stream, &service) {
                log::warn!("Client ended: {e:#}");
            }
        });
    }
    Ok(())
}

/// Bind `addr` and serve on a background thread. Returns the bound address,
/// which differs from `addr` when port 0 was requested.
pub fn spawn_server(
    addr: &str,
    service: Arc<Mutex<SynthesisService>>,
) -> Result<(SocketAddr, thread::JoinHandle<()>)> {
    let listener =
        TcpListener::bind(addr).with_context(|| format!("failed to bind server at {addr}"))?;
    let local = listener.local_addr()?;
    log::info!("Synthesis service listening on http://{local}");

    let handle = thread::spawn(move || {
        if let Err(e) = serve(listener, service) {
            log::error!("Server failed: {e:#}");
        }
    });
    Ok((local, handle))
}
