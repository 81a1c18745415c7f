use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use wreq::{Client, Method, Proxy};

/// Passthrough byte stream for SSE responses. The pump task feeds it from the
/// upstream body; dropping the receiver tears the upstream connection down.
pub type ByteStream = tokio::sync::mpsc::Receiver<Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

/// One failed upstream call, as seen by the retry/breaker layer.
#[derive(Debug)]
pub enum CallFailure {
    /// Transport-level failures (no HTTP response).
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    /// Non-2xx HTTP response captured as bytes.
    Http {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    /// Short-circuited by the provider's circuit breaker.
    CircuitOpen { provider: String },
}

impl CallFailure {
    /// Transient failures are retried: transport errors, 408, 425, 429 and
    /// 5xx except 501.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallFailure::Transport { .. } => true,
            CallFailure::Http { status, .. } => {
                matches!(status, 408 | 425 | 429) || (*status >= 500 && *status != 501)
            }
            CallFailure::CircuitOpen { .. } => false,
        }
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Transport { kind, message } => {
                write!(f, "transport error ({kind:?}): {message}")
            }
            CallFailure::Http { status, .. } => write!(f, "upstream returned status {status}"),
            CallFailure::CircuitOpen { provider } => {
                write!(f, "circuit open for provider {provider}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Idle gap allowed between streamed chunks; distinct from the overall
    /// request timeout.
    pub read_timeout: Duration,
    pub max_idle_conns: usize,
    pub proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(600),
            read_timeout: Duration::from_secs(90),
            max_idle_conns: 32,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub want_stream: bool,
}

#[derive(Debug)]
pub enum HttpResponseBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: HttpResponseBody,
}

/// One configured client per process; safe for concurrent use, connection
/// pooling is internal.
#[derive(Clone)]
pub struct SharedHttpClient {
    client: Client,
    read_timeout: Duration,
}

impl SharedHttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, wreq::Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_idle_conns);

        if let Some(proxy) = normalize_proxy(config.proxy.as_deref()) {
            builder = builder.proxy(Proxy::all(&proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            read_timeout: config.read_timeout,
        })
    }

    /// Sends one request. Non-2xx responses surface as `CallFailure::Http`
    /// with the body fully read so the caller can classify and retry.
    pub async fn send(&self, req: HttpRequest) -> Result<HttpResponse, CallFailure> {
        let method = match req.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self.client.request(method, &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(map_transport_error)?;
        let status = resp.status().as_u16();
        let headers = headers_to_vec(resp.headers());

        if !(200..300).contains(&status) {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(CallFailure::Http {
                status,
                headers,
                body,
            });
        }

        if !req.want_stream {
            let body = resp.bytes().await.map_err(map_transport_error)?;
            return Ok(HttpResponse {
                status,
                headers,
                body: HttpResponseBody::Bytes(body),
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
        let read_timeout = self.read_timeout;
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            loop {
                let next = tokio::time::timeout(read_timeout, stream.next()).await;
                let Ok(item) = next else {
                    break;
                };
                let Some(item) = item else {
                    break;
                };
                let Ok(chunk) = item else {
                    break;
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(HttpResponse {
            status,
            headers,
            body: HttpResponseBody::Stream(rx),
        })
    }
}

fn normalize_proxy(value: Option<&str>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

fn headers_to_vec(map: &wreq::header::HeaderMap) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, value) in map {
        if let Ok(text) = value.to_str() {
            out.push((name.as_str().to_string(), text.to_string()));
        }
    }
    out
}

fn map_transport_error(err: wreq::Error) -> CallFailure {
    let kind = classify_transport_error(&err);
    CallFailure::Transport {
        kind,
        message: err.to_string(),
    }
}

fn classify_transport_error(err: &wreq::Error) -> TransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        if message.contains("read") || message.contains("idle") {
            return TransportErrorKind::ReadTimeout;
        }
        return TransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return TransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return TransportErrorKind::Tls;
    }
    TransportErrorKind::Other
}
