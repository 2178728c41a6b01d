//! In-memory object and identity server.
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A request received by a [`LocalObjectServer`].
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    /// Request verb
    pub method: String,
    /// Path with query
    pub path: String,
    /// Headers with lower-case names
    pub headers: HashMap<String, String>,
    /// Request body
    pub body: Bytes,
}

impl ReceivedRequest {
    /// Looks up a header by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Clone)]
struct SwiftV1 {
    user: String,
    key: String,
    token: String,
}

#[derive(Clone)]
struct SwiftV2 {
    tenant: String,
    user: String,
    password: String,
    token: String,
    expires: Option<String>,
}

#[derive(Default)]
struct ServerState {
    endpoint: String,
    objects: HashMap<String, Bytes>,
    requests: Vec<ReceivedRequest>,
    required_token: Option<String>,
    ignore_ranges: bool,
    swift_v1: Option<SwiftV1>,
    swift_v2: Option<SwiftV2>,
}

/// A running object server.
pub struct LocalObjectServer {
    /// The endpoint URL where the server is listening
    pub endpoint: String,
    state: Arc<Mutex<ServerState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LocalObjectServer {
    /// Starts a server on an ephemeral local port.
    pub fn start() -> anyhow::Result<Self> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let endpoint = format!("http://{}", addr);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()?;
        let state = Arc::new(Mutex::new(ServerState {
            endpoint: endpoint.clone(),
            ..Default::default()
        }));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_state = state.clone();
        let thread = std::thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(error) => {
                        tracing::error!(%error, "Cannot register test server listener");
                        return;
                    }
                };
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        result = listener.accept() => {
                            if let Ok((stream, _)) = result {
                                let state = server_state.clone();
                                tokio::spawn(async move {
                                    let service = hyper::service::service_fn(move |req| {
                                        let state = state.clone();
                                        async move { handle_request(req, state).await }
                                    });
                                    let _ = http1::Builder::new()
                                        .serve_connection(TokioIo::new(stream), service)
                                        .await;
                                });
                            }
                        }
                    }
                }
            });
        });

        Ok(LocalObjectServer {
            endpoint,
            state,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// The URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// `host:port` of this server.
    pub fn authority(&self) -> &str {
        self.endpoint.trim_start_matches("http://")
    }

    /// Stores an object under `path`.
    pub fn put_object(&self, path: &str, data: impl Into<Bytes>) {
        self.state.lock().objects.insert(path.to_string(), data.into());
    }

    /// Makes object requests without a matching `X-Auth-Token` fail with 401.
    pub fn require_token(&self, token: &str) {
        self.state.lock().required_token = Some(token.to_string());
    }

    /// Answers ranged `GET`s with the whole object and status 200.
    pub fn set_ignore_ranges(&self, ignore: bool) {
        self.state.lock().ignore_ranges = ignore;
    }

    /// Serves the Swift v1 identity API on `/auth/v1.0` and `/v1.0`. The
    /// storage URL handed out is `{endpoint}/v1/AUTH_{user}/`.
    pub fn enable_swift_v1(&self, user: &str, key: &str, token: &str) {
        self.state.lock().swift_v1 = Some(SwiftV1 {
            user: user.to_string(),
            key: key.to_string(),
            token: token.to_string(),
        });
    }

    /// Serves the Swift v2 identity API on `/v2.0/tokens`. The storage URL
    /// handed out is `{endpoint}/v1/AUTH_{tenant}`.
    pub fn enable_swift_v2(
        &self,
        tenant: &str,
        user: &str,
        password: &str,
        token: &str,
        expires: Option<&str>,
    ) {
        self.state.lock().swift_v2 = Some(SwiftV2 {
            tenant: tenant.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            token: token.to_string(),
            expires: expires.map(String::from),
        });
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests received so far with the given verb.
    pub fn requests_with_method(&self, method: &str) -> Vec<ReceivedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method)
            .collect()
    }

    /// Stop the server.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LocalObjectServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type ServerResponse = Response<Full<Bytes>>;

fn respond(status: StatusCode, body: impl Into<Bytes>) -> ServerResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Handle an incoming object or identity request.
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<Mutex<ServerState>>,
) -> Result<ServerResponse, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(error) => {
            return Ok(respond(
                StatusCode::BAD_REQUEST,
                format!("Failed to read body: {}", error),
            ));
        }
    };

    let received = ReceivedRequest {
        method: parts.method.to_string(),
        path: parts
            .uri
            .path_and_query()
            .map(|path| path.to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect(),
        body,
    };

    let mut state = state.lock();
    state.requests.push(received.clone());

    let path = parts.uri.path();
    let response = match (&parts.method, path) {
        (&Method::GET, "/auth/v1.0" | "/v1.0") if state.swift_v1.is_some() => {
            swift_v1(&state, &received)
        }
        (&Method::POST, "/v2.0/tokens") if state.swift_v2.is_some() => {
            swift_v2(&state, &received)
        }
        (&Method::HEAD | &Method::GET, _) => object(&state, &parts.method, path, &received),
        _ => respond(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
    };
    Ok(response)
}

fn swift_v1(state: &ServerState, request: &ReceivedRequest) -> ServerResponse {
    let Some(account) = &state.swift_v1 else {
        return respond(StatusCode::NOT_FOUND, "");
    };
    if request.header("x-auth-user") != Some(account.user.as_str())
        || request.header("x-auth-key") != Some(account.key.as_str())
    {
        return respond(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let mut response = respond(StatusCode::OK, "");
    let headers = response.headers_mut();
    let storage_url = format!("{}/v1/AUTH_{}/", state.endpoint, account.user);
    if let Ok(value) = storage_url.parse() {
        headers.insert("x-storage-url", value);
    }
    if let Ok(value) = account.token.parse() {
        headers.insert("x-storage-token", value);
    }
    response
}

fn swift_v2(state: &ServerState, request: &ReceivedRequest) -> ServerResponse {
    let Some(account) = &state.swift_v2 else {
        return respond(StatusCode::NOT_FOUND, "");
    };
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
        return respond(StatusCode::BAD_REQUEST, "Malformed JSON");
    };

    let auth = &payload["auth"];
    let credentials = &auth["passwordCredentials"];
    if auth["tenantName"] != account.tenant.as_str()
        || credentials["username"] != account.user.as_str()
        || credentials["password"] != account.password.as_str()
    {
        return respond(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let mut token = serde_json::json!({ "id": account.token });
    if let Some(expires) = &account.expires {
        token["expires"] = serde_json::Value::from(expires.as_str());
    }
    let document = serde_json::json!({
        "access": {
            "token": token,
            "serviceCatalog": [
                {
                    "name": "nova",
                    "type": "compute",
                    "endpoints": [{ "publicURL": format!("{}/compute/{}", state.endpoint, account.tenant) }]
                },
                {
                    "name": "swift",
                    "type": "object-store",
                    "endpoints": [{ "publicURL": format!("{}/v1/AUTH_{}", state.endpoint, account.tenant) }]
                }
            ]
        }
    });

    let mut response = respond(StatusCode::OK, document.to_string());
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

fn object(
    state: &ServerState,
    method: &Method,
    path: &str,
    request: &ReceivedRequest,
) -> ServerResponse {
    if let Some(token) = &state.required_token {
        if request.header("x-auth-token") != Some(token.as_str()) {
            return respond(StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }
    let Some(data) = state.objects.get(path) else {
        return respond(StatusCode::NOT_FOUND, "Not found");
    };
    let size = data.len() as u64;

    if *method == Method::HEAD {
        let mut response = respond(StatusCode::OK, Bytes::new());
        let headers = response.headers_mut();
        headers.insert(hyper::header::CONTENT_LENGTH, size.into());
        if !state.ignore_ranges {
            headers.insert(
                hyper::header::ACCEPT_RANGES,
                hyper::header::HeaderValue::from_static("bytes"),
            );
        }
        return response;
    }

    let range = match request.header("range") {
        Some(_) if state.ignore_ranges => None,
        Some(range) => match parse_range(range, size) {
            Some(range) => Some(range),
            None => {
                let mut response = respond(StatusCode::RANGE_NOT_SATISFIABLE, "");
                if let Ok(value) = format!("bytes */{}", size).parse() {
                    response
                        .headers_mut()
                        .insert(hyper::header::CONTENT_RANGE, value);
                }
                return response;
            }
        },
        None => None,
    };

    match range {
        Some((first, last)) => {
            let mut response = respond(
                StatusCode::PARTIAL_CONTENT,
                data.slice(first as usize..=last as usize),
            );
            if let Ok(value) = format!("bytes {}-{}/{}", first, last, size).parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_RANGE, value);
            }
            response
        }
        None => respond(StatusCode::OK, data.clone()),
    }
}

/// Parses a single `bytes=first-last` range that lies inside `size`.
fn parse_range(range: &str, size: u64) -> Option<(u64, u64)> {
    let (first, last) = range.strip_prefix("bytes=")?.split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    (first <= last && last < size).then_some((first, last))
}
