//! Fake daemons for exercising the fabric against real sockets.

#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use constellation_fabric::protocol::{RequestEnvelope, ResponseEnvelope};
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Accept one WebSocket connection and hand it to `handler`
pub async fn websocket_daemon<F, Fut>(handler: F) -> Url
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_hdr_async(stream, negotiate)
            .await
            .unwrap();
        handler(socket).await;
    });

    format!("ws://{addr}").parse().unwrap()
}

fn negotiate(
    request: &HandshakeRequest,
    mut response: HandshakeResponse,
) -> Result<HandshakeResponse, ErrorResponse> {
    let offered = request
        .headers()
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok());
    assert_eq!(offered, Some("latipium"));

    response.headers_mut().insert(
        "sec-websocket-protocol",
        HeaderValue::from_static("latipium"),
    );
    Ok(response)
}

/// Answer every envelope with `<url>|<request>` per task until the socket closes
pub async fn echo_envelopes(mut socket: ServerSocket) {
    while let Some(Ok(Message::Text(text))) = socket.next().await {
        if socket.send(Message::Text(echo_reply(&text))).await.is_err() {
            break;
        }
    }
}

pub fn echo_reply(text: &str) -> String {
    let envelope: RequestEnvelope = serde_json::from_str(text).unwrap();
    let responses = envelope
        .tasks
        .iter()
        .map(|task| format!("{}|{}", task.url, task.request))
        .collect();
    serde_json::to_string(&ResponseEnvelope { responses }).unwrap()
}

/// Read until the peer's close frame arrives
pub async fn next_close(socket: &mut ServerSocket) -> Option<u16> {
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Close(frame) = message {
            return frame.map(|f| f.code.into());
        }
    }
    None
}

/// One POST observed by [`HttpDaemon`]
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub body: String,
    pub client_id: Option<String>,
    pub user_agent: Option<String>,
    pub cache_control: Option<String>,
}

/// HTTP daemon that rejects WebSocket upgrades
///
/// POSTs are answered with `<path>|<body>`. Bodies starting with `slow` are
/// answered after a delay and the path `/fail` answers 500.
#[derive(Clone, Default)]
pub struct HttpDaemon {
    hang_upgrade: bool,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl HttpDaemon {
    /// A daemon that never answers upgrade requests
    pub fn hanging() -> Self {
        Self {
            hang_upgrade: true,
            ..Self::default()
        }
    }

    pub async fn serve(&self) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let daemon = self.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let daemon = daemon.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |request| daemon.clone().handle(request));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        format!("http://{addr}").parse().unwrap()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    async fn handle(self, request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        if request.method() == Method::GET {
            if self.hang_upgrade {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            return Ok(status(StatusCode::BAD_REQUEST));
        }

        let (parts, body) = request.into_parts();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let path = parts.uri.path().to_string();
        let client_id = header("x-latipium-client-id");
        let user_agent = header("user-agent");
        let cache_control = header("cache-control");

        let body = body.collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        if body.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }

        self.seen.lock().unwrap().push(Seen {
            path: path.clone(),
            body: body.clone(),
            client_id,
            user_agent,
            cache_control,
        });

        if path == "/fail" {
            return Ok(status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(Response::new(Full::new(Bytes::from(format!("{path}|{body}")))))
    }
}

fn status(code: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = code;
    response
}
