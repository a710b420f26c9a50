//! Scripted daemon and sample services shared by the node tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use constellation_core::{Error, Result, TypedService};
use constellation_fabric::protocol::{RequestEnvelope, ResponseEnvelope, WORK_FINISH, WORK_GET};
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub const CLIENT: &str = "11111111-1111-1111-1111-111111111111";
pub const REQUEST: &str = "22222222-2222-2222-2222-222222222222";

/// Answer for a fetch with nothing queued
pub const IDLE: &str = r#"{"Successful":false,"Requests":{}}"#;

/// The single `echo` request from the reference scenario
pub fn echo_work() -> String {
    format!(
        r#"{{"Successful":true,"Requests":{{"{REQUEST}":{{"ServiceId":"echo","Message":"\"hi\""}}}}}}"#
    )
}

/// The report the reference scenario must produce
pub fn echo_report() -> String {
    format!(r#"{{"Results":{{"{REQUEST}":"\"hi\""}}}}"#)
}

/// Daemon that hands out queued work units and records reports
#[derive(Clone, Default)]
pub struct WorkDaemon {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pending: Mutex<VecDeque<String>>,
    reports: Mutex<Vec<String>>,
    client_ids: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl WorkDaemon {
    pub fn with_work(units: impl IntoIterator<Item = String>) -> Self {
        let daemon = Self::default();
        daemon.inner.pending.lock().unwrap().extend(units);
        daemon
    }

    pub fn reports(&self) -> Vec<String> {
        self.inner.reports.lock().unwrap().clone()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.inner.client_ids.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` reports arrived
    pub async fn wait_for_reports(&self, count: usize) -> Vec<String> {
        for _ in 0..500 {
            let reports = self.reports();
            if reports.len() >= count {
                return reports;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {count} reports");
    }

    fn answer(&self, path: &str, body: String) -> String {
        match path {
            WORK_GET => {
                self.inner.fetches.fetch_add(1, Ordering::SeqCst);
                self.inner
                    .pending
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| IDLE.to_string())
            }
            WORK_FINISH => {
                self.inner.reports.lock().unwrap().push(body);
                "{}".to_string()
            }
            _ => "{}".to_string(),
        }
    }

    /// Serve over HTTP only; WebSocket upgrades are rejected
    pub async fn serve_http(&self) -> Url {
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

    async fn handle(self, request: Request<Incoming>) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        if request.method() == Method::GET {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }

        let (parts, body) = request.into_parts();
        if let Some(id) = parts
            .headers
            .get("x-latipium-client-id")
            .and_then(|value| value.to_str().ok())
        {
            self.inner.client_ids.lock().unwrap().push(id.to_string());
        }
        let body = body.collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();

        let reply = self.answer(parts.uri.path(), body);
        Ok(Response::new(Full::new(Bytes::from(reply))))
    }

    /// Serve one persistent channel
    ///
    /// With `close_after_report` the daemon closes the channel right after
    /// acknowledging the first report.
    pub async fn serve_websocket(&self, close_after_report: bool) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let daemon = self.clone();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_hdr_async(stream, negotiate)
                .await
                .unwrap();

            while let Some(Ok(Message::Text(text))) = socket.next().await {
                let envelope: RequestEnvelope = serde_json::from_str(&text).unwrap();
                daemon
                    .inner
                    .client_ids
                    .lock()
                    .unwrap()
                    .push(envelope.client_id.to_string());

                let reported = envelope.tasks.iter().any(|task| task.url == WORK_FINISH);
                let responses = envelope
                    .tasks
                    .into_iter()
                    .map(|task| daemon.answer(&task.url, task.request))
                    .collect();
                let reply = serde_json::to_string(&ResponseEnvelope { responses }).unwrap();
                if socket.send(Message::Text(reply)).await.is_err() {
                    break;
                }

                if close_after_report && reported {
                    let _ = socket.close(None).await;
                }
            }
        });

        format!("ws://{addr}").parse().unwrap()
    }
}

fn negotiate(
    _request: &HandshakeRequest,
    mut response: HandshakeResponse,
) -> std::result::Result<HandshakeResponse, ErrorResponse> {
    response.headers_mut().insert(
        "sec-websocket-protocol",
        HeaderValue::from_static("latipium"),
    );
    Ok(response)
}

/// Replies with its JSON request
pub struct Echo;

impl TypedService for Echo {
    type Request = serde_json::Value;
    type Response = serde_json::Value;

    fn id(&self) -> &str {
        "echo"
    }

    fn handle(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        Ok(request)
    }
}

/// Always fails with `boom`
pub struct Failing;

impl TypedService for Failing {
    type Request = serde_json::Value;
    type Response = ();

    fn id(&self) -> &str {
        "failing"
    }

    fn handle(&self, _request: serde_json::Value) -> Result<()> {
        Err(Error::custom("boom"))
    }
}

/// Panics on every request
pub struct Panicking;

impl TypedService for Panicking {
    type Request = serde_json::Value;
    type Response = ();

    fn id(&self) -> &str {
        "panicking"
    }

    fn handle(&self, _request: serde_json::Value) -> Result<()> {
        panic!("kaboom")
    }
}

/// Records teardown through a shared flag
pub struct Tracked {
    pub id: &'static str,
    pub torn_down: Arc<AtomicBool>,
}

impl Tracked {
    pub fn new(id: &'static str) -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                id,
                torn_down: flag.clone(),
            },
            flag,
        )
    }
}

impl TypedService for Tracked {
    type Request = serde_json::Value;
    type Response = serde_json::Value;

    fn id(&self) -> &str {
        self.id
    }

    fn handle(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        Ok(request)
    }

    fn teardown(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }
}
