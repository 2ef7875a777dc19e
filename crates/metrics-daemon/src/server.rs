// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP front-end of the collector.
//!
//! Routes parse their inputs and hand typed values to [`IngestionService`];
//! nothing here touches storage directly.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{header, http, HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_model::signature::{SignatureError, Signer, SIGNATURE_HEADER};
use metrics_model::{InputError, Metric, MetricKind, MetricRecord};
use metrics_store::{IngestionService, MetricStore, StoreError};
use serde_json::json;
use std::fmt::{Display, Write};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type HttpResponse = Response<Full<Bytes>>;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Status code a storage failure is reported with.
pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Input(InputError::EmptyId) | StoreError::NotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        StoreError::Input(_) => StatusCode::BAD_REQUEST,
        StoreError::KindConflict { .. } => StatusCode::CONFLICT,
        StoreError::Database(_) | StoreError::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn not_found() -> HttpResponse {
    let mut not_found = Response::default();
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    not_found
}

pub struct MetricsServer {
    service: IngestionService,
    signer: Option<Signer>,
}

impl MetricsServer {
    pub fn new(service: IngestionService, key: Option<&str>) -> Result<Self, SignatureError> {
        let signer = key.map(Signer::new).transpose()?;
        Ok(Self { service, signer })
    }

    pub fn service(&self) -> &IngestionService {
        &self.service
    }

    pub async fn handle<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return self.message(
                    StatusCode::BAD_REQUEST,
                    &format!("Error reading request body: {e}"),
                )
            }
        };

        if let Some(rejected) = self.check_signature(&parts.headers, &body) {
            return rejected;
        }

        let path = parts.uri.path().trim_start_matches('/');
        let segments: Vec<&str> = path.split('/').collect();
        debug!("{} /{path}", parts.method);

        match (&parts.method, segments.as_slice()) {
            (&Method::GET, [""]) => self.list().await,
            (&Method::GET, ["ping"]) => self.ping().await,
            (&Method::POST, ["update"] | ["update", ""]) => self.update_json(&body).await,
            (&Method::POST, ["updates"] | ["updates", ""]) => self.update_batch_json(&body).await,
            (&Method::POST, ["value"] | ["value", ""]) => self.value_json(&body).await,
            (&Method::POST, ["update", kind, name, value]) => {
                self.update_path(kind, name, value).await
            }
            (&Method::GET, ["value", kind, name]) => self.value_text(kind, name).await,
            _ => Ok(not_found()),
        }
    }

    /// Unsigned requests pass; a signature that does not match the body is
    /// rejected when a key is configured.
    fn check_signature(
        &self,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Option<http::Result<HttpResponse>> {
        let signer = self.signer.as_ref()?;
        let signature = headers.get(SIGNATURE_HEADER)?;
        let valid = signature
            .to_str()
            .map(|sig| signer.verify(body, sig))
            .unwrap_or(false);
        if valid {
            None
        } else {
            Some(self.message(StatusCode::BAD_REQUEST, "Request signature mismatch"))
        }
    }

    fn respond(
        &self,
        status: StatusCode,
        content_type: &str,
        body: Vec<u8>,
    ) -> http::Result<HttpResponse> {
        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(signer) = &self.signer {
            builder = builder.header(SIGNATURE_HEADER, signer.sign(&body));
        }
        builder.body(Full::new(Bytes::from(body)))
    }

    /// Logs `message` and returns it as `{"message": ...}`.
    fn message(&self, status: StatusCode, message: &str) -> http::Result<HttpResponse> {
        if status.is_server_error() {
            error!("{message}");
        } else if status.is_client_error() {
            warn!("{message}");
        } else {
            debug!("{message}");
        }
        let body = json!({ "message": message }).to_string();
        self.respond(status, JSON, body.into_bytes())
    }

    fn store_error(&self, context: &str, err: &StoreError) -> http::Result<HttpResponse> {
        self.message(status_for(err), &format!("{context}: {err}"))
    }

    fn record(&self, metric: &Metric) -> http::Result<HttpResponse> {
        match serde_json::to_vec(&MetricRecord::from(metric)) {
            Ok(body) => self.respond(StatusCode::OK, JSON, body),
            Err(e) => self.message(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error encoding metric: {e}"),
            ),
        }
    }

    async fn update_json(&self, body: &Bytes) -> http::Result<HttpResponse> {
        let record: MetricRecord = match serde_json::from_slice(body) {
            Ok(record) => record,
            Err(e) => {
                return self.message(StatusCode::BAD_REQUEST, &format!("Invalid metric: {e}"))
            }
        };
        match self.service.update_record(record).await {
            Ok(stored) => self.record(&stored),
            Err(e) => self.store_error("Error updating metric", &e),
        }
    }

    async fn update_batch_json(&self, body: &Bytes) -> http::Result<HttpResponse> {
        let records: Vec<MetricRecord> = match serde_json::from_slice(body) {
            Ok(records) => records,
            Err(e) => {
                return self.message(StatusCode::BAD_REQUEST, &format!("Invalid batch: {e}"))
            }
        };
        match self.service.update_records(records).await {
            Ok(applied) => {
                debug!("Applied batch of {applied} metrics");
                self.respond(StatusCode::OK, JSON, b"{}".to_vec())
            }
            Err(e) => self.store_error("Error updating batch", &e),
        }
    }

    async fn value_json(&self, body: &Bytes) -> http::Result<HttpResponse> {
        let query: MetricRecord = match serde_json::from_slice(body) {
            Ok(query) => query,
            Err(e) => {
                return self.message(StatusCode::BAD_REQUEST, &format!("Invalid query: {e}"))
            }
        };
        if query.id.is_empty() {
            return self.store_error("Error reading metric", &InputError::EmptyId.into());
        }
        match self.service.read(query.kind, &query.id).await {
            Ok(metric) => self.record(&metric),
            Err(e) => self.store_error("Error reading metric", &e),
        }
    }

    async fn update_path(&self, kind: &str, name: &str, value: &str) -> http::Result<HttpResponse> {
        let metric = match Metric::parse(kind, name, value) {
            Ok(metric) => metric,
            Err(e) => return self.store_error("Error updating metric", &e.into()),
        };
        match self.service.update(&metric).await {
            Ok(()) => self.respond(StatusCode::OK, TEXT, b"OK".to_vec()),
            Err(e) => self.store_error("Error updating metric", &e),
        }
    }

    async fn value_text(&self, kind: &str, name: &str) -> http::Result<HttpResponse> {
        let Ok(kind) = kind.parse::<MetricKind>() else {
            return Ok(not_found());
        };
        match self.service.read(kind, name).await {
            Ok(metric) => self.respond(StatusCode::OK, TEXT, metric.value.to_string().into_bytes()),
            Err(e) => self.store_error("Error reading metric", &e),
        }
    }

    async fn list(&self) -> http::Result<HttpResponse> {
        match self.service.read_all().await {
            Ok(metrics) => {
                let mut listing = String::new();
                for metric in &metrics {
                    let _ = writeln!(listing, "{}: {}", metric.name, metric.value);
                }
                self.respond(StatusCode::OK, TEXT, listing.into_bytes())
            }
            Err(e) => self.store_error("Error listing metrics", &e),
        }
    }

    async fn ping(&self) -> http::Result<HttpResponse> {
        if self.service.ping().await {
            let body = json!({ "status": "OK" }).to_string();
            self.respond(StatusCode::OK, JSON, body.into_bytes())
        } else {
            self.message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database is not reachable",
            )
        }
    }
}

/// Accepts connections until `cancel` fires, then aborts open connections.
pub async fn serve_tcp(
    listener: TcpListener,
    server: Arc<MetricsServer>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let http = hyper::server::conn::http1::Builder::new();
    let mut connections = JoinSet::new();

    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {addr}");
    }

    loop {
        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e);
                }
                Ok((conn, _)) => conn,
            },
            Some(finished) = connections.join_next() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!("Connection handler panicked: {e:?}");
                    }
                }
                continue;
            }
        };

        let io = TokioIo::new(conn);
        let http = http.clone();
        let server = Arc::clone(&server);
        connections.spawn(async move {
            let service = service_fn(move |req| {
                let server = Arc::clone(&server);
                async move { server.handle(req).await }
            });
            if let Err(e) = http.serve_connection(io, service).await {
                debug!("Connection error: {e}");
            }
        });
    }

    info!("Stopped accepting connections");
    connections.shutdown().await;
    Ok(())
}
