// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for server integration tests

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use metrics_daemon::server::{HttpResponse, MetricsServer};
use metrics_store::{IngestionService, MemStorage};
use std::sync::Arc;

pub fn server(key: Option<&str>) -> MetricsServer {
    let service = IngestionService::new(Arc::new(MemStorage::in_memory()));
    MetricsServer::new(service, key).unwrap()
}

pub fn request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_string(response: HttpResponse) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
