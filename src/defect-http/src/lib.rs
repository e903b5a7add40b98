//! HTTP front end for [`Detector`].
//!
//! Routes:
//! - `GET /api/health`
//! - `POST /api/predict` with the image as the `file` field of a multipart
//!   form, or as the raw body with its `Content-Type`
//! - `GET /api/history`

use std::convert::Infallible;
use std::sync::Arc;

use defect_serve::{Detector, Error, Record};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::json;

pub mod upload;

pub use upload::{Upload, UploadError, DEFAULT_UPLOAD_LIMIT};

#[derive(Serialize)]
struct History {
    results: Vec<Record>,
}

/// Serve one request; uploads larger than `upload_limit` bytes are refused.
pub async fn handle(
    req: Request<Body>,
    detector: Arc<Detector>,
    upload_limit: usize,
) -> Result<Response<Body>, Infallible> {
    debug!("{} {}", req.method(), req.uri().path());

    let mut response = match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::GET, "/api/health") => {
            json_response(StatusCode::OK, &json!({ "status": "ok" }))
        }
        (&Method::POST, "/api/predict") => predict(req, detector, upload_limit).await,
        (&Method::GET, "/api/history") => history(detector).await,
        _ => detail(StatusCode::NOT_FOUND, "Not Found"),
    };

    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    Ok(response)
}

async fn predict(req: Request<Body>, detector: Arc<Detector>, limit: usize) -> Response<Body> {
    let Upload { data, media_type } = match upload::read_upload(req, limit).await {
        Ok(upload) => upload,
        Err(err) => {
            warn!("Rejected upload: {}", err);
            return detail(err.status(), &err.to_string());
        }
    };

    // Decoding and the forward pass block; keep them off the reactor.
    let outcome =
        tokio::task::spawn_blocking(move || detector.predict(&data, &media_type)).await;

    match outcome {
        Ok(Ok(record)) => json_response(StatusCode::OK, &record),
        Ok(Err(err)) => failure(err),
        Err(err) => {
            error!("Prediction task failed: {}", err);
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Error processing image")
        }
    }
}

async fn history(detector: Arc<Detector>) -> Response<Body> {
    match tokio::task::spawn_blocking(move || detector.history()).await {
        Ok(Ok(results)) => json_response(StatusCode::OK, &History { results }),
        Ok(Err(err)) => failure(err),
        Err(err) => {
            error!("History task failed: {}", err);
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving history")
        }
    }
}

fn failure(err: Error) -> Response<Body> {
    if err.is_client_error() {
        warn!("Rejected upload: {}", err);
        detail(StatusCode::BAD_REQUEST, &err.to_string())
    } else {
        error!("{}", err);
        detail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
    }
}

fn preflight() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));

    response
}

fn detail(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &json!({ "detail": message }))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            error!("Failed to render response: {}", err);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
