//! Reading an uploaded image out of a `POST /api/predict` request.
//!
//! Browsers send the image as the `file` field of a `multipart/form-data`
//! form; other clients may send the bytes as the whole body. Either way the
//! declared media type travels with the bytes.

use hyper::body::HttpBody;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Request, StatusCode};
use multer::{Constraints, Multipart, SizeLimit};
use thiserror::Error;

/// Form field carrying the image in multipart uploads.
pub const FILE_FIELD: &str = "file";

/// Default cap on request bodies.
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug)]
pub struct Upload {
    pub data: Vec<u8>,
    pub media_type: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Missing form field: file")]
    MissingFile,

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error("Cannot read body: {0}")]
    Body(#[from] hyper::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            UploadError::Multipart(_) | UploadError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub async fn read_upload(req: Request<Body>, limit: usize) -> Result<Upload, UploadError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_len.map_or(false, |len| len > limit as u64) {
        return Err(UploadError::TooLarge(limit));
    }

    if is_multipart(&content_type) {
        read_form(req.into_body(), &content_type, limit).await
    } else {
        let data = read_body(req.into_body(), limit).await?;
        Ok(Upload {
            data,
            media_type: content_type,
        })
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map_or(false, |essence| {
            essence.trim().eq_ignore_ascii_case("multipart/form-data")
        })
}

async fn read_body(mut body: Body, limit: usize) -> Result<Vec<u8>, UploadError> {
    let mut data = Vec::new();

    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if data.len() + chunk.len() > limit {
            return Err(UploadError::TooLarge(limit));
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

async fn read_form(body: Body, content_type: &str, limit: usize) -> Result<Upload, UploadError> {
    let boundary =
        multer::parse_boundary(content_type).map_err(|e| UploadError::Multipart(e.to_string()))?;
    let constraints =
        Constraints::new().size_limit(SizeLimit::new().whole_stream(limit as u64));
    let mut form = Multipart::with_constraints(body, boundary, constraints);

    while let Some(field) = form.next_field().await.map_err(|e| form_error(e, limit))? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // The part's own type is the declared one, as a browser form sends it.
        let media_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_default();
        let data = field.bytes().await.map_err(|e| form_error(e, limit))?;

        return Ok(Upload {
            data: data.to_vec(),
            media_type,
        });
    }

    Err(UploadError::MissingFile)
}

fn form_error(err: multer::Error, limit: usize) -> UploadError {
    match err {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
            UploadError::TooLarge(limit)
        }
        other => UploadError::Multipart(other.to_string()),
    }
}
