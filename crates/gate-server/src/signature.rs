use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gate_core::signing::{self, SIGNATURE_HEADER};

use crate::error::AppError;

/// Largest body the signature check will buffer.
const MAX_SIGNED_BODY: usize = 1024 * 1024;

/// HMAC key for `X-Signature`. `None` disables the check.
#[derive(Clone, Default)]
pub struct SigningKey(pub Option<Arc<[u8]>>);

impl SigningKey {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self(Some(Arc::from(key.as_ref())))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }
}

/// Axum middleware that rejects requests whose `X-Signature` header is not
/// the hex HMAC-SHA256 of the raw body.
///
/// The body is buffered, checked, and handed on unchanged.
pub async fn verify_signature(
    State(key): State<SigningKey>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = key.0 else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_SIGNED_BODY).await {
        Ok(b) => b,
        Err(e) => return AppError::bad_request(format!("unreadable body: {e}")).into_response(),
    };

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    match signature {
        Some(sig) if signing::verify(&key, &bytes, sig) => {
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Some(_) => {
            tracing::warn!(path = %parts.uri.path(), "rejected request with bad signature");
            AppError::unauthorized("invalid X-Signature").into_response()
        }
        None => {
            tracing::warn!(path = %parts.uri.path(), "rejected unsigned request");
            AppError::unauthorized("missing X-Signature").into_response()
        }
    }
}
