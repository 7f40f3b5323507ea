//! Signed-request middleware for Axum.
//!
//! - Non-body methods without a signature pass through untouched.
//! - Requests without a signature continue unauthenticated, body intact.
//! - Requests with a signature that fails any check get 403 with no detail.
//! - Authenticated requests carry their [`Verdict`] in the extensions.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, HeaderName, Method, Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;

use super::{
    error::{AuthError, AuthErrorCode},
    gate::{AuthenticationGate, Verdict},
};
use crate::logging::VERDICT_TARGET;

/// Axum middleware verifying `X-{header}-Signature` / `X-{header}-UUID`.
///
/// Mount with `axum::middleware::from_fn_with_state(gate, signed_request_middleware)`.
pub async fn signed_request_middleware(
    State(gate): State<Arc<AuthenticationGate>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let signature = header_value(request.headers(), gate.signature_header());
    let identifier = header_value(request.headers(), gate.identifier_header());

    if AuthenticationGate::is_pass_through(request.method(), signature.as_deref()) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, gate.max_body_bytes())
        .await
        .map_err(|e| {
            tracing::warn!("[AUTH] Failed to read request body: {}", e);
            AuthError::from_code(AuthErrorCode::BodyUnreadable)
        })?;

    let mut verdict = if gate.debug_bypass() {
        gate.bypass(identifier.as_deref(), body)
    } else {
        gate.authenticate(signature.as_deref(), identifier.as_deref(), body)
            .await
            .map_err(|e| {
                tracing::error!("[AUTH] Verification aborted: {}", e);
                AuthError::from(e)
            })?
    };

    tracing::info!(
        target: VERDICT_TARGET,
        "{}",
        verdict_line(&parts.method, parts.uri.path(), &verdict)
    );

    if signature.is_some() && !verdict.authenticated {
        return Err(AuthError::from_code(AuthErrorCode::Forbidden));
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    verdict.decode_media(content_type);

    let mut request = Request::from_parts(parts, Body::from(verdict.body.clone()));
    request.extensions_mut().insert(verdict);

    Ok(next.run(request).await)
}

fn verdict_line(method: &Method, path: &str, verdict: &Verdict) -> String {
    format!(
        "{} {} authenticated={} identifier={}",
        method,
        path,
        verdict.authenticated,
        verdict.identifier.as_deref().unwrap_or("-")
    )
}

/// Non-UTF-8 values are kept (lossily) so they fail verification
/// instead of looking absent.
fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Handler-side view of the verdict.
///
/// `None` when the middleware let the request through unread.
#[derive(Debug, Clone)]
pub struct Authenticity(pub Option<Verdict>);

impl Authenticity {
    pub fn is_authentic(&self) -> bool {
        self.0.as_ref().is_some_and(|v| v.authenticated)
    }

    pub fn media(&self) -> Option<&serde_json::Value> {
        self.0.as_ref().and_then(|v| v.media.as_ref())
    }

    pub fn identifier(&self) -> Option<&str> {
        self.0.as_ref().and_then(|v| v.identifier.as_deref())
    }
}

impl<S> FromRequestParts<S> for Authenticity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Verdict>().cloned()))
    }
}
