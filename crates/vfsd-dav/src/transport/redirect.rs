//! Redirect classification.
//!
//! The underlying client never follows redirects. Every 3xx goes through
//! [`classify`], which decides whether the session resends and where.

use super::{
    HttpRequest, HttpResponse, Method, TransportError, HEADER_APPLY_TO_REDIRECT_REF,
    HEADER_DESTINATION,
};
use crate::path::uri_equal;
use log::debug;
use reqwest::header::HeaderValue;
use url::Url;

/// What to do with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectAction {
    /// Hand the response to the caller.
    Stop,
    /// Resend the same request to a different URI.
    Follow(Url),
    /// The server only wants a trailing slash; resend to this URI.
    TrailingSlash(Url),
}

fn location(response: &HttpResponse) -> Option<&str> {
    response
        .header_str("location")
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolves the `Location` of `response` against the request URI, keeping
/// the request's user and password.
pub fn resolve_location(request: &HttpRequest, location: &str) -> Result<Url, TransportError> {
    let mut target = request
        .url
        .join(location)
        .map_err(|_| TransportError::InvalidRedirect(location.to_string()))?;
    if target.scheme() != "http" && target.scheme() != "https" {
        return Err(TransportError::InvalidRedirect(location.to_string()));
    }
    if target.username().is_empty() && !request.url.username().is_empty() {
        let _ = target.set_username(request.url.username());
        let _ = target.set_password(request.url.password());
    }
    Ok(target)
}

fn follows_redirect_refs(request: &HttpRequest) -> bool {
    !matches!(
        request.header_str(&HEADER_APPLY_TO_REDIRECT_REF),
        Some(v) if v.eq_ignore_ascii_case("F")
    )
}

/// Decides how to handle `response` to `request`.
pub fn classify(
    request: &HttpRequest,
    response: &HttpResponse,
) -> Result<RedirectAction, TransportError> {
    if !response.is_redirection() {
        return Ok(RedirectAction::Stop);
    }
    let Some(location) = location(response) else {
        return Ok(RedirectAction::Stop);
    };
    let target = resolve_location(request, location)?;

    if uri_equal(&request.url, &target, true) {
        debug!("{} {}: trailing slash redirect", request.method, request.url);
        return Ok(RedirectAction::TrailingSlash(target));
    }

    if !follows_redirect_refs(request) {
        debug!("{} {}: not following, redirect refs apply", request.method, request.url);
        return Ok(RedirectAction::Stop);
    }

    if request.method.is_safe() && matches!(response.status, 301 | 307 | 308) {
        debug!(
            "{} {}: following {} to {}",
            request.method, request.url, response.status, target
        );
        return Ok(RedirectAction::Follow(target));
    }

    debug!(
        "{} {}: returning {} to caller",
        request.method, request.url, response.status
    );
    Ok(RedirectAction::Stop)
}

/// Appends a `/` to the request's `Destination` header if it lacks one.
pub fn add_destination_slash(request: &mut HttpRequest) {
    let Some(destination) = request.header_str(&HEADER_DESTINATION) else {
        return;
    };
    if destination.ends_with('/') {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{}/", destination)) {
        request.headers.insert(HEADER_DESTINATION, value);
    }
}

/// Moves `request` to `target` for the next send.
pub fn apply(request: &mut HttpRequest, action: &RedirectAction) {
    match action {
        RedirectAction::Stop => {}
        RedirectAction::Follow(target) => {
            request.url = target.clone();
            request.redirected = true;
        }
        RedirectAction::TrailingSlash(target) => {
            if matches!(request.method, Method::Move | Method::Copy) {
                add_destination_slash(request);
            }
            request.url = target.clone();
            request.redirected = true;
        }
    }
}
