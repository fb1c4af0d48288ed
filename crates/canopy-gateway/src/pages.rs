//! Static interstitial pages.
//!
//! Served whenever a definitive terminal artifact is not available:
//! unknown subdomains get a hard 404, deployments mid-build get a 200 with
//! a poll hint, failed deployments get an informational 200.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

const NOT_FOUND_HTML: &str = r#"<!doctype html>
<html>
  <head><title>Not found</title></head>
  <body>
    <h1>404 &mdash; nothing deployed here</h1>
    <p>No deployment is registered for this subdomain.</p>
  </body>
</html>
"#;

const QUEUED_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <title>Deploying&hellip;</title>
    <meta http-equiv="refresh" content="5">
  </head>
  <body>
    <h1>Your deployment is on its way</h1>
    <p>The build is queued or in progress. This page refreshes automatically.</p>
  </body>
</html>
"#;

const FAILED_HTML: &str = r#"<!doctype html>
<html>
  <head><title>Build failed</title></head>
  <body>
    <h1>This deployment failed to build</h1>
    <p>Check the build logs and trigger a new deployment.</p>
  </body>
</html>
"#;

fn html(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

/// 404 page for unregistered subdomains.
pub fn not_found() -> Response {
    html(StatusCode::NOT_FOUND, NOT_FOUND_HTML)
}

/// Informational page for queued/building deployments.
pub fn queued() -> Response {
    html(StatusCode::OK, QUEUED_HTML)
}

/// Informational page for failed deployments.
pub fn failed() -> Response {
    html(StatusCode::OK, FAILED_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_status_codes() {
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(queued().status(), StatusCode::OK);
        assert_eq!(failed().status(), StatusCode::OK);
    }
}
