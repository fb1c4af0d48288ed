//! Forwarding of subdomain traffic to the artifact origin.
//!
//! Live deployments have their build outputs stored under
//! `__outputs/<deployment_id>/` at the origin. The proxy rewrites the
//! request path onto that prefix and streams the origin response back
//! without buffering the body.

use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::Response;
use canopy_control::DeploymentId;

use crate::error::GatewayError;

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Streams requests for a live deployment to the artifact origin.
#[derive(Clone)]
pub struct ArtifactProxy {
    client: reqwest::Client,
    origin: String,
}

impl ArtifactProxy {
    /// Builds a proxy against the given origin base URL, for example
    /// `https://bucket.s3.eu-west-2.amazonaws.com`.
    pub fn new(origin: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("proxy client: {e}")))?;
        Ok(Self {
            client,
            origin: origin.trim_end_matches('/').to_owned(),
        })
    }

    /// The origin URL a request path maps to for a given deployment.
    pub fn target_url(&self, deployment_id: &DeploymentId, path: &str) -> String {
        let rewritten = rewrite_path(path);
        format!("{}/__outputs/{}{rewritten}", self.origin, deployment_id)
    }

    /// Forwards `request` to the origin on behalf of `deployment_id` and
    /// streams the response back.
    pub async fn forward(
        &self,
        deployment_id: &DeploymentId,
        request: Request,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let url = self.target_url(deployment_id, parts.uri.path());

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|_| GatewayError::Origin(format!("method {}", parts.method)))?;

        let mut upstream = self
            .client
            .request(method, &url)
            .headers(forwardable_headers(&parts.headers));

        if parts.method != Method::GET && parts.method != Method::HEAD {
            // Request bodies stream through, same as responses.
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let origin_response = upstream.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Origin(e.to_string())
            }
        })?;

        Ok(into_axum_response(origin_response))
    }
}

/// Root requests serve the artifact's entry page.
fn rewrite_path(path: &str) -> &str {
    if path == "/" || path.is_empty() {
        "/index.html"
    } else {
        path
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if name == header::HOST || HOP_BY_HOP.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn into_axum_response(response: reqwest::Response) -> Response {
    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder().status(status);
    if let Some(out) = builder.headers_mut() {
        for (name, value) in response.headers() {
            if HOP_BY_HOP.contains(name) {
                continue;
            }
            out.append(name.clone(), value.clone());
        }
    }

    let body = Body::from_stream(response.bytes_stream());
    builder.body(body).unwrap_or_else(|_| {
        Response::new(Body::empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ArtifactProxy {
        ArtifactProxy::new("http://artifacts.local/", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn root_path_serves_index_html() {
        let id = DeploymentId::new("01jabc");
        assert_eq!(
            proxy().target_url(&id, "/"),
            "http://artifacts.local/__outputs/01jabc/index.html"
        );
    }

    #[test]
    fn nested_paths_are_preserved() {
        let id = DeploymentId::new("01jabc");
        assert_eq!(
            proxy().target_url(&id, "/assets/app.js"),
            "http://artifacts.local/__outputs/01jabc/assets/app.js"
        );
    }

    #[tokio::test]
    async fn post_bodies_stream_to_the_origin() {
        let proxy = ArtifactProxy::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let id = DeploymentId::new("01jabc");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .body(Body::from("form payload"))
            .unwrap();

        // Unreachable origin: the streamed body reaches the transport and
        // fails there, not while assembling the request.
        let result = proxy.forward(&id, request).await;
        assert!(matches!(
            result,
            Err(GatewayError::Origin(_) | GatewayError::Timeout)
        ));
    }

    #[test]
    fn host_and_hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "abc.example".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::ACCEPT, "text/html".parse().unwrap());

        let forwarded = forwardable_headers(&headers);
        assert!(!forwarded.contains_key(header::HOST));
        assert!(!forwarded.contains_key(header::CONNECTION));
        assert!(forwarded.contains_key(header::ACCEPT));
    }
}
