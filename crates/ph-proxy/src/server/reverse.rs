//! HTTP forwarding through a pooled client

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// How a listener chooses the upstream scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamScheme {
    /// Use the scheme the request asked for
    Preserve,
    /// Always connect upstream over https
    ForceHttps,
}

/// Forwards requests to their upstream through one connection pool
pub struct ReverseProxy {
    client: reqwest::Client,
    scheme: UpstreamScheme,
}

impl ReverseProxy {
    /// Create a proxy; redirects are passed back to the caller untouched
    pub fn new(scheme: UpstreamScheme) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client, scheme })
    }

    /// Serve on `listener` until the process exits
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let router = Router::new().fallback(forward).with_state(Arc::new(self));
        axum::serve(listener, router).await
    }

    /// Upstream URL for a request target
    ///
    /// Absolute-form targets (sent to an `http_proxy`) carry their own
    /// authority; origin-form targets fall back to the `Host` header.
    fn upstream_url(&self, uri: &Uri, headers: &HeaderMap) -> Option<String> {
        let authority = match uri.authority() {
            Some(authority) => authority.as_str().to_string(),
            None => headers.get(header::HOST)?.to_str().ok()?.to_string(),
        };
        let scheme = match self.scheme {
            UpstreamScheme::ForceHttps => "https",
            UpstreamScheme::Preserve => uri.scheme_str().unwrap_or("http"),
        };
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        Some(format!("{}://{}{}", scheme, authority, path))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

async fn forward(State(proxy): State<Arc<ReverseProxy>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(url) = proxy.upstream_url(&parts.uri, &parts.headers) else {
        tracing::warn!("Request for {} has no upstream host", parts.uri);
        return (StatusCode::BAD_REQUEST, "no upstream host in request").into_response();
    };

    let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
        || parts.headers.contains_key(header::TRANSFER_ENCODING);
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    tracing::debug!("{} {}", parts.method, url);
    let mut upstream = proxy.client.request(parts.method, &url).headers(headers);
    if has_body {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    match upstream.send().await {
        Ok(upstream) => {
            let status = upstream.status();
            let mut headers = upstream.headers().clone();
            strip_hop_by_hop(&mut headers);

            let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            tracing::warn!("Upstream request to {} failed: {}", url, e);
            (StatusCode::BAD_GATEWAY, format!("upstream request failed: {}", e)).into_response()
        }
    }
}
