use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// The dashboard serves its own markup, inline styles and same-origin chart
/// images; nothing else may load.
const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; img-src 'self'; style-src 'unsafe-inline'; form-action 'self'; frame-ancestors 'none'";

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("content-security-policy", HeaderValue::from_static(CONTENT_SECURITY_POLICY));
    headers.insert("referrer-policy", HeaderValue::from_static("same-origin"));
    // Rankings change with every refresh
    headers.insert("cache-control", HeaderValue::from_static("no-store"));

    response
}
