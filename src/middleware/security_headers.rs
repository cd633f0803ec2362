//! Security headers middleware
//!
//! Adds security headers to all responses to protect against common web
//! vulnerabilities. Headers follow OWASP security best practices.

use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Middleware that adds security headers to all responses
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();

    // Strict-Transport-Security (HSTS)
    // Forces browsers to use HTTPS for all future requests to this domain
    headers.insert(
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains".parse().unwrap(),
    );

    // X-Content-Type-Options
    // Prevents browsers from MIME-sniffing a response away from the declared content-type
    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());

    // X-Frame-Options
    // Protects against clickjacking by preventing the page from being embedded in iframes
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());

    // Referrer-Policy
    // Controls how much referrer information is included with requests
    headers.insert(
        "Referrer-Policy",
        "strict-origin-when-cross-origin".parse().unwrap(),
    );

    response
}
