//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;

/// Trait for types that provide access to HTTP headers and extensions.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::http::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::http::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_forwarded_for` the first `X-Forwarded-For` entry is used and a
/// missing header is an error (no fallback to the socket address, which would
/// be the proxy). Otherwise the peer address from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded_for: bool,
) -> Result<String, &'static str> {
    if trust_forwarded_for {
        let value = source
            .headers()
            .get("x-forwarded-for")
            .ok_or("IP header not present")?
            .to_str()
            .map_err(|_| "IP header contains invalid characters")?;
        let first = value.split(',').next().unwrap_or("").trim();
        return first
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header is not an IP address");
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .ok_or("No client IP available")
}
