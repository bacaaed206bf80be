//! CORS policy: the request origin is echoed back only when it is on the
//! allow-list (or the list contains `*`). `Vary: Origin` is always set.

use axum::http::{HeaderName, HeaderValue, Method, header, request::Parts};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::auth::{CLIENT_ID_HEADER, HOST_TOKEN_HEADER};

pub const WILDCARD: &str = "*";

/// Whether `origin` may read responses.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    let origin = origin.trim_end_matches('/');
    allowed
        .iter()
        .any(|o| o == WILDCARD || o.trim_end_matches('/').eq_ignore_ascii_case(origin))
}

pub fn cors_layer(allowed: &[String]) -> CorsLayer {
    let allowed = allowed.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| origin_allowed(origin, &allowed))
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(HOST_TOKEN_HEADER),
            HeaderName::from_static(CLIENT_ID_HEADER),
        ]))
}
