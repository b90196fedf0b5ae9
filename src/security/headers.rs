//! Header policy for the proxy boundary.
//!
//! # Responsibilities
//! - Decide which inbound request headers reach the backend (allow-list)
//! - Synthesize the `origin` header from the inbound request's own origin
//! - Strip transport-framing headers from backend responses
//! - Re-emit every `Set-Cookie` as its own header entry
//!
//! # Design Decisions
//! - Both directions are driven by declarative tables, not ad hoc checks
//! - Request side is an allow-list: anything not listed is dropped
//! - Response side is a deny-list: anything not listed is relayed

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_ENCODING,
    CONTENT_TYPE, COOKIE, ORIGIN, SET_COOKIE, TRANSFER_ENCODING,
};

/// What happens to an allow-listed request header on the way upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRule {
    /// Every value is copied as-is.
    Copy,
    /// Values are joined into a single `; `-separated header (HTTP/2
    /// clients may split `cookie` into several fields).
    JoinCookies,
}

/// Request headers forwarded to the backend.
pub static REQUEST_ALLOW_LIST: [(HeaderName, RequestRule); 3] = [
    (CONTENT_TYPE, RequestRule::Copy),
    (AUTHORIZATION, RequestRule::Copy),
    (COOKIE, RequestRule::JoinCookies),
];

/// Response headers never copied verbatim. `set-cookie` is re-added
/// entry by entry.
pub static RESPONSE_STRIP_LIST: [HeaderName; 4] =
    [CONTENT_ENCODING, TRANSFER_ENCODING, CONNECTION, SET_COOKIE];

/// Content type assumed when the backend omits one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Returns the rule for a request header, or `None` if it is dropped.
pub fn request_rule(name: &HeaderName) -> Option<RequestRule> {
    REQUEST_ALLOW_LIST
        .iter()
        .find(|(allowed, _)| allowed == name)
        .map(|(_, rule)| *rule)
}

/// True when a backend response header is relayed by the generic copy.
pub fn relays_response_header(name: &HeaderName) -> bool {
    !RESPONSE_STRIP_LIST.contains(name)
}

/// Build the outbound header set from the inbound headers.
///
/// The result contains exactly the allow-listed headers present inbound,
/// plus `origin` when the inbound origin is known.
pub fn outbound_headers(inbound: &HeaderMap, inbound_origin: Option<&str>) -> HeaderMap {
    let mut outbound = HeaderMap::new();

    for (name, rule) in REQUEST_ALLOW_LIST.iter() {
        match rule {
            RequestRule::Copy => {
                for value in inbound.get_all(name) {
                    outbound.append(name.clone(), value.clone());
                }
            }
            RequestRule::JoinCookies => {
                let parts: Vec<&[u8]> = inbound.get_all(name).iter().map(|v| v.as_bytes()).collect();
                if parts.is_empty() {
                    continue;
                }
                if let Ok(joined) = HeaderValue::from_bytes(&parts.join(&b"; "[..])) {
                    outbound.insert(name.clone(), joined);
                }
            }
        }
    }

    if let Some(origin) = inbound_origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        outbound.insert(ORIGIN, origin);
    }

    outbound
}

/// Build the client-facing header set from a backend response.
pub fn relay_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::new();

    for (name, value) in upstream.iter() {
        if relays_response_header(name) {
            relayed.append(name.clone(), value.clone());
        }
    }

    // One entry per cookie; never comma-joined.
    for cookie in upstream.get_all(SET_COOKIE) {
        relayed.append(SET_COOKIE, cookie.clone());
    }

    if !relayed.contains_key(CONTENT_TYPE) {
        relayed.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    }

    relayed
}

/// Every standard header name known to the `http` crate plus a few
/// proxy- and browser-internal ones. Used by tests to check the tables.
#[cfg(test)]
pub(crate) fn known_header_names() -> Vec<HeaderName> {
    use axum::http::header;

    let mut names = vec![
        header::ACCEPT,
        header::ACCEPT_CHARSET,
        header::ACCEPT_ENCODING,
        header::ACCEPT_LANGUAGE,
        header::ACCEPT_RANGES,
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        header::ACCESS_CONTROL_MAX_AGE,
        header::ACCESS_CONTROL_REQUEST_HEADERS,
        header::ACCESS_CONTROL_REQUEST_METHOD,
        header::AGE,
        header::ALLOW,
        header::ALT_SVC,
        AUTHORIZATION,
        header::CACHE_CONTROL,
        CONNECTION,
        header::CONTENT_DISPOSITION,
        CONTENT_ENCODING,
        header::CONTENT_LANGUAGE,
        header::CONTENT_LENGTH,
        header::CONTENT_LOCATION,
        header::CONTENT_RANGE,
        header::CONTENT_SECURITY_POLICY,
        CONTENT_TYPE,
        COOKIE,
        header::DATE,
        header::DNT,
        header::ETAG,
        header::EXPECT,
        header::EXPIRES,
        header::FORWARDED,
        header::FROM,
        header::HOST,
        header::IF_MATCH,
        header::IF_MODIFIED_SINCE,
        header::IF_NONE_MATCH,
        header::IF_RANGE,
        header::IF_UNMODIFIED_SINCE,
        header::LAST_MODIFIED,
        header::LINK,
        header::LOCATION,
        header::MAX_FORWARDS,
        ORIGIN,
        header::PRAGMA,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::RANGE,
        header::REFERER,
        header::REFERRER_POLICY,
        header::RETRY_AFTER,
        header::SERVER,
        SET_COOKIE,
        header::STRICT_TRANSPORT_SECURITY,
        header::TE,
        header::TRAILER,
        TRANSFER_ENCODING,
        header::UPGRADE,
        header::UPGRADE_INSECURE_REQUESTS,
        header::USER_AGENT,
        header::VARY,
        header::VIA,
        header::WWW_AUTHENTICATE,
        header::X_CONTENT_TYPE_OPTIONS,
        header::X_FRAME_OPTIONS,
    ];
    for custom in [
        "x-request-id",
        "x-forwarded-for",
        "x-forwarded-host",
        "x-forwarded-proto",
        "x-real-ip",
        "sec-fetch-mode",
        "sec-ch-ua",
        "next-router-state-tree",
        "x-middleware-prefetch",
    ] {
        names.push(HeaderName::from_static(custom));
    }
    names
}
