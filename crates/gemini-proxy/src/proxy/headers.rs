//! Inbound → upstream header translation.
//!
//! The bearer credential moves from `Authorization` into the provider's
//! API-key header; `Host` and connection-scoped headers are left for the
//! transport to recompute. Everything else passes through untouched.

use http::header::{AUTHORIZATION, CONNECTION, HOST};
use http::{HeaderMap, HeaderName, HeaderValue};

/// Connection-scoped headers that each hop recomputes.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailers",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
];

/// Result of reading the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    /// No `Authorization` header.
    Absent,
    /// Present, but without a non-empty second segment (or not visible ASCII).
    Malformed,
    /// Second space-separated segment of the value. The scheme is not checked.
    Token(&'a str),
}

/// Parse an `Authorization` value as `<scheme> <token>`.
///
/// The value is split on single spaces and the second segment is the token;
/// anything after it is ignored. A token that itself contains a space is
/// therefore truncated at that space, and `"Bearer  abc"` (double space)
/// yields an empty second segment and counts as malformed.
pub fn parse_authorization(value: Option<&HeaderValue>) -> Credential<'_> {
    let Some(value) = value else {
        return Credential::Absent;
    };
    let Ok(value) = value.to_str() else {
        return Credential::Malformed;
    };
    match value.split(' ').nth(1) {
        Some(token) if !token.is_empty() => Credential::Token(token),
        _ => Credential::Malformed,
    }
}

/// Build the header set sent upstream.
///
/// Duplicate values of pass-through headers keep their order.
pub fn translate(inbound: &HeaderMap, api_key_header: &HeaderName) -> HeaderMap {
    let mut outbound = end_to_end(inbound);
    outbound.remove(HOST);

    match parse_authorization(inbound.get(AUTHORIZATION)) {
        Credential::Token(token) => match HeaderValue::from_str(token) {
            Ok(key) => {
                outbound.insert(api_key_header.clone(), key);
                outbound.remove(AUTHORIZATION);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Authorization token not usable as a header value");
            }
        },
        Credential::Malformed => {
            tracing::debug!("Authorization header has no token segment, forwarding unchanged");
        }
        Credential::Absent => {}
    }

    outbound
}

/// Copy `headers` without the fixed hop-by-hop set and without any header
/// named as a connection option in `Connection` (RFC 9110 §7.6.1).
pub fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let options = connection_options(headers);
    let mut copied = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || options.contains(name) {
            continue;
        }
        copied.append(name.clone(), value.clone());
    }
    copied
}

/// Whether `name` is a connection-scoped header.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn connection_options(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_key_header() -> HeaderName {
        HeaderName::from_static("x-goog-api-key")
    }

    fn auth(value: &'static str) -> HeaderValue {
        HeaderValue::from_static(value)
    }

    #[test]
    fn test_parse_absent() {
        assert_eq!(parse_authorization(None), Credential::Absent);
    }

    #[test]
    fn test_parse_segment_counts() {
        let empty = auth("");
        let one = auth("Bearer");
        let trailing_space = auth("Bearer ");
        let double_space = auth("Bearer  abc");
        let two = auth("Bearer abc");
        let many = auth("Bearer abc def");

        assert_eq!(parse_authorization(Some(&empty)), Credential::Malformed);
        assert_eq!(parse_authorization(Some(&one)), Credential::Malformed);
        assert_eq!(parse_authorization(Some(&trailing_space)), Credential::Malformed);
        assert_eq!(parse_authorization(Some(&double_space)), Credential::Malformed);
        assert_eq!(parse_authorization(Some(&two)), Credential::Token("abc"));
        assert_eq!(parse_authorization(Some(&many)), Credential::Token("abc"));
    }

    #[test]
    fn test_parse_ignores_scheme() {
        let basic = auth("Basic Zm9vOmJhcg==");
        let lower = auth("bearer k");
        assert_eq!(parse_authorization(Some(&basic)), Credential::Token("Zm9vOmJhcg=="));
        assert_eq!(parse_authorization(Some(&lower)), Credential::Token("k"));
    }

    #[test]
    fn test_parse_opaque_bytes_are_malformed() {
        let value = HeaderValue::from_bytes(b"Bearer \xffkey").unwrap();
        assert_eq!(parse_authorization(Some(&value)), Credential::Malformed);
    }

    #[test]
    fn test_bearer_token_becomes_api_key() {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, auth("Bearer ABC123"));
        inbound.insert("content-type", auth("application/json"));

        let outbound = translate(&inbound, &api_key_header());

        assert_eq!(outbound.get("x-goog-api-key").unwrap(), "ABC123");
        assert!(outbound.get(AUTHORIZATION).is_none());
        assert_eq!(outbound.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_no_authorization_adds_nothing() {
        let mut inbound = HeaderMap::new();
        inbound.insert("accept", auth("text/event-stream"));

        let outbound = translate(&inbound, &api_key_header());

        assert!(outbound.get("x-goog-api-key").is_none());
        assert!(outbound.get(AUTHORIZATION).is_none());
        assert_eq!(outbound.len(), 1);
    }

    #[test]
    fn test_malformed_authorization_is_forwarded_as_is() {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, auth("ABC123"));

        let outbound = translate(&inbound, &api_key_header());

        assert_eq!(outbound.get(AUTHORIZATION).unwrap(), "ABC123");
        assert!(outbound.get("x-goog-api-key").is_none());
    }

    #[test]
    fn test_token_overrides_client_supplied_api_key() {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, auth("Bearer from-bearer"));
        inbound.insert("x-goog-api-key", auth("from-client"));

        let outbound = translate(&inbound, &api_key_header());

        let keys: Vec<&str> = outbound
            .get_all("x-goog-api-key")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["from-bearer"]);
    }

    #[test]
    fn test_custom_api_key_header() {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, auth("Bearer k"));

        let outbound = translate(&inbound, &HeaderName::from_static("x-api-key"));

        assert_eq!(outbound.get("x-api-key").unwrap(), "k");
        assert!(outbound.get("x-goog-api-key").is_none());
    }

    #[test]
    fn test_host_and_hop_by_hop_are_dropped() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, auth("proxy.example.com"));
        inbound.insert("connection", auth("keep-alive"));
        inbound.insert("keep-alive", auth("timeout=5"));
        inbound.insert("transfer-encoding", auth("chunked"));
        inbound.insert("x-custom", auth("kept"));

        let outbound = translate(&inbound, &api_key_header());

        assert!(outbound.get(HOST).is_none());
        assert!(outbound.get("connection").is_none());
        assert!(outbound.get("keep-alive").is_none());
        assert!(outbound.get("transfer-encoding").is_none());
        assert_eq!(outbound.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_connection_options_are_dropped() {
        let mut inbound = HeaderMap::new();
        inbound.append("connection", auth("keep-alive, X-Client-Hop"));
        inbound.append("connection", auth("x-other-hop"));
        inbound.insert("x-client-hop", auth("1"));
        inbound.insert("x-other-hop", auth("2"));
        inbound.insert("x-custom", auth("kept"));

        let outbound = translate(&inbound, &api_key_header());

        assert!(outbound.get("x-client-hop").is_none());
        assert!(outbound.get("x-other-hop").is_none());
        assert_eq!(outbound.get("x-custom").unwrap(), "kept");
        assert_eq!(outbound.len(), 1);
    }

    #[test]
    fn test_end_to_end_ignores_unparseable_connection_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", auth("close, , bad token"));
        headers.insert("content-type", auth("text/plain"));

        let copied = end_to_end(&headers);

        assert!(copied.get("connection").is_none());
        assert_eq!(copied.get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn test_duplicate_headers_keep_order() {
        let mut inbound = HeaderMap::new();
        inbound.append("x-goog-user-project", auth("first"));
        inbound.append("x-goog-user-project", auth("second"));

        let outbound = translate(&inbound, &api_key_header());

        let values: Vec<&str> = outbound
            .get_all("x-goog-user-project")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["first", "second"]);
    }
}
